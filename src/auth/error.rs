use rocket::http::Status;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Display strings are shown to clients for every non-5xx variant.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please provide email and password.")]
    MissingCredentials,
    #[error("Incorrect email or password.")]
    InvalidCredentials,
    #[error("Invalid password")]
    WrongPassword,
    #[error("Please log in to get access.")]
    NotLoggedIn,
    #[error("Token has expired. Please login again")]
    TokenExpired,
    #[error("Invalid token. Please login again")]
    TokenInvalid,
    #[error("The user no longer exists.")]
    UserGone,
    #[error("User recently changed password. Please log in again")]
    PasswordChanged,
    #[error("You do not have permission to perform this action")]
    Forbidden,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("argon2 parameter error: {0}")]
    Argon2(String),
    #[error("password hashing error: {0}")]
    PasswordHash(String),
}

impl AuthError {
    pub fn status(&self) -> Status {
        match self {
            AuthError::MissingCredentials => Status::BadRequest,
            AuthError::InvalidCredentials
            | AuthError::WrongPassword
            | AuthError::NotLoggedIn
            | AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::UserGone
            | AuthError::PasswordChanged => Status::Unauthorized,
            AuthError::Forbidden => Status::Forbidden,
            AuthError::Config(_)
            | AuthError::Store(_)
            | AuthError::Jwt(_)
            | AuthError::Argon2(_)
            | AuthError::PasswordHash(_) => Status::InternalServerError,
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        AuthError::Config(err.to_string())
    }
}

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}
