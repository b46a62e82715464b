//! Authentication: configuration, password hashing, token minting, the
//! request guard that resolves the calling user, and the account routes.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod guards;
pub mod jwt;
pub mod passwords;
pub mod responses;
pub mod routes;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{AuthUser, GuardRejection};
pub use jwt::JwtService;
pub use passwords::PasswordService;
pub use responses::Role;

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub password_service: Arc<PasswordService>,
    pub jwt_service: Arc<JwtService>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        password_service: PasswordService,
        jwt_service: JwtService,
    ) -> Self {
        Self {
            config,
            password_service: Arc::new(password_service),
            jwt_service: Arc::new(jwt_service),
        }
    }

    /// Build every auth service from environment configuration.
    pub fn from_env() -> AuthResult<Self> {
        let config = AuthConfig::from_env()?;
        let jwt_service = JwtService::from_config(&config)?;
        Ok(Self::new(config, PasswordService::new()?, jwt_service))
    }
}
