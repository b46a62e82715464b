use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse, Responses};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

use crate::auth::AuthError;
use crate::payments::PaymentError;
use crate::resources::FieldIssue;
use crate::store::StoreError;

pub type ApiResult<T> = Result<T, ApiError>;

const GENERIC_MESSAGE: &str = "Something went wrong";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("Invalid input data. {0}")]
    Validation(ValidationErrors),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Failed field constraints, rendered as `field: message. field: message`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldIssue>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(". ");
        f.write_str(&joined)
    }
}

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub status: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        let kind = if status.code < 500 { "fail" } else { "error" };
        Self {
            status: kind.to_string(),
            message: message.into(),
        }
    }
}

impl ApiError {
    pub fn validation(issues: Vec<FieldIssue>) -> Self {
        ApiError::Validation(ValidationErrors(issues))
    }

    pub fn status(&self) -> Status {
        match self {
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::BadRequest(_) | ApiError::Validation(_) => Status::BadRequest,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::Payment(_) => Status::BadGateway,
            ApiError::Store(_) | ApiError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Anticipated failures whose message is safe to show to the client.
    pub fn is_operational(&self) -> bool {
        !matches!(
            self,
            ApiError::Store(_) | ApiError::Payment(_) | ApiError::Internal(_)
        )
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        let message = if self.is_operational() {
            log::debug!("{} {}", status.code, self);
            self.to_string()
        } else {
            log::error!("{} {}", status.code, self);
            GENERIC_MESSAGE.to_string()
        };

        let json = serde_json::to_string(&ErrorBody::new(status, message)).unwrap_or_else(|_| {
            format!(r#"{{"status":"error","message":"{GENERIC_MESSAGE}"}}"#)
        });

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Malformed identifier, duplicate value or failed validation"),
            ("401", "Missing, invalid or outdated credentials"),
            ("403", "Role not allowed to perform this action"),
            ("404", "No document with that identifier"),
            ("500", "Unexpected server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let status = err.status();
        if status == Status::Unauthorized {
            ApiError::Unauthorized(err.to_string())
        } else if status == Status::Forbidden {
            ApiError::Forbidden(err.to_string())
        } else if status == Status::BadRequest {
            ApiError::BadRequest(err.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_every_issue() {
        let err = ApiError::validation(vec![
            FieldIssue::new("name", "A tour must have a name"),
            FieldIssue::new("price", "A tour must have a price"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid input data. name: A tour must have a name. price: A tour must have a price"
        );
        assert_eq!(err.status(), Status::BadRequest);
        assert!(err.is_operational());
    }

    #[test]
    fn unexpected_errors_are_not_operational() {
        let err = ApiError::Internal("pool exhausted".into());
        assert_eq!(err.status(), Status::InternalServerError);
        assert!(!err.is_operational());
    }

    #[test]
    fn auth_errors_keep_their_status() {
        assert_eq!(
            ApiError::from(AuthError::InvalidCredentials).status(),
            Status::Unauthorized
        );
        assert_eq!(ApiError::from(AuthError::Forbidden).status(), Status::Forbidden);
        assert_eq!(
            ApiError::from(AuthError::MissingCredentials).status(),
            Status::BadRequest
        );
    }

    #[test]
    fn error_body_distinguishes_fail_from_error() {
        assert_eq!(ErrorBody::new(Status::NotFound, "x").status, "fail");
        assert_eq!(ErrorBody::new(Status::BadGateway, "x").status, "error");
    }
}
