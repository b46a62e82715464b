use crate::auth::AuthResult;
use crate::config::{env_bool, env_required, env_string};

const DEFAULT_TOKEN_TTL_SECS: i64 = 90 * 24 * 60 * 60;

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub token_ttl_secs: i64,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub jwt_secret: String,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let jwt_secret = env_required("JWT_SECRET")?;
        let token_ttl_secs = std::env::var("JWT_EXPIRES_IN_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|ttl| *ttl > 0)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        Ok(Self {
            issuer: env_string("JWT_ISSUER", "tour-api"),
            audience: env_string("JWT_AUDIENCE", "tour-api"),
            token_ttl_secs,
            cookie_name: env_string("JWT_COOKIE_NAME", "jwt"),
            cookie_secure: env_bool("JWT_COOKIE_SECURE", true),
            jwt_secret,
        })
    }

    /// Configuration with a fixed secret, for tests and local tooling.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            issuer: "tour-api".into(),
            audience: "tour-api".into(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            cookie_name: "jwt".into(),
            cookie_secure: false,
            jwt_secret: secret.into(),
        }
    }
}
