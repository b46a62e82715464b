//! Hosted checkout sessions for booking a tour.

use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::{ConfigError, env_optional, env_string};
use crate::store::DocumentId;

const CHECKOUT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const TOUR_IMAGE_PATH: &str = "img/tours";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("checkout is not configured")]
    Disabled,
    #[error("checkout request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("checkout request timed out after {0:?}")]
    Timeout(Duration),
    #[error("checkout provider answered {status}: {body}")]
    Provider { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub secret_key: String,
    pub api_base: String,
    pub public_base_url: String,
    pub currency: String,
}

impl PaymentConfig {
    /// `Ok(None)` when no secret key is set: checkout stays disabled.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(secret_key) = env_optional("STRIPE_SECRET_KEY") else {
            return Ok(None);
        };

        let public_base_url = env_string("PUBLIC_BASE_URL", "http://127.0.0.1:8000");
        if !public_base_url.starts_with("http://") && !public_base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                key: "PUBLIC_BASE_URL".into(),
                value: public_base_url,
            });
        }

        Ok(Some(Self {
            secret_key,
            api_base: env_string("STRIPE_API_BASE", "https://api.stripe.com")
                .trim_end_matches('/')
                .to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            currency: env_string("CHECKOUT_CURRENCY", "usd").to_lowercase(),
        }))
    }
}

/// What is being bought and by whom.
#[derive(Debug, Clone)]
pub struct CheckoutItem {
    pub tour_id: DocumentId,
    pub tour_name: String,
    pub tour_slug: String,
    pub image_cover: Option<String>,
    pub price: f64,
    pub user_id: DocumentId,
    pub customer_email: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutClient {
    config: PaymentConfig,
    http: Client,
}

impl CheckoutClient {
    pub fn new(config: PaymentConfig, http: Client) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Create a one-item payment session and return the provider's session object.
    pub async fn create_session(&self, item: &CheckoutItem) -> Result<Value, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base);
        debug!("checkout: creating session for tour {} and user {}", item.tour_id, item.user_id);

        let request = self
            .http
            .post(url)
            .bearer_auth(&self.config.secret_key)
            .form(&self.session_form(item))
            .send();
        let response = timeout(CHECKOUT_REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| PaymentError::Timeout(CHECKOUT_REQUEST_TIMEOUT))??;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            warn!("checkout: provider rejected session for tour {}: {}", item.tour_id, status);
            return Err(PaymentError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }

    /// Form-encoded session parameters in the provider's bracketed key style.
    pub fn session_form(&self, item: &CheckoutItem) -> Vec<(String, String)> {
        let base = &self.config.public_base_url;
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "success_url".to_string(),
                format!(
                    "{base}/api/v1/bookings/checkout-success?tour={}&user={}&price={}",
                    item.tour_id, item.user_id, item.price
                ),
            ),
            ("cancel_url".to_string(), format!("{base}/tour/{}", item.tour_slug)),
            ("customer_email".to_string(), item.customer_email.clone()),
            ("client_reference_id".to_string(), item.tour_id.to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.config.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("{} Tour", item.tour_name),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                minor_units(item.price).to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
        ];
        if let Some(cover) = &item.image_cover {
            form.push((
                "line_items[0][price_data][product_data][images][0]".to_string(),
                format!("{base}/{TOUR_IMAGE_PATH}/{cover}"),
            ));
        }
        form
    }
}

/// Price in cents.
fn minor_units(price: f64) -> i64 {
    (price * 100.0).round() as i64
}
