//! Process-wide application state managed by Rocket.

use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AuthError, AuthState};
use crate::config::{ConfigError, QueryConfig};
use crate::handlers::ResourceHandlers;
use crate::payments::{CheckoutClient, PaymentConfig, PaymentError};
use crate::resources::{Bookings, Reviews, Tours, Users};
use crate::store::DocumentStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("auth setup failed: {0}")]
    Auth(#[from] AuthError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("payment setup failed: {0}")]
    Payment(#[from] PaymentError),
}

pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub query: QueryConfig,
    pub auth: AuthState,
    pub payments: Option<CheckoutClient>,
    tours: Tours,
    reviews: Reviews,
    bookings: Bookings,
    users: Users,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        query: QueryConfig,
        auth: AuthState,
        payments: Option<CheckoutClient>,
    ) -> Self {
        let users = Users::new(auth.password_service.clone());
        Self {
            store,
            query,
            auth,
            payments,
            tours: Tours,
            reviews: Reviews,
            bookings: Bookings,
            users,
        }
    }

    /// Wire every service from environment configuration around `store`.
    pub fn from_env(store: Arc<dyn DocumentStore>) -> Result<Self, StartupError> {
        let auth = AuthState::from_env()?;
        let payments = match PaymentConfig::from_env()? {
            Some(config) => {
                let http = Client::builder()
                    .user_agent(concat!("tour-api/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(PaymentError::from)?;
                Some(CheckoutClient::new(config, http))
            }
            None => {
                log::info!("STRIPE_SECRET_KEY not set; checkout sessions disabled");
                None
            }
        };
        Ok(Self::new(store, QueryConfig::from_env(), auth, payments))
    }

    pub fn tours(&self) -> ResourceHandlers<'_, Tours> {
        ResourceHandlers::new(&self.tours, &*self.store, &self.query)
    }

    pub fn reviews(&self) -> ResourceHandlers<'_, Reviews> {
        ResourceHandlers::new(&self.reviews, &*self.store, &self.query)
    }

    pub fn bookings(&self) -> ResourceHandlers<'_, Bookings> {
        ResourceHandlers::new(&self.bookings, &*self.store, &self.query)
    }

    pub fn users(&self) -> ResourceHandlers<'_, Users> {
        ResourceHandlers::new(&self.users, &*self.store, &self.query)
    }
}
