//! Per-client request budget for the API.
//!
//! Fairings cannot end a request early, so a request over budget is rerouted to
//! a path nothing serves and its response is rewritten to `429` on the way out.
//! The handler it was aimed at never runs.

use parking_lot::Mutex;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{ContentType, Header, Method, Status};
use rocket::{Data, Request, Response};
use std::collections::HashMap;
use std::io::Cursor;
use std::time::{Duration, Instant};

use crate::config::env_u64;
use crate::error::ErrorBody;

pub const RATE_LIMITED_MESSAGE: &str =
    "Too many requests from this IP, please try again in 30 minutes.";

const DEFAULT_MAX_REQUESTS: u64 = 100;
const DEFAULT_WINDOW_SECS: u64 = 30 * 60;
const LIMITED_PREFIX: &str = "/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window: Duration,
}

impl RateLimitConfig {
    /// `None` when `RATE_LIMIT_MAX` is `0`.
    pub fn from_env() -> Option<Self> {
        let max_requests = env_u64("RATE_LIMIT_MAX", DEFAULT_MAX_REQUESTS);
        let window_secs = env_u64("RATE_LIMIT_WINDOW_SECS", DEFAULT_WINDOW_SECS).max(1);
        (max_requests > 0).then(|| Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u64,
}

/// Outcome of counting one request against a client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_after: Duration,
}

/// Fixed-window counters keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client: &str, now: Instant) -> Decision {
        let mut windows = self.windows.lock();
        // Expired windows are dropped so idle clients do not accumulate.
        windows.retain(|_, window| now.duration_since(window.started) < self.config.window);

        let window = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        window.hits += 1;

        let reset_after = self
            .config
            .window
            .saturating_sub(now.duration_since(window.started));
        Decision {
            allowed: window.hits <= self.config.max_requests,
            remaining: self.config.max_requests.saturating_sub(window.hits),
            reset_after,
        }
    }
}

/// Stashed per request so the response hook can report the budget.
#[derive(Debug, Clone, Copy, Default)]
struct Budget(Option<Decision>);

pub struct RateLimit {
    limiter: RateLimiter,
}

impl RateLimit {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config),
        }
    }
}

#[rocket::async_trait]
impl Fairing for RateLimit {
    fn info(&self) -> Info {
        Info {
            name: "Rate Limit",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        if !request.uri().path().as_str().starts_with(LIMITED_PREFIX) {
            return;
        }

        let client = request
            .client_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let decision = self.limiter.check(&client, Instant::now());
        request.local_cache(|| Budget(Some(decision)));

        if !decision.allowed {
            log::warn!("rate limit: {client} exceeded its budget on {}", request.uri());
            request.set_method(Method::Get);
            request.set_uri(uri!("/__rate-limited"));
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let Budget(Some(decision)) = *request.local_cache(Budget::default) else {
            return;
        };
        let config = &self.limiter.config;

        response.set_header(Header::new(
            "RateLimit-Policy",
            format!("{};w={}", config.max_requests, config.window.as_secs()),
        ));
        response.set_header(Header::new(
            "RateLimit",
            format!(
                "limit={}, remaining={}, reset={}",
                config.max_requests,
                decision.remaining,
                decision.reset_after.as_secs()
            ),
        ));

        if !decision.allowed {
            let body = ErrorBody::new(Status::TooManyRequests, RATE_LIMITED_MESSAGE);
            let json = serde_json::to_string(&body).unwrap_or_default();
            response.set_status(Status::TooManyRequests);
            response.set_header(ContentType::JSON);
            response.set_header(Header::new("Retry-After", decision.reset_after.as_secs().to_string()));
            response.set_sized_body(json.len(), Cursor::new(json));
        }
    }
}
