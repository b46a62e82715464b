#[macro_use]
extern crate rocket;

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod models;
pub mod payments;
pub mod query;
pub mod rate_limit;
pub mod reports;
pub mod request_logger;
pub mod resources;
pub mod routes;
pub mod state;
pub mod store;

use crate::auth::GuardRejection;
use crate::db::TourDb;
use crate::rate_limit::{RateLimit, RateLimitConfig};
use crate::error::ErrorBody;
use crate::request_logger::RequestLogger;
use crate::state::AppState;
use crate::store::{DocumentStore, PgDocumentStore};
use env_logger::Env;
use rocket::data::{Limits, ToByteUnit};
use rocket::fairing::AdHoc;
use rocket::http::{Method, Status};
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::{Build, Catcher, Config, Request, Rocket};
use rocket_cors::{AllowedOrigins, CorsOptions};
use rocket_db_pools::Database;
use rocket_okapi::{
    rapidoc::{GeneralConfig, HideShowConfig, RapiDocConfig, make_rapidoc},
    settings::UrlObject,
    swagger_ui::{SwaggerUIConfig, make_swagger_ui},
};
use std::sync::{Arc, Once};

static LOGGER: Once = Once::new();

/// Largest JSON body a route will read.
pub fn body_limits() -> Limits {
    Limits::default().limit("json", 10.kibibytes())
}

fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    let cors = CorsOptions::default()
        .allowed_origins(AllowedOrigins::all())
        .allowed_methods(
            vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
            ]
            .into_iter()
            .map(From::from)
            .collect(),
        )
        .allow_credentials(true)
        .to_cors()
        .expect("Error creating CORS");

    let mut rocket = rocket::custom(Config::figment().merge(("limits", body_limits())));
    match RateLimitConfig::from_env() {
        Some(config) => rocket = rocket.attach(RateLimit::new(config)),
        None => log::info!("RATE_LIMIT_MAX is 0; API rate limiting disabled"),
    }

    rocket
        .attach(RequestLogger)
        .attach(TourDb::init())
        .attach(cors)
        .attach(AdHoc::try_on_ignite("Run Migrations", |rocket| async move {
            match TourDb::fetch(&rocket) {
                Some(db) => {
                    let pool = (**db).clone();
                    match db::run_migrations(&pool).await {
                        Ok(_) => Ok(rocket),
                        Err(e) => {
                            log::error!("database migrations failed: {}", e);
                            Err(rocket)
                        }
                    }
                }
                None => {
                    log::error!("database pool not available for migrations");
                    Err(rocket)
                }
            }
        }))
        .attach(AdHoc::try_on_ignite("Application State", |rocket| async move {
            let Some(db) = TourDb::fetch(&rocket) else {
                log::error!("database pool not available for application state");
                return Err(rocket);
            };
            let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new((**db).clone()));
            match AppState::from_env(store) {
                Ok(state) => Ok(rocket.manage(state)),
                Err(e) => {
                    log::error!("failed to initialise application state: {}", e);
                    Err(rocket)
                }
            }
        }))
        .register("/", catchers())
        .mount("/api/v1", routes::api_routes())
        .mount(
            "/api/docs/swagger/",
            make_swagger_ui(&SwaggerUIConfig {
                url: "../../v1/openapi.json".to_owned(),
                ..Default::default()
            }),
        )
        .mount(
            "/api/docs/rapidoc/",
            make_rapidoc(&RapiDocConfig {
                general: GeneralConfig {
                    spec_urls: vec![UrlObject::new("Tour API", "../../v1/openapi.json")],
                    ..Default::default()
                },
                hide_show: HideShowConfig {
                    allow_spec_url_load: false,
                    allow_spec_file_load: false,
                    ..Default::default()
                },
                ..Default::default()
            }),
        )
}

type CaughtError = status::Custom<Json<ErrorBody>>;

fn caught(status: Status, message: impl Into<String>) -> CaughtError {
    status::Custom(status, Json(ErrorBody::new(status, message)))
}

/// Message stored by a failed authentication guard, if any.
fn rejection(request: &Request<'_>) -> Option<String> {
    request
        .local_cache(GuardRejection::default)
        .0
        .clone()
}

#[catch(400)]
fn bad_request() -> CaughtError {
    caught(Status::BadRequest, "Malformed request")
}

#[catch(401)]
fn unauthorized(request: &Request<'_>) -> CaughtError {
    let message = rejection(request).unwrap_or_else(|| "Please log in to get access.".to_string());
    caught(Status::Unauthorized, message)
}

#[catch(403)]
fn forbidden(request: &Request<'_>) -> CaughtError {
    let message = rejection(request)
        .unwrap_or_else(|| "You do not have permission to perform this action".to_string());
    caught(Status::Forbidden, message)
}

#[catch(404)]
fn not_found(request: &Request<'_>) -> CaughtError {
    caught(
        Status::NotFound,
        format!("Can't find {} on this server", request.uri()),
    )
}

#[catch(413)]
fn payload_too_large() -> CaughtError {
    caught(Status::PayloadTooLarge, "Request body is too large")
}

#[catch(422)]
fn unprocessable() -> CaughtError {
    caught(Status::BadRequest, "Invalid request body")
}

#[catch(500)]
fn internal_error() -> CaughtError {
    caught(Status::InternalServerError, "Something went wrong")
}

#[catch(default)]
fn fallback(status: Status, _request: &Request<'_>) -> CaughtError {
    let message = status.reason().unwrap_or("Something went wrong");
    caught(status, message)
}

/// JSON error bodies for failures that never reach a handler.
pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        payload_too_large,
        unprocessable,
        internal_error,
        fallback
    ]
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use serde_json::Value;
    use std::sync::Arc;

    use crate::auth::{AuthConfig, AuthState, JwtService, PasswordService, Role};
    use crate::config::QueryConfig;
    use crate::error::ApiResult;
    use crate::rate_limit::{RateLimit, RateLimitConfig};
    use crate::query::Document;
    use crate::resources::schema::object;
    use crate::resources::user;
    use crate::state::AppState;
    use crate::store::{DocumentId, DocumentStore, MemoryStore};

    pub use database::{TestDatabase, TestDatabaseError};

    pub const TEST_JWT_SECRET: &str = "test-secret-with-enough-entropy-0123456789";

    /// Application state over an in-memory store with checkout disabled.
    pub fn memory_state() -> AppState {
        state_with_store(Arc::new(MemoryStore::new()))
    }

    /// Application state over `store` with test auth settings.
    pub fn state_with_store(store: Arc<dyn DocumentStore>) -> AppState {
        let config = AuthConfig::with_secret(TEST_JWT_SECRET);
        let jwt = JwtService::from_config(&config).expect("test jwt service");
        let auth = AuthState::new(config, PasswordService::default(), jwt);
        AppState::new(store, QueryConfig::default(), auth, None)
    }

    /// Seeding helpers that write straight through the state's store.
    pub struct TestFixtures<'a> {
        state: &'a AppState,
    }

    impl<'a> TestFixtures<'a> {
        pub fn new(state: &'a AppState) -> Self {
            Self { state }
        }

        /// Insert an active account with a hashed password, returning its id.
        pub async fn insert_user(
            &self,
            name: &str,
            email: &str,
            role: Role,
            password: &str,
        ) -> DocumentId {
            let hash = self
                .state
                .auth
                .password_service
                .hash_password(password)
                .expect("hash fixture password");
            let stored = self
                .state
                .store
                .insert(
                    user::COLLECTION,
                    object([
                        ("name", Value::from(name)),
                        ("email", Value::from(email)),
                        ("role", Value::from(role.as_str())),
                        ("password", Value::from(hash)),
                        ("photo", Value::from("default.jpg")),
                        ("active", Value::Bool(true)),
                    ]),
                )
                .await
                .expect("insert fixture user");
            stored["id"].as_i64().expect("fixture user id")
        }

        /// A bearer token for `user_id` signed with the state's key.
        pub fn token_for(&self, user_id: DocumentId, role: Role) -> String {
            self.state
                .auth
                .jwt_service
                .issue_token(user_id, role.as_str())
                .expect("sign fixture token")
                .token
        }

        /// Create a tour through the regular handler so defaults and slugs apply.
        pub async fn insert_tour(&self, body: Value) -> ApiResult<Document> {
            self.state.tours().create(body).await
        }
    }

    pub mod database {
        use log::LevelFilter;
        use rocket_db_pools::sqlx::postgres::{PgConnectOptions, PgPoolOptions};
        use rocket_db_pools::sqlx::{self, ConnectOptions, PgPool};
        use testcontainers::ImageExt;
        use testcontainers_modules::postgres::Postgres;
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use tokio::runtime::Handle;
        use uuid::Uuid;

        static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

        const POSTGRES_TAG: &str = "16-alpine";

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database url not available")]
            MissingUrl,
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// A migrated, uniquely named database inside a disposable Postgres container.
        pub struct TestDatabase {
            pool: Option<PgPool>,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<Postgres>>,
        }

        impl TestDatabase {
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let container = Postgres::default().with_tag(POSTGRES_TAG).start().await?;
                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;

                let admin_options: PgConnectOptions =
                    format!("postgres://postgres:postgres@{host}:{port}/postgres").parse()?;
                let admin_options = admin_options.log_statements(LevelFilter::Off);

                let database_name = format!("tours_{}", Uuid::new_v4().simple());
                let admin_pool = PgPoolOptions::new()
                    .max_connections(1)
                    .connect_with(admin_options.clone())
                    .await?;
                sqlx::query(&format!("CREATE DATABASE \"{database_name}\" TEMPLATE template0"))
                    .execute(&admin_pool)
                    .await?;
                admin_pool.close().await;

                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(admin_options.clone().database(&database_name))
                    .await?;
                MIGRATOR.run(&pool).await?;

                Ok(Self {
                    pool: Some(pool),
                    admin_options,
                    database_name,
                    container: Some(container),
                })
            }

            pub fn pool(&self) -> &PgPool {
                self.pool.as_ref().expect("test database pool is available")
            }

            pub fn pool_clone(&self) -> PgPool {
                self.pool().clone()
            }

            /// Close the pool, drop the database and stop the container.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                if let Some(pool) = self.pool.take() {
                    pool.close().await;
                }
                drop_database(self.admin_options.clone(), &self.database_name).await?;
                self.container.take();
                Ok(())
            }
        }

        async fn drop_database(
            admin_options: PgConnectOptions,
            database_name: &str,
        ) -> Result<(), sqlx::Error> {
            let admin_pool = PgPoolOptions::new()
                .max_connections(1)
                .connect_with(admin_options)
                .await?;
            sqlx::query(&format!("DROP DATABASE IF EXISTS \"{database_name}\" WITH (FORCE)"))
                .execute(&admin_pool)
                .await?;
            Ok(())
        }

        impl Drop for TestDatabase {
            fn drop(&mut self) {
                if let Some(pool) = self.pool.take() {
                    let admin_options = self.admin_options.clone();
                    let database_name = self.database_name.clone();
                    if let Ok(handle) = Handle::try_current() {
                        handle.spawn(async move {
                            pool.close().await;
                            let _ = drop_database(admin_options, &database_name).await;
                        });
                    }
                }
                self.container.take();
            }
        }
    }

    /// Rocket instances for route tests: random port, logging off, JSON catchers.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        state: Option<AppState>,
        rate_limit: Option<RateLimitConfig>,
    }

    impl TestRocketBuilder {
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false))
                .merge(("limits", crate::body_limits()));

            Self {
                figment,
                mounts: Vec::new(),
                state: None,
                rate_limit: None,
            }
        }

        /// Mount routes under `/api/v1`.
        pub fn mount_api_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/api/v1".to_string(), routes));
            self
        }

        pub fn manage_state(mut self, state: AppState) -> Self {
            self.state = Some(state);
            self
        }

        pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
            self.rate_limit = Some(config);
            self
        }

        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment).register("/", crate::catchers());

            if let Some(config) = self.rate_limit {
                rocket = rocket.attach(RateLimit::new(config));
            }

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.state {
                rocket = rocket.manage(state);
            }

            rocket
        }

        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
