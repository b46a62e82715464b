use rocket_db_pools::sqlx::{self, PgPool, migrate::Migrator};
use rocket_db_pools::Database;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Database)]
#[database("tour_db")]
pub struct TourDb(sqlx::PgPool);

/// Apply pending migrations; already-applied ones are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}
