use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

use tour_api::auth::passwords::PasswordService;
use tour_api::db;
use tour_api::query::Document;
use tour_api::resources::import::{ImportIds, prepare_document};
use tour_api::resources::{review, tour, user};
use tour_api::store::{DocumentStore, PgDocumentStore};

/// Collections in dependency order: tours reference users, reviews reference both.
const COLLECTIONS: [&str; 3] = [user::COLLECTION, tour::COLLECTION, review::COLLECTION];

#[derive(Parser, Debug)]
#[command(
    name = "import_data",
    about = "Load or wipe the development tour data set",
    group(ArgGroup::new("action").required(true).args(["import", "delete"]))
)]
struct Args {
    /// Insert every document from `<data-dir>/<collection>.json`.
    #[arg(long)]
    import: bool,

    /// Remove every tour, user and review.
    #[arg(long)]
    delete: bool,

    /// Directory holding `users.json`, `tours.json` and `reviews.json`.
    #[arg(long, default_value = "dev-data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    db::run_migrations(&pool).await?;
    let store = PgDocumentStore::new(pool);

    if args.delete {
        for collection in COLLECTIONS.iter().rev() {
            let removed = store.clear(collection).await?;
            println!("Deleted {removed} {collection}");
        }
        return Ok(());
    }

    let passwords = PasswordService::new()
        .map_err(|err| io::Error::other(format!("argon2 init failed: {err}")))?;
    let mut ids = ImportIds::default();

    for collection in COLLECTIONS {
        let documents = match read_collection(&args.data_dir, collection) {
            Ok(documents) => documents,
            Err(err) => {
                writeln!(io::stderr(), "error: {collection}: {err}")?;
                std::process::exit(1);
            }
        };

        let mut touched_tours = BTreeSet::new();
        for mut document in documents {
            let source_id = prepare_document(collection, &mut document, &ids, &passwords)
                .map_err(|err| io::Error::other(format!("{collection}: {err}")))?;
            if let Some(tour_id) = document.get("tour").and_then(Value::as_i64) {
                touched_tours.insert(tour_id);
            }

            let stored = store.insert(collection, document).await?;
            if let (Some(source), Some(id)) = (source_id, stored.get("id").and_then(Value::as_i64)) {
                ids.record(collection, &source, id);
            }
        }

        for tour_id in touched_tours {
            review::recalculate_tour_ratings(&store, tour_id).await?;
        }
        log::info!("imported {collection}");
    }

    println!(
        "Imported {} users and {} tours with their reviews",
        ids.users.len(),
        ids.tours.len()
    );
    Ok(())
}

fn read_collection(dir: &Path, collection: &str) -> Result<Vec<Document>, Box<dyn std::error::Error>> {
    let path = dir.join(format!("{collection}.json"));
    let raw = std::fs::read_to_string(&path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    let documents: Vec<Document> = serde_json::from_str(&raw)
        .map_err(|err| format!("{} is not an array of objects: {err}", path.display()))?;
    Ok(documents)
}
