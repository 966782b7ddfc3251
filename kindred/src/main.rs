//! Kindred - people directory service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kindred::{
    config::Args,
    db::MongoClient,
    images::ImageHost,
    people::{MemoryPersonStore, MongoPersonStore, PersonStore},
    reseed::spawn_reseed_task,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("kindred={},info", log_level).into()),
        )
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Kindred - People Directory");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!(
        "MongoDB: {}",
        args.mongodb_uri
            .as_deref()
            .map(kindred::db::mongo::redact_uri)
            .unwrap_or_else(|| "(not configured)".to_string())
    );
    info!("CORS origin: {}", args.cors_origin());
    match args.schedule_hour {
        Some(hours) => info!("Reseed: every {} hour(s)", hours),
        None => info!("Reseed: disabled"),
    }
    info!("======================================");

    // MongoDB is optional in dev mode
    let store: Arc<dyn PersonStore> = match &args.mongodb_uri {
        Some(uri) => match MongoClient::new(uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                Arc::new(MongoPersonStore::new(&client).await?)
            }
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, using memory store): {}", e);
                Arc::new(MemoryPersonStore::new())
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("No MONGODB_URI set (dev mode, using memory store)");
            Arc::new(MemoryPersonStore::new())
        }
    };

    let images: Option<Arc<dyn ImageHost>> = match args.images.build() {
        Some(host) => Some(Arc::new(host)),
        None => {
            warn!("Cloudinary not configured - profile picture uploads disabled");
            None
        }
    };

    let state = Arc::new(AppState::new(args, store, images)?);

    spawn_reseed_task(
        Arc::clone(&state.people),
        state.args.schedule_hour,
        state.args.reseed_file.clone(),
    );

    server::run(state).await?;
    Ok(())
}
