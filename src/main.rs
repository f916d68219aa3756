//! Heirloom - access gateway for end-of-life plans

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heirloom::{
    auth::{FederatedVerifier, GoogleTokenVerifier},
    config::Args,
    db::MongoClient,
    server::{self, AppState},
    services::{HttpMailer, LogMailer, Mailer, MailerConfig},
    store::{MemoryStore, MongoStore, Store},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("heirloom={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Heirloom - end-of-life plan gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("App: {}", args.app_base_url);
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!("======================================");

    // Connect to MongoDB (in-memory fallback in dev mode)
    let (store, store_kind): (Arc<dyn Store>, &'static str) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                (Arc::new(MongoStore::open(&client).await?), "mongodb")
            }
            Err(e) if args.dev_mode => {
                warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                (Arc::new(MemoryStore::new()), "memory")
            }
            Err(e) => {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        };

    let mailer: Arc<dyn Mailer> = match args.email_api_key.clone() {
        Some(api_key) => Arc::new(HttpMailer::new(MailerConfig {
            api_url: args.email_api_url.clone(),
            api_key,
            from: args.email_from.clone(),
            timeout: args.outbound_timeout(),
        })?),
        None => {
            warn!("EMAIL_API_KEY not set - emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    if args.google_client_id.is_none() {
        warn!("GOOGLE_CLIENT_ID not set - executor ID token audience is not checked");
    }
    let federated: Arc<dyn FederatedVerifier> = Arc::new(GoogleTokenVerifier::new(
        args.google_tokeninfo_url.clone(),
        args.google_client_id.clone(),
        args.outbound_timeout(),
    )?);

    let state = AppState::new(args, store, store_kind, mailer, federated)?;
    server::run(Arc::new(state)).await?;
    Ok(())
}
