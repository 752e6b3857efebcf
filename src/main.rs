//! aquastat
//!
//! Water-quality monitoring backend: station and sample ingestion, alerting,
//! and the analytics engine that turns raw samples into quality scores,
//! trends, daily overviews and station comparisons.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod alerts;
mod analytics;
mod config;
mod demo_data;
mod error;
mod handlers;
mod maintenance;
mod models;
mod reports;
mod scheduler;
mod store;
mod validation;

use crate::config::Settings;
use crate::demo_data::{seed_demo_data, DemoGenerator};
use crate::scheduler::Scheduler;
use crate::store::{InMemoryStore, SharedStore};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenv::dotenv().ok();

    // Logging
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,aquastat=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();

    // Load configuration
    let settings = Settings::from_env().context("Failed to load configuration")?;
    let bind_address = format!("{}:{}", settings.server.host, settings.server.port);

    info!("Starting aquastat backend");
    info!("Binding server to {}", bind_address);

    // Shared sample store
    let store: SharedStore = Arc::new(RwLock::new(InMemoryStore::new()));

    if settings.demo.enabled {
        let mut generator =
            DemoGenerator::from_entropy().context("Failed to initialize demo generator")?;
        let mut guard = store.write().await;
        seed_demo_data(&mut *guard, &mut generator, settings.demo.stations, Utc::now())
            .context("Failed to seed demo data")?;
    }

    // ---------------------------------------------------------------------
    // Scheduled jobs
    // IMPORTANT: use actix_rt::spawn (NOT tokio::spawn)
    // ---------------------------------------------------------------------
    if settings.scheduler.enabled {
        let scheduler = Scheduler::new(&settings.scheduler, &settings.retention);
        let scheduler_store = store.clone();

        actix_rt::spawn(async move {
            scheduler.run(scheduler_store).await;
        });
    } else {
        info!("Scheduled jobs disabled");
    }

    // ---------------------------------------------------------------------
    // HTTP server
    // ---------------------------------------------------------------------
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(store.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server terminated with an error")
}
