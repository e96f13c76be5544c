//! OCR Intake - upload documents, store them, and record OCR results.

mod api;
mod blob_store;
mod config;
mod db;
mod document;
mod error;
mod ocr;
mod service;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use blob_store::BlobStore;
use config::ServiceConfig;
use db::DocumentStore;
use ocr::HttpOcrClient;
use service::DocumentService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_intake=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::from_env()?;
    info!("Loaded config: {:?}", config);

    let store = DocumentStore::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    let ocr = HttpOcrClient::new(reqwest::Client::new(), config.ocr_service_url.clone())
        .with_timeout(config.ocr_timeout);
    info!("OCR endpoint: {}", ocr.url());

    let state = AppState {
        documents: DocumentService::new(
            store,
            BlobStore::new(config.upload_dir.clone()),
            Arc::new(ocr),
        ),
    };

    let app = api::router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
