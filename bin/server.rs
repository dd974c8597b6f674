// Trial Balance Classifier - Web Server
// REST API with Axum over the classification engine

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use trial_balance_classifier::logging::init_tracing;
use trial_balance_classifier::server::{router, AppState};
use trial_balance_classifier::{ClassificationConfig, ClassificationEngine, MemoryStore, VERSION};

const DEFAULT_PORT: u16 = 5000;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    println!("🌐 Trial Balance Classifier v{} - Web Server", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let port = match std::env::var("PORT") {
        Ok(value) => value
            .parse::<u16>()
            .with_context(|| format!("Invalid PORT: {}", value))?,
        Err(_) => DEFAULT_PORT,
    };

    let config_path = std::env::var("TBX_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = ClassificationConfig::load_or_default(&config_path);
    println!("✓ Config loaded: {}", config_path);

    // SQLite when TBX_MEMORY_DB is set, otherwise per-client CSV files
    let store = match std::env::var("TBX_MEMORY_DB") {
        Ok(db) => {
            println!("✓ Memory database: {}", db);
            MemoryStore::sqlite(&db)?
        }
        Err(_) => {
            let dir = PathBuf::from(std::env::var("TBX_MEMORY_DIR").unwrap_or_else(|_| "Memory".to_string()));
            println!("✓ Memory directory: {}", dir.display());
            MemoryStore::csv(dir)?
        }
    };

    let engine = ClassificationEngine::new(config, Arc::new(store));
    let api_key = std::env::var("TBX_API_KEY").ok().filter(|key| !key.is_empty());
    let app = router(AppState::new(engine, api_key));

    let addr = format!("0.0.0.0:{}", port);
    println!("\n🚀 Server running at http://localhost:{}", port);
    println!("   POST /api/classify");
    println!("   POST /api/memory/update");
    println!("   GET  /api/memory/:client_id");
    println!("   GET  /api/config");
    println!("\nPress Ctrl+C to stop");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
