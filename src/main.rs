use std::sync::Arc;

use anyhow::{Context, Result};
use termguard::backend::HttpMtBackend;
use termguard::config::Config;
use termguard::orchestrator::{Translator, TranslatorSettings};
use termguard::retry::RetryConfig;
use termguard::server;
use termguard::store::{InMemoryStore, PgStore, Store};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when not present)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("termguard=info".parse()?),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        port = config.port,
        mt_url = %config.mt_url,
        mt_backend = ?config.mt_backend,
        mt_enabled = config.mt_enabled,
        "Starting termguard"
    );

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => Arc::new(
            PgStore::connect(url)
                .await
                .context("failed to connect to database")?,
        ),
        None => {
            warn!("DATABASE_URL not set, using an in-memory store (nothing is persisted)");
            Arc::new(InMemoryStore::new())
        }
    };

    let backend = HttpMtBackend::new(config.mt_settings(), config.mt_timeout)
        .context("failed to build HTTP client")?
        .with_retry(RetryConfig::mt_call(), RetryConfig::ollama_call());

    let translator = Translator::new(
        store,
        Arc::new(backend),
        TranslatorSettings::from_config(&config),
    );

    server::serve(Arc::new(translator), config.port).await
}
