//! Export the translation memory as a JSONL fine-tuning dataset.
//!
//! Usage:
//!   cargo run --bin export-dataset                    # writes data/dataset.jsonl
//!   cargo run --bin export-dataset -- out/pairs.jsonl # custom output path
//!
//! Required environment variables:
//! - DATABASE_URL
//!
//! One line per memory row, most recently used first:
//! `{"source_text": "...", "target_text": "..."}`

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use termguard::store::PgStore;
use tracing::info;

const DEFAULT_OUTPUT: &str = "data/dataset.jsonl";

#[derive(Debug, Serialize)]
struct DatasetLine<'a> {
    source_text: &'a str,
    target_text: &'a str,
}

fn to_jsonl(pairs: &[(String, String)]) -> Result<String> {
    let lines = pairs
        .iter()
        .map(|(source_text, target_text)| {
            serde_json::to_string(&DatasetLine {
                source_text,
                target_text,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .context("failed to serialize dataset line")?;
    Ok(lines.join("\n"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("termguard=info".parse()?)
                .add_directive("export_dataset=info".parse()?),
        )
        .init();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    let output: PathBuf = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    let store = PgStore::connect(&database_url)
        .await
        .context("failed to connect to database")?;
    let pairs = store
        .list_memory_pairs()
        .await
        .context("failed to read translation memory")?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&output, to_jsonl(&pairs)?)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(path = %output.display(), pairs = pairs.len(), "Dataset exported");
    Ok(())
}
