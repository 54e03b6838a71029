//! Catalog rows and the storage collaborator.
//!
//! The engine only reads memory, glossary and blacklist rows in bulk and
//! emits two kinds of writes: a memory upsert and a log row. Keeping one
//! authoritative memory row per (source, languages, scope) is the store's
//! job, done with a conditional upsert rather than in-process locking.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Optional (game, mod) pair narrowing which catalog rows apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub game: Option<String>,
    #[serde(rename = "mod")]
    pub mod_name: Option<String>,
}

impl Scope {
    /// Build a scope, treating blank strings as absent.
    pub fn new(game: Option<&str>, mod_name: Option<&str>) -> Self {
        Self {
            game: non_blank(game),
            mod_name: non_blank(mod_name),
        }
    }

    pub fn unscoped() -> Self {
        Self::default()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A previously confirmed source to target pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub source_norm: String,
    pub target_text: String,
    pub src_lang: String,
    pub tgt_lang: String,
    pub uses: i32,
    pub quality: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub game: Option<String>,
    #[serde(rename = "mod")]
    pub mod_name: Option<String>,
}

impl MemoryEntry {
    pub fn scope(&self) -> Scope {
        Scope {
            game: self.game.clone(),
            mod_name: self.mod_name.clone(),
        }
    }
}

/// Fixed terminology translation. Only approved rows are ever matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GlossaryEntry {
    pub term_source: String,
    pub term_target: String,
    pub notes: Option<String>,
    pub approved: bool,
    pub game: Option<String>,
    #[serde(rename = "mod")]
    pub mod_name: Option<String>,
}

/// A term that must never be translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlacklistEntry {
    pub term: String,
    pub notes: Option<String>,
    #[serde(skip_serializing)]
    pub game: Option<String>,
    #[serde(skip_serializing, rename = "mod")]
    pub mod_name: Option<String>,
}

/// Which rows a request may see.
///
/// A row matches when its languages equal the requested ones or are empty,
/// and, for each requested scope dimension, the row's value is equal or
/// absent. An absent request dimension matches every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFilter {
    pub src_lang: String,
    pub tgt_lang: String,
    pub scope: Scope,
}

impl ScopeFilter {
    pub fn new(src_lang: &str, tgt_lang: &str, scope: Scope) -> Self {
        Self {
            src_lang: src_lang.trim().to_string(),
            tgt_lang: tgt_lang.trim().to_string(),
            scope,
        }
    }

    fn dimension_matches(requested: &Option<String>, row: &Option<String>) -> bool {
        match (requested, row) {
            (None, _) | (Some(_), None) => true,
            (Some(want), Some(have)) => have.is_empty() || want == have,
        }
    }

    pub fn matches_scope(&self, game: &Option<String>, mod_name: &Option<String>) -> bool {
        Self::dimension_matches(&self.scope.game, game)
            && Self::dimension_matches(&self.scope.mod_name, mod_name)
    }

    pub fn matches_memory(&self, entry: &MemoryEntry) -> bool {
        (entry.src_lang.is_empty() || entry.src_lang == self.src_lang)
            && (entry.tgt_lang.is_empty() || entry.tgt_lang == self.tgt_lang)
            && self.matches_scope(&entry.game, &entry.mod_name)
    }
}

/// Write instruction for an approved translation.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryUpsert {
    pub source_norm: String,
    pub target_text: String,
    pub src_lang: String,
    pub tgt_lang: String,
    pub scope: Scope,
}

/// What produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Translation memory, exact or fuzzy.
    Tm,
    /// Live backend call.
    Ai,
    /// Original text kept (blacklist-only input or rejected batch item).
    Source,
    /// Best precomputed suggestion after a backend failure.
    Fallback,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Tm => "tm",
            Engine::Ai => "ai",
            Engine::Source => "source",
            Engine::Fallback => "fallback",
        }
    }
}

/// Write instruction for a translation log row.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub source_text: String,
    pub target_text: String,
    pub engine: Engine,
    pub origin: String,
    pub scope: Scope,
    pub batch_pos: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Storage collaborator.
#[async_trait]
pub trait Store: Send + Sync {
    /// Memory rows visible to `filter`, at most `limit` of them.
    async fn find_tm_candidates(
        &self,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, StoreError>;

    /// Every memory row visible to `filter` whose normalized source is one
    /// of `sources`. Not capped.
    async fn find_tm_by_sources(
        &self,
        filter: &ScopeFilter,
        sources: &[String],
    ) -> Result<Vec<MemoryEntry>, StoreError>;

    /// Approved glossary rows visible to `filter`, ordered by source term.
    async fn find_glossary(&self, filter: &ScopeFilter) -> Result<Vec<GlossaryEntry>, StoreError>;

    /// Blacklist rows visible to `filter`.
    async fn find_blacklist(&self, filter: &ScopeFilter)
        -> Result<Vec<BlacklistEntry>, StoreError>;

    /// Insert or merge the authoritative memory row for the upsert's key.
    async fn upsert_memory_entry(&self, upsert: MemoryUpsert) -> Result<MemoryEntry, StoreError>;

    async fn insert_log(&self, record: LogRecord) -> Result<(), StoreError>;
}
