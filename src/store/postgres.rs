use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use super::{
    BlacklistEntry, GlossaryEntry, LogRecord, MemoryEntry, MemoryUpsert, ScopeFilter, Store,
};
use crate::error::StoreError;
use crate::memory::{APPROVAL_BASE_QUALITY, APPROVAL_QUALITY_STEP};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS translation_memory (
        id BIGSERIAL PRIMARY KEY,
        source_norm TEXT NOT NULL,
        target_text TEXT NOT NULL,
        src_lang TEXT NOT NULL DEFAULT '',
        tgt_lang TEXT NOT NULL DEFAULT '',
        uses INTEGER NOT NULL DEFAULT 1,
        quality DOUBLE PRECISION NOT NULL DEFAULT 0.92,
        last_used_at TIMESTAMPTZ,
        game TEXT NOT NULL DEFAULT '',
        mod_name TEXT NOT NULL DEFAULT '',
        UNIQUE (source_norm, src_lang, tgt_lang, game, mod_name)
    )",
    "CREATE TABLE IF NOT EXISTS glossary (
        id BIGSERIAL PRIMARY KEY,
        term_source TEXT NOT NULL,
        term_target TEXT NOT NULL,
        notes TEXT,
        approved BOOLEAN NOT NULL DEFAULT FALSE,
        game TEXT,
        mod_name TEXT
    )",
    "CREATE TABLE IF NOT EXISTS blacklist (
        id BIGSERIAL PRIMARY KEY,
        term TEXT NOT NULL,
        notes TEXT,
        game TEXT,
        mod_name TEXT
    )",
    "CREATE TABLE IF NOT EXISTS translation_logs (
        id BIGSERIAL PRIMARY KEY,
        source_text TEXT NOT NULL,
        target_text TEXT NOT NULL,
        engine TEXT NOT NULL,
        origin TEXT NOT NULL,
        game TEXT,
        mod_name TEXT,
        batch_pos INTEGER,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
];

const MEMORY_COLUMNS: &str = "source_norm, target_text, src_lang, tgt_lang, uses, quality, \
     last_used_at, NULLIF(game, '') AS game, NULLIF(mod_name, '') AS mod_name";

/// PostgreSQL-backed store.
///
/// The memory table stores absent scope values as empty strings so the
/// unique key covers unscoped rows; reads map them back to `None`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and make sure the tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected to PostgreSQL store");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Every stored (source, target) pair with a non-empty target, most
    /// recently used first.
    pub async fn list_memory_pairs(&self) -> Result<Vec<(String, String)>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT source_norm, target_text FROM translation_memory
             WHERE target_text <> ''
             ORDER BY last_used_at DESC NULLS LAST, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn column_value(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

#[async_trait]
impl Store for PgStore {
    async fn find_tm_candidates(
        &self,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM translation_memory
             WHERE (src_lang = '' OR src_lang = $1)
               AND (tgt_lang = '' OR tgt_lang = $2)
               AND ($3::TEXT IS NULL OR game = '' OR game = $3)
               AND ($4::TEXT IS NULL OR mod_name = '' OR mod_name = $4)
             ORDER BY quality DESC, uses DESC, last_used_at DESC NULLS LAST
             LIMIT $5",
            MEMORY_COLUMNS
        );
        let rows = sqlx::query_as::<_, MemoryEntry>(&sql)
            .bind(&filter.src_lang)
            .bind(&filter.tgt_lang)
            .bind(filter.scope.game.as_deref())
            .bind(filter.scope.mod_name.as_deref())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_tm_by_sources(
        &self,
        filter: &ScopeFilter,
        sources: &[String],
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM translation_memory
             WHERE source_norm = ANY($1)
               AND (src_lang = '' OR src_lang = $2)
               AND (tgt_lang = '' OR tgt_lang = $3)
               AND ($4::TEXT IS NULL OR game = '' OR game = $4)
               AND ($5::TEXT IS NULL OR mod_name = '' OR mod_name = $5)
             ORDER BY quality DESC, uses DESC",
            MEMORY_COLUMNS
        );
        let rows = sqlx::query_as::<_, MemoryEntry>(&sql)
            .bind(sources)
            .bind(&filter.src_lang)
            .bind(&filter.tgt_lang)
            .bind(filter.scope.game.as_deref())
            .bind(filter.scope.mod_name.as_deref())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_glossary(&self, filter: &ScopeFilter) -> Result<Vec<GlossaryEntry>, StoreError> {
        let rows = sqlx::query_as::<_, GlossaryEntry>(
            "SELECT term_source, term_target, notes, approved, game, mod_name FROM glossary
             WHERE approved
               AND ($1::TEXT IS NULL OR game IS NULL OR game = '' OR game = $1)
               AND ($2::TEXT IS NULL OR mod_name IS NULL OR mod_name = '' OR mod_name = $2)
             ORDER BY term_source",
        )
        .bind(filter.scope.game.as_deref())
        .bind(filter.scope.mod_name.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_blacklist(
        &self,
        filter: &ScopeFilter,
    ) -> Result<Vec<BlacklistEntry>, StoreError> {
        let rows = sqlx::query_as::<_, BlacklistEntry>(
            "SELECT term, notes, game, mod_name FROM blacklist
             WHERE ($1::TEXT IS NULL OR game IS NULL OR game = '' OR game = $1)
               AND ($2::TEXT IS NULL OR mod_name IS NULL OR mod_name = '' OR mod_name = $2)
             ORDER BY id",
        )
        .bind(filter.scope.game.as_deref())
        .bind(filter.scope.mod_name.as_deref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_memory_entry(&self, upsert: MemoryUpsert) -> Result<MemoryEntry, StoreError> {
        // Single statement, so concurrent approvals of one key serialize on
        // the unique index instead of racing a read-then-write.
        let sql = format!(
            "INSERT INTO translation_memory
                (source_norm, target_text, src_lang, tgt_lang, uses, quality, last_used_at, game, mod_name)
             VALUES ($1, $2, $3, $4, 1, $5, NOW(), $6, $7)
             ON CONFLICT (source_norm, src_lang, tgt_lang, game, mod_name) DO UPDATE SET
                quality = CASE
                    WHEN translation_memory.target_text <> EXCLUDED.target_text THEN $5
                    ELSE LEAST(1.0, translation_memory.quality + $8)
                END,
                target_text = EXCLUDED.target_text,
                uses = translation_memory.uses + 1,
                last_used_at = NOW()
             RETURNING {}",
            MEMORY_COLUMNS
        );
        let row = sqlx::query_as::<_, MemoryEntry>(&sql)
            .bind(&upsert.source_norm)
            .bind(&upsert.target_text)
            .bind(&upsert.src_lang)
            .bind(&upsert.tgt_lang)
            .bind(APPROVAL_BASE_QUALITY)
            .bind(column_value(&upsert.scope.game))
            .bind(column_value(&upsert.scope.mod_name))
            .bind(APPROVAL_QUALITY_STEP)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_log(&self, record: LogRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO translation_logs
                (source_text, target_text, engine, origin, game, mod_name, batch_pos, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&record.source_text)
        .bind(&record.target_text)
        .bind(record.engine.as_str())
        .bind(&record.origin)
        .bind(record.scope.game.as_deref())
        .bind(record.scope.mod_name.as_deref())
        .bind(record.batch_pos)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
