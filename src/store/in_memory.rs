use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    BlacklistEntry, GlossaryEntry, LogRecord, MemoryEntry, MemoryUpsert, ScopeFilter, Store,
};
use crate::error::StoreError;
use crate::memory::merge_approval;

#[derive(Default)]
struct Inner {
    memory: Vec<MemoryEntry>,
    glossary: Vec<GlossaryEntry>,
    blacklist: Vec<BlacklistEntry>,
    logs: Vec<LogRecord>,
}

/// Process-local store used when no database is configured, and by tests.
///
/// Memory rows keep insertion order; the approval key is exact, so two
/// scopes never share a row.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_glossary(&self, entry: GlossaryEntry) {
        self.lock().glossary.push(entry);
    }

    pub fn add_blacklist(&self, entry: BlacklistEntry) {
        self.lock().blacklist.push(entry);
    }

    /// Insert a memory row as-is, bypassing the approval merge.
    pub fn seed_memory(&self, entry: MemoryEntry) {
        self.lock().memory.push(entry);
    }

    pub fn memory_entries(&self) -> Vec<MemoryEntry> {
        self.lock().memory.clone()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.lock().logs.clone()
    }
}

fn same_key(entry: &MemoryEntry, upsert: &MemoryUpsert) -> bool {
    entry.source_norm == upsert.source_norm
        && entry.src_lang == upsert.src_lang
        && entry.tgt_lang == upsert.tgt_lang
        && entry.game == upsert.scope.game
        && entry.mod_name == upsert.scope.mod_name
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_tm_candidates(
        &self,
        filter: &ScopeFilter,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        Ok(self
            .lock()
            .memory
            .iter()
            .filter(|e| filter.matches_memory(e))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_tm_by_sources(
        &self,
        filter: &ScopeFilter,
        sources: &[String],
    ) -> Result<Vec<MemoryEntry>, StoreError> {
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        let wanted: HashSet<&str> = sources.iter().map(String::as_str).collect();
        Ok(self
            .lock()
            .memory
            .iter()
            .filter(|e| wanted.contains(e.source_norm.as_str()) && filter.matches_memory(e))
            .cloned()
            .collect())
    }

    async fn find_glossary(&self, filter: &ScopeFilter) -> Result<Vec<GlossaryEntry>, StoreError> {
        let mut rows: Vec<GlossaryEntry> = self
            .lock()
            .glossary
            .iter()
            .filter(|g| g.approved && filter.matches_scope(&g.game, &g.mod_name))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.term_source.cmp(&b.term_source));
        Ok(rows)
    }

    async fn find_blacklist(
        &self,
        filter: &ScopeFilter,
    ) -> Result<Vec<BlacklistEntry>, StoreError> {
        Ok(self
            .lock()
            .blacklist
            .iter()
            .filter(|b| filter.matches_scope(&b.game, &b.mod_name))
            .cloned()
            .collect())
    }

    async fn upsert_memory_entry(&self, upsert: MemoryUpsert) -> Result<MemoryEntry, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        match inner.memory.iter().position(|e| same_key(e, &upsert)) {
            Some(idx) => {
                let merged = merge_approval(Some(&inner.memory[idx]), &upsert, now);
                inner.memory[idx] = merged.clone();
                Ok(merged)
            }
            None => {
                let created = merge_approval(None, &upsert, now);
                inner.memory.push(created.clone());
                Ok(created)
            }
        }
    }

    async fn insert_log(&self, record: LogRecord) -> Result<(), StoreError> {
        self.lock().logs.push(record);
        Ok(())
    }
}
