//! Translation orchestrator.
//!
//! Ties the catalog, the memory policy, the backend and the post-editing
//! passes together for the three caller-facing operations:
//!
//! - [`Translator::translate`]: one text, memory first, live call on a miss
//! - [`Translator::approve`]: record a confirmed translation in memory
//! - [`Translator::translate_batch`]: a multi-item chat-completion payload
//!
//! Once input validation passes, translate and batch always produce a
//! result. Backend and store failures degrade the answer and are logged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{MeteredBackend, TranslateCall, TranslationBackend};
use crate::config::Config;
use crate::error::{ApprovalError, BackendError, ValidationError};
use crate::memory::{
    normalize_toggle_words, PromotionConfig, PromotionKind, PromotionPolicy, ToggleVocabulary,
};
use crate::metrics::EngineMetrics;
use crate::segmenter::{
    same_structure, translate_text_preserving_structure, BatchLayout, MarkedLines, SegmentMemo,
};
use crate::store::{
    BlacklistEntry, Engine, GlossaryEntry, LogRecord, MemoryEntry, MemoryUpsert, Scope,
    ScopeFilter, Store,
};
use crate::suggest::{rank_suggestions, top_k_examples, Candidate, Shot, DEFAULT_TOP_N};
use crate::text::{
    apply_case_like, apply_glossary_hard_replace, extract_all_caps_terms, is_only_blacklist,
    normalize, pick_blacklist_matches, pick_glossary_matches,
    project_glossary_case_in_sentence, replace_word_unicode,
};

/// Context shots sent with a single translate request.
const SINGLE_REQUEST_SHOTS: usize = 5;
/// Context shots taken per batch item, and the cap across the whole batch.
const BATCH_SHOTS_PER_ITEM: usize = 2;
const BATCH_MAX_SHOTS: usize = 5;

const SHORT_LINE_MAX_CHARS: usize = 32;
const SHORT_LINE_MAX_WORDS: usize = 4;

const DEFAULT_ORIGIN: &str = "api";
const BATCH_ORIGIN: &str = "xtranslator";

/// Per-deployment knobs of the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorSettings {
    pub default_src_lang: String,
    pub default_tgt_lang: String,
    pub tm_pool_limit: usize,
    pub promotion: PromotionConfig,
    pub toggle_vocabulary: ToggleVocabulary,
}

impl TranslatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_src_lang: config.default_src_lang.clone(),
            default_tgt_lang: config.default_tgt_lang.clone(),
            tm_pool_limit: config.tm_pool_limit,
            promotion: config.promotion.clone(),
            toggle_vocabulary: ToggleVocabulary::default(),
        }
    }
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            default_src_lang: "en".to_string(),
            default_tgt_lang: "pt-BR".to_string(),
            tm_pool_limit: 500,
            promotion: PromotionConfig::default(),
            toggle_vocabulary: ToggleVocabulary::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Body of `POST /api/translate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateRequest {
    #[serde(default)]
    pub text: String,
    pub src: Option<String>,
    pub tgt: Option<String>,
    pub game: Option<String>,
    #[serde(rename = "mod")]
    pub mod_name: Option<String>,
    /// Translate line by line, keeping markup and blank lines.
    #[serde(default = "default_true")]
    pub preserve_lines: bool,
    /// Write a log row for this request.
    #[serde(default = "default_true")]
    pub log: bool,
    pub origin: Option<String>,
}

impl TranslateRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            src: None,
            tgt: None,
            game: None,
            mod_name: None,
            preserve_lines: true,
            log: true,
            origin: None,
        }
    }

    pub fn with_scope(mut self, game: Option<&str>, mod_name: Option<&str>) -> Self {
        self.game = game.map(str::to_string);
        self.mod_name = mod_name.map(str::to_string);
        self
    }
}

/// Terms found in the request text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchedTerms {
    pub glossary: Vec<GlossaryEntry>,
    pub blacklist: Vec<BlacklistEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslateResponse {
    pub best: String,
    pub candidates: Vec<Candidate>,
    pub matched: MatchedTerms,
    /// What produced `best`; not part of the wire format.
    #[serde(skip)]
    pub engine: Engine,
}

/// Body of `POST /api/translate/approve`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub source_text: String,
    #[serde(default)]
    pub target_text: String,
    pub src_lang: Option<String>,
    pub tgt_lang: Option<String>,
    pub game: Option<String>,
    #[serde(rename = "mod")]
    pub mod_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchMetadata {
    pub game: Option<String>,
    #[serde(rename = "mod")]
    pub mod_name: Option<String>,
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub src: Option<String>,
    pub tgt: Option<String>,
    #[serde(default)]
    pub metadata: BatchMetadata,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    fn new(model: String, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: format!("xtranslator-{}", now.timestamp_millis()),
            object: "chat.completion".to_string(),
            created: now.timestamp(),
            model,
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content,
                },
                finish_reason: "stop".to_string(),
            }],
        }
    }

    /// Content of the first choice.
    pub fn content(&self) -> &str {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default()
    }
}

/// Catalog rows visible to one request.
#[derive(Debug, Default)]
struct Catalog {
    pool: Vec<MemoryEntry>,
    glossary: Vec<GlossaryEntry>,
    blacklist: Vec<BlacklistEntry>,
}

/// One decoded batch item.
struct BatchItem {
    text: String,
    lines: MarkedLines,
}

impl BatchItem {
    fn decode(raw: &str) -> Self {
        let lines = MarkedLines::decode(&raw.replace("\r\n", "\n"));
        Self {
            text: lines.text.clone(),
            lines,
        }
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn encode(&self, translated: &str) -> String {
        self.lines.encode(translated)
    }
}

/// The post-editing chain shared by every result of one request.
///
/// All-caps term translations are memoized so a batch asks the backend for
/// each term once.
struct PostEditor<'a> {
    backend: &'a dyn TranslationBackend,
    template: &'a TranslateCall,
    vocabulary: &'a ToggleVocabulary,
    glossary: &'a [GlossaryEntry],
    blacklist: &'a [BlacklistEntry],
    pairs: Vec<(&'a str, &'a str)>,
    caps: HashMap<String, Option<String>>,
}

impl<'a> PostEditor<'a> {
    fn project_case(&self, original: &str, text: &str) -> String {
        project_glossary_case_in_sentence(original, text, &self.pairs)
    }

    async fn apply(&mut self, original: &str, draft: &str) -> String {
        if draft.is_empty() {
            return String::new();
        }
        let out = normalize_toggle_words(draft, self.vocabulary);
        let out = apply_glossary_hard_replace(&out, self.glossary, self.blacklist);
        let out = self.project_case(original, &out);
        self.reinforce_all_caps(original, out).await
    }

    /// Translate every ALL-CAPS word of `original` alone and force the
    /// upper-cased translation back into `out`.
    async fn reinforce_all_caps(&mut self, original: &str, mut out: String) -> String {
        for term in extract_all_caps_terms(original) {
            let translated = match self.caps.get(&term) {
                Some(hit) => hit.clone(),
                None => {
                    let fresh = self.translate_term(&term).await;
                    self.caps.insert(term.clone(), fresh.clone());
                    fresh
                }
            };
            let Some(translated) = translated else {
                continue;
            };
            out = replace_word_unicode(&out, &translated, &apply_case_like(&term, &translated));
        }
        out
    }

    async fn translate_term(&self, term: &str) -> Option<String> {
        match self.backend.translate(&self.template.with_text(term)).await {
            Ok(raw) => raw
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string),
            Err(e) => {
                debug!(term, error = %e, "All-caps term translation failed");
                None
            }
        }
    }
}

/// Glossary pairs plus memory pairs whose source occurs in `source`.
fn projection_pairs<'a>(
    source: &str,
    glossary: &'a [GlossaryEntry],
    pool: &'a [MemoryEntry],
) -> Vec<(&'a str, &'a str)> {
    let source_norm = normalize(source);
    glossary
        .iter()
        .map(|g| (g.term_source.as_str(), g.term_target.as_str()))
        .chain(
            pool.iter()
                .filter(|e| !e.source_norm.is_empty() && source_norm.contains(&e.source_norm))
                .map(|e| (e.source_norm.as_str(), e.target_text.as_str())),
        )
        .collect()
}

fn is_short_single_line(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.contains('\n')
        && (trimmed.chars().count() <= SHORT_LINE_MAX_CHARS
            || trimmed.split_whitespace().count() <= SHORT_LINE_MAX_WORDS)
}

/// Drop a leading or trailing line break the backend added around an item.
fn trim_added_line_breaks(candidate: &str, original: &str) -> String {
    let mut value = candidate.replace("\r\n", "\n");
    if !original.starts_with('\n') && value.starts_with('\n') {
        value.remove(0);
    }
    if !original.ends_with('\n') && value.ends_with('\n') {
        value.pop();
    }
    value
}

/// Highest quality row per normalized source, ties broken by uses.
fn best_rows_by_source(pool: &[MemoryEntry]) -> HashMap<&str, &MemoryEntry> {
    let mut best: HashMap<&str, &MemoryEntry> = HashMap::new();
    for row in pool.iter().filter(|r| !r.source_norm.is_empty()) {
        best.entry(row.source_norm.as_str())
            .and_modify(|current| {
                if row.quality > current.quality
                    || (row.quality == current.quality && row.uses > current.uses)
                {
                    *current = row;
                }
            })
            .or_insert(row);
    }
    best
}

/// Distinct context shots across all batch items.
fn batch_shots(items: &[BatchItem], pool: &[MemoryEntry]) -> Vec<Shot> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut shots = Vec::new();
    for item in items.iter().filter(|i| !i.is_blank()) {
        for shot in top_k_examples(&item.text, pool, BATCH_SHOTS_PER_ITEM) {
            if shot.src.is_empty() || shot.tgt.is_empty() {
                continue;
            }
            if seen.insert((normalize(&shot.src), normalize(&shot.tgt))) {
                shots.push(shot);
                if shots.len() >= BATCH_MAX_SHOTS {
                    return shots;
                }
            }
        }
    }
    shots
}

fn lang_or(requested: Option<&str>, default: &str) -> String {
    requested
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(default)
        .to_string()
}

pub struct Translator {
    store: Arc<dyn Store>,
    backend: Arc<dyn TranslationBackend>,
    policy: PromotionPolicy,
    settings: TranslatorSettings,
}

impl Translator {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn TranslationBackend>,
        settings: TranslatorSettings,
    ) -> Self {
        let policy =
            PromotionPolicy::new(settings.promotion.clone(), settings.toggle_vocabulary.clone());
        Self {
            store,
            backend: Arc::new(MeteredBackend::new(backend)),
            policy,
            settings,
        }
    }

    /// Replace the promotion policy, e.g. to register more state patches.
    pub fn with_policy(mut self, policy: PromotionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    /// Memory rows keyed by the normalized text of every non-blank batch
    /// item, read without the candidate pool cap.
    async fn load_exact_rows(&self, filter: &ScopeFilter, items: &[BatchItem]) -> Vec<MemoryEntry> {
        let mut sources: Vec<String> = items
            .iter()
            .filter(|i| !i.is_blank())
            .map(|i| normalize(&i.text))
            .filter(|n| !n.is_empty())
            .collect();
        sources.sort();
        sources.dedup();

        self.store
            .find_tm_by_sources(filter, &sources)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Batch memory lookup failed, continuing without memory");
                Vec::new()
            })
    }

    /// Read memory, glossary and blacklist rows together. A failed read
    /// degrades to an empty list.
    async fn load_catalog(&self, filter: &ScopeFilter) -> Catalog {
        let (pool, glossary, blacklist) = tokio::join!(
            self.store.find_tm_candidates(filter, self.settings.tm_pool_limit),
            self.store.find_glossary(filter),
            self.store.find_blacklist(filter),
        );

        Catalog {
            pool: pool.unwrap_or_else(|e| {
                warn!(error = %e, "Memory lookup failed, continuing without memory");
                Vec::new()
            }),
            glossary: glossary.unwrap_or_else(|e| {
                warn!(error = %e, "Glossary lookup failed, continuing without glossary");
                Vec::new()
            }),
            blacklist: blacklist.unwrap_or_else(|e| {
                warn!(error = %e, "Blacklist lookup failed, continuing without blacklist");
                Vec::new()
            }),
        }
    }

    async fn write_log(&self, record: LogRecord) {
        if let Err(e) = self.store.insert_log(record).await {
            warn!(error = %e, "Failed to write translation log");
        }
    }

    /// The live backend call for a memory miss.
    async fn live_translate(
        &self,
        text: &str,
        template: &TranslateCall,
        preserve_lines: bool,
    ) -> Result<String, BackendError> {
        let short = is_short_single_line(text);
        if short || !preserve_lines {
            let out = self.backend.translate(template).await?;
            let out = out.replace("\r\n", "\n").trim().to_string();
            if out.is_empty() {
                return Err(BackendError::Empty("backend"));
            }
            if short && out.contains('\n') {
                return Err(BackendError::MultiLine(out.lines().count()));
            }
            return Ok(out);
        }

        let mut memo = SegmentMemo::new();
        Ok(translate_text_preserving_structure(text, template, self.backend.as_ref(), &mut memo).await)
    }

    /// Translate one text.
    pub async fn translate(
        &self,
        request: TranslateRequest,
    ) -> Result<TranslateResponse, ValidationError> {
        if request.text.trim().is_empty() {
            return Err(ValidationError::MissingField("text"));
        }

        let metrics = EngineMetrics::global();
        let text = request.text.as_str();
        let src_lang = lang_or(request.src.as_deref(), &self.settings.default_src_lang);
        let tgt_lang = lang_or(request.tgt.as_deref(), &self.settings.default_tgt_lang);
        let scope = Scope::new(request.game.as_deref(), request.mod_name.as_deref());
        let filter = ScopeFilter::new(&src_lang, &tgt_lang, scope.clone());

        let catalog = self.load_catalog(&filter).await;
        let suggestions = rank_suggestions(text, &catalog.pool, &catalog.glossary, DEFAULT_TOP_N);
        let matched = MatchedTerms {
            glossary: pick_glossary_matches(text, &catalog.glossary),
            blacklist: pick_blacklist_matches(text, &catalog.blacklist),
        };

        let origin = request
            .origin
            .clone()
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let log_record = |best: &str, engine: Engine| LogRecord {
            source_text: text.to_string(),
            target_text: best.to_string(),
            engine,
            origin: origin.clone(),
            scope: scope.clone(),
            batch_pos: None,
            created_at: Utc::now(),
        };

        if is_only_blacklist(text, &catalog.blacklist) {
            metrics.record_blacklist_only();
            info!(chars = text.chars().count(), "Text is blacklisted terms only, returning it unchanged");
            if request.log {
                self.write_log(log_record(text, Engine::Source)).await;
            }
            return Ok(TranslateResponse {
                best: text.to_string(),
                candidates: Vec::new(),
                matched,
                engine: Engine::Source,
            });
        }

        let template = TranslateCall {
            text: text.to_string(),
            src_lang,
            tgt_lang,
            shots: top_k_examples(text, &catalog.pool, SINGLE_REQUEST_SHOTS),
            glossary: matched.glossary.clone(),
            no_translate: matched.blacklist.clone(),
        };

        let (draft, engine) = match self.policy.promote(text, &catalog.pool) {
            Some(promotion) => {
                match promotion.kind {
                    PromotionKind::Exact => metrics.record_exact_hit(),
                    PromotionKind::Fuzzy => metrics.record_fuzzy_hit(),
                }
                info!(
                    kind = ?promotion.kind,
                    score = promotion.score,
                    patched = promotion.patched,
                    "Answered from translation memory"
                );
                (promotion.translation, Engine::Tm)
            }
            None => {
                metrics.record_tm_miss();
                match self.live_translate(text, &template, request.preserve_lines).await {
                    Ok(out) => (out, Engine::Ai),
                    Err(e) => {
                        metrics.record_fallback();
                        warn!(
                            error = %e,
                            suggestions = suggestions.len(),
                            "Live translation failed, falling back to best suggestion"
                        );
                        let fallback = suggestions
                            .first()
                            .map(|c| c.text.clone())
                            .unwrap_or_default();
                        (fallback, Engine::Fallback)
                    }
                }
            }
        };

        let mut editor = PostEditor {
            backend: self.backend.as_ref(),
            template: &template,
            vocabulary: &self.settings.toggle_vocabulary,
            glossary: &matched.glossary,
            blacklist: &matched.blacklist,
            pairs: projection_pairs(text, &matched.glossary, &catalog.pool),
            caps: HashMap::new(),
        };
        let best = editor.apply(text, &draft).await;
        let candidates: Vec<Candidate> = suggestions
            .into_iter()
            .map(|c| Candidate {
                text: editor.project_case(text, &c.text),
                ..c
            })
            .collect();
        drop(editor);

        debug!(engine = engine.as_str(), candidates = candidates.len(), "Translation ready");
        if request.log {
            self.write_log(log_record(&best, engine)).await;
        }

        Ok(TranslateResponse {
            best,
            candidates,
            matched,
            engine,
        })
    }

    /// Record a confirmed translation as the authoritative memory row.
    pub async fn approve(&self, request: ApproveRequest) -> Result<MemoryEntry, ApprovalError> {
        if request.source_text.trim().is_empty() {
            return Err(ValidationError::MissingField("source_text").into());
        }
        if request.target_text.trim().is_empty() {
            return Err(ValidationError::MissingField("target_text").into());
        }

        let upsert = MemoryUpsert {
            source_norm: normalize(&request.source_text),
            target_text: request.target_text.clone(),
            src_lang: lang_or(request.src_lang.as_deref(), &self.settings.default_src_lang),
            tgt_lang: lang_or(request.tgt_lang.as_deref(), &self.settings.default_tgt_lang),
            scope: Scope::new(request.game.as_deref(), request.mod_name.as_deref()),
        };

        let entry = self.store.upsert_memory_entry(upsert).await?;
        info!(
            uses = entry.uses,
            quality = entry.quality,
            "Approval recorded"
        );
        Ok(entry)
    }

    /// Translate a chat-completion batch payload item by item, keeping the
    /// separator layout intact.
    pub async fn translate_batch(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ValidationError> {
        let content = request
            .messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.replace("\r\n", "\n"))
            .filter(|c| !c.trim().is_empty())
            .ok_or(ValidationError::MissingMessage)?;
        let payload = content.split_once('\n').map(|(_, rest)| rest).unwrap_or_default();
        if payload.trim().is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let metrics = EngineMetrics::global();
        let src_lang = lang_or(request.src.as_deref(), &self.settings.default_src_lang);
        let tgt_lang = lang_or(request.tgt.as_deref(), &self.settings.default_tgt_lang);
        let scope = Scope::new(
            request.metadata.game.as_deref(),
            request.metadata.mod_name.as_deref(),
        );
        let filter = ScopeFilter::new(&src_lang, &tgt_lang, scope.clone());

        let layout = BatchLayout::split(payload);
        let items: Vec<BatchItem> = layout.items.iter().map(|raw| BatchItem::decode(raw)).collect();
        let aggregated = items
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n\n");

        let (catalog, exact_rows) =
            tokio::join!(self.load_catalog(&filter), self.load_exact_rows(&filter, &items));
        let best_rows = best_rows_by_source(&exact_rows);
        let matched_glossary = pick_glossary_matches(&aggregated, &catalog.glossary);
        let matched_blacklist = pick_blacklist_matches(&aggregated, &catalog.blacklist);

        let template = TranslateCall {
            text: String::new(),
            src_lang,
            tgt_lang,
            shots: batch_shots(&items, &catalog.pool),
            glossary: matched_glossary.clone(),
            no_translate: matched_blacklist.clone(),
        };
        info!(
            items = items.len(),
            shots = template.shots.len(),
            glossary = matched_glossary.len(),
            blacklist = matched_blacklist.len(),
            "Translating batch"
        );

        let mut editor = PostEditor {
            backend: self.backend.as_ref(),
            template: &template,
            vocabulary: &self.settings.toggle_vocabulary,
            glossary: &matched_glossary,
            blacklist: &matched_blacklist,
            pairs: projection_pairs(&aggregated, &matched_glossary, &catalog.pool),
            caps: HashMap::new(),
        };
        let mut memo = SegmentMemo::new();
        let mut outputs: Vec<String> = Vec::with_capacity(items.len());
        let mut engines: Vec<Option<Engine>> = Vec::with_capacity(items.len());

        for (position, item) in items.iter().enumerate() {
            if item.is_blank() {
                outputs.push(item.text.clone());
                engines.push(None);
                continue;
            }

            if let Some(row) = best_rows.get(normalize(&item.text).as_str()) {
                metrics.record_exact_hit();
                let projected = apply_case_like(&item.text, &row.target_text);
                outputs.push(editor.apply(&item.text, &projected).await);
                engines.push(Some(Engine::Tm));
                continue;
            }

            metrics.record_tm_miss();
            let translated = translate_text_preserving_structure(
                &item.text,
                &template,
                self.backend.as_ref(),
                &mut memo,
            )
            .await;
            let cleaned = trim_added_line_breaks(&translated, &item.text);

            let mut accepted = None;
            if !cleaned.is_empty() && same_structure(&item.text, &cleaned) {
                let processed = editor.apply(&item.text, &cleaned).await;
                if !processed.is_empty() && same_structure(&item.text, &processed) {
                    accepted = Some(processed);
                }
            }

            match accepted {
                Some(out) => {
                    outputs.push(out);
                    engines.push(Some(Engine::Ai));
                }
                None => {
                    warn!(position, "Batch item changed shape, keeping original text");
                    outputs.push(item.text.clone());
                    engines.push(Some(Engine::Source));
                }
            }
        }
        drop(editor);

        let encoded: Vec<String> = items
            .iter()
            .zip(&outputs)
            .map(|(item, out)| item.encode(out))
            .collect();

        for (position, engine) in engines.iter().enumerate() {
            let Some(engine) = engine else {
                continue;
            };
            self.write_log(LogRecord {
                source_text: layout.items[position].clone(),
                target_text: encoded[position].clone(),
                engine: *engine,
                origin: BATCH_ORIGIN.to_string(),
                scope: scope.clone(),
                batch_pos: i32::try_from(position).ok(),
                created_at: Utc::now(),
            })
            .await;
        }

        let content = layout.compose(&encoded);
        Ok(ChatCompletionResponse::new(
            request.model.unwrap_or_default(),
            content,
        ))
    }
}
