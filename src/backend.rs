//! Translation backend.
//!
//! The engine treats machine translation as one fallible call. The HTTP
//! implementation talks to the MT service and falls back to a local Ollama
//! model when the service fails or only echoes its input. Do-not-translate
//! terms are masked before anything leaves the process.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BackendError;
use crate::metrics::EngineMetrics;
use crate::retry::{with_retry_if, RetryConfig};
use crate::store::{BlacklistEntry, GlossaryEntry};
use crate::suggest::Shot;
use crate::text::{normalize, TermMatcher};

static MASK_TOKEN_REGEX: OnceLock<Regex> = OnceLock::new();

/// One translation request as seen by a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslateCall {
    pub text: String,
    pub src_lang: String,
    pub tgt_lang: String,
    pub shots: Vec<Shot>,
    pub glossary: Vec<GlossaryEntry>,
    pub no_translate: Vec<BlacklistEntry>,
}

impl TranslateCall {
    /// Same context, different text.
    pub fn with_text(&self, text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..self.clone()
        }
    }
}

#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate(&self, call: &TranslateCall) -> Result<String, BackendError>;
}

/// Which route a live call takes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// MT service, with Ollama as fallback
    Http,
    /// Ollama only
    OllamaDirect,
}

impl BackendMode {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("ollama-direct") {
            BackendMode::OllamaDirect
        } else {
            BackendMode::Http
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MtSettings {
    pub mt_url: String,
    pub mode: BackendMode,
    /// When false, every call returns its input untouched.
    pub enabled: bool,
    pub ollama_url: Option<String>,
    pub ollama_model: String,
}

// ==================== No-translate masking ====================

/// Text with do-not-translate terms replaced by `__NT<n>__` tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedText {
    pub text: String,
    originals: Vec<String>,
}

impl MaskedText {
    /// Put the original terms back in place of their tokens. Unknown tokens
    /// are left alone.
    pub fn restore(&self, translated: &str) -> String {
        if self.originals.is_empty() {
            return translated.to_string();
        }
        let token = MASK_TOKEN_REGEX.get_or_init(|| Regex::new(r"__NT(\d+)__").unwrap());
        token
            .replace_all(translated, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| self.originals.get(idx))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

pub fn mask_no_translate(text: &str, terms: &[BlacklistEntry]) -> MaskedText {
    let Some(matcher) = TermMatcher::new(terms.iter().map(|t| t.term.as_str())) else {
        return MaskedText {
            text: text.to_string(),
            originals: Vec::new(),
        };
    };

    let mut originals: Vec<String> = Vec::new();
    let masked = matcher.replace_with(text, |found| {
        let token = format!("__NT{}__", originals.len());
        originals.push(found.to_string());
        token
    });
    MaskedText {
        text: masked,
        originals,
    }
}

// ==================== Wire types ====================

#[derive(Debug, Serialize)]
struct GlossaryHint<'a> {
    term_source: &'a str,
    term_target: &'a str,
}

#[derive(Debug, Serialize)]
struct MtRequest<'a> {
    text: &'a str,
    src: &'a str,
    tgt: &'a str,
    shots: &'a [Shot],
    glossary: Vec<GlossaryHint<'a>>,
}

#[derive(Debug, Deserialize)]
struct MtResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Prompt for the Ollama route: instruction, fixed terminology, a few
/// examples, then the text.
fn build_ollama_prompt(text: &str, call: &TranslateCall) -> String {
    let mut lines = vec![
        format!(
            "Translate the following text from {} to {}.",
            call.src_lang, call.tgt_lang
        ),
        "Reply with the translation only, no explanations, no quotes.".to_string(),
        "Keep every __NT<n>__ token exactly as written.".to_string(),
    ];

    let approved: Vec<&GlossaryEntry> = call.glossary.iter().filter(|g| g.approved).collect();
    if !approved.is_empty() {
        lines.push(String::new());
        lines.push("Terminology (always use these translations):".to_string());
        for g in approved {
            lines.push(format!("- {} => {}", g.term_source, g.term_target));
        }
    }

    if !call.shots.is_empty() {
        lines.push(String::new());
        lines.push("Examples:".to_string());
        for shot in &call.shots {
            lines.push(format!("{} => {}", shot.src, shot.tgt));
        }
    }

    lines.push(String::new());
    lines.push(text.to_string());
    lines.join("\n")
}

async fn error_for_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
    Err(BackendError::Status {
        service,
        status,
        body,
    })
}

// ==================== HTTP backend ====================

/// MT service client with Ollama fallback.
pub struct HttpMtBackend {
    client: reqwest::Client,
    settings: MtSettings,
    mt_retry: RetryConfig,
    ollama_retry: RetryConfig,
}

impl HttpMtBackend {
    pub fn new(settings: MtSettings, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: reqwest::Client, settings: MtSettings) -> Self {
        Self {
            client,
            settings,
            mt_retry: RetryConfig::mt_call(),
            ollama_retry: RetryConfig::ollama_call(),
        }
    }

    pub fn with_retry(mut self, mt_retry: RetryConfig, ollama_retry: RetryConfig) -> Self {
        self.mt_retry = mt_retry;
        self.ollama_retry = ollama_retry;
        self
    }

    async fn call_mt_service(&self, text: &str, call: &TranslateCall) -> Result<String, BackendError> {
        let request = MtRequest {
            text,
            src: &call.src_lang,
            tgt: &call.tgt_lang,
            shots: &call.shots,
            glossary: call
                .glossary
                .iter()
                .map(|g| GlossaryHint {
                    term_source: &g.term_source,
                    term_target: &g.term_target,
                })
                .collect(),
        };
        debug!(
            chars = text.chars().count(),
            shots = call.shots.len(),
            glossary = request.glossary.len(),
            "Calling MT service"
        );

        with_retry_if(
            &self.mt_retry,
            "MT service",
            || async {
                let response = self
                    .client
                    .post(&self.settings.mt_url)
                    .json(&request)
                    .send()
                    .await?;
                let response = error_for_status("MT service", response).await?;
                let body: MtResponse = response.json().await?;
                Ok::<_, BackendError>(body.text.unwrap_or_default().trim().to_string())
            },
            BackendError::is_retryable,
        )
        .await
    }

    async fn call_ollama(&self, text: &str, call: &TranslateCall) -> Result<String, BackendError> {
        let Some(base) = self.settings.ollama_url.as_deref() else {
            return Err(BackendError::Other("Ollama is not configured".to_string()));
        };
        let url = format!("{}/api/generate", base.trim_end_matches('/'));
        let request = OllamaRequest {
            model: &self.settings.ollama_model,
            prompt: build_ollama_prompt(text, call),
            stream: false,
        };
        debug!(model = %self.settings.ollama_model, "Calling Ollama");

        let out = with_retry_if(
            &self.ollama_retry,
            "Ollama",
            || async {
                let response = self.client.post(&url).json(&request).send().await?;
                let response = error_for_status("ollama", response).await?;
                let body: OllamaResponse = response.json().await?;
                Ok::<_, BackendError>(body.response.unwrap_or_default().trim().to_string())
            },
            BackendError::is_retryable,
        )
        .await?;

        if out.is_empty() {
            return Err(BackendError::Empty("ollama"));
        }
        Ok(out)
    }
}

#[async_trait]
impl TranslationBackend for HttpMtBackend {
    async fn translate(&self, call: &TranslateCall) -> Result<String, BackendError> {
        if !self.settings.enabled {
            return Ok(call.text.clone());
        }

        let masked = mask_no_translate(&call.text, &call.no_translate);

        if self.settings.mode == BackendMode::OllamaDirect {
            let out = self.call_ollama(&masked.text, call).await?;
            return Ok(masked.restore(&out));
        }

        match self.call_mt_service(&masked.text, call).await {
            Ok(out) => {
                let restored = masked.restore(&out);
                let echoed = out.is_empty() || normalize(&restored) == normalize(&call.text);
                if !echoed {
                    return Ok(restored);
                }

                debug!("MT service echoed its input, trying Ollama");
                match self.call_ollama(&masked.text, call).await {
                    Ok(forced) => Ok(masked.restore(&forced)),
                    Err(e) if out.is_empty() => Err(e),
                    Err(e) => {
                        warn!(error = %e, "Ollama fallback failed, keeping MT output");
                        Ok(restored)
                    }
                }
            }
            Err(e) => {
                if self.settings.ollama_url.is_none() {
                    return Err(e);
                }
                warn!(error = %e, "MT service failed, trying Ollama");
                let forced = self.call_ollama(&masked.text, call).await?;
                Ok(masked.restore(&forced))
            }
        }
    }
}

// ==================== Metering ====================

/// Counts each translation call once, whatever retries or fallbacks happen
/// inside the wrapped backend.
pub struct MeteredBackend {
    inner: Arc<dyn TranslationBackend>,
    metrics: &'static EngineMetrics,
}

impl MeteredBackend {
    pub fn new(inner: Arc<dyn TranslationBackend>) -> Self {
        Self::with_metrics(inner, EngineMetrics::global())
    }

    pub fn with_metrics(inner: Arc<dyn TranslationBackend>, metrics: &'static EngineMetrics) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl TranslationBackend for MeteredBackend {
    async fn translate(&self, call: &TranslateCall) -> Result<String, BackendError> {
        self.metrics.record_backend_call();
        let result = self.inner.translate(call).await;
        if result.is_err() {
            self.metrics.record_backend_failure();
        }
        result
    }
}
