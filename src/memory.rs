//! Translation memory promotion policy.
//!
//! Decides whether a stored memory row can answer a request without a live
//! translation call. Exact normalized matches always win. A fuzzy match is
//! only reused when it is very close, about the same length, and a
//! structural-state patch (ON/OFF toggles) actually rewrote it for the new
//! source; anything else falls through to the backend.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::debug;

use crate::store::{MemoryEntry, MemoryUpsert};
use crate::text::{apply_case_like, normalize, token_cosine};

/// Quality given to a fresh approval, or to one that changed the target.
pub const APPROVAL_BASE_QUALITY: f64 = 0.92;
/// Quality gained when an approval confirms the stored target.
pub const APPROVAL_QUALITY_STEP: f64 = 0.02;

/// Thresholds for fuzzy promotion.
#[derive(Debug, Clone, PartialEq)]
pub struct PromotionConfig {
    /// Minimum token cosine score.
    pub fuzzy_promote_min: f64,
    /// Maximum relative length difference between normalized sources.
    pub max_len_delta: f64,
    /// Only promote when a structural-state patch rewrote the stored target.
    pub require_patch: bool,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            fuzzy_promote_min: 0.92,
            max_len_delta: 0.10,
            require_patch: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionKind {
    Exact,
    Fuzzy,
}

/// A memory row accepted as the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Promotion<'a> {
    /// Stored target, patched if needed and case-projected onto the request.
    pub translation: String,
    pub kind: PromotionKind,
    pub entry: &'a MemoryEntry,
    pub score: f64,
    pub patched: bool,
}

/// Rewrites state words inside a reused target so they agree with a new
/// source. Returns `None` when the target needs no change.
pub trait StructuralStatePatch: Send + Sync {
    fn patch(&self, old_source: &str, old_target: &str, new_source: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn parse(word: &str) -> Self {
        if word.eq_ignore_ascii_case("on") {
            Toggle::On
        } else {
            Toggle::Off
        }
    }
}

/// Target-language words for ON/OFF states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleVocabulary {
    pub on: String,
    pub off: String,
    pub on_synonyms: Vec<String>,
    pub off_synonyms: Vec<String>,
    /// Target word that introduces an inline state ("When" in English sources).
    pub anchor: String,
}

impl Default for ToggleVocabulary {
    fn default() -> Self {
        Self {
            on: "LIGADO".to_string(),
            off: "DESLIGADO".to_string(),
            on_synonyms: vec!["ATIVADO".to_string()],
            off_synonyms: vec!["DESATIVADO".to_string()],
            anchor: "Quando".to_string(),
        }
    }
}

impl ToggleVocabulary {
    fn phrase(&self, state: Toggle) -> &str {
        match state {
            Toggle::On => &self.on,
            Toggle::Off => &self.off,
        }
    }

    /// Alternation of every state word, longest first.
    fn state_alternation(&self) -> String {
        let mut words: Vec<&str> = [self.on.as_str(), self.off.as_str()]
            .into_iter()
            .chain(self.on_synonyms.iter().map(String::as_str))
            .chain(self.off_synonyms.iter().map(String::as_str))
            .filter(|w| !w.is_empty())
            .collect();
        words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
        words
            .into_iter()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|")
    }
}

/// ON/OFF toggle patch for English sources.
///
/// A `Label: ON` header in the new source rewrites the first `: <state>` in
/// the target. Inline `When ON` occurrences map positionally onto
/// `<anchor> <state>` occurrences of the target; extra target occurrences
/// stay as they are. When the target has none, the first inline state is
/// inserted once after the anchor word.
#[derive(Debug, Clone, Default)]
pub struct TogglePatch {
    vocab: ToggleVocabulary,
}

impl TogglePatch {
    pub fn new(vocab: ToggleVocabulary) -> Self {
        Self { vocab }
    }
}

impl StructuralStatePatch for TogglePatch {
    fn patch(&self, old_source: &str, old_target: &str, new_source: &str) -> Option<String> {
        if old_source.trim().is_empty() || old_target.trim().is_empty() || new_source.trim().is_empty()
        {
            return None;
        }

        let states = self.vocab.state_alternation();
        let source_header = Regex::new(r"(?i):\s*(ON|OFF)\b").ok()?;
        let source_inline = Regex::new(r"(?i)\bWhen\s+(ON|OFF)\b").ok()?;
        let target_header = Regex::new(&format!(r"(?i)(:\s*)(?:{})\b", states)).ok()?;
        let anchor = regex::escape(&self.vocab.anchor);
        let target_inline = Regex::new(&format!(r"(?i)\b({})(\s+)(?:{})\b", anchor, states)).ok()?;
        let target_anchor = Regex::new(&format!(r"(?i)\b{}\b", anchor)).ok()?;

        let mut out = old_target.to_string();

        if let Some(caps) = source_header.captures(new_source) {
            let desired = self.vocab.phrase(Toggle::parse(&caps[1]));
            out = target_header
                .replacen(&out, 1, |c: &Captures| format!("{}{}", &c[1], desired))
                .into_owned();
        }

        let inline: Vec<Toggle> = source_inline
            .captures_iter(new_source)
            .map(|c| Toggle::parse(&c[1]))
            .collect();
        if let Some(first) = inline.first() {
            if target_inline.is_match(&out) {
                let mut idx = 0;
                out = target_inline
                    .replace_all(&out, |c: &Captures| {
                        let rewritten = match inline.get(idx) {
                            Some(state) => format!("{}{}{}", &c[1], &c[2], self.vocab.phrase(*state)),
                            None => c[0].to_string(),
                        };
                        idx += 1;
                        rewritten
                    })
                    .into_owned();
            } else {
                let desired = self.vocab.phrase(*first);
                out = target_anchor
                    .replacen(&out, 1, |c: &Captures| format!("{} {}", &c[0], desired))
                    .into_owned();
            }
        }

        (out != old_target).then_some(out)
    }
}

/// Map toggle synonyms onto the canonical words and collapse doubled states
/// such as `LIGADO LIGADO`.
pub fn normalize_toggle_words(text: &str, vocab: &ToggleVocabulary) -> String {
    let mut out = text.to_string();
    for (canonical, synonyms) in [(&vocab.on, &vocab.on_synonyms), (&vocab.off, &vocab.off_synonyms)] {
        for synonym in synonyms.iter().filter(|s| !s.is_empty()) {
            if let Ok(re) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(synonym))) {
                out = re.replace_all(&out, canonical.as_str()).into_owned();
            }
        }
    }
    for canonical in [&vocab.on, &vocab.off] {
        if canonical.is_empty() {
            continue;
        }
        let word = regex::escape(canonical);
        if let Ok(re) = Regex::new(&format!(r"(?i)\b{w}(?:\s+{w})+\b", w = word)) {
            out = re.replace_all(&out, canonical.as_str()).into_owned();
        }
    }
    out
}

/// The promotion decision, configured once and applied per request.
pub struct PromotionPolicy {
    config: PromotionConfig,
    patches: Vec<Box<dyn StructuralStatePatch>>,
}

impl PromotionPolicy {
    /// Policy with the ON/OFF toggle patch for `vocab`.
    pub fn new(config: PromotionConfig, vocab: ToggleVocabulary) -> Self {
        Self {
            config,
            patches: vec![Box::new(TogglePatch::new(vocab))],
        }
    }

    /// Register another structural-state vocabulary.
    pub fn with_patch(mut self, patch: Box<dyn StructuralStatePatch>) -> Self {
        self.patches.push(patch);
        self
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    fn apply_patches(&self, old_source: &str, old_target: &str, new_source: &str) -> Option<String> {
        let mut current: Option<String> = None;
        for patch in &self.patches {
            let base = current.as_deref().unwrap_or(old_target);
            if let Some(next) = patch.patch(old_source, base, new_source) {
                current = Some(next);
            }
        }
        current.filter(|t| t != old_target)
    }

    /// Pick a memory row for `text` from a pool already filtered by language
    /// and scope, or `None` when a live call is needed.
    pub fn promote<'a>(&self, text: &str, pool: &'a [MemoryEntry]) -> Option<Promotion<'a>> {
        let source_norm = normalize(text);
        if source_norm.is_empty() {
            return None;
        }

        if let Some(entry) = pool.iter().find(|e| e.source_norm == source_norm) {
            return Some(Promotion {
                translation: apply_case_like(text, &entry.target_text),
                kind: PromotionKind::Exact,
                entry,
                score: 1.0,
                patched: false,
            });
        }

        let mut top: Option<(&MemoryEntry, f64)> = None;
        for entry in pool {
            let score = token_cosine(&source_norm, &entry.source_norm);
            if top.map_or(true, |(_, best)| score > best) {
                top = Some((entry, score));
            }
        }
        let (entry, score) = top?;

        let len_a = source_norm.chars().count();
        let len_b = entry.source_norm.chars().count();
        let len_delta = len_a.abs_diff(len_b) as f64 / len_a.max(len_b).max(1) as f64;
        let patched = self.apply_patches(&entry.source_norm, &entry.target_text, text);

        let accepted = score >= self.config.fuzzy_promote_min
            && len_delta <= self.config.max_len_delta
            && (!self.config.require_patch || patched.is_some());
        if !accepted {
            debug!(
                score,
                len_delta,
                patched = patched.is_some(),
                "Fuzzy memory candidate not promoted"
            );
            return None;
        }

        Some(Promotion {
            translation: apply_case_like(text, patched.as_deref().unwrap_or(&entry.target_text)),
            kind: PromotionKind::Fuzzy,
            entry,
            score,
            patched: patched.is_some(),
        })
    }
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        Self::new(PromotionConfig::default(), ToggleVocabulary::default())
    }
}

/// Merge an approval into the existing authoritative row, or start a new one.
pub fn merge_approval(
    existing: Option<&MemoryEntry>,
    upsert: &MemoryUpsert,
    now: DateTime<Utc>,
) -> MemoryEntry {
    match existing {
        Some(current) => {
            let quality = if current.target_text != upsert.target_text {
                APPROVAL_BASE_QUALITY
            } else {
                (current.quality + APPROVAL_QUALITY_STEP).min(1.0)
            };
            MemoryEntry {
                target_text: upsert.target_text.clone(),
                uses: current.uses.saturating_add(1),
                quality,
                last_used_at: Some(now),
                ..current.clone()
            }
        }
        None => MemoryEntry {
            source_norm: upsert.source_norm.clone(),
            target_text: upsert.target_text.clone(),
            src_lang: upsert.src_lang.clone(),
            tgt_lang: upsert.tgt_lang.clone(),
            uses: 1,
            quality: APPROVAL_BASE_QUALITY,
            last_used_at: Some(now),
            game: upsert.scope.game.clone(),
            mod_name: upsert.scope.mod_name.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Scope;

    fn mem(source: &str, target: &str) -> MemoryEntry {
        MemoryEntry {
            source_norm: normalize(source),
            target_text: target.to_string(),
            src_lang: "en".into(),
            tgt_lang: "pt-BR".into(),
            uses: 1,
            quality: 0.92,
            last_used_at: None,
            game: None,
            mod_name: None,
        }
    }

    const STEALTH_ON: &str = "Stealth Mode: ON - your footsteps make less noise and enemies need more time to notice you in dark places";
    const STEALTH_OFF: &str = "Stealth Mode: OFF - your footsteps make less noise and enemies need more time to notice you in dark places";

    // ==================== Exact ====================

    #[test]
    fn test_exact_match_outranks_fuzzy() {
        let pool = vec![
            mem("open the big door now", "abra a porta grande agora"),
            mem("Open the door", "abra a porta"),
        ];
        let policy = PromotionPolicy::default();
        let hit = policy.promote("OPEN THE DOOR", &pool).expect("exact hit");
        assert_eq!(hit.kind, PromotionKind::Exact);
        assert_eq!(hit.translation, "ABRA A PORTA");
        assert_eq!(hit.entry.target_text, "abra a porta");
    }

    #[test]
    fn test_exact_match_ignores_thresholds() {
        let config = PromotionConfig {
            fuzzy_promote_min: 1.1,
            max_len_delta: 0.0,
            require_patch: true,
        };
        let policy = PromotionPolicy::new(config, ToggleVocabulary::default());
        let pool = vec![mem("hello", "olá")];
        let hit = policy.promote("  Hello ", &pool).expect("exact hit");
        assert_eq!(hit.kind, PromotionKind::Exact);
    }

    #[test]
    fn test_empty_text_or_pool() {
        let policy = PromotionPolicy::default();
        assert!(policy.promote("   ", &[mem("x", "y")]).is_none());
        assert!(policy.promote("hello", &[]).is_none());
    }

    // ==================== Fuzzy ====================

    #[test]
    fn test_fuzzy_promoted_when_patch_changes_target() {
        let pool = vec![mem(
            STEALTH_OFF,
            "Modo Furtivo: DESLIGADO - seus passos fazem menos barulho",
        )];
        let policy = PromotionPolicy::default();
        let hit = policy.promote(STEALTH_ON, &pool).expect("fuzzy hit");

        assert_eq!(hit.kind, PromotionKind::Fuzzy);
        assert!((hit.score - 0.95).abs() < 1e-9);
        assert!(hit.patched);
        assert_eq!(hit.translation, "Modo Furtivo: LIGADO - seus passos fazem menos barulho");
    }

    #[test]
    fn test_fuzzy_not_promoted_without_patch() {
        let pool = vec![mem(STEALTH_OFF, "Modo furtivo - seus passos fazem menos barulho")];
        assert!(PromotionPolicy::default().promote(STEALTH_ON, &pool).is_none());

        let relaxed = PromotionPolicy::new(
            PromotionConfig {
                require_patch: false,
                ..PromotionConfig::default()
            },
            ToggleVocabulary::default(),
        );
        let hit = relaxed.promote(STEALTH_ON, &pool).expect("fuzzy hit");
        assert_eq!(hit.kind, PromotionKind::Fuzzy);
        assert!(!hit.patched);
    }

    #[test]
    fn test_fuzzy_rejected_below_score() {
        let pool = vec![mem("Power: OFF", "Energia: DESLIGADO")];
        // cosine of "power: on" vs "power: off" is 0.5
        assert!(PromotionPolicy::default().promote("Power: ON", &pool).is_none());
    }

    #[test]
    fn test_fuzzy_rejected_on_length_delta() {
        let base = "alpha beta gamma delta epsilon zeta eta theta iota kappa lambda mu";
        let pool = vec![mem(&format!("{} x: off", base), "Alfa: DESLIGADO")];
        let config = PromotionConfig {
            fuzzy_promote_min: 0.5,
            max_len_delta: 0.0,
            require_patch: false,
        };
        let policy = PromotionPolicy::new(config, ToggleVocabulary::default());
        assert!(policy.promote(&format!("{} x: on", base), &pool).is_none());
    }

    #[test]
    fn test_fuzzy_ties_keep_first_seen() {
        let pool = vec![
            mem(STEALTH_OFF, "Primeiro: DESLIGADO"),
            mem(STEALTH_OFF, "Segundo: DESLIGADO"),
        ];
        let hit = PromotionPolicy::default().promote(STEALTH_ON, &pool).expect("fuzzy hit");
        assert_eq!(hit.translation, "Primeiro: LIGADO");
    }

    // ==================== Toggle patch ====================

    #[test]
    fn test_toggle_patch_header() {
        let patch = TogglePatch::default();
        assert_eq!(
            patch.patch("power: off", "Energia: DESATIVADO", "Power: ON").as_deref(),
            Some("Energia: LIGADO")
        );
    }

    #[test]
    fn test_toggle_patch_inline_positional() {
        let patch = TogglePatch::default();
        let out = patch.patch(
            "when off a. when off b. when off c.",
            "Quando DESLIGADO a. Quando DESLIGADO b. Quando DESLIGADO c.",
            "When ON a. When OFF b.",
        );
        assert_eq!(
            out.as_deref(),
            Some("Quando LIGADO a. Quando DESLIGADO b. Quando DESLIGADO c.")
        );
    }

    #[test]
    fn test_toggle_patch_inserts_once_at_anchor() {
        let patch = TogglePatch::default();
        let out = patch.patch(
            "when the light is off",
            "Quando a luz apaga, quando volta",
            "When ON the light glows, When OFF it dims",
        );
        assert_eq!(out.as_deref(), Some("Quando LIGADO a luz apaga, quando volta"));
    }

    #[test]
    fn test_toggle_patch_leaves_other_text_alone() {
        let patch = TogglePatch::default();
        let target = "Luz: DESLIGADO (não mude isto: ATIVADO)";
        let out = patch.patch("light: off", target, "Light: ON").expect("patched");
        assert_eq!(out, "Luz: LIGADO (não mude isto: ATIVADO)");
    }

    #[test]
    fn test_toggle_patch_none_when_unchanged() {
        let patch = TogglePatch::default();
        assert!(patch.patch("power: on", "Energia: LIGADO", "Power: ON").is_none());
        assert!(patch.patch("plain text", "texto simples", "Plain text").is_none());
        assert!(patch.patch("", "x", "y").is_none());
    }

    #[test]
    fn test_extra_patch_vocabulary() {
        struct OpenClosed;
        impl StructuralStatePatch for OpenClosed {
            fn patch(&self, _: &str, old_target: &str, new_source: &str) -> Option<String> {
                if new_source.contains("OPEN") && old_target.contains("FECHADO") {
                    Some(old_target.replace("FECHADO", "ABERTO"))
                } else {
                    None
                }
            }
        }

        let policy = PromotionPolicy::default().with_patch(Box::new(OpenClosed));
        let base = "the vault door in sector seven stays this way until the overseer says otherwise today";
        let pool = vec![mem(&format!("{} closed", base), "Porta: FECHADO")];
        let hit = policy.promote(&format!("{} OPEN", base), &pool);
        assert!(hit.is_some());
        assert_eq!(hit.unwrap().translation, "Porta: ABERTO");
    }

    // ==================== Toggle word normalization ====================

    #[test]
    fn test_normalize_toggle_words() {
        let vocab = ToggleVocabulary::default();
        assert_eq!(normalize_toggle_words("Modo: ATIVADO", &vocab), "Modo: LIGADO");
        assert_eq!(normalize_toggle_words("Modo: desativado", &vocab), "Modo: DESLIGADO");
        assert_eq!(normalize_toggle_words("LIGADO ATIVADO", &vocab), "LIGADO");
        assert_eq!(normalize_toggle_words("DESLIGADO  DESLIGADO", &vocab), "DESLIGADO");
        assert_eq!(normalize_toggle_words("DESLIGADO e LIGADO", &vocab), "DESLIGADO e LIGADO");
    }

    // ==================== Approval merge ====================

    #[test]
    fn test_merge_new_entry() {
        let upsert = MemoryUpsert {
            source_norm: "hello".into(),
            target_text: "olá".into(),
            src_lang: "en".into(),
            tgt_lang: "pt-BR".into(),
            scope: Scope::new(Some("Fallout 4"), None),
        };
        let now = Utc::now();
        let entry = merge_approval(None, &upsert, now);
        assert_eq!(entry.uses, 1);
        assert!((entry.quality - APPROVAL_BASE_QUALITY).abs() < 1e-9);
        assert_eq!(entry.game.as_deref(), Some("Fallout 4"));
        assert_eq!(entry.last_used_at, Some(now));
    }

    #[test]
    fn test_merge_confirming_approval_raises_quality() {
        let mut current = mem("hello", "olá");
        current.quality = 0.99;
        let upsert = MemoryUpsert {
            source_norm: "hello".into(),
            target_text: "olá".into(),
            src_lang: "en".into(),
            tgt_lang: "pt-BR".into(),
            scope: Scope::unscoped(),
        };
        let merged = merge_approval(Some(&current), &upsert, Utc::now());
        assert_eq!(merged.uses, 2);
        assert!((merged.quality - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_changed_target_resets_quality() {
        let mut current = mem("hello", "olá");
        current.quality = 0.98;
        let upsert = MemoryUpsert {
            source_norm: "hello".into(),
            target_text: "oi".into(),
            src_lang: "en".into(),
            tgt_lang: "pt-BR".into(),
            scope: Scope::unscoped(),
        };
        let merged = merge_approval(Some(&current), &upsert, Utc::now());
        assert_eq!(merged.target_text, "oi");
        assert!((merged.quality - APPROVAL_BASE_QUALITY).abs() < 1e-9);
    }
}
