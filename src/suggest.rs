//! Ranked suggestions and few-shot example selection.
//!
//! Suggestions are computed from the bulk rows a request already read; they
//! feed the caller-facing candidate list and the failure fallback. Examples
//! are the closest memory pairs, handed to the backend as context shots.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::store::{GlossaryEntry, MemoryEntry};
use crate::text::{apply_case_like, normalize, score_fuzzy, TermMatcher};

/// Suggestions kept per request.
pub const DEFAULT_TOP_N: usize = 8;

const EXACT_WEIGHT: f64 = 0.95;
const FUZZY_WEIGHT: f64 = 0.9;
const FUZZY_MIN_SCORE: f64 = 0.55;
const GLOSSARY_SCORE: f64 = 0.78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "TM")]
    Tm,
    Fuzzy,
    Glossary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub score: f64,
    pub origin: Origin,
}

/// A memory pair passed to the backend as a context example.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shot {
    pub src: String,
    pub tgt: String,
}

/// Merge memory and glossary hits for `text` into at most `top_n` candidates,
/// best first, de-duplicated by lowercase text.
pub fn rank_suggestions(
    text: &str,
    pool: &[MemoryEntry],
    glossary: &[GlossaryEntry],
    top_n: usize,
) -> Vec<Candidate> {
    let source_norm = normalize(text);
    let mut hits: Vec<Candidate> = Vec::new();

    for entry in pool {
        if entry.source_norm == source_norm {
            hits.push(Candidate {
                text: apply_case_like(text, &entry.target_text),
                score: EXACT_WEIGHT * entry.quality,
                origin: Origin::Tm,
            });
            continue;
        }
        let score = score_fuzzy(&source_norm, &entry.source_norm);
        if score >= FUZZY_MIN_SCORE {
            hits.push(Candidate {
                text: apply_case_like(text, &entry.target_text),
                score: FUZZY_WEIGHT * score,
                origin: Origin::Fuzzy,
            });
        }
    }

    for row in glossary.iter().filter(|g| g.approved) {
        let Some(matcher) = TermMatcher::new([row.term_source.as_str()]) else {
            continue;
        };
        if let Some(found) = matcher.find_all(text).first() {
            hits.push(Candidate {
                text: apply_case_like(found, &row.term_target),
                score: GLOSSARY_SCORE,
                origin: Origin::Glossary,
            });
        }
    }

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut seen: HashSet<String> = HashSet::new();
    hits.into_iter()
        .filter(|c| !c.text.trim().is_empty())
        .filter(|c| seen.insert(c.text.trim().to_lowercase()))
        .take(top_n)
        .collect()
}

/// The `k` memory pairs closest to `text`.
pub fn top_k_examples(text: &str, pool: &[MemoryEntry], k: usize) -> Vec<Shot> {
    let source_norm = normalize(text);
    let mut scored: Vec<(f64, &MemoryEntry)> = pool
        .iter()
        .filter(|e| !e.source_norm.trim().is_empty())
        .map(|e| (score_fuzzy(&source_norm, &e.source_norm), e))
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(k)
        .map(|(_, e)| Shot {
            src: e.source_norm.clone(),
            tgt: e.target_text.clone(),
        })
        .collect()
}
