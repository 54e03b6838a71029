//! Pure text toolkit shared by the memory policy, the segmenter and the
//! orchestrator.
//!
//! - `normalize`: canonical comparison key
//! - `similarity`: token cosine and fuzzy edit-distance scores
//! - `case`: case inference and projection between source and target strings
//! - `terms`: boundary-safe glossary and blacklist matching

mod case;
mod normalize;
mod similarity;
mod terms;

pub use case::{
    apply_case_like, classify_case, extract_all_caps_terms, project_glossary_case_in_sentence,
    replace_word_unicode, to_title_case_all, CaseStyle,
};
pub use normalize::normalize;
pub use similarity::{score_fuzzy, token_cosine};
pub use terms::{
    apply_glossary_hard_replace, build_boundary_pattern, flexible_pattern, is_only_blacklist,
    pick_blacklist_matches, pick_glossary_matches, TermMatcher,
};
