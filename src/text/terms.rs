//! Boundary-safe term matching for glossary and blacklist phrases.
//!
//! One matcher covers a whole term set. Longer terms win over shorter ones
//! that they contain, a match may not touch a word character or hyphen on
//! either side, and the whitespace inside a multi-word term matches any
//! whitespace run, line breaks included.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use super::normalize;
use crate::store::{BlacklistEntry, GlossaryEntry};

static NON_ALNUM_REGEX: OnceLock<Regex> = OnceLock::new();

/// Escaped regex source for `term` where each inner whitespace run becomes
/// `\s+`. Empty for blank terms.
pub fn flexible_pattern(term: &str) -> String {
    term.split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

fn is_term_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_bounded(text: &str, range: &Range<usize>) -> bool {
    let before_ok = text[..range.start]
        .chars()
        .next_back()
        .map_or(true, |c| !is_term_char(c));
    let after_ok = text[range.end..]
        .chars()
        .next()
        .map_or(true, |c| !is_term_char(c));
    before_ok && after_ok
}

/// Case-insensitive matcher over a set of terms.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    /// Alternation of every term, longest first; locates candidate starts.
    combined: Regex,
    /// One regex per term in the same order, used to pick the winner at a start.
    terms: Vec<Regex>,
}

impl TermMatcher {
    /// Build a matcher, or `None` when no usable term is supplied.
    pub fn new<I, S>(terms: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut unique: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .filter(|t| seen.insert(t.clone()))
            .collect();
        unique.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));

        let patterns: Vec<String> = unique.iter().map(|t| flexible_pattern(t)).collect();
        if patterns.is_empty() {
            return None;
        }

        let combined = Regex::new(&format!("(?i)(?:{})", patterns.join("|"))).ok()?;
        let terms = patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){}", p)))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        Some(Self { combined, terms })
    }

    /// Non-overlapping, boundary-safe matches from left to right.
    pub fn find_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let mut found = Vec::new();
        let mut pos = 0;
        while pos < text.len() {
            let Some(candidate) = self.combined.find_at(text, pos) else {
                break;
            };
            let start = candidate.start();
            let winner = self
                .terms
                .iter()
                .filter_map(|re| re.find_at(text, start))
                .find(|m| m.start() == start && !m.is_empty() && is_bounded(text, &m.range()));

            match winner {
                Some(m) => {
                    found.push(m.range());
                    pos = m.end();
                }
                None => {
                    pos = start + text[start..].chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        found
    }

    /// Matched substrings, in order of appearance.
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.find_ranges(text)
            .into_iter()
            .map(|range| &text[range])
            .collect()
    }

    pub fn is_match(&self, text: &str) -> bool {
        !self.find_ranges(text).is_empty()
    }

    /// Replace every match with `replacement`, taken literally.
    pub fn replace_all(&self, text: &str, replacement: &str) -> String {
        self.replace_with(text, |_| replacement.to_string())
    }

    /// Replace every match with the value computed from the matched text.
    pub fn replace_with<F>(&self, text: &str, mut f: F) -> String
    where
        F: FnMut(&str) -> String,
    {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for range in self.find_ranges(text) {
            out.push_str(&text[last..range.start]);
            out.push_str(&f(&text[range.clone()]));
            last = range.end;
        }
        out.push_str(&text[last..]);
        out
    }
}

/// Build the boundary matcher for a term set.
pub fn build_boundary_pattern<I, S>(terms: I) -> Option<TermMatcher>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    TermMatcher::new(terms)
}

/// Normalized keys of every term occurrence in `text`.
fn matched_keys<I, S>(text: &str, terms: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let Some(matcher) = TermMatcher::new(terms) else {
        return Vec::new();
    };
    let mut keys: Vec<String> = Vec::new();
    for m in matcher.find_all(text) {
        let key = normalize(m);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Approved glossary rows whose source term occurs in `text`, in order of
/// first occurrence and without duplicates.
pub fn pick_glossary_matches(text: &str, rows: &[GlossaryEntry]) -> Vec<GlossaryEntry> {
    let approved: Vec<&GlossaryEntry> = rows
        .iter()
        .filter(|r| r.approved && !r.term_source.trim().is_empty())
        .collect();
    let keys = matched_keys(text, approved.iter().map(|r| r.term_source.as_str()));

    keys.iter()
        .filter_map(|key| {
            approved
                .iter()
                .find(|r| normalize(&r.term_source) == *key)
                .map(|r| (*r).clone())
        })
        .collect()
}

/// Blacklist rows whose term occurs in `text`, in catalog order and without
/// duplicates.
pub fn pick_blacklist_matches(text: &str, rows: &[BlacklistEntry]) -> Vec<BlacklistEntry> {
    let keys = matched_keys(
        text,
        rows.iter().map(|r| r.term.as_str()).filter(|t| !t.trim().is_empty()),
    );

    let mut picked: Vec<BlacklistEntry> = Vec::new();
    for row in rows {
        let key = normalize(&row.term);
        if keys.contains(&key) && !picked.iter().any(|p| normalize(&p.term) == key) {
            picked.push(row.clone());
        }
    }
    picked
}

/// True when `text` holds nothing but blacklist terms and punctuation.
pub fn is_only_blacklist(text: &str, blacklist: &[BlacklistEntry]) -> bool {
    let Some(matcher) = TermMatcher::new(blacklist.iter().map(|r| r.term.as_str())) else {
        return false;
    };
    if !matcher.is_match(text) {
        return false;
    }
    let non_alnum = NON_ALNUM_REGEX.get_or_init(|| Regex::new(r"[^\p{L}\p{N}]+").unwrap());
    let residual = matcher.replace_all(text, "");
    non_alnum.replace_all(&residual, "").is_empty()
}

/// Force approved glossary translations into `translated_text`.
///
/// Every approved, non-blacklisted row becomes a rule, whether or not its
/// term occurs in the source. Rules run longest source term first and
/// replace every boundary-safe occurrence of the source term left in the
/// translation with the fixed target.
pub fn apply_glossary_hard_replace(
    translated_text: &str,
    glossary: &[GlossaryEntry],
    blacklist: &[BlacklistEntry],
) -> String {
    if translated_text.is_empty() {
        return String::new();
    }

    let blocked: HashSet<String> = blacklist.iter().map(|b| normalize(&b.term)).collect();
    let mut rules: Vec<&GlossaryEntry> = glossary
        .iter()
        .filter(|g| g.approved)
        .filter(|g| !g.term_source.trim().is_empty() && !g.term_target.trim().is_empty())
        .filter(|g| !blocked.contains(&normalize(&g.term_source)))
        .collect();
    rules.sort_by_key(|g| std::cmp::Reverse(g.term_source.chars().count()));

    let mut out = translated_text.to_string();
    for rule in rules {
        let Some(matcher) = TermMatcher::new([rule.term_source.as_str()]) else {
            continue;
        };
        out = matcher.replace_all(&out, &rule.term_target);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gloss(source: &str, target: &str) -> GlossaryEntry {
        GlossaryEntry {
            term_source: source.to_string(),
            term_target: target.to_string(),
            notes: None,
            approved: true,
            game: None,
            mod_name: None,
        }
    }

    fn black(term: &str) -> BlacklistEntry {
        BlacklistEntry {
            term: term.to_string(),
            notes: None,
            game: None,
            mod_name: None,
        }
    }

    // ==================== TermMatcher ====================

    #[test]
    fn test_multi_word_term_matches_across_newline() {
        let matcher = build_boundary_pattern(["Alpha Beta"]).expect("matcher");
        assert_eq!(matcher.find_all("Alpha\nBeta"), vec!["Alpha\nBeta"]);
    }

    #[test]
    fn test_respects_word_boundaries() {
        let matcher = build_boundary_pattern(["Mod"]).expect("matcher");
        assert!(matcher.is_match("Mod"));
        assert!(!matcher.is_match("Modded"));
        assert!(!matcher.is_match("pre-Mod"));
        assert!(!matcher.is_match("Mod_x"));
        assert!(matcher.is_match("the (Mod), ok"));
    }

    #[test]
    fn test_longest_term_wins() {
        let matcher = build_boundary_pattern(["Power", "Power Armor"]).expect("matcher");
        assert_eq!(matcher.find_all("Use Power Armor and Power"), vec!["Power Armor", "Power"]);
    }

    #[test]
    fn test_falls_back_to_shorter_term_when_longer_is_glued() {
        let matcher = build_boundary_pattern(["Power", "Power Armor"]).expect("matcher");
        assert_eq!(matcher.find_all("Power Armored"), vec!["Power"]);
    }

    #[test]
    fn test_case_insensitive() {
        let matcher = build_boundary_pattern(["vault-tec"]).expect("matcher");
        assert_eq!(matcher.find_all("VAULT-TEC rules"), vec!["VAULT-TEC"]);
    }

    #[test]
    fn test_empty_term_set() {
        assert!(build_boundary_pattern(Vec::<String>::new()).is_none());
        assert!(build_boundary_pattern(["  ", ""]).is_none());
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let matcher = build_boundary_pattern(["C++ (beta)"]).expect("matcher");
        assert!(matcher.is_match("try C++ (beta) now"));
        assert!(!matcher.is_match("try Cxx beta now"));
    }

    #[test]
    fn test_replace_with_keeps_unmatched_text() {
        let matcher = build_boundary_pattern(["cat"]).expect("matcher");
        assert_eq!(
            matcher.replace_with("cat, catalog, Cat!", |m| m.to_uppercase()),
            "CAT, catalog, CAT!"
        );
    }

    // ==================== pick_*_matches ====================

    #[test]
    fn test_pick_glossary_matches_across_markers() {
        let rows = vec![gloss("Magic Sword", "Espada Mágica")];
        let matches = pick_glossary_matches("Use the Magic\nSword wisely.", &rows);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].term_source, "Magic Sword");
    }

    #[test]
    fn test_pick_glossary_matches_dedup_and_unapproved() {
        let mut pending = gloss("Stimpak", "Estimulante");
        pending.approved = false;
        let rows = vec![gloss("Vault", "Refúgio"), pending];
        let matches = pick_glossary_matches("Vault, vault, Stimpak", &rows);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].term_target, "Refúgio");
    }

    #[test]
    fn test_pick_blacklist_matches_across_newlines() {
        let rows = vec![black("Forbidden Phrase"), black("Other")];
        let matches = pick_blacklist_matches("Inicio\nForbidden\nPhrase\nFim", &rows);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].term, "Forbidden Phrase");
    }

    // ==================== only-blacklist ====================

    #[test]
    fn test_only_blacklist_with_punctuation() {
        let rows = vec![black("Nuka-Cola"), black("Vault-Tec")];
        assert!(is_only_blacklist("Nuka-Cola! Vault-Tec...", &rows));
        assert!(!is_only_blacklist("Drink Nuka-Cola", &rows));
        assert!(!is_only_blacklist("...", &rows));
        assert!(!is_only_blacklist("Nuka-Cola", &[]));
    }

    // ==================== hard replace ====================

    #[test]
    fn test_hard_replace_substitutes_leftover_source_terms() {
        let glossary = vec![gloss("Power", "Energia"), gloss("Power Armor", "Armadura Potente")];
        let out = apply_glossary_hard_replace("Equipe a Power Armor sem Power", &glossary, &[]);
        assert_eq!(out, "Equipe a Armadura Potente sem Energia");
    }

    #[test]
    fn test_hard_replace_applies_terms_missing_from_source() {
        // The backend can leak a term the source never mentioned, e.g. from
        // a neighbouring batch item.
        let glossary = vec![gloss("Power Armor", "Armadura Potente")];
        let out = apply_glossary_hard_replace("Equipe a Power Armor", &glossary, &[]);
        assert_eq!(out, "Equipe a Armadura Potente");
    }

    #[test]
    fn test_hard_replace_skips_blacklisted_and_unapproved() {
        let mut pending = gloss("Settlement", "Assentamento");
        pending.approved = false;
        let glossary = vec![gloss("Vault", "Refúgio"), pending];
        let out = apply_glossary_hard_replace("Vault Settlement", &glossary, &[black("vault")]);
        assert_eq!(out, "Vault Settlement");
    }

    #[test]
    fn test_hard_replace_empty_translation() {
        let glossary = vec![gloss("Vault", "Refúgio")];
        assert_eq!(apply_glossary_hard_replace("", &glossary, &[]), "");
    }
}
