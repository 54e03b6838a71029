//! Letter-case inference and projection.
//!
//! Casing is read from a source sample and mirrored onto a target string,
//! using a four-class model: ALL-CAPS, all-lower, Title-Case, mixed.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use super::terms::flexible_pattern;

static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
static LETTER_OR_MARK_REGEX: OnceLock<Regex> = OnceLock::new();
static CAPS_RUN_REGEX: OnceLock<Regex> = OnceLock::new();

/// A Unicode word: a letter followed by letters or combining marks.
fn word_regex() -> &'static Regex {
    WORD_REGEX.get_or_init(|| Regex::new(r"\p{L}[\p{L}\p{M}]*").unwrap())
}

fn is_letter_or_mark(c: char) -> bool {
    let re = LETTER_OR_MARK_REGEX.get_or_init(|| Regex::new(r"^[\p{L}\p{M}]$").unwrap());
    let mut buf = [0u8; 4];
    re.is_match(c.encode_utf8(&mut buf))
}

/// Casing pattern of a sample string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStyle {
    Upper,
    Lower,
    Title,
    Mixed,
}

fn is_title_word(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest = chars.as_str();
    first.to_uppercase().eq(std::iter::once(first)) && rest == rest.to_lowercase()
}

/// Classify the casing of `sample`.
///
/// Samples without any cased letter (empty, digits, punctuation) classify as
/// [`CaseStyle::Mixed`] so they never force a casing onto a target.
pub fn classify_case(sample: &str) -> CaseStyle {
    if !sample.chars().any(|c| c.is_uppercase() || c.is_lowercase()) {
        return CaseStyle::Mixed;
    }
    if sample == sample.to_uppercase() {
        return CaseStyle::Upper;
    }
    if sample == sample.to_lowercase() {
        return CaseStyle::Lower;
    }
    if sample.split_whitespace().all(is_title_word) {
        return CaseStyle::Title;
    }
    CaseStyle::Mixed
}

/// Lowercase `text`, then uppercase the first letter of every Unicode word.
pub fn to_title_case_all(text: &str) -> String {
    let lower = text.to_lowercase();
    word_regex()
        .replace_all(&lower, |caps: &regex::Captures| {
            let word = &caps[0];
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .into_owned()
}

/// Mirror the casing of `sample` onto `target`. Mixed samples leave the
/// target untouched.
pub fn apply_case_like(sample: &str, target: &str) -> String {
    if sample.is_empty() || target.is_empty() {
        return target.to_string();
    }
    match classify_case(sample) {
        CaseStyle::Upper => target.to_uppercase(),
        CaseStyle::Lower => target.to_lowercase(),
        CaseStyle::Title => to_title_case_all(target),
        CaseStyle::Mixed => target.to_string(),
    }
}

/// Distinct maximal upper-case words (two or more letters), in order of first
/// appearance.
pub fn extract_all_caps_terms(text: &str) -> Vec<String> {
    let caps_run = CAPS_RUN_REGEX.get_or_init(|| Regex::new(r"^\p{Lu}[\p{Lu}\p{M}]+$").unwrap());
    let mut terms: Vec<String> = Vec::new();
    for word in word_regex().find_iter(text) {
        let word = word.as_str();
        if caps_run.is_match(word) && !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms
}

fn bounded_at(text: &str, range: &Range<usize>) -> bool {
    let before_ok = text[..range.start]
        .chars()
        .next_back()
        .map_or(true, |c| !is_letter_or_mark(c));
    let after_ok = text[range.end..]
        .chars()
        .next()
        .map_or(true, |c| !is_letter_or_mark(c));
    before_ok && after_ok
}

fn next_char_boundary(text: &str, at: usize) -> usize {
    at + text[at..].chars().next().map_or(1, char::len_utf8)
}

/// Replace exact, case-sensitive, whole-word occurrences of `word`.
///
/// An occurrence glued to letters or marks on either side (as in
/// `superAÇÃO`) is left alone; surrounding punctuation and spacing are kept
/// byte for byte.
pub fn replace_word_unicode(text: &str, word: &str, replacement: &str) -> String {
    if text.is_empty() || word.is_empty() {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut search = 0;
    while search <= text.len() {
        let Some(offset) = text[search..].find(word) else {
            break;
        };
        let range = search + offset..search + offset + word.len();
        if bounded_at(text, &range) {
            out.push_str(&text[last..range.start]);
            out.push_str(replacement);
            last = range.end;
            search = range.end;
        } else {
            search = next_char_boundary(text, range.start);
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Case-insensitive whole-word occurrences of `needle` in `haystack`.
fn whole_word_matches_ci(haystack: &str, needle: &str) -> Vec<Range<usize>> {
    let pattern = flexible_pattern(needle);
    if pattern.is_empty() {
        return Vec::new();
    }
    let Ok(re) = Regex::new(&format!("(?i){}", pattern)) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    let mut pos = 0;
    while pos <= haystack.len() {
        let Some(m) = re.find_at(haystack, pos) else {
            break;
        };
        let range = m.range();
        if bounded_at(haystack, &range) {
            pos = range.end.max(next_char_boundary(haystack, range.start));
            found.push(range);
        } else {
            pos = next_char_boundary(haystack, range.start);
        }
        if pos >= haystack.len() {
            break;
        }
    }
    found
}

/// Project the casing that glossary or memory source terms actually have in
/// `original` onto their target terms inside `target`.
///
/// Pairs are `(source_term, target_term)` and apply in order; a later pair may
/// rewrite what an earlier one produced.
pub fn project_glossary_case_in_sentence(
    original: &str,
    target: &str,
    pairs: &[(&str, &str)],
) -> String {
    let mut out = target.to_string();
    for (source_term, target_term) in pairs {
        if source_term.trim().is_empty() || target_term.trim().is_empty() {
            continue;
        }
        let Some(first) = whole_word_matches_ci(original, source_term).into_iter().next() else {
            continue;
        };
        let projected = apply_case_like(&original[first], target_term);

        let matches = whole_word_matches_ci(&out, target_term);
        if matches.is_empty() {
            continue;
        }
        let mut rebuilt = String::with_capacity(out.len());
        let mut last = 0;
        for range in matches {
            rebuilt.push_str(&out[last..range.start]);
            rebuilt.push_str(&projected);
            last = range.end;
        }
        rebuilt.push_str(&out[last..]);
        out = rebuilt;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== classify / apply ====================

    #[test]
    fn test_classify_case() {
        assert_eq!(classify_case("HELLO"), CaseStyle::Upper);
        assert_eq!(classify_case("hello"), CaseStyle::Lower);
        assert_eq!(classify_case("Hello World"), CaseStyle::Title);
        assert_eq!(classify_case("HeLLo"), CaseStyle::Mixed);
        assert_eq!(classify_case("123 !"), CaseStyle::Mixed);
        assert_eq!(classify_case(""), CaseStyle::Mixed);
    }

    #[test]
    fn test_apply_case_like_with_accents() {
        assert_eq!(apply_case_like("HELLO", "café"), "CAFÉ");
        assert_eq!(apply_case_like("hello", "CAFÉ"), "café");
        assert_eq!(
            apply_case_like("Hello World", "árvore encantada"),
            "Árvore Encantada"
        );
        assert_eq!(apply_case_like("AÇÃO", "café"), "CAFÉ");
        assert_eq!(apply_case_like("ação", "CAFÉ"), "café");
        assert_eq!(apply_case_like("Olá Mundo", "árvore encantada"), "Árvore Encantada");
    }

    #[test]
    fn test_apply_case_like_mixed_is_unchanged() {
        assert_eq!(apply_case_like("HeLLo", "Café"), "Café");
        assert_eq!(apply_case_like("iPhone", "telefone"), "telefone");
    }

    #[test]
    fn test_apply_case_like_empty_inputs_pass_through() {
        assert_eq!(apply_case_like("", "Café"), "Café");
        assert_eq!(apply_case_like("HELLO", ""), "");
        assert_eq!(apply_case_like("42", "Café"), "Café");
    }

    #[test]
    fn test_to_title_case_all_keeps_punctuation() {
        assert_eq!(to_title_case_all("olá, MUNDO-novo!"), "Olá, Mundo-Novo!");
    }

    // ==================== extract_all_caps_terms ====================

    #[test]
    fn test_extract_all_caps_terms_unique_accented() {
        let text = "O relatório cita ÓLEO, ÓLEO e ÍNDICE; mas não CaSo nem X.";
        let mut terms = extract_all_caps_terms(text);
        terms.sort();
        assert_eq!(terms, vec!["ÍNDICE", "ÓLEO"]);
    }

    #[test]
    fn test_extract_all_caps_terms_order_and_words_only() {
        let text = "He is very LUCKY and HANDSOME. LUCKY again, A1 B2";
        assert_eq!(extract_all_caps_terms(text), vec!["LUCKY", "HANDSOME"]);
    }

    #[test]
    fn test_extract_all_caps_terms_ignores_embedded_runs() {
        assert!(extract_all_caps_terms("superAÇÃO and eXTRA").is_empty());
    }

    // ==================== replace_word_unicode ====================

    #[test]
    fn test_replace_word_unicode_skips_embedded() {
        assert_eq!(
            replace_word_unicode("superAÇÃO ou AÇÃO isolada", "AÇÃO", "X"),
            "superAÇÃO ou X isolada"
        );
    }

    #[test]
    fn test_replace_word_unicode_preserves_punctuation() {
        assert_eq!(
            replace_word_unicode("Olá, AÇÃO! (AÇÃO) AÇÃOzinho", "AÇÃO", "resposta"),
            "Olá, resposta! (resposta) AÇÃOzinho"
        );
    }

    #[test]
    fn test_replace_word_unicode_is_case_sensitive() {
        assert_eq!(
            replace_word_unicode("ação e AÇÃO", "AÇÃO", "X"),
            "ação e X"
        );
    }

    #[test]
    fn test_replace_word_unicode_phrase() {
        assert_eq!(
            replace_word_unicode("a armadura potente, armadura potentes", "armadura potente", "ARMADURA POTENTE"),
            "a ARMADURA POTENTE, armadura potentes"
        );
    }

    #[test]
    fn test_replace_word_unicode_empty_needle() {
        assert_eq!(replace_word_unicode("abc", "", "X"), "abc");
    }

    // ==================== project_glossary_case_in_sentence ====================

    #[test]
    fn test_project_uses_matched_casing() {
        let original = "Equip the POWER ARMOR now";
        let target = "Equipe a armadura potente agora";
        let pairs = [("power armor", "armadura potente")];
        assert_eq!(
            project_glossary_case_in_sentence(original, target, &pairs),
            "Equipe a ARMADURA POTENTE agora"
        );
    }

    #[test]
    fn test_project_title_case_match() {
        let original = "The Power Armor is here";
        let target = "A armadura potente está aqui";
        let pairs = [("POWER ARMOR", "armadura potente")];
        assert_eq!(
            project_glossary_case_in_sentence(original, target, &pairs),
            "A Armadura Potente está aqui"
        );
    }

    #[test]
    fn test_project_skips_absent_terms() {
        let pairs = [("settlement", "assentamento")];
        assert_eq!(
            project_glossary_case_in_sentence("Nothing here", "Nada aqui", &pairs),
            "Nada aqui"
        );
    }

    #[test]
    fn test_project_requires_whole_word_in_original() {
        let pairs = [("mod", "modificação")];
        assert_eq!(
            project_glossary_case_in_sentence("MODDED game", "jogo modificação", &pairs),
            "jogo modificação"
        );
    }

    #[test]
    fn test_project_later_pairs_overwrite() {
        let original = "STIMPAK and Stimpak";
        let target = "estimulante";
        let pairs = [("stimpak", "estimulante"), ("Stimpak", "estimulante")];
        // both pairs find the first occurrence "STIMPAK"
        assert_eq!(
            project_glossary_case_in_sentence(original, target, &pairs),
            "ESTIMULANTE"
        );
    }
}
