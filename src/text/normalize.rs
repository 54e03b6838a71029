/// Canonical comparison key: trimmed, whitespace runs collapsed to one space,
/// lowercased.
///
/// Every memory lookup and similarity score goes through this, so it must
/// stay idempotent.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_collapses_and_lowercases() {
        assert_eq!(normalize("  Foo   Bar "), "foo bar");
        assert_eq!(normalize("foo bar"), "foo bar");
        assert_eq!(normalize("  Foo   Bar "), normalize("foo bar"));
    }

    #[test]
    fn test_normalize_line_breaks_and_tabs() {
        assert_eq!(normalize("Alpha\n\tBeta\r\nGamma"), "alpha beta gamma");
    }

    #[test]
    fn test_normalize_unicode() {
        assert_eq!(normalize("  AÇÃO   Rápida "), "ação rápida");
    }

    #[test]
    fn test_normalize_empty_and_blank() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t "), "");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(s in "\\PC*") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
