//! Internal helpers for text folding and comparison.
//!
//! These utilities are **not** part of the public API. They centralize the
//! case/accent folding used by status lookups, search and sorting so every
//! view compares strings the same way.

use std::cmp::Ordering;

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Folds a label to a lookup key: accents stripped, lowercase, every run of
/// non-alphanumeric characters collapsed to one space.
///
/// `"Proposal/Price Quote"` and `"proposal price-quote"` fold to the same key.
pub(crate) fn fold_key(input: &str) -> String {
    let mut out = String::new();
    let mut prev_space = false;
    for ch in input.trim().nfkd() {
        if is_combining_mark(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_space = false;
        } else if !out.is_empty() && !prev_space {
            out.push(' ');
            prev_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Folds free text for substring search: accents stripped and lowercase, but
/// punctuation kept so `@domain` or `+39` still match literally.
pub(crate) fn fold_text(input: &str) -> String {
    input
        .trim()
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Keeps only ASCII digits, for phone matching regardless of formatting.
pub(crate) fn digits(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Collation used for string columns: folded comparison first, raw value as
/// a tie-break so the order stays total.
pub(crate) fn collate(a: &str, b: &str) -> Ordering {
    fold_text(a)
        .cmp(&fold_text(b))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_key_collapses_punctuation_and_accents() {
        assert_eq!(fold_key("  Négociation / Review "), "negociation review");
        assert_eq!(fold_key("Closed-Won"), "closed won");
        assert_eq!(fold_key("---"), "");
    }

    #[test]
    fn fold_text_keeps_symbols() {
        assert_eq!(fold_text("Zoë@Example.COM"), "zoe@example.com");
    }

    #[test]
    fn collate_ignores_case_before_raw_order() {
        assert_eq!(collate("alice", "Bob"), Ordering::Less);
        assert_eq!(collate("Émile", "Fabien"), Ordering::Less);
        assert_eq!(collate("x", "x"), Ordering::Equal);
    }
}
