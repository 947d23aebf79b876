//! Approximate token accounting: one token per four characters.

pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Keeps whole leading lines while they fit in `max_tokens`. If the first
/// line alone is too long it is cut at a char boundary.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let budget = max_tokens.saturating_mul(CHARS_PER_TOKEN);
    if text.chars().count() <= budget {
        return text.to_string();
    }

    let mut out = String::new();
    let mut used = 0usize;
    for line in text.split_inclusive('\n') {
        let len = line.chars().count();
        if used + len > budget {
            if out.is_empty() {
                out.extend(line.chars().take(budget));
            }
            break;
        }
        out.push_str(line);
        used += len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("ééééé"), 2);
    }

    #[test]
    fn test_truncate_keeps_leading_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        let out = truncate_to_tokens(text, 3);
        assert_eq!(out, "aaaa\nbbbb\n");
        assert!(estimate_tokens(&out) <= 3);
    }

    #[test]
    fn test_truncate_cuts_oversized_first_line_on_char_boundary() {
        let text = "ééééééééééé\nshort\n";
        let out = truncate_to_tokens(text, 2);
        assert_eq!(out.chars().count(), 8);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_text_within_budget_is_untouched() {
        assert_eq!(truncate_to_tokens("fits\n", 100), "fits\n");
    }
}
