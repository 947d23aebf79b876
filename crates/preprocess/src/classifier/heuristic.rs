use super::RangeBackend;
use crate::language::Language;
use crate::noncode::{ByteSpan, NonCodeRanges};
use once_cell::sync::Lazy;
use regex::Regex;

static DOUBLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""(?:[^"\\\n]|\\.)*""#).expect("valid regex"));
static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^'\\\n]|\\.)*'").expect("valid regex"));
static BACKTICK_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`[^`\n]*`").expect("valid regex"));

/// Line-based fallback: whole-line comments by prefix and same-line quoted
/// strings. Cheap and never fails, but blind to trailing comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicBackend;

impl RangeBackend for HeuristicBackend {
    fn name(&self) -> &'static str {
        "heuristics"
    }

    fn ranges(&self, content: &str, language: Language) -> NonCodeRanges {
        let syntax = language.syntax();
        let mut prefixes: Vec<&str> = syntax.line_comments.to_vec();
        for (open, _) in syntax.block_comments {
            prefixes.push(open);
        }
        let block_continuation = !syntax.block_comments.is_empty();

        let mut comments = Vec::new();
        let mut strings = Vec::new();
        let mut line_start = 0usize;

        for raw in content.split_inclusive('\n') {
            let line = raw.trim_end_matches(['\n', '\r']);
            let trimmed = line.trim_start();
            let indent = line.len() - trimmed.len();
            let is_comment = prefixes.iter().any(|p| trimmed.starts_with(p))
                || (block_continuation && (trimmed.starts_with("* ") || trimmed == "*" || trimmed.starts_with("*/")));

            if is_comment {
                comments.push(ByteSpan::new(line_start + indent, line_start + line.len()));
            } else {
                for (quote, re) in [('"', &*DOUBLE_QUOTED), ('\'', &*SINGLE_QUOTED), ('`', &*BACKTICK_QUOTED)] {
                    if syntax.quotes.contains(&quote) {
                        for m in re.find_iter(line) {
                            strings.push(ByteSpan::new(line_start + m.start(), line_start + m.end()));
                        }
                    }
                }
            }
            line_start += raw.len();
        }

        NonCodeRanges::new(comments, strings, Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noncode::{classify_hit, HitCategory};

    #[test]
    fn test_whole_line_comments_and_inline_strings() {
        let src = "# cache policy\nvalue = \"cache\"\ncache = 1 # trailing cache\n";
        let ranges = HeuristicBackend.ranges(src, Language::Python);
        assert_eq!(classify_hit(2, &ranges, true), HitCategory::Comment);
        let in_string = src.find("\"cache\"").unwrap() as u64 + 1;
        assert_eq!(classify_hit(in_string, &ranges, true), HitCategory::String);
        let code = src.find("cache = 1").unwrap() as u64;
        assert_eq!(classify_hit(code, &ranges, true), HitCategory::Code);
        let trailing = src.rfind("cache").unwrap() as u64;
        assert_eq!(classify_hit(trailing, &ranges, true), HitCategory::Code);
    }

    #[test]
    fn test_block_comment_continuation_lines() {
        let src = "/**\n * cache docs\n */\nfn cache() {}\n";
        let ranges = HeuristicBackend.ranges(src, Language::Rust);
        let doc = src.find("cache docs").unwrap() as u64;
        assert_eq!(classify_hit(doc, &ranges, true), HitCategory::Comment);
        let code = src.rfind("cache").unwrap() as u64;
        assert_eq!(classify_hit(code, &ranges, true), HitCategory::Code);
    }
}
