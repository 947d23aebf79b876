//! Single-pass character lexer driven by [`Syntax`] markers.

use super::RangeBackend;
use crate::language::{Language, Syntax};
use crate::noncode::{ByteSpan, NonCodeRanges};

#[derive(Debug, Clone, Copy, Default)]
pub struct LexerBackend;

impl RangeBackend for LexerBackend {
    fn name(&self) -> &'static str {
        "lexer"
    }

    fn ranges(&self, content: &str, language: Language) -> NonCodeRanges {
        lex(content, &language.syntax())
    }
}

pub(crate) fn lex(content: &str, syntax: &Syntax) -> NonCodeRanges {
    let bytes = content.as_bytes();
    let mut comments = Vec::new();
    let mut strings = Vec::new();
    let mut i = 0usize;

    'outer: while i < bytes.len() {
        let rest = &bytes[i..];

        for marker in syntax.line_comments {
            if rest.starts_with(marker.as_bytes()) {
                let end = find_byte(bytes, i, b'\n').unwrap_or(bytes.len());
                comments.push(ByteSpan::new(i, end));
                i = end;
                continue 'outer;
            }
        }

        for (open, close) in syntax.block_comments {
            if rest.starts_with(open.as_bytes()) {
                let end = find_seq(bytes, i + open.len(), close.as_bytes())
                    .map(|pos| pos + close.len())
                    .unwrap_or(bytes.len());
                comments.push(ByteSpan::new(i, end));
                i = end;
                continue 'outer;
            }
        }

        if syntax.triple_quotes {
            for delim in [b"\"\"\"", b"'''"] {
                if rest.starts_with(delim) {
                    let end = find_seq(bytes, i + 3, delim)
                        .map(|pos| pos + 3)
                        .unwrap_or(bytes.len());
                    strings.push(ByteSpan::new(i, end));
                    i = end;
                    continue 'outer;
                }
            }
        }

        let c = bytes[i];
        if c.is_ascii() && syntax.quotes.contains(&(c as char)) {
            let multiline = syntax.multiline_quotes.contains(&(c as char));
            let end = scan_quoted(bytes, i, c, multiline);
            strings.push(ByteSpan::new(i, end));
            i = end;
            continue;
        }

        i += 1;
    }

    NonCodeRanges::new(comments, strings, Vec::new())
}

/// End (exclusive) of the literal opened at `start`. Unterminated
/// single-line literals stop at the newline.
fn scan_quoted(bytes: &[u8], start: usize, quote: u8, multiline: bool) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' if !multiline => return j,
            b if b == quote => return j + 1,
            _ => j += 1,
        }
    }
    bytes.len()
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes[from.min(bytes.len())..]
        .iter()
        .position(|&b| b == needle)
        .map(|p| p + from)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    let from = from.min(bytes.len());
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noncode::{classify_hit, HitCategory};

    fn offset_of(src: &str, needle: &str) -> u64 {
        src.find(needle).unwrap() as u64
    }

    #[test]
    fn test_rust_comments_and_strings() {
        let src = "fn a() { // cache here\n    let s = \"cache\";\n    /* cache\n block */ cache();\n}\n";
        let ranges = LexerBackend.ranges(src, Language::Rust);
        assert_eq!(classify_hit(offset_of(src, "cache here"), &ranges, true), HitCategory::Comment);
        assert_eq!(classify_hit(offset_of(src, "cache\";"), &ranges, true), HitCategory::String);
        assert_eq!(classify_hit(offset_of(src, "cache\n block"), &ranges, true), HitCategory::Comment);
        assert_eq!(classify_hit(offset_of(src, "cache();"), &ranges, true), HitCategory::Code);
    }

    #[test]
    fn test_rust_lifetimes_are_code() {
        let src = "fn get<'a>(c: &'a Cache) -> &'a str { c.cache }\n";
        let ranges = LexerBackend.ranges(src, Language::Rust);
        assert_eq!(classify_hit(offset_of(src, "c.cache"), &ranges, true), HitCategory::Code);
    }

    #[test]
    fn test_python_triple_quotes_and_hash_comments() {
        let src = "def f():\n    \"\"\"Uses the cache.\n    \"\"\"\n    # cache note\n    return cache\n";
        let ranges = LexerBackend.ranges(src, Language::Python);
        assert_eq!(classify_hit(offset_of(src, "cache."), &ranges, true), HitCategory::String);
        assert_eq!(classify_hit(offset_of(src, "cache note"), &ranges, true), HitCategory::Comment);
        assert_eq!(classify_hit(offset_of(src, "cache\n"), &ranges, true), HitCategory::Code);
    }

    #[test]
    fn test_escaped_quote_and_unterminated_literal() {
        let src = "x = \"a\\\"cache\" + cache\ny = 'open\ncache\n";
        let ranges = LexerBackend.ranges(src, Language::JavaScript);
        assert_eq!(classify_hit(offset_of(src, "cache\" +"), &ranges, true), HitCategory::String);
        assert_eq!(classify_hit(offset_of(src, "cache\ny"), &ranges, true), HitCategory::Code);
        let last = src.rfind("cache").unwrap() as u64;
        assert_eq!(classify_hit(last, &ranges, true), HitCategory::Code);
    }
}
