use super::lexer::LexerBackend;
use super::RangeBackend;
use crate::language::Language;
use crate::noncode::{ByteSpan, NonCodeRanges};
use tree_sitter::{Node, Parser};

/// Precise backend for languages with a bundled grammar. Anything else, or a
/// parse that yields no tree, goes through the lexer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterBackend;

impl RangeBackend for TreeSitterBackend {
    fn name(&self) -> &'static str {
        "tree-sitter"
    }

    fn ranges(&self, content: &str, language: Language) -> NonCodeRanges {
        match parse_ranges(content, language) {
            Some(ranges) => ranges,
            None => LexerBackend.ranges(content, language),
        }
    }
}

fn parse_ranges(content: &str, language: Language) -> Option<NonCodeRanges> {
    let grammar = language.tree_sitter_language()?;
    let mut parser = Parser::new();
    if let Err(e) = parser.set_language(&grammar) {
        tracing::debug!(language = %language, error = %e, "grammar rejected, using lexer");
        return None;
    }
    let tree = parser.parse(content, None)?;

    let mut comments = Vec::new();
    let mut strings = Vec::new();
    let mut cursor = tree.walk();

    // Pre-order walk. Comment subtrees are not entered; literals are, so that
    // strings nested inside interpolations get their own spans.
    'walk: loop {
        let node = cursor.node();
        let descend = match node_class(&node) {
            NodeClass::Comment => {
                comments.push(ByteSpan::new(node.start_byte(), node.end_byte()));
                false
            }
            NodeClass::String => {
                strings.extend(literal_spans(&node));
                true
            }
            NodeClass::Other => true,
        };

        if descend && cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
        }
    }

    Some(NonCodeRanges::new(comments, strings, Vec::new()))
}

/// Template substitutions and f-string interpolations hold code.
fn is_interpolation(kind: &str) -> bool {
    matches!(kind, "template_substitution" | "interpolation")
}

/// The literal's byte range minus the interpolations it owns.
fn literal_spans(literal: &Node<'_>) -> Vec<ByteSpan> {
    let mut islands = Vec::new();
    let root = literal.id();
    let mut cursor = literal.walk();
    if cursor.goto_first_child() {
        'walk: loop {
            let node = cursor.node();
            let descend = if is_interpolation(node.kind()) {
                islands.push((node.start_byte(), node.end_byte()));
                false
            } else {
                true
            };

            if descend && cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    continue 'walk;
                }
                if !cursor.goto_parent() || cursor.node().id() == root {
                    break 'walk;
                }
            }
        }
    }

    islands.sort_unstable();
    let mut spans = Vec::with_capacity(islands.len() + 1);
    let mut pos = literal.start_byte();
    for (start, end) in islands {
        if start > pos {
            spans.push(ByteSpan::new(pos, start));
        }
        pos = pos.max(end);
    }
    if literal.end_byte() > pos {
        spans.push(ByteSpan::new(pos, literal.end_byte()));
    }
    spans
}

enum NodeClass {
    Comment,
    String,
    Other,
}

fn node_class(node: &Node<'_>) -> NodeClass {
    let kind = node.kind();
    if kind.ends_with("comment") {
        return NodeClass::Comment;
    }
    match kind {
        "string"
        | "string_literal"
        | "raw_string_literal"
        | "interpreted_string_literal"
        | "template_string"
        | "char_literal"
        | "rune_literal"
        | "concatenated_string" => NodeClass::String,
        _ => NodeClass::Other,
    }
}
