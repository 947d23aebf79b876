use crate::noncode::ByteSpan;

enum Frame {
    /// Opened the current disabled region.
    Opener,
    Other,
}

/// Byte ranges of `#if 0` blocks. The region runs from the start of the
/// `#if 0` line through the end of its matching `#endif` line, or up to the
/// matching `#else`/`#elif`. Nested conditionals inside a disabled region are
/// tracked so an inner `#endif` does not close it.
pub fn disabled_blocks(content: &str) -> Vec<ByteSpan> {
    let mut spans = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut open: Option<usize> = None;
    let mut line_start = 0usize;

    for line in content.split_inclusive('\n') {
        let line_end = line_start + line.len();
        if let Some((directive, rest)) = directive(line) {
            match directive {
                "if" | "ifdef" | "ifndef" => {
                    if open.is_none() && directive == "if" && is_false_condition(rest) {
                        open = Some(line_start);
                        stack.push(Frame::Opener);
                    } else {
                        stack.push(Frame::Other);
                    }
                }
                "else" | "elif" | "elifdef" | "elifndef" => {
                    if matches!(stack.last(), Some(Frame::Opener)) {
                        if let Some(start) = open.take() {
                            spans.push(ByteSpan::new(start, line_start));
                        }
                        if let Some(top) = stack.last_mut() {
                            *top = Frame::Other;
                        }
                    }
                }
                "endif" => {
                    if let Some(Frame::Opener) = stack.pop() {
                        if let Some(start) = open.take() {
                            spans.push(ByteSpan::new(start, line_end));
                        }
                    }
                }
                _ => {}
            }
        }
        line_start = line_end;
    }

    if let Some(start) = open {
        spans.push(ByteSpan::new(start, content.len()));
    }
    spans
}

/// Splits `#  directive rest` into its name and the remaining text.
fn directive(line: &str) -> Option<(&str, &str)> {
    let body = line.trim_start().strip_prefix('#')?.trim_start();
    let end = body
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(body.len());
    let (name, rest) = body.split_at(end);
    (!name.is_empty()).then_some((name, rest.trim()))
}

fn is_false_condition(rest: &str) -> bool {
    let cond = rest
        .split("//")
        .next()
        .unwrap_or_default()
        .split("/*")
        .next()
        .unwrap_or_default()
        .trim();
    let cond = cond.trim_start_matches('(').trim_end_matches(')').trim();
    cond == "0" || cond == "false"
}
