//! Prompt templates for the three model-backed steps.

use crate::providers::ChatMessage;
use std::fmt::Write;

/// A named system/user template pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

pub const INTENTION_PROMPT: PromptTemplate = PromptTemplate {
    name: "intention",
    system: "You are an assistant that extracts structured intents for repository impact analysis. \
Reply with a single JSON object and nothing else.",
    user: "Instruction: {instruction}\nExtra keywords: {extra_keywords}\n\
Return JSON with two fields: \"intention\" (one sentence restating the goal of the change) and \
\"keywords\" (an array of identifiers, API names or terms likely to appear literally in affected source files).",
};

pub const TRIAGE_PROMPT: PromptTemplate = PromptTemplate {
    name: "triage",
    system: "You triage source files for a planned code change. Judge only from the excerpt. \
Reply with a single JSON object and nothing else.",
    user: "Planned change: {intention}\nKeywords: {keywords}\nFile: {file}\n\nExcerpt:\n{context}\n\n\
Return JSON {\"score\": number between 0 and 1, \"rationale\": short text} where score is the \
likelihood that this file must be changed or reviewed for the planned change.",
};

pub const ANALYSIS_PROMPT: PromptTemplate = PromptTemplate {
    name: "analysis",
    system: "You assess the impact of a planned code change on one source file. \
Reply with a single JSON object and nothing else.",
    user: "Planned change: {intention}\nKeywords: {keywords}\nFile: {file}\nMatched lines: {lines}\n\n\
Excerpt:\n{context}\n\n\
Return JSON with fields: \"impact_level\" (one of \"none\", \"low\", \"medium\", \"high\"), \
\"reason\" (short explanation), \"confidence\" (number between 0 and 1) and \
\"perspective_scores\" (object with exactly these keys, each a number between 0 and 1: {perspectives}).",
};

impl PromptTemplate {
    /// Substitutes `{name}` placeholders. Unknown placeholders are left as is.
    pub fn render(&self, vars: &[(&str, &str)]) -> Vec<ChatMessage> {
        let mut user = self.user.to_string();
        for (key, value) in vars {
            user = user.replace(&format!("{{{key}}}"), value);
        }
        vec![ChatMessage::system(self.system), ChatMessage::user(user)]
    }
}

pub fn intention_messages(instruction: &str, extra_keywords: &[String]) -> Vec<ChatMessage> {
    let extras = if extra_keywords.is_empty() {
        "(none)".to_string()
    } else {
        extra_keywords.join(", ")
    };
    INTENTION_PROMPT.render(&[("instruction", instruction), ("extra_keywords", &extras)])
}

pub fn triage_messages(
    intention: &str,
    keywords: &[String],
    file: &str,
    context: &str,
) -> Vec<ChatMessage> {
    let keywords = keywords.join(", ");
    TRIAGE_PROMPT.render(&[
        ("intention", intention),
        ("keywords", &keywords),
        ("file", file),
        ("context", context),
    ])
}

pub fn analysis_messages(
    intention: &str,
    keywords: &[String],
    file: &str,
    lines: &[u32],
    context: &str,
    perspectives: &[String],
) -> Vec<ChatMessage> {
    let keywords = keywords.join(", ");
    let mut line_list = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            line_list.push_str(", ");
        }
        let _ = write!(line_list, "{line}");
    }
    let perspectives = perspectives
        .iter()
        .map(|p| format!("\"{p}\""))
        .collect::<Vec<_>>()
        .join(", ");
    ANALYSIS_PROMPT.render(&[
        ("intention", intention),
        ("keywords", &keywords),
        ("file", file),
        ("lines", &line_list),
        ("context", context),
        ("perspectives", &perspectives),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatRole;

    #[test]
    fn test_intention_prompt_lists_extras() {
        let messages = intention_messages("improve caching layer", &["cache".into(), "ttl".into()]);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[1].content.contains("Instruction: improve caching layer"));
        assert!(messages[1].content.contains("Extra keywords: cache, ttl"));
    }

    #[test]
    fn test_analysis_prompt_names_every_perspective() {
        let messages = analysis_messages(
            "goal",
            &["cache".into()],
            "src/a.rs",
            &[3, 9],
            "@@ lines 1-4 @@",
            &["security".into(), "performance".into()],
        );
        let user = &messages[1].content;
        assert!(user.contains("\"security\", \"performance\""));
        assert!(user.contains("Matched lines: 3, 9"));
        assert!(!user.contains("{perspectives}"));
    }
}
