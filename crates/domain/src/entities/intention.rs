use crate::errors::{DomainError, DomainResult};
use common::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Normalized goal of a change plus the keywords used for the lexical scan.
///
/// Keywords are trimmed, lower-cased and kept in a sorted set so the
/// fingerprint does not depend on the order the model returned them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intention {
    normalized_goal: String,
    keywords: BTreeSet<String>,
}

impl Intention {
    pub fn new<I, S>(goal: impl Into<String>, keywords: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let normalized_goal = goal.into().trim().to_string();
        if normalized_goal.is_empty() {
            return Err(DomainError::EmptyGoal);
        }

        let keywords: BTreeSet<String> = keywords
            .into_iter()
            .filter_map(|k| normalize_keyword(k.as_ref()))
            .collect();
        if keywords.is_empty() {
            return Err(DomainError::EmptyKeywords);
        }

        Ok(Self {
            normalized_goal,
            keywords,
        })
    }

    pub fn normalized_goal(&self) -> &str {
        &self.normalized_goal
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords.iter().cloned().collect()
    }

    /// Stable SHA-256 hex digest over goal and keywords.
    pub fn fingerprint(&self) -> String {
        Fingerprint::new()
            .part(&self.normalized_goal)
            .parts(self.keywords.iter())
            .finish()
    }
}

fn normalize_keyword(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_normalized_and_deduplicated() {
        let intention = Intention::new("Improve caching", ["Cache", " cache ", "TTL", ""]).unwrap();
        let keywords: Vec<_> = intention.keywords().iter().map(String::as_str).collect();
        assert_eq!(keywords, vec!["cache", "ttl"]);
    }

    #[test]
    fn test_fingerprint_ignores_keyword_order() {
        let a = Intention::new("goal", ["b", "a"]).unwrap();
        let b = Intention::new("goal", ["a", "b"]).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = Intention::new("other goal", ["a", "b"]).unwrap();
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_rejects_empty_inputs() {
        assert_eq!(
            Intention::new("  ", ["a"]).unwrap_err(),
            DomainError::EmptyGoal
        );
        assert_eq!(
            Intention::new("goal", ["  "]).unwrap_err(),
            DomainError::EmptyKeywords
        );
    }
}
