use domain::config::PreprocessConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteSpan {
    pub start: usize,
    pub end: usize,
}

impl ByteSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Comment, string and disabled-code ranges of one file.
///
/// Each set is sorted and disjoint. Disabled spans may overlap the other two.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonCodeRanges {
    comment_spans: Vec<ByteSpan>,
    string_spans: Vec<ByteSpan>,
    disabled_spans: Vec<ByteSpan>,
}

impl NonCodeRanges {
    /// Sorts each set and merges overlapping or touching spans. Empty spans
    /// are discarded.
    pub fn new(comments: Vec<ByteSpan>, strings: Vec<ByteSpan>, disabled: Vec<ByteSpan>) -> Self {
        Self {
            comment_spans: normalize(comments),
            string_spans: normalize(strings),
            disabled_spans: normalize(disabled),
        }
    }

    /// No non-code ranges: every hit classifies as code.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.comment_spans.is_empty() && self.string_spans.is_empty() && self.disabled_spans.is_empty()
    }

    pub fn comment_spans(&self) -> &[ByteSpan] {
        &self.comment_spans
    }

    pub fn string_spans(&self) -> &[ByteSpan] {
        &self.string_spans
    }

    pub fn disabled_spans(&self) -> &[ByteSpan] {
        &self.disabled_spans
    }

    /// Replaces the disabled set, keeping comments and strings.
    pub fn with_disabled(self, disabled: Vec<ByteSpan>) -> Self {
        Self {
            disabled_spans: normalize(disabled),
            ..self
        }
    }
}

fn normalize(mut spans: Vec<ByteSpan>) -> Vec<ByteSpan> {
    spans.retain(|s| !s.is_empty());
    spans.sort_unstable();
    let mut merged: Vec<ByteSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(prev) if span.start <= prev.end => prev.end = prev.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Binary search over a sorted disjoint set.
fn covers(spans: &[ByteSpan], offset: usize) -> bool {
    let idx = spans.partition_point(|s| s.end <= offset);
    spans.get(idx).is_some_and(|s| s.contains(offset))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitCategory {
    Disabled,
    Comment,
    String,
    Code,
}

impl HitCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            HitCategory::Disabled => "disabled",
            HitCategory::Comment => "comment",
            HitCategory::String => "string",
            HitCategory::Code => "code",
        }
    }
}

impl fmt::Display for HitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Precedence is disabled, then comment, then string, then code. With
/// `keep_strings` off, string literals count as comments.
pub fn classify_hit(byte_offset: u64, ranges: &NonCodeRanges, keep_strings: bool) -> HitCategory {
    let offset = usize::try_from(byte_offset).unwrap_or(usize::MAX);
    if covers(&ranges.disabled_spans, offset) {
        HitCategory::Disabled
    } else if covers(&ranges.comment_spans, offset) {
        HitCategory::Comment
    } else if covers(&ranges.string_spans, offset) {
        if keep_strings {
            HitCategory::String
        } else {
            HitCategory::Comment
        }
    } else {
        HitCategory::Code
    }
}

/// Decides which classified hits survive and how much each one counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitPolicy {
    pub drop_comment_lines: bool,
    pub keep_string_literals: bool,
    pub string_weight_penalty: f32,
}

impl Default for HitPolicy {
    fn default() -> Self {
        Self::from_config(&PreprocessConfig::default())
    }
}

impl HitPolicy {
    pub fn from_config(config: &PreprocessConfig) -> Self {
        Self {
            drop_comment_lines: config.drop_comment_lines,
            keep_string_literals: config.keep_string_literals,
            string_weight_penalty: config.string_weight_penalty.clamp(0.0, 1.0),
        }
    }

    pub fn classify(&self, byte_offset: u64, ranges: &NonCodeRanges) -> HitCategory {
        classify_hit(byte_offset, ranges, self.keep_string_literals)
    }

    /// Weight of a kept hit, or `None` when the hit is dropped.
    pub fn weight(&self, category: HitCategory) -> Option<f32> {
        match category {
            HitCategory::Disabled => None,
            HitCategory::Comment if self.drop_comment_lines => None,
            HitCategory::Comment => Some(1.0),
            HitCategory::String if self.keep_string_literals => {
                Some(1.0 - self.string_weight_penalty)
            }
            HitCategory::String if self.drop_comment_lines => None,
            HitCategory::String => Some(1.0),
            HitCategory::Code => Some(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn span(start: usize, end: usize) -> ByteSpan {
        ByteSpan::new(start, end)
    }

    #[test]
    fn test_constructor_sorts_and_merges() {
        let ranges = NonCodeRanges::new(
            vec![span(30, 40), span(0, 10), span(5, 12), span(12, 14), span(50, 50)],
            vec![],
            vec![],
        );
        assert_eq!(ranges.comment_spans(), &[span(0, 14), span(30, 40)]);
    }

    #[test]
    fn test_boundaries_are_half_open() {
        let ranges = NonCodeRanges::new(vec![span(10, 20)], vec![], vec![]);
        assert_eq!(classify_hit(9, &ranges, true), HitCategory::Code);
        assert_eq!(classify_hit(10, &ranges, true), HitCategory::Comment);
        assert_eq!(classify_hit(19, &ranges, true), HitCategory::Comment);
        assert_eq!(classify_hit(20, &ranges, true), HitCategory::Code);
    }

    #[test]
    fn test_strings_fold_into_comments_when_not_kept() {
        let ranges = NonCodeRanges::new(vec![], vec![span(0, 5)], vec![]);
        assert_eq!(classify_hit(2, &ranges, true), HitCategory::String);
        assert_eq!(classify_hit(2, &ranges, false), HitCategory::Comment);
    }

    #[test]
    fn test_policy_weights() {
        let policy = HitPolicy {
            drop_comment_lines: true,
            keep_string_literals: true,
            string_weight_penalty: 0.15,
        };
        assert_eq!(policy.weight(HitCategory::Disabled), None);
        assert_eq!(policy.weight(HitCategory::Comment), None);
        assert_eq!(policy.weight(HitCategory::Code), Some(1.0));
        let w = policy.weight(HitCategory::String).unwrap();
        assert!((w - 0.85).abs() < 1e-6);

        let keep_comments = HitPolicy {
            drop_comment_lines: false,
            ..policy
        };
        assert_eq!(keep_comments.weight(HitCategory::Comment), Some(1.0));
        assert_eq!(keep_comments.weight(HitCategory::Disabled), None);
    }

    fn spans_strategy() -> impl Strategy<Value = Vec<ByteSpan>> {
        prop::collection::vec((0usize..200, 0usize..30), 0..8)
            .prop_map(|v| v.into_iter().map(|(s, len)| span(s, s + len)).collect())
    }

    proptest! {
        #[test]
        fn prop_precedence_holds_for_any_overlap(
            comments in spans_strategy(),
            strings in spans_strategy(),
            disabled in spans_strategy(),
            offset in 0usize..240,
        ) {
            let in_any = |set: &[ByteSpan]| set.iter().any(|s| s.contains(offset));
            let expected = if in_any(&disabled) {
                HitCategory::Disabled
            } else if in_any(&comments) {
                HitCategory::Comment
            } else if in_any(&strings) {
                HitCategory::String
            } else {
                HitCategory::Code
            };
            let ranges = NonCodeRanges::new(comments, strings, disabled);
            prop_assert_eq!(classify_hit(offset as u64, &ranges, true), expected);
        }

        #[test]
        fn prop_normalized_sets_are_sorted_and_disjoint(comments in spans_strategy()) {
            let ranges = NonCodeRanges::new(comments.clone(), vec![], vec![]);
            for pair in ranges.comment_spans().windows(2) {
                prop_assert!(pair[0].end < pair[1].start);
            }
            let again = NonCodeRanges::new(ranges.comment_spans().to_vec(), vec![], vec![]);
            prop_assert_eq!(again, ranges);
        }
    }
}
