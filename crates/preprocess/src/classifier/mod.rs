//! Non-code range detection.
//!
//! Three interchangeable backends share one output contract
//! ([`NonCodeRanges`]); they are not required to agree byte for byte.
//! `#if 0` regions, the size cap and range caching are applied here, on top
//! of whichever backend is configured.

mod heuristic;
mod if0;
mod lexer;
mod tree_sitter;

pub use heuristic::HeuristicBackend;
pub use if0::disabled_blocks;
pub use lexer::LexerBackend;
pub use tree_sitter::TreeSitterBackend;

use crate::language::Language;
use crate::noncode::NonCodeRanges;
use cache::{CacheKey, CacheStore, NAMESPACE_NONCODE};
use common::sha256_hex;
use domain::config::{AnalyzerKind, PreprocessConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A way of finding comments and string literals in source text.
pub trait RangeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn ranges(&self, content: &str, language: Language) -> NonCodeRanges;
}

pub fn backend_for(kind: AnalyzerKind) -> Box<dyn RangeBackend> {
    match kind {
        AnalyzerKind::TreeSitter => Box::new(TreeSitterBackend),
        AnalyzerKind::Lexer => Box::new(LexerBackend),
        AnalyzerKind::Heuristics => Box::new(HeuristicBackend),
    }
}

pub struct NonCodeClassifier {
    backend: Box<dyn RangeBackend>,
    detect_if0_blocks: bool,
    max_file_bytes: u64,
    cache: Option<Arc<dyn CacheStore>>,
    cache_ttl: Option<Duration>,
}

impl std::fmt::Debug for NonCodeClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonCodeClassifier")
            .field("backend", &self.backend.name())
            .field("detect_if0_blocks", &self.detect_if0_blocks)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl NonCodeClassifier {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            backend: backend_for(config.analyzer),
            detect_if0_blocks: config.detect_if0_blocks,
            max_file_bytes: config.max_file_bytes_for_parse,
            cache: None,
            cache_ttl: None,
        }
    }

    /// Caches computed ranges in the `noncode` namespace.
    pub fn with_cache(mut self, store: Arc<dyn CacheStore>, ttl: Option<Duration>) -> Self {
        self.cache = Some(store);
        self.cache_ttl = ttl;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn build_ranges(
        &self,
        file: &Path,
        content: &str,
        language_hint: Option<Language>,
    ) -> NonCodeRanges {
        self.build_ranges_hashed(file, content, &sha256_hex(content), language_hint)
    }

    /// Same as [`build_ranges`](Self::build_ranges) with a precomputed
    /// content hash.
    pub fn build_ranges_hashed(
        &self,
        file: &Path,
        content: &str,
        content_hash: &str,
        language_hint: Option<Language>,
    ) -> NonCodeRanges {
        if content.len() as u64 > self.max_file_bytes {
            debug!(file = %file.display(), bytes = content.len(), "file above parse cap, treating all hits as code");
            return NonCodeRanges::empty();
        }
        let language = language_hint.unwrap_or_else(|| Language::from_path(file));

        let key = self.cache.as_ref().map(|_| {
            CacheKey::new()
                .part("content", content_hash)
                .part("backend", self.backend.name())
                .part("if0", if self.detect_if0_blocks { "1" } else { "0" })
                .part("language", language.as_str())
                .build()
        });

        if let (Some(store), Some(key)) = (&self.cache, &key) {
            match cache::get_json::<NonCodeRanges>(store.as_ref(), NAMESPACE_NONCODE, key) {
                Ok(Some(ranges)) => return ranges,
                Ok(None) => {}
                Err(e) => warn!(file = %file.display(), error = %e, "noncode cache read failed"),
            }
        }

        let mut ranges = self.backend.ranges(content, language);
        if self.detect_if0_blocks && language.has_preprocessor() {
            ranges = ranges.with_disabled(disabled_blocks(content));
        }

        if let (Some(store), Some(key)) = (&self.cache, &key) {
            if let Err(e) =
                cache::set_json(store.as_ref(), NAMESPACE_NONCODE, key, &ranges, self.cache_ttl)
            {
                warn!(file = %file.display(), error = %e, "noncode cache write failed");
            }
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noncode::{classify_hit, HitCategory};
    use cache::MemoryCacheStore;

    const C_SRC: &str = "int live;\n#if 0\nint cache; // cache\n#endif\nint cache;\n";

    #[test]
    fn test_if0_wins_over_comments() {
        let classifier = NonCodeClassifier::new(&PreprocessConfig::default());
        let ranges = classifier.build_ranges(Path::new("a.c"), C_SRC, None);
        let inside = C_SRC.find("cache").unwrap() as u64;
        let comment = C_SRC.find("// cache").unwrap() as u64 + 3;
        let live = C_SRC.rfind("cache").unwrap() as u64;
        assert_eq!(classify_hit(inside, &ranges, true), HitCategory::Disabled);
        assert_eq!(classify_hit(comment, &ranges, true), HitCategory::Disabled);
        assert_eq!(classify_hit(live, &ranges, true), HitCategory::Code);
    }

    #[test]
    fn test_if0_detection_can_be_disabled() {
        let config = PreprocessConfig {
            detect_if0_blocks: false,
            ..PreprocessConfig::default()
        };
        let ranges = NonCodeClassifier::new(&config).build_ranges(Path::new("a.c"), C_SRC, None);
        assert!(ranges.disabled_spans().is_empty());
    }

    #[test]
    fn test_oversized_files_get_empty_ranges() {
        let config = PreprocessConfig {
            max_file_bytes_for_parse: 8,
            ..PreprocessConfig::default()
        };
        let ranges = NonCodeClassifier::new(&config).build_ranges(
            Path::new("a.rs"),
            "// cache comment\n",
            None,
        );
        assert!(ranges.is_empty());
    }

    #[test]
    fn test_language_hint_overrides_extension() {
        let classifier = NonCodeClassifier::new(&PreprocessConfig::default());
        let ranges = classifier.build_ranges(Path::new("script"), "# cache\n", Some(Language::Python));
        assert_eq!(classify_hit(2, &ranges, true), HitCategory::Comment);
    }

    #[test]
    fn test_ranges_are_cached_by_content() {
        let store = Arc::new(MemoryCacheStore::new());
        let classifier = NonCodeClassifier::new(&PreprocessConfig::default())
            .with_cache(store.clone(), None);
        let first = classifier.build_ranges(Path::new("a.rs"), "// cache\nfn f() {}\n", None);
        assert_eq!(store.len(), 1);
        let second = classifier.build_ranges(Path::new("b.rs"), "// cache\nfn f() {}\n", None);
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().hits, 1);
    }
}
