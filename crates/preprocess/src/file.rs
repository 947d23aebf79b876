use crate::classifier::NonCodeClassifier;
use crate::language::Language;
use crate::noncode::{HitCategory, HitPolicy, NonCodeRanges};
use crate::window::{build_window, WeightedHit, WindowOptions};
use cache::CacheStore;
use common::sha256_hex;
use domain::{CandidateFileWindow, CandidateHit, ImpactScanConfig};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Classification and windowing for single files.
#[derive(Debug)]
pub struct FilePreprocessor {
    classifier: NonCodeClassifier,
    policy: HitPolicy,
    window: WindowOptions,
}

/// What happened to one file's hits.
#[derive(Debug, Clone, PartialEq)]
pub struct FileOutcome {
    pub window: Option<CandidateFileWindow>,
    pub kept: usize,
    pub dropped: BTreeMap<HitCategory, usize>,
}

impl FileOutcome {
    pub fn dropped_total(&self) -> usize {
        self.dropped.values().sum()
    }
}

impl FilePreprocessor {
    pub fn new(config: &ImpactScanConfig, cache: Option<Arc<dyn CacheStore>>) -> Self {
        let mut classifier = NonCodeClassifier::new(&config.preprocess);
        if let Some(store) = cache.filter(|_| config.preprocess.cache_noncode_ranges) {
            classifier = classifier.with_cache(store, config.cache.ttl());
        }
        Self {
            classifier,
            policy: HitPolicy::from_config(&config.preprocess),
            window: WindowOptions::from_config(config),
        }
    }

    pub fn classifier(&self) -> &NonCodeClassifier {
        &self.classifier
    }

    pub fn policy(&self) -> HitPolicy {
        self.policy
    }

    /// Classifies `hits` (all from `file`) against `bytes` and builds the
    /// window from the survivors. Non-UTF-8 content skips classification so
    /// byte offsets from the scan stay meaningful.
    pub fn process(&self, file: &Path, bytes: Vec<u8>, hits: Vec<CandidateHit>) -> FileOutcome {
        let content_hash = sha256_hex(&bytes);
        let language = Language::from_path(file);
        let (content, ranges) = match String::from_utf8(bytes) {
            Ok(text) => {
                let ranges =
                    self.classifier
                        .build_ranges_hashed(file, &text, &content_hash, Some(language));
                (text, ranges)
            }
            Err(e) => {
                debug!(file = %file.display(), "non-UTF-8 content, treating all hits as code");
                (String::from_utf8_lossy(e.as_bytes()).into_owned(), NonCodeRanges::empty())
            }
        };

        let mut dropped = BTreeMap::new();
        let mut kept = Vec::with_capacity(hits.len());
        for hit in hits {
            let category = self.policy.classify(hit.byte_offset, &ranges);
            match self.policy.weight(category) {
                Some(weight) => kept.push(WeightedHit {
                    hit,
                    category,
                    weight,
                }),
                None => *dropped.entry(category).or_insert(0) += 1,
            }
        }

        let window = build_window(file, &content, &content_hash, language, &kept, &self.window);
        FileOutcome {
            window,
            kept: kept.len(),
            dropped,
        }
    }
}
