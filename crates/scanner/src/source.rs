use crate::ripgrep::RipgrepScanner;
use crate::stream::HitStream;
use async_trait::async_trait;
use common::ImpactResult;
use domain::CandidateHit;

/// Anything that can turn keywords into a stream of hits.
#[async_trait]
pub trait HitSource: Send + Sync {
    async fn search(&self, keywords: &[String]) -> ImpactResult<HitStream>;
}

#[async_trait]
impl HitSource for RipgrepScanner {
    async fn search(&self, keywords: &[String]) -> ImpactResult<HitStream> {
        RipgrepScanner::search(self, keywords).await
    }
}

/// Returns the same hits for every search.
#[derive(Debug, Clone, Default)]
pub struct StaticHitSource {
    hits: Vec<CandidateHit>,
}

impl StaticHitSource {
    pub fn new(hits: Vec<CandidateHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl HitSource for StaticHitSource {
    async fn search(&self, _keywords: &[String]) -> ImpactResult<HitStream> {
        Ok(HitStream::from_hits(self.hits.clone()))
    }
}
