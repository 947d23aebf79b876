//! Lexical pre-filter: runs ripgrep over the target tree and turns its JSON
//! output into [`domain::CandidateHit`]s.

pub mod rg_json;
pub mod ripgrep;
pub mod source;
pub mod stream;

pub use rg_json::{AssemblerError, HitAssembler};
pub use ripgrep::{BlockingHits, RipgrepScanner, ScanOptions};
pub use source::{HitSource, StaticHitSource};
pub use stream::HitStream;
