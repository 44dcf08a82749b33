//! Domain entities, address normalization, and comparable-ranking
//! primitives shared by every crate in the Agentic Research Core.

#![warn(missing_docs)]

pub mod address;
pub mod entities;
pub mod extract;
pub mod ranker;
pub mod source_quality;

pub use address::{build_evidence_hash, build_stable_key, normalize_address, normalize_us_state};
pub use entities::*;
pub use ranker::{dedupe_and_rank, default_radius_mi, RankableComp};
pub use source_quality::source_quality_score;
