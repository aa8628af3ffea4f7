//! Core text primitives for the redline analysis pipeline.
//!
//! Everything in this crate is pure and synchronous: snapshot identity,
//! minimal changed-region detection, and deterministic chunk splitting.
//! All offsets and lengths are byte offsets into UTF-8 text and always land
//! on `char` boundaries.

pub mod chunk;
pub mod issue;
pub mod region;
pub mod snapshot;

pub use chunk::{Chunk, split_chunks};
pub use issue::Issue;
pub use region::{ChangedRegion, changed_region};
pub use snapshot::Snapshot;
