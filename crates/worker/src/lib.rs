//! Worker runtime for the redline analysis pipeline.
//!
//! Owns the bounded scan worker pool (dedicated OS threads fed over
//! per-worker channels, results reassembled in chunk-index order) and the
//! key-coalescing mailbox used for session event ingress.

pub mod engine;
pub mod mailbox;
pub mod pool;
mod worker;

pub use engine::{ScanEngine, ScanError};
pub use mailbox::{MailboxReceiver, MailboxSender, SendError, SendOutcome, mailbox};
pub use pool::{AnalyzeError, PoolConfig, PoolSnapshot, Progress, ProgressObserver, WorkerPool};
