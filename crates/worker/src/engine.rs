use redline_primitives::Issue;

/// Opaque linguistic analysis capability.
///
/// Implementations are treated as slow and CPU-bound and are only ever
/// invoked on dedicated pool worker threads, never on the async runtime.
/// Offsets in returned issues are local to the scanned `text`.
pub trait ScanEngine: Send + Sync {
	fn scan(&self, text: &str) -> Result<Vec<Issue>, ScanError>;
}

/// Failure reported by a scan capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("scan failed: {message}")]
pub struct ScanError {
	message: String,
}

impl ScanError {
	/// Creates a scan error from a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}
