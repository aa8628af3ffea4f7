use std::sync::Arc;

/// An immutable full-document snapshot with a logical version.
///
/// Versions are assigned by the producer (the check session) and only ever
/// increase; they distinguish snapshots without comparing text. Cloning is
/// cheap: the text is shared.
#[derive(Debug, Clone)]
pub struct Snapshot {
	text: Arc<str>,
	version: u64,
}

impl Snapshot {
	/// Creates a snapshot from text and a logical version.
	pub fn new(text: impl Into<Arc<str>>, version: u64) -> Self {
		Self {
			text: text.into(),
			version,
		}
	}

	/// Snapshot text.
	pub fn text(&self) -> &str {
		&self.text
	}

	/// Logical version assigned at capture time.
	pub const fn version(&self) -> u64 {
		self.version
	}

	/// Text length in bytes.
	pub fn len_bytes(&self) -> usize {
		self.text.len()
	}
}

impl Default for Snapshot {
	fn default() -> Self {
		Self::new("", 0)
	}
}
