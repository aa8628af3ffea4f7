use serde::{Deserialize, Serialize};

/// A single analysis finding.
///
/// `offset` is local to whatever text was scanned: the scan capability
/// reports chunk-local offsets, the pool remaps them to region-local ones,
/// and the reconciler anchors them at absolute document positions. `kind`
/// is an opaque category tag from the analyzer (e.g. `"spelling"`,
/// `"repeated-word"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
	pub offset: usize,
	pub length: usize,
	pub kind: String,
	#[serde(default)]
	pub suggestions: Vec<String>,
}

impl Issue {
	/// Creates an issue without suggestions.
	pub fn new(offset: usize, length: usize, kind: impl Into<String>) -> Self {
		Self {
			offset,
			length,
			kind: kind.into(),
			suggestions: Vec::new(),
		}
	}

	/// Returns the issue shifted forward by `base` bytes.
	#[must_use]
	pub fn shifted(mut self, base: usize) -> Self {
		self.offset += base;
		self
	}
}
