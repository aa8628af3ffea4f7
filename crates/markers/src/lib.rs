//! Persistent marker overlay for the redline analysis pipeline.
//!
//! The overlay is reconciled, never rebuilt: each region-scoped analysis
//! merges its findings into a new [`MarkerMap`] snapshot, preserving every
//! marker outside the analyzed window. A full rebuild would throw away
//! decorations the user is not looking at; only disruptive layout events
//! warrant the synchronous full clear.

use std::collections::BTreeMap;

use redline_primitives::Issue;
use serde::{Deserialize, Serialize};

/// A UI-visible annotation anchored to an absolute document offset range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
	pub offset: usize,
	pub length: usize,
	pub kind: String,
	#[serde(default)]
	pub suggestions: Vec<String>,
}

/// Stable marker identity: absolute offset plus issue kind.
///
/// Ordering is by offset first, so overlay iteration follows document
/// order for the host's decoration pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerKey {
	pub offset: usize,
	pub kind: String,
}

/// Immutable overlay snapshot: active markers keyed by stable identity.
///
/// One map lives per editor session. [`merge`] produces a new snapshot
/// per reconciliation; the caller decides retention of old snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerMap {
	entries: BTreeMap<MarkerKey, Marker>,
}

impl MarkerMap {
	/// Empty overlay, used for the synchronous disruption clear.
	pub fn clear_all() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Looks up one marker by identity.
	pub fn get(&self, key: &MarkerKey) -> Option<&Marker> {
		self.entries.get(key)
	}

	/// Markers in document order.
	pub fn markers(&self) -> impl Iterator<Item = &Marker> {
		self.entries.values()
	}
}

/// Merges region-scoped findings into a new overlay snapshot.
///
/// Issue offsets are region-local; each is anchored at
/// `region_start + issue.offset`. Existing markers inside
/// `[region_start, region_start + region_len)` are dropped (the region was
/// just re-analyzed; absent findings mean resolved issues), markers outside
/// the window pass through untouched. A finding that would land outside the
/// window is skipped rather than let a misbehaving analyzer clobber
/// unrelated overlay state.
pub fn merge(base: &MarkerMap, issues: &[Issue], region_start: usize, region_len: usize) -> MarkerMap {
	let region_end = region_start + region_len;
	let mut entries: BTreeMap<MarkerKey, Marker> = base
		.entries
		.iter()
		.filter(|(key, _)| key.offset < region_start || key.offset >= region_end)
		.map(|(key, marker)| (key.clone(), marker.clone()))
		.collect();

	for issue in issues {
		let offset = region_start + issue.offset;
		if offset < region_start || offset >= region_end {
			tracing::debug!(offset, region_start, region_end, "markers.issue.outside_region");
			continue;
		}
		let key = MarkerKey {
			offset,
			kind: issue.kind.clone(),
		};
		entries.insert(
			key,
			Marker {
				offset,
				length: issue.length,
				kind: issue.kind.clone(),
				suggestions: issue.suggestions.clone(),
			},
		);
	}

	MarkerMap { entries }
}
