use memchr::{memchr, memrchr};

/// A contiguous span of the current snapshot that needs re-analysis.
///
/// `text` is exactly `current[start..end]`. The span is a superset of the
/// edited bytes, widened outward to line boundaries so the analyzer sees
/// whole-line context. Both bounds are `char` boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedRegion {
	pub text: String,
	pub start: usize,
	pub end: usize,
}

impl ChangedRegion {
	/// Region length in bytes.
	pub fn len(&self) -> usize {
		self.end - self.start
	}

	/// Returns `true` when nothing changed.
	pub fn is_empty(&self) -> bool {
		self.start == self.end
	}
}

/// Computes the minimal changed region between two document snapshots.
///
/// Byte-wise longest common prefix and suffix, with the suffix capped so the
/// two never overlap (a pure insertion or deletion reduces to a single cut
/// point). Cut points retreat until they sit on `char` boundaries in both
/// strings. Identical inputs yield an empty region with no widening; any
/// real edit is widened to line boundaries, so a pure deletion still
/// surfaces the surrounding line for re-analysis.
///
/// Pure and total. Skip policy for tiny regions belongs to the scheduler,
/// never to the detector: the reported region is always the true widened
/// minimum.
pub fn changed_region(previous: &str, current: &str) -> ChangedRegion {
	if previous == current {
		return ChangedRegion {
			text: String::new(),
			start: current.len(),
			end: current.len(),
		};
	}

	let prev = previous.as_bytes();
	let cur = current.as_bytes();
	let max_common = prev.len().min(cur.len());

	let mut prefix = 0;
	while prefix < max_common && prev[prefix] == cur[prefix] {
		prefix += 1;
	}
	while prefix > 0 && !(previous.is_char_boundary(prefix) && current.is_char_boundary(prefix)) {
		prefix -= 1;
	}

	// Cap the suffix so prefix + suffix never exceeds the shorter string.
	let max_suffix = max_common - prefix;
	let mut suffix = 0;
	while suffix < max_suffix && prev[prev.len() - 1 - suffix] == cur[cur.len() - 1 - suffix] {
		suffix += 1;
	}
	while suffix > 0 && !(previous.is_char_boundary(prev.len() - suffix) && current.is_char_boundary(cur.len() - suffix)) {
		suffix -= 1;
	}

	let raw_start = prefix;
	let raw_end = cur.len() - suffix;

	// Widen outward to line boundaries. The end bound includes the newline
	// terminating the edited line so trailing context stays intact.
	let start = memrchr(b'\n', &cur[..raw_start]).map_or(0, |i| i + 1);
	let end = memchr(b'\n', &cur[raw_end..]).map_or(cur.len(), |i| raw_end + i + 1);

	ChangedRegion {
		text: current[start..end].to_string(),
		start,
		end,
	}
}
