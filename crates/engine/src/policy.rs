use std::time::Duration;

/// Scheduling policy for the check session.
///
/// Tuned for interactive typing: short bursts debounce, sustained editing
/// is force-refreshed by the staleness ceiling, and layout disruption gets
/// a short quiet window before the full re-analysis.
#[derive(Debug, Clone)]
pub struct CheckPolicy {
	/// Quiet period after the last edit before a region analysis fires.
	pub idle_delay: Duration,
	/// Ceiling on time between analyses under continuous editing; once
	/// exceeded, the next edit fires immediately.
	pub max_staleness: Duration,
	/// Quiet period after the last disruption signal before the
	/// full-document re-analysis fires.
	pub disruption_quiet: Duration,
	/// Mid-document regions smaller than this are not worth a cycle and
	/// are skipped. Regions anchored at the document start always run.
	pub min_region_bytes: usize,
}

impl Default for CheckPolicy {
	fn default() -> Self {
		Self {
			idle_delay: Duration::from_secs(5),
			max_staleness: Duration::from_secs(30),
			disruption_quiet: Duration::from_millis(500),
			min_region_bytes: 8,
		}
	}
}
