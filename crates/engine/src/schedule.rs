use redline_primitives::{ChangedRegion, Snapshot, changed_region};
use tokio::time::Instant;

use crate::policy::CheckPolicy;

/// Directive yielded by [`AnalysisSchedule::poll`] when a cycle should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fire {
	/// Region-scoped re-analysis after an edit settled.
	Region(ChangedRegion),
	/// Full-document re-analysis after layout disruption settled.
	Full(ChangedRegion),
}

impl Fire {
	/// The region to analyze, regardless of cause.
	pub fn region(&self) -> &ChangedRegion {
		match self {
			Fire::Region(region) | Fire::Full(region) => region,
		}
	}
}

#[derive(Debug, Clone, Copy)]
enum State {
	Idle,
	Debouncing { fire_at: Instant },
	Analyzing,
	Disrupted { quiet_until: Instant },
}

/// Decides *when* analysis cycles run, never *what* they analyze beyond
/// handing over the changed region.
///
/// Explicit state machine over injected instants: `Idle`, `Debouncing`
/// (an edit is waiting out the idle delay, or an immediate fire is armed),
/// `Analyzing` (a cycle is in flight; newer snapshots queue behind it) and
/// `Disrupted` (markers were cleared, a full re-analysis is pending the
/// quiet window). No timers live here; the driver sleeps until
/// [`Self::next_deadline`] and calls [`Self::poll`].
pub struct AnalysisSchedule {
	policy: CheckPolicy,
	state: State,
	accepted: Snapshot,
	pending: Option<Snapshot>,
	last_run_at: Option<Instant>,
}

impl AnalysisSchedule {
	pub fn new(policy: CheckPolicy) -> Self {
		Self {
			policy,
			state: State::Idle,
			accepted: Snapshot::default(),
			pending: None,
			last_run_at: None,
		}
	}

	/// Records a new document snapshot.
	///
	/// A snapshot equal to the accepted text is ignored. Otherwise the
	/// debounce deadline is (re)armed — immediately when the last run is
	/// older than the staleness ceiling or when no run has happened yet,
	/// after `idle_delay` otherwise. Superseded deadlines are overwritten;
	/// only the latest snapshot ever fires. While `Analyzing` or
	/// `Disrupted` the snapshot is parked for pickup on completion.
	pub fn note_value(&mut self, snapshot: Snapshot, now: Instant) {
		if snapshot.text() == self.accepted.text() && self.pending.is_none() {
			return;
		}
		self.pending = Some(snapshot);

		match self.state {
			State::Analyzing | State::Disrupted { .. } => {}
			State::Idle | State::Debouncing { .. } => {
				let stale = self.last_run_at.is_none_or(|at| now.duration_since(at) > self.policy.max_staleness);
				let fire_at = if stale { now } else { now + self.policy.idle_delay };
				self.state = State::Debouncing { fire_at };
			}
		}
	}

	/// Records a layout disruption signal.
	///
	/// Returns `true` on the first signal of a disruption episode: the
	/// caller must synchronously clear the marker overlay (stale positions
	/// are worse than no markers). Repeated signals extend the quiet
	/// window. Once quiet elapses, [`Self::poll`] yields a full-document
	/// fire independent of the idle/staleness policy.
	pub fn note_disruption(&mut self, now: Instant) -> bool {
		let first = !matches!(self.state, State::Disrupted { .. });
		self.state = State::Disrupted {
			quiet_until: now + self.policy.disruption_quiet,
		};
		first
	}

	/// Fires a due analysis cycle, if any.
	///
	/// On an edit fire the changed region is computed against the last
	/// accepted snapshot, which is then replaced. Empty regions (no real
	/// change) and mid-document regions below `min_region_bytes` resolve
	/// to no cycle.
	pub fn poll(&mut self, now: Instant) -> Option<Fire> {
		match self.state {
			State::Debouncing { fire_at } if now >= fire_at => {
				let Some(next) = self.pending.take() else {
					self.state = State::Idle;
					return None;
				};
				let region = changed_region(self.accepted.text(), next.text());
				self.accepted = next;
				self.last_run_at = Some(now);

				if region.is_empty() {
					tracing::trace!(version = self.accepted.version(), "schedule.noop");
					self.state = State::Idle;
					None
				} else if region.start > 0 && region.len() < self.policy.min_region_bytes {
					tracing::trace!(len = region.len(), "schedule.region_skipped");
					self.state = State::Idle;
					None
				} else {
					self.state = State::Analyzing;
					Some(Fire::Region(region))
				}
			}
			State::Disrupted { quiet_until } if now >= quiet_until => {
				let current = self.pending.take().unwrap_or_else(|| self.accepted.clone());
				let text = current.text().to_string();
				let end = text.len();
				self.accepted = current;
				self.last_run_at = Some(now);
				self.state = State::Analyzing;
				Some(Fire::Full(ChangedRegion { text, start: 0, end }))
			}
			_ => None,
		}
	}

	/// Marks the in-flight cycle finished.
	///
	/// A snapshot that arrived during the cycle re-arms the debounce; runs
	/// stay strictly sequential.
	pub fn finish(&mut self, now: Instant) {
		if matches!(self.state, State::Analyzing) {
			self.state = match self.pending {
				Some(_) => State::Debouncing {
					fire_at: now + self.policy.idle_delay,
				},
				None => State::Idle,
			};
		}
	}

	/// Earliest instant at which [`Self::poll`] could yield a fire.
	pub fn next_deadline(&self) -> Option<Instant> {
		match self.state {
			State::Debouncing { fire_at } => Some(fire_at),
			State::Disrupted { quiet_until } => Some(quiet_until),
			State::Idle | State::Analyzing => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	fn schedule() -> AnalysisSchedule {
		AnalysisSchedule::new(CheckPolicy::default())
	}

	fn snap(text: &str, version: u64) -> Snapshot {
		Snapshot::new(text, version)
	}

	#[test]
	fn first_snapshot_fires_immediately() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("hello world\n", 1), t0);
		assert_eq!(sched.next_deadline(), Some(t0));

		let fire = sched.poll(t0).expect("bootstrap fire");
		let region = fire.region();
		assert_eq!(region.start, 0);
		assert_eq!(region.text, "hello world\n");
	}

	#[test]
	fn later_edits_debounce_for_the_idle_delay() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("base text here\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		let t1 = t0 + Duration::from_secs(1);
		sched.note_value(snap("base text here!\n", 2), t1);
		assert!(sched.poll(t1).is_none());
		assert!(sched.poll(t1 + Duration::from_secs(4)).is_none());

		let fire = sched.poll(t1 + Duration::from_secs(5)).expect("debounced fire");
		assert!(matches!(fire, Fire::Region(_)));
	}

	#[test]
	fn newer_edit_supersedes_the_pending_deadline() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("one\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		let t1 = t0 + Duration::from_secs(1);
		sched.note_value(snap("one two\n", 2), t1);
		let t2 = t1 + Duration::from_secs(3);
		sched.note_value(snap("one two three\n", 3), t2);

		// The first deadline has been pushed out.
		assert!(sched.poll(t1 + Duration::from_secs(5)).is_none());
		let fire = sched.poll(t2 + Duration::from_secs(5)).expect("superseding fire");
		// Only the latest snapshot fires: the region reflects v1 -> v3.
		assert_eq!(fire.region().text, "one two three\n");
	}

	#[test]
	fn stale_schedule_fires_without_debounce() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("first\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		let t1 = t0 + Duration::from_secs(31);
		sched.note_value(snap("first edited\n", 2), t1);
		assert!(sched.poll(t1).is_some(), "past the staleness ceiling the fire is immediate");
	}

	#[test]
	fn identical_snapshot_is_ignored() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("same\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		sched.note_value(snap("same\n", 2), t0 + Duration::from_secs(1));
		assert_eq!(sched.next_deadline(), None);
	}

	#[test]
	fn unchanged_text_resolves_to_no_cycle() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("alpha\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		// Edit then revert within one debounce window.
		let t1 = t0 + Duration::from_secs(1);
		sched.note_value(snap("alpha!\n", 2), t1);
		sched.note_value(snap("alpha\n", 3), t1 + Duration::from_millis(100));
		assert!(sched.poll(t1 + Duration::from_secs(6)).is_none());
		assert_eq!(sched.next_deadline(), None);
	}

	#[test]
	fn tiny_mid_document_regions_are_skipped() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("header\nbb\nfooter\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		// One-byte edit on the 3-byte middle line: below min_region_bytes
		// and not anchored at the start.
		let t1 = t0 + Duration::from_secs(1);
		sched.note_value(snap("header\nbX\nfooter\n", 2), t1);
		assert!(sched.poll(t1 + Duration::from_secs(5)).is_none());

		// The snapshot was still accepted: re-sending it is a no-op.
		sched.note_value(snap("header\nbX\nfooter\n", 3), t1 + Duration::from_secs(6));
		assert_eq!(sched.next_deadline(), None);
	}

	#[test]
	fn region_at_document_start_always_runs() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("ab\nrest of the document\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		let t1 = t0 + Duration::from_secs(1);
		sched.note_value(snap("aX\nrest of the document\n", 2), t1);
		let fire = sched.poll(t1 + Duration::from_secs(5)).expect("start-anchored fire");
		assert_eq!(fire.region().start, 0);
	}

	#[test]
	fn first_disruption_clears_then_quiet_fires_full() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("document body\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		let t1 = t0 + Duration::from_secs(1);
		assert!(sched.note_disruption(t1), "first signal demands a clear");
		assert!(!sched.note_disruption(t1 + Duration::from_millis(100)));
		assert!(sched.poll(t1 + Duration::from_millis(200)).is_none());

		// Quiet window counts from the latest signal.
		let fire = sched.poll(t1 + Duration::from_millis(601)).expect("full fire");
		match fire {
			Fire::Full(region) => {
				assert_eq!(region.start, 0);
				assert_eq!(region.text, "document body\n");
			}
			Fire::Region(_) => panic!("disruption must fire a full analysis"),
		}
	}

	#[test]
	fn disruption_folds_in_a_parked_snapshot() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("old\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);

		let t1 = t0 + Duration::from_secs(1);
		sched.note_disruption(t1);
		sched.note_value(snap("new content\n", 2), t1 + Duration::from_millis(50));

		let fire = sched.poll(t1 + Duration::from_secs(1)).expect("full fire");
		assert_eq!(fire.region().text, "new content\n");
	}

	#[test]
	fn snapshot_during_analysis_queues_behind_the_run() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("v1 line\n", 1), t0);
		assert!(sched.poll(t0).is_some());

		// Still analyzing: the new snapshot parks, no deadline yet.
		let t1 = t0 + Duration::from_secs(1);
		sched.note_value(snap("v2 line\n", 2), t1);
		assert!(sched.poll(t1).is_none());
		assert_eq!(sched.next_deadline(), None);

		// Completion re-arms the debounce for the parked snapshot.
		sched.finish(t1);
		assert!(sched.poll(t1 + Duration::from_secs(4)).is_none());
		let fire = sched.poll(t1 + Duration::from_secs(5)).expect("queued fire");
		assert_eq!(fire.region().text, "v2 line\n");
	}

	#[test]
	fn finish_without_pending_returns_to_idle() {
		let mut sched = schedule();
		let t0 = Instant::now();
		sched.note_value(snap("text\n", 1), t0);
		assert!(sched.poll(t0).is_some());
		sched.finish(t0);
		assert_eq!(sched.next_deadline(), None);
		assert!(sched.poll(t0 + Duration::from_secs(60)).is_none());
	}
}
