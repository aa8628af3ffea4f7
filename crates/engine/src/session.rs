use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redline_markers::{MarkerMap, merge};
use redline_primitives::Snapshot;
use redline_worker::{MailboxReceiver, MailboxSender, SendError, WorkerPool, mailbox};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::policy::CheckPolicy;
use crate::schedule::{AnalysisSchedule, Fire};

/// Host-editor seam for publishing overlay snapshots.
///
/// Called once per reconciliation with the complete new snapshot; the host
/// renders the offset-ranged annotations however it likes. Implementations
/// must be cheap: `apply` runs on the session driver between cycles.
pub trait DecorationSink: Send + Sync {
	fn apply(&self, markers: &MarkerMap);
}

/// Mailbox capacity for session event ingress. Same-kind events coalesce,
/// so the queue stays tiny in practice.
const EVENT_QUEUE_CAPACITY: usize = 8;

enum SessionEvent {
	Value(Snapshot),
	Disruption,
}

fn event_key(event: &SessionEvent) -> u8 {
	match event {
		SessionEvent::Value(_) => 0,
		SessionEvent::Disruption => 1,
	}
}

/// Handle to a spawned check session.
///
/// Dropping the handle cancels the driver. [`SessionHandle::shutdown`] is
/// the orderly path: it cancels, closes the event mailbox, and joins the
/// driver task, which terminates the worker pool on the way out.
pub struct SessionHandle {
	tx: MailboxSender<SessionEvent>,
	cancel: CancellationToken,
	task: Option<JoinHandle<()>>,
	version: AtomicU64,
}

impl SessionHandle {
	/// Submits a new full-document snapshot.
	///
	/// A burst of edits coalesces in the mailbox: only the newest queued
	/// snapshot survives, older ones are replaced in place. Fails once the
	/// session is shut down.
	pub async fn update_value(&self, text: impl Into<Arc<str>>) -> Result<(), SendError> {
		let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
		self.tx.send(SessionEvent::Value(Snapshot::new(text, version))).await?;
		Ok(())
	}

	/// Signals a viewport/layout disruption.
	///
	/// The driver clears the marker overlay as soon as it dequeues the first
	/// signal of an episode (stale positions are worse than no markers) and
	/// schedules a full-document re-analysis once the signals quiesce.
	pub async fn notify_disruption(&self) -> Result<(), SendError> {
		self.tx.send(SessionEvent::Disruption).await?;
		Ok(())
	}

	/// Cancels the driver, terminates the pool, and joins the task.
	pub async fn shutdown(mut self) {
		self.cancel.cancel();
		self.tx.close().await;
		if let Some(task) = self.task.take()
			&& let Err(err) = task.await
		{
			tracing::warn!(error = %err, "session.join_failed");
		}
	}
}

impl Drop for SessionHandle {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// The orchestrating driver: wires snapshot ingress, the analysis schedule,
/// the worker pool, and overlay reconciliation into one sequential loop.
///
/// Exactly one analysis cycle is in flight at a time; snapshots arriving
/// during a cycle queue behind it and re-arm the debounce on completion.
/// Analysis failure is swallowed as "no new markers this cycle" and logged,
/// never surfaced to the host.
pub struct CheckSession {
	pool: WorkerPool,
	sink: Arc<dyn DecorationSink>,
	schedule: AnalysisSchedule,
	markers: MarkerMap,
}

impl CheckSession {
	/// Spawns the session driver onto the current runtime.
	///
	/// The pool is initialized by the driver and owned by it for the whole
	/// session; `terminate` runs on shutdown.
	pub fn spawn(pool: WorkerPool, sink: Arc<dyn DecorationSink>, policy: CheckPolicy) -> SessionHandle {
		let (tx, rx) = mailbox(EVENT_QUEUE_CAPACITY, event_key);
		let cancel = CancellationToken::new();
		let session = Self {
			pool,
			sink,
			schedule: AnalysisSchedule::new(policy),
			markers: MarkerMap::default(),
		};
		let task = tokio::spawn(session.run(rx, cancel.clone()));
		SessionHandle {
			tx,
			cancel,
			task: Some(task),
			version: AtomicU64::new(0),
		}
	}

	async fn run(mut self, rx: MailboxReceiver<SessionEvent>, cancel: CancellationToken) {
		self.pool.init();
		tracing::debug!(workers = self.pool.worker_count(), "session.start");

		loop {
			let event = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				event = rx.recv() => match event {
					Some(event) => Some(event),
					None => break,
				},
				_ = wait_until(self.schedule.next_deadline()) => None,
			};

			let now = Instant::now();
			match event {
				Some(SessionEvent::Value(snapshot)) => {
					self.schedule.note_value(snapshot, now);
				}
				Some(SessionEvent::Disruption) => {
					if self.schedule.note_disruption(now) {
						self.markers = MarkerMap::clear_all();
						self.sink.apply(&self.markers);
						tracing::debug!("session.overlay.cleared");
					}
				}
				None => {}
			}

			if let Some(fire) = self.schedule.poll(Instant::now()) {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => break,
					() = self.run_cycle(&fire) => {}
				}
				self.schedule.finish(Instant::now());
			}
		}

		self.pool.terminate();
		tracing::debug!("session.exit");
	}

	async fn run_cycle(&mut self, fire: &Fire) {
		let region = fire.region();
		tracing::debug!(
			start = region.start,
			len = region.len(),
			full = matches!(fire, Fire::Full(_)),
			"session.cycle.start"
		);
		match self.pool.analyze(&region.text).await {
			Ok(issues) => {
				self.markers = merge(&self.markers, &issues, region.start, region.len());
				self.sink.apply(&self.markers);
				tracing::debug!(markers = self.markers.len(), "session.cycle.done");
			}
			Err(err) => {
				tracing::warn!(error = %err, "session.analysis.failed");
			}
		}
	}
}

async fn wait_until(deadline: Option<Instant>) {
	match deadline {
		Some(at) => tokio::time::sleep_until(at).await,
		None => std::future::pending().await,
	}
}
