//! Bounded scan worker pool.
//!
//! Goals:
//! - fixed rotation of dedicated scan threads (never block the async runtime)
//! - FIFO chunk dispatch over per-worker channels
//! - aggregation in chunk-index order regardless of completion order
//! - degrade, never stall: faulted or stuck chunks are re-dispatched a
//!   bounded number of times, then surrendered as empty slots

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use redline_primitives::{Chunk, Issue, split_chunks};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;

use crate::engine::ScanEngine;
use crate::worker::{WorkerHandle, WorkerReply, WorkerRequest, spawn_worker};

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
	/// Upper bound on spawned workers; the effective count is
	/// `min(available_parallelism, max_workers)`.
	pub max_workers: usize,
	/// Aimed-for chunk size for line-aligned splitting.
	pub chunk_target_bytes: usize,
	/// Inputs smaller than this skip progress reporting entirely.
	pub progress_min_bytes: usize,
	/// Per-dispatch deadline before a chunk is re-dispatched elsewhere.
	pub task_timeout: Duration,
	/// Dispatch attempts per chunk before its slot is surrendered empty.
	pub max_dispatch_attempts: u32,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_workers: 4,
			chunk_target_bytes: 2 * 1024,
			progress_min_bytes: 16 * 1024,
			task_timeout: Duration::from_secs(10),
			max_dispatch_attempts: 2,
		}
	}
}

/// Progress report for one `analyze` run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
	pub completed: usize,
	pub total: usize,
	pub fraction: f64,
}

/// Observer invoked after every completed chunk of a large run.
pub type ProgressObserver = Arc<dyn Fn(Progress) + Send + Sync>;

/// Analysis failure at the pool level.
///
/// Per-chunk scan faults are not errors: they degrade to empty result
/// slots. This error is reserved for a pool with no usable rotation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AnalyzeError {
	/// No worker threads exist, or every worker became unresponsive.
	#[error("no scan workers available")]
	NoWorkers,
}

/// Observability snapshot of pool state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
	pub workers: usize,
	pub idle: usize,
	pub generation: u64,
}

struct Task {
	chunk: Chunk,
	attempts: u32,
}

struct InFlight {
	chunk: Chunk,
	worker: usize,
	attempts: u32,
	deadline: Instant,
}

enum Step {
	Reply(Option<WorkerReply>),
	Timeout,
}

/// Bounded pool of scan worker threads.
///
/// Created once per editor session and reused across runs. `analyze` takes
/// `&mut self`, so overlapping runs against one pool are unrepresentable;
/// the check session serializes analysis cycles behind it.
pub struct WorkerPool {
	cfg: PoolConfig,
	engine: Arc<dyn ScanEngine>,
	workers: Vec<WorkerHandle>,
	idle: Vec<usize>,
	replies_tx: mpsc::UnboundedSender<WorkerReply>,
	replies_rx: mpsc::UnboundedReceiver<WorkerReply>,
	generation: u64,
	progress: Option<ProgressObserver>,
}

impl WorkerPool {
	/// Creates an empty, uninitialized pool around a scan capability.
	pub fn new(engine: Arc<dyn ScanEngine>, cfg: PoolConfig) -> Self {
		let (replies_tx, replies_rx) = mpsc::unbounded_channel();
		Self {
			cfg,
			engine,
			workers: Vec::new(),
			idle: Vec::new(),
			replies_tx,
			replies_rx,
			generation: 0,
			progress: None,
		}
	}

	/// Installs or clears the progress observer.
	pub fn set_progress_observer(&mut self, observer: Option<ProgressObserver>) {
		self.progress = observer;
	}

	/// Spawns the worker rotation. Idempotent: a live rotation is kept.
	///
	/// A worker thread that fails to spawn is logged and its slot omitted;
	/// the pool runs degraded with whatever rotation came up.
	pub fn init(&mut self) {
		if !self.workers.is_empty() {
			return;
		}

		// Fresh reply channel: sends from threads of a terminated rotation
		// fail and let those threads exit.
		let (replies_tx, replies_rx) = mpsc::unbounded_channel();
		self.replies_tx = replies_tx;
		self.replies_rx = replies_rx;

		let parallelism = std::thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1);
		let target = parallelism.min(self.cfg.max_workers).max(1);
		for id in 0..target {
			match spawn_worker(id, Arc::clone(&self.engine), self.replies_tx.clone()) {
				Ok(handle) => {
					self.workers.push(handle);
					self.idle.push(id);
				}
				Err(err) => {
					tracing::warn!(worker = id, error = %err, "pool.worker.spawn_failed");
				}
			}
		}
		tracing::debug!(workers = self.workers.len(), "pool.init");
	}

	/// Stops the rotation and resets all pool state.
	///
	/// Request channels close immediately; each thread drains its current
	/// job and exits. A thread stuck inside the scan capability is left
	/// detached, and its eventual reply is discarded by the generation
	/// gate. Safe to `init` again afterwards.
	pub fn terminate(&mut self) {
		self.workers.clear();
		self.idle.clear();
		self.generation = self.generation.wrapping_add(1);
		tracing::debug!("pool.terminate");
	}

	/// Number of live workers.
	pub fn worker_count(&self) -> usize {
		self.workers.len()
	}

	/// Returns an observability snapshot of the pool.
	pub fn snapshot(&self) -> PoolSnapshot {
		PoolSnapshot {
			workers: self.workers.len(),
			idle: self.idle.len(),
			generation: self.generation,
		}
	}

	/// Analyzes `text`, fanning chunks out over the rotation.
	///
	/// Returns issues with offsets local to `text`, ordered by chunk index
	/// regardless of which worker finished first. Empty input resolves to
	/// an empty list without touching the rotation. Fails only when no
	/// worker can make progress; per-chunk faults degrade to empty slots.
	pub async fn analyze(&mut self, text: &str) -> Result<Vec<Issue>, AnalyzeError> {
		let chunks = split_chunks(text, self.cfg.chunk_target_bytes);
		if chunks.is_empty() {
			return Ok(Vec::new());
		}
		if self.workers.is_empty() {
			return Err(AnalyzeError::NoWorkers);
		}

		self.generation = self.generation.wrapping_add(1);
		let generation = self.generation;
		let total = chunks.len();
		let report_progress = text.len() >= self.cfg.progress_min_bytes;
		tracing::debug!(generation, total, bytes = text.len(), "pool.analyze.start");

		// Reclaim workers whose late replies landed between runs.
		while let Ok(reply) = self.replies_rx.try_recv() {
			self.reclaim(reply.worker);
		}

		let offsets: Vec<usize> = chunks.iter().map(|c| c.offset).collect();
		let mut results: Vec<Option<Vec<Issue>>> = (0..total).map(|_| None).collect();
		let mut queue: VecDeque<Task> = chunks.into_iter().map(|chunk| Task { chunk, attempts: 0 }).collect();
		let mut in_flight: FxHashMap<usize, InFlight> = FxHashMap::default();
		let mut completed = 0usize;

		self.dispatch(generation, &mut queue, &mut in_flight);

		while completed < total {
			let step = match in_flight.values().map(|t| t.deadline).min() {
				Some(deadline) => {
					tokio::select! {
						reply = self.replies_rx.recv() => Step::Reply(reply),
						_ = tokio::time::sleep_until(deadline) => Step::Timeout,
					}
				}
				None if self.workers.is_empty() => return Err(AnalyzeError::NoWorkers),
				None => {
					// Nothing in flight and nothing dispatchable: every
					// worker is out of rotation. Give stragglers one
					// timeout window to come back, then fail the run.
					match tokio::time::timeout(self.cfg.task_timeout, self.replies_rx.recv()).await {
						Ok(reply) => Step::Reply(reply),
						Err(_) => {
							tracing::warn!(generation, "pool.rotation.lost");
							return Err(AnalyzeError::NoWorkers);
						}
					}
				}
			};

			match step {
				Step::Reply(None) => return Err(AnalyzeError::NoWorkers),
				Step::Reply(Some(reply)) => {
					let index = reply.chunk_index;
					let owning = in_flight.get(&index).is_some_and(|t| t.worker == reply.worker);
					let entry = if owning { in_flight.remove(&index) } else { None };
					self.reclaim(reply.worker);

					if reply.generation != generation {
						tracing::debug!(worker = reply.worker, "pool.reply.stale");
					} else {
						match reply.outcome {
							Ok(issues) => {
								tracing::trace!(worker = reply.worker, chunk = index, elapsed_ms = reply.elapsed.as_millis() as u64, "pool.chunk.done");
								if settle(&mut results, &mut queue, index, issues) {
									completed += 1;
									if report_progress {
										self.report(completed, total);
									}
								}
							}
							Err(fault) => {
								tracing::warn!(worker = reply.worker, chunk = index, error = %fault, "pool.scan.failed");
								if let Some(task) = entry
									&& results[index].is_none()
								{
									if task.attempts >= self.cfg.max_dispatch_attempts {
										tracing::warn!(chunk = index, attempts = task.attempts, "pool.chunk.surrendered");
										if settle(&mut results, &mut queue, index, Vec::new()) {
											completed += 1;
											if report_progress {
												self.report(completed, total);
											}
										}
									} else {
										queue.push_back(Task {
											chunk: task.chunk,
											attempts: task.attempts,
										});
									}
								}
							}
						}
					}
				}
				Step::Timeout => {
					let now = Instant::now();
					let expired: Vec<usize> = in_flight.iter().filter(|(_, t)| t.deadline <= now).map(|(index, _)| *index).collect();
					for index in expired {
						let Some(task) = in_flight.remove(&index) else {
							continue;
						};
						if results[index].is_some() {
							continue;
						}
						// The stalled worker stays out of rotation until its
						// late reply proves it alive.
						tracing::warn!(worker = task.worker, chunk = index, attempts = task.attempts, "pool.task.timeout");
						if task.attempts >= self.cfg.max_dispatch_attempts {
							tracing::warn!(chunk = index, attempts = task.attempts, "pool.chunk.surrendered");
							if settle(&mut results, &mut queue, index, Vec::new()) {
								completed += 1;
								if report_progress {
									self.report(completed, total);
								}
							}
						} else {
							queue.push_back(Task {
								chunk: task.chunk,
								attempts: task.attempts,
							});
						}
					}
				}
			}

			self.dispatch(generation, &mut queue, &mut in_flight);
		}

		let mut issues = Vec::new();
		for (index, slot) in results.into_iter().enumerate() {
			let base = offsets[index];
			issues.extend(slot.unwrap_or_default().into_iter().map(|issue| issue.shifted(base)));
		}
		tracing::debug!(generation, issues = issues.len(), "pool.analyze.done");
		Ok(issues)
	}

	/// Pairs idle workers with queued tasks, FIFO over the task queue.
	fn dispatch(&mut self, generation: u64, queue: &mut VecDeque<Task>, in_flight: &mut FxHashMap<usize, InFlight>) {
		while !queue.is_empty() {
			let Some(worker) = self.idle.pop() else {
				break;
			};
			let Some(pos) = self.workers.iter().position(|w| w.id == worker) else {
				continue;
			};
			let Some(mut task) = queue.pop_front() else {
				self.idle.push(worker);
				break;
			};
			task.attempts += 1;
			let request = WorkerRequest {
				generation,
				chunk: task.chunk.clone(),
			};
			match self.workers[pos].tx.try_send(request) {
				Ok(()) => {
					in_flight.insert(
						task.chunk.index,
						InFlight {
							chunk: task.chunk,
							worker,
							attempts: task.attempts,
							deadline: Instant::now() + self.cfg.task_timeout,
						},
					);
				}
				Err(TrySendError::Closed(_)) => {
					tracing::warn!(worker, "pool.worker.lost");
					self.workers.remove(pos);
					task.attempts -= 1;
					queue.push_front(task);
				}
				Err(TrySendError::Full(_)) => {
					// A worker in the idle set is never mid-job; treat an
					// occupied channel as a lost worker rather than wedge.
					tracing::warn!(worker, "pool.worker.wedged");
					self.workers.remove(pos);
					task.attempts -= 1;
					queue.push_front(task);
				}
			}
		}
	}

	/// Returns a worker to the idle rotation if it is still alive.
	fn reclaim(&mut self, worker: usize) {
		if self.workers.iter().any(|w| w.id == worker) && !self.idle.contains(&worker) {
			self.idle.push(worker);
		}
	}

	fn report(&self, completed: usize, total: usize) {
		if let Some(observer) = &self.progress {
			observer(Progress {
				completed,
				total,
				fraction: completed as f64 / total as f64,
			});
		}
	}
}

/// Fills a result slot exactly once; drops any queued duplicate of it.
fn settle(results: &mut [Option<Vec<Issue>>], queue: &mut VecDeque<Task>, index: usize, issues: Vec<Issue>) -> bool {
	if results[index].is_some() {
		return false;
	}
	results[index] = Some(issues);
	queue.retain(|t| t.chunk.index != index);
	true
}
