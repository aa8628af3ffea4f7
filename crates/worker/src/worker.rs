use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use redline_primitives::{Chunk, Issue};
use tokio::sync::mpsc;

use crate::engine::{ScanEngine, ScanError};

/// One unit of work sent to a worker thread.
pub(crate) struct WorkerRequest {
	pub generation: u64,
	pub chunk: Chunk,
}

/// Fault raised by a worker while scanning a chunk.
#[derive(Debug)]
pub(crate) enum WorkerFault {
	Scan(ScanError),
	Panicked,
}

impl std::fmt::Display for WorkerFault {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			WorkerFault::Scan(err) => err.fmt(f),
			WorkerFault::Panicked => write!(f, "scan panicked"),
		}
	}
}

/// Completion message sent back to the pool.
pub(crate) struct WorkerReply {
	pub worker: usize,
	pub generation: u64,
	pub chunk_index: usize,
	pub outcome: Result<Vec<Issue>, WorkerFault>,
	pub elapsed: Duration,
}

/// Handle to one scan worker thread.
///
/// Dropping the handle closes the request channel; the thread drains its
/// current job (if any) and exits. Threads are detached: a scan stuck in
/// the engine cannot be force-killed, its eventual reply is discarded by
/// the pool's generation gate instead.
pub(crate) struct WorkerHandle {
	pub id: usize,
	pub tx: mpsc::Sender<WorkerRequest>,
}

/// Spawns one named scan worker thread bound to its own request channel.
pub(crate) fn spawn_worker(id: usize, engine: Arc<dyn ScanEngine>, replies: mpsc::UnboundedSender<WorkerReply>) -> std::io::Result<WorkerHandle> {
	// Capacity 1: a worker is only ever handed work while idle.
	let (tx, mut rx) = mpsc::channel::<WorkerRequest>(1);

	std::thread::Builder::new().name(format!("redline-scan-{id}")).spawn(move || {
		while let Some(req) = rx.blocking_recv() {
			let started = Instant::now();
			let outcome = match catch_unwind(AssertUnwindSafe(|| engine.scan(&req.chunk.text))) {
				Ok(Ok(issues)) => Ok(issues),
				Ok(Err(err)) => Err(WorkerFault::Scan(err)),
				Err(_) => Err(WorkerFault::Panicked),
			};
			let reply = WorkerReply {
				worker: id,
				generation: req.generation,
				chunk_index: req.chunk.index,
				outcome,
				elapsed: started.elapsed(),
			};
			if replies.send(reply).is_err() {
				// Pool side is gone; nothing left to report to.
				break;
			}
		}
		tracing::debug!(worker = id, "pool.worker.exit");
	})?;

	Ok(WorkerHandle { id, tx })
}
