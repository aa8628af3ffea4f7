//! Bounded, key-coalescing event mailbox.
//!
//! A queued event is replaced in place by a newer event with the same key,
//! so a burst of same-key events collapses to the newest payload while
//! distinct keys keep FIFO order. When the queue is full and no key
//! matches, the oldest event is evicted. Closing wakes blocked receivers;
//! they drain remaining events, then observe end-of-stream.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// Outcome from enqueueing an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	/// Event was appended to the queue.
	Enqueued,
	/// An existing queued event with the same key was replaced in place.
	Coalesced,
	/// Queue was full; the oldest queued event was evicted.
	ReplacedOldest,
}

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
	/// Mailbox is closed.
	Closed,
}

impl std::fmt::Display for SendError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SendError::Closed => write!(f, "mailbox closed"),
		}
	}
}

impl std::error::Error for SendError {}

struct State<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct Inner<T> {
	capacity: usize,
	same_key: Box<dyn Fn(&T, &T) -> bool + Send + Sync>,
	state: Mutex<State<T>>,
	notify_recv: Notify,
}

/// Multi-producer mailbox sender.
pub struct MailboxSender<T> {
	inner: Arc<Inner<T>>,
}

/// Mailbox receiver.
pub struct MailboxReceiver<T> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for MailboxSender<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

/// Creates a bounded key-coalescing mailbox.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn mailbox<T, K>(capacity: usize, key_of: impl Fn(&T) -> K + Send + Sync + 'static) -> (MailboxSender<T>, MailboxReceiver<T>)
where
	K: Eq,
{
	assert!(capacity > 0, "mailbox capacity must be > 0");
	let inner = Arc::new(Inner {
		capacity,
		same_key: Box::new(move |lhs: &T, rhs: &T| key_of(lhs) == key_of(rhs)),
		state: Mutex::new(State {
			queue: VecDeque::with_capacity(capacity),
			closed: false,
		}),
		notify_recv: Notify::new(),
	});
	(
		MailboxSender {
			inner: Arc::clone(&inner),
		},
		MailboxReceiver { inner },
	)
}

impl<T> MailboxSender<T> {
	/// Enqueues one event, coalescing onto a queued event with the same key.
	pub async fn send(&self, event: T) -> Result<SendOutcome, SendError> {
		let outcome = {
			let mut state = self.inner.state.lock().await;
			if state.closed {
				return Err(SendError::Closed);
			}
			if let Some(existing) = state.queue.iter_mut().find(|it| (self.inner.same_key)(it, &event)) {
				*existing = event;
				SendOutcome::Coalesced
			} else if state.queue.len() >= self.inner.capacity {
				let _ = state.queue.pop_front();
				state.queue.push_back(event);
				SendOutcome::ReplacedOldest
			} else {
				state.queue.push_back(event);
				SendOutcome::Enqueued
			}
		};
		self.inner.notify_recv.notify_one();
		Ok(outcome)
	}

	/// Closes the mailbox. Receivers drain queued events then see `None`.
	pub async fn close(&self) {
		let mut state = self.inner.state.lock().await;
		state.closed = true;
		drop(state);
		self.inner.notify_recv.notify_waiters();
	}

	/// Returns current queue length.
	pub async fn len(&self) -> usize {
		self.inner.state.lock().await.queue.len()
	}
}

impl<T> MailboxReceiver<T> {
	/// Receives one event. Returns `None` once closed and drained.
	pub async fn recv(&self) -> Option<T> {
		loop {
			// Register for wakeup before checking state to avoid a lost
			// notification between unlock and await.
			let notified = self.inner.notify_recv.notified();

			{
				let mut state = self.inner.state.lock().await;
				if let Some(event) = state.queue.pop_front() {
					return Some(event);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[derive(Clone, Debug, PartialEq, Eq)]
	enum Event {
		Value(u64),
		Ping(u64),
	}

	fn key(event: &Event) -> u8 {
		match event {
			Event::Value(_) => 0,
			Event::Ping(_) => 1,
		}
	}

	#[tokio::test]
	async fn same_key_events_coalesce_in_place() {
		let (tx, rx) = mailbox(8, key);

		assert_eq!(tx.send(Event::Value(1)).await, Ok(SendOutcome::Enqueued));
		assert_eq!(tx.send(Event::Ping(1)).await, Ok(SendOutcome::Enqueued));
		// Replaces the queued Value without reordering.
		assert_eq!(tx.send(Event::Value(2)).await, Ok(SendOutcome::Coalesced));
		assert_eq!(tx.send(Event::Value(3)).await, Ok(SendOutcome::Coalesced));

		tx.close().await;
		assert_eq!(rx.recv().await, Some(Event::Value(3)));
		assert_eq!(rx.recv().await, Some(Event::Ping(1)));
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn distinct_keys_keep_fifo_order() {
		let (tx, rx) = mailbox(8, |e: &Event| std::mem::discriminant(e));

		let _ = tx.send(Event::Ping(1)).await;
		let _ = tx.send(Event::Value(1)).await;

		tx.close().await;
		assert_eq!(rx.recv().await, Some(Event::Ping(1)));
		assert_eq!(rx.recv().await, Some(Event::Value(1)));
	}

	#[tokio::test]
	async fn full_queue_evicts_oldest_for_new_key() {
		let (tx, rx) = mailbox(2, |e: &u64| *e);

		assert_eq!(tx.send(1).await, Ok(SendOutcome::Enqueued));
		assert_eq!(tx.send(2).await, Ok(SendOutcome::Enqueued));
		assert_eq!(tx.send(3).await, Ok(SendOutcome::ReplacedOldest));

		tx.close().await;
		assert_eq!(rx.recv().await, Some(2));
		assert_eq!(rx.recv().await, Some(3));
		assert_eq!(rx.recv().await, None);
	}

	#[tokio::test]
	async fn send_after_close_fails_fast() {
		let (tx, _rx) = mailbox(4, |e: &u64| *e);
		tx.close().await;
		assert_eq!(tx.send(7).await, Err(SendError::Closed));
	}

	#[tokio::test]
	async fn recv_blocks_until_send() {
		let (tx, rx) = mailbox(4, |e: &u64| *e);

		let blocked = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await;
		assert!(blocked.is_err(), "recv on empty mailbox should block");

		let _ = tx.send(42).await;
		assert_eq!(rx.recv().await, Some(42));
	}

	#[tokio::test]
	async fn close_wakes_blocked_receiver() {
		let (tx, rx) = mailbox(4, |e: &u64| *e);

		let recv_task = tokio::spawn(async move { rx.recv().await });
		tokio::time::sleep(Duration::from_millis(10)).await;
		tx.close().await;

		let result = tokio::time::timeout(Duration::from_millis(100), recv_task)
			.await
			.expect("blocked recv should wake on close")
			.unwrap();
		assert_eq!(result, None);
	}

	// Deterministic model check: interleaved sends/recvs against a reference
	// queue with the same coalescing rules.
	#[tokio::test]
	async fn stress_matches_reference_model() {
		struct Xorshift64(u64);

		impl Xorshift64 {
			fn next(&mut self) -> u64 {
				let mut x = self.0;
				x ^= x << 13;
				x ^= x >> 7;
				x ^= x << 17;
				self.0 = x;
				x
			}
		}

		const OPS: usize = 5_000;
		let capacity = 4;
		let key_space = 3u64;
		let (tx, rx) = mailbox(capacity, |e: &(u64, u64)| e.0);
		let mut model: VecDeque<(u64, u64)> = VecDeque::new();
		let mut rng = Xorshift64(0x5EED_1234);

		for i in 0..OPS {
			if rng.next() % 10 < 6 {
				let event = (rng.next() % key_space, i as u64);
				let real = tx.send(event).await.unwrap();
				let expected = if let Some(existing) = model.iter_mut().find(|it| it.0 == event.0) {
					*existing = event;
					SendOutcome::Coalesced
				} else if model.len() >= capacity {
					let _ = model.pop_front();
					model.push_back(event);
					SendOutcome::ReplacedOldest
				} else {
					model.push_back(event);
					SendOutcome::Enqueued
				};
				assert_eq!(real, expected, "op {i}");
			} else {
				let real = tokio::time::timeout(Duration::from_millis(1), rx.recv()).await;
				let expected = model.pop_front();
				match (real, expected) {
					(Ok(r), e) => assert_eq!(r, e, "op {i}"),
					(Err(_), None) => {}
					(Err(_), Some(v)) => panic!("op {i}: model has {v:?} but recv timed out"),
				}
			}
		}

		tx.close().await;
		let mut drained = Vec::new();
		while let Some(event) = rx.recv().await {
			drained.push(event);
		}
		assert_eq!(drained, Vec::from(model), "final drain mismatch");
	}
}
