//! Detecting that a streamed reply has finished.
//!
//! The page gives no explicit "done" signal. After a prompt is submitted the
//! last complete reply is polled on a fixed cadence until it differs from
//! the one captured before submission, then a settle delay lets trailing UI
//! state catch up before the text is returned.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::Timings;
use crate::error::Result;

/// Cadence and bounds of the completion poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPolicy {
	pub poll_interval: Duration,
	pub settle: Duration,
	/// `None` polls until cancelled.
	pub timeout: Option<Duration>,
}

impl Default for CompletionPolicy {
	fn default() -> Self {
		Self::from(&Timings::default())
	}
}

impl From<&Timings> for CompletionPolicy {
	fn from(timings: &Timings) -> Self {
		Self {
			poll_interval: timings.poll_interval(),
			settle: timings.settle(),
			timeout: timings.completion_timeout(),
		}
	}
}

/// How a completion wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
	/// A reply differing from the baseline was detected.
	Reply(String),
	TimedOut,
	Cancelled,
}

impl Completion {
	pub fn into_reply(self) -> Option<String> {
		match self {
			Completion::Reply(text) => Some(text),
			_ => None,
		}
	}
}

/// A candidate counts as new when it differs from the baseline ignoring
/// case. A repeat of the previous reply, or one differing only in case, is
/// never detected.
pub fn is_new_reply(baseline: Option<&str>, candidate: Option<&str>) -> bool {
	match (baseline, candidate) {
		(_, None) => false,
		(None, Some(_)) => true,
		(Some(before), Some(now)) => before.to_lowercase() != now.to_lowercase(),
	}
}

/// Polls `probe` until it yields a reply that is new relative to `baseline`.
///
/// Each tick sleeps first, so the page gets one interval to react to the
/// submission before the first read. Transient probe failures (the page
/// re-rendering under the query) skip the tick; anything else ends the wait
/// with that error. Cancellation during the settle delay still returns the
/// detected reply.
pub async fn await_new_reply<F, Fut>(baseline: Option<&str>, policy: CompletionPolicy, cancel: &CancellationToken, mut probe: F) -> Result<Completion>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<String>>>,
{
	let deadline = policy.timeout.map(|t| Instant::now() + t);
	let poll = async {
		let mut tick: u64 = 0;
		loop {
			sleep(policy.poll_interval).await;
			tick += 1;
			match probe().await {
				Ok(Some(candidate)) if is_new_reply(baseline, Some(&candidate)) => {
					debug!(target = "pw_chat.session", tick, "new reply detected");
					return Ok(candidate);
				}
				Ok(_) => trace!(target = "pw_chat.session", tick, "no new reply yet"),
				Err(e) if e.is_transient() => {
					debug!(target = "pw_chat.session", tick, error = %e, "transient failure while polling, retrying");
				}
				Err(e) => return Err(e),
			}
		}
	};

	let reply = tokio::select! {
		_ = cancel.cancelled() => return Ok(Completion::Cancelled),
		_ = until(deadline) => return Ok(Completion::TimedOut),
		found = poll => found?,
	};

	tokio::select! {
		_ = cancel.cancelled() => debug!(target = "pw_chat.session", "settle delay cut short by cancellation"),
		_ = sleep(policy.settle) => {}
	}
	Ok(Completion::Reply(reply))
}

async fn until(deadline: Option<Instant>) {
	match deadline {
		Some(at) => tokio::time::sleep_until(at).await,
		None => std::future::pending::<()>().await,
	}
}

#[cfg(test)]
mod tests {
	use std::collections::VecDeque;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use parking_lot::Mutex;

	use super::*;
	use crate::error::Error;

	fn policy(timeout: Option<u64>) -> CompletionPolicy {
		CompletionPolicy {
			poll_interval: Duration::from_millis(1000),
			settle: Duration::from_millis(5000),
			timeout: timeout.map(Duration::from_millis),
		}
	}

	fn scripted(frames: Vec<Result<Option<String>>>) -> (impl FnMut() -> std::future::Ready<Result<Option<String>>>, Arc<AtomicUsize>) {
		let frames = Arc::new(Mutex::new(VecDeque::from(frames)));
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&calls);
		let probe = move || {
			counter.fetch_add(1, Ordering::SeqCst);
			let next = frames.lock().pop_front().unwrap_or(Ok(None));
			std::future::ready(next)
		};
		(probe, calls)
	}

	#[test]
	fn novelty_ignores_case() {
		assert!(!is_new_reply(Some("A"), Some("a")));
		assert!(!is_new_reply(Some("same"), Some("same")));
		assert!(is_new_reply(Some("A"), Some("B")));
		assert!(is_new_reply(None, Some("first")));
		assert!(!is_new_reply(Some("A"), None));
		assert!(!is_new_reply(None, None));
	}

	#[tokio::test(start_paused = true)]
	async fn returns_first_new_reply_after_settle() {
		let (probe, calls) = scripted(vec![Ok(Some("A".into())), Ok(Some("A".into())), Ok(Some("B".into()))]);
		let started = Instant::now();

		let outcome = await_new_reply(Some("A"), policy(None), &CancellationToken::new(), probe).await.unwrap();

		assert_eq!(outcome, Completion::Reply("B".into()));
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		let elapsed = started.elapsed();
		assert!(elapsed >= Duration::from_millis(8000) && elapsed < Duration::from_millis(8100), "{elapsed:?}");
	}

	#[tokio::test(start_paused = true)]
	async fn transient_failures_are_skipped() {
		let (probe, calls) = scripted(vec![Err(Error::Evaluation("node detached".into())), Ok(Some("B".into()))]);

		let outcome = await_new_reply(Some("A"), policy(None), &CancellationToken::new(), probe).await.unwrap();

		assert_eq!(outcome.into_reply().as_deref(), Some("B"));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn fatal_failures_end_the_wait() {
		let (probe, _) = scripted(vec![Err(Error::SessionClosed)]);

		let err = await_new_reply(Some("A"), policy(None), &CancellationToken::new(), probe).await.unwrap_err();
		assert!(matches!(err, Error::SessionClosed));
	}

	#[tokio::test(start_paused = true)]
	async fn times_out_when_nothing_changes() {
		let (probe, calls) = scripted(vec![]);

		let outcome = await_new_reply(None, policy(Some(3500)), &CancellationToken::new(), probe).await.unwrap();

		assert_eq!(outcome, Completion::TimedOut);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_stops_polling() {
		let (probe, _) = scripted(vec![]);
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			sleep(Duration::from_millis(2500)).await;
			trigger.cancel();
		});

		let outcome = await_new_reply(Some("A"), policy(None), &cancel, probe).await.unwrap();
		assert_eq!(outcome, Completion::Cancelled);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_during_settle_keeps_reply() {
		let (probe, _) = scripted(vec![Ok(Some("B".into()))]);
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			sleep(Duration::from_millis(1500)).await;
			trigger.cancel();
		});
		let started = Instant::now();

		let outcome = await_new_reply(Some("A"), policy(None), &cancel, probe).await.unwrap();

		assert_eq!(outcome, Completion::Reply("B".into()));
		assert!(started.elapsed() < Duration::from_millis(6000));
	}
}
