//! Command/response correlation for the Chrome DevTools Protocol.
//!
//! The connection sits on top of a transport and handles:
//! - Generating unique command ids
//! - Correlating responses with pending commands
//! - Distinguishing events from responses
//! - Broadcasting events to every subscriber
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send`] with an optional target session,
//!    a method, and params
//! 2. The connection allocates an id and parks a oneshot sender under it
//! 3. The command is serialized and handed to the transport
//! 4. [`Connection::run`] receives the response and completes the oneshot
//!
//! Events carry no `id`; they are pushed into a broadcast channel and each
//! subscriber filters by `sessionId` itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

const EVENT_BUFFER: usize = 1024;

/// Outbound command.
///
/// ```json
/// { "id": 7, "method": "Runtime.evaluate", "params": {...}, "sessionId": "A1B2" }
/// ```
#[derive(Debug, Serialize)]
struct Command<'a> {
	id: u64,
	method: &'a str,
	params: Value,
	#[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
	session_id: Option<&'a str>,
}

/// Error object attached to a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
	pub code: i64,
	pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Response {
	id: u64,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<ErrorPayload>,
}

/// Event pushed by the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
	pub method: String,
	#[serde(default)]
	pub params: Value,
	/// Target session the event belongs to; `None` for browser-level events.
	#[serde(rename = "sessionId", default)]
	pub session_id: Option<String>,
}

/// Responses carry an `id`; events do not.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Message {
	Response(Response),
	Event(CdpEvent),
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// A DevTools connection shared across pages and elements via `Arc`.
pub struct Connection {
	last_id: AtomicU64,
	pending: Pending,
	/// Set once the inbound loop has ended; nothing completes new commands.
	closed: AtomicBool,
	sender: tokio::sync::Mutex<Box<dyn Transport>>,
	inbound: Mutex<Option<(Box<dyn TransportReceiver>, mpsc::UnboundedReceiver<Value>)>>,
	events: broadcast::Sender<CdpEvent>,
}

impl Connection {
	pub fn new(parts: TransportParts) -> Self {
		let (events, _) = broadcast::channel(EVENT_BUFFER);
		Self {
			last_id: AtomicU64::new(0),
			pending: Arc::new(Mutex::new(HashMap::new())),
			closed: AtomicBool::new(false),
			sender: tokio::sync::Mutex::new(parts.sender),
			inbound: Mutex::new(Some((parts.receiver, parts.message_rx))),
			events,
		}
	}

	/// Creates a connection and spawns its message loop.
	pub fn spawn(parts: TransportParts) -> Arc<Self> {
		let connection = Arc::new(Self::new(parts));
		let runner = Arc::clone(&connection);
		tokio::spawn(async move { runner.run().await });
		connection
	}

	/// Sends a command and waits for its result.
	///
	/// `session_id` routes the command to an attached target; `None` addresses
	/// the browser itself. Fails with [`Error::ConnectionClosed`] once the
	/// inbound loop has ended.
	pub async fn send(&self, session_id: Option<&str>, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);
		// `run` may have drained `pending` between the check and the insert.
		if self.is_closed() {
			self.pending.lock().remove(&id);
			return Err(Error::ConnectionClosed);
		}

		let command = Command {
			id,
			method,
			params,
			session_id,
		};
		trace!(target = "pw_chat.cdp", id, method, session = ?session_id, "command");

		let payload = serde_json::to_value(&command)?;
		if let Err(err) = self.sender.lock().await.send(payload).await {
			self.pending.lock().remove(&id);
			return Err(err);
		}

		rx.await.map_err(|_| Error::ConnectionClosed)?
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Subscribes to every event received after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
		self.events.subscribe()
	}

	/// Runs the inbound loop until the transport closes.
	///
	/// Pending commands fail with [`Error::ConnectionClosed`] once the loop
	/// ends. Calling `run` a second time returns immediately.
	pub async fn run(&self) {
		let Some((receiver, mut message_rx)) = self.inbound.lock().take() else {
			warn!(target = "pw_chat.cdp", "connection loop already started");
			return;
		};

		let reader = tokio::spawn(async move {
			if let Err(err) = receiver.run().await {
				debug!(target = "pw_chat.cdp", error = %err, "transport stopped");
			}
		});

		while let Some(value) = message_rx.recv().await {
			match serde_json::from_value::<Message>(value) {
				Ok(message) => {
					if let Err(err) = self.dispatch(message) {
						error!(target = "pw_chat.cdp", error = %err, "dispatch failed");
					}
				}
				Err(err) => error!(target = "pw_chat.cdp", error = %err, "unparseable message"),
			}
		}

		debug!(target = "pw_chat.cdp", "message loop ended");
		self.closed.store(true, Ordering::SeqCst);
		self.pending.lock().clear();
		let _ = reader.await;
	}

	fn dispatch(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => {
				let callback = self
					.pending
					.lock()
					.remove(&response.id)
					.ok_or_else(|| Error::Transport(format!("no pending command with id={}", response.id)))?;

				let result = match response.error {
					Some(err) => Err(Error::Protocol {
						code: err.code,
						message: err.message,
					}),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
				Ok(())
			}
			Message::Event(event) => {
				trace!(target = "pw_chat.cdp", method = %event.method, session = ?event.session_id, "event");
				let _ = self.events.send(event);
				Ok(())
			}
		}
	}
}
