//! In-memory transport for testing command correlation and event fan-out
//! without a browser.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let connection = Connection::spawn(parts);
//!
//! let pending = tokio::spawn({
//!     let conn = Arc::clone(&connection);
//!     async move { conn.send(None, "Browser.getVersion", json!({})).await }
//! });
//! controller.inject_response(0, json!({"product": "Chrome/120"}));
//! let result = pending.await??;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Value as JsonValue, json};
use tokio::sync::{Mutex, mpsc};

use crate::error::Result;
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Builder for fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder;

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self
	}

	/// Builds the transport halves plus a controller for injecting inbound
	/// messages and inspecting outbound ones.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let sent = Arc::new(Mutex::new(Vec::new()));

		let parts = TransportParts {
			sender: Box::new(FakeTransportSender { sent: Arc::clone(&sent) }),
			receiver: Box::new(FakeTransportReceiver { inbound_rx, message_tx }),
			message_rx,
		};

		(parts, FakeTransportController { inbound_tx, sent })
	}
}

/// Handle for driving a fake transport from a test.
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<JsonValue>,
	sent: Arc<Mutex<Vec<JsonValue>>>,
}

impl FakeTransportController {
	/// Injects a raw inbound message.
	pub fn inject(&self, message: JsonValue) {
		let _ = self.inbound_tx.send(message);
	}

	/// Injects a successful command result.
	pub fn inject_response(&self, id: u64, result: JsonValue) {
		self.inject(json!({ "id": id, "result": result }));
	}

	/// Injects a command error in CDP's `{code, message}` shape.
	pub fn inject_error(&self, id: u64, code: i64, message: &str) {
		self.inject(json!({ "id": id, "error": { "code": code, "message": message } }));
	}

	/// Injects an event, optionally scoped to a target session.
	pub fn inject_event(&self, session_id: Option<&str>, method: &str, params: JsonValue) {
		let mut event = json!({ "method": method, "params": params });
		if let Some(session_id) = session_id {
			event["sessionId"] = JsonValue::String(session_id.to_string());
		}
		self.inject(event);
	}

	/// Drops the inbound side, which ends the connection loop.
	pub fn close(self) {
		drop(self.inbound_tx);
	}

	/// Takes all sent messages, clearing the buffer.
	pub async fn take_sent(&self) -> Vec<JsonValue> {
		std::mem::take(&mut *self.sent.lock().await)
	}
}

struct FakeTransportSender {
	sent: Arc<Mutex<Vec<JsonValue>>>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let sent = Arc::clone(&self.sent);
		Box::pin(async move {
			sent.lock().await.push(message);
			Ok(())
		})
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<JsonValue>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
