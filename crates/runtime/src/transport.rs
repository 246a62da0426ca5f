//! Message transports for the CDP connection.
//!
//! A transport is split in two halves so the connection can send while a
//! background task reads:
//! * [`Transport`]: the sending half, owned by the connection
//! * [`TransportReceiver`]: the reading half, driven to completion by
//!   [`Connection::run`](crate::connection::Connection::run), which pushes
//!   every decoded message into an unbounded channel

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Sending half of a transport.
pub trait Transport: Send {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Reading half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until the peer closes, forwarding decoded messages.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Everything a [`Connection`](crate::connection::Connection) needs from a transport.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<JsonValue>,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport over the browser's DevTools WebSocket.
pub struct WebSocketTransport {
	sink: SplitSink<WsStream, Message>,
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl WebSocketTransport {
	/// Connects to a `ws://` DevTools endpoint.
	///
	/// Returns the transport and the channel that will carry inbound messages
	/// once the receiving half runs.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<JsonValue>)> {
		debug!(target = "pw_chat.cdp", %url, "connecting websocket");
		let (ws, _) = tokio_tungstenite::connect_async(url).await?;
		let (sink, stream) = ws.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { sink, stream, message_tx }, message_rx))
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<JsonValue>) -> TransportParts {
		TransportParts {
			sender: Box::new(WebSocketSender { sink: self.sink }),
			receiver: Box::new(WebSocketReceiver {
				stream: self.stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			trace!(target = "pw_chat.cdp", bytes = text.len(), "send");
			self.sink.send(Message::Text(text)).await?;
			Ok(())
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let value: JsonValue = match frame? {
					Message::Text(text) => serde_json::from_str(&text)?,
					Message::Binary(bytes) => serde_json::from_slice(&bytes)?,
					Message::Close(_) => break,
					_ => continue,
				};
				if self.message_tx.send(value).is_err() {
					break;
				}
			}
			Err(Error::ConnectionClosed)
		})
	}
}
