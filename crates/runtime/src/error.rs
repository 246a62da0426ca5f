use thiserror::Error;

/// Errors raised by the CDP runtime.
#[derive(Debug, Error)]
pub enum Error {
	#[error("transport error: {0}")]
	Transport(String),

	#[error("websocket error: {0}")]
	WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

	/// The connection dropped before a response arrived.
	#[error("connection closed")]
	ConnectionClosed,

	/// The browser answered a command with an error object.
	#[error("protocol error {code}: {message}")]
	Protocol { code: i64, message: String },

	#[error("browser launch failed: {0}")]
	Launch(String),

	#[error("timed out: {0}")]
	Timeout(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
