use thiserror::Error;

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum Error {
	/// A control that only exists for a signed-in user is missing.
	#[error("not authenticated: required page control is missing")]
	NotAuthenticated,

	#[error("session has not been initialized")]
	NotInitialized,

	#[error("session is closed; call initialize() to start a new one")]
	SessionClosed,

	#[error("authentication failed: {0}")]
	Auth(String),

	#[error("navigation to {url} failed: {message}")]
	Navigation { url: String, message: String },

	/// Script evaluation in the page threw or returned an unexpected shape.
	#[error("page evaluation failed: {0}")]
	Evaluation(String),

	#[error("configuration error: {0}")]
	Config(String),

	#[error(transparent)]
	Runtime(#[from] pw_chat_runtime::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl Error {
	/// Whether this failure comes from the page shifting underneath a query
	/// (detached nodes, navigation, a torn-down execution context) rather
	/// than from the session itself.
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			Error::Evaluation(_) | Error::Runtime(pw_chat_runtime::Error::Protocol { .. }) | Error::Runtime(pw_chat_runtime::Error::Timeout(_))
		)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
