use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Chat(#[from] pw_chat::Error),

	#[error("not signed in; restore a session with --auth FILE or provide credentials")]
	NotAuthenticated,

	#[error("timed out waiting for a reply")]
	TimedOut,

	#[error("interrupted while waiting for a reply")]
	Cancelled,

	#[error("configuration error: {0}")]
	Config(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
