//! Session configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "credentials": { "identity": "me@example.com", "secret": "..." },
//!   "markdown": false,
//!   "timings": { "completionTimeoutMs": 120000 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use pw_chat_protocol::{LoginVariant, OutputFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::selectors::{CONVERSATION_API_PREFIX, CONVERSATION_URL, SelectorContract};

/// Sign-in credentials handed to the authentication provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	pub identity: String,
	pub secret: String,
}

impl Credentials {
	pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
		Self {
			identity: identity.into(),
			secret: secret.into(),
		}
	}
}

impl std::fmt::Debug for Credentials {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Credentials")
			.field("identity", &self.identity)
			.field("secret", &"<redacted>")
			.finish()
	}
}

/// Delays used by the polling loops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Timings {
	/// Pause between welcome-overlay dismissal attempts.
	pub overlay_retry_ms: u64,
	/// Cadence of the completion poll.
	pub poll_interval_ms: u64,
	/// Extra wait after a new reply is detected, before it is returned.
	pub settle_ms: u64,
	/// Upper bound on waiting for a reply; `None` waits until cancelled.
	pub completion_timeout_ms: Option<u64>,
}

impl Default for Timings {
	fn default() -> Self {
		Self {
			overlay_retry_ms: 500,
			poll_interval_ms: 1000,
			settle_ms: 5000,
			completion_timeout_ms: Some(300_000),
		}
	}
}

impl Timings {
	pub fn overlay_retry(&self) -> Duration {
		Duration::from_millis(self.overlay_retry_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn settle(&self) -> Duration {
		Duration::from_millis(self.settle_ms)
	}

	pub fn completion_timeout(&self) -> Option<Duration> {
		self.completion_timeout_ms.map(Duration::from_millis)
	}
}

/// Which traffic the debug network observer reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkConfig {
	/// URL prefixes considered conversation-backend traffic.
	pub endpoint_prefixes: Vec<String>,
}

impl Default for NetworkConfig {
	fn default() -> Self {
		Self {
			endpoint_prefixes: vec![CONVERSATION_API_PREFIX.to_string()],
		}
	}
}

/// Everything a [`ChatSession`](crate::ChatSession) is configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	pub credentials: Option<Credentials>,
	/// Render replies through the content normalizer (`true`) or as plain text.
	pub markdown: bool,
	/// Enable the network observer.
	pub debug: bool,
	pub login_variant: LoginVariant,
	/// Opaque token forwarded to the authentication provider.
	pub challenge_bypass_token: Option<String>,
	pub conversation_url: String,
	pub selectors: SelectorContract,
	pub timings: Timings,
	pub network: NetworkConfig,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			credentials: None,
			markdown: true,
			debug: false,
			login_variant: LoginVariant::Standard,
			challenge_bypass_token: None,
			conversation_url: CONVERSATION_URL.to_string(),
			selectors: SelectorContract::default(),
			timings: Timings::default(),
			network: NetworkConfig::default(),
		}
	}
}

impl SessionConfig {
	/// Loads a JSON config file.
	pub fn from_file(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
		serde_json::from_str(&raw).map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
	}

	pub fn output_format(&self) -> OutputFormat {
		OutputFormat::from_markdown_flag(self.markdown)
	}

	pub fn with_credentials(mut self, credentials: Credentials) -> Self {
		self.credentials = Some(credentials);
		self
	}

	pub fn with_markdown(mut self, markdown: bool) -> Self {
		self.markdown = markdown;
		self
	}

	pub fn with_debug(mut self, debug: bool) -> Self {
		self.debug = debug;
		self
	}

	pub fn with_timings(mut self, timings: Timings) -> Self {
		self.timings = timings;
		self
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	#[test]
	fn defaults_match_documented_options() {
		let config = SessionConfig::default();
		assert!(config.markdown);
		assert!(!config.debug);
		assert_eq!(config.login_variant, LoginVariant::Standard);
		assert_eq!(config.output_format(), OutputFormat::Markdown);
		assert_eq!(config.timings.poll_interval(), Duration::from_secs(1));
		assert_eq!(config.timings.settle(), Duration::from_secs(5));
		assert_eq!(config.timings.overlay_retry(), Duration::from_millis(500));
	}

	#[test]
	fn loads_partial_file() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		std::fs::write(
			&path,
			r#"{
  "credentials": {"identity": "me@example.com", "secret": "hunter2"},
  "markdown": false,
  "loginVariant": "alternate",
  "timings": {"settleMs": 250, "completionTimeoutMs": null}
}"#,
		)
		.unwrap();

		let config = SessionConfig::from_file(&path).unwrap();
		assert_eq!(config.output_format(), OutputFormat::Plaintext);
		assert_eq!(config.login_variant, LoginVariant::Alternate);
		assert_eq!(config.timings.settle_ms, 250);
		assert_eq!(config.timings.poll_interval_ms, 1000);
		assert_eq!(config.timings.completion_timeout(), None);
		assert_eq!(config.credentials.unwrap().identity, "me@example.com");
	}

	#[test]
	fn malformed_file_names_the_path() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		std::fs::write(&path, "{").unwrap();

		let err = SessionConfig::from_file(&path).unwrap_err();
		assert!(err.to_string().contains("config.json"));
	}

	#[test]
	fn debug_output_redacts_secret() {
		let rendered = format!("{:?}", Credentials::new("me", "hunter2"));
		assert!(rendered.contains("me"));
		assert!(!rendered.contains("hunter2"));
	}
}
