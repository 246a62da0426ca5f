//! Resolving global flags into a session configuration, a browser, and a
//! sign-in method.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pw_chat::{Authenticator, CdpEngine, ChatSession, Credentials, FormLoginAuthenticator, LaunchOptions, SessionConfig, StorageStateAuthenticator};
use tracing::{debug, info, warn};

use crate::cli::GlobalArgs;
use crate::error::{CliError, Result};
use crate::output::OutputFormat;

/// `<config dir>/pw-chat/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("pw-chat").join("config.json"))
}

/// Loads the explicit config file, else the default one when it exists,
/// else built-in defaults.
pub fn load_config(explicit: Option<&Path>, fallback: Option<PathBuf>) -> Result<SessionConfig> {
	if let Some(path) = explicit {
		return Ok(SessionConfig::from_file(path)?);
	}
	match fallback {
		Some(path) if path.is_file() => {
			debug!(target = "pw_chat.cli", path = %path.display(), "using default config file");
			Ok(SessionConfig::from_file(&path)?)
		}
		_ => Ok(SessionConfig::default()),
	}
}

/// Applies flag and environment overrides on top of a loaded config.
pub fn apply_overrides(mut config: SessionConfig, args: &GlobalArgs) -> Result<SessionConfig> {
	config.credentials = match (args.identity.clone(), args.secret.clone(), config.credentials.take()) {
		(Some(identity), Some(secret), _) => Some(Credentials::new(identity, secret)),
		(Some(identity), None, Some(existing)) => Some(Credentials::new(identity, existing.secret)),
		(None, Some(secret), Some(existing)) => Some(Credentials::new(existing.identity, secret)),
		(Some(_), None, None) | (None, Some(_), None) => {
			return Err(CliError::Config("identity and secret must be provided together".into()));
		}
		(None, None, existing) => existing,
	};
	if args.plaintext {
		config.markdown = false;
	}
	if args.debug {
		config.debug = true;
	}
	if let Some(secs) = args.timeout_secs {
		config.timings.completion_timeout_ms = (secs > 0).then(|| secs.saturating_mul(1000));
	}
	Ok(config)
}

/// Where to find an already running browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
	WebSocket(String),
	Port(u16),
}

impl Endpoint {
	pub fn parse(raw: &str) -> Result<Self> {
		let raw = raw.trim();
		if raw.starts_with("ws://") || raw.starts_with("wss://") {
			return Ok(Endpoint::WebSocket(raw.to_string()));
		}
		let port = match raw.strip_prefix("http://").or_else(|| raw.strip_prefix("https://")) {
			Some(address) => address.trim_end_matches('/').rsplit_once(':').map(|(_, port)| port).unwrap_or_default(),
			None => raw,
		};
		port.parse()
			.map(Endpoint::Port)
			.map_err(|_| CliError::Config(format!("cannot read a debugging endpoint from `{}`", raw)))
	}
}

/// Everything a command needs, resolved once from the global flags.
#[derive(Debug, Clone)]
pub struct CommandContext {
	pub config: SessionConfig,
	pub auth_file: Option<PathBuf>,
	pub endpoint: Option<Endpoint>,
	pub headed: bool,
	pub format: OutputFormat,
}

impl CommandContext {
	pub fn resolve(args: &GlobalArgs) -> Result<Self> {
		Self::resolve_with_fallback(args, default_config_path())
	}

	pub fn resolve_with_fallback(args: &GlobalArgs, fallback: Option<PathBuf>) -> Result<Self> {
		let config = apply_overrides(load_config(args.config.as_deref(), fallback)?, args)?;
		Ok(Self {
			config,
			auth_file: args.auth.clone(),
			endpoint: args.cdp_endpoint.as_deref().map(Endpoint::parse).transpose()?,
			headed: args.headed,
			format: args.format,
		})
	}

	/// Attaches to the configured endpoint or launches a browser. The flag
	/// tells whether the browser belongs to this process.
	pub async fn engine(&self, headless: bool) -> Result<(Arc<CdpEngine>, bool)> {
		let (engine, owned) = match &self.endpoint {
			Some(Endpoint::WebSocket(url)) => (CdpEngine::connect(url).await?, false),
			Some(Endpoint::Port(port)) => (CdpEngine::discover(*port).await?, false),
			None => {
				let options = LaunchOptions {
					headless,
					..LaunchOptions::default()
				};
				(CdpEngine::launch(options).await?, true)
			}
		};
		Ok((Arc::new(engine), owned))
	}

	/// A saved session wins over credentials.
	pub fn authenticator(&self) -> Result<Arc<dyn Authenticator>> {
		if let Some(path) = &self.auth_file {
			return Ok(Arc::new(StorageStateAuthenticator::new(path)));
		}
		if self.config.credentials.is_some() {
			return Ok(Arc::new(FormLoginAuthenticator::default()));
		}
		Err(CliError::Config(
			"no sign-in method: pass --auth FILE (see `pw-chat login`) or set PW_CHAT_IDENTITY and PW_CHAT_SECRET".into(),
		))
	}

	/// Starts a browser, signs in, and hands back a ready session.
	pub async fn open_session(&self) -> Result<OpenSession> {
		let authenticator = self.authenticator()?;
		let (engine, owned) = self.engine(!self.headed).await?;
		let mut open = OpenSession {
			session: ChatSession::new(self.config.clone(), engine.clone(), authenticator),
			engine,
			owned,
		};

		match open.session.initialize().await {
			Ok(true) => Ok(open),
			Ok(false) => {
				open.close().await?;
				Err(CliError::NotAuthenticated)
			}
			Err(e) => {
				if let Err(close_err) = open.close().await {
					debug!(target = "pw_chat.cli", error = %close_err, "cleanup after failed initialization failed");
				}
				Err(e.into())
			}
		}
	}
}

/// A ready session plus the browser behind it.
pub struct OpenSession {
	pub session: ChatSession,
	engine: Arc<CdpEngine>,
	owned: bool,
}

impl OpenSession {
	/// Closes the session, and the browser too when this process launched it.
	pub async fn close(mut self) -> Result<()> {
		let closed = self.session.close().await;
		if self.owned {
			if let Err(e) = self.engine.shutdown().await {
				warn!(target = "pw_chat.cli", error = %e, "browser shutdown failed");
			}
		}
		info!(target = "pw_chat.cli", "session closed");
		Ok(closed?)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pw_chat::OutputFormat as ReplyFormat;
	use tempfile::TempDir;

	use super::*;

	fn args() -> GlobalArgs {
		GlobalArgs::default()
	}

	#[test]
	fn defaults_without_any_config_file() {
		let temp = TempDir::new().unwrap();
		let ctx = CommandContext::resolve_with_fallback(&args(), Some(temp.path().join("absent.json"))).unwrap();
		assert_eq!(ctx.config, SessionConfig::default());
		assert!(ctx.endpoint.is_none());
	}

	#[test]
	fn default_config_file_is_used_when_present() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		std::fs::write(&path, r#"{"markdown": false, "timings": {"settleMs": 100}}"#).unwrap();

		let ctx = CommandContext::resolve_with_fallback(&args(), Some(path)).unwrap();

		assert_eq!(ctx.config.output_format(), ReplyFormat::Plaintext);
		assert_eq!(ctx.config.timings.settle_ms, 100);
	}

	#[test]
	fn explicit_config_must_exist() {
		let temp = TempDir::new().unwrap();
		let mut args = args();
		args.config = Some(temp.path().join("missing.json"));

		let err = CommandContext::resolve_with_fallback(&args, None).unwrap_err();
		assert!(err.to_string().contains("missing.json"));
	}

	#[test]
	fn flags_override_config() {
		let temp = TempDir::new().unwrap();
		let path = temp.path().join("config.json");
		std::fs::write(&path, r#"{"credentials": {"identity": "file@example.com", "secret": "from-file"}}"#).unwrap();
		let mut args = args();
		args.config = Some(path);
		args.secret = Some("from-env".into());
		args.plaintext = true;
		args.debug = true;
		args.timeout_secs = Some(0);

		let ctx = CommandContext::resolve_with_fallback(&args, None).unwrap();

		let credentials = ctx.config.credentials.clone().unwrap();
		assert_eq!(credentials.identity, "file@example.com");
		assert_eq!(credentials.secret, "from-env");
		assert!(!ctx.config.markdown);
		assert!(ctx.config.debug);
		assert_eq!(ctx.config.timings.completion_timeout_ms, None);
	}

	#[test]
	fn lone_identity_is_rejected() {
		let mut args = args();
		args.identity = Some("me@example.com".into());
		assert!(matches!(apply_overrides(SessionConfig::default(), &args), Err(CliError::Config(_))));
	}

	#[test]
	fn timeout_flag_converts_to_millis() {
		let mut args = args();
		args.timeout_secs = Some(90);
		let config = apply_overrides(SessionConfig::default(), &args).unwrap();
		assert_eq!(config.timings.completion_timeout(), Some(Duration::from_secs(90)));
	}

	#[test]
	fn endpoints_parse() {
		assert_eq!(
			Endpoint::parse("ws://127.0.0.1:9222/devtools/browser/abc").unwrap(),
			Endpoint::WebSocket("ws://127.0.0.1:9222/devtools/browser/abc".into())
		);
		assert_eq!(Endpoint::parse("http://localhost:9222/").unwrap(), Endpoint::Port(9222));
		assert_eq!(Endpoint::parse("9333").unwrap(), Endpoint::Port(9333));
		assert!(Endpoint::parse("localhost").is_err());
	}

	#[test]
	fn saved_session_is_preferred_over_credentials() {
		let mut args = args();
		args.identity = Some("me@example.com".into());
		args.secret = Some("hunter2".into());
		let mut ctx = CommandContext::resolve_with_fallback(&args, None).unwrap();
		assert!(ctx.authenticator().is_ok());

		ctx.config.credentials = None;
		assert!(matches!(ctx.authenticator(), Err(CliError::Config(_))));

		ctx.auth_file = Some(PathBuf::from("auth.json"));
		assert!(ctx.authenticator().is_ok());
	}
}
