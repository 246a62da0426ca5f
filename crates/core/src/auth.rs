//! Authentication providers.
//!
//! A provider gets the session's fresh page and context and must leave the
//! page on an authenticated view, or fail. How it gets there (saved
//! cookies, a scripted login form) is its own business.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use pw_chat_protocol::{Cookie, LoginVariant, StorageState, WaitUntil};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Credentials;
use crate::engine::{BrowsingContext, Element, Page};
use crate::error::{Error, Result};
use crate::selectors::LOGIN_URL;

/// Cookie the challenge front-end checks before serving the app.
pub const CLEARANCE_COOKIE: &str = "cf_clearance";

/// Everything a provider may use to establish a session.
pub struct AuthRequest<'a> {
	pub credentials: Option<&'a Credentials>,
	pub page: &'a dyn Page,
	pub context: &'a dyn BrowsingContext,
	pub variant: LoginVariant,
	pub challenge_bypass_token: Option<&'a str>,
	pub conversation_url: &'a str,
	/// Selector of the message input; present once signed in.
	pub input_selector: &'a str,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
	async fn establish_session(&self, request: AuthRequest<'_>) -> Result<()>;
}

/// Restores a session from a saved storage-state file.
#[derive(Debug, Clone)]
pub struct StorageStateAuthenticator {
	path: PathBuf,
}

impl StorageStateAuthenticator {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

#[async_trait]
impl Authenticator for StorageStateAuthenticator {
	async fn establish_session(&self, request: AuthRequest<'_>) -> Result<()> {
		let state = StorageState::from_file(&self.path).map_err(|e| Error::Auth(format!("cannot load {}: {}", self.path.display(), e)))?;
		if !state.origins.is_empty() {
			debug!(target = "pw_chat.auth", origins = state.origins.len(), "local storage entries in state file are not restored");
		}

		let mut cookies = state.cookies;
		if let Some(token) = request.challenge_bypass_token {
			cookies.push(clearance_cookie(request.conversation_url, token)?);
		}
		info!(target = "pw_chat.auth", path = %self.path.display(), cookies = cookies.len(), "restoring saved session");
		request.context.add_cookies(cookies).await?;
		request.page.goto(request.conversation_url, WaitUntil::Load).await?;
		Ok(())
	}
}

/// Selectors for one branch of the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSelectors {
	/// Control on the landing page that opens the login form.
	pub entry: String,
	/// Identity-provider button, for flows that delegate sign-in.
	pub provider: Option<String>,
	pub identity: String,
	pub identity_submit: String,
	pub secret: String,
	pub secret_submit: String,
}

impl LoginSelectors {
	pub fn for_variant(variant: LoginVariant) -> Self {
		match variant {
			LoginVariant::Standard => Self {
				entry: "button[data-testid='login-button']".into(),
				provider: None,
				identity: "input[name='username']".into(),
				identity_submit: "button[type='submit']".into(),
				secret: "input[name='password']".into(),
				secret_submit: "button[type='submit']".into(),
			},
			LoginVariant::Alternate => Self {
				entry: "button[data-testid='login-button']".into(),
				provider: Some("button[data-provider='google']".into()),
				identity: "input[type='email']".into(),
				identity_submit: "#identifierNext".into(),
				secret: "input[type='password']".into(),
				secret_submit: "#passwordNext".into(),
			},
		}
	}
}

/// Signs in by filling the host's login form.
#[derive(Debug, Clone)]
pub struct FormLoginAuthenticator {
	pub login_url: String,
	/// How long each form control may take to appear.
	pub step_timeout: Duration,
	/// How long the conversation input may take to appear after submitting.
	pub ready_timeout: Duration,
	pub poll_interval: Duration,
}

impl Default for FormLoginAuthenticator {
	fn default() -> Self {
		Self {
			login_url: LOGIN_URL.to_string(),
			step_timeout: Duration::from_secs(30),
			ready_timeout: Duration::from_secs(60),
			poll_interval: Duration::from_millis(250),
		}
	}
}

impl FormLoginAuthenticator {
	async fn wait_for(&self, page: &dyn Page, selector: &str, timeout: Duration) -> Result<Option<Box<dyn Element>>> {
		let deadline = Instant::now() + timeout;
		loop {
			match page.query_first(selector).await {
				Ok(Some(element)) => return Ok(Some(element)),
				Ok(None) => {}
				Err(e) if e.is_transient() => debug!(target = "pw_chat.auth", selector, error = %e, "query failed during login, retrying"),
				Err(e) => return Err(e),
			}
			if Instant::now() >= deadline {
				return Ok(None);
			}
			sleep(self.poll_interval).await;
		}
	}

	async fn require(&self, page: &dyn Page, selector: &str) -> Result<Box<dyn Element>> {
		self.wait_for(page, selector, self.step_timeout)
			.await?
			.ok_or_else(|| Error::Auth(format!("login control `{}` did not appear", selector)))
	}

	async fn fill(&self, page: &dyn Page, selector: &str, value: &str, submit: &str) -> Result<()> {
		let field = self.require(page, selector).await?;
		field.focus().await?;
		field.type_text(value).await?;
		self.require(page, submit).await?.click().await
	}
}

#[async_trait]
impl Authenticator for FormLoginAuthenticator {
	async fn establish_session(&self, request: AuthRequest<'_>) -> Result<()> {
		let credentials = request
			.credentials
			.ok_or_else(|| Error::Auth("form login needs credentials (identity and secret)".into()))?;
		if let Some(token) = request.challenge_bypass_token {
			request.context.add_cookies(vec![clearance_cookie(request.conversation_url, token)?]).await?;
		}

		let page = request.page;
		let selectors = LoginSelectors::for_variant(request.variant);
		info!(target = "pw_chat.auth", variant = %request.variant, identity = %credentials.identity, "signing in");

		page.goto(&self.login_url, WaitUntil::Load).await?;
		self.require(page, &selectors.entry).await?.click().await?;
		if let Some(provider) = &selectors.provider {
			self.require(page, provider).await?.click().await?;
		}
		self.fill(page, &selectors.identity, &credentials.identity, &selectors.identity_submit).await?;
		self.fill(page, &selectors.secret, &credentials.secret, &selectors.secret_submit).await?;

		if self.wait_for(page, request.input_selector, self.ready_timeout).await?.is_none() {
			warn!(
				target = "pw_chat.auth",
				timeout_ms = self.ready_timeout.as_millis() as u64,
				"conversation input did not appear after login"
			);
		}
		Ok(())
	}
}

/// Clearance cookie scoped to the conversation host.
pub fn clearance_cookie(conversation_url: &str, token: &str) -> Result<Cookie> {
	let url = Url::parse(conversation_url).map_err(|e| Error::Config(format!("invalid conversation url {}: {}", conversation_url, e)))?;
	let host = url
		.host_str()
		.ok_or_else(|| Error::Config(format!("conversation url {} has no host", conversation_url)))?;
	let mut cookie = Cookie::new(CLEARANCE_COOKIE, token, host);
	cookie.http_only = Some(true);
	cookie.same_site = Some("None".into());
	Ok(cookie)
}
