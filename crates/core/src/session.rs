//! The session controller.
//!
//! A [`ChatSession`] owns exactly one browsing context and one page between
//! [`initialize`](ChatSession::initialize) and [`close`](ChatSession::close).
//! Operations are issued sequentially by the caller; the `&mut self`
//! receivers on the lifecycle methods make overlapping lifecycle changes
//! impossible.

use std::sync::Arc;

use pw_chat_protocol::{OutputFormat, WaitUntil};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthRequest, Authenticator};
use crate::completion::{Completion, CompletionPolicy, await_new_reply};
use crate::config::SessionConfig;
use crate::engine::{BrowsingContext, Engine, Page};
use crate::error::{Error, Result};
use crate::extractor::{ActionMarkerOracle, CompletionOracle, ConversationExtractor, Message};
use crate::observer::{DebugObserver, NetworkObserver, NoopObserver};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
	Uninitialized,
	/// A page exists but the signed-in view has not been confirmed.
	Authenticating,
	Ready,
	Closed,
}

struct Live {
	context: Box<dyn BrowsingContext>,
	page: Box<dyn Page>,
}

impl Live {
	/// Closes page then context, returning the first failure.
	async fn teardown(self) -> Result<()> {
		let page = self.page.close().await;
		let context = self.context.close().await;
		page.and(context)
	}
}

enum State {
	Uninitialized,
	Authenticating(Live),
	Ready(Live),
	Closed,
}

impl State {
	fn phase(&self) -> SessionPhase {
		match self {
			State::Uninitialized => SessionPhase::Uninitialized,
			State::Authenticating(_) => SessionPhase::Authenticating,
			State::Ready(_) => SessionPhase::Ready,
			State::Closed => SessionPhase::Closed,
		}
	}

	fn take_live(&mut self, next: State) -> Option<Live> {
		match std::mem::replace(self, next) {
			State::Authenticating(live) | State::Ready(live) => Some(live),
			State::Uninitialized | State::Closed => None,
		}
	}
}

/// A conversation driven through the rendered page.
pub struct ChatSession {
	config: SessionConfig,
	engine: Arc<dyn Engine>,
	authenticator: Arc<dyn Authenticator>,
	extractor: ConversationExtractor,
	observer: Arc<dyn NetworkObserver>,
	state: State,
}

impl ChatSession {
	/// Builds an uninitialized session. Debug observation follows
	/// `config.debug`.
	pub fn new(config: SessionConfig, engine: Arc<dyn Engine>, authenticator: Arc<dyn Authenticator>) -> Self {
		let oracle: Arc<dyn CompletionOracle> = Arc::new(ActionMarkerOracle::new(config.selectors.completion_marker.clone()));
		let observer: Arc<dyn NetworkObserver> = if config.debug {
			Arc::new(DebugObserver::new(config.network.endpoint_prefixes.clone()))
		} else {
			Arc::new(NoopObserver)
		};
		Self {
			extractor: ConversationExtractor::new(&config.selectors, oracle),
			config,
			engine,
			authenticator,
			observer,
			state: State::Uninitialized,
		}
	}

	/// Replaces the structural completion heuristic.
	pub fn with_oracle(mut self, oracle: Arc<dyn CompletionOracle>) -> Self {
		self.extractor = ConversationExtractor::new(&self.config.selectors, oracle);
		self
	}

	pub fn with_observer(mut self, observer: Arc<dyn NetworkObserver>) -> Self {
		self.observer = observer;
		self
	}

	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	pub fn phase(&self) -> SessionPhase {
		self.state.phase()
	}

	fn format(&self) -> OutputFormat {
		self.config.output_format()
	}

	fn page(&self) -> Result<&dyn Page> {
		match &self.state {
			State::Authenticating(live) | State::Ready(live) => Ok(live.page.as_ref()),
			State::Uninitialized => Err(Error::NotInitialized),
			State::Closed => Err(Error::SessionClosed),
		}
	}

	/// Opens a fresh page, authenticates, and reports whether the signed-in
	/// view was reached.
	///
	/// A live page from an earlier call is torn down first. Failures from
	/// the authenticator or navigation propagate and leave the session in
	/// [`SessionPhase::Authenticating`]; an unconfirmed sign-in returns
	/// `Ok(false)`.
	pub async fn initialize(&mut self) -> Result<bool> {
		if let Some(previous) = self.state.take_live(State::Uninitialized) {
			debug!(target = "pw_chat.session", "tearing down previous page");
			if let Err(e) = previous.teardown().await {
				warn!(target = "pw_chat.session", error = %e, "failed to close previous page");
			}
		}

		let context = self.engine.new_context().await?;
		let page = match context.new_page().await {
			Ok(page) => page,
			Err(e) => {
				if let Err(close_err) = context.close().await {
					debug!(target = "pw_chat.session", error = %close_err, "failed to close context after page creation failed");
				}
				return Err(e);
			}
		};
		self.state = State::Authenticating(Live { context, page });
		info!(target = "pw_chat.session", variant = %self.config.login_variant, "session authenticating");

		let ready = self.authenticate_and_settle().await?;
		if !ready {
			info!(target = "pw_chat.session", "message input not found; not signed in");
			return Ok(false);
		}

		self.page()?.observe_network(Arc::clone(&self.observer)).await?;
		if let Some(live) = self.state.take_live(State::Uninitialized) {
			self.state = State::Ready(live);
		}
		info!(target = "pw_chat.session", "session ready");
		Ok(true)
	}

	async fn authenticate_and_settle(&self) -> Result<bool> {
		let State::Authenticating(live) = &self.state else {
			return Err(Error::NotInitialized);
		};
		let page = live.page.as_ref();
		let url = self.config.conversation_url.as_str();

		self.authenticator
			.establish_session(AuthRequest {
				credentials: self.config.credentials.as_ref(),
				page,
				context: live.context.as_ref(),
				variant: self.config.login_variant,
				challenge_bypass_token: self.config.challenge_bypass_token.as_deref(),
				conversation_url: url,
				input_selector: &self.config.selectors.input,
			})
			.await?;

		let current = page.url().await.unwrap_or_default();
		if current != url {
			debug!(target = "pw_chat.session", from = %current, to = %url, "navigating to conversation page");
			page.goto(url, WaitUntil::NetworkIdle).await?;
		}

		self.dismiss_overlays(page).await?;
		Ok(self.input_present(page).await)
	}

	/// Clicks through the welcome overlay until it closes or offers no
	/// dismissal control.
	async fn dismiss_overlays(&self, page: &dyn Page) -> Result<()> {
		let selectors = &self.config.selectors;
		let mut clicks = 0usize;
		while !page.query(&selectors.overlay_open).await?.is_empty() {
			let Some(dismiss) = page.query_first(&selectors.overlay_dismiss).await? else {
				debug!(target = "pw_chat.session", clicks, "overlay has no dismissal control");
				break;
			};
			dismiss.click().await?;
			clicks += 1;
			tokio::time::sleep(self.config.timings.overlay_retry()).await;
		}
		if clicks > 0 {
			debug!(target = "pw_chat.session", clicks, "welcome overlay dismissed");
		}
		Ok(())
	}

	async fn input_present(&self, page: &dyn Page) -> bool {
		match page.query_first(&self.config.selectors.input).await {
			Ok(found) => found.is_some(),
			Err(e) => {
				debug!(target = "pw_chat.session", error = %e, "input probe failed; treating as signed out");
				false
			}
		}
	}

	/// Whether the message input is on the page. Never fails: probe errors,
	/// a missing page and a closed session all read as `false`.
	pub async fn is_authenticated(&self) -> bool {
		match self.page() {
			Ok(page) => self.input_present(page).await,
			Err(_) => false,
		}
	}

	/// Prompt texts in render order, always plain text.
	pub async fn get_prompts(&self) -> Result<Vec<String>> {
		self.extractor.prompts(self.page()?).await
	}

	/// Complete replies in render order, formatted per the configured output.
	pub async fn get_messages(&self) -> Result<Vec<String>> {
		self.extractor.replies(self.page()?, self.format()).await
	}

	pub async fn get_last_message(&self) -> Result<Option<String>> {
		self.extractor.last_reply(self.page()?, self.format()).await
	}

	/// Every rendered turn with role, completion status and markup.
	pub async fn conversation(&self) -> Result<Vec<Message>> {
		self.extractor.conversation(self.page()?, self.format()).await
	}

	/// Sends `text` and waits for the reply under the configured timeout.
	pub async fn send_message(&self, text: &str) -> Result<Completion> {
		self.send_message_with_cancel(text, &CancellationToken::new()).await
	}

	/// Sends `text` and waits for the reply until it arrives, the configured
	/// timeout passes, or `cancel` fires.
	///
	/// Newlines are sent as tabs since the page submits on a raw newline.
	pub async fn send_message_with_cancel(&self, text: &str, cancel: &CancellationToken) -> Result<Completion> {
		let page = self.page()?;
		let format = self.format();
		let extractor = &self.extractor;
		// Extraction releases element handles, so the input is looked up after it.
		let baseline = extractor.last_reply(page, format).await?;
		let input = page.query_first(&self.config.selectors.input).await?.ok_or(Error::NotAuthenticated)?;

		let outgoing = text.replace('\n', "\t");
		input.focus().await?;
		input.type_text(&outgoing).await?;
		input.press("Enter").await?;
		debug!(target = "pw_chat.session", chars = outgoing.chars().count(), has_baseline = baseline.is_some(), "message submitted");

		let policy = CompletionPolicy::from(&self.config.timings);
		let completion = await_new_reply(baseline.as_deref(), policy, cancel, move || extractor.last_reply(page, format)).await?;
		match &completion {
			Completion::Reply(reply) => debug!(target = "pw_chat.session", chars = reply.chars().count(), "reply received"),
			Completion::TimedOut => warn!(target = "pw_chat.session", timeout = ?policy.timeout, "timed out waiting for reply"),
			Completion::Cancelled => info!(target = "pw_chat.session", "wait for reply cancelled"),
		}
		Ok(completion)
	}

	/// Starts a new conversation via the first navigation entry.
	pub async fn reset_thread(&self) -> Result<()> {
		let page = self.page()?;
		let entry = page
			.query_first(&self.config.selectors.navigation)
			.await?
			.ok_or(Error::NotAuthenticated)?;
		entry.click().await?;
		info!(target = "pw_chat.session", "conversation reset");
		Ok(())
	}

	/// Releases the page and context. Later operations fail with
	/// [`Error::SessionClosed`] until `initialize` runs again.
	pub async fn close(&mut self) -> Result<()> {
		match self.state.take_live(State::Closed) {
			Some(live) => {
				info!(target = "pw_chat.session", "closing session");
				live.teardown().await
			}
			None => Ok(()),
		}
	}
}
