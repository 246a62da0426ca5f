//! In-memory engine for testing sessions without a browser.
//!
//! The fake holds one scripted DOM shared by every context and page it
//! creates. Page-level queries are answered from per-selector frame queues:
//! each query consumes one frame and the last frame repeats forever, which
//! is enough to model content that changes between polls.
//!
//! # Example
//!
//! ```ignore
//! let engine = FakeEngine::new();
//! let selectors = SelectorContract::default();
//! engine.set(&selectors.input, vec![FakeNode::new("input")]);
//! engine.script(&selectors.message_container, vec![
//!     vec![FakeNode::reply(&selectors, "<p>A</p>", "A")],
//!     vec![FakeNode::reply(&selectors, "<p>A</p>", "A"), FakeNode::reply(&selectors, "<p>B</p>", "B")],
//! ]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use pw_chat_protocol::{Cookie, HttpRequest, HttpResponse, StorageState, WaitUntil};

use crate::auth::{AuthRequest, Authenticator};
use crate::engine::{BrowsingContext, Element, Engine, Page};
use crate::error::{Error, Result};
use crate::observer::NetworkObserver;
use crate::selectors::SelectorContract;

/// A scripted DOM node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeNode {
	/// Identifies the node in the action log.
	pub label: String,
	pub text: String,
	pub html: String,
	children: Vec<(String, FakeNode)>,
}

impl FakeNode {
	pub fn new(label: impl Into<String>) -> Self {
		Self {
			label: label.into(),
			..Default::default()
		}
	}

	pub fn text(mut self, text: impl Into<String>) -> Self {
		self.text = text.into();
		self
	}

	pub fn html(mut self, html: impl Into<String>) -> Self {
		self.html = html.into();
		self
	}

	/// Adds a descendant returned when this node is queried with `selector`.
	pub fn child(mut self, selector: impl Into<String>, node: FakeNode) -> Self {
		self.children.push((selector.into(), node));
		self
	}

	/// A finished reply turn: content node plus completion marker.
	pub fn reply(selectors: &SelectorContract, html: &str, text: &str) -> Self {
		FakeNode::new(format!("reply:{}", text))
			.child(&selectors.message_content, FakeNode::new("content").html(html).text(text))
			.child(&selectors.completion_marker, FakeNode::new("copy"))
	}

	/// A turn without the completion marker (a prompt, or a reply still
	/// streaming).
	pub fn prompt(selectors: &SelectorContract, text: &str) -> Self {
		FakeNode::new(format!("prompt:{}", text)).child(&selectors.message_content, FakeNode::new("content").html(text).text(text))
	}

	fn matching(&self, selector: &str) -> Vec<FakeNode> {
		self.children.iter().filter(|(s, _)| s == selector).map(|(_, n)| n.clone()).collect()
	}
}

/// Something the session did to the fake page.
#[derive(Debug, Clone, PartialEq)]
pub enum FakeAction {
	NewContext,
	NewPage,
	Goto(String),
	AddCookies(Vec<Cookie>),
	Focus(String),
	Type(String, String),
	Press(String, String),
	Click(String),
	ObserveNetwork { active: bool },
	ClosePage,
	CloseContext,
}

#[derive(Default)]
struct FakeState {
	frames: Mutex<HashMap<String, VecDeque<Vec<FakeNode>>>>,
	failures: Mutex<HashMap<String, usize>>,
	goto_failure: Mutex<Option<String>>,
	url: Mutex<String>,
	cookies: Mutex<Vec<Cookie>>,
	observer: Mutex<Option<Arc<dyn NetworkObserver>>>,
	actions: Mutex<Vec<FakeAction>>,
	queries: Mutex<HashMap<String, usize>>,
	contexts: AtomicUsize,
	releases: AtomicUsize,
}

impl FakeState {
	fn record(&self, action: FakeAction) {
		self.actions.lock().push(action);
	}

	fn query(&self, selector: &str) -> Result<Vec<FakeNode>> {
		*self.queries.lock().entry(selector.to_string()).or_default() += 1;
		{
			let mut failures = self.failures.lock();
			if let Some(remaining) = failures.get_mut(selector) {
				if *remaining > 0 {
					*remaining -= 1;
					return Err(Error::Evaluation(format!("execution context was destroyed while querying `{}`", selector)));
				}
			}
		}

		let mut frames = self.frames.lock();
		let Some(queue) = frames.get_mut(selector) else {
			return Ok(Vec::new());
		};
		if queue.len() > 1 {
			Ok(queue.pop_front().unwrap_or_default())
		} else {
			Ok(queue.front().cloned().unwrap_or_default())
		}
	}
}

/// Handle to the scripted browser; clones share state.
#[derive(Clone, Default)]
pub struct FakeEngine {
	state: Arc<FakeState>,
}

impl FakeEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Answers every query for `selector` with `nodes`.
	pub fn set(&self, selector: &str, nodes: Vec<FakeNode>) {
		self.script(selector, vec![nodes]);
	}

	/// Answers successive queries for `selector` with successive frames.
	pub fn script(&self, selector: &str, frames: Vec<Vec<FakeNode>>) {
		self.state.frames.lock().insert(selector.to_string(), frames.into());
	}

	/// Makes the next `count` queries for `selector` fail transiently.
	pub fn fail_queries(&self, selector: &str, count: usize) {
		self.state.failures.lock().insert(selector.to_string(), count);
	}

	/// Makes every following navigation fail with `message`.
	pub fn fail_navigation(&self, message: impl Into<String>) {
		*self.state.goto_failure.lock() = Some(message.into());
	}

	pub fn set_url(&self, url: impl Into<String>) {
		*self.state.url.lock() = url.into();
	}

	pub fn actions(&self) -> Vec<FakeAction> {
		self.state.actions.lock().clone()
	}

	pub fn clicks(&self) -> Vec<String> {
		self.actions()
			.into_iter()
			.filter_map(|a| match a {
				FakeAction::Click(label) => Some(label),
				_ => None,
			})
			.collect()
	}

	/// How many times `selector` was queried at page level.
	pub fn query_count(&self, selector: &str) -> usize {
		self.state.queries.lock().get(selector).copied().unwrap_or(0)
	}

	/// How many times a page released its element handles.
	pub fn handle_releases(&self) -> usize {
		self.state.releases.load(Ordering::SeqCst)
	}

	pub fn contexts_created(&self) -> usize {
		self.state.contexts.load(Ordering::SeqCst)
	}

	pub fn cookies(&self) -> Vec<Cookie> {
		self.state.cookies.lock().clone()
	}

	/// Delivers a request to the installed observer, if any.
	pub fn emit_request(&self, request: &HttpRequest) {
		let observer = self.state.observer.lock().clone();
		if let Some(observer) = observer {
			if observer.wants(&request.url) {
				observer.on_request(request);
			}
		}
	}

	/// Delivers a response to the installed observer, if any.
	pub fn emit_response(&self, response: &HttpResponse) {
		let observer = self.state.observer.lock().clone();
		if let Some(observer) = observer {
			if observer.wants(&response.url) {
				observer.on_response(response);
			}
		}
	}
}

#[async_trait]
impl Engine for FakeEngine {
	async fn new_context(&self) -> Result<Box<dyn BrowsingContext>> {
		self.state.contexts.fetch_add(1, Ordering::SeqCst);
		self.state.record(FakeAction::NewContext);
		Ok(Box::new(FakeContext {
			state: Arc::clone(&self.state),
		}))
	}
}

pub struct FakeContext {
	state: Arc<FakeState>,
}

#[async_trait]
impl BrowsingContext for FakeContext {
	async fn new_page(&self) -> Result<Box<dyn Page>> {
		self.state.record(FakeAction::NewPage);
		Ok(Box::new(FakePage {
			state: Arc::clone(&self.state),
		}))
	}

	async fn add_cookies(&self, cookies: Vec<Cookie>) -> Result<()> {
		self.state.cookies.lock().extend(cookies.iter().cloned());
		self.state.record(FakeAction::AddCookies(cookies));
		Ok(())
	}

	async fn storage_state(&self) -> Result<StorageState> {
		Ok(StorageState {
			cookies: self.state.cookies.lock().clone(),
			origins: Vec::new(),
		})
	}

	async fn close(&self) -> Result<()> {
		self.state.record(FakeAction::CloseContext);
		Ok(())
	}
}

pub struct FakePage {
	state: Arc<FakeState>,
}

#[async_trait]
impl Page for FakePage {
	async fn url(&self) -> Result<String> {
		Ok(self.state.url.lock().clone())
	}

	async fn goto(&self, url: &str, _wait_until: WaitUntil) -> Result<()> {
		self.state.record(FakeAction::Goto(url.to_string()));
		if let Some(message) = self.state.goto_failure.lock().clone() {
			return Err(Error::Navigation {
				url: url.to_string(),
				message,
			});
		}
		*self.state.url.lock() = url.to_string();
		Ok(())
	}

	async fn query(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
		Ok(self
			.state
			.query(selector)?
			.into_iter()
			.map(|node| FakeElement::boxed(&self.state, node))
			.collect())
	}

	async fn release_handles(&self) -> Result<()> {
		self.state.releases.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	async fn observe_network(&self, observer: Arc<dyn NetworkObserver>) -> Result<()> {
		self.state.record(FakeAction::ObserveNetwork {
			active: observer.is_active(),
		});
		*self.state.observer.lock() = Some(observer);
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		self.state.record(FakeAction::ClosePage);
		*self.state.observer.lock() = None;
		Ok(())
	}
}

pub struct FakeElement {
	state: Arc<FakeState>,
	node: FakeNode,
}

impl FakeElement {
	fn boxed(state: &Arc<FakeState>, node: FakeNode) -> Box<dyn Element> {
		Box::new(Self {
			state: Arc::clone(state),
			node,
		})
	}
}

#[async_trait]
impl Element for FakeElement {
	async fn text(&self) -> Result<String> {
		Ok(self.node.text.clone())
	}

	async fn inner_html(&self) -> Result<String> {
		Ok(self.node.html.clone())
	}

	async fn query(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
		Ok(self
			.node
			.matching(selector)
			.into_iter()
			.map(|node| FakeElement::boxed(&self.state, node))
			.collect())
	}

	async fn focus(&self) -> Result<()> {
		self.state.record(FakeAction::Focus(self.node.label.clone()));
		Ok(())
	}

	async fn type_text(&self, text: &str) -> Result<()> {
		self.state.record(FakeAction::Type(self.node.label.clone(), text.to_string()));
		Ok(())
	}

	async fn press(&self, key: &str) -> Result<()> {
		self.state.record(FakeAction::Press(self.node.label.clone(), key.to_string()));
		Ok(())
	}

	async fn click(&self) -> Result<()> {
		self.state.record(FakeAction::Click(self.node.label.clone()));
		Ok(())
	}
}

/// Authenticator that succeeds or fails on command and counts its calls.
#[derive(Default)]
pub struct FakeAuthenticator {
	failure: Option<String>,
	calls: AtomicUsize,
}

impl FakeAuthenticator {
	pub fn succeeding() -> Self {
		Self::default()
	}

	pub fn failing(message: impl Into<String>) -> Self {
		Self {
			failure: Some(message.into()),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
	async fn establish_session(&self, _request: AuthRequest<'_>) -> Result<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		match &self.failure {
			Some(message) => Err(Error::Auth(message.clone())),
			None => Ok(()),
		}
	}
}
