//! [`Engine`] implementation over the Chrome DevTools Protocol.
//!
//! One browser-level [`Connection`] is shared by everything. Each page is a
//! target attached in flattened mode, so its commands and events travel on
//! the same socket tagged with the page's `sessionId`.

mod element;
mod page;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use pw_chat_protocol::{Cookie, StorageState};
use pw_chat_runtime::{Connection, LaunchOptions, LaunchedBrowser, WebSocketTransport, fetch_cdp_endpoint, launch_chrome};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

pub use self::element::CdpElement;
pub use self::page::CdpPage;
use crate::engine::{BrowsingContext, Engine, Page};
use crate::error::{Error, Result};

/// A command channel bound to one attached target.
pub(crate) struct TargetSession {
	connection: Arc<Connection>,
	session_id: String,
}

impl TargetSession {
	pub(crate) async fn call(&self, method: &str, params: Value) -> Result<Value> {
		Ok(self.connection.send(Some(&self.session_id), method, params).await?)
	}

	/// `Runtime.*` calls report script exceptions in-band; surface them as
	/// evaluation errors.
	pub(crate) async fn runtime(&self, method: &str, params: Value) -> Result<Value> {
		let response = self.call(method, params).await?;
		if let Some(details) = response.get("exceptionDetails") {
			let message = details
				.pointer("/exception/description")
				.or_else(|| details.get("text"))
				.and_then(Value::as_str)
				.unwrap_or("script threw");
			return Err(Error::Evaluation(message.to_string()));
		}
		Ok(response)
	}

	/// Object ids of the elements in a remote JS array, in index order.
	pub(crate) async fn array_elements(&self, array: &Value) -> Result<Vec<String>> {
		let Some(array_id) = array.pointer("/result/objectId").and_then(Value::as_str) else {
			return Ok(Vec::new());
		};
		let props = self.call("Runtime.getProperties", json!({ "objectId": array_id, "ownProperties": true })).await?;
		let _ = self.call("Runtime.releaseObject", json!({ "objectId": array_id })).await;

		let mut indexed: Vec<(usize, String)> = props
			.get("result")
			.and_then(Value::as_array)
			.into_iter()
			.flatten()
			.filter_map(|prop| {
				let index = prop.get("name")?.as_str()?.parse::<usize>().ok()?;
				let object_id = prop.pointer("/value/objectId")?.as_str()?;
				Some((index, object_id.to_string()))
			})
			.collect();
		indexed.sort_by_key(|(index, _)| *index);
		Ok(indexed.into_iter().map(|(_, id)| id).collect())
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedContext {
	browser_context_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedTarget {
	target_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachedTarget {
	session_id: String,
}

#[derive(Deserialize)]
struct CookieList {
	#[serde(default)]
	cookies: Vec<Cookie>,
}

/// A browser reached over its DevTools WebSocket.
pub struct CdpEngine {
	connection: Arc<Connection>,
	browser: Mutex<Option<LaunchedBrowser>>,
}

impl CdpEngine {
	/// Starts a browser and connects to it. The process is killed when the
	/// engine is shut down or dropped.
	pub async fn launch(options: LaunchOptions) -> Result<Self> {
		let mut browser = launch_chrome(&options).await?;
		let engine = match Self::connect(&browser.version.web_socket_debugger_url).await {
			Ok(engine) => engine,
			Err(e) => {
				warn!(target = "pw_chat.cdp", port = browser.port, error = %e, "connecting to launched browser failed");
				if let Err(kill_err) = browser.kill() {
					warn!(target = "pw_chat.cdp", error = %kill_err, "failed to kill launched browser");
				}
				return Err(e);
			}
		};
		*engine.browser.lock() = Some(browser);
		Ok(engine)
	}

	/// Connects to an already running browser's `ws://` endpoint.
	pub async fn connect(ws_url: &str) -> Result<Self> {
		let (transport, message_rx) = WebSocketTransport::connect(ws_url).await?;
		info!(target = "pw_chat.cdp", url = %ws_url, "connected to browser");
		Ok(Self::from_connection(Connection::spawn(transport.into_transport_parts(message_rx))))
	}

	/// Connects to a browser listening on a local debugging port.
	pub async fn discover(port: u16) -> Result<Self> {
		let version = fetch_cdp_endpoint(port).await?;
		debug!(target = "pw_chat.cdp", port, browser = ?version.browser, "discovered browser");
		Self::connect(&version.web_socket_debugger_url).await
	}

	pub fn from_connection(connection: Arc<Connection>) -> Self {
		Self {
			connection,
			browser: Mutex::new(None),
		}
	}

	/// Closes a launched browser. Connected browsers are left running.
	pub async fn shutdown(&self) -> Result<()> {
		let launched = self.browser.lock().take();
		if let Some(mut browser) = launched {
			if let Err(e) = self.connection.send(None, "Browser.close", json!({})).await {
				debug!(target = "pw_chat.cdp", error = %e, "Browser.close failed, killing process");
			}
			browser.kill()?;
		}
		Ok(())
	}
}

impl Drop for CdpEngine {
	fn drop(&mut self) {
		if let Some(mut browser) = self.browser.get_mut().take() {
			if let Err(e) = browser.kill() {
				warn!(target = "pw_chat.cdp", error = %e, "failed to kill launched browser");
			}
		}
	}
}

#[async_trait]
impl Engine for CdpEngine {
	async fn new_context(&self) -> Result<Box<dyn BrowsingContext>> {
		let created: CreatedContext = serde_json::from_value(
			self.connection
				.send(None, "Target.createBrowserContext", json!({ "disposeOnDetach": true }))
				.await?,
		)?;
		debug!(target = "pw_chat.cdp", context = %created.browser_context_id, "created browser context");
		Ok(Box::new(CdpContext {
			connection: Arc::clone(&self.connection),
			context_id: created.browser_context_id,
		}))
	}
}

/// An isolated browser context (incognito-style cookie jar).
pub struct CdpContext {
	connection: Arc<Connection>,
	context_id: String,
}

#[async_trait]
impl BrowsingContext for CdpContext {
	async fn new_page(&self) -> Result<Box<dyn Page>> {
		let target: CreatedTarget = serde_json::from_value(
			self.connection
				.send(
					None,
					"Target.createTarget",
					json!({ "url": "about:blank", "browserContextId": self.context_id }),
				)
				.await?,
		)?;
		let attached: AttachedTarget = serde_json::from_value(
			self.connection
				.send(None, "Target.attachToTarget", json!({ "targetId": target.target_id, "flatten": true }))
				.await?,
		)?;

		let session = Arc::new(TargetSession {
			connection: Arc::clone(&self.connection),
			session_id: attached.session_id,
		});
		session.call("Page.enable", json!({})).await?;
		session.call("Runtime.enable", json!({})).await?;
		debug!(target = "pw_chat.cdp", target_id = %target.target_id, session = %session.session_id, "page attached");

		Ok(Box::new(CdpPage::new(session, target.target_id)))
	}

	async fn add_cookies(&self, cookies: Vec<Cookie>) -> Result<()> {
		self.connection
			.send(
				None,
				"Storage.setCookies",
				json!({ "cookies": cookies, "browserContextId": self.context_id }),
			)
			.await?;
		Ok(())
	}

	async fn storage_state(&self) -> Result<StorageState> {
		let list: CookieList = serde_json::from_value(
			self.connection
				.send(None, "Storage.getCookies", json!({ "browserContextId": self.context_id }))
				.await?,
		)?;
		Ok(StorageState {
			cookies: list.cookies,
			origins: Vec::new(),
		})
	}

	async fn close(&self) -> Result<()> {
		self.connection
			.send(None, "Target.disposeBrowserContext", json!({ "browserContextId": self.context_id }))
			.await?;
		debug!(target = "pw_chat.cdp", context = %self.context_id, "disposed browser context");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pw_chat_runtime::fake_transport::{FakeTransportBuilder, FakeTransportController};

	use super::*;

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	fn engine() -> (CdpEngine, FakeTransportController) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		(CdpEngine::from_connection(Connection::spawn(parts)), controller)
	}

	#[tokio::test]
	async fn new_page_creates_attaches_and_enables_domains() {
		let (engine, controller) = engine();
		let engine = Arc::new(engine);

		let task = tokio::spawn({
			let engine = Arc::clone(&engine);
			async move {
				let context = engine.new_context().await?;
				context.new_page().await.map(|_| ())
			}
		});

		settle().await;
		controller.inject_response(0, json!({ "browserContextId": "CTX" }));
		settle().await;
		controller.inject_response(1, json!({ "targetId": "T1" }));
		settle().await;
		controller.inject_response(2, json!({ "sessionId": "S1" }));
		settle().await;
		controller.inject_response(3, json!({}));
		settle().await;
		controller.inject_response(4, json!({}));

		task.await.unwrap().unwrap();

		let sent = controller.take_sent().await;
		let methods: Vec<&str> = sent.iter().filter_map(|m| m["method"].as_str()).collect();
		assert_eq!(
			methods,
			["Target.createBrowserContext", "Target.createTarget", "Target.attachToTarget", "Page.enable", "Runtime.enable"]
		);
		assert_eq!(sent[1]["params"]["browserContextId"], "CTX");
		assert_eq!(sent[2]["params"]["flatten"], true);
		assert_eq!(sent[3]["sessionId"], "S1");
	}

	#[tokio::test]
	async fn cookies_are_scoped_to_the_context() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let context = Arc::new(CdpContext {
			connection: Connection::spawn(parts),
			context_id: "CTX".into(),
		});

		let task = tokio::spawn({
			let context = Arc::clone(&context);
			async move {
				context.add_cookies(vec![Cookie::new("cf_clearance", "tok", "chat.openai.com")]).await?;
				context.storage_state().await
			}
		});

		settle().await;
		controller.inject_response(0, json!({}));
		settle().await;
		controller.inject_response(
			1,
			json!({ "cookies": [{ "name": "cf_clearance", "value": "tok", "domain": "chat.openai.com", "path": "/", "expires": -1, "size": 15, "httpOnly": false, "secure": true, "session": true }] }),
		);

		let state = task.await.unwrap().unwrap();
		assert_eq!(state.cookies.len(), 1);
		assert_eq!(state.cookies[0].value, "tok");

		let sent = controller.take_sent().await;
		assert_eq!(sent[0]["method"], "Storage.setCookies");
		assert_eq!(sent[0]["params"]["browserContextId"], "CTX");
		assert_eq!(sent[0]["params"]["cookies"][0]["name"], "cf_clearance");
		assert_eq!(sent[1]["method"], "Storage.getCookies");
	}
}
