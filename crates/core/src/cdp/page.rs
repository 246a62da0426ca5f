use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use pw_chat_protocol::{HttpRequest, HttpResponse, WaitUntil};
use pw_chat_runtime::{CdpEvent, DEFAULT_TIMEOUT_MS};
use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::TargetSession;
use super::element::CdpElement;
use crate::engine::{Element, Page};
use crate::error::{Error, Result};
use crate::observer::NetworkObserver;

/// Quiet period appended to the load event for [`WaitUntil::NetworkIdle`].
const NETWORK_IDLE_QUIET: Duration = Duration::from_millis(500);

/// Remote objects created by queries are grouped so they can be dropped
/// together after each extraction pass and on navigation.
pub(crate) const OBJECT_GROUP: &str = "pw-chat";

pub struct CdpPage {
	session: Arc<TargetSession>,
	target_id: String,
	network_task: Mutex<Option<JoinHandle<()>>>,
}

impl CdpPage {
	pub(crate) fn new(session: Arc<TargetSession>, target_id: String) -> Self {
		Self {
			session,
			target_id,
			network_task: Mutex::new(None),
		}
	}

	fn stop_network_task(&self) {
		if let Some(task) = self.network_task.lock().take() {
			task.abort();
		}
	}

	async fn wait_for_event(&self, events: &mut tokio::sync::broadcast::Receiver<CdpEvent>, method: &str) -> Result<()> {
		loop {
			match events.recv().await {
				Ok(event) => {
					if event.method == method && event.session_id.as_deref() == Some(self.session.session_id.as_str()) {
						return Ok(());
					}
				}
				Err(RecvError::Lagged(skipped)) => trace!(target = "pw_chat.cdp", skipped, "event receiver lagged"),
				Err(RecvError::Closed) => return Err(pw_chat_runtime::Error::ConnectionClosed.into()),
			}
		}
	}
}

#[async_trait]
impl Page for CdpPage {
	async fn url(&self) -> Result<String> {
		let response = self
			.session
			.runtime("Runtime.evaluate", json!({ "expression": "location.href", "returnByValue": true }))
			.await?;
		response
			.pointer("/result/value")
			.and_then(Value::as_str)
			.map(str::to_string)
			.ok_or_else(|| Error::Evaluation("location.href did not return a string".into()))
	}

	async fn goto(&self, url: &str, wait_until: WaitUntil) -> Result<()> {
		let lifecycle = match wait_until {
			WaitUntil::DomContentLoaded => "Page.domContentEventFired",
			WaitUntil::Load | WaitUntil::NetworkIdle => "Page.loadEventFired",
		};
		let mut events = self.session.connection.subscribe();
		if let Err(e) = self.release_handles().await {
			trace!(target = "pw_chat.cdp", error = %e, "releasing handles before navigation failed");
		}

		let response = self.session.call("Page.navigate", json!({ "url": url })).await?;
		if let Some(error_text) = response.get("errorText").and_then(Value::as_str) {
			return Err(Error::Navigation {
				url: url.to_string(),
				message: error_text.to_string(),
			});
		}
		if response.get("loaderId").is_none() {
			debug!(target = "pw_chat.cdp", %url, "same-document navigation");
			return Ok(());
		}

		let timeout = Duration::from_millis(DEFAULT_TIMEOUT_MS);
		match tokio::time::timeout(timeout, self.wait_for_event(&mut events, lifecycle)).await {
			Ok(result) => result?,
			Err(_) => {
				return Err(Error::Navigation {
					url: url.to_string(),
					message: format!("{} not received within {}ms", lifecycle, DEFAULT_TIMEOUT_MS),
				});
			}
		}
		if wait_until == WaitUntil::NetworkIdle {
			tokio::time::sleep(NETWORK_IDLE_QUIET).await;
		}
		debug!(target = "pw_chat.cdp", %url, ?wait_until, "navigation finished");
		Ok(())
	}

	async fn query(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
		let expression = format!("Array.from(document.querySelectorAll({}))", serde_json::to_string(selector)?);
		let array = self
			.session
			.runtime("Runtime.evaluate", json!({ "expression": expression, "objectGroup": OBJECT_GROUP }))
			.await?;
		let ids = self.session.array_elements(&array).await?;
		Ok(ids
			.into_iter()
			.map(|object_id| Box::new(CdpElement::new(Arc::clone(&self.session), object_id)) as Box<dyn Element>)
			.collect())
	}

	async fn release_handles(&self) -> Result<()> {
		self.session.call("Runtime.releaseObjectGroup", json!({ "objectGroup": OBJECT_GROUP })).await?;
		Ok(())
	}

	async fn observe_network(&self, observer: Arc<dyn NetworkObserver>) -> Result<()> {
		self.stop_network_task();
		if !observer.is_active() {
			return Ok(());
		}

		let events = self.session.connection.subscribe();
		self.session.call("Network.enable", json!({})).await?;
		let session = Arc::clone(&self.session);
		let task = tokio::spawn(async move { NetworkPump::new(session, observer).run(events).await });
		*self.network_task.lock() = Some(task);
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		self.stop_network_task();
		self.session
			.connection
			.send(None, "Target.closeTarget", json!({ "targetId": self.target_id }))
			.await?;
		Ok(())
	}
}

impl Drop for CdpPage {
	fn drop(&mut self) {
		self.stop_network_task();
	}
}

struct PendingResponse {
	url: String,
	status: u16,
	headers: BTreeMap<String, String>,
}

/// Turns `Network.*` events for one target into observer callbacks.
struct NetworkPump {
	session: Arc<TargetSession>,
	observer: Arc<dyn NetworkObserver>,
	requests: HashMap<String, HttpRequest>,
	responses: HashMap<String, PendingResponse>,
}

impl NetworkPump {
	fn new(session: Arc<TargetSession>, observer: Arc<dyn NetworkObserver>) -> Self {
		Self {
			session,
			observer,
			requests: HashMap::new(),
			responses: HashMap::new(),
		}
	}

	async fn run(mut self, mut events: tokio::sync::broadcast::Receiver<CdpEvent>) {
		loop {
			let event = match events.recv().await {
				Ok(event) => event,
				Err(RecvError::Lagged(skipped)) => {
					warn!(target = "pw_chat.network", skipped, "network events dropped");
					continue;
				}
				Err(RecvError::Closed) => break,
			};
			if event.session_id.as_deref() != Some(self.session.session_id.as_str()) {
				continue;
			}
			self.handle(event).await;
		}
	}

	async fn handle(&mut self, event: CdpEvent) {
		let Some(request_id) = event.params.get("requestId").and_then(Value::as_str).map(str::to_string) else {
			return;
		};
		match event.method.as_str() {
			"Network.requestWillBeSent" => {
				let raw = &event.params["request"];
				let mut request = HttpRequest {
					url: raw["url"].as_str().unwrap_or_default().to_string(),
					method: raw["method"].as_str().unwrap_or("GET").to_string(),
					headers: header_map(&raw["headers"]),
					post_data: raw["postData"].as_str().map(str::to_string),
				};
				if !self.observer.wants(&request.url) {
					return;
				}
				if request.post_data.is_none() && raw["hasPostData"].as_bool() == Some(true) {
					request.post_data = self.post_data(&request_id).await;
				}
				self.observer.on_request(&request);
				self.requests.insert(request_id, request);
			}
			"Network.responseReceived" => {
				if !self.requests.contains_key(&request_id) {
					return;
				}
				let raw = &event.params["response"];
				self.responses.insert(
					request_id,
					PendingResponse {
						url: raw["url"].as_str().unwrap_or_default().to_string(),
						status: raw["status"].as_u64().and_then(|s| u16::try_from(s).ok()).unwrap_or(0),
						headers: header_map(&raw["headers"]),
					},
				);
			}
			"Network.loadingFinished" => {
				let (Some(request), Some(pending)) = (self.requests.remove(&request_id), self.responses.remove(&request_id)) else {
					return;
				};
				let body = self.response_body(&request_id).await;
				self.observer.on_response(&HttpResponse {
					url: pending.url,
					status: pending.status,
					headers: pending.headers,
					body,
					request,
				});
			}
			"Network.loadingFailed" => {
				self.requests.remove(&request_id);
				self.responses.remove(&request_id);
			}
			_ => {}
		}
	}

	async fn post_data(&self, request_id: &str) -> Option<String> {
		let response = self
			.session
			.call("Network.getRequestPostData", json!({ "requestId": request_id }))
			.await
			.ok()?;
		response.get("postData").and_then(Value::as_str).map(str::to_string)
	}

	async fn response_body(&self, request_id: &str) -> Option<String> {
		let response = match self.session.call("Network.getResponseBody", json!({ "requestId": request_id })).await {
			Ok(response) => response,
			Err(e) => {
				trace!(target = "pw_chat.network", request_id, error = %e, "response body unavailable");
				return None;
			}
		};
		decode_body(&response)
	}
}

fn header_map(value: &Value) -> BTreeMap<String, String> {
	value
		.as_object()
		.map(|headers| {
			headers
				.iter()
				.map(|(name, value)| {
					let text = match value {
						Value::String(s) => s.clone(),
						other => other.to_string(),
					};
					(name.clone(), text)
				})
				.collect()
		})
		.unwrap_or_default()
}

/// `Network.getResponseBody` result to text; binary bodies are decoded lossily.
fn decode_body(response: &Value) -> Option<String> {
	let body = response.get("body")?.as_str()?;
	if response.get("base64Encoded").and_then(Value::as_bool) == Some(true) {
		let bytes = STANDARD.decode(body).ok()?;
		Some(String::from_utf8_lossy(&bytes).into_owned())
	} else {
		Some(body.to_string())
	}
}

#[cfg(test)]
mod tests {
	use pw_chat_runtime::Connection;
	use pw_chat_runtime::fake_transport::{FakeTransportBuilder, FakeTransportController};

	use super::*;
	use crate::observer::DebugObserver;
	use crate::selectors::CONVERSATION_API_PREFIX;

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	fn page() -> (Arc<CdpPage>, FakeTransportController) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let session = Arc::new(TargetSession {
			connection: Connection::spawn(parts),
			session_id: "S1".into(),
		});
		(Arc::new(CdpPage::new(session, "T1".into())), controller)
	}

	#[derive(Default)]
	struct Recorder {
		requests: Mutex<Vec<HttpRequest>>,
		responses: Mutex<Vec<HttpResponse>>,
	}

	impl NetworkObserver for Recorder {
		fn wants(&self, url: &str) -> bool {
			DebugObserver::new(vec![CONVERSATION_API_PREFIX.into()]).is_relevant(url)
		}

		fn on_request(&self, request: &HttpRequest) {
			self.requests.lock().push(request.clone());
		}

		fn on_response(&self, response: &HttpResponse) {
			self.responses.lock().push(response.clone());
		}
	}

	#[test]
	fn base64_bodies_are_decoded() {
		assert_eq!(decode_body(&json!({ "body": "aGk=", "base64Encoded": true })).as_deref(), Some("hi"));
		assert_eq!(decode_body(&json!({ "body": "{}", "base64Encoded": false })).as_deref(), Some("{}"));
		assert_eq!(decode_body(&json!({})), None);
	}

	#[test]
	fn header_values_are_stringified() {
		let headers = header_map(&json!({ "content-length": 12, "content-type": "text/plain" }));
		assert_eq!(headers["content-length"], "12");
		assert_eq!(headers["content-type"], "text/plain");
	}

	#[tokio::test]
	async fn goto_waits_for_load_event_on_own_session() {
		let (page, controller) = page();
		let task = tokio::spawn({
			let page = Arc::clone(&page);
			async move { page.goto("https://chat.openai.com/chat", WaitUntil::Load).await }
		});

		settle().await;
		controller.inject_response(0, json!({}));
		settle().await;
		controller.inject_response(1, json!({ "frameId": "F", "loaderId": "L" }));
		settle().await;
		controller.inject_event(Some("OTHER"), "Page.loadEventFired", json!({ "timestamp": 1.0 }));
		settle().await;
		assert!(!task.is_finished());
		controller.inject_event(Some("S1"), "Page.loadEventFired", json!({ "timestamp": 2.0 }));

		task.await.unwrap().unwrap();
		let sent = controller.take_sent().await;
		assert_eq!(sent[1]["method"], "Page.navigate");
		assert_eq!(sent[1]["sessionId"], "S1");
	}

	#[tokio::test]
	async fn goto_reports_navigation_errors() {
		let (page, controller) = page();
		let task = tokio::spawn({
			let page = Arc::clone(&page);
			async move { page.goto("https://unreachable.invalid/", WaitUntil::Load).await }
		});

		settle().await;
		controller.inject_response(0, json!({}));
		settle().await;
		controller.inject_response(1, json!({ "frameId": "F", "loaderId": "L", "errorText": "net::ERR_NAME_NOT_RESOLVED" }));

		let err = task.await.unwrap().unwrap_err();
		assert!(matches!(err, Error::Navigation { ref message, .. } if message.contains("ERR_NAME_NOT_RESOLVED")));
	}

	#[tokio::test]
	async fn query_resolves_array_in_index_order() {
		let (page, controller) = page();
		let task = tokio::spawn({
			let page = Arc::clone(&page);
			async move { page.query("main div.w-full").await.map(|found| found.len()) }
		});

		settle().await;
		controller.inject_response(0, json!({ "result": { "type": "object", "subtype": "array", "objectId": "ARR" } }));
		settle().await;
		controller.inject_response(
			1,
			json!({ "result": [
				{ "name": "1", "value": { "type": "object", "objectId": "E1" } },
				{ "name": "length", "value": { "type": "number", "value": 2 } },
				{ "name": "0", "value": { "type": "object", "objectId": "E0" } },
			] }),
		);
		settle().await;
		controller.inject_response(2, json!({}));

		assert_eq!(task.await.unwrap().unwrap(), 2);
		let sent = controller.take_sent().await;
		assert_eq!(sent[0]["params"]["expression"], "Array.from(document.querySelectorAll(\"main div.w-full\"))");
		assert_eq!(sent[2]["method"], "Runtime.releaseObject");
	}

	#[tokio::test]
	async fn release_handles_drops_the_query_group() {
		let (page, controller) = page();
		let task = tokio::spawn({
			let page = Arc::clone(&page);
			async move { page.release_handles().await }
		});

		settle().await;
		controller.inject_response(0, json!({}));

		task.await.unwrap().unwrap();
		let sent = controller.take_sent().await;
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0]["method"], "Runtime.releaseObjectGroup");
		assert_eq!(sent[0]["params"]["objectGroup"], OBJECT_GROUP);
		assert_eq!(sent[0]["sessionId"], "S1");
	}

	#[tokio::test]
	async fn query_surfaces_script_exceptions() {
		let (page, controller) = page();
		let task = tokio::spawn({
			let page = Arc::clone(&page);
			async move { page.query("div[").await.map(|found| found.len()) }
		});

		settle().await;
		controller.inject_response(
			0,
			json!({ "result": { "type": "object" }, "exceptionDetails": { "text": "Uncaught", "exception": { "description": "SyntaxError: 'div[' is not a valid selector" } } }),
		);

		let err = task.await.unwrap().unwrap_err();
		assert!(err.is_transient());
		assert!(err.to_string().contains("not a valid selector"));
	}

	#[tokio::test]
	async fn network_events_reach_observer_with_bodies() {
		let (page, controller) = page();
		let recorder = Arc::new(Recorder::default());

		let task = tokio::spawn({
			let page = Arc::clone(&page);
			let observer: Arc<dyn NetworkObserver> = recorder.clone();
			async move { page.observe_network(observer).await }
		});
		settle().await;
		controller.inject_response(0, json!({}));
		task.await.unwrap().unwrap();

		let url = "https://chat.openai.com/backend-api/conversation";
		controller.inject_event(
			Some("S1"),
			"Network.requestWillBeSent",
			json!({ "requestId": "R1", "request": { "url": url, "method": "POST", "headers": {}, "postData": "{\"action\":\"next\"}" } }),
		);
		controller.inject_event(
			Some("S1"),
			"Network.requestWillBeSent",
			json!({ "requestId": "R2", "request": { "url": "https://cdn.example.com/app.js", "method": "GET", "headers": {} } }),
		);
		controller.inject_event(
			Some("S1"),
			"Network.responseReceived",
			json!({ "requestId": "R1", "response": { "url": url, "status": 200, "headers": { "content-type": "application/json" } } }),
		);
		controller.inject_event(Some("S1"), "Network.loadingFinished", json!({ "requestId": "R1" }));
		settle().await;
		controller.inject_response(1, json!({ "body": "eyJvayI6dHJ1ZX0=", "base64Encoded": true }));
		settle().await;

		let requests = recorder.requests.lock().clone();
		assert_eq!(requests.len(), 1, "irrelevant traffic is not reported");
		assert_eq!(requests[0].post_data.as_deref(), Some("{\"action\":\"next\"}"));

		let responses = recorder.responses.lock().clone();
		assert_eq!(responses.len(), 1);
		assert_eq!(responses[0].status, 200);
		assert_eq!(responses[0].body.as_deref(), Some("{\"ok\":true}"));
		assert_eq!(responses[0].request.method, "POST");
	}
}
