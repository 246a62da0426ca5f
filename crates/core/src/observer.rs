//! Network observation.
//!
//! Observers only read traffic. They never block, retry or rewrite a request.

use pw_chat_protocol::{HttpRequest, HttpResponse, NetworkRecord, RecordBody, RequestSummary};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Receives the page's request and response events.
pub trait NetworkObserver: Send + Sync {
	/// `false` lets the engine skip event delivery entirely.
	fn is_active(&self) -> bool {
		true
	}

	/// Whether traffic to `url` should be delivered. Engines use this to
	/// avoid fetching bodies nobody will read.
	fn wants(&self, _url: &str) -> bool {
		true
	}

	fn on_request(&self, request: &HttpRequest);
	fn on_response(&self, response: &HttpResponse);
}

/// Installed when debug observation is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl NetworkObserver for NoopObserver {
	fn is_active(&self) -> bool {
		false
	}

	fn on_request(&self, _request: &HttpRequest) {}
	fn on_response(&self, _response: &HttpResponse) {}
}

/// Logs conversation-backend traffic as structured records at debug level.
#[derive(Debug, Clone)]
pub struct DebugObserver {
	prefixes: Vec<String>,
}

impl DebugObserver {
	pub fn new(prefixes: Vec<String>) -> Self {
		Self { prefixes }
	}

	/// Whether `url` belongs to the conversation backend.
	///
	/// Query string and fragment are ignored so that paginated and
	/// cache-busted calls still match.
	pub fn is_relevant(&self, url: &str) -> bool {
		let bare = match Url::parse(url) {
			Ok(mut parsed) => {
				parsed.set_query(None);
				parsed.set_fragment(None);
				parsed.to_string()
			}
			Err(_) => return false,
		};
		self.prefixes.iter().any(|prefix| bare.starts_with(prefix.as_str()))
	}

	fn emit(&self, record: &NetworkRecord) {
		match serde_json::to_string(record) {
			Ok(json) => debug!(target = "pw_chat.network", url = record.url(), record = %json, "network record"),
			Err(e) => debug!(target = "pw_chat.network", url = record.url(), error = %e, "unserializable network record"),
		}
	}
}

impl NetworkObserver for DebugObserver {
	fn wants(&self, url: &str) -> bool {
		self.is_relevant(url)
	}

	fn on_request(&self, request: &HttpRequest) {
		if self.is_relevant(&request.url) {
			self.emit(&request_record(request));
		}
	}

	fn on_response(&self, response: &HttpResponse) {
		if self.is_relevant(&response.url) {
			self.emit(&response_record(response));
		}
	}
}

/// JSON when it parses, the raw text otherwise.
fn request_body(request: &HttpRequest) -> Option<RecordBody> {
	if !request.method.eq_ignore_ascii_case("POST") {
		return None;
	}
	let raw = request.post_data.as_deref()?;
	Some(match serde_json::from_str::<Value>(raw) {
		Ok(value) => RecordBody::Json(value),
		Err(_) => RecordBody::Text(raw.to_string()),
	})
}

pub fn request_record(request: &HttpRequest) -> NetworkRecord {
	NetworkRecord::Request {
		url: request.url.clone(),
		method: request.method.clone(),
		headers: request.headers.clone(),
		body: request_body(request),
	}
}

/// Response bodies that are not JSON are dropped from the record.
pub fn response_record(response: &HttpResponse) -> NetworkRecord {
	let body = response.body.as_deref().and_then(|raw| serde_json::from_str::<Value>(raw).ok());
	NetworkRecord::Response {
		url: response.url.clone(),
		status: response.status,
		headers: response.headers.clone(),
		body,
		request: RequestSummary {
			method: response.request.method.clone(),
			headers: response.request.headers.clone(),
			body: request_body(&response.request),
		},
	}
}
