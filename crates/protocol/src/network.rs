//! Network traffic as reported by the rendering engine and as logged by the
//! network observer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outgoing request observed on the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
	pub url: String,
	pub method: String,
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	/// Raw request body, when the engine exposes one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub post_data: Option<String>,
}

/// An incoming response observed on the page, paired with its request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
	pub url: String,
	pub status: u16,
	#[serde(default)]
	pub headers: BTreeMap<String, String>,
	/// Raw response body. `None` when the engine could not retrieve it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub body: Option<String>,
	pub request: HttpRequest,
}

/// A body as it appears in a network record: parsed JSON when possible,
/// raw text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordBody {
	Json(Value),
	Text(String),
}

/// Request half of a [`NetworkRecord::Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSummary {
	pub method: String,
	pub headers: BTreeMap<String, String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub body: Option<RecordBody>,
}

/// Structured record emitted by the network observer.
///
/// Records are ephemeral: they are built for a single log emission and
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NetworkRecord {
	Request {
		url: String,
		method: String,
		headers: BTreeMap<String, String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		body: Option<RecordBody>,
	},
	Response {
		url: String,
		status: u16,
		headers: BTreeMap<String, String>,
		#[serde(skip_serializing_if = "Option::is_none")]
		body: Option<Value>,
		request: RequestSummary,
	},
}

impl NetworkRecord {
	pub fn url(&self) -> &str {
		match self {
			NetworkRecord::Request { url, .. } | NetworkRecord::Response { url, .. } => url,
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn record_serializes_with_kind_tag() {
		let record = NetworkRecord::Request {
			url: "https://chat.openai.com/backend-api/conversation".into(),
			method: "POST".into(),
			headers: BTreeMap::new(),
			body: Some(RecordBody::Json(json!({"action": "next"}))),
		};

		let value = serde_json::to_value(&record).unwrap();
		assert_eq!(value["kind"], "request");
		assert_eq!(value["body"]["action"], "next");
	}

	#[test]
	fn text_body_serializes_as_plain_string() {
		let body = RecordBody::Text("data: [DONE]".into());
		assert_eq!(serde_json::to_value(&body).unwrap(), json!("data: [DONE]"));
	}
}
