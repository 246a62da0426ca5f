use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::TargetSession;
use super::page::OBJECT_GROUP;
use crate::engine::Element;
use crate::error::{Error, Result};

/// `Input.dispatchKeyEvent` fields for a named key.
struct KeyDefinition {
	key: String,
	code: String,
	key_code: u32,
	text: Option<String>,
}

impl KeyDefinition {
	fn resolve(name: &str) -> Self {
		let named = |code: &str, key_code: u32, text: Option<&str>| KeyDefinition {
			key: name.to_string(),
			code: code.to_string(),
			key_code,
			text: text.map(str::to_string),
		};
		match name {
			"Enter" => named("Enter", 13, Some("\r")),
			"Tab" => named("Tab", 9, None),
			"Escape" => named("Escape", 27, None),
			"Backspace" => named("Backspace", 8, None),
			"ArrowUp" => named("ArrowUp", 38, None),
			"ArrowDown" => named("ArrowDown", 40, None),
			other => {
				let mut chars = other.chars();
				match (chars.next(), chars.next()) {
					(Some(c), None) => KeyDefinition {
						key: c.to_string(),
						code: if c.is_ascii_alphabetic() {
							format!("Key{}", c.to_ascii_uppercase())
						} else {
							String::new()
						},
						key_code: c.to_ascii_uppercase() as u32,
						text: Some(c.to_string()),
					},
					_ => named(other, 0, None),
				}
			}
		}
	}

	fn event(&self, kind: &str) -> Value {
		let mut event = json!({
			"type": kind,
			"key": self.key,
			"code": self.code,
			"windowsVirtualKeyCode": self.key_code,
			"nativeVirtualKeyCode": self.key_code,
		});
		if kind == "keyDown" {
			if let Some(text) = &self.text {
				event["text"] = json!(text);
				event["unmodifiedText"] = json!(text);
			}
		}
		event
	}
}

/// A DOM node held as a remote object reference.
///
/// The reference dies with its execution context; calls after a navigation
/// fail with a protocol error, which callers treat as transient.
pub struct CdpElement {
	session: Arc<TargetSession>,
	object_id: String,
}

impl CdpElement {
	pub(crate) fn new(session: Arc<TargetSession>, object_id: String) -> Self {
		Self { session, object_id }
	}

	async fn call_function(&self, declaration: &str, arguments: Value, by_value: bool) -> Result<Value> {
		self.session
			.runtime(
				"Runtime.callFunctionOn",
				json!({
					"objectId": self.object_id,
					"functionDeclaration": declaration,
					"arguments": arguments,
					"returnByValue": by_value,
					"awaitPromise": true,
					"objectGroup": OBJECT_GROUP,
				}),
			)
			.await
	}

	async fn string_property(&self, declaration: &str) -> Result<String> {
		let response = self.call_function(declaration, json!([]), true).await?;
		match response.pointer("/result/value") {
			Some(Value::String(s)) => Ok(s.clone()),
			Some(Value::Null) | None => Ok(String::new()),
			Some(other) => Err(Error::Evaluation(format!("expected a string, got {}", other))),
		}
	}
}

#[async_trait]
impl Element for CdpElement {
	async fn text(&self) -> Result<String> {
		self.string_property("function() { return this.innerText ?? this.textContent ?? ''; }").await
	}

	async fn inner_html(&self) -> Result<String> {
		self.string_property("function() { return this.innerHTML; }").await
	}

	async fn query(&self, selector: &str) -> Result<Vec<Box<dyn Element>>> {
		let array = self
			.call_function(
				"function(selector) { return Array.from(this.querySelectorAll(selector)); }",
				json!([{ "value": selector }]),
				false,
			)
			.await?;
		let ids = self.session.array_elements(&array).await?;
		Ok(ids
			.into_iter()
			.map(|object_id| Box::new(CdpElement::new(Arc::clone(&self.session), object_id)) as Box<dyn Element>)
			.collect())
	}

	async fn focus(&self) -> Result<()> {
		self.call_function("function() { this.focus(); }", json!([]), true).await?;
		Ok(())
	}

	async fn type_text(&self, text: &str) -> Result<()> {
		self.session.call("Input.insertText", json!({ "text": text })).await?;
		Ok(())
	}

	async fn press(&self, key: &str) -> Result<()> {
		let definition = KeyDefinition::resolve(key);
		self.session.call("Input.dispatchKeyEvent", definition.event("keyDown")).await?;
		self.session.call("Input.dispatchKeyEvent", definition.event("keyUp")).await?;
		Ok(())
	}

	async fn click(&self) -> Result<()> {
		self.call_function(
			"function() { this.scrollIntoView({ block: 'center', inline: 'center' }); this.click(); }",
			json!([]),
			true,
		)
		.await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pw_chat_runtime::Connection;
	use pw_chat_runtime::fake_transport::FakeTransportBuilder;

	use super::*;

	#[tokio::test]
	async fn typing_then_enter_goes_to_own_session() {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let session = Arc::new(TargetSession {
			connection: Connection::spawn(parts),
			session_id: "S1".into(),
		});
		let element = Arc::new(CdpElement::new(session, "E1".into()));

		let task = tokio::spawn({
			let element = Arc::clone(&element);
			async move {
				element.type_text("line one\tline two").await?;
				element.press("Enter").await
			}
		});
		for id in 0..3 {
			tokio::time::sleep(Duration::from_millis(10)).await;
			controller.inject_response(id, json!({}));
		}
		task.await.unwrap().unwrap();

		let sent = controller.take_sent().await;
		assert_eq!(sent[0]["method"], "Input.insertText");
		assert_eq!(sent[0]["params"]["text"], "line one\tline two");
		assert_eq!(sent[1]["params"]["type"], "keyDown");
		assert_eq!(sent[2]["params"]["type"], "keyUp");
		assert!(sent.iter().all(|m| m["sessionId"] == "S1"));
	}

	#[test]
	fn enter_sends_carriage_return_on_key_down_only() {
		let enter = KeyDefinition::resolve("Enter");
		let down = enter.event("keyDown");
		assert_eq!(down["windowsVirtualKeyCode"], 13);
		assert_eq!(down["text"], "\r");
		assert!(enter.event("keyUp").get("text").is_none());
	}

	#[test]
	fn single_characters_map_to_key_codes() {
		let a = KeyDefinition::resolve("a");
		assert_eq!(a.code, "KeyA");
		assert_eq!(a.key_code, 65);
		assert_eq!(a.text.as_deref(), Some("a"));
	}
}
