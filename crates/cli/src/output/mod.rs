//! Rendering command results for stdout.

mod format;

pub use format::OutputFormat;
use pw_chat::Completion;
use serde::Serialize;

/// How a send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
	Reply,
	TimedOut,
	Cancelled,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord<'a> {
	pub prompt: &'a str,
	pub outcome: Outcome,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reply: Option<&'a str>,
}

impl<'a> ReplyRecord<'a> {
	pub fn new(prompt: &'a str, completion: &'a Completion) -> Self {
		let (outcome, reply) = match completion {
			Completion::Reply(text) => (Outcome::Reply, Some(text.as_str())),
			Completion::TimedOut => (Outcome::TimedOut, None),
			Completion::Cancelled => (Outcome::Cancelled, None),
		};
		Self { prompt, outcome, reply }
	}
}

#[derive(Debug, Serialize)]
struct ItemsRecord<'a> {
	kind: &'a str,
	items: &'a [String],
}

/// The reply text in text mode; a JSON record otherwise. Text mode renders
/// nothing for a send that produced no reply.
pub fn render_completion(prompt: &str, completion: &Completion, format: OutputFormat) -> serde_json::Result<Option<String>> {
	match format {
		OutputFormat::Text => Ok(match completion {
			Completion::Reply(text) => Some(text.clone()),
			Completion::TimedOut | Completion::Cancelled => None,
		}),
		OutputFormat::Json => serde_json::to_string(&ReplyRecord::new(prompt, completion)).map(Some),
	}
}

/// A numbered listing in text mode, `{"kind", "items"}` in JSON.
pub fn render_items(kind: &str, items: &[String], format: OutputFormat) -> serde_json::Result<String> {
	match format {
		OutputFormat::Text => Ok(items
			.iter()
			.enumerate()
			.map(|(i, item)| format!("[{}] {}", i + 1, item))
			.collect::<Vec<_>>()
			.join("\n\n")),
		OutputFormat::Json => serde_json::to_string(&ItemsRecord { kind, items }),
	}
}
