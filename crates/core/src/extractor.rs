//! Reading the rendered conversation back out of the page.

use std::sync::Arc;

use async_trait::async_trait;
use pw_chat_protocol::OutputFormat;
use serde::Serialize;
use tracing::trace;

use crate::engine::{Element, Page};
use crate::error::Result;
use crate::normalize::normalize;
use crate::selectors::SelectorContract;

/// Decides whether a message container holds a finished reply.
#[async_trait]
pub trait CompletionOracle: Send + Sync {
	async fn is_complete(&self, container: &dyn Element) -> Result<bool>;
}

/// A container is complete once its trailing action controls are rendered.
#[derive(Debug, Clone)]
pub struct ActionMarkerOracle {
	selector: String,
}

impl ActionMarkerOracle {
	pub fn new(selector: impl Into<String>) -> Self {
		Self { selector: selector.into() }
	}
}

#[async_trait]
impl CompletionOracle for ActionMarkerOracle {
	async fn is_complete(&self, container: &dyn Element) -> Result<bool> {
		Ok(!container.query(&self.selector).await?.is_empty())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	Prompt,
	Reply,
}

/// One rendered turn, read fresh from the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
	pub role: Role,
	/// Inner markup of the content node.
	pub html: String,
	/// Plain text for prompts; for replies, normalized markdown or plain
	/// text depending on the requested format.
	pub text: String,
}

impl Message {
	/// Completion status. Turns without the completion marker are read as
	/// prompts, so only replies are complete.
	pub fn is_complete(&self) -> bool {
		self.role == Role::Reply
	}
}

/// Partitions the page's message containers into prompts and replies.
#[derive(Clone)]
pub struct ConversationExtractor {
	container: String,
	content: String,
	oracle: Arc<dyn CompletionOracle>,
}

impl ConversationExtractor {
	pub fn new(selectors: &SelectorContract, oracle: Arc<dyn CompletionOracle>) -> Self {
		Self {
			container: selectors.message_container.clone(),
			content: selectors.message_content.clone(),
			oracle,
		}
	}

	/// Every turn that has a content node, in render order.
	///
	/// The element handles of the pass are released before returning.
	pub async fn conversation(&self, page: &dyn Page, format: OutputFormat) -> Result<Vec<Message>> {
		let messages = self.read_turns(page, format).await;
		if let Err(e) = page.release_handles().await {
			trace!(target = "pw_chat.session", error = %e, "releasing element handles failed");
		}
		messages
	}

	async fn read_turns(&self, page: &dyn Page, format: OutputFormat) -> Result<Vec<Message>> {
		let mut messages = Vec::new();
		for container in page.query(&self.container).await? {
			let Some(content) = container.query(&self.content).await?.into_iter().next() else {
				continue;
			};
			let complete = self.oracle.is_complete(container.as_ref()).await?;
			let html = content.inner_html().await?;
			let text = if complete && format.is_markdown() {
				normalize(&html)
			} else {
				content.text().await?
			};
			messages.push(Message {
				role: if complete { Role::Reply } else { Role::Prompt },
				html,
				text,
			});
		}
		Ok(messages)
	}

	/// Prompt texts, always plain.
	pub async fn prompts(&self, page: &dyn Page) -> Result<Vec<String>> {
		Ok(self
			.conversation(page, OutputFormat::Plaintext)
			.await?
			.into_iter()
			.filter(|m| m.role == Role::Prompt)
			.map(|m| m.text)
			.collect())
	}

	/// Texts of complete replies in `format`.
	pub async fn replies(&self, page: &dyn Page, format: OutputFormat) -> Result<Vec<String>> {
		Ok(self
			.conversation(page, format)
			.await?
			.into_iter()
			.filter(|m| m.role == Role::Reply)
			.map(|m| m.text)
			.collect())
	}

	pub async fn last_reply(&self, page: &dyn Page, format: OutputFormat) -> Result<Option<String>> {
		Ok(self.replies(page, format).await?.pop())
	}
}
