//! Structural queries against the rendered conversation page.
//!
//! Every read and write the session performs goes through one of these CSS
//! selectors. When the host page changes its markup, this is the only place
//! that needs to follow; the defaults can also be overridden from config.

use serde::{Deserialize, Serialize};

/// Canonical conversation page.
pub const CONVERSATION_URL: &str = "https://chat.openai.com/chat";

/// Login landing page used by form-based authentication.
pub const LOGIN_URL: &str = "https://chat.openai.com/auth/login";

/// Traffic under this prefix is the conversation backend.
pub const CONVERSATION_API_PREFIX: &str = "https://chat.openai.com/backend-api/conversation";

/// The set of selectors the session relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorContract {
	/// Message input; present only for a signed-in user.
	pub input: String,
	/// One rendered conversational turn.
	pub message_container: String,
	/// Node inside a container that holds the turn's content.
	pub message_content: String,
	/// Trailing action controls inside a container. Present once an
	/// assistant reply has finished streaming, absent on prompts.
	pub completion_marker: String,
	/// Sidebar navigation entries; the first one starts a new conversation.
	pub navigation: String,
	/// Present while the first-use welcome overlay is open.
	pub overlay_open: String,
	/// Button that advances or closes the welcome overlay.
	pub overlay_dismiss: String,
}

impl Default for SelectorContract {
	fn default() -> Self {
		Self {
			input: "textarea".into(),
			message_container: "main div.w-full.border-b".into(),
			message_content: ".whitespace-pre-wrap".into(),
			completion_marker: "div.flex.justify-between > :nth-child(2) button".into(),
			navigation: "nav > a".into(),
			overlay_open: "[role='dialog'][data-headlessui-state='open']".into(),
			overlay_dismiss: "[role='dialog'] button.btn-primary".into(),
		}
	}
}
