//! Option enums shared by configuration and the engine boundary.

use serde::{Deserialize, Serialize};

/// How assistant replies are rendered when read back from the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
	/// Reply HTML routed through the content normalizer.
	#[default]
	Markdown,
	/// The element's rendered text, untouched.
	Plaintext,
}

impl OutputFormat {
	pub fn from_markdown_flag(markdown: bool) -> Self {
		if markdown { Self::Markdown } else { Self::Plaintext }
	}

	pub fn is_markdown(self) -> bool {
		matches!(self, Self::Markdown)
	}
}

/// Which branch the authentication provider takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginVariant {
	#[default]
	Standard,
	Alternate,
}

impl std::fmt::Display for LoginVariant {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			LoginVariant::Standard => write!(f, "standard"),
			LoginVariant::Alternate => write!(f, "alternate"),
		}
	}
}

/// When a navigation is considered finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
	/// `document.readyState` is `interactive` or later.
	#[serde(rename = "domcontentloaded")]
	DomContentLoaded,
	/// `document.readyState` is `complete`.
	#[default]
	Load,
	/// `Load`, followed by a quiet period.
	#[serde(rename = "networkidle")]
	NetworkIdle,
}
