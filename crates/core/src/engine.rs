//! The rendering-engine boundary.
//!
//! The session never talks to a browser directly. It drives these traits,
//! which the [`cdp`](crate::cdp) module implements over the DevTools
//! protocol and [`fake`](crate::fake) implements in memory for tests.

use std::sync::Arc;

use async_trait::async_trait;
use pw_chat_protocol::{Cookie, StorageState, WaitUntil};

use crate::error::Result;
use crate::observer::NetworkObserver;

/// A rendered DOM node.
#[async_trait]
pub trait Element: Send + Sync {
	/// Rendered text (`innerText`).
	async fn text(&self) -> Result<String>;

	async fn inner_html(&self) -> Result<String>;

	/// Descendants matching `selector`, in document order.
	async fn query(&self, selector: &str) -> Result<Vec<Box<dyn Element>>>;

	async fn focus(&self) -> Result<()>;

	/// Types `text` into the focused element without pressing any keys.
	async fn type_text(&self, text: &str) -> Result<()>;

	/// Presses and releases a named key such as `"Enter"`.
	async fn press(&self, key: &str) -> Result<()>;

	async fn click(&self) -> Result<()>;
}

/// A single tab.
#[async_trait]
pub trait Page: Send + Sync {
	async fn url(&self) -> Result<String>;

	async fn goto(&self, url: &str, wait_until: WaitUntil) -> Result<()>;

	/// All elements matching `selector`, in document order.
	async fn query(&self, selector: &str) -> Result<Vec<Box<dyn Element>>>;

	async fn query_first(&self, selector: &str) -> Result<Option<Box<dyn Element>>> {
		Ok(self.query(selector).await?.into_iter().next())
	}

	/// Drops the element handles handed out by earlier queries. Handles
	/// obtained before the call must not be used afterwards.
	async fn release_handles(&self) -> Result<()> {
		Ok(())
	}

	/// Routes the page's request/response events to `observer`, replacing
	/// any observer installed earlier.
	async fn observe_network(&self, observer: Arc<dyn NetworkObserver>) -> Result<()>;

	async fn close(&self) -> Result<()>;
}

/// An isolated cookie jar holding one or more pages.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
	async fn new_page(&self) -> Result<Box<dyn Page>>;

	async fn add_cookies(&self, cookies: Vec<Cookie>) -> Result<()>;

	/// Cookies currently held by the context.
	async fn storage_state(&self) -> Result<StorageState>;

	async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait Engine: Send + Sync {
	async fn new_context(&self) -> Result<Box<dyn BrowsingContext>>;
}
