//! Chrome DevTools Protocol plumbing for pw-chat.
//!
//! Layers, bottom-up:
//! * [`transport`]: moves JSON messages over a WebSocket (or, in tests, the
//!   in-memory [`fake_transport`])
//! * [`connection`]: correlates command ids with responses and fans events
//!   out to subscribers
//! * [`launcher`]: finds and starts a Chromium-family browser with remote
//!   debugging enabled and resolves its WebSocket endpoint

pub mod connection;
pub mod error;
pub mod fake_transport;
pub mod launcher;
pub mod process;
pub mod transport;

/// Default timeout in milliseconds for navigation and readiness waits.
///
/// Matches Playwright's standard default so pages behave the same under
/// either tool.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub use connection::{CdpEvent, Connection};
pub use error::{Error, Result};
pub use launcher::{CdpVersionInfo, LaunchOptions, LaunchedBrowser, fetch_cdp_endpoint, find_chrome_executable, launch_chrome};
pub use transport::{Transport, TransportParts, TransportReceiver, WebSocketTransport};
