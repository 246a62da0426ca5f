//! Drive a conversational web app through its rendered page.
//!
//! There is no API underneath: a [`ChatSession`] signs in through an
//! [`Authenticator`], types prompts into the page, and infers from DOM
//! structure when a streamed reply has finished. Replies are read back as
//! plain text or normalized markdown.
//!
//! ```ignore
//! let engine = Arc::new(CdpEngine::launch(LaunchOptions::default()).await?);
//! let auth = Arc::new(StorageStateAuthenticator::new("auth.json"));
//! let mut session = ChatSession::new(SessionConfig::default(), engine, auth);
//!
//! if session.initialize().await? {
//!     if let Completion::Reply(text) = session.send_message("hello").await? {
//!         println!("{text}");
//!     }
//! }
//! session.close().await?;
//! ```
//!
//! Modules, bottom-up:
//! * [`selectors`]: the CSS contract with the host page
//! * [`engine`]: browser boundary traits, implemented by [`cdp`] and [`fake`]
//! * [`normalize`] and [`extractor`]: reading turns back out of the page
//! * [`completion`]: the reply-detection poll
//! * [`auth`] and [`session`]: sign-in and the lifecycle around it

pub mod auth;
pub mod cdp;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod fake;
pub mod normalize;
pub mod observer;
pub mod selectors;
pub mod session;

pub use auth::{AuthRequest, Authenticator, FormLoginAuthenticator, StorageStateAuthenticator};
pub use cdp::CdpEngine;
pub use completion::{Completion, CompletionPolicy};
pub use config::{Credentials, NetworkConfig, SessionConfig, Timings};
pub use engine::{BrowsingContext, Element, Engine, Page};
pub use error::{Error, Result};
pub use extractor::{ActionMarkerOracle, CompletionOracle, ConversationExtractor, Message, Role};
pub use observer::{DebugObserver, NetworkObserver, NoopObserver};
pub use pw_chat_protocol::{Cookie, LoginVariant, OutputFormat, StorageState, WaitUntil};
pub use pw_chat_runtime::LaunchOptions;
pub use selectors::SelectorContract;
pub use session::{ChatSession, SessionPhase};
pub use tokio_util::sync::CancellationToken;
