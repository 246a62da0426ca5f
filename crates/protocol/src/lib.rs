//! Data types shared across pw-chat crates.
//!
//! This crate holds the serde-serializable shapes that cross crate
//! boundaries: storage state and cookies handed to the browser, raw network
//! traffic reported by the rendering engine, the structured records the
//! network observer emits, and the option enums used by configuration.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * Engine-agnostic: Nothing here knows about CDP or any other backend
//! * Stable: Changes only when a persisted or logged shape changes
//!
//! Behavior built on these types lives in `pw-chat` and `pw-chat-runtime`.

pub mod cookie;
pub mod network;
pub mod options;

pub use cookie::*;
pub use network::*;
pub use options::*;
