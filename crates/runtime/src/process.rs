//! Port helpers for the browser launcher.

use std::net::TcpListener;

use crate::error::Result;

/// Returns `true` when `port` can be bound on localhost.
pub fn port_available(port: u16) -> bool {
	TcpListener::bind(("127.0.0.1", port)).is_ok()
}

/// Asks the OS for a currently unused localhost port.
///
/// The port is released before returning, so a racing process could still
/// claim it; callers treat a failed launch on it as an ordinary launch error.
pub fn free_port() -> Result<u16> {
	let listener = TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}
