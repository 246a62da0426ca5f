//! Manual sign-in with session capture.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use pw_chat::{Engine, StorageState, WaitUntil};
use tracing::{info, warn};

use crate::context::CommandContext;
use crate::error::Result;

/// Opens a headed browser on the conversation page and saves the storage
/// state once the user presses Enter or `timeout_secs` elapses.
pub async fn execute(output: &Path, timeout_secs: u64, ctx: &CommandContext) -> Result<()> {
	let url = ctx.config.conversation_url.as_str();
	info!(target = "pw_chat.cli", %url, path = %output.display(), "starting interactive login");

	let (engine, owned) = ctx.engine(false).await?;
	let captured = capture(engine.as_ref(), url, output, async {
		println!("Browser opened at: {url}");
		println!();
		println!("Sign in, then press Enter to save the session.");
		println!("(Or wait {timeout_secs} seconds for auto-save)");
		wait_for_enter(Duration::from_secs(timeout_secs)).await;
	})
	.await;
	if owned {
		if let Err(e) = engine.shutdown().await {
			warn!(target = "pw_chat.cli", error = %e, "browser shutdown failed");
		}
	}
	let state = captured?;

	println!();
	println!("Session saved to: {}", output.display());
	println!("  Cookies: {}", state.cookies.len());
	println!("  Origins with localStorage: {}", state.origins.len());
	println!();
	println!("Use it with: pw-chat --auth {} chat", output.display());
	Ok(())
}

/// Opens the page, waits on `ready`, and writes the context's storage state
/// to `output`.
pub async fn capture<F>(engine: &dyn Engine, url: &str, output: &Path, ready: F) -> Result<StorageState>
where
	F: Future<Output = ()>,
{
	let context = engine.new_context().await?;
	let page = context.new_page().await?;
	page.goto(url, WaitUntil::Load).await?;

	ready.await;

	let state = context.storage_state().await?;
	state
		.to_file(output)
		.with_context(|| format!("failed to save session to {}", output.display()))?;

	page.close().await?;
	context.close().await?;
	Ok(state)
}

async fn wait_for_enter(timeout: Duration) {
	let stdin = tokio::task::spawn_blocking(|| {
		let mut input = String::new();
		std::io::stdin().read_line(&mut input).ok();
	});

	tokio::select! {
		_ = stdin => println!("Saving session..."),
		_ = tokio::time::sleep(timeout) => println!("\nTimeout reached, saving session..."),
	}
}
