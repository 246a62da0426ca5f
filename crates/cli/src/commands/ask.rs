//! One-shot prompt.

use pw_chat::{ChatSession, Completion};
use tracing::info;

use super::interrupt_token;
use crate::context::CommandContext;
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, render_completion};

pub async fn execute(prompt: &str, new_thread: bool, ctx: &CommandContext) -> Result<()> {
	let open = ctx.open_session().await?;
	let outcome = ask(&open.session, prompt, new_thread, ctx.format).await;
	open.close().await?;
	outcome.map(|_| ())
}

/// Sends `prompt` on a ready session and prints the result. A send that
/// ends without a reply is an error, after its JSON record (if any) is
/// printed.
pub async fn ask(session: &ChatSession, prompt: &str, new_thread: bool, format: OutputFormat) -> Result<String> {
	if new_thread {
		session.reset_thread().await?;
	}

	info!(target = "pw_chat.cli", chars = prompt.chars().count(), "sending prompt");
	let (cancel, listener) = interrupt_token();
	let completion = session.send_message_with_cancel(prompt, &cancel).await;
	listener.abort();
	let completion = completion?;

	if let Some(rendered) = render_completion(prompt, &completion, format)? {
		println!("{rendered}");
	}
	match completion {
		Completion::Reply(reply) => Ok(reply),
		Completion::TimedOut => Err(CliError::TimedOut),
		Completion::Cancelled => Err(CliError::Cancelled),
	}
}
