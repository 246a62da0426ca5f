pub mod ask;
pub mod chat;
pub mod login;

use pw_chat::CancellationToken;
use tokio::task::JoinHandle;

use crate::cli::{Cli, Commands};
use crate::context::CommandContext;
use crate::error::Result;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let ctx = CommandContext::resolve(&cli.global)?;
	match cli.command {
		Commands::Ask { prompt, new_thread } => ask::execute(&prompt.join(" "), new_thread, &ctx).await,
		Commands::Chat => chat::execute(&ctx).await,
		Commands::Login { output, timeout } => login::execute(&output, timeout, &ctx).await,
	}
}

/// A token cancelled by Ctrl-C. Abort the handle once the wait is over.
pub(crate) fn interrupt_token() -> (CancellationToken, JoinHandle<()>) {
	let token = CancellationToken::new();
	let trigger = token.clone();
	let listener = tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			trigger.cancel();
		}
	});
	(token, listener)
}
