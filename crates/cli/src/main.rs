use clap::Parser;
use pw_chat_cli::cli::Cli;
use pw_chat_cli::{commands, logging};
use tracing::error;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.global.verbose, cli.global.debug);

	if let Err(err) = commands::dispatch(cli).await {
		error!(target = "pw_chat.cli", error = %err, "command failed");
		std::process::exit(1);
	}
}
