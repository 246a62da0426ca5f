use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "pw-chat")]
#[command(about = "Chat with the conversation web app from the command line")]
#[command(version)]
pub struct Cli {
	#[command(flatten)]
	pub global: GlobalArgs,

	#[command(subcommand)]
	pub command: Commands,
}

/// Flags accepted before or after any subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Session config file (defaults to <config dir>/pw-chat/config.json when present)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Restore a saved session from a storage-state file
	#[arg(long, global = true, value_name = "FILE")]
	pub auth: Option<PathBuf>,

	/// Attach to a running browser: a ws:// URL, an http://host:port address, or a port
	#[arg(long, global = true, value_name = "ENDPOINT")]
	pub cdp_endpoint: Option<String>,

	/// Show the browser window
	#[arg(long, global = true)]
	pub headed: bool,

	/// Read replies as rendered text instead of markdown
	#[arg(long, global = true)]
	pub plaintext: bool,

	/// Log conversation-backend traffic (implies debug logging for it)
	#[arg(long, global = true)]
	pub debug: bool,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Seconds to wait for a reply; 0 waits indefinitely
	#[arg(long, global = true, value_name = "SECS")]
	pub timeout_secs: Option<u64>,

	/// Login identity for form sign-in
	#[arg(long, global = true, env = "PW_CHAT_IDENTITY")]
	pub identity: Option<String>,

	/// Login secret for form sign-in
	#[arg(long, global = true, env = "PW_CHAT_SECRET", hide_env_values = true)]
	pub secret: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Send one prompt and print the reply
	Ask {
		/// Prompt text; multiple words are joined with spaces
		#[arg(required = true, trailing_var_arg = true)]
		prompt: Vec<String>,

		/// Start a new conversation before sending
		#[arg(long)]
		new_thread: bool,
	},

	/// Interactive conversation over stdin
	Chat,

	/// Open a browser for manual sign-in, then save the session
	Login {
		/// File to save the storage state to
		#[arg(short, long, default_value = "auth.json")]
		output: PathBuf,

		/// Seconds to wait before saving automatically
		#[arg(short, long, default_value = "300")]
		timeout: u64,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_ask_joins_words() {
		let cli = Cli::try_parse_from(["pw-chat", "ask", "what", "is", "rust"]).unwrap();
		match cli.command {
			Commands::Ask { prompt, new_thread } => {
				assert_eq!(prompt.join(" "), "what is rust");
				assert!(!new_thread);
			}
			_ => panic!("Expected Ask command"),
		}
	}

	#[test]
	fn ask_requires_a_prompt() {
		assert!(Cli::try_parse_from(["pw-chat", "ask"]).is_err());
	}

	#[test]
	fn global_flags_after_subcommand() {
		let cli = Cli::try_parse_from(["pw-chat", "chat", "--auth", "auth.json", "--plaintext", "-f", "json", "--timeout-secs", "0"]).unwrap();
		assert!(matches!(cli.command, Commands::Chat));
		assert_eq!(cli.global.auth, Some(PathBuf::from("auth.json")));
		assert!(cli.global.plaintext);
		assert_eq!(cli.global.format, OutputFormat::Json);
		assert_eq!(cli.global.timeout_secs, Some(0));
	}

	#[test]
	fn login_defaults() {
		let cli = Cli::try_parse_from(["pw-chat", "login"]).unwrap();
		match cli.command {
			Commands::Login { output, timeout } => {
				assert_eq!(output, PathBuf::from("auth.json"));
				assert_eq!(timeout, 300);
			}
			_ => panic!("Expected Login command"),
		}
	}

	#[test]
	fn verbose_counts() {
		let cli = Cli::try_parse_from(["pw-chat", "-vv", "chat"]).unwrap();
		assert_eq!(cli.global.verbose, 2);
	}

	#[test]
	fn unknown_format_fails() {
		assert!(Cli::try_parse_from(["pw-chat", "--format", "toon", "chat"]).is_err());
	}
}
