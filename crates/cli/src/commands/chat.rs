//! Interactive conversation over stdin.
//!
//! Lines are prompts unless they start with `/`. Replies and listings go to
//! the output writer; status notes and the input marker go to stderr.

use std::io::Write;

use colored::Colorize;
use pw_chat::{ChatSession, Completion};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::debug;

use super::interrupt_token;
use crate::context::CommandContext;
use crate::error::{CliError, Result};
use crate::output::{OutputFormat, render_completion, render_items};

const HELP: &str = "\
/prompts   list your prompts in this conversation
/messages  list completed replies
/last      show the latest reply
/reset     start a new conversation
/quit      leave (also Ctrl-D)";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
	Prompt(String),
	Prompts,
	Messages,
	Last,
	Reset,
	Help,
	Quit,
	Unknown(String),
	Empty,
}

pub fn parse_line(line: &str) -> ChatInput {
	let trimmed = line.trim();
	if trimmed.is_empty() {
		return ChatInput::Empty;
	}
	let Some(command) = trimmed.strip_prefix('/') else {
		return ChatInput::Prompt(trimmed.to_string());
	};
	match command.to_lowercase().as_str() {
		"prompts" => ChatInput::Prompts,
		"messages" => ChatInput::Messages,
		"last" => ChatInput::Last,
		"reset" | "new" => ChatInput::Reset,
		"help" | "?" => ChatInput::Help,
		"quit" | "exit" | "q" => ChatInput::Quit,
		other => ChatInput::Unknown(other.to_string()),
	}
}

pub async fn execute(ctx: &CommandContext) -> Result<()> {
	let open = ctx.open_session().await?;
	eprintln!("{}", "Signed in. Type a message, or /help.".green());
	let mut stdout = std::io::stdout();
	let outcome = repl(&open.session, ctx.format, BufReader::new(tokio::io::stdin()), &mut stdout).await;
	open.close().await?;
	outcome
}

/// Reads lines until `/quit` or end of input. Failures of a single
/// operation are reported and the loop continues.
pub async fn repl<R, W>(session: &ChatSession, format: OutputFormat, input: R, out: &mut W) -> Result<()>
where
	R: AsyncBufRead + Unpin,
	W: Write,
{
	let mut lines = input.lines();
	loop {
		eprint!("{} ", "you>".cyan().bold());
		let Some(line) = lines.next_line().await? else {
			eprintln!();
			break;
		};
		match parse_line(&line) {
			ChatInput::Quit => break,
			ChatInput::Empty => continue,
			ChatInput::Help => eprintln!("{HELP}"),
			ChatInput::Unknown(command) => eprintln!("{} /{}", "unknown command:".red(), command),
			input => {
				if let Err(e) = handle(session, format, input, out).await {
					if matches!(e, CliError::Chat(pw_chat::Error::SessionClosed)) {
						return Err(e);
					}
					eprintln!("{} {}", "error:".red().bold(), e);
				}
			}
		}
		out.flush()?;
	}
	Ok(())
}

async fn handle<W: Write>(session: &ChatSession, format: OutputFormat, input: ChatInput, out: &mut W) -> Result<()> {
	match input {
		ChatInput::Prompt(prompt) => {
			let (cancel, listener) = interrupt_token();
			let completion = session.send_message_with_cancel(&prompt, &cancel).await;
			listener.abort();
			let completion = completion?;
			match render_completion(&prompt, &completion, format)? {
				Some(rendered) => writeln!(out, "{rendered}")?,
				None if completion == Completion::TimedOut => eprintln!("{}", "no reply before the timeout".yellow()),
				None => eprintln!("{}", "stopped waiting".yellow()),
			}
		}
		ChatInput::Prompts => writeln!(out, "{}", render_items("prompts", &session.get_prompts().await?, format)?)?,
		ChatInput::Messages => writeln!(out, "{}", render_items("messages", &session.get_messages().await?, format)?)?,
		ChatInput::Last => match (session.get_last_message().await?, format) {
			(Some(reply), OutputFormat::Text) => writeln!(out, "{reply}")?,
			(None, OutputFormat::Text) => eprintln!("{}", "no reply yet".yellow()),
			(last, OutputFormat::Json) => writeln!(out, "{}", render_items("last", &last.into_iter().collect::<Vec<_>>(), format)?)?,
		},
		ChatInput::Reset => {
			session.reset_thread().await?;
			eprintln!("{}", "started a new conversation".green());
		}
		other => debug!(target = "pw_chat.cli", input = ?other, "input handled by the loop"),
	}
	Ok(())
}
