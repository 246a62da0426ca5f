//! Tracing subscriber setup. Logs go to stderr so stdout stays clean for replies.

use tracing_subscriber::EnvFilter;

/// Filter directives for a verbosity count. `--debug` additionally opens
/// the network observer's target.
pub fn filter_directives(verbose: u8, debug: bool) -> String {
	let level = match verbose {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	};
	if debug && verbose < 2 {
		format!("{level},pw_chat.network=debug")
	} else {
		level.to_string()
	}
}

/// Installs the global subscriber. `RUST_LOG`, when set and valid, wins.
pub fn init_logging(verbose: u8, debug: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(verbose, debug)));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(verbose >= 2)
		.try_init();
}
