//! Browser discovery, launch, and DevTools endpoint probing.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::process::{free_port, port_available};

const PROBE_ATTEMPTS: usize = 25;
const PROBE_INTERVAL: Duration = Duration::from_millis(200);

/// `/json/version` response subset.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpVersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	pub web_socket_debugger_url: String,
	#[serde(rename = "Browser")]
	pub browser: Option<String>,
}

/// How to start a browser.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
	/// Explicit executable; discovered from well-known locations when `None`.
	pub executable: Option<PathBuf>,
	/// Remote debugging port; `0` picks a free one.
	pub port: u16,
	pub headless: bool,
	/// Profile directory; a per-port directory under the temp dir when `None`.
	pub user_data_dir: Option<PathBuf>,
	pub extra_args: Vec<String>,
}

impl LaunchOptions {
	fn args(&self, port: u16, user_data_dir: &Path) -> Vec<String> {
		let mut args = vec![
			format!("--remote-debugging-port={}", port),
			format!("--user-data-dir={}", user_data_dir.display()),
			"--no-first-run".to_string(),
			"--no-default-browser-check".to_string(),
			"--disable-blink-features=AutomationControlled".to_string(),
		];
		if self.headless {
			args.push("--headless=new".to_string());
		}
		args.extend(self.extra_args.iter().cloned());
		args.push("about:blank".to_string());
		args
	}
}

/// A browser process started by [`launch_chrome`]. The process is killed
/// when the handle is dropped.
pub struct LaunchedBrowser {
	pub child: Child,
	pub port: u16,
	pub version: CdpVersionInfo,
}

impl LaunchedBrowser {
	/// Kills the browser process and reaps it.
	pub fn kill(&mut self) -> Result<()> {
		if self.child.try_wait()?.is_none() {
			self.child.kill()?;
			self.child.wait()?;
		}
		Ok(())
	}
}

impl Drop for LaunchedBrowser {
	fn drop(&mut self) {
		if let Err(e) = self.kill() {
			warn!(target = "pw_chat.cdp", port = self.port, error = %e, "failed to kill browser process");
		}
	}
}

/// Returns the first Chromium-family executable found on this machine.
pub fn find_chrome_executable() -> Option<PathBuf> {
	let candidates: Vec<String> = if cfg!(target_os = "macos") {
		[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
			"/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	} else if cfg!(target_os = "windows") {
		windows_browser_candidates()
	} else {
		[
			"google-chrome-stable",
			"google-chrome",
			"chromium-browser",
			"chromium",
			"brave-browser",
			"/usr/bin/google-chrome-stable",
			"/usr/bin/google-chrome",
			"/usr/bin/chromium-browser",
			"/usr/bin/chromium",
			"/snap/bin/chromium",
		]
		.into_iter()
		.map(str::to_string)
		.collect()
	};

	candidates.into_iter().find_map(|candidate| {
		if candidate.starts_with('/') || candidate.contains('\\') || candidate.contains(':') {
			let path = PathBuf::from(&candidate);
			path.exists().then_some(path)
		} else {
			which::which(&candidate).ok()
		}
	})
}

fn windows_browser_candidates() -> Vec<String> {
	let mut roots: Vec<PathBuf> = ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"]
		.into_iter()
		.filter_map(|key| std::env::var(key).ok().map(PathBuf::from))
		.collect();
	if roots.is_empty() {
		roots.push(PathBuf::from(r"C:\Program Files"));
		roots.push(PathBuf::from(r"C:\Program Files (x86)"));
	}

	let suffixes: &[&[&str]] = &[
		&["Google", "Chrome", "Application", "chrome.exe"],
		&["Microsoft", "Edge", "Application", "msedge.exe"],
		&["Chromium", "Application", "chrome.exe"],
	];

	let mut candidates: Vec<String> = roots
		.iter()
		.flat_map(|root| {
			suffixes.iter().map(move |suffix| {
				let mut path = root.clone();
				path.extend(suffix.iter());
				path.to_string_lossy().to_string()
			})
		})
		.collect();
	candidates.extend(["chrome.exe", "msedge.exe"].map(str::to_string));
	candidates
}

/// Resolves `/json/version` metadata from a local debugging port.
pub async fn fetch_cdp_endpoint(port: u16) -> Result<CdpVersionInfo> {
	let client = reqwest::Client::builder()
		.timeout(Duration::from_millis(400))
		.build()
		.map_err(|e| Error::Transport(format!("failed to create HTTP client: {}", e)))?;
	let mut last_error = "no response".to_string();

	for url in [
		format!("http://127.0.0.1:{}/json/version", port),
		format!("http://localhost:{}/json/version", port),
		format!("http://[::1]:{}/json/version", port),
	] {
		let response = match client.get(&url).send().await {
			Ok(r) => r,
			Err(e) => {
				last_error = e.to_string();
				continue;
			}
		};

		if !response.status().is_success() {
			last_error = format!("unexpected status {}", response.status());
			continue;
		}

		return response
			.json::<CdpVersionInfo>()
			.await
			.map_err(|e| Error::Transport(format!("failed to parse /json/version: {}", e)));
	}

	Err(Error::Transport(format!("no DevTools endpoint on port {}: {}", port, last_error)))
}

/// Starts a browser with remote debugging and waits for its endpoint.
pub async fn launch_chrome(options: &LaunchOptions) -> Result<LaunchedBrowser> {
	let executable = match &options.executable {
		Some(path) => path.clone(),
		None => find_chrome_executable().ok_or_else(|| Error::Launch("could not find a Chrome/Chromium executable".into()))?,
	};

	let port = if options.port == 0 { free_port()? } else { options.port };
	if !port_available(port) {
		return Err(Error::Launch(format!(
			"port {} is already in use; connect to the running browser instead of launching",
			port
		)));
	}

	let user_data_dir = options
		.user_data_dir
		.clone()
		.unwrap_or_else(|| std::env::temp_dir().join(format!("pw-chat-profile-{}", port)));
	std::fs::create_dir_all(&user_data_dir)?;

	let mut cmd = Command::new(&executable);
	cmd.args(options.args(port, &user_data_dir))
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::null());

	info!(target = "pw_chat.cdp", executable = %executable.display(), port, headless = options.headless, "launching browser");
	let mut child = cmd
		.spawn()
		.map_err(|e| Error::Launch(format!("failed to start {}: {}", executable.display(), e)))?;

	let mut last_error = "endpoint not reachable".to_string();
	for _ in 0..PROBE_ATTEMPTS {
		tokio::time::sleep(PROBE_INTERVAL).await;

		if let Some(status) = child.try_wait()? {
			return Err(Error::Launch(format!("browser exited before its debugging endpoint came up ({})", status)));
		}

		match fetch_cdp_endpoint(port).await {
			Ok(version) => {
				debug!(target = "pw_chat.cdp", browser = ?version.browser, "debugging endpoint ready");
				return Ok(LaunchedBrowser { child, port, version });
			}
			Err(e) => last_error = e.to_string(),
		}
	}

	let _ = child.kill();
	let _ = child.wait();
	Err(Error::Timeout(format!("debugging endpoint on port {} never came up: {}", port, last_error)))
}
