//! Cookies and saved browser storage state.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A browser cookie as stored in a storage-state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,
	/// Unix timestamp in seconds; `-1` or absent means a session cookie.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub same_site: Option<String>,
}

impl Cookie {
	/// Creates a cookie scoped to `domain` with path `/`.
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: Some(domain.into()),
			path: Some("/".to_string()),
			expires: None,
			http_only: None,
			secure: Some(true),
			same_site: None,
		}
	}
}

/// A `localStorage` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameValue {
	pub name: String,
	pub value: String,
}

/// `localStorage` contents for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
	pub origin: String,
	#[serde(default)]
	pub local_storage: Vec<NameValue>,
}

/// Saved authentication state: cookies plus per-origin storage.
///
/// The file format matches the `storageState` JSON written by Playwright,
/// so files captured by either tool are interchangeable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
	#[serde(default)]
	pub cookies: Vec<Cookie>,
	#[serde(default)]
	pub origins: Vec<OriginState>,
}

impl StorageState {
	/// Reads a storage-state JSON file.
	pub fn from_file(path: &Path) -> std::io::Result<Self> {
		let raw = std::fs::read_to_string(path)?;
		serde_json::from_str(&raw).map_err(std::io::Error::other)
	}

	/// Writes the storage state as pretty-printed JSON, creating parent directories.
	pub fn to_file(&self, path: &Path) -> std::io::Result<()> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				std::fs::create_dir_all(parent)?;
			}
		}
		let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
		std::fs::write(path, json)
	}
}
