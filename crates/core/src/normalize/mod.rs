//! Reply normalization: rendered reply markup in, display text out.
//!
//! Everything here is a pure function of its input. Interactive and
//! presentational elements are dropped with their content, the remainder is
//! rendered as markdown (or, via [`plain_text`], as bare text).

mod cleaner;
mod entities;
mod render_markdown;
mod render_text;

/// Label the host page puts on its code-block copy control. It can arrive
/// with an unbalanced closing tag, so it is stripped as a literal before
/// any tag-aware pass runs.
pub const COPY_CODE_MARKER: &str = "Copy code</button>";

/// Elements whose content never reaches the output.
pub const DEFAULT_EXCLUDED_TAGS: &[&str] = &["button", "svg", "style", "script", "meta", "head", "form"];

/// Options for [`convert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
	pub exclude_tags: Vec<String>,
}

impl Default for ConvertOptions {
	fn default() -> Self {
		Self {
			exclude_tags: DEFAULT_EXCLUDED_TAGS.iter().map(|t| t.to_string()).collect(),
		}
	}
}

/// Normalizes one reply fragment for display.
pub fn normalize(html: &str) -> String {
	convert(&cleaner::strip_marker(html, COPY_CODE_MARKER), &ConvertOptions::default())
}

/// Converts an HTML fragment to markdown, dropping `exclude_tags` entirely.
pub fn convert(html: &str, options: &ConvertOptions) -> String {
	let tags: Vec<&str> = options.exclude_tags.iter().map(String::as_str).collect();
	render_markdown::html_to_markdown(&cleaner::remove_tags(html, &tags))
}

/// Bare text of a fragment, with the default exclusions applied.
pub fn plain_text(html: &str) -> String {
	render_text::html_to_text(&cleaner::remove_tags(html, DEFAULT_EXCLUDED_TAGS))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formatting_is_preserved() {
		assert_eq!(normalize("<p>Hello <b>world</b></p>"), "Hello **world**");
	}

	#[test]
	fn copy_code_marker_removed_before_conversion() {
		let out = normalize("Copy code</button><p>answer</p>");
		assert_eq!(out, "answer");
		assert!(!out.contains("Copy code"));
	}

	#[test]
	fn excluded_elements_leave_no_trace() {
		let html = concat!(
			"<head><title>doc title</title></head>",
			"<style>.x { color: red }</style>",
			"<script>window.secret = 1</script>",
			"<meta name=\"robots\" content=\"noindex\">",
			"<p>kept<button>Regenerate</button></p>",
			"<svg><text>vector label</text></svg>",
			"<form><input value=\"field\"><label>form label</label></form>",
		);
		let out = normalize(html);
		assert_eq!(out, "kept");
		for leaked in ["doc title", "color", "secret", "robots", "Regenerate", "vector label", "form label"] {
			assert!(!out.contains(leaked), "{leaked} leaked into {out:?}");
		}
	}

	#[test]
	fn nested_excluded_elements_leave_no_trace() {
		let out = normalize("<p>kept</p><svg><svg><text>inner</text></svg><text>outer label</text></svg>");
		assert_eq!(out, "kept");
		assert!(!out.contains("outer label"));
		assert!(!out.contains("inner"));
	}

	#[test]
	fn real_code_block_reply() {
		let html = concat!(
			"<div class=\"markdown prose\"><p>Run this:</p><pre><div class=\"bg-black rounded-md\">",
			"<div class=\"flex items-center\"><span>bash</span><button class=\"flex ml-auto gap-2\">",
			"<svg stroke=\"currentColor\"><path d=\"M16\"></path></svg>Copy code</button></div>",
			"<div class=\"p-4 overflow-y-auto\"><code class=\"!whitespace-pre hljs language-bash\">cargo build\n</code></div></div></pre></div>"
		);
		assert_eq!(normalize(html), "Run this:\n```bash\ncargo build\n```");
	}

	#[test]
	fn unformatted_fragment_matches_plain_text() {
		let html = "<div><p>first paragraph</p><p>second &amp; last</p></div>";
		assert_eq!(convert(html, &ConvertOptions::default()), plain_text(html));
	}

	#[test]
	fn custom_exclusions() {
		let options = ConvertOptions {
			exclude_tags: vec!["aside".into()],
		};
		assert_eq!(convert("<p>body</p><aside>note</aside>", &options), "body");
	}

	#[test]
	fn normalization_is_deterministic() {
		let html = "<ol><li>a</li><li>b</li></ol>";
		assert_eq!(normalize(html), normalize(html));
	}
}
