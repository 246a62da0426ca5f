//! HTML-to-markdown conversion for reply fragments.
//!
//! Code blocks are lifted out before any other rewriting and swapped for a
//! placeholder line, so their indentation and blank lines survive the line
//! tidying applied to everything else.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

use crate::normalize::entities::{decode_entities, tidy_lines};

fn re(pattern: &str) -> Regex {
	Regex::new(pattern).expect("markdown regex should compile")
}

static PRE: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<pre(?:\s[^>]*)?>(.*?)</pre\s*>"));
static CODE_BODY: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<code(?:\s[^>]*)?>(.*?)</code\s*>"));
static LANGUAGE: LazyLock<Regex> = LazyLock::new(|| re(r#"(?i)class=["'][^"']*\blanguage-([A-Za-z0-9_+#.-]+)"#));
static BR: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)<br\s*/?>"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)<[^>]+>"));

static HEADING: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<h([1-6])(?:\s[^>]*)?>(.*?)</h[1-6]\s*>"));
static STRONG: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<(strong|b)(?:\s[^>]*)?>(.*?)</(?:strong|b)\s*>"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<(em|i)(?:\s[^>]*)?>(.*?)</(?:em|i)\s*>"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<code(?:\s[^>]*)?>(.*?)</code\s*>"));
static LINK: LazyLock<Regex> = LazyLock::new(|| re(r#"(?is)<a\s[^>]*href=["']([^"']+)["'][^>]*>(.*?)</a\s*>"#));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| re(r#"(?is)<img\s[^>]*>"#));
static IMAGE_SRC: LazyLock<Regex> = LazyLock::new(|| re(r#"(?i)\ssrc=["']([^"']+)["']"#));
static IMAGE_ALT: LazyLock<Regex> = LazyLock::new(|| re(r#"(?i)\salt=["']([^"']*)["']"#));

static ITEM_PARAGRAPH_OPEN: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)(<li(?:\s[^>]*)?>)\s*<p(?:\s[^>]*)?>"));
static ITEM_PARAGRAPH_CLOSE: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)</p\s*>\s*(</li\s*>)"));
static ORDERED_LIST: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<ol(?:\s[^>]*)?>(.*?)</ol\s*>"));
static ITEM_OPEN: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)<li(?:\s[^>]*)?>"));
static LIST_EDGE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)</?(?:ul|ol)(?:\s[^>]*)?>|</li\s*>"));

static BLOCKQUOTE_OPEN: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)<blockquote(?:\s[^>]*)?>"));
static RULE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)<hr(?:\s[^>]*)?/?>"));
static CELL_CLOSE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)</t[dh]\s*>"));
static BLOCK_EDGE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)</?(?:p|div|tr|table|thead|tbody|blockquote|section)(?:\s[^>]*)?>"));

const PLACEHOLDER: char = '\u{E000}';

struct CodeBlock {
	language: String,
	body: String,
}

impl CodeBlock {
	fn from_pre(inner: &str) -> Self {
		let language = LANGUAGE.captures(inner).map(|c| c[1].to_string()).unwrap_or_default();
		let raw = CODE_BODY.captures(inner).map(|c| c[1].to_string()).unwrap_or_else(|| inner.to_string());
		let raw = BR.replace_all(&raw, "\n");
		let body = decode_entities(&ANY_TAG.replace_all(&raw, ""));
		Self {
			language,
			body: body.trim_end_matches('\n').to_string(),
		}
	}

	fn fenced(&self) -> String {
		format!("```{}\n{}\n```", self.language, self.body)
	}
}

fn placeholder(index: usize) -> String {
	format!("{PLACEHOLDER}{index}{PLACEHOLDER}")
}

pub(crate) fn html_to_markdown(html: &str) -> String {
	let mut blocks = Vec::new();
	let mut result = PRE
		.replace_all(html, |caps: &Captures| {
			blocks.push(CodeBlock::from_pre(&caps[1]));
			format!("\n{}\n", placeholder(blocks.len() - 1))
		})
		.into_owned();

	result = HEADING
		.replace_all(&result, |caps: &Captures| {
			let level: usize = caps[1].parse().unwrap_or(1);
			format!("\n{} {}\n", "#".repeat(level), caps[2].trim())
		})
		.into_owned();
	result = STRONG.replace_all(&result, "**$2**").into_owned();
	result = EMPHASIS.replace_all(&result, "*$2*").into_owned();
	result = INLINE_CODE.replace_all(&result, "`$1`").into_owned();
	result = LINK.replace_all(&result, "[$2]($1)").into_owned();
	result = IMAGE
		.replace_all(&result, |caps: &Captures| {
			let tag = &caps[0];
			match IMAGE_SRC.captures(tag) {
				Some(src) => {
					let alt = IMAGE_ALT.captures(tag).map(|c| c[1].to_string()).unwrap_or_default();
					format!("![{}]({})", alt, &src[1])
				}
				None => String::new(),
			}
		})
		.into_owned();

	result = ITEM_PARAGRAPH_OPEN.replace_all(&result, "$1").into_owned();
	result = ITEM_PARAGRAPH_CLOSE.replace_all(&result, "$1").into_owned();
	result = ORDERED_LIST
		.replace_all(&result, |caps: &Captures| {
			let mut number = 0;
			let items = ITEM_OPEN.replace_all(&caps[1], |_: &Captures| {
				number += 1;
				format!("\n{}. ", number)
			});
			format!("\n{}\n", items)
		})
		.into_owned();
	result = ITEM_OPEN.replace_all(&result, "\n- ").into_owned();
	result = LIST_EDGE.replace_all(&result, "\n").into_owned();

	result = BLOCKQUOTE_OPEN.replace_all(&result, "\n> ").into_owned();
	result = RULE.replace_all(&result, "\n---\n").into_owned();
	result = CELL_CLOSE.replace_all(&result, " ").into_owned();
	result = BLOCK_EDGE.replace_all(&result, "\n").into_owned();
	result = BR.replace_all(&result, "\n").into_owned();
	result = ANY_TAG.replace_all(&result, "").into_owned();
	result = decode_entities(&result);

	let mut markdown = tidy_lines(&result);
	for (index, block) in blocks.iter().enumerate() {
		markdown = markdown.replace(&placeholder(index), &block.fenced());
	}
	markdown
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn inline_formatting() {
		assert_eq!(html_to_markdown("<p>Hello <b>world</b></p>"), "Hello **world**");
		assert_eq!(html_to_markdown("<p><em>so</em> <code>x &lt; y</code></p>"), "*so* `x < y`");
	}

	#[test]
	fn bold_does_not_swallow_line_breaks() {
		assert_eq!(html_to_markdown("<p>a<br>b</p>"), "a\nb");
	}

	#[test]
	fn headings_and_links() {
		let markdown = html_to_markdown("<h2>Setup</h2><p>See <a href=\"https://example.com\">docs</a>.</p>");
		assert_eq!(markdown, "## Setup\nSee [docs](https://example.com).");
	}

	#[test]
	fn ordered_and_unordered_lists() {
		let html = "<ol><li><p>first</p></li><li><p>second</p></li></ol><ul><li>dot</li></ul>";
		assert_eq!(html_to_markdown(html), "1. first\n2. second\n- dot");
	}

	#[test]
	fn code_block_keeps_language_and_indentation() {
		let html = concat!(
			"<p>Try:</p><pre><div class=\"bg-black\"><div class=\"flex\"><span>python</span></div>",
			"<div class=\"p-4\"><code class=\"!whitespace-pre hljs language-python\">",
			"<span class=\"hljs-keyword\">def</span> f():\n    <span>return</span> 1 &amp; 2\n</code></div></div></pre>"
		);
		assert_eq!(html_to_markdown(html), "Try:\n```python\ndef f():\n    return 1 & 2\n```");
	}

	#[test]
	fn image_attributes_in_any_order() {
		assert_eq!(html_to_markdown("<img alt=\"cat\" src=\"c.png\">"), "![cat](c.png)");
		assert_eq!(html_to_markdown("<img src=\"c.png\" alt=\"cat\"/>"), "![cat](c.png)");
	}
}
