//! HTML-to-text conversion: block boundaries become line breaks, every other
//! tag is dropped.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::normalize::entities::{decode_entities, tidy_lines};

static BLOCK_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)</?(?:p|div|br|h[1-6]|li|ul|ol|tr|pre|blockquote|table|section|hr)(?:[\s/][^>]*)?>").expect("BLOCK_BOUNDARY regex should compile")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("TAG regex should compile"));

pub(crate) fn html_to_text(html: &str) -> String {
	let broken = BLOCK_BOUNDARY.replace_all(html, "\n");
	let stripped = TAG.replace_all(&broken, "");
	tidy_lines(&decode_entities(&stripped))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn inline_markup_flattens_into_one_line() {
		assert_eq!(html_to_text("<p>Hello <strong>World</strong>!</p>"), "Hello World!");
	}

	#[test]
	fn blocks_become_lines() {
		assert_eq!(html_to_text("<h1>T</h1><ul><li>a</li><li>b &amp; c</li></ul>"), "T\na\nb & c");
	}
}
