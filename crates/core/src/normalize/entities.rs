//! Entity decoding and whitespace cleanup shared by both renderers.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};

static HORIZONTAL_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\r\f]+").expect("HORIZONTAL_RUN regex should compile"));
static BLANK_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").expect("BLANK_RUN regex should compile"));
static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&#([xX][0-9a-fA-F]+|[0-9]+);").expect("NUMERIC_ENTITY regex should compile"));

const NAMED: &[(&str, &str)] = &[
	("&lt;", "<"),
	("&gt;", ">"),
	("&quot;", "\""),
	("&apos;", "'"),
	("&nbsp;", " "),
	("&ndash;", "\u{2013}"),
	("&mdash;", "\u{2014}"),
	("&hellip;", "\u{2026}"),
];

/// Decodes named and numeric character references.
///
/// `&amp;` goes last so that `&amp;lt;` decodes to the literal `&lt;`.
pub(crate) fn decode_entities(s: &str) -> String {
	let mut out = NUMERIC_ENTITY
		.replace_all(s, |caps: &Captures| {
			let raw = &caps[1];
			let code = match raw.strip_prefix(['x', 'X']) {
				Some(hex) => u32::from_str_radix(hex, 16).ok(),
				None => raw.parse::<u32>().ok(),
			};
			match code.and_then(char::from_u32) {
				Some('&') => "&amp;".to_string(),
				Some(c) => c.to_string(),
				None => caps[0].to_string(),
			}
		})
		.into_owned();
	for (entity, text) in NAMED {
		out = out.replace(entity, text);
	}
	out.replace("&amp;", "&")
}

/// Squeezes horizontal whitespace runs and blank-line runs.
pub(crate) fn squeeze_whitespace(s: &str) -> String {
	let spaced = HORIZONTAL_RUN.replace_all(s, " ");
	BLANK_RUN.replace_all(&spaced, "\n").into_owned()
}

/// Trims every line and drops the empty ones.
pub(crate) fn tidy_lines(s: &str) -> String {
	squeeze_whitespace(s)
		.lines()
		.map(str::trim)
		.filter(|line| !line.is_empty())
		.collect::<Vec<_>>()
		.join("\n")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_named_and_numeric_references() {
		assert_eq!(decode_entities("a &lt;b&gt; &amp; c"), "a <b> & c");
		assert_eq!(decode_entities("it&#39;s &#x27;quoted&#x27;"), "it's 'quoted'");
		assert_eq!(decode_entities("Hello&nbsp;World"), "Hello World");
	}

	#[test]
	fn escaped_ampersand_is_decoded_once() {
		assert_eq!(decode_entities("&amp;lt;"), "&lt;");
		assert_eq!(decode_entities("&#38;lt;"), "&lt;");
	}

	#[test]
	fn tidy_lines_drops_blank_lines() {
		assert_eq!(tidy_lines("  one \n\n\n\t two  \n"), "one\ntwo");
	}
}
