//! Removal of elements that never belong in rendered reply text.

use regex_lite::Regex;

/// Drops each listed element together with everything inside it.
///
/// Nested elements of the same name are matched by depth, so the cut runs
/// from the outermost open tag to its own closing tag. Void and self-closing
/// forms (`<meta ...>`, `<svg/>`) and stray closing tags are removed on their
/// own. The tag name must be followed by whitespace, `/` or `>`, so excluding
/// `head` leaves `<header>` alone.
pub(crate) fn remove_tags(html: &str, tags: &[&str]) -> String {
	let mut result = html.to_string();
	for tag in tags {
		let pattern = format!(r"(?i)<(/?){}(?:[\s/][^>]*)?>", regex_lite::escape(tag));
		if let Ok(re) = Regex::new(&pattern) {
			result = remove_tag(&result, &re);
		}
	}
	result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
	Open,
	Close,
	SelfClosing,
}

struct TagToken {
	kind: TagKind,
	start: usize,
	end: usize,
}

fn remove_tag(html: &str, re: &Regex) -> String {
	let tokens: Vec<TagToken> = re
		.captures_iter(html)
		.filter_map(|caps| {
			let whole = caps.get(0)?;
			let kind = if caps.get(1).is_some_and(|slash| !slash.as_str().is_empty()) {
				TagKind::Close
			} else if whole.as_str().ends_with("/>") {
				TagKind::SelfClosing
			} else {
				TagKind::Open
			};
			Some(TagToken {
				kind,
				start: whole.start(),
				end: whole.end(),
			})
		})
		.collect();

	let mut cuts = Vec::new();
	let mut i = 0;
	while i < tokens.len() {
		let token = &tokens[i];
		match token.kind {
			TagKind::Open => match matching_close(&tokens[i + 1..]) {
				Some(offset) => {
					let close = i + 1 + offset;
					cuts.push((token.start, tokens[close].end));
					i = close + 1;
				}
				// Unclosed, e.g. a void `<meta ...>`.
				None => {
					cuts.push((token.start, token.end));
					i += 1;
				}
			},
			TagKind::Close | TagKind::SelfClosing => {
				cuts.push((token.start, token.end));
				i += 1;
			}
		}
	}

	let mut out = String::with_capacity(html.len());
	let mut cursor = 0;
	for (start, end) in cuts {
		out.push_str(&html[cursor..start]);
		cursor = end;
	}
	out.push_str(&html[cursor..]);
	out
}

/// Index into `rest` of the close tag that balances an already seen open tag.
fn matching_close(rest: &[TagToken]) -> Option<usize> {
	let mut depth = 1usize;
	for (index, token) in rest.iter().enumerate() {
		match token.kind {
			TagKind::Open => depth += 1,
			TagKind::Close => {
				depth -= 1;
				if depth == 0 {
					return Some(index);
				}
			}
			TagKind::SelfClosing => {}
		}
	}
	None
}

/// Removes every occurrence of a literal marker.
pub(crate) fn strip_marker(html: &str, marker: &str) -> String {
	if marker.is_empty() {
		return html.to_string();
	}
	html.replace(marker, "")
}
