use std::ops::Range;
use std::sync::OnceLock;

use regex::Captures;
use regex::Regex;

use crate::JdistsResult;

/// Comment delimiter family a block marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerFamily {
	/// `<!-- ... -->`
	Html,
	/// `/*< ... >*/`
	BlockComment,
}

impl MarkerFamily {
	/// Opening marker string for this family.
	fn opening(self) -> &'static str {
		match self {
			Self::Html => "<!--",
			Self::BlockComment => "/*<",
		}
	}

	/// Terminator that ends the opening comment of this family.
	fn comment_close(self) -> &'static str {
		match self {
			Self::Html => "-->",
			Self::BlockComment => ">*/",
		}
	}
}

/// Tag shape tried by a grammar rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagShape {
	/// A self-closing `include` tag with no body, e.g. `<!--include file="x"-->`
	/// or `/*<include file="x" />*/`.
	SelfClosing,
	/// An open tag terminated by the family's full comment close, a body, and
	/// a dedicated closing comment, e.g. `<!--tag-->body<!--/tag-->`.
	CommentClose,
	/// An open tag terminated by a bare `>`, with the closing tag ending the
	/// original comment, e.g. `<!--tag>body</tag-->`.
	BareClose,
}

/// One prioritized grammar rule: marker family plus tag shape.
struct Rule {
	family: MarkerFamily,
	shape: TagShape,
}

/// The rule table in match priority order. At every candidate offset the
/// rules are tried top to bottom and the first match wins.
const RULES: [Rule; 6] = [
	Rule {
		family: MarkerFamily::Html,
		shape: TagShape::SelfClosing,
	},
	Rule {
		family: MarkerFamily::Html,
		shape: TagShape::CommentClose,
	},
	Rule {
		family: MarkerFamily::Html,
		shape: TagShape::BareClose,
	},
	Rule {
		family: MarkerFamily::BlockComment,
		shape: TagShape::SelfClosing,
	},
	Rule {
		family: MarkerFamily::BlockComment,
		shape: TagShape::CommentClose,
	},
	Rule {
		family: MarkerFamily::BlockComment,
		shape: TagShape::BareClose,
	},
];

/// A decomposed marker block handed to the scan callback.
///
/// The pieces concatenate back to the exact source text:
/// `opening + tag + attr_text + infix + body + closing`.
#[derive(Debug)]
pub struct BlockMatch<'a> {
	/// Which comment family matched.
	pub family: MarkerFamily,
	/// The opening marker (`<!--` or `/*<`).
	pub opening: &'a str,
	/// The tag name.
	pub tag: &'a str,
	/// The raw attribute text, empty when no attributes were present.
	pub attr_text: &'a str,
	/// The terminator of the opening tag; empty for self-closing tags.
	pub infix: &'a str,
	/// The inner body; empty for self-closing tags.
	pub body: &'a str,
	/// The trailing marker that closes the block.
	pub closing: &'a str,
	/// Byte offset of the match start within the scanned text.
	pub offset: usize,
	/// Total byte length of the match.
	pub len: usize,
}

impl BlockMatch<'_> {
	/// Reassemble the exact source text of this match.
	pub fn raw(&self) -> String {
		format!(
			"{}{}{}{}{}{}",
			self.opening, self.tag, self.attr_text, self.infix, self.body, self.closing
		)
	}
}

/// Byte spans of a successful rule match, relative to the match start.
struct Spans {
	tag: Range<usize>,
	attr: Range<usize>,
	infix: Range<usize>,
	body: Range<usize>,
	closing: Range<usize>,
	len: usize,
}

/// Bytes permitted in tag and attribute names: word characters plus hyphen
/// and dot.
fn is_name_byte(byte: u8) -> bool {
	byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.')
}

/// Length of the tag-name run at the start of `text`.
fn name_len(text: &str) -> usize {
	text.bytes().take_while(|&b| is_name_byte(b)).count()
}

/// Length of the leading ASCII whitespace run.
fn ws_len(text: &str) -> usize {
	text.bytes().take_while(u8::is_ascii_whitespace).count()
}

/// Length of the raw attribute run at the start of `text`: one or more
/// `name="value"` pairs, each optionally preceded by whitespace, with a
/// non-empty value. Returns 0 when the first pair does not parse; a malformed
/// trailing pair simply ends the run.
fn attr_run_len(text: &str) -> usize {
	let bytes = text.as_bytes();
	let mut end = 0;

	loop {
		let mut i = end;
		while i < bytes.len() && bytes[i].is_ascii_whitespace() {
			i += 1;
		}
		let name_start = i;
		while i < bytes.len() && is_name_byte(bytes[i]) {
			i += 1;
		}
		if i == name_start {
			break;
		}
		while i < bytes.len() && bytes[i].is_ascii_whitespace() {
			i += 1;
		}
		if bytes.get(i) != Some(&b'=') {
			break;
		}
		i += 1;
		while i < bytes.len() && bytes[i].is_ascii_whitespace() {
			i += 1;
		}
		if bytes.get(i) != Some(&b'"') {
			break;
		}
		i += 1;
		let value_start = i;
		while i < bytes.len() && bytes[i] != b'"' {
			i += 1;
		}
		if i == value_start || i >= bytes.len() {
			break;
		}
		end = i + 1;
	}

	end
}

/// Try a single rule against `text`, which starts at a candidate marker
/// offset. Returns the captured spans on success.
fn try_rule(text: &str, rule: &Rule) -> Option<Spans> {
	let opening = rule.family.opening();
	if !text.starts_with(opening) {
		return None;
	}
	let mut pos = opening.len();

	let tag_len = name_len(&text[pos..]);
	if tag_len == 0 {
		return None;
	}
	let tag = pos..pos + tag_len;
	if rule.shape == TagShape::SelfClosing && &text[tag.clone()] != "include" {
		return None;
	}
	pos = tag.end;

	let attr = pos..pos + attr_run_len(&text[pos..]);
	pos = attr.end;

	match rule.shape {
		TagShape::SelfClosing => {
			// `\s* /? -->` for HTML, `\s* /? >*/` for block comments.
			let mut i = pos + ws_len(&text[pos..]);
			if text.as_bytes().get(i) == Some(&b'/') {
				i += 1;
			}
			let close = rule.family.comment_close();
			if !text[i..].starts_with(close) {
				return None;
			}
			let end = i + close.len();
			Some(Spans {
				tag,
				attr,
				infix: pos..pos,
				body: pos..pos,
				closing: pos..end,
				len: end,
			})
		}
		TagShape::CommentClose => {
			let ws = ws_len(&text[pos..]);
			let close = rule.family.comment_close();
			if !text[pos + ws..].starts_with(close) {
				return None;
			}
			let infix = pos..pos + ws + close.len();
			let closing_text = match rule.family {
				MarkerFamily::Html => format!("<!--/{}-->", &text[tag.clone()]),
				MarkerFamily::BlockComment => format!("/*</{}>*/", &text[tag.clone()]),
			};
			let body_len = text[infix.end..].find(&closing_text)?;
			let body = infix.end..infix.end + body_len;
			let closing = body.end..body.end + closing_text.len();
			let len = closing.end;
			Some(Spans {
				tag,
				attr,
				infix,
				body,
				closing,
				len,
			})
		}
		TagShape::BareClose => {
			let ws = ws_len(&text[pos..]);
			if text.as_bytes().get(pos + ws) != Some(&b'>') {
				return None;
			}
			let infix = pos..pos + ws + 1;
			let closing_text = match rule.family {
				MarkerFamily::Html => format!("</{}-->", &text[tag.clone()]),
				MarkerFamily::BlockComment => format!("</{}>*/", &text[tag.clone()]),
			};
			let body_len = text[infix.end..].find(&closing_text)?;
			let body = infix.end..infix.end + body_len;
			let closing = body.end..body.end + closing_text.len();
			let len = closing.end;
			Some(Spans {
				tag,
				attr,
				infix,
				body,
				closing,
				len,
			})
		}
	}
}

/// Scan `content` left-to-right for marker blocks, invoking `on_match` for
/// every block and splicing its return value into the output in place of the
/// matched span. Literal text passes through untouched; marker characters
/// that do not begin a valid block are emitted as literal text one character
/// at a time, so malformed markers are never an error.
///
/// When `resolution` is set, the source macros of the resolution pass are
/// expanded once over the whole transformed result before it is returned.
pub fn scan<F>(content: &str, on_match: &mut F, resolution: bool) -> JdistsResult<String>
where
	F: FnMut(&BlockMatch<'_>) -> JdistsResult<String>,
{
	let mut result = String::with_capacity(content.len());
	let mut cursor = 0;

	while cursor < content.len() {
		let rest = &content[cursor..];
		let html = rest.find("<!--");
		let block = rest.find("/*<");
		if html.is_none() && block.is_none() {
			break;
		}
		let pointer = cursor
			+ html
				.unwrap_or(usize::MAX)
				.min(block.unwrap_or(usize::MAX));

		let mut matched = false;
		for rule in &RULES {
			let Some(spans) = try_rule(&content[pointer..], rule) else {
				continue;
			};
			let at = &content[pointer..];
			let m = BlockMatch {
				family: rule.family,
				opening: rule.family.opening(),
				tag: &at[spans.tag],
				attr_text: &at[spans.attr],
				infix: &at[spans.infix],
				body: &at[spans.body],
				closing: &at[spans.closing],
				offset: pointer,
				len: spans.len,
			};
			result.push_str(&content[cursor..pointer]);
			result.push_str(&on_match(&m)?);
			cursor = pointer + spans.len;
			matched = true;
			break;
		}

		if !matched {
			// No rule applies at this candidate: the marker characters are
			// literal text. Emit through the candidate start and resume one
			// byte past it.
			result.push_str(&content[cursor..pointer + 1]);
			cursor = pointer + 1;
		}
	}
	result.push_str(&content[cursor..]);

	if resolution {
		return Ok(expand_source_macros(&result));
	}
	Ok(result)
}

/// A function body holding nothing but a sentinel-prefixed comment.
fn comment_template_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"(?s)/\*#\*/\s*function\s*\(\s*\)\s*\{\s*/\*!?(.*?)\*/[\s;]*\}")
			.expect("invalid comment template pattern")
	})
}

/// A function literal preceded by the parameter self-identification sentinel.
fn param_names_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| {
		Regex::new(r"(?s)/\*,\*/\s*(function(?:\s+[\w$]+)?\s*\(\s*([^()]+)\s*\))")
			.expect("invalid parameter names pattern")
	})
}

/// A single parameter token inside a parameter list.
fn param_token_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"[^\s,]+").expect("invalid parameter token pattern"))
}

/// Expand the two resolution-pass source macros over `text`:
///
/// 1. `/*#*/ function () { /* doc */ }` becomes a string literal holding the
///    comment text, so long documentation can be embedded as data.
/// 2. `/*,*/ function (a, b)` becomes `['a', 'b'], function (a, b)`, giving
///    the function a literal list of its own parameter names.
fn expand_source_macros(text: &str) -> String {
	let text = comment_template_regex().replace_all(text, |caps: &Captures<'_>| {
		serde_json::to_string(&caps[1]).unwrap_or_default()
	});
	let text = param_names_regex().replace_all(&text, |caps: &Captures<'_>| {
		let names = param_token_regex().replace_all(&caps[2], "'${0}'");
		format!("[{names}], {}", &caps[1])
	});
	text.into_owned()
}

/// Strip the single outer comment marker pair from a `type="comment"` block
/// body. Content that is not a bare comment is returned unchanged.
pub(crate) fn strip_outer_comment(text: &str) -> String {
	let trimmed = text.trim();
	if text.trim_start().starts_with('<') {
		if let Some(inner) = trimmed
			.strip_prefix("<!--")
			.and_then(|rest| rest.strip_suffix("-->"))
		{
			return inner.to_string();
		}
	} else if let Some(inner) = trimmed
		.strip_prefix("/*")
		.and_then(|rest| rest.strip_suffix("*/"))
	{
		return inner.to_string();
	}
	text.to_string()
}
