use std::path::Path;

use md5::Digest;
use md5::Md5;

/// Whitespace normalization applied to loaded sources and build output:
/// CRLF becomes LF, trailing whitespace is stripped from every line, interior
/// blank-line runs collapse to a single blank line, and leading/trailing
/// blank lines are dropped.
pub fn normalize(text: &str) -> String {
	let unified = normalize_line_endings(text);
	let mut out = String::with_capacity(unified.len());
	let mut pending_blanks = 0usize;
	let mut started = false;

	for line in unified.split('\n') {
		let line = line.trim_end_matches([' ', '\t']);
		if line.is_empty() {
			pending_blanks += 1;
			continue;
		}
		if started {
			out.push('\n');
			if pending_blanks > 0 {
				out.push('\n');
			}
		}
		pending_blanks = 0;
		started = true;
		out.push_str(line);
	}

	out
}

/// Normalize CRLF line endings to LF.
pub fn normalize_line_endings(text: &str) -> String {
	if text.contains('\r') {
		text.replace("\r\n", "\n").replace('\r', "\n")
	} else {
		text.to_string()
	}
}

/// Hex digest of `bytes` (md5).
pub fn hash_content(bytes: &[u8]) -> String {
	hex::encode(Md5::digest(bytes))
}

/// Escape text for literal inclusion in HTML.
pub fn encode_entities(text: &str) -> String {
	html_escape::encode_text(text).into_owned()
}

/// Decode HTML entities back to plain text.
pub fn decode_entities(text: &str) -> String {
	html_escape::decode_html_entities(text).into_owned()
}

/// Create the parent directories of `path` so it can be written.
pub fn force_dir(path: &Path) -> std::io::Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			std::fs::create_dir_all(parent)?;
		}
	}
	Ok(())
}

/// Parse a `slice="start[,end]"` attribute value. Unparseable numbers fall
/// back to 0, matching loose numeric coercion.
fn parse_slice_spec(spec: &str) -> (i64, Option<i64>) {
	let mut parts = spec.splitn(2, ',');
	let start = parts
		.next()
		.and_then(|part| part.trim().parse().ok())
		.unwrap_or(0);
	let end = parts.next().map(|part| part.trim().parse().unwrap_or(0));
	(start, end)
}

/// Slice index handling in the style of `String.prototype.slice`: negative
/// indices count back from the end, out-of-range values clamp, and a missing
/// end means "to the end".
fn slice_bounds(len: usize, start: i64, end: Option<i64>) -> (usize, usize) {
	let len_i = len as i64;
	let clamp = |value: i64| -> usize {
		if value < 0 {
			(len_i + value).max(0) as usize
		} else {
			value.min(len_i) as usize
		}
	};
	let lower = clamp(start);
	let upper = end.map_or(len, clamp);
	(lower, upper.max(lower))
}

/// Apply a slice spec to text, counting in characters.
pub fn slice_text(text: &str, spec: &str) -> String {
	let (start, end) = parse_slice_spec(spec);
	let chars: Vec<char> = text.chars().collect();
	let (lower, upper) = slice_bounds(chars.len(), start, end);
	chars[lower..upper].iter().collect()
}

/// Apply a slice spec to raw bytes.
pub fn slice_bytes(bytes: &[u8], spec: &str) -> Vec<u8> {
	let (start, end) = parse_slice_spec(spec);
	let (lower, upper) = slice_bounds(bytes.len(), start, end);
	bytes[lower..upper].to_vec()
}
