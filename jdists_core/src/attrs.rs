use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

/// Parsed attributes of a block occurrence.
///
/// Attribute values are kept verbatim; the `file` and `export` attributes are
/// additionally resolved against the base directory when they name a real
/// path rather than a `#variant` slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
	values: BTreeMap<String, String>,
	/// Absolute path of the `file` attribute, when it names a path.
	pub file_path: Option<PathBuf>,
	/// Absolute path of the `export` attribute, when it names a path.
	pub export_path: Option<PathBuf>,
}

impl Attributes {
	/// Raw value of a named attribute.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.values.get(name).map(String::as_str)
	}

	pub fn file(&self) -> Option<&str> {
		self.get("file")
	}

	pub fn block(&self) -> Option<&str> {
		self.get("block")
	}

	pub fn encoding(&self) -> Option<&str> {
		self.get("encoding")
	}

	pub fn slice(&self) -> Option<&str> {
		self.get("slice")
	}

	pub fn export(&self) -> Option<&str> {
		self.get("export")
	}

	pub fn type_name(&self) -> Option<&str> {
		self.get("type")
	}

	/// Whether the occurrence expands under the given active trigger.
	///
	/// A missing `trigger` attribute always expands. Otherwise the attribute
	/// is a comma list of profile names that must include the active one.
	pub fn expands_under(&self, active: &str) -> bool {
		match self.get("trigger") {
			None => true,
			Some(list) => list.split(',').any(|profile| profile.trim() == active),
		}
	}
}

/// Parse a raw attribute string into an [`Attributes`] map, resolving
/// file-valued attributes against `base_dir`.
///
/// The input is the scanner's raw attribute capture: zero or more
/// `name="value"` pairs. Later pairs overwrite earlier ones with the same
/// name. Values starting with `#` reference variant slots and are never
/// resolved to paths.
pub fn parse_attributes(attr_text: &str, base_dir: &Path) -> Attributes {
	let mut attrs = Attributes::default();
	let bytes = attr_text.as_bytes();
	let mut i = 0;

	while i < bytes.len() {
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
		let name = &attr_text[name_start..i];
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
		if i >= bytes.len() {
			break;
		}
		let value = &attr_text[value_start..i];
		i += 1;

		attrs.values.insert(name.to_string(), value.to_string());
	}

	attrs.file_path = resolve_path_attr(attrs.file(), base_dir);
	attrs.export_path = resolve_path_attr(attrs.export(), base_dir);
	attrs
}

fn is_name_byte(byte: u8) -> bool {
	byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.')
}

/// Resolve a file-valued attribute to an absolute path. Variant references
/// (`#name`) and empty values resolve to `None`.
fn resolve_path_attr(value: Option<&str>, base_dir: &Path) -> Option<PathBuf> {
	let value = value?;
	if value.is_empty() || value.starts_with('#') {
		return None;
	}
	let path = Path::new(value);
	let joined = if path.is_absolute() {
		path.to_path_buf()
	} else {
		base_dir.join(path)
	};
	Some(std::path::absolute(&joined).unwrap_or(joined))
}
