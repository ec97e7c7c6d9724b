use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;
use percent_encoding::utf8_percent_encode;

use crate::JdistsError;
use crate::JdistsResult;
use crate::attrs::Attributes;
use crate::session::BlockContent;
use crate::session::BuildSession;
use crate::text;

/// Everything an encoding processor may inspect about the occurrence it is
/// transforming. `session` gives processors access to variants and lets them
/// feed their output back through block resolution.
pub struct ProcessorContext<'a> {
	/// The referenced content, text or raw bytes.
	pub content: &'a BlockContent,
	/// Attributes of the `include`/`replace` occurrence.
	pub attrs: &'a Attributes,
	/// Directory relative paths in processor inputs resolve against.
	pub base_dir: &'a Path,
	/// The file the referenced block lives in, when the reference names one.
	pub block_file: Option<&'a Path>,
	/// Name of the referenced block, empty for whole-file references.
	pub block_name: &'a str,
	/// Tag of the occurrence being resolved (`include` or `replace`).
	pub tag: &'a str,
	/// The file the occurrence itself appears in.
	pub source_file: &'a Path,
	pub session: &'a mut BuildSession,
}

/// An encoding step applied to referenced content during resolution.
pub trait Processor {
	fn process(&self, ctx: ProcessorContext<'_>) -> JdistsResult<String>;
}

impl<F> Processor for F
where
	F: Fn(ProcessorContext<'_>) -> JdistsResult<String>,
{
	fn process(&self, ctx: ProcessorContext<'_>) -> JdistsResult<String> {
		self(ctx)
	}
}

/// Name-keyed table of encoding processors. Registration overwrites, so
/// callers may shadow a built-in with their own implementation.
pub struct ProcessorRegistry {
	entries: HashMap<String, Rc<dyn Processor>>,
}

impl ProcessorRegistry {
	pub fn empty() -> Self {
		Self {
			entries: HashMap::new(),
		}
	}

	/// A registry holding all built-in processors.
	pub fn with_builtins() -> Self {
		let mut registry = Self::empty();
		registry.register("base64", base64_processor);
		registry.register("md5", md5_processor);
		registry.register("url", url_processor);
		registry.register("html", html_processor);
		registry.register("string", string_processor);
		registry.register("escape", escape_processor);
		registry.register("jinja", jinja_processor);
		registry
	}

	pub fn register(&mut self, name: impl Into<String>, processor: impl Processor + 'static) {
		self.entries.insert(name.into(), Rc::new(processor));
	}

	pub fn lookup(&self, name: &str) -> Option<Rc<dyn Processor>> {
		self.entries.get(name).cloned()
	}
}

fn base64_processor(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
	Ok(BASE64.encode(ctx.content.as_bytes()))
}

fn md5_processor(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
	Ok(text::hash_content(ctx.content.as_bytes()))
}

/// Characters `encodeURIComponent` leaves unescaped, beyond alphanumerics.
const URL_KEEP: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'-')
	.remove(b'_')
	.remove(b'.')
	.remove(b'!')
	.remove(b'~')
	.remove(b'*')
	.remove(b'\'')
	.remove(b'(')
	.remove(b')');

fn url_processor(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
	Ok(utf8_percent_encode(&ctx.content.text(), URL_KEEP).to_string())
}

fn html_processor(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
	Ok(text::encode_entities(&ctx.content.text()))
}

/// Render the content as a double-quoted JSON string literal.
fn string_processor(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
	serde_json::to_string(&*ctx.content.text()).map_err(|error| JdistsError::Processor {
		name: "string".to_string(),
		reason: error.to_string(),
	})
}

/// The JavaScript `escape` function: alphanumerics and `@*_+-./` pass
/// through, other UTF-16 units become `%XX` below 256 and `%uXXXX` above.
fn escape_processor(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
	let text = ctx.content.text();
	let mut out = String::with_capacity(text.len());
	for unit in text.encode_utf16() {
		match u8::try_from(unit) {
			Ok(byte)
				if byte.is_ascii_alphanumeric()
					|| matches!(byte, b'@' | b'*' | b'_' | b'+' | b'-' | b'.' | b'/') =>
			{
				out.push(char::from(byte));
			}
			Ok(byte) => out.push_str(&format!("%{byte:02X}")),
			Err(_) => out.push_str(&format!("%u{unit:04X}")),
		}
	}
	Ok(out)
}

/// Render the content as a Jinja template. The `data` attribute supplies the
/// template context, either from a `#variant` holding JSON or from a JSON
/// file relative to the referenced block. Rendered output is fed back
/// through block resolution so templates may emit markers.
fn jinja_processor(ctx: ProcessorContext<'_>) -> JdistsResult<String> {
	let data = load_template_data(&ctx)?;
	let template = ctx.content.text().into_owned();

	let mut env = minijinja::Environment::new();
	env.set_keep_trailing_newline(true);
	env.set_undefined_behavior(minijinja::UndefinedBehavior::Chainable);
	let rendered = env
		.render_str(&template, minijinja::value::Value::from_serialize(&data))
		.map_err(|error| JdistsError::TemplateRender(error.to_string()))?;

	ctx.session.resolve_fragment(ctx.source_file, &rendered)
}

fn load_template_data(ctx: &ProcessorContext<'_>) -> JdistsResult<serde_json::Value> {
	let Some(source_name) = ctx.attrs.get("data") else {
		return Ok(serde_json::Value::Object(serde_json::Map::new()));
	};

	let raw = if source_name.starts_with('#') {
		ctx
			.session
			.get_variant(source_name)
			.map(ToString::to_string)
			.ok_or_else(|| JdistsError::TemplateData {
				source_name: source_name.to_string(),
				reason: "variant is not defined".to_string(),
			})?
	} else {
		let path = ctx.base_dir.join(source_name);
		std::fs::read_to_string(&path).map_err(|error| JdistsError::TemplateData {
			source_name: path.display().to_string(),
			reason: error.to_string(),
		})?
	};

	serde_json::from_str(&raw).map_err(|error| JdistsError::TemplateData {
		source_name: source_name.to_string(),
		reason: error.to_string(),
	})
}
