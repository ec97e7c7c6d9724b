use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::BuildOptions;
use crate::JdistsResult;
use crate::Processor;
use crate::ProcessorRegistry;
use crate::attrs;
use crate::attrs::Attributes;
use crate::scanner;
use crate::scanner::BlockMatch;
use crate::text;

/// Identity of a block: absolute source path plus tag name. The empty tag
/// names the whole-file pseudo-block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
	pub file: PathBuf,
	pub tag: String,
}

impl BlockKey {
	pub fn new(file: &Path, tag: &str) -> Self {
		Self {
			file: file.to_path_buf(),
			tag: tag.to_string(),
		}
	}

	/// Key of the whole-file pseudo-block for `file`.
	pub fn whole_file(file: &Path) -> Self {
		Self::new(file, "")
	}
}

impl std::fmt::Display for BlockKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.tag.is_empty() {
			write!(f, "{}", self.file.display())
		} else {
			write!(f, "{}#{}", self.file.display(), self.tag)
		}
	}
}

/// Resolved content of a block: text for scanned sources, raw bytes for
/// binary files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockContent {
	Text(String),
	Binary(Vec<u8>),
}

impl BlockContent {
	pub fn is_binary(&self) -> bool {
		matches!(self, Self::Binary(_))
	}

	pub fn as_bytes(&self) -> &[u8] {
		match self {
			Self::Text(text) => text.as_bytes(),
			Self::Binary(bytes) => bytes,
		}
	}

	/// View the content as text; binary bytes are converted lossily.
	pub fn text(&self) -> std::borrow::Cow<'_, str> {
		match self {
			Self::Text(text) => std::borrow::Cow::Borrowed(text),
			Self::Binary(bytes) => String::from_utf8_lossy(bytes),
		}
	}

	pub fn into_text(self) -> String {
		match self {
			Self::Text(text) => text,
			Self::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
		}
	}
}

/// One tagged span recorded during discovery.
#[derive(Debug, Clone)]
pub struct BlockOccurrence {
	/// Byte offset of the occurrence in the text it was discovered in.
	/// Concatenation order follows this, not registration order.
	pub offset: usize,
	pub attrs: Attributes,
	/// Raw inner body as captured by the scanner.
	pub body: String,
	/// Memoized resolved body, set at most once.
	pub(crate) resolved: Option<String>,
}

/// Per-key record in the session block table. Created at most once per key;
/// `content` is memoized and `completed` flips false to true exactly once.
#[derive(Debug)]
pub struct BlockRecord {
	pub file: PathBuf,
	pub tag: String,
	pub is_file: bool,
	pub is_binary: bool,
	pub nodes: Vec<BlockOccurrence>,
	pub(crate) content: Option<BlockContent>,
	pub(crate) completed: bool,
}

impl BlockRecord {
	fn file_record(file: &Path) -> Self {
		Self {
			file: file.to_path_buf(),
			tag: String::new(),
			is_file: true,
			is_binary: false,
			nodes: Vec::new(),
			content: None,
			completed: false,
		}
	}

	fn tag_record(file: &Path, tag: &str) -> Self {
		Self {
			file: file.to_path_buf(),
			tag: tag.to_string(),
			is_file: false,
			is_binary: false,
			nodes: Vec::new(),
			content: None,
			completed: false,
		}
	}
}

/// All mutable state for one build: the block table, the variant store, the
/// active resolution chain, and the processor registry. Creating one session
/// per build keeps concurrent builds independent.
pub struct BuildSession {
	options: BuildOptions,
	pub(crate) blocks: HashMap<BlockKey, BlockRecord>,
	pub(crate) variants: HashMap<String, String>,
	pub(crate) chain: Vec<BlockKey>,
	pub(crate) processors: ProcessorRegistry,
}

impl BuildSession {
	/// Create a session with the built-in encoding processors registered.
	pub fn new(options: BuildOptions) -> Self {
		Self {
			options,
			blocks: HashMap::new(),
			variants: HashMap::new(),
			chain: Vec::new(),
			processors: ProcessorRegistry::with_builtins(),
		}
	}

	pub fn options(&self) -> &BuildOptions {
		&self.options
	}

	/// Register (or overwrite) an encoding processor under `name`.
	pub fn register_encoding(&mut self, name: impl Into<String>, processor: impl Processor + 'static) {
		self.processors.register(name, processor);
	}

	/// Read a variant slot. Names include their `#` prefix.
	pub fn get_variant(&self, name: &str) -> Option<&str> {
		self.variants.get(name).map(String::as_str)
	}

	/// Write a variant slot; the last write wins.
	pub fn set_variant(&mut self, name: impl Into<String>, content: impl Into<String>) {
		self.variants.insert(name.into(), content.into());
	}

	/// Registered block record for `key`, if any.
	pub fn block(&self, key: &BlockKey) -> Option<&BlockRecord> {
		self.blocks.get(key)
	}

	/// Run a full build: load the entry file, resolve it, and normalize the
	/// final output when `clean` is enabled. Session state from a previous
	/// build is discarded first.
	pub fn build(&mut self, path: &Path) -> JdistsResult<String> {
		self.blocks.clear();
		self.variants.clear();
		self.chain.clear();

		let path = absolutize(path);
		self.load(&path)?;
		let mut result = self.resolve(&path)?;
		if self.options.clean {
			result = text::normalize(&result);
		}
		Ok(result)
	}

	/// Load `path` and register every tagged block reachable from it,
	/// recursing into files referenced by `include`/`replace` occurrences.
	/// Memoized per absolute path; a missing file is a warning, not an error.
	pub fn load(&mut self, path: &Path) -> JdistsResult<()> {
		let path = absolutize(path);
		let key = BlockKey::whole_file(&path);
		if self.blocks.contains_key(&key) {
			return Ok(());
		}
		debug!(file = %path.display(), "loading file");

		if !path.exists() {
			warn!(file = %path.display(), "file does not exist, loading empty content");
			let mut record = BlockRecord::file_record(&path);
			record.content = Some(BlockContent::Text(String::new()));
			self.blocks.insert(key, record);
			return Ok(());
		}

		if self.options.is_binary_path(&path) {
			let mut record = BlockRecord::file_record(&path);
			record.is_binary = true;
			self.blocks.insert(key, record);
			return Ok(());
		}

		let bytes = std::fs::read(&path)?;
		let mut content = String::from_utf8_lossy(&bytes).into_owned();
		if self.options.clean {
			content = text::normalize(&content);
		}
		let mut record = BlockRecord::file_record(&path);
		record.content = Some(BlockContent::Text(content.clone()));
		self.blocks.insert(key, record);

		let base_dir = parent_dir(&path);
		self.discover(&path, &base_dir, &content)
	}

	/// Discovery-pass scan over `content` from `file`. The transformed output
	/// (matched spans blanked to equal length) only keeps the scan idempotent
	/// and is discarded.
	fn discover(&mut self, file: &Path, base_dir: &Path, content: &str) -> JdistsResult<()> {
		let _ = scanner::scan(
			content,
			&mut |m| self.discover_match(file, base_dir, m),
			false,
		)?;
		Ok(())
	}

	fn discover_match(
		&mut self,
		file: &Path,
		base_dir: &Path,
		m: &BlockMatch<'_>,
	) -> JdistsResult<String> {
		let block_attrs = attrs::parse_attributes(m.attr_text, base_dir);

		// Trigger-excluded spans stay verbatim and are never registered.
		if !block_attrs.expands_under(&self.options.trigger) {
			return Ok(m.raw());
		}

		let target = block_attrs.file_path.clone();
		let key = BlockKey::new(file, m.tag);
		self.blocks
			.entry(key)
			.or_insert_with(|| BlockRecord::tag_record(file, m.tag))
			.nodes
			.push(BlockOccurrence {
				offset: m.offset,
				attrs: block_attrs,
				body: m.body.to_string(),
				resolved: None,
			});

		if matches!(m.tag, "include" | "replace") {
			if let Some(target) = target {
				self.load(&target)?;
			}
		}

		// Register blocks nested inside this occurrence's body.
		self.discover(file, base_dir, m.body)?;
		Ok(" ".repeat(m.len))
	}
}

/// Convenience wrapper: run one complete build with a fresh session.
pub fn build(path: &Path, options: BuildOptions) -> JdistsResult<String> {
	let mut session = BuildSession::new(options);
	session.build(path)
}

pub(crate) fn absolutize(path: &Path) -> PathBuf {
	std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

pub(crate) fn parent_dir(path: &Path) -> PathBuf {
	path.parent()
		.map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
