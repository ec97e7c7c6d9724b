use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::JdistsError;
use crate::JdistsResult;
use crate::attrs;
use crate::attrs::Attributes;
use crate::processors::ProcessorContext;
use crate::scanner;
use crate::scanner::BlockMatch;
use crate::session::BlockContent;
use crate::session::BlockKey;
use crate::session::BuildSession;
use crate::session::absolutize;
use crate::session::parent_dir;
use crate::text;

impl BuildSession {
	/// Resolve a previously loaded file to its final output text. Files that
	/// were never loaded, or were loaded as binary, resolve to the empty
	/// string.
	pub fn resolve(&mut self, path: &Path) -> JdistsResult<String> {
		let key = BlockKey::whole_file(&absolutize(path));
		let Some(record) = self.blocks.get(&key) else {
			return Ok(String::new());
		};
		if record.is_binary {
			warn!(file = %key.file.display(), "binary file cannot be resolved as text");
			return Ok(String::new());
		}
		self.resolve_block(&key)?;
		Ok(
			self
				.blocks
				.get(&key)
				.and_then(|record| record.content.as_ref())
				.map(|content| content.text().into_owned())
				.unwrap_or_default(),
		)
	}

	/// Resolve a standalone text fragment as if it appeared in `file`.
	/// Relative paths inside the fragment resolve against the file's
	/// directory. Used by processors whose output may contain markers.
	pub fn resolve_fragment(&mut self, file: &Path, content: &str) -> JdistsResult<String> {
		self.resolve_text(file, content)
	}

	/// Resolution-pass scan: every marker block in `content` is replaced by
	/// its resolved form, then source macros are expanded over the result.
	fn resolve_text(&mut self, file: &Path, content: &str) -> JdistsResult<String> {
		let base_dir = parent_dir(file);
		scanner::scan(
			content,
			&mut |m| self.resolve_match(file, &base_dir, m),
			true,
		)
	}

	fn resolve_match(
		&mut self,
		file: &Path,
		base_dir: &Path,
		m: &BlockMatch<'_>,
	) -> JdistsResult<String> {
		// Removal applies regardless of the trigger state of the occurrence.
		if m.tag == "remove" || self.options().remove.iter().any(|tag| tag.as_str() == m.tag) {
			return Ok(String::new());
		}

		let block_attrs = attrs::parse_attributes(m.attr_text, base_dir);
		if !block_attrs.expands_under(&self.options().trigger) {
			// An inactive exported block must not leave its markers behind,
			// and performs no export.
			if block_attrs.export().is_some() {
				return Ok(String::new());
			}
			return Ok(m.raw());
		}

		if matches!(m.tag, "include" | "replace") {
			return self.resolve_reference(file, base_dir, m, &block_attrs);
		}

		let body = self.resolve_text(file, m.body)?;
		Ok(format!(
			"{}{}{}{}{}{}",
			m.opening, m.tag, m.attr_text, m.infix, body, m.closing
		))
	}

	/// Resolve an `include` or `replace` occurrence: fetch the referenced
	/// content, run it through the optional encoding processor and slice, and
	/// either splice it in place or divert it to an export target.
	fn resolve_reference(
		&mut self,
		file: &Path,
		base_dir: &Path,
		m: &BlockMatch<'_>,
		block_attrs: &Attributes,
	) -> JdistsResult<String> {
		let mut block_file: Option<PathBuf> = None;

		let content = if let Some(reference) = block_attrs.file() {
			if let Some(variant) = self.get_variant(reference) {
				BlockContent::Text(variant.to_string())
			} else if reference.starts_with('#') {
				warn!(variant = reference, "variant is not defined");
				return Ok(String::new());
			} else {
				let target = block_attrs
					.file_path
					.clone()
					.unwrap_or_else(|| absolutize(file));
				let tag = block_attrs.block().unwrap_or("");
				block_file = Some(target.clone());
				match self.referenced_content(&BlockKey::new(&target, tag))? {
					Some(content) => content,
					None => return Ok(String::new()),
				}
			}
		} else if let Some(tag) = block_attrs.block() {
			let target = absolutize(file);
			block_file = Some(target.clone());
			match self.referenced_content(&BlockKey::new(&target, tag))? {
				Some(content) => content,
				None => return Ok(String::new()),
			}
		} else {
			BlockContent::Text(self.resolve_text(file, m.body)?)
		};

		// Text content is fully resolved before any encoding processor sees
		// it, so a processor never observes unexpanded markers.
		let origin = block_file.clone().unwrap_or_else(|| absolutize(file));
		let mut content = content;
		if !content.is_binary() {
			let inner = content.text().into_owned();
			content = BlockContent::Text(self.resolve_text(&origin, &inner)?);
		}

		if let Some(name) = block_attrs.encoding() {
			if let Some(processor) = self.processors.lookup(name) {
				let proc_dir = block_file
					.as_deref()
					.map_or_else(|| base_dir.to_path_buf(), parent_dir);
				let output = processor.process(ProcessorContext {
					content: &content,
					attrs: block_attrs,
					base_dir: &proc_dir,
					block_file: block_file.as_deref(),
					block_name: block_attrs.block().unwrap_or(""),
					tag: m.tag,
					source_file: file,
					session: &mut *self,
				})?;
				content = BlockContent::Text(output);
			} else {
				warn!(encoding = name, "unknown encoding processor, content is passed through");
			}
		}

		if let Some(spec) = block_attrs.slice() {
			content = match content {
				BlockContent::Binary(bytes) => BlockContent::Binary(text::slice_bytes(&bytes, spec)),
				BlockContent::Text(inner) => BlockContent::Text(text::slice_text(&inner, spec)),
			};
		}

		let mut output = content.into_text();
		if self.options().clean {
			output = text::normalize(&output);
		}
		let output = self.resolve_text(&origin, &output)?;

		match block_attrs.export() {
			Some(name) if name.starts_with('#') => {
				debug!(variant = name, "exporting block to variant");
				self.set_variant(name, output);
				Ok(String::new())
			}
			Some(_) => {
				if let Some(path) = &block_attrs.export_path {
					debug!(file = %path.display(), "exporting block to file");
					text::force_dir(path)?;
					std::fs::write(path, &output)?;
				}
				Ok(String::new())
			}
			None => Ok(output),
		}
	}

	/// Resolved content of a referenced block. Returns `None` when the key
	/// was never registered, which splices in nothing.
	fn referenced_content(&mut self, key: &BlockKey) -> JdistsResult<Option<BlockContent>> {
		if !self.blocks.contains_key(key) {
			warn!(block = %key, "referenced block is not defined");
			return Ok(None);
		}
		self.resolve_block(key)?;
		Ok(
			self
				.blocks
				.get(key)
				.and_then(|record| record.content.clone())
				.or(Some(BlockContent::Text(String::new()))),
		)
	}

	/// Drive a block record from pending to completed, exactly once. A key
	/// already on the active chain is a circular reference.
	fn resolve_block(&mut self, key: &BlockKey) -> JdistsResult<()> {
		let Some(record) = self.blocks.get(key) else {
			return Ok(());
		};
		if record.completed {
			return Ok(());
		}
		if self.chain.contains(key) {
			let mut chain = self.chain.clone();
			chain.push(key.clone());
			return Err(JdistsError::CircularReference {
				chain: format_chain(&chain),
			});
		}

		self.chain.push(key.clone());
		let outcome = self.compute_block_content(key);
		self.chain.pop();
		let content = outcome?;

		if let Some(record) = self.blocks.get_mut(key) {
			record.content = Some(content);
			record.completed = true;
		}
		Ok(())
	}

	fn compute_block_content(&mut self, key: &BlockKey) -> JdistsResult<BlockContent> {
		let (file, is_file, is_binary) = {
			let Some(record) = self.blocks.get(key) else {
				return Ok(BlockContent::Text(String::new()));
			};
			(record.file.clone(), record.is_file, record.is_binary)
		};

		if is_file {
			if is_binary {
				let bytes = std::fs::read(&file)?;
				return Ok(BlockContent::Binary(bytes));
			}
			let raw = self
				.blocks
				.get(key)
				.and_then(|record| record.content.as_ref())
				.map(|content| content.text().into_owned())
				.unwrap_or_default();
			let resolved = self.resolve_text(&file, &raw)?;
			return Ok(BlockContent::Text(resolved));
		}

		// Occurrences concatenate in source-position order, not in the order
		// discovery registered them.
		let mut nodes = self
			.blocks
			.get_mut(key)
			.map(|record| std::mem::take(&mut record.nodes))
			.unwrap_or_default();
		nodes.sort_by_key(|node| node.offset);

		let mut pieces = Vec::with_capacity(nodes.len());
		let mut failure = None;
		for node in &mut nodes {
			if node.resolved.is_none() {
				match self.resolve_text(&file, &node.body) {
					Ok(resolved) => node.resolved = Some(resolved),
					Err(error) => {
						failure = Some(error);
						break;
					}
				}
			}
			let mut piece = node.resolved.clone().unwrap_or_default();
			if node.attrs.type_name() == Some("comment") {
				piece = scanner::strip_outer_comment(&piece);
			}
			pieces.push(piece);
		}

		if let Some(record) = self.blocks.get_mut(key) {
			record.nodes = nodes;
		}
		if let Some(error) = failure {
			return Err(error);
		}
		Ok(BlockContent::Text(pieces.join("\n")))
	}
}

fn format_chain(chain: &[BlockKey]) -> String {
	chain
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join(" -> ")
}
