use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;

use crate::JdistsError;
use crate::JdistsResult;

/// Supported config file locations in discovery order (highest precedence
/// first), relative to the entry file's directory.
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["jdists.toml", ".jdists.toml"];

/// Extensions always treated as binary: scanned for nothing, loaded as raw
/// bytes on demand.
pub const BINARY_EXTENSIONS: [&str; 9] = [
	"png", "jpeg", "jpg", "mp3", "ogg", "gif", "eot", "ttf", "woff",
];

/// Caller predicate deciding whether a path holds binary content.
pub type BinaryPredicate = Rc<dyn Fn(&Path) -> bool>;

/// Options controlling a single build.
#[derive(Clone)]
pub struct BuildOptions {
	/// Whitespace-normalize loaded sources and the final output.
	pub clean: bool,
	/// Tags always stripped from the output, regardless of trigger.
	pub remove: Vec<String>,
	/// Active build profile gating `trigger` attributes.
	pub trigger: String,
	/// Extensions treated as binary in addition to [`BINARY_EXTENSIONS`].
	pub binary_extensions: Vec<String>,
	/// Predicate overriding binary detection by path.
	pub is_binary: Option<BinaryPredicate>,
}

impl Default for BuildOptions {
	fn default() -> Self {
		Self {
			clean: true,
			remove: vec!["debug".to_string(), "test".to_string()],
			trigger: "release".to_string(),
			binary_extensions: Vec::new(),
			is_binary: None,
		}
	}
}

impl std::fmt::Debug for BuildOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BuildOptions")
			.field("clean", &self.clean)
			.field("remove", &self.remove)
			.field("trigger", &self.trigger)
			.field("binary_extensions", &self.binary_extensions)
			.field("is_binary", &self.is_binary.as_ref().map(|_| "<predicate>"))
			.finish()
	}
}

impl BuildOptions {
	/// Whether `path` should be loaded as binary content.
	pub fn is_binary_path(&self, path: &Path) -> bool {
		if let Some(predicate) = &self.is_binary {
			if predicate(path) {
				return true;
			}
		}
		let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
			return false;
		};
		let ext = ext.to_ascii_lowercase();
		BINARY_EXTENSIONS.contains(&ext.as_str())
			|| self.binary_extensions.iter().any(|known| known == &ext)
	}
}

/// Split a comma list option value into its trimmed, non-empty entries.
pub fn split_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|entry| !entry.is_empty())
		.map(str::to_string)
		.collect()
}

/// Configuration loaded from a `jdists.toml` file.
///
/// ```toml
/// [build]
/// trigger = "release"
/// remove = "debug,test"
/// clean = true
/// binary_extensions = ["wasm"]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct JdistsConfig {
	/// Build defaults applied before command-line overrides.
	#[serde(default)]
	pub build: BuildConfig,
}

/// The `[build]` section of `jdists.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct BuildConfig {
	pub trigger: Option<String>,
	/// Comma list of tags to strip.
	pub remove: Option<String>,
	pub clean: Option<bool>,
	#[serde(default)]
	pub binary_extensions: Vec<String>,
}

impl JdistsConfig {
	/// Discover and load configuration from `dir`, trying
	/// [`CONFIG_FILE_CANDIDATES`] in order. Returns `None` when no config
	/// file exists.
	pub fn load(dir: &Path) -> JdistsResult<Option<Self>> {
		for candidate in CONFIG_FILE_CANDIDATES {
			let path = dir.join(candidate);
			if !path.is_file() {
				continue;
			}
			let raw = std::fs::read_to_string(&path)?;
			let config =
				toml::from_str(&raw).map_err(|error| JdistsError::ConfigParse(error.to_string()))?;
			return Ok(Some(config));
		}
		Ok(None)
	}

	/// Fold configured values into `options`. Unset config fields leave the
	/// existing values untouched.
	pub fn apply(&self, options: &mut BuildOptions) {
		if let Some(trigger) = &self.build.trigger {
			options.trigger.clone_from(trigger);
		}
		if let Some(remove) = &self.build.remove {
			options.remove = split_list(remove);
		}
		if let Some(clean) = self.build.clean {
			options.clean = clean;
		}
		options
			.binary_extensions
			.extend(self.build.binary_extensions.iter().cloned());
	}
}
