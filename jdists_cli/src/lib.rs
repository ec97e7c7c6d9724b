use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Build code from comment-marker blocks.",
	long_about = "jdists builds a source file by resolving the comment-marker blocks it \
	              contains.\n\nTagged blocks live inside ordinary comments \
	              (`<!--tag-->...<!--/tag-->` or `/*<tag>*/.../*</tag>*/`), so sources stay \
	              runnable before a build. `include` and `replace` directives splice in other \
	              files, named blocks, or `#variant` slots; `trigger` attributes gate blocks on \
	              the active build profile; `debug` and `test` blocks are stripped from release \
	              output.\n\nDefaults can be set in a `jdists.toml` next to the input file; \
	              command-line flags take precedence."
)]
pub struct JdistsCli {
	/// Entry source file to build.
	pub input: PathBuf,

	/// Write the built output to this file instead of stdout.
	#[arg(long, short)]
	pub output: Option<PathBuf>,

	/// Active build profile gating `trigger` attributes.
	#[arg(long, short)]
	pub trigger: Option<String>,

	/// Comma-separated list of tags to strip from the output.
	#[arg(long, short)]
	pub remove: Option<String>,

	/// Skip whitespace normalization of sources and output.
	#[arg(long, default_value_t = false)]
	pub no_clean: bool,

	/// Enable verbose output.
	#[arg(long, short, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, default_value_t = false)]
	pub no_color: bool,
}
