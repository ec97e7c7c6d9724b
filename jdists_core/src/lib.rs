//! `jdists_core` is the core library for the jdists code block
//! preprocessor. Source files carry tagged blocks inside HTML comments
//! (`<!--tag-->...<!--/tag-->`) or block comments (`/*<tag>*/.../*</tag>*/`),
//! and a build replaces `include`/`replace` references with the content they
//! name, strips debug-only blocks, and applies encoding processors along the
//! way.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Entry file
//!   → Scanner (prioritized rule table decomposes comment markers into blocks)
//!   → Load pass (registers every (file, tag) block, recurses into referenced files)
//!   → Resolve pass (memoized, cycle-checked replacement of references)
//!   → Encoding processors + slices (base64, md5, url, html, string, escape, jinja)
//!   → Clean normalization of the final output
//! ```
//!
//! ## Modules
//!
//! - [`config`] — Build options plus `jdists.toml` configuration loading.
//! - [`scanner`] — The marker grammar: six prioritized rules over two comment
//!   families, with literal-text recovery for malformed markers.
//! - [`text`] — Text utilities shared across the pipeline: normalization,
//!   entity encoding, content hashing, and JavaScript-style slices.
//!
//! ## Key Types
//!
//! - [`BuildSession`] — All state for one build: the block table, the variant
//!   store, the resolution chain, and the processor registry.
//! - [`BuildOptions`] — Trigger, removal list, clean flag, and binary file
//!   detection.
//! - [`Processor`] — A named encoding step applied to referenced content,
//!   registered per session.
//! - [`JdistsError`] — Error type for every fallible operation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jdists_core::{BuildOptions, BuildSession};
//! use std::path::Path;
//!
//! let mut session = BuildSession::new(BuildOptions::default());
//! let output = session.build(Path::new("src/app.js")).unwrap();
//! println!("{output}");
//! ```

pub use attrs::*;
pub use config::*;
pub use error::*;
pub use processors::*;
pub use session::*;

mod attrs;
pub mod config;
mod error;
mod processors;
mod resolver;
pub mod scanner;
mod session;
pub mod text;

#[cfg(test)]
mod __tests;
