use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum JdistsError {
	#[error(transparent)]
	#[diagnostic(code(jdists::io_error))]
	Io(#[from] std::io::Error),

	#[error("circular block reference: {chain}")]
	#[diagnostic(
		code(jdists::circular_reference),
		help("break the include cycle between these blocks")
	)]
	CircularReference { chain: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(jdists::config_parse),
		help("check that jdists.toml is valid TOML with a [build] section")
	)]
	ConfigParse(String),

	#[error("encoding processor `{name}` failed: {reason}")]
	#[diagnostic(code(jdists::processor))]
	Processor { name: String, reason: String },

	#[error("failed to load template data `{source_name}`: {reason}")]
	#[diagnostic(
		code(jdists::template_data),
		help("the `data` attribute must name a defined `#variant` or a readable JSON file")
	)]
	TemplateData { source_name: String, reason: String },

	#[error("template rendering failed: {0}")]
	#[diagnostic(code(jdists::template_render))]
	TemplateRender(String),
}

pub type JdistsResult<T> = Result<T, JdistsError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyResult<T> = Result<T, AnyError>;
pub type AnyEmptyResult = AnyResult<()>;
