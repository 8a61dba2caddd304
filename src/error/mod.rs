pub mod analyzer;
pub mod interpreter;
pub mod module;
pub mod parser;
pub mod scanner;

/// NoxyError is the top-level error type for the interpreter pipeline.
#[derive(thiserror::Error, Debug)]
pub enum NoxyError {
	/// Internal interpreter error, should never happen
	#[error("internal error: {0}")]
	InternalError(#[from] anyhow::Error),
	/// Error produced while tokenizing source text
	#[error(transparent)]
	Scan(#[from] scanner::ScanError),
	/// Error produced while parsing the token stream
	#[error(transparent)]
	Parse(#[from] parser::ParseError),
	/// Error produced by the static analyzer
	#[error(transparent)]
	Type(#[from] analyzer::TypeError),
	/// Error produced while resolving or loading a module
	#[error(transparent)]
	Module(#[from] module::ModuleError),
	/// Error produced during evaluation
	#[error(transparent)]
	Runtime(#[from] interpreter::RuntimeError),
}

impl NoxyError {
	/// Renders the error the way the driver reports it on stderr:
	/// `<file>:<line>:<col>: <kind>: <message>`.
	pub fn report(&self, file: &str) -> String {
		match self {
			NoxyError::InternalError(e) => format!("{file}: internal error: {e}"),
			NoxyError::Runtime(e) if !e.has_location() => format!("{file}: {e}"),
			_ => format!("{file}:{self}"),
		}
	}
}
