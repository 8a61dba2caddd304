use crate::scanner::Loc;

/// A module resolution or loading error, positioned at the `use` statement.
#[derive(thiserror::Error, Debug)]
#[error("{loc}: module error: {kind}")]
pub struct ModuleError {
	loc:  Loc,
	kind: ModuleErrorKind,
}

impl ModuleError {
	pub(crate) fn new(loc: Loc, kind: ModuleErrorKind) -> Self { Self { loc, kind } }
}

#[derive(Debug)]
pub enum ModuleErrorKind {
	/// No file or directory matched the dotted path under any search root.
	NotFound(String),
	/// The module is already on the in-progress loading path.
	CircularImport(String),
	/// A `select` named a symbol the module does not export.
	UnknownExport { module: String, symbol: String },
	/// A selective import would bind a name that is already bound — by a
	/// local declaration or by an earlier import of a different symbol.
	AmbiguousImport { module: String, symbol: String },
	/// The module file exists but could not be read.
	ReadFailed { path: String, reason: String },
}

impl std::fmt::Display for ModuleErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		use ModuleErrorKind::*;
		match self {
			NotFound(path) => write!(f, "module '{path}' not found"),
			CircularImport(path) => write!(f, "circular import of module '{path}'"),
			UnknownExport { module, symbol } => {
				write!(f, "module '{module}' does not export '{symbol}'")
			}
			AmbiguousImport { module, symbol } => {
				write!(f, "ambiguous selective import: '{symbol}' from '{module}' is already bound")
			}
			ReadFailed { path, reason } => write!(f, "cannot read module '{path}': {reason}"),
		}
	}
}
