use crate::scanner::Loc;

/// A fatal evaluation error. Carries the nearest source position when the
/// failing expression had one.
#[derive(thiserror::Error, Debug)]
pub struct RuntimeError {
	loc:  Option<Loc>,
	kind: RuntimeErrorKind,
}

impl RuntimeError {
	pub(crate) fn new(loc: Loc, kind: RuntimeErrorKind) -> Self { Self { loc: Some(loc), kind } }

	pub(crate) fn bare(kind: RuntimeErrorKind) -> Self { Self { loc: None, kind } }

	/// Attaches a position if the error was raised without one.
	pub(crate) fn at(mut self, loc: Loc) -> Self {
		self.loc.get_or_insert(loc);
		self
	}

	pub fn has_location(&self) -> bool { self.loc.is_some() }
}

impl std::fmt::Display for RuntimeError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match &self.loc {
			Some(loc) => write!(f, "{loc}: runtime error: {}", self.kind),
			None => write!(f, "runtime error: {}", self.kind),
		}
	}
}

#[derive(Debug, PartialEq)]
pub enum RuntimeErrorKind {
	DivisionByZero,
	IndexOutOfBounds { index: i64, length: usize },
	/// Read of a map key that is not present. Writes never fail.
	KeyNotFound(String),
	/// Field access or mutation through a null reference.
	NullAccess,
	/// Only reachable with `--no-typecheck`.
	UndefinedVariable(String),
	UndefinedFunction(String),
	NotCallable(String),
	WrongType { expected: &'static str, found: String },
	ArityMismatch { name: String, expected: usize, found: usize },
	NoSuchField { type_name: String, field: String },
	PopFromEmpty,
	AppendToFixed,
	OrdExpectsChar(String),
	NegativeLength(i64),
	StackOverflow,
	WriteFailed(String),
}

impl std::fmt::Display for RuntimeErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		use RuntimeErrorKind::*;
		match self {
			DivisionByZero => write!(f, "division by zero"),
			IndexOutOfBounds { index, length } => {
				write!(f, "index {index} out of bounds for length {length}")
			}
			KeyNotFound(key) => write!(f, "map has no key {key}"),
			NullAccess => write!(f, "null reference access"),
			UndefinedVariable(name) => write!(f, "variable '{name}' is not defined"),
			UndefinedFunction(name) => write!(f, "function '{name}' is not defined"),
			NotCallable(what) => write!(f, "'{what}' is not callable"),
			WrongType { expected, found } => write!(f, "expected {expected}, found {found}"),
			ArityMismatch { name, expected, found } => {
				write!(f, "'{name}' expects {expected} arguments, found {found}")
			}
			NoSuchField { type_name, field } => {
				write!(f, "struct '{type_name}' has no field '{field}'")
			}
			PopFromEmpty => write!(f, "pop() from an empty array"),
			AppendToFixed => write!(f, "cannot append to a fixed-size array"),
			OrdExpectsChar(s) => write!(f, "ord() expects a single-character string, found \"{s}\""),
			NegativeLength(n) => write!(f, "array length cannot be negative: {n}"),
			StackOverflow => write!(f, "stack overflow"),
			WriteFailed(reason) => write!(f, "cannot write output: {reason}"),
		}
	}
}
