use crate::scanner::Loc;

/// A syntax error with its source position.
#[derive(thiserror::Error, Debug)]
#[error("{loc}: parse error: {kind}")]
pub struct ParseError {
	loc:  Loc,
	kind: ParseErrorKind,
}

impl ParseError {
	pub(crate) fn new(loc: Loc, kind: ParseErrorKind) -> Self { Self { loc, kind } }

	/// True when the parse failed only because the input stopped early.
	/// The REPL uses this to keep reading continuation lines.
	pub fn is_premature_end(&self) -> bool {
		match &self.kind {
			ParseErrorKind::Expected { found, .. }
			| ParseErrorKind::ExpectedExpression(found)
			| ParseErrorKind::ExpectedType(found) => found == "end of file",
			_ => false,
		}
	}
}

/// The shapes of syntax error the parser reports.
#[derive(Debug, PartialEq)]
pub enum ParseErrorKind {
	/// A specific token was required and something else was found.
	Expected { expected: String, found: String },
	/// A position where an expression must start held something else.
	ExpectedExpression(String),
	/// A position where a type must start held something else.
	ExpectedType(String),
	/// Comparison operators do not chain: `a < b < c` is rejected.
	ChainedComparison,
	/// An f-string hole carries a malformed format specifier.
	InvalidFormatSpec(String),
}

impl std::fmt::Display for ParseErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		use ParseErrorKind::*;
		match self {
			Expected { expected, found } => write!(f, "expected {expected}, found {found}"),
			ExpectedExpression(found) => write!(f, "expected expression, found {found}"),
			ExpectedType(found) => write!(f, "expected type, found {found}"),
			ChainedComparison => write!(f, "comparison operators cannot be chained"),
			InvalidFormatSpec(spec) => write!(f, "invalid format specifier '{spec}'"),
		}
	}
}
