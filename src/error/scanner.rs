use crate::scanner::Loc;

/// A tokenization error with its source position.
#[derive(thiserror::Error, Debug)]
#[error("{loc}: lex error: {kind}")]
pub struct ScanError {
	loc:  Loc,
	kind: ScanErrorKind,
}

impl ScanError {
	pub(crate) fn new(loc: Loc, kind: ScanErrorKind) -> Self { Self { loc, kind } }
}

/// The conditions under which the scanner gives up.
#[derive(Debug, PartialEq)]
pub enum ScanErrorKind {
	/// A character that starts no token.
	UnexpectedCharacter(char),
	/// A string literal with no closing quote before newline/EOF.
	UnterminatedString,
	/// An f-string with no closing quote before newline/EOF.
	UnterminatedFString,
	/// An f-string hole `{` with no matching `}`.
	UnterminatedHole,
	/// A backslash escape outside the supported set.
	UnknownEscape(char),
	/// An integer literal that does not fit in 64 bits.
	IntegerOverflow(String),
}

impl std::fmt::Display for ScanErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		use ScanErrorKind::*;
		match self {
			UnexpectedCharacter(c) => write!(f, "unexpected character '{c}'"),
			UnterminatedString => write!(f, "unterminated string literal"),
			UnterminatedFString => write!(f, "unterminated f-string literal"),
			UnterminatedHole => write!(f, "unterminated '{{' in f-string"),
			UnknownEscape(c) => write!(f, "unknown escape sequence '\\{c}'"),
			IntegerOverflow(s) => write!(f, "integer literal '{s}' is out of range"),
		}
	}
}
