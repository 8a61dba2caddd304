use std::cell::Cell;
use std::fmt;

use crate::scanner::Loc;

/// An expression node. Every variant records the position of the token
/// that introduced it.
#[derive(Debug)]
pub enum Expression {
	Int(i64, Loc),
	Float(f64, Loc),
	Str(String, Loc),
	Bool(bool, Loc),
	Null(Loc),
	Identifier(String, Loc),
	Binary { left: Box<Expression>, op: BinaryOp, right: Box<Expression>, loc: Loc },
	Unary { op: UnaryOp, operand: Box<Expression>, loc: Loc },
	/// `resolved` is written by the analyzer so the evaluator can skip
	/// name resolution; it stays `Unresolved` under `--no-typecheck`.
	Call { callee: Box<Expression>, arguments: Vec<Expression>, resolved: Cell<CallTarget>, loc: Loc },
	Index { object: Box<Expression>, index: Box<Expression>, loc: Loc },
	Field { object: Box<Expression>, field: String, loc: Loc },
	Array(Vec<Expression>, Loc),
	/// `{k: v, ...}` — the construction form for map values.
	Map(Vec<(Expression, Expression)>, Loc),
	Ref(Box<Expression>, Loc),
	FString(Vec<FStringPiece>, Loc),
	Zeros(Box<Expression>, Loc),
	Group(Box<Expression>, Loc),
}

impl Expression {
	pub fn boxed(self) -> Box<Self> { Box::new(self) }

	pub fn loc(&self) -> Loc {
		use Expression::*;
		match self {
			Int(_, loc) | Float(_, loc) | Str(_, loc) | Bool(_, loc) | Null(loc)
			| Identifier(_, loc) | Array(_, loc) | Map(_, loc) | Ref(_, loc) | FString(_, loc)
			| Zeros(_, loc) | Group(_, loc) => *loc,
			Binary { loc, .. } | Unary { loc, .. } | Call { loc, .. } | Index { loc, .. }
			| Field { loc, .. } => *loc,
		}
	}

	/// Whether this expression can designate an assignable slot. The
	/// analyzer still has to prove the slot exists and type-check it.
	pub fn is_lvalue(&self) -> bool {
		matches!(self, Expression::Identifier(..) | Expression::Field { .. } | Expression::Index { .. })
	}
}

/// How a call site was resolved by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CallTarget {
	#[default]
	Unresolved,
	Function,
	Constructor,
	Builtin,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Mod,
	Gt,
	Lt,
	Gte,
	Lte,
	Eq,
	Neq,
	And,
	Or,
}

impl BinaryOp {
	pub fn is_comparison(&self) -> bool {
		use BinaryOp::*;
		matches!(self, Gt | Lt | Gte | Lte | Eq | Neq)
	}
}

impl fmt::Display for BinaryOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use BinaryOp::*;
		let s = match self {
			Add => "+",
			Sub => "-",
			Mul => "*",
			Div => "/",
			Mod => "%",
			Gt => ">",
			Lt => "<",
			Gte => ">=",
			Lte => "<=",
			Eq => "==",
			Neq => "!=",
			And => "&",
			Or => "|",
		};
		write!(f, "{s}")
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
	Neg,
	Not,
}

impl fmt::Display for UnaryOp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", if *self == UnaryOp::Neg { "-" } else { "!" })
	}
}

/// One rendered segment of an f-string, with the hole expression already
/// parsed and its format spec already validated syntactically.
#[derive(Debug)]
pub enum FStringPiece {
	Text(String),
	Hole { expr: Box<Expression>, spec: Option<FormatSpec> },
}

/// A parsed `[0][width][.precision][type]` format specifier.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatSpec {
	pub zero_pad:  bool,
	pub width:     Option<usize>,
	pub precision: Option<usize>,
	pub kind:      Option<SpecKind>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpecKind {
	/// `x`
	Hex,
	/// `X`
	HexUpper,
	/// `o`
	Octal,
	/// `f`
	Fixed,
	/// `e`
	Scientific,
	/// `g`
	General,
}

impl SpecKind {
	pub fn is_integral(&self) -> bool {
		matches!(self, SpecKind::Hex | SpecKind::HexUpper | SpecKind::Octal)
	}
}

impl FormatSpec {
	/// Parses the raw spec text captured by the scanner. Returns `None`
	/// on anything outside the grammar.
	pub fn parse(raw: &str) -> Option<FormatSpec> {
		let mut spec = FormatSpec::default();
		let mut rest = raw;

		if let Some(stripped) = rest.strip_prefix('0') {
			if stripped.starts_with(|c: char| c.is_ascii_digit()) {
				spec.zero_pad = true;
				rest = stripped;
			}
		}
		let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
		if digits > 0 {
			spec.width = Some(rest[..digits].parse().ok()?);
			rest = &rest[digits..];
		}
		if let Some(stripped) = rest.strip_prefix('.') {
			let digits = stripped.len() - stripped.trim_start_matches(|c: char| c.is_ascii_digit()).len();
			if digits == 0 {
				return None;
			}
			spec.precision = Some(stripped[..digits].parse().ok()?);
			rest = &stripped[digits..];
		}
		spec.kind = match rest {
			"" => None,
			"x" => Some(SpecKind::Hex),
			"X" => Some(SpecKind::HexUpper),
			"o" => Some(SpecKind::Octal),
			"f" => Some(SpecKind::Fixed),
			"e" => Some(SpecKind::Scientific),
			"g" => Some(SpecKind::General),
			_ => return None,
		};
		Some(spec)
	}
}

impl fmt::Display for FormatSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.zero_pad {
			write!(f, "0")?;
		}
		if let Some(width) = self.width {
			write!(f, "{width}")?;
		}
		if let Some(precision) = self.precision {
			write!(f, ".{precision}")?;
		}
		if let Some(kind) = self.kind {
			let c = match kind {
				SpecKind::Hex => 'x',
				SpecKind::HexUpper => 'X',
				SpecKind::Octal => 'o',
				SpecKind::Fixed => 'f',
				SpecKind::Scientific => 'e',
				SpecKind::General => 'g',
			};
			write!(f, "{c}")?;
		}
		Ok(())
	}
}

/// Compact prefix rendering, used by parser tests.
impl fmt::Display for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use Expression::*;
		match self {
			Int(n, _) => write!(f, "{n}"),
			Float(x, _) => write!(f, "{x}"),
			Str(s, _) => write!(f, "\"{s}\""),
			Bool(b, _) => write!(f, "{b}"),
			Null(_) => write!(f, "null"),
			Identifier(name, _) => write!(f, "{name}"),
			Binary { left, op, right, .. } => write!(f, "({op} {left} {right})"),
			Unary { op, operand, .. } => write!(f, "({op} {operand})"),
			Call { callee, arguments, .. } => {
				write!(f, "(call {callee}")?;
				for arg in arguments {
					write!(f, " {arg}")?;
				}
				write!(f, ")")
			}
			Index { object, index, .. } => write!(f, "(index {object} {index})"),
			Field { object, field, .. } => write!(f, "(field {object} {field})"),
			Array(elements, _) => {
				write!(f, "(array")?;
				for e in elements {
					write!(f, " {e}")?;
				}
				write!(f, ")")
			}
			Map(entries, _) => {
				write!(f, "(map")?;
				for (k, v) in entries {
					write!(f, " {k}:{v}")?;
				}
				write!(f, ")")
			}
			Ref(inner, _) => write!(f, "(ref {inner})"),
			FString(pieces, _) => write!(f, "(fstring {} pieces)", pieces.len()),
			Zeros(size, _) => write!(f, "(zeros {size})"),
			Group(inner, _) => write!(f, "(group {inner})"),
		}
	}
}
