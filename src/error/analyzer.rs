use crate::scanner::Loc;

/// A static typing error with its source position.
#[derive(thiserror::Error, Debug)]
#[error("{loc}: type error: {kind}")]
pub struct TypeError {
	loc:  Loc,
	kind: TypeErrorKind,
}

impl TypeError {
	pub(crate) fn new(loc: Loc, kind: TypeErrorKind) -> Self { Self { loc, kind } }
}

/// Everything the analyzer rejects before evaluation. Types are carried as
/// rendered strings so diagnostics stay printable without the type model.
#[derive(Debug, PartialEq)]
pub enum TypeErrorKind {
	UndefinedVariable(String),
	UndefinedFunction(String),
	UndefinedStruct(String),
	/// A second `func`, `struct` or variable declaration under a taken name.
	DuplicateDeclaration(String),
	/// Initializer or assigned value does not match the declared slot type.
	DeclarationMismatch { name: String, declared: String, found: String },
	AssignMismatch { target: String, found: String },
	InvalidAssignmentTarget,
	/// `if`/`while` conditions must be bool.
	ConditionNotBool { context: &'static str, found: String },
	OperandMismatch { op: String, left: String, right: String },
	OperandNotNumeric { op: String, found: String },
	OperandNotBool { op: String, found: String },
	NotIndexable(String),
	IndexMismatch { expected: String, found: String },
	NoSuchField { type_name: String, field: String },
	NotAStruct(String),
	NotCallable(String),
	ArityMismatch { name: String, expected: usize, found: usize },
	ArgumentMismatch { name: String, index: usize, expected: String, found: String },
	ReturnMismatch { expected: String, found: String },
	/// A non-void function with a path that falls off the end.
	MissingReturn(String),
	/// `ref` applied to something that is not a struct or container l-value.
	InvalidRefTarget,
	/// A struct embedding itself by value; only `ref` self-reference works.
	SelfEmbedding(String),
	/// `global`, `func`, `struct` and `use` may not appear inside blocks.
	OnlyTopLevel(&'static str),
	ReturnOutsideFunction,
	BreakOutsideLoop,
	/// `ref` types may only point at structs and containers.
	InvalidRefType(String),
	/// `zeros` needs an element type with a zero value.
	NonDefaultableElement(String),
	/// `void` (and the null type) cannot be a slot type.
	NotStorable(String),
	/// Map keys are restricted to int, string and bool.
	InvalidMapKeyType(String),
	/// An empty array or map literal in a position with no declared type.
	UnknownElementType,
	/// A fixed-size array initializer with the wrong element count.
	FixedLengthMismatch { expected: usize, found: usize },
	HeterogeneousArray { first: String, found: String },
	/// A format specifier applied to a hole of an incompatible type.
	FormatSpecMismatch { spec: String, found: String },
	NoSuchMember { module: String, name: String },
}

impl std::fmt::Display for TypeErrorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		use TypeErrorKind::*;
		match self {
			UndefinedVariable(name) => write!(f, "variable '{name}' is not defined"),
			UndefinedFunction(name) => write!(f, "function '{name}' is not defined"),
			UndefinedStruct(name) => write!(f, "struct '{name}' is not defined"),
			DuplicateDeclaration(name) => write!(f, "'{name}' is already declared in this scope"),
			DeclarationMismatch { name, declared, found } => {
				write!(f, "cannot assign '{found}' to variable '{name}' declared '{declared}'")
			}
			AssignMismatch { target, found } => {
				write!(f, "cannot assign '{found}' to a slot of type '{target}'")
			}
			InvalidAssignmentTarget => write!(f, "invalid assignment target"),
			ConditionNotBool { context, found } => {
				write!(f, "{context} condition must be 'bool', found '{found}'")
			}
			OperandMismatch { op, left, right } => {
				write!(f, "operator '{op}' requires matching operands, found '{left}' and '{right}'")
			}
			OperandNotNumeric { op, found } => {
				write!(f, "operator '{op}' requires numeric operands, found '{found}'")
			}
			OperandNotBool { op, found } => {
				write!(f, "operator '{op}' requires bool operands, found '{found}'")
			}
			NotIndexable(found) => write!(f, "type '{found}' cannot be indexed"),
			IndexMismatch { expected, found } => {
				write!(f, "index must be '{expected}', found '{found}'")
			}
			NoSuchField { type_name, field } => {
				write!(f, "struct '{type_name}' has no field '{field}'")
			}
			NotAStruct(found) => write!(f, "type '{found}' has no fields"),
			NotCallable(found) => write!(f, "'{found}' is not callable"),
			ArityMismatch { name, expected, found } => {
				write!(f, "'{name}' expects {expected} arguments, found {found}")
			}
			ArgumentMismatch { name, index, expected, found } => {
				write!(f, "argument {index} of '{name}' must be '{expected}', found '{found}'")
			}
			ReturnMismatch { expected, found } => {
				write!(f, "function must return '{expected}', found '{found}'")
			}
			MissingReturn(name) => {
				write!(f, "function '{name}' does not return a value on every path")
			}
			InvalidRefTarget => write!(f, "'ref' requires a struct or container l-value"),
			SelfEmbedding(name) => {
				write!(f, "struct '{name}' cannot contain itself by value; use 'ref {name}'")
			}
			OnlyTopLevel(what) => write!(f, "'{what}' is only valid at top level"),
			ReturnOutsideFunction => write!(f, "'return' outside of a function"),
			BreakOutsideLoop => write!(f, "'break' outside of a loop"),
			InvalidRefType(inner) => {
				write!(f, "'ref {inner}' is invalid; references point at structs or containers")
			}
			NonDefaultableElement(element) => {
				write!(f, "zeros() cannot produce elements of type '{element}'")
			}
			NotStorable(found) => write!(f, "'{found}' is not a storable value type"),
			InvalidMapKeyType(found) => {
				write!(f, "map keys must be 'int', 'string' or 'bool', found '{found}'")
			}
			UnknownElementType => write!(f, "cannot infer the element type of an empty literal here"),
			FixedLengthMismatch { expected, found } => {
				write!(f, "fixed-size array of length {expected} initialized with {found} elements")
			}
			HeterogeneousArray { first, found } => {
				write!(f, "array elements must share one type, found '{first}' and '{found}'")
			}
			FormatSpecMismatch { spec, found } => {
				write!(f, "format specifier '{spec}' cannot be applied to '{found}'")
			}
			NoSuchMember { module, name } => {
				write!(f, "module '{module}' has no member '{name}'")
			}
		}
	}
}
