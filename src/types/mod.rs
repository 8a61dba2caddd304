//! The Noxy type universe and its compatibility rules.
//!
//! Types are a closed set: primitives, arrays (with or without a static
//! length), maps over hashable primitive keys, nominal structs, and
//! nullable references. `Null` is the type of the `null` literal alone;
//! it is accepted wherever a reference is expected and nowhere else.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
	Int,
	Float,
	Str,
	Bool,
	/// Only valid as a function return type.
	Void,
	/// `size` is `Some` for `T[N]` and `None` for the growable `T[]`.
	/// Two array types agree when their element types do; the length is
	/// enforced against fixed-size literals, not in assignments.
	Array { element: Box<Type>, size: Option<usize> },
	Map { key: Box<Type>, value: Box<Type> },
	/// Nominal: identity is the declaration name.
	Struct(String),
	Ref(Box<Type>),
	/// The type of the `null` literal.
	Null,
}

impl Type {
	pub fn dynamic_array(element: Type) -> Self { Type::Array { element: Box::new(element), size: None } }

	pub fn fixed_array(element: Type, size: usize) -> Self {
		Type::Array { element: Box::new(element), size: Some(size) }
	}

	pub fn is_numeric(&self) -> bool { matches!(self, Type::Int | Type::Float) }

	pub fn is_container(&self) -> bool { matches!(self, Type::Array { .. } | Type::Map { .. }) }

	/// Map keys must be immutable and hashable.
	pub fn is_map_key(&self) -> bool { matches!(self, Type::Int | Type::Str | Type::Bool) }

	/// Strips one level of `ref`; field and index access auto-dereference.
	pub fn deref(&self) -> &Type {
		match self {
			Type::Ref(inner) => inner,
			other => other,
		}
	}

	/// Whether a value of type `actual` may occupy a slot declared as
	/// `self`. Structural equality, plus: `null` fills any reference,
	/// arrays agree on element type alone, and a plain struct or
	/// container may bind to a `ref` slot of its own type (taking a
	/// reference at a call boundary is implicit).
	pub fn accepts(&self, actual: &Type) -> bool {
		match (self, actual) {
			(Type::Ref(_), Type::Null) => true,
			(Type::Array { element: a, .. }, Type::Array { element: b, .. }) => a.accepts(b),
			(Type::Map { key: ka, value: va }, Type::Map { key: kb, value: vb }) => {
				ka.accepts(kb) && va.accepts(vb)
			}
			(Type::Ref(a), Type::Ref(b)) => a.accepts(b),
			(Type::Ref(a), b) if matches!(**a, Type::Struct(_)) || a.is_container() => a.accepts(b),
			_ => self == actual,
		}
	}
}

impl fmt::Display for Type {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Type::Int => write!(f, "int"),
			Type::Float => write!(f, "float"),
			Type::Str => write!(f, "string"),
			Type::Bool => write!(f, "bool"),
			Type::Void => write!(f, "void"),
			Type::Array { element, size: Some(n) } => write!(f, "{element}[{n}]"),
			Type::Array { element, size: None } => write!(f, "{element}[]"),
			Type::Map { key, value } => write!(f, "map[{key}, {value}]"),
			Type::Struct(name) => write!(f, "{name}"),
			Type::Ref(inner) => write!(f, "ref {inner}"),
			Type::Null => write!(f, "null"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn displays_types() {
		assert_eq!(Type::Int.to_string(), "int");
		assert_eq!(Type::fixed_array(Type::Int, 5).to_string(), "int[5]");
		assert_eq!(Type::dynamic_array(Type::Str).to_string(), "string[]");
		assert_eq!(
			Type::Map { key: Box::new(Type::Str), value: Box::new(Type::Int) }.to_string(),
			"map[string, int]"
		);
		assert_eq!(Type::Ref(Box::new(Type::Struct("Node".into()))).to_string(), "ref Node");
	}

	#[test]
	fn no_numeric_promotion() {
		assert!(Type::Int.accepts(&Type::Int));
		assert!(!Type::Int.accepts(&Type::Float));
		assert!(!Type::Float.accepts(&Type::Int));
	}

	#[test]
	fn null_fills_references_only() {
		let node_ref = Type::Ref(Box::new(Type::Struct("Node".into())));
		assert!(node_ref.accepts(&Type::Null));
		assert!(!Type::Int.accepts(&Type::Null));
		assert!(!Type::Struct("Node".into()).accepts(&Type::Null));
	}

	#[test]
	fn arrays_agree_on_element_type() {
		let fixed = Type::fixed_array(Type::Int, 4);
		let dynamic = Type::dynamic_array(Type::Int);
		assert!(dynamic.accepts(&fixed));
		assert!(fixed.accepts(&dynamic));
		assert!(!fixed.accepts(&Type::fixed_array(Type::Float, 4)));
	}

	#[test]
	fn ref_accepts_its_bare_target() {
		let c = Type::Struct("C".into());
		let ref_c = Type::Ref(Box::new(c.clone()));
		assert!(ref_c.accepts(&c));
		assert!(ref_c.accepts(&ref_c));
		assert!(!ref_c.accepts(&Type::Struct("D".into())));

		let arr_ref = Type::Ref(Box::new(Type::dynamic_array(Type::Int)));
		assert!(arr_ref.accepts(&Type::fixed_array(Type::Int, 3)));
	}
}
