use std::collections::HashMap;
use std::fmt;

use crate::types::Type;
use crate::utils::Handle;

/// A runtime value. Scalars are stored inline; arrays, maps and struct
/// instances are handles, so cloning a `Value` never copies a container.
/// A reference-typed slot holds the same handle as the struct value it
/// refers to (or `Null`) — the declared types, not the runtime tags,
/// decide copy-versus-alias at call boundaries.
#[derive(Debug, Clone)]
pub enum Value {
	Int(i64),
	Float(f64),
	Str(String),
	Bool(bool),
	Null,
	Array(Handle<ArrayValue>),
	Map(Handle<MapValue>),
	Struct(Handle<StructValue>),
	/// The result of a `void` call; never storable.
	Void,
}

#[derive(Debug)]
pub struct ArrayValue {
	pub elements: Vec<Value>,
	/// Fixed-length arrays refuse `append`/`pop`.
	pub fixed:    bool,
}

#[derive(Debug, Default)]
pub struct MapValue {
	pub entries: HashMap<MapKey, Value>,
}

#[derive(Debug)]
pub struct StructValue {
	pub type_name: String,
	/// Declaration order, so rendering is stable.
	pub fields:    Vec<(String, Value)>,
}

impl StructValue {
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
	}

	pub fn set(&mut self, name: &str, value: Value) -> bool {
		match self.fields.iter_mut().find(|(n, _)| n == name) {
			Some((_, slot)) => {
				*slot = value;
				true
			}
			None => false,
		}
	}
}

/// A hashable map key. Only the immutable primitives qualify.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapKey {
	Bool(bool),
	Int(i64),
	Str(String),
}

impl MapKey {
	pub fn from_value(value: &Value) -> Option<MapKey> {
		match value {
			Value::Int(n) => Some(MapKey::Int(*n)),
			Value::Str(s) => Some(MapKey::Str(s.clone())),
			Value::Bool(b) => Some(MapKey::Bool(*b)),
			_ => None,
		}
	}

	pub fn to_value(&self) -> Value {
		match self {
			MapKey::Int(n) => Value::Int(*n),
			MapKey::Str(s) => Value::Str(s.clone()),
			MapKey::Bool(b) => Value::Bool(*b),
		}
	}
}

impl fmt::Display for MapKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.to_value()) }
}

impl Value {
	/// A short tag for diagnostics.
	pub fn type_label(&self) -> String {
		match self {
			Value::Int(_) => "int".to_string(),
			Value::Float(_) => "float".to_string(),
			Value::Str(_) => "string".to_string(),
			Value::Bool(_) => "bool".to_string(),
			Value::Null => "null".to_string(),
			Value::Array(_) => "array".to_string(),
			Value::Map(_) => "map".to_string(),
			Value::Struct(s) => s.borrow().type_name.clone(),
			Value::Void => "void".to_string(),
		}
	}

	/// `==` semantics: scalars by value, handles by identity, `null`
	/// equal only to itself.
	pub fn equals(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Null, _) | (_, Value::Null) => false,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => a == b,
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Array(a), Value::Array(b)) => a.same(b),
			(Value::Map(a), Value::Map(b)) => a.same(b),
			(Value::Struct(a), Value::Struct(b)) => a.same(b),
			_ => false,
		}
	}

	/// The zero value of a type, used by `zeros(n)`. Only primitives and
	/// references have one; the analyzer rejects other element types.
	pub fn default_for(r#type: &Type) -> Option<Value> {
		match r#type {
			Type::Int => Some(Value::Int(0)),
			Type::Float => Some(Value::Float(0.0)),
			Type::Str => Some(Value::Str(String::new())),
			Type::Bool => Some(Value::Bool(false)),
			Type::Ref(_) => Some(Value::Null),
			_ => None,
		}
	}
}

/// Reference cycles through `ref` fields would otherwise recurse forever.
const MAX_RENDER_DEPTH: usize = 16;

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, depth: usize) -> fmt::Result {
	if depth > MAX_RENDER_DEPTH {
		return write!(f, "...");
	}
	match value {
		Value::Int(n) => write!(f, "{n}"),
		Value::Float(x) => write!(f, "{x:.6}"),
		Value::Str(s) => write!(f, "{s}"),
		Value::Bool(b) => write!(f, "{b}"),
		Value::Null => write!(f, "null"),
		Value::Void => write!(f, "void"),
		Value::Array(array) => {
			write!(f, "[")?;
			for (i, element) in array.borrow().elements.iter().enumerate() {
				if i > 0 {
					write!(f, ", ")?;
				}
				write_value(f, element, depth + 1)?;
			}
			write!(f, "]")
		}
		Value::Map(map) => {
			let map = map.borrow();
			let mut keys: Vec<_> = map.entries.keys().collect();
			keys.sort();
			write!(f, "{{")?;
			for (i, key) in keys.into_iter().enumerate() {
				if i > 0 {
					write!(f, ", ")?;
				}
				write!(f, "{key}: ")?;
				write_value(f, &map.entries[key], depth + 1)?;
			}
			write!(f, "}}")
		}
		Value::Struct(instance) => {
			let instance = instance.borrow();
			write!(f, "{}(", instance.type_name)?;
			for (i, (name, field)) in instance.fields.iter().enumerate() {
				if i > 0 {
					write!(f, ", ")?;
				}
				write!(f, "{name}=")?;
				write_value(f, field, depth + 1)?;
			}
			write!(f, ")")
		}
	}
}

/// The canonical `to_str` rendering.
impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write_value(f, self, 0) }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_scalars() {
		assert_eq!(Value::Int(42).to_string(), "42");
		assert_eq!(Value::Float(3.14159).to_string(), "3.141590");
		assert_eq!(Value::Bool(true).to_string(), "true");
		assert_eq!(Value::Str("hi".into()).to_string(), "hi");
		assert_eq!(Value::Null.to_string(), "null");
	}

	#[test]
	fn renders_containers() {
		let array = Value::Array(Handle::new(ArrayValue {
			elements: vec![Value::Int(1), Value::Int(2)],
			fixed:    false,
		}));
		assert_eq!(array.to_string(), "[1, 2]");

		let mut entries = HashMap::new();
		entries.insert(MapKey::Str("b".into()), Value::Int(2));
		entries.insert(MapKey::Str("a".into()), Value::Int(1));
		let map = Value::Map(Handle::new(MapValue { entries }));
		assert_eq!(map.to_string(), "{a: 1, b: 2}");
	}

	#[test]
	fn renders_structs_in_declaration_order() {
		let instance = Value::Struct(Handle::new(StructValue {
			type_name: "Point".into(),
			fields:    vec![("x".into(), Value::Int(1)), ("y".into(), Value::Int(2))],
		}));
		assert_eq!(instance.to_string(), "Point(x=1, y=2)");
	}

	#[test]
	fn handle_equality_is_identity() {
		let a = Value::Struct(Handle::new(StructValue { type_name: "C".into(), fields: vec![] }));
		let b = a.clone();
		let c = Value::Struct(Handle::new(StructValue { type_name: "C".into(), fields: vec![] }));
		assert!(a.equals(&b));
		assert!(!a.equals(&c));
		assert!(!a.equals(&Value::Null));
		assert!(Value::Null.equals(&Value::Null));
	}

	#[test]
	fn cyclic_structs_render_without_overflow() {
		let node = Handle::new(StructValue { type_name: "Node".into(), fields: vec![] });
		node.borrow_mut().fields.push(("next".into(), Value::Struct(node.clone())));
		let rendered = Value::Struct(node).to_string();
		assert!(rendered.ends_with(")"));
	}
}
