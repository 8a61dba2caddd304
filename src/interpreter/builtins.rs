//! The built-in functions and the f-string formatting rules.
//!
//! Built-ins are resolved by name before user functions and dispatched
//! without a call frame. `print` is handled by the interpreter itself
//! because it owns the output sink; everything here is pure.

use crate::error::interpreter::{RuntimeError, RuntimeErrorKind};
use crate::interpreter::value::{ArrayValue, MapKey, Value};
use crate::parser::expression::{FormatSpec, SpecKind};
use crate::utils::Handle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Builtin {
	Print,
	ToStr,
	ToInt,
	ToFloat,
	Strlen,
	Ord,
	Length,
	Append,
	Pop,
	Contains,
	HasKey,
	Keys,
	Delete,
}

impl Builtin {
	pub fn from_name(name: &str) -> Option<Builtin> {
		use Builtin::*;
		Some(match name {
			"print" => Print,
			"to_str" => ToStr,
			"to_int" => ToInt,
			"to_float" => ToFloat,
			"strlen" => Strlen,
			"ord" => Ord,
			"length" => Length,
			"append" => Append,
			"pop" => Pop,
			"contains" => Contains,
			"has_key" => HasKey,
			"keys" => Keys,
			"delete" => Delete,
			_ => return None,
		})
	}

	pub fn name(&self) -> &'static str {
		use Builtin::*;
		match self {
			Print => "print",
			ToStr => "to_str",
			ToInt => "to_int",
			ToFloat => "to_float",
			Strlen => "strlen",
			Ord => "ord",
			Length => "length",
			Append => "append",
			Pop => "pop",
			Contains => "contains",
			HasKey => "has_key",
			Keys => "keys",
			Delete => "delete",
		}
	}

	pub fn arity(&self) -> usize {
		use Builtin::*;
		match self {
			Append | Contains | HasKey | Delete => 2,
			_ => 1,
		}
	}

	/// Evaluates every built-in except `print`. The caller has already
	/// checked the argument count.
	pub fn call(self, args: &[Value]) -> Result<Value, RuntimeError> {
		use Builtin::*;
		match (self, args) {
			(ToStr, [value]) => Ok(Value::Str(value.to_string())),
			(ToInt, [Value::Float(x)]) => Ok(Value::Int(*x as i64)),
			(ToInt, [other]) => Err(wrong_type("float", other)),
			(ToFloat, [Value::Int(n)]) => Ok(Value::Float(*n as f64)),
			(ToFloat, [other]) => Err(wrong_type("int", other)),
			(Strlen, [Value::Str(s)]) => Ok(Value::Int(s.chars().count() as i64)),
			(Strlen, [other]) => Err(wrong_type("string", other)),
			(Ord, [Value::Str(s)]) => {
				let mut chars = s.chars();
				match (chars.next(), chars.next()) {
					(Some(c), None) => Ok(Value::Int(c as i64)),
					_ => Err(RuntimeError::bare(RuntimeErrorKind::OrdExpectsChar(s.clone()))),
				}
			}
			(Ord, [other]) => Err(wrong_type("string", other)),
			(Length, [Value::Array(array)]) => Ok(Value::Int(array.borrow().elements.len() as i64)),
			(Length, [Value::Map(map)]) => Ok(Value::Int(map.borrow().entries.len() as i64)),
			(Length, [Value::Str(s)]) => Ok(Value::Int(s.chars().count() as i64)),
			(Length, [other]) => Err(wrong_type("container", other)),
			(Append, [Value::Array(array), item]) => {
				let mut array = array.borrow_mut();
				if array.fixed {
					return Err(RuntimeError::bare(RuntimeErrorKind::AppendToFixed));
				}
				array.elements.push(item.clone());
				Ok(Value::Void)
			}
			(Append, [other, _]) => Err(wrong_type("dynamic array", other)),
			(Pop, [Value::Array(array)]) => {
				let mut array = array.borrow_mut();
				if array.fixed {
					return Err(wrong_type("dynamic array", &args[0]));
				}
				array.elements.pop().ok_or_else(|| RuntimeError::bare(RuntimeErrorKind::PopFromEmpty))
			}
			(Pop, [other]) => Err(wrong_type("dynamic array", other)),
			(Contains, [Value::Array(array), item]) => {
				Ok(Value::Bool(array.borrow().elements.iter().any(|e| e.equals(item))))
			}
			(Contains, [other, _]) => Err(wrong_type("array", other)),
			(HasKey, [Value::Map(map), key]) => {
				let key = map_key(key)?;
				Ok(Value::Bool(map.borrow().entries.contains_key(&key)))
			}
			(HasKey, [other, _]) => Err(wrong_type("map", other)),
			(Keys, [Value::Map(map)]) => {
				let mut keys: Vec<MapKey> = map.borrow().entries.keys().cloned().collect();
				keys.sort();
				let elements = keys.iter().map(MapKey::to_value).collect();
				Ok(Value::Array(Handle::new(ArrayValue { elements, fixed: false })))
			}
			(Keys, [other]) => Err(wrong_type("map", other)),
			(Delete, [Value::Map(map), key]) => {
				let key = map_key(key)?;
				map.borrow_mut().entries.remove(&key);
				Ok(Value::Void)
			}
			(Delete, [other, _]) => Err(wrong_type("map", other)),
			(Print, _) => unreachable!("print is dispatched by the interpreter"),
			_ => Err(RuntimeError::bare(RuntimeErrorKind::ArityMismatch {
				name:     self.name().to_string(),
				expected: self.arity(),
				found:    args.len(),
			})),
		}
	}
}

fn wrong_type(expected: &'static str, found: &Value) -> RuntimeError {
	RuntimeError::bare(RuntimeErrorKind::WrongType { expected, found: found.type_label() })
}

pub(crate) fn map_key(value: &Value) -> Result<MapKey, RuntimeError> {
	MapKey::from_value(value).ok_or_else(|| wrong_type("map key", value))
}

// =========================================================================
// F-string formatting
// =========================================================================

/// Renders one f-string hole value against its parsed spec. Bare holes
/// use the canonical `to_str` rendering.
pub fn format_value(value: &Value, spec: &FormatSpec) -> String {
	let body = match (spec.kind, value) {
		(Some(SpecKind::Hex), Value::Int(n)) => format!("{n:x}"),
		(Some(SpecKind::HexUpper), Value::Int(n)) => format!("{n:X}"),
		(Some(SpecKind::Octal), Value::Int(n)) => format!("{n:o}"),
		(Some(SpecKind::Fixed), Value::Float(x)) => {
			format!("{:.*}", spec.precision.unwrap_or(6), x)
		}
		(Some(SpecKind::Scientific), Value::Float(x)) => scientific(*x, spec.precision.unwrap_or(6)),
		(Some(SpecKind::General), Value::Float(x)) => general(*x, spec.precision.unwrap_or(6)),
		(None, Value::Int(n)) => n.to_string(),
		// The analyzer guarantees spec/type agreement; anything else
		// falls back to the canonical rendering.
		_ => value.to_string(),
	};
	pad(body, spec)
}

/// Width padding: numbers right-align, `0`-width pads with zeros after
/// the sign. Values without a numeric body ignore the width.
fn pad(body: String, spec: &FormatSpec) -> String {
	let Some(width) = spec.width else { return body };
	if body.len() >= width {
		return body;
	}
	if spec.zero_pad {
		let (sign, digits) = match body.strip_prefix('-') {
			Some(rest) => ("-", rest),
			None => ("", body.as_str()),
		};
		return format!("{sign}{}{digits}", "0".repeat(width - digits.len() - sign.len()));
	}
	format!("{body:>width$}")
}

/// C-style `%e`: fixed mantissa precision, signed two-digit exponent.
fn scientific(value: f64, precision: usize) -> String {
	if !value.is_finite() {
		return value.to_string();
	}
	let raw = format!("{value:.precision$e}");
	match raw.split_once('e') {
		Some((mantissa, exponent)) => {
			let exponent: i32 = exponent.parse().unwrap_or(0);
			format!("{mantissa}e{}{:02}", if exponent < 0 { "-" } else { "+" }, exponent.abs())
		}
		None => raw,
	}
}

/// C-style `%g`: `precision` significant digits, exponent form outside
/// [1e-4, 10^precision), trailing zeros removed.
fn general(value: f64, precision: usize) -> String {
	if !value.is_finite() {
		return value.to_string();
	}
	let precision = precision.max(1);
	if value == 0.0 {
		return "0".to_string();
	}
	let exponent = value.abs().log10().floor() as i32;
	if exponent < -4 || exponent >= precision as i32 {
		let raw = scientific(value, precision - 1);
		match raw.split_once('e') {
			Some((mantissa, exp)) => format!("{}e{exp}", trim_zeros(mantissa)),
			None => raw,
		}
	} else {
		let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
		trim_zeros(&format!("{value:.decimals$}")).to_string()
	}
}

fn trim_zeros(text: &str) -> &str {
	if !text.contains('.') {
		return text;
	}
	text.trim_end_matches('0').trim_end_matches('.')
}

#[cfg(test)]
mod tests {
	use super::*;

	fn spec(raw: &str) -> FormatSpec {
		FormatSpec::parse(raw).unwrap()
	}

	#[test]
	fn resolves_names() {
		assert_eq!(Builtin::from_name("append"), Some(Builtin::Append));
		assert_eq!(Builtin::from_name("nope"), None);
		assert_eq!(Builtin::Append.arity(), 2);
		assert_eq!(Builtin::Print.arity(), 1);
	}

	#[test]
	fn integer_specs() {
		assert_eq!(format_value(&Value::Int(42), &spec("x")), "2a");
		assert_eq!(format_value(&Value::Int(42), &spec("X")), "2A");
		assert_eq!(format_value(&Value::Int(8), &spec("o")), "10");
		assert_eq!(format_value(&Value::Int(42), &spec("05")), "00042");
		assert_eq!(format_value(&Value::Int(42), &spec("5")), "   42");
		assert_eq!(format_value(&Value::Int(-42), &spec("05")), "-0042");
		assert_eq!(format_value(&Value::Int(123456), &spec("3")), "123456");
	}

	#[test]
	fn float_specs() {
		assert_eq!(format_value(&Value::Float(3.14159), &spec(".2f")), "3.14");
		assert_eq!(format_value(&Value::Float(3.14159), &spec("f")), "3.141590");
		assert_eq!(format_value(&Value::Float(3.14159), &spec(".2e")), "3.14e+00");
		assert_eq!(format_value(&Value::Float(0.00012), &spec(".1e")), "1.2e-04");
		assert_eq!(format_value(&Value::Float(0.0001), &spec("g")), "0.0001");
		assert_eq!(format_value(&Value::Float(0.00001), &spec("g")), "1e-05");
		assert_eq!(format_value(&Value::Float(1500000.0), &spec("g")), "1.5e+06");
		assert_eq!(format_value(&Value::Float(2.5), &spec("g")), "2.5");
	}

	#[test]
	fn pure_builtins() {
		assert!(matches!(Builtin::ToInt.call(&[Value::Float(3.9)]), Ok(Value::Int(3))));
		assert!(matches!(Builtin::ToInt.call(&[Value::Float(-3.9)]), Ok(Value::Int(-3))));
		assert!(matches!(Builtin::ToFloat.call(&[Value::Int(2)]), Ok(Value::Float(x)) if x == 2.0));
		assert!(matches!(Builtin::Strlen.call(&[Value::Str("héllo".into())]), Ok(Value::Int(5))));
		assert!(matches!(Builtin::Ord.call(&[Value::Str("A".into())]), Ok(Value::Int(65))));
		assert!(Builtin::Ord.call(&[Value::Str("AB".into())]).is_err());
		assert!(Builtin::ToInt.call(&[Value::Int(1)]).is_err());
	}

	#[test]
	fn array_builtins() {
		let array = Value::Array(Handle::new(ArrayValue { elements: vec![Value::Int(1)], fixed: false }));
		Builtin::Append.call(&[array.clone(), Value::Int(2)]).unwrap();
		assert!(matches!(Builtin::Length.call(&[array.clone()]), Ok(Value::Int(2))));
		assert!(matches!(Builtin::Contains.call(&[array.clone(), Value::Int(2)]), Ok(Value::Bool(true))));
		assert!(matches!(Builtin::Pop.call(&[array.clone()]), Ok(Value::Int(2))));

		let fixed = Value::Array(Handle::new(ArrayValue { elements: vec![], fixed: true }));
		assert!(Builtin::Append.call(&[fixed, Value::Int(1)]).is_err());

		let empty = Value::Array(Handle::new(ArrayValue { elements: vec![], fixed: false }));
		assert!(Builtin::Pop.call(&[empty]).is_err());
	}

	#[test]
	fn map_builtins() {
		let map = Value::Map(Handle::new(Default::default()));
		let Value::Map(cell) = &map else { unreachable!() };
		cell.borrow_mut().entries.insert(MapKey::Str("b".into()), Value::Int(2));
		cell.borrow_mut().entries.insert(MapKey::Str("a".into()), Value::Int(1));

		assert!(matches!(Builtin::HasKey.call(&[map.clone(), Value::Str("a".into())]), Ok(Value::Bool(true))));
		let Ok(Value::Array(keys)) = Builtin::Keys.call(&[map.clone()]) else { panic!() };
		let rendered: Vec<String> = keys.borrow().elements.iter().map(|k| k.to_string()).collect();
		assert_eq!(rendered, vec!["a", "b"]);

		Builtin::Delete.call(&[map.clone(), Value::Str("a".into())]).unwrap();
		assert!(matches!(Builtin::HasKey.call(&[map, Value::Str("a".into())]), Ok(Value::Bool(false))));
	}
}
