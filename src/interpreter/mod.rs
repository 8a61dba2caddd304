//! The tree-walking evaluator.
//!
//! Statements evaluate to an explicit [`Signal`] — `Normal`, `Return` or
//! `Break` — which each loop and call frame inspects and either consumes
//! or re-propagates. Runtime errors travel separately as `Result` errors,
//! so control flow never hides inside the error channel.
//!
//! The call rule is where the language's character lives: primitives and
//! handles bind by copy, structs and containers bind by *deep* copy, and
//! `ref`-typed parameters bind the caller's handle. Deep copy is defined
//! once ([`Interpreter::deep_copy`]) and driven by declared types, so a
//! `ref` field inside a copied struct shares its target instead of
//! duplicating it.

pub(crate) mod builtins;
pub(crate) mod value;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use builtins::Builtin;
use value::{ArrayValue, MapValue, StructValue, Value};

use crate::environment::{Binding, Environment, FunctionEntry, ModuleScope};
use crate::error::NoxyError;
use crate::error::interpreter::{RuntimeError, RuntimeErrorKind};
use crate::error::module::{ModuleError, ModuleErrorKind};
use crate::modules::{ModuleKind, ModuleLoader, ModuleUnit};
use crate::parser::expression::{BinaryOp, CallTarget, Expression, FStringPiece, UnaryOp};
use crate::scanner::Loc;
use crate::statement::{Program, Statement, StructDef, UseImport, UseStmt};
use crate::types::Type;
use crate::utils::Handle;

/// How a statement finished.
pub enum Signal {
	Normal,
	Return(Value),
	Break,
}

/// Soft cap on call depth; deep recursion reports instead of crashing.
const MAX_CALL_DEPTH: usize = 1000;

type Eval<T = Value> = Result<T, RuntimeError>;
type Exec = Result<Signal, RuntimeError>;

pub struct Interpreter {
	loader:  Handle<ModuleLoader>,
	env:     Environment,
	/// Instantiated modules keyed by canonical path; the reason a module's
	/// globals run once no matter how many times it is imported.
	modules: HashMap<PathBuf, Handle<ModuleScope>>,
	out:     Box<dyn Write>,
}

impl Interpreter {
	pub fn new(loader: Handle<ModuleLoader>, out: Box<dyn Write>) -> Self {
		let main = Handle::new(ModuleScope::default());
		Self { loader, env: Environment::new(main), modules: HashMap::new(), out }
	}

	/// Runs a program against the persistent global scope. Imports are
	/// processed first, then declarations are registered, then the
	/// remaining statements execute in order.
	pub fn run(&mut self, program: &Program) -> Result<(), NoxyError> {
		for statement in &program.statements {
			if let Statement::Use(use_stmt) = statement {
				self.import(use_stmt)?;
			}
		}

		let globals = self.env.globals();
		for statement in &program.statements {
			match statement {
				Statement::Struct(def) => {
					globals.borrow_mut().structs.insert(def.name.clone(), def.clone());
				}
				Statement::Func(def) => {
					globals.borrow_mut().functions.insert(
						def.name.clone(),
						FunctionEntry { decl: def.clone(), home: globals.clone() },
					);
				}
				_ => {}
			}
		}

		for statement in &program.statements {
			if matches!(statement, Statement::Use(_) | Statement::Struct(_) | Statement::Func(_)) {
				continue;
			}
			match self.execute(statement).map_err(|e| e.at(statement.loc()))? {
				Signal::Normal => {}
				// A stray top-level return ends the program.
				Signal::Return(_) | Signal::Break => break,
			}
		}
		Ok(())
	}

	// =====================================================================
	// Statements
	// =====================================================================

	fn execute(&mut self, statement: &Statement) -> Exec {
		match statement {
			Statement::Let { name, declared, initializer, .. }
			| Statement::Global { name, declared, initializer, .. } => {
				let value = self.eval_with(initializer, Some(declared))?;
				self.env.define(name, Binding { declared: declared.clone(), value });
				Ok(Signal::Normal)
			}
			Statement::Assign { target, value, loc } => {
				let context = match target {
					Expression::Identifier(name, _) => self.env.get(name).map(|b| b.declared),
					_ => None,
				};
				let value = self.eval_with(value, context.as_ref())?;
				self.assign(target, value, *loc)?;
				Ok(Signal::Normal)
			}
			Statement::Expression(expr) => {
				self.evaluate(expr)?;
				Ok(Signal::Normal)
			}
			Statement::If { condition, then_body, else_body, loc } => {
				if self.eval_condition(condition, *loc)? {
					self.run_block(then_body)
				} else {
					self.run_block(else_body)
				}
			}
			Statement::While { condition, body, loc } => {
				while self.eval_condition(condition, *loc)? {
					match self.run_block(body)? {
						Signal::Normal => {}
						Signal::Break => break,
						Signal::Return(value) => return Ok(Signal::Return(value)),
					}
				}
				Ok(Signal::Normal)
			}
			Statement::Return { value, .. } => {
				let value = match value {
					Some(expr) => self.evaluate(expr)?,
					None => Value::Void,
				};
				Ok(Signal::Return(value))
			}
			Statement::Break(_) => Ok(Signal::Break),
			// Declarations and imports are handled before execution.
			Statement::Func(_) | Statement::Struct(_) | Statement::Use(_) => Ok(Signal::Normal),
		}
	}

	/// A block body in a fresh nested scope.
	fn run_block(&mut self, body: &[Statement]) -> Exec {
		self.env.push_scope();
		let result = self.exec_all(body);
		self.env.pop_scope();
		result
	}

	fn exec_all(&mut self, body: &[Statement]) -> Exec {
		for statement in body {
			match self.execute(statement).map_err(|e| e.at(statement.loc()))? {
				Signal::Normal => {}
				signal => return Ok(signal),
			}
		}
		Ok(Signal::Normal)
	}

	fn eval_condition(&mut self, condition: &Expression, loc: Loc) -> Eval<bool> {
		match self.evaluate(condition)? {
			Value::Bool(b) => Ok(b),
			other => Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::WrongType { expected: "bool", found: other.type_label() },
			)),
		}
	}

	// =====================================================================
	// Assignment targets
	// =====================================================================

	fn assign(&mut self, target: &Expression, value: Value, loc: Loc) -> Eval<()> {
		match target {
			Expression::Identifier(name, _) => {
				if !self.env.set(name, value) {
					return Err(RuntimeError::new(
						loc,
						RuntimeErrorKind::UndefinedVariable(name.clone()),
					));
				}
				Ok(())
			}
			Expression::Field { object, field, loc } => {
				if let Some(scope) = self.namespace_scope(object) {
					let mut scope = scope.borrow_mut();
					match scope.vars.get_mut(field) {
						Some(binding) => {
							binding.value = value;
							return Ok(());
						}
						None => {
							return Err(RuntimeError::new(
								*loc,
								RuntimeErrorKind::UndefinedVariable(field.clone()),
							));
						}
					}
				}
				match self.evaluate(object)? {
					Value::Struct(instance) => {
						if !instance.borrow_mut().set(field, value) {
							let type_name = instance.borrow().type_name.clone();
							return Err(RuntimeError::new(
								*loc,
								RuntimeErrorKind::NoSuchField { type_name, field: field.clone() },
							));
						}
						Ok(())
					}
					Value::Null => Err(RuntimeError::new(*loc, RuntimeErrorKind::NullAccess)),
					other => Err(RuntimeError::new(
						*loc,
						RuntimeErrorKind::WrongType { expected: "struct", found: other.type_label() },
					)),
				}
			}
			Expression::Index { object, index, loc } => {
				let object = self.evaluate(object)?;
				let index = self.evaluate(index)?;
				match object {
					Value::Array(array) => {
						let mut array = array.borrow_mut();
						let slot = Self::array_index(&array.elements, &index, *loc)?;
						array.elements[slot] = value;
						Ok(())
					}
					Value::Map(map) => {
						let key = builtins::map_key(&index).map_err(|e| e.at(*loc))?;
						map.borrow_mut().entries.insert(key, value);
						Ok(())
					}
					Value::Null => Err(RuntimeError::new(*loc, RuntimeErrorKind::NullAccess)),
					other => Err(RuntimeError::new(
						*loc,
						RuntimeErrorKind::WrongType { expected: "array or map", found: other.type_label() },
					)),
				}
			}
			_ => Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::WrongType { expected: "assignable slot", found: "expression".into() },
			)),
		}
	}

	fn array_index(elements: &[Value], index: &Value, loc: Loc) -> Eval<usize> {
		let Value::Int(i) = index else {
			return Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::WrongType { expected: "int", found: index.type_label() },
			));
		};
		if *i < 0 || *i as usize >= elements.len() {
			return Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::IndexOutOfBounds { index: *i, length: elements.len() },
			));
		}
		Ok(*i as usize)
	}

	// =====================================================================
	// Expressions
	// =====================================================================

	fn evaluate(&mut self, expr: &Expression) -> Eval {
		self.eval_with(expr, None)
	}

	/// `expected` gives context-dependent literals (array and map
	/// literals, `zeros`) their element types.
	fn eval_with(&mut self, expr: &Expression, expected: Option<&Type>) -> Eval {
		match expr {
			Expression::Int(n, _) => Ok(Value::Int(*n)),
			Expression::Float(x, _) => Ok(Value::Float(*x)),
			Expression::Str(s, _) => Ok(Value::Str(s.clone())),
			Expression::Bool(b, _) => Ok(Value::Bool(*b)),
			Expression::Null(_) => Ok(Value::Null),
			Expression::Group(inner, _) => self.eval_with(inner, expected),
			Expression::Identifier(name, loc) => match self.env.get(name) {
				Some(binding) => Ok(binding.value),
				None => Err(RuntimeError::new(*loc, RuntimeErrorKind::UndefinedVariable(name.clone()))),
			},
			Expression::Binary { left, op, right, loc } => self.eval_binary(left, *op, right, *loc),
			Expression::Unary { op, operand, loc } => {
				let value = self.evaluate(operand)?;
				match (op, value) {
					(UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
					(UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
					(UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
					(UnaryOp::Neg, other) => Err(RuntimeError::new(
						*loc,
						RuntimeErrorKind::WrongType { expected: "number", found: other.type_label() },
					)),
					(UnaryOp::Not, other) => Err(RuntimeError::new(
						*loc,
						RuntimeErrorKind::WrongType { expected: "bool", found: other.type_label() },
					)),
				}
			}
			Expression::Array(elements, _) => {
				let (element_type, fixed) = match expected.map(Type::deref) {
					Some(Type::Array { element, size }) => (Some(&**element), size.is_some()),
					_ => (None, false),
				};
				let mut values = Vec::with_capacity(elements.len());
				for element in elements {
					values.push(self.eval_with(element, element_type)?);
				}
				Ok(Value::Array(Handle::new(ArrayValue { elements: values, fixed })))
			}
			Expression::Map(entries, loc) => {
				let value_type = match expected.map(Type::deref) {
					Some(Type::Map { value, .. }) => Some(&**value),
					_ => None,
				};
				let mut map = MapValue::default();
				for (key_expr, value_expr) in entries {
					let key = self.evaluate(key_expr)?;
					let key = builtins::map_key(&key).map_err(|e| e.at(*loc))?;
					let value = self.eval_with(value_expr, value_type)?;
					map.entries.insert(key, value);
				}
				Ok(Value::Map(Handle::new(map)))
			}
			Expression::Zeros(size, loc) => {
				let size = match self.evaluate(size)? {
					Value::Int(n) if n < 0 => {
						return Err(RuntimeError::new(*loc, RuntimeErrorKind::NegativeLength(n)));
					}
					Value::Int(n) => n as usize,
					other => {
						return Err(RuntimeError::new(
							*loc,
							RuntimeErrorKind::WrongType { expected: "int", found: other.type_label() },
						));
					}
				};
				let default = match expected.map(Type::deref) {
					Some(Type::Array { element, .. }) => Value::default_for(element),
					_ => Some(Value::Int(0)),
				};
				let Some(default) = default else {
					return Err(RuntimeError::new(
						*loc,
						RuntimeErrorKind::WrongType { expected: "defaultable element", found: "other".into() },
					));
				};
				Ok(Value::Array(Handle::new(ArrayValue {
					elements: vec![default; size],
					fixed:    true,
				})))
			}
			// A reference is the handle itself; evaluating the target of
			// `ref` yields exactly that handle.
			Expression::Ref(inner, _) => self.evaluate(inner),
			Expression::FString(pieces, _) => {
				let mut rendered = String::new();
				for piece in pieces {
					match piece {
						FStringPiece::Text(text) => rendered.push_str(text),
						FStringPiece::Hole { expr, spec } => {
							let value = self.evaluate(expr)?;
							match spec {
								Some(spec) => rendered.push_str(&builtins::format_value(&value, spec)),
								None => rendered.push_str(&value.to_string()),
							}
						}
					}
				}
				Ok(Value::Str(rendered))
			}
			Expression::Field { object, field, loc } => self.eval_field(object, field, *loc),
			Expression::Index { object, index, loc } => self.eval_index(object, index, *loc),
			Expression::Call { callee, arguments, resolved, loc } => {
				self.eval_call(callee, arguments, resolved.get(), *loc)
			}
		}
	}

	fn eval_binary(&mut self, left: &Expression, op: BinaryOp, right: &Expression, loc: Loc) -> Eval {
		use BinaryOp::*;

		// `&` and `|` short-circuit; the right side may never run.
		if matches!(op, And | Or) {
			let lhs = match self.evaluate(left)? {
				Value::Bool(b) => b,
				other => {
					return Err(RuntimeError::new(
						loc,
						RuntimeErrorKind::WrongType { expected: "bool", found: other.type_label() },
					));
				}
			};
			if (op == And && !lhs) || (op == Or && lhs) {
				return Ok(Value::Bool(lhs));
			}
			return match self.evaluate(right)? {
				Value::Bool(b) => Ok(Value::Bool(b)),
				other => Err(RuntimeError::new(
					loc,
					RuntimeErrorKind::WrongType { expected: "bool", found: other.type_label() },
				)),
			};
		}

		let lhs = self.evaluate(left)?;
		let rhs = self.evaluate(right)?;

		if matches!(op, Eq) {
			return Ok(Value::Bool(lhs.equals(&rhs)));
		}
		if matches!(op, Neq) {
			return Ok(Value::Bool(!lhs.equals(&rhs)));
		}

		match (lhs, rhs) {
			(Value::Int(a), Value::Int(b)) => match op {
				Add => Ok(Value::Int(a.wrapping_add(b))),
				Sub => Ok(Value::Int(a.wrapping_sub(b))),
				Mul => Ok(Value::Int(a.wrapping_mul(b))),
				Div if b == 0 => Err(RuntimeError::new(loc, RuntimeErrorKind::DivisionByZero)),
				Div => Ok(Value::Int(a.wrapping_div(b))),
				Mod if b == 0 => Err(RuntimeError::new(loc, RuntimeErrorKind::DivisionByZero)),
				// Result keeps the dividend's sign.
				Mod => Ok(Value::Int(a.wrapping_rem(b))),
				Gt => Ok(Value::Bool(a > b)),
				Lt => Ok(Value::Bool(a < b)),
				Gte => Ok(Value::Bool(a >= b)),
				Lte => Ok(Value::Bool(a <= b)),
				_ => unreachable!("logical and equality handled above"),
			},
			(Value::Float(a), Value::Float(b)) => match op {
				Add => Ok(Value::Float(a + b)),
				Sub => Ok(Value::Float(a - b)),
				Mul => Ok(Value::Float(a * b)),
				// IEEE semantics: division by zero is inf/NaN, no trap.
				Div => Ok(Value::Float(a / b)),
				Mod => Ok(Value::Float(a % b)),
				Gt => Ok(Value::Bool(a > b)),
				Lt => Ok(Value::Bool(a < b)),
				Gte => Ok(Value::Bool(a >= b)),
				Lte => Ok(Value::Bool(a <= b)),
				_ => unreachable!("logical and equality handled above"),
			},
			(Value::Str(a), Value::Str(b)) => match op {
				Add => Ok(Value::Str(a + &b)),
				Gt => Ok(Value::Bool(a > b)),
				Lt => Ok(Value::Bool(a < b)),
				Gte => Ok(Value::Bool(a >= b)),
				Lte => Ok(Value::Bool(a <= b)),
				_ => Err(RuntimeError::new(
					loc,
					RuntimeErrorKind::WrongType { expected: "numbers", found: "string".into() },
				)),
			},
			(lhs, _) => Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::WrongType { expected: "matching operands", found: lhs.type_label() },
			)),
		}
	}

	fn eval_field(&mut self, object: &Expression, field: &str, loc: Loc) -> Eval {
		if let Some(scope) = self.namespace_scope(object) {
			let scope = scope.borrow();
			return match scope.vars.get(field) {
				Some(binding) => Ok(binding.value.clone()),
				None => Err(RuntimeError::new(loc, RuntimeErrorKind::UndefinedVariable(field.to_string()))),
			};
		}
		match self.evaluate(object)? {
			Value::Struct(instance) => {
				let instance = instance.borrow();
				match instance.get(field) {
					Some(value) => Ok(value.clone()),
					None => Err(RuntimeError::new(
						loc,
						RuntimeErrorKind::NoSuchField {
							type_name: instance.type_name.clone(),
							field:     field.to_string(),
						},
					)),
				}
			}
			Value::Null => Err(RuntimeError::new(loc, RuntimeErrorKind::NullAccess)),
			other => Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::WrongType { expected: "struct", found: other.type_label() },
			)),
		}
	}

	fn eval_index(&mut self, object: &Expression, index: &Expression, loc: Loc) -> Eval {
		let object = self.evaluate(object)?;
		let index = self.evaluate(index)?;
		match object {
			Value::Array(array) => {
				let array = array.borrow();
				let slot = Self::array_index(&array.elements, &index, loc)?;
				Ok(array.elements[slot].clone())
			}
			Value::Map(map) => {
				let key = builtins::map_key(&index).map_err(|e| e.at(loc))?;
				match map.borrow().entries.get(&key) {
					Some(value) => Ok(value.clone()),
					None => Err(RuntimeError::new(loc, RuntimeErrorKind::KeyNotFound(key.to_string()))),
				}
			}
			Value::Str(s) => {
				let Value::Int(i) = index else {
					return Err(RuntimeError::new(
						loc,
						RuntimeErrorKind::WrongType { expected: "int", found: index.type_label() },
					));
				};
				let length = s.chars().count();
				if i < 0 || i as usize >= length {
					return Err(RuntimeError::new(
						loc,
						RuntimeErrorKind::IndexOutOfBounds { index: i, length },
					));
				}
				match s.chars().nth(i as usize) {
					Some(c) => Ok(Value::Str(c.to_string())),
					None => Err(RuntimeError::new(
						loc,
						RuntimeErrorKind::IndexOutOfBounds { index: i, length },
					)),
				}
			}
			Value::Null => Err(RuntimeError::new(loc, RuntimeErrorKind::NullAccess)),
			other => Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::WrongType { expected: "array, map or string", found: other.type_label() },
			)),
		}
	}

	// =====================================================================
	// Calls
	// =====================================================================

	fn eval_call(
		&mut self,
		callee: &Expression,
		arguments: &[Expression],
		resolved: CallTarget,
		loc: Loc,
	) -> Eval {
		if let Expression::Identifier(name, _) = callee {
			let globals = self.env.globals();
			match resolved {
				CallTarget::Constructor => {
					let def = globals.borrow().structs.get(name).cloned();
					match def {
						Some(def) => return self.construct(&def, arguments, loc),
						None => {}
					}
				}
				CallTarget::Function => {
					let entry = globals.borrow().functions.get(name).cloned();
					if let Some(entry) = entry {
						return self.call_function(entry, arguments, loc);
					}
				}
				CallTarget::Builtin => {
					if let Some(builtin) = Builtin::from_name(name) {
						return self.call_builtin(builtin, arguments, loc);
					}
				}
				CallTarget::Unresolved => {}
			}

			// Dynamic resolution, in the same order the analyzer uses:
			// struct constructor, user function, built-in.
			let def = globals.borrow().structs.get(name).cloned();
			if let Some(def) = def {
				return self.construct(&def, arguments, loc);
			}
			let entry = globals.borrow().functions.get(name).cloned();
			if let Some(entry) = entry {
				return self.call_function(entry, arguments, loc);
			}
			if let Some(builtin) = Builtin::from_name(name) {
				return self.call_builtin(builtin, arguments, loc);
			}
			return Err(RuntimeError::new(loc, RuntimeErrorKind::UndefinedFunction(name.clone())));
		}

		if let Expression::Field { object, field, .. } = callee {
			if let Some(scope) = self.namespace_scope(object) {
				let entry = scope.borrow().functions.get(field).cloned();
				if let Some(entry) = entry {
					return self.call_function(entry, arguments, loc);
				}
				let def = scope.borrow().structs.get(field).cloned();
				if let Some(def) = def {
					return self.construct(&def, arguments, loc);
				}
				return Err(RuntimeError::new(loc, RuntimeErrorKind::UndefinedFunction(field.clone())));
			}
		}

		let value = self.evaluate(callee)?;
		Err(RuntimeError::new(loc, RuntimeErrorKind::NotCallable(value.type_label())))
	}

	/// Struct construction: a fresh instance, arguments stored into the
	/// fields in declaration order.
	fn construct(&mut self, def: &Rc<StructDef>, arguments: &[Expression], loc: Loc) -> Eval {
		if arguments.len() != def.fields.len() {
			return Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::ArityMismatch {
					name:     def.name.clone(),
					expected: def.fields.len(),
					found:    arguments.len(),
				},
			));
		}
		let mut fields = Vec::with_capacity(def.fields.len());
		for (field, argument) in def.fields.iter().zip(arguments) {
			let value = self.eval_with(argument, Some(&field.r#type))?;
			fields.push((field.name.clone(), value));
		}
		Ok(Value::Struct(Handle::new(StructValue { type_name: def.name.clone(), fields })))
	}

	fn call_function(&mut self, entry: FunctionEntry, arguments: &[Expression], loc: Loc) -> Eval {
		let def = entry.decl;
		if arguments.len() != def.params.len() {
			return Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::ArityMismatch {
					name:     def.name.clone(),
					expected: def.params.len(),
					found:    arguments.len(),
				},
			));
		}
		if self.env.depth() >= MAX_CALL_DEPTH {
			return Err(RuntimeError::new(loc, RuntimeErrorKind::StackOverflow));
		}

		// Arguments evaluate in the caller's environment, then bind by
		// the parameter's declared type.
		let mut bound = Vec::with_capacity(def.params.len());
		for (param, argument) in def.params.iter().zip(arguments) {
			let value = self.eval_with(argument, Some(&param.r#type))?;
			let value = self.bind_by_type(value, &param.r#type, &entry.home);
			bound.push(Binding { declared: param.r#type.clone(), value });
		}

		// The frame roots at the defining module's globals, never at the
		// caller's scope.
		self.env.push_frame(entry.home.clone());
		for (param, binding) in def.params.iter().zip(bound) {
			self.env.define(&param.name, binding);
		}
		let result = self.exec_all(&def.body);
		self.env.pop_frame();

		match result? {
			Signal::Return(value) => Ok(value),
			_ => Ok(Value::Void),
		}
	}

	/// The call-boundary binding rule: scalars and `ref` parameters copy
	/// the value or handle as-is, structs and containers deep-copy.
	fn bind_by_type(&self, value: Value, declared: &Type, home: &Handle<ModuleScope>) -> Value {
		match declared {
			Type::Ref(_) => value,
			Type::Struct(_) | Type::Array { .. } | Type::Map { .. } => {
				self.deep_copy(&value, declared, home)
			}
			_ => value,
		}
	}

	/// Deep copy driven by declared types: primitives copy scalar-wise,
	/// `ref` fields copy the handle (the target stays shared), struct
	/// and container interiors recurse.
	fn deep_copy(&self, value: &Value, declared: &Type, home: &Handle<ModuleScope>) -> Value {
		match (value, declared.deref()) {
			(Value::Struct(instance), Type::Struct(name)) => {
				let def = home.borrow().structs.get(name).cloned();
				let instance = instance.borrow();
				let fields = instance
					.fields
					.iter()
					.map(|(field_name, field_value)| {
						let field_type = def
							.as_ref()
							.and_then(|d| d.field(field_name))
							.map(|f| f.r#type.clone());
						let copied = match field_type {
							Some(Type::Ref(_)) => field_value.clone(),
							Some(field_type) => self.deep_copy(field_value, &field_type, home),
							// Unchecked programs may hold values with no
							// matching declaration; copy by shape.
							None => self.deep_copy_by_shape(field_value),
						};
						(field_name.clone(), copied)
					})
					.collect();
				Value::Struct(Handle::new(StructValue { type_name: instance.type_name.clone(), fields }))
			}
			(Value::Array(array), Type::Array { element, .. }) => {
				let array = array.borrow();
				let elements =
					array.elements.iter().map(|e| self.deep_copy(e, element, home)).collect();
				Value::Array(Handle::new(ArrayValue { elements, fixed: array.fixed }))
			}
			(Value::Map(map), Type::Map { value: value_type, .. }) => {
				let map = map.borrow();
				let entries = map
					.entries
					.iter()
					.map(|(k, v)| (k.clone(), self.deep_copy(v, value_type, home)))
					.collect();
				Value::Map(Handle::new(MapValue { entries }))
			}
			_ => value.clone(),
		}
	}

	/// Type-blind fallback for values whose declarations are unknown.
	fn deep_copy_by_shape(&self, value: &Value) -> Value {
		match value {
			Value::Array(array) => {
				let array = array.borrow();
				let elements = array.elements.iter().map(|e| self.deep_copy_by_shape(e)).collect();
				Value::Array(Handle::new(ArrayValue { elements, fixed: array.fixed }))
			}
			Value::Map(map) => {
				let entries = map
					.borrow()
					.entries
					.iter()
					.map(|(k, v)| (k.clone(), self.deep_copy_by_shape(v)))
					.collect();
				Value::Map(Handle::new(MapValue { entries }))
			}
			Value::Struct(instance) => {
				let instance = instance.borrow();
				let fields = instance
					.fields
					.iter()
					.map(|(n, v)| (n.clone(), self.deep_copy_by_shape(v)))
					.collect();
				Value::Struct(Handle::new(StructValue { type_name: instance.type_name.clone(), fields }))
			}
			other => other.clone(),
		}
	}

	fn call_builtin(&mut self, builtin: Builtin, arguments: &[Expression], loc: Loc) -> Eval {
		if arguments.len() != builtin.arity() {
			return Err(RuntimeError::new(
				loc,
				RuntimeErrorKind::ArityMismatch {
					name:     builtin.name().to_string(),
					expected: builtin.arity(),
					found:    arguments.len(),
				},
			));
		}
		let mut values = Vec::with_capacity(arguments.len());
		for argument in arguments {
			values.push(self.evaluate(argument)?);
		}

		if builtin == Builtin::Print {
			let rendered = values[0].to_string();
			writeln!(self.out, "{rendered}").map_err(|e| {
				RuntimeError::new(loc, RuntimeErrorKind::WriteFailed(e.to_string()))
			})?;
			return Ok(Value::Void);
		}
		builtin.call(&values).map_err(|e| e.at(loc))
	}

	// =====================================================================
	// Modules
	// =====================================================================

	/// Resolves a dotted chain of identifiers to an imported namespace in
	/// the current module scope. Variables shadow namespaces.
	fn namespace_scope(&self, expr: &Expression) -> Option<Handle<ModuleScope>> {
		match expr {
			Expression::Identifier(name, _) if self.env.get(name).is_none() => {
				self.env.globals().borrow().namespaces.get(name).cloned()
			}
			Expression::Field { object, field, .. } => {
				let parent = self.namespace_scope(object)?;
				let child = parent.borrow().namespaces.get(field).cloned();
				child
			}
			_ => None,
		}
	}

	fn import(&mut self, use_stmt: &UseStmt) -> Result<(), NoxyError> {
		let unit = self.loader.borrow_mut().load(&use_stmt.path, use_stmt.loc)?;
		let scope = self.instantiate(&unit)?;
		let current = self.env.globals();

		match &use_stmt.import {
			UseImport::Namespace(alias) => {
				let name = alias.clone().unwrap_or_else(|| unit.name.clone());
				current.borrow_mut().namespaces.insert(name, scope);
			}
			UseImport::Select(names) => {
				for name in names {
					Self::import_symbol(&current, &scope, &unit.path, name, use_stmt)?;
				}
			}
			UseImport::Wildcard => match &unit.kind {
				ModuleKind::File(_) => {
					let exports: Vec<String> = {
						let scope = scope.borrow();
						scope
							.functions
							.keys()
							.chain(scope.structs.keys())
							.chain(scope.vars.keys())
							.cloned()
							.collect()
					};
					for name in exports {
						Self::import_symbol(&current, &scope, &unit.path, &name, use_stmt)?;
					}
				}
				ModuleKind::Dir(_) => {
					let children: Vec<(String, Handle<ModuleScope>)> = scope
						.borrow()
						.namespaces
						.iter()
						.map(|(n, s)| (n.clone(), s.clone()))
						.collect();
					for (name, child) in children {
						current.borrow_mut().namespaces.insert(name, child);
					}
				}
			},
		}
		Ok(())
	}

	fn import_symbol(
		current: &Handle<ModuleScope>,
		scope: &Handle<ModuleScope>,
		path: &Path,
		name: &str,
		use_stmt: &UseStmt,
	) -> Result<(), NoxyError> {
		let origin = (path.to_path_buf(), name.to_string());
		let source = scope.borrow();
		let mut target = current.borrow_mut();

		// A name may be bound once: a second binding is ambiguous unless
		// it repeats the exact same import.
		if target.functions.contains_key(name)
			|| target.structs.contains_key(name)
			|| target.vars.contains_key(name)
		{
			return match target.imports.get(name) {
				Some(previous) if *previous == origin => Ok(()),
				_ => Err(ModuleError::new(
					use_stmt.loc,
					ModuleErrorKind::AmbiguousImport {
						module: use_stmt.dotted(),
						symbol: name.to_string(),
					},
				)
				.into()),
			};
		}

		if let Some(entry) = source.functions.get(name) {
			target.functions.insert(name.to_string(), entry.clone());
		} else if let Some(def) = source.structs.get(name) {
			target.structs.insert(name.to_string(), def.clone());
		} else if let Some(binding) = source.vars.get(name) {
			target.vars.insert(name.to_string(), binding.clone());
		} else {
			return Err(ModuleError::new(
				use_stmt.loc,
				ModuleErrorKind::UnknownExport { module: use_stmt.dotted(), symbol: name.to_string() },
			)
			.into());
		}
		target.imports.insert(name.to_string(), origin);
		Ok(())
	}

	/// Builds the runtime scope of a module: registers its declarations,
	/// processes its imports, and evaluates its `global` initializers —
	/// exactly once per canonical path.
	fn instantiate(&mut self, unit: &Rc<ModuleUnit>) -> Result<Handle<ModuleScope>, NoxyError> {
		if let Some(scope) = self.modules.get(&unit.path) {
			return Ok(scope.clone());
		}

		let scope = Handle::new(ModuleScope::default());
		match &unit.kind {
			ModuleKind::File(program) => {
				self.env.push_module_frame(scope.clone());
				let result = (|| -> Result<(), NoxyError> {
					for statement in &program.statements {
						if let Statement::Use(nested) = statement {
							self.import(nested)?;
						}
					}
					for statement in &program.statements {
						match statement {
							Statement::Struct(def) => {
								scope.borrow_mut().structs.insert(def.name.clone(), def.clone());
							}
							Statement::Func(def) => {
								scope.borrow_mut().functions.insert(
									def.name.clone(),
									FunctionEntry { decl: def.clone(), home: scope.clone() },
								);
							}
							_ => {}
						}
					}
					// Only globals run at import time; other top-level
					// statements belong to the module's author, not to
					// every importer.
					for statement in &program.statements {
						if matches!(statement, Statement::Global { .. }) {
							self.execute(statement).map_err(|e| e.at(statement.loc()))?;
						}
					}
					Ok(())
				})();
				self.env.pop_frame();
				result?;
			}
			ModuleKind::Dir(children) => {
				for (name, child) in children {
					let child_scope = self.instantiate(child)?;
					scope.borrow_mut().namespaces.insert(name.clone(), child_scope);
				}
			}
		}

		self.modules.insert(unit.path.clone(), scope.clone());
		Ok(scope)
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;
	use crate::parser::Parser;
	use crate::scanner::Scanner;

	#[derive(Clone, Default)]
	struct Sink(Rc<RefCell<Vec<u8>>>);

	impl Write for Sink {
		fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
			self.0.borrow_mut().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
	}

	fn run(source: &str) -> Result<String, NoxyError> {
		let tokens = Scanner::new(source).scan_tokens()?;
		let program = Parser::new(tokens).parse()?;
		let loader = Handle::new(ModuleLoader::new("."));
		let sink = Sink::default();
		let mut interpreter = Interpreter::new(loader, Box::new(sink.clone()));
		interpreter.run(&program)?;
		let bytes = sink.0.borrow().clone();
		Ok(String::from_utf8(bytes).expect("program output is UTF-8"))
	}

	fn out(source: &str) -> String {
		run(source).unwrap()
	}

	fn err(source: &str) -> String {
		run(source).unwrap_err().to_string()
	}

	#[test]
	fn arithmetic_and_printing() {
		assert_eq!(out("print(1 + 2 * 3)"), "7\n");
		assert_eq!(out("print(10 / 3)"), "3\n");
		assert_eq!(out("print(-7 % 3)"), "-1\n");
		assert_eq!(out("print(7 % -3)"), "1\n");
		assert_eq!(out("print(1.5 + 2.25)"), "3.750000\n");
		assert_eq!(out("print(\"a\" + \"b\")"), "ab\n");
		assert_eq!(out("print(true)"), "true\n");
	}

	#[test]
	fn division_by_zero_is_fatal_for_ints_only() {
		assert!(err("print(1 / 0)").contains("division by zero"));
		assert!(err("print(1 % 0)").contains("division by zero"));
		assert_eq!(out("print(1.0 / 0.0 > 100.0)"), "true\n");
	}

	#[test]
	fn let_assign_and_scoping() {
		assert_eq!(out("let x: int = 1\nx = x + 1\nprint(x)"), "2\n");
		assert_eq!(
			out("let x: int = 1\nif true then\n let x: int = 9\n print(x)\nend\nprint(x)"),
			"9\n1\n"
		);
	}

	#[test]
	fn while_break_and_signals() {
		let source = "let i: int = 0\nwhile true do\n i = i + 1\n if i == 3 then\n  break\n end\nend\nprint(i)";
		assert_eq!(out(source), "3\n");
	}

	#[test]
	fn functions_and_recursion() {
		let source = "func fib(n: int) -> int\n if n < 2 then\n  return n\n end\n return fib(n - 1) + fib(n - 2)\nend\nprint(fib(10))";
		assert_eq!(out(source), "55\n");
	}

	#[test]
	fn void_functions_return_nothing() {
		let source = "func hello(name: string)\n print(\"hi \" + name)\n return\n print(\"never\")\nend\nhello(\"zoe\")";
		assert_eq!(out(source), "hi zoe\n");
	}

	#[test]
	fn call_frames_root_at_globals_not_caller() {
		let source = "global g: int = 10\nfunc f() -> int\n return g\nend\nfunc caller() -> int\n let g_local: int = 99\n return f()\nend\nprint(caller())";
		assert_eq!(out(source), "10\n");
	}

	#[test]
	fn struct_parameters_copy_deeply() {
		let source = "struct C\n valor: int\nend\nfunc incC(c: C)\n c.valor = c.valor + 1\nend\nfunc incR(c: ref C)\n c.valor = c.valor + 1\nend\nlet x: C = C(10)\nincC(x)\nprint(x.valor)\nincR(x)\nprint(x.valor)";
		assert_eq!(out(source), "10\n11\n");
	}

	#[test]
	fn ref_fields_stay_shared_through_deep_copy() {
		let source = "struct Inner\n v: int\nend\nstruct Outer\n name: string\n inner: ref Inner\nend\nfunc poke(o: Outer)\n o.inner.v = 42\n o.name = \"copy\"\nend\nlet i: Inner = Inner(1)\nlet o: Outer = Outer(\"orig\", ref i)\npoke(o)\nprint(o.name)\nprint(i.v)";
		assert_eq!(out(source), "orig\n42\n");
	}

	#[test]
	fn arrays_copy_by_value_unless_ref() {
		let source = "func wipe(a: int[])\n a[0] = 99\nend\nfunc wipeRef(a: ref int[])\n a[0] = 99\nend\nlet xs: int[3] = [1, 2, 3]\nwipe(xs)\nprint(xs[0])\nwipeRef(ref xs)\nprint(xs[0])";
		assert_eq!(out(source), "1\n99\n");
	}

	#[test]
	fn assignment_aliases_containers() {
		let source = "let a: int[] = [1, 2]\nlet b: int[] = a\nb[0] = 9\nprint(a[0])";
		assert_eq!(out(source), "9\n");
	}

	#[test]
	fn reference_equality() {
		let source = "struct C\n v: int\nend\nlet x: C = C(1)\nlet r: ref C = ref x\nprint(ref x == ref x)\nprint(r == null)\nlet s: ref C = null\nprint(s == null)";
		assert_eq!(out(source), "true\nfalse\ntrue\n");
	}

	#[test]
	fn short_circuit_skips_effects() {
		let source = "func loud() -> bool\n print(\"ran\")\n return true\nend\nlet a: bool = false & loud()\nlet b: bool = true | loud()\nprint(a)\nprint(b)";
		assert_eq!(out(source), "false\ntrue\n");
	}

	#[test]
	fn array_bounds() {
		assert!(err("let a: int[2] = [1, 2]\nprint(a[2])").contains("out of bounds"));
		assert!(err("let a: int[2] = [1, 2]\nprint(a[0 - 1])").contains("out of bounds"));
		assert!(err("let s: string = \"ab\"\nprint(s[2])").contains("out of bounds"));
	}

	#[test]
	fn string_indexing_by_code_point() {
		assert_eq!(out("let s: string = \"héllo\"\nprint(s[1])"), "é\n");
		assert_eq!(out("print(strlen(\"héllo\"))"), "5\n");
		assert_eq!(out("print(ord(\"A\"))"), "65\n");
	}

	#[test]
	fn dynamic_arrays_grow_and_shrink() {
		let source = "let d: int[] = []\nappend(d, 1)\nappend(d, 2)\nprint(length(d))\nprint(pop(d))\nprint(contains(d, 1))\nprint(contains(d, 2))";
		assert_eq!(out(source), "2\n2\ntrue\nfalse\n");
	}

	#[test]
	fn fixed_arrays_refuse_growth() {
		assert!(err("let a: int[2] = [1, 2]\nappend(a, 3)").contains("fixed-size"));
	}

	#[test]
	fn maps_insert_read_and_delete() {
		let source = "let m: map[string, int] = {}\nm[\"a\"] = 1\nm[\"a\"] = 2\nm[\"b\"] = 3\nprint(m[\"a\"])\nprint(length(m))\nprint(has_key(m, \"b\"))\ndelete(m, \"b\")\nprint(has_key(m, \"b\"))\nprint(keys(m))";
		assert_eq!(out(source), "2\n2\ntrue\nfalse\n[a]\n");
	}

	#[test]
	fn map_read_of_absent_key_fails() {
		assert!(err("let m: map[string, int] = {}\nprint(m[\"ghost\"])").contains("no key"));
	}

	#[test]
	fn zeros_defaults_by_context() {
		assert_eq!(out("let a: int[3] = zeros(3)\nprint(a)"), "[0, 0, 0]\n");
		assert_eq!(out("let a: float[2] = zeros(2)\nprint(a)"), "[0.000000, 0.000000]\n");
		assert_eq!(out("let a: bool[2] = zeros(2)\nprint(a)"), "[false, false]\n");
		assert_eq!(out("let a: string[1] = zeros(1)\nprint(strlen(a[0]))"), "0\n");
		assert_eq!(out("let a: int[0] = zeros(0)\nprint(length(a))"), "0\n");
	}

	#[test]
	fn fstring_rendering() {
		assert_eq!(out("let n: int = 42\nprint(f\"{n:05} {n:x}\")"), "00042 2a\n");
		assert_eq!(out("let p: float = 3.14159\nprint(f\"{p:.2f}\")"), "3.14\n");
		assert_eq!(out("print(f\"\")"), "\n");
		assert_eq!(out("let n: int = 7\nprint(f\"{n}\" + \" \" + to_str(n))"), "7 7\n");
		assert_eq!(out("let s: string = \"x\"\nprint(f\"<{s}>\")"), "<x>\n");
	}

	#[test]
	fn struct_rendering_matches_canonical_form() {
		let source = "struct P\n x: int\n y: float\nend\nprint(to_str(P(1, 2.5)))";
		assert_eq!(out(source), "P(x=1, y=2.500000)\n");
	}

	#[test]
	fn linked_list_traversal() {
		let source = "struct Node\n valor: int\n proximo: ref Node\nend\nlet n3: Node = Node(3, null)\nlet n2: Node = Node(2, ref n3)\nlet n1: Node = Node(1, ref n2)\nlet cursor: ref Node = ref n1\nwhile cursor != null do\n print(cursor.valor)\n cursor = cursor.proximo\nend";
		assert_eq!(out(source), "1\n2\n3\n");
	}

	#[test]
	fn null_access_is_fatal() {
		let source = "struct Node\n v: int\n next: ref Node\nend\nlet n: Node = Node(1, null)\nprint(n.next.v)";
		assert!(err(source).contains("null reference"));
	}

	#[test]
	fn stack_overflow_reports_cleanly() {
		let handle = std::thread::Builder::new()
			.stack_size(64 * 1024 * 1024)
			.spawn(|| err("func f() -> int\n return f()\nend\nprint(f())"))
			.expect("spawn test thread");
		let message = handle.join().expect("no panic while recursing");
		assert!(message.contains("stack overflow"));
	}

	#[test]
	fn wrapping_arithmetic() {
		assert_eq!(
			out("let big: int = 9223372036854775807\nprint(big + 1)"),
			"-9223372036854775808\n"
		);
	}
}
