//! Static analysis: one pass over the AST before anything runs.
//!
//! The analyzer registers top-level declarations, resolves every name,
//! checks every type against the declared slots, verifies that non-void
//! functions return on all paths, validates f-string format specifiers
//! against their hole types, and tags call sites with the kind of target
//! they resolved to. Imported modules are loaded through the shared
//! loader and fully analyzed once, on first import.
//!
//! The first error aborts the run; evaluation never starts on a program
//! that failed analysis.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::NoxyError;
use crate::error::analyzer::{TypeError, TypeErrorKind};
use crate::error::module::{ModuleError, ModuleErrorKind};
use crate::interpreter::builtins::Builtin;
use crate::interpreter::value::Value;
use crate::modules::{ModuleKind, ModuleLoader, ModuleUnit};
use crate::parser::expression::{BinaryOp, CallTarget, Expression, FStringPiece, FormatSpec, UnaryOp};
use crate::scanner::Loc;
use crate::statement::{FuncDef, Program, Statement, StructDef, UseImport, UseStmt};
use crate::types::Type;
use crate::utils::Handle;

/// The analyzed export surface of a loaded module.
pub struct ModuleInfo {
	pub name:      String,
	pub functions: HashMap<String, Rc<FuncDef>>,
	pub structs:   HashMap<String, Rc<StructDef>>,
	pub globals:   HashMap<String, Type>,
	/// Child namespaces of a directory module.
	pub children:  HashMap<String, Rc<ModuleInfo>>,
}

/// Per-module symbol tables; swapped out while a dependency is analyzed.
#[derive(Default)]
struct Tables {
	/// Variable types; index 0 is the module's global scope.
	scopes:     Vec<HashMap<String, Type>>,
	functions:  HashMap<String, Rc<FuncDef>>,
	structs:    HashMap<String, Rc<StructDef>>,
	namespaces: HashMap<String, Rc<ModuleInfo>>,
	/// Origin of names bound by selective import, as (module path,
	/// exported symbol). Distinguishes a repeated import (allowed) from
	/// an ambiguous one (rejected).
	imports:    HashMap<String, (PathBuf, String)>,
}

impl Tables {
	fn new() -> Self {
		Self { scopes: vec![HashMap::new()], ..Default::default() }
	}
}

pub struct Analyzer {
	loader:      Handle<ModuleLoader>,
	tables:      Tables,
	/// Return type of the function being checked, if any.
	return_type: Option<Type>,
	loop_depth:  usize,
	/// Analyzed modules keyed by canonical path.
	modules:     HashMap<PathBuf, Rc<ModuleInfo>>,
}

type Check<T = Type> = Result<T, TypeError>;

impl Analyzer {
	pub fn new(loader: Handle<ModuleLoader>) -> Self {
		Self {
			loader,
			tables: Tables::new(),
			return_type: None,
			loop_depth: 0,
			modules: HashMap::new(),
		}
	}

	/// Checks a whole program. State persists across calls so the REPL
	/// can feed one statement at a time.
	pub fn check_program(&mut self, program: &Program) -> Result<(), NoxyError> {
		// Declarations and imports first, so bodies and initializers can
		// refer to anything declared later in the file.
		for statement in &program.statements {
			match statement {
				Statement::Struct(def) => self.register_struct(def)?,
				Statement::Func(def) => self.register_func(def)?,
				Statement::Use(use_stmt) => self.check_use(use_stmt)?,
				_ => {}
			}
		}
		for statement in &program.statements {
			if let Statement::Struct(def) = statement {
				self.validate_struct_fields(def)?;
			}
		}
		for statement in &program.statements {
			self.check_statement(statement, true)?;
		}
		Ok(())
	}

	// =====================================================================
	// Declarations
	// =====================================================================

	fn register_struct(&mut self, def: &Rc<StructDef>) -> Check<()> {
		if self.tables.structs.contains_key(&def.name) || self.tables.functions.contains_key(&def.name) {
			return Err(TypeError::new(def.loc, TypeErrorKind::DuplicateDeclaration(def.name.clone())));
		}
		for (index, field) in def.fields.iter().enumerate() {
			if field.r#type == Type::Struct(def.name.clone()) {
				return Err(TypeError::new(def.loc, TypeErrorKind::SelfEmbedding(def.name.clone())));
			}
			if def.fields[..index].iter().any(|earlier| earlier.name == field.name) {
				return Err(TypeError::new(def.loc, TypeErrorKind::DuplicateDeclaration(field.name.clone())));
			}
		}
		self.tables.structs.insert(def.name.clone(), def.clone());
		Ok(())
	}

	fn validate_struct_fields(&self, def: &StructDef) -> Check<()> {
		for field in &def.fields {
			self.validate_type(&field.r#type, def.loc)?;
		}
		Ok(())
	}

	fn register_func(&mut self, def: &Rc<FuncDef>) -> Check<()> {
		if self.tables.functions.contains_key(&def.name)
			|| self.tables.structs.contains_key(&def.name)
			|| Builtin::from_name(&def.name).is_some()
		{
			return Err(TypeError::new(def.loc, TypeErrorKind::DuplicateDeclaration(def.name.clone())));
		}
		self.tables.functions.insert(def.name.clone(), def.clone());
		Ok(())
	}

	/// Rejects unusable slot types: unknown structs, bad map keys,
	/// references to non-struct non-container types, and `void`.
	fn validate_type(&self, r#type: &Type, loc: Loc) -> Check<()> {
		match r#type {
			Type::Int | Type::Float | Type::Str | Type::Bool => Ok(()),
			Type::Void | Type::Null => {
				Err(TypeError::new(loc, TypeErrorKind::NotStorable(r#type.to_string())))
			}
			Type::Array { element, .. } => self.validate_type(element, loc),
			Type::Map { key, value } => {
				if !key.is_map_key() {
					return Err(TypeError::new(loc, TypeErrorKind::InvalidMapKeyType(key.to_string())));
				}
				self.validate_type(value, loc)
			}
			Type::Struct(name) => match self.tables.structs.contains_key(name) {
				true => Ok(()),
				false => Err(TypeError::new(loc, TypeErrorKind::UndefinedStruct(name.clone()))),
			},
			Type::Ref(inner) => {
				if !matches!(**inner, Type::Struct(_)) && !inner.is_container() {
					return Err(TypeError::new(loc, TypeErrorKind::InvalidRefType(inner.to_string())));
				}
				self.validate_type(inner, loc)
			}
		}
	}

	// =====================================================================
	// Statements
	// =====================================================================

	fn check_statement(&mut self, statement: &Statement, top: bool) -> Result<(), NoxyError> {
		match statement {
			Statement::Let { name, declared, initializer, loc } => {
				self.validate_type(declared, *loc)?;
				let found = self.check_expression_with(initializer, Some(declared))?;
				if !declared.accepts(&found) {
					return Err(TypeError::new(
						*loc,
						TypeErrorKind::DeclarationMismatch {
							name:     name.clone(),
							declared: declared.to_string(),
							found:    found.to_string(),
						},
					)
					.into());
				}
				self.define_var(name, declared.clone(), *loc)?;
			}
			Statement::Global { name, declared, initializer, loc } => {
				if !top || self.return_type.is_some() {
					return Err(TypeError::new(*loc, TypeErrorKind::OnlyTopLevel("global")).into());
				}
				self.validate_type(declared, *loc)?;
				let found = self.check_expression_with(initializer, Some(declared))?;
				if !declared.accepts(&found) {
					return Err(TypeError::new(
						*loc,
						TypeErrorKind::DeclarationMismatch {
							name:     name.clone(),
							declared: declared.to_string(),
							found:    found.to_string(),
						},
					)
					.into());
				}
				if self.tables.scopes[0].contains_key(name) {
					return Err(
						TypeError::new(*loc, TypeErrorKind::DuplicateDeclaration(name.clone())).into()
					);
				}
				self.tables.scopes[0].insert(name.clone(), declared.clone());
			}
			Statement::Assign { target, value, loc } => {
				if !target.is_lvalue() {
					return Err(TypeError::new(*loc, TypeErrorKind::InvalidAssignmentTarget).into());
				}
				let target_type = self.check_expression(target)?;
				let found = self.check_expression_with(value, Some(&target_type))?;
				if !target_type.accepts(&found) {
					let kind = match target {
						Expression::Identifier(name, _) => TypeErrorKind::DeclarationMismatch {
							name:     name.clone(),
							declared: target_type.to_string(),
							found:    found.to_string(),
						},
						_ => TypeErrorKind::AssignMismatch {
							target: target_type.to_string(),
							found:  found.to_string(),
						},
					};
					return Err(TypeError::new(*loc, kind).into());
				}
			}
			Statement::Expression(expr) => {
				self.check_expression(expr)?;
			}
			Statement::If { condition, then_body, else_body, loc } => {
				let cond = self.check_expression(condition)?;
				if cond != Type::Bool {
					return Err(TypeError::new(
						*loc,
						TypeErrorKind::ConditionNotBool { context: "if", found: cond.to_string() },
					)
					.into());
				}
				self.check_block(then_body)?;
				self.check_block(else_body)?;
			}
			Statement::While { condition, body, loc } => {
				let cond = self.check_expression(condition)?;
				if cond != Type::Bool {
					return Err(TypeError::new(
						*loc,
						TypeErrorKind::ConditionNotBool { context: "while", found: cond.to_string() },
					)
					.into());
				}
				self.loop_depth += 1;
				let result = self.check_block(body);
				self.loop_depth -= 1;
				result?;
			}
			Statement::Return { value, loc } => {
				let Some(expected) = self.return_type.clone() else {
					return Err(TypeError::new(*loc, TypeErrorKind::ReturnOutsideFunction).into());
				};
				let found = match value {
					Some(expr) => self.check_expression_with(expr, Some(&expected))?,
					None => Type::Void,
				};
				let matches = match (&expected, &found) {
					(Type::Void, Type::Void) => true,
					(Type::Void, _) | (_, Type::Void) => false,
					_ => expected.accepts(&found),
				};
				if !matches {
					return Err(TypeError::new(
						*loc,
						TypeErrorKind::ReturnMismatch {
							expected: expected.to_string(),
							found:    found.to_string(),
						},
					)
					.into());
				}
			}
			Statement::Break(loc) => {
				if self.loop_depth == 0 {
					return Err(TypeError::new(*loc, TypeErrorKind::BreakOutsideLoop).into());
				}
			}
			Statement::Func(def) => {
				if !top {
					return Err(TypeError::new(def.loc, TypeErrorKind::OnlyTopLevel("func")).into());
				}
				self.check_func_body(def)?;
			}
			Statement::Struct(def) => {
				if !top {
					return Err(TypeError::new(def.loc, TypeErrorKind::OnlyTopLevel("struct")).into());
				}
			}
			Statement::Use(use_stmt) => {
				if !top {
					return Err(TypeError::new(use_stmt.loc, TypeErrorKind::OnlyTopLevel("use")).into());
				}
			}
		}
		Ok(())
	}

	fn check_block(&mut self, body: &[Statement]) -> Result<(), NoxyError> {
		self.tables.scopes.push(HashMap::new());
		let result = body.iter().try_for_each(|s| self.check_statement(s, false));
		self.tables.scopes.pop();
		result
	}

	fn check_func_body(&mut self, def: &Rc<FuncDef>) -> Result<(), NoxyError> {
		if def.return_type != Type::Void {
			self.validate_type(&def.return_type, def.loc)?;
		}

		let saved = self.return_type.replace(def.return_type.clone());
		let saved_loops = std::mem::take(&mut self.loop_depth);
		self.tables.scopes.push(HashMap::new());
		let result = (|| -> Result<(), NoxyError> {
			for param in &def.params {
				self.validate_type(&param.r#type, def.loc)?;
				self.define_var(&param.name, param.r#type.clone(), def.loc)?;
			}
			for statement in &def.body {
				self.check_statement(statement, false)?;
			}
			Ok(())
		})();
		self.tables.scopes.pop();
		self.return_type = saved;
		self.loop_depth = saved_loops;
		result?;

		if def.return_type != Type::Void && !returns_always(&def.body) {
			return Err(TypeError::new(def.loc, TypeErrorKind::MissingReturn(def.name.clone())).into());
		}
		Ok(())
	}

	fn define_var(&mut self, name: &str, r#type: Type, loc: Loc) -> Check<()> {
		let scope = self.tables.scopes.last_mut().expect("scope stack is never empty");
		if scope.contains_key(name) {
			return Err(TypeError::new(loc, TypeErrorKind::DuplicateDeclaration(name.to_string())));
		}
		scope.insert(name.to_string(), r#type);
		Ok(())
	}

	fn lookup_var(&self, name: &str) -> Option<&Type> {
		self.tables.scopes.iter().rev().find_map(|scope| scope.get(name))
	}

	// =====================================================================
	// Modules
	// =====================================================================

	fn check_use(&mut self, use_stmt: &UseStmt) -> Result<(), NoxyError> {
		let unit = self.loader.borrow_mut().load(&use_stmt.path, use_stmt.loc)?;
		let info = self.module_info(&unit)?;

		match &use_stmt.import {
			UseImport::Namespace(alias) => {
				let name = alias.clone().unwrap_or_else(|| unit.name.clone());
				self.tables.namespaces.insert(name, info);
			}
			UseImport::Select(names) => {
				for name in names {
					self.import_symbol(&info, &unit.path, name, use_stmt)?;
				}
			}
			UseImport::Wildcard => {
				if matches!(unit.kind, ModuleKind::File(_)) {
					let exports: Vec<String> = info
						.functions
						.keys()
						.chain(info.structs.keys())
						.chain(info.globals.keys())
						.cloned()
						.collect();
					for name in exports {
						self.import_symbol(&info, &unit.path, &name, use_stmt)?;
					}
				} else {
					// Directory: one namespace per child file.
					for (name, child) in &info.children {
						self.tables.namespaces.insert(name.clone(), child.clone());
					}
				}
			}
		}
		Ok(())
	}

	fn import_symbol(
		&mut self,
		info: &ModuleInfo,
		path: &Path,
		name: &str,
		use_stmt: &UseStmt,
	) -> Result<(), NoxyError> {
		let origin = (path.to_path_buf(), name.to_string());

		// A name may be bound once per scope, whether by declaration or by
		// import; a second binding is ambiguous unless it repeats the
		// exact same import.
		if self.tables.functions.contains_key(name)
			|| self.tables.structs.contains_key(name)
			|| self.tables.scopes[0].contains_key(name)
		{
			return match self.tables.imports.get(name) {
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

		if let Some(func) = info.functions.get(name) {
			self.tables.functions.insert(name.to_string(), func.clone());
		} else if let Some(def) = info.structs.get(name) {
			self.tables.structs.insert(name.to_string(), def.clone());
		} else if let Some(r#type) = info.globals.get(name) {
			self.tables.scopes[0].insert(name.to_string(), r#type.clone());
		} else {
			return Err(ModuleError::new(
				use_stmt.loc,
				ModuleErrorKind::UnknownExport { module: use_stmt.dotted(), symbol: name.to_string() },
			)
			.into());
		}
		self.tables.imports.insert(name.to_string(), origin);
		Ok(())
	}

	/// Analyzes a loaded module (recursively for directories), reusing
	/// the cache so each module is checked once per run.
	fn module_info(&mut self, unit: &Rc<ModuleUnit>) -> Result<Rc<ModuleInfo>, NoxyError> {
		if let Some(info) = self.modules.get(&unit.path) {
			return Ok(info.clone());
		}
		let info = match &unit.kind {
			ModuleKind::File(program) => {
				let saved_tables = std::mem::replace(&mut self.tables, Tables::new());
				let saved_return = self.return_type.take();
				let saved_loops = std::mem::take(&mut self.loop_depth);

				let result = self.check_program(program);

				let tables = std::mem::replace(&mut self.tables, saved_tables);
				self.return_type = saved_return;
				self.loop_depth = saved_loops;
				result?;

				// Exports are `func`, `struct` and `global` declarations;
				// a top-level `let` is module-private scratch state.
				let mut globals = HashMap::new();
				for statement in &program.statements {
					if let Statement::Global { name, declared, .. } = statement {
						globals.insert(name.clone(), declared.clone());
					}
				}
				Rc::new(ModuleInfo {
					name: unit.name.clone(),
					functions: tables.functions,
					structs: tables.structs,
					globals,
					children: HashMap::new(),
				})
			}
			ModuleKind::Dir(children) => {
				let mut infos = HashMap::new();
				for (name, child) in children {
					infos.insert(name.clone(), self.module_info(child)?);
				}
				Rc::new(ModuleInfo {
					name:      unit.name.clone(),
					functions: HashMap::new(),
					structs:   HashMap::new(),
					globals:   HashMap::new(),
					children:  infos,
				})
			}
		};
		self.modules.insert(unit.path.clone(), info.clone());
		Ok(info)
	}

	/// Resolves a dotted chain of identifiers to an imported namespace.
	/// Variables shadow namespaces.
	fn namespace_of(&self, expr: &Expression) -> Option<Rc<ModuleInfo>> {
		match expr {
			Expression::Identifier(name, _) if self.lookup_var(name).is_none() => {
				self.tables.namespaces.get(name).cloned()
			}
			Expression::Field { object, field, .. } => {
				self.namespace_of(object)?.children.get(field).cloned()
			}
			_ => None,
		}
	}

	// =====================================================================
	// Expressions
	// =====================================================================

	fn check_expression(&mut self, expr: &Expression) -> Check {
		self.check_expression_with(expr, None)
	}

	/// `expected` flows into literals whose type depends on context:
	/// array and map literals and `zeros`.
	fn check_expression_with(&mut self, expr: &Expression, expected: Option<&Type>) -> Check {
		match expr {
			Expression::Int(..) => Ok(Type::Int),
			Expression::Float(..) => Ok(Type::Float),
			Expression::Str(..) => Ok(Type::Str),
			Expression::Bool(..) => Ok(Type::Bool),
			Expression::Null(_) => Ok(Type::Null),
			Expression::Group(inner, _) => self.check_expression_with(inner, expected),
			Expression::Identifier(name, loc) => match self.lookup_var(name) {
				Some(r#type) => Ok(r#type.clone()),
				None => Err(TypeError::new(*loc, TypeErrorKind::UndefinedVariable(name.clone()))),
			},
			Expression::Binary { left, op, right, loc } => self.check_binary(left, *op, right, *loc),
			Expression::Unary { op, operand, loc } => {
				let found = self.check_expression(operand)?;
				match op {
					UnaryOp::Neg if found.is_numeric() => Ok(found),
					UnaryOp::Neg => Err(TypeError::new(
						*loc,
						TypeErrorKind::OperandNotNumeric { op: "-".into(), found: found.to_string() },
					)),
					UnaryOp::Not if found == Type::Bool => Ok(Type::Bool),
					UnaryOp::Not => Err(TypeError::new(
						*loc,
						TypeErrorKind::OperandNotBool { op: "!".into(), found: found.to_string() },
					)),
				}
			}
			Expression::Call { callee, arguments, resolved, loc } => {
				self.check_call(callee, arguments, resolved, *loc)
			}
			Expression::Index { object, index, loc } => self.check_index(object, index, *loc),
			Expression::Field { object, field, loc } => self.check_field(object, field, *loc),
			Expression::Array(elements, loc) => self.check_array_literal(elements, expected, *loc),
			Expression::Map(entries, loc) => self.check_map_literal(entries, expected, *loc),
			Expression::Ref(inner, loc) => {
				if !inner.is_lvalue() {
					return Err(TypeError::new(*loc, TypeErrorKind::InvalidRefTarget));
				}
				let found = self.check_expression(inner)?;
				if !matches!(found, Type::Struct(_)) && !found.is_container() {
					return Err(TypeError::new(*loc, TypeErrorKind::InvalidRefTarget));
				}
				Ok(Type::Ref(Box::new(found)))
			}
			Expression::FString(pieces, _) => {
				for piece in pieces {
					if let FStringPiece::Hole { expr, spec } = piece {
						let found = self.check_expression(expr)?;
						if let Some(spec) = spec {
							self.check_format_spec(spec, &found, expr.loc())?;
						}
						if found == Type::Void {
							return Err(TypeError::new(
								expr.loc(),
								TypeErrorKind::FormatSpecMismatch {
									spec:  String::new(),
									found: found.to_string(),
								},
							));
						}
					}
				}
				Ok(Type::Str)
			}
			Expression::Zeros(size, loc) => {
				let size_type = self.check_expression(size)?;
				if size_type != Type::Int {
					return Err(TypeError::new(
						*loc,
						TypeErrorKind::IndexMismatch { expected: "int".into(), found: size_type.to_string() },
					));
				}
				match expected.map(Type::deref) {
					Some(Type::Array { element, size }) => {
						if Value::default_for(element).is_none() {
							return Err(TypeError::new(
								*loc,
								TypeErrorKind::NonDefaultableElement(element.to_string()),
							));
						}
						Ok(Type::Array { element: element.clone(), size: *size })
					}
					_ => Ok(Type::dynamic_array(Type::Int)),
				}
			}
		}
	}

	fn check_format_spec(&self, spec: &FormatSpec, found: &Type, loc: Loc) -> Check<()> {
		let mismatch = || {
			TypeError::new(
				loc,
				TypeErrorKind::FormatSpecMismatch { spec: spec.to_string(), found: found.to_string() },
			)
		};
		match spec.kind {
			Some(kind) if kind.is_integral() => {
				if *found != Type::Int {
					return Err(mismatch());
				}
				if spec.precision.is_some() {
					return Err(mismatch());
				}
			}
			Some(_) => {
				if *found != Type::Float {
					return Err(mismatch());
				}
			}
			None => {
				// Precision only combines with a float spec kind.
				if spec.precision.is_some() {
					return Err(mismatch());
				}
			}
		}
		Ok(())
	}

	fn check_binary(&mut self, left: &Expression, op: BinaryOp, right: &Expression, loc: Loc) -> Check {
		use BinaryOp::*;
		let lhs = self.check_expression(left)?;
		let rhs = self.check_expression(right)?;

		match op {
			And | Or => {
				for side in [&lhs, &rhs] {
					if *side != Type::Bool {
						return Err(TypeError::new(
							loc,
							TypeErrorKind::OperandNotBool { op: op.to_string(), found: side.to_string() },
						));
					}
				}
				Ok(Type::Bool)
			}
			Eq | Neq => {
				if lhs.accepts(&rhs) || rhs.accepts(&lhs) {
					return Ok(Type::Bool);
				}
				Err(TypeError::new(
					loc,
					TypeErrorKind::OperandMismatch {
						op:    op.to_string(),
						left:  lhs.to_string(),
						right: rhs.to_string(),
					},
				))
			}
			Gt | Lt | Gte | Lte => {
				if lhs != rhs {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::OperandMismatch {
							op:    op.to_string(),
							left:  lhs.to_string(),
							right: rhs.to_string(),
						},
					));
				}
				if !lhs.is_numeric() && lhs != Type::Str {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::OperandNotNumeric { op: op.to_string(), found: lhs.to_string() },
					));
				}
				Ok(Type::Bool)
			}
			Add if lhs == Type::Str => {
				if rhs != Type::Str {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::OperandMismatch {
							op:    "+".into(),
							left:  lhs.to_string(),
							right: rhs.to_string(),
						},
					));
				}
				Ok(Type::Str)
			}
			Add | Sub | Mul | Div | Mod => {
				if lhs != rhs {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::OperandMismatch {
							op:    op.to_string(),
							left:  lhs.to_string(),
							right: rhs.to_string(),
						},
					));
				}
				if !lhs.is_numeric() {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::OperandNotNumeric { op: op.to_string(), found: lhs.to_string() },
					));
				}
				Ok(lhs)
			}
		}
	}

	fn check_index(&mut self, object: &Expression, index: &Expression, loc: Loc) -> Check {
		let object_type = self.check_expression(object)?;
		let index_type = self.check_expression(index)?;

		match object_type.deref() {
			Type::Array { element, .. } => {
				if index_type != Type::Int {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::IndexMismatch { expected: "int".into(), found: index_type.to_string() },
					));
				}
				Ok((**element).clone())
			}
			Type::Map { key, value } => {
				if !key.accepts(&index_type) {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::IndexMismatch {
							expected: key.to_string(),
							found:    index_type.to_string(),
						},
					));
				}
				Ok((**value).clone())
			}
			Type::Str => {
				if index_type != Type::Int {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::IndexMismatch { expected: "int".into(), found: index_type.to_string() },
					));
				}
				Ok(Type::Str)
			}
			other => Err(TypeError::new(loc, TypeErrorKind::NotIndexable(other.to_string()))),
		}
	}

	fn check_field(&mut self, object: &Expression, field: &str, loc: Loc) -> Check {
		if let Some(info) = self.namespace_of(object) {
			if let Some(r#type) = info.globals.get(field) {
				return Ok(r#type.clone());
			}
			return Err(TypeError::new(
				loc,
				TypeErrorKind::NoSuchMember { module: info.name.clone(), name: field.to_string() },
			));
		}

		let object_type = self.check_expression(object)?;
		match object_type.deref() {
			Type::Struct(name) => {
				let def = self
					.tables
					.structs
					.get(name)
					.ok_or_else(|| TypeError::new(loc, TypeErrorKind::UndefinedStruct(name.clone())))?;
				match def.field(field) {
					Some(f) => Ok(f.r#type.clone()),
					None => Err(TypeError::new(
						loc,
						TypeErrorKind::NoSuchField { type_name: name.clone(), field: field.to_string() },
					)),
				}
			}
			other => Err(TypeError::new(loc, TypeErrorKind::NotAStruct(other.to_string()))),
		}
	}

	fn check_array_literal(
		&mut self,
		elements: &[Expression],
		expected: Option<&Type>,
		loc: Loc,
	) -> Check {
		if let Some(Type::Array { element, size }) = expected.map(Type::deref) {
			for expr in elements {
				let found = self.check_expression_with(expr, Some(&**element))?;
				if !element.accepts(&found) {
					return Err(TypeError::new(
						expr.loc(),
						TypeErrorKind::HeterogeneousArray {
							first: element.to_string(),
							found: found.to_string(),
						},
					));
				}
			}
			if let Some(size) = size {
				if *size != elements.len() {
					return Err(TypeError::new(
						loc,
						TypeErrorKind::FixedLengthMismatch { expected: *size, found: elements.len() },
					));
				}
			}
			return Ok(Type::Array { element: element.clone(), size: *size });
		}

		let Some(first) = elements.first() else {
			return Err(TypeError::new(loc, TypeErrorKind::UnknownElementType));
		};
		let first_type = self.check_expression(first)?;
		for expr in &elements[1..] {
			let found = self.check_expression(expr)?;
			if !first_type.accepts(&found) {
				return Err(TypeError::new(
					expr.loc(),
					TypeErrorKind::HeterogeneousArray {
						first: first_type.to_string(),
						found: found.to_string(),
					},
				));
			}
		}
		Ok(Type::Array { element: Box::new(first_type), size: Some(elements.len()) })
	}

	fn check_map_literal(
		&mut self,
		entries: &[(Expression, Expression)],
		expected: Option<&Type>,
		loc: Loc,
	) -> Check {
		if let Some(Type::Map { key, value }) = expected.map(Type::deref) {
			for (key_expr, value_expr) in entries {
				let found_key = self.check_expression(key_expr)?;
				if !key.accepts(&found_key) {
					return Err(TypeError::new(
						key_expr.loc(),
						TypeErrorKind::IndexMismatch {
							expected: key.to_string(),
							found:    found_key.to_string(),
						},
					));
				}
				let found_value = self.check_expression_with(value_expr, Some(&**value))?;
				if !value.accepts(&found_value) {
					return Err(TypeError::new(
						value_expr.loc(),
						TypeErrorKind::HeterogeneousArray {
							first: value.to_string(),
							found: found_value.to_string(),
						},
					));
				}
			}
			return Ok(Type::Map { key: key.clone(), value: value.clone() });
		}

		let Some((first_key, first_value)) = entries.first() else {
			return Err(TypeError::new(loc, TypeErrorKind::UnknownElementType));
		};
		let key_type = self.check_expression(first_key)?;
		if !key_type.is_map_key() {
			return Err(TypeError::new(
				first_key.loc(),
				TypeErrorKind::InvalidMapKeyType(key_type.to_string()),
			));
		}
		let value_type = self.check_expression(first_value)?;
		for (key_expr, value_expr) in &entries[1..] {
			let found_key = self.check_expression(key_expr)?;
			if found_key != key_type {
				return Err(TypeError::new(
					key_expr.loc(),
					TypeErrorKind::IndexMismatch {
						expected: key_type.to_string(),
						found:    found_key.to_string(),
					},
				));
			}
			let found_value = self.check_expression(value_expr)?;
			if !value_type.accepts(&found_value) {
				return Err(TypeError::new(
					value_expr.loc(),
					TypeErrorKind::HeterogeneousArray {
						first: value_type.to_string(),
						found: found_value.to_string(),
					},
				));
			}
		}
		Ok(Type::Map { key: Box::new(key_type), value: Box::new(value_type) })
	}

	// =====================================================================
	// Calls
	// =====================================================================

	fn check_call(
		&mut self,
		callee: &Expression,
		arguments: &[Expression],
		resolved: &std::cell::Cell<CallTarget>,
		loc: Loc,
	) -> Check {
		if let Expression::Identifier(name, _) = callee {
			let ctor = self.tables.structs.get(name).cloned();
			if let Some(def) = ctor {
				resolved.set(CallTarget::Constructor);
				return self.check_constructor(&def, arguments, loc);
			}
			let func = self.tables.functions.get(name).cloned();
			if let Some(def) = func {
				resolved.set(CallTarget::Function);
				return self.check_user_call(&def, arguments, loc);
			}
			if let Some(builtin) = Builtin::from_name(name) {
				resolved.set(CallTarget::Builtin);
				return self.check_builtin(builtin, arguments, loc);
			}
			return Err(TypeError::new(loc, TypeErrorKind::UndefinedFunction(name.clone())));
		}

		if let Expression::Field { object, field, .. } = callee {
			if let Some(info) = self.namespace_of(object) {
				let func = info.functions.get(field).cloned();
				if let Some(def) = func {
					return self.check_user_call(&def, arguments, loc);
				}
				let ctor = info.structs.get(field).cloned();
				if let Some(def) = ctor {
					return self.check_constructor(&def, arguments, loc);
				}
				return Err(TypeError::new(
					loc,
					TypeErrorKind::NoSuchMember { module: info.name.clone(), name: field.clone() },
				));
			}
		}

		let found = self.check_expression(callee)?;
		Err(TypeError::new(loc, TypeErrorKind::NotCallable(found.to_string())))
	}

	fn check_constructor(&mut self, def: &StructDef, arguments: &[Expression], loc: Loc) -> Check {
		if arguments.len() != def.fields.len() {
			return Err(TypeError::new(
				loc,
				TypeErrorKind::ArityMismatch {
					name:     def.name.clone(),
					expected: def.fields.len(),
					found:    arguments.len(),
				},
			));
		}
		for (index, (argument, field)) in arguments.iter().zip(&def.fields).enumerate() {
			let found = self.check_expression_with(argument, Some(&field.r#type))?;
			if !field.r#type.accepts(&found) {
				return Err(TypeError::new(
					argument.loc(),
					TypeErrorKind::ArgumentMismatch {
						name:     def.name.clone(),
						index:    index + 1,
						expected: field.r#type.to_string(),
						found:    found.to_string(),
					},
				));
			}
		}
		Ok(Type::Struct(def.name.clone()))
	}

	fn check_user_call(&mut self, def: &FuncDef, arguments: &[Expression], loc: Loc) -> Check {
		if arguments.len() != def.params.len() {
			return Err(TypeError::new(
				loc,
				TypeErrorKind::ArityMismatch {
					name:     def.name.clone(),
					expected: def.params.len(),
					found:    arguments.len(),
				},
			));
		}
		for (index, (argument, param)) in arguments.iter().zip(&def.params).enumerate() {
			let found = self.check_expression_with(argument, Some(&param.r#type))?;
			if !param.r#type.accepts(&found) {
				return Err(TypeError::new(
					argument.loc(),
					TypeErrorKind::ArgumentMismatch {
						name:     def.name.clone(),
						index:    index + 1,
						expected: param.r#type.to_string(),
						found:    found.to_string(),
					},
				));
			}
		}
		Ok(def.return_type.clone())
	}

	fn check_builtin(&mut self, builtin: Builtin, arguments: &[Expression], loc: Loc) -> Check {
		use Builtin::*;
		if arguments.len() != builtin.arity() {
			return Err(TypeError::new(
				loc,
				TypeErrorKind::ArityMismatch {
					name:     builtin.name().to_string(),
					expected: builtin.arity(),
					found:    arguments.len(),
				},
			));
		}

		let mismatch = |index: usize, expected: &str, found: &Type| {
			TypeError::new(
				loc,
				TypeErrorKind::ArgumentMismatch {
					name:     builtin.name().to_string(),
					index:    index + 1,
					expected: expected.to_string(),
					found:    found.to_string(),
				},
			)
		};

		match builtin {
			Print | ToStr => {
				let found = self.check_expression(&arguments[0])?;
				if found == Type::Void {
					return Err(mismatch(0, "a value", &found));
				}
				Ok(if builtin == Print { Type::Void } else { Type::Str })
			}
			ToInt => {
				let found = self.check_expression(&arguments[0])?;
				if found != Type::Float {
					return Err(mismatch(0, "float", &found));
				}
				Ok(Type::Int)
			}
			ToFloat => {
				let found = self.check_expression(&arguments[0])?;
				if found != Type::Int {
					return Err(mismatch(0, "int", &found));
				}
				Ok(Type::Float)
			}
			Strlen | Ord => {
				let found = self.check_expression(&arguments[0])?;
				if found != Type::Str {
					return Err(mismatch(0, "string", &found));
				}
				Ok(Type::Int)
			}
			Length => {
				let found = self.check_expression(&arguments[0])?;
				if !found.deref().is_container() {
					return Err(mismatch(0, "array or map", &found));
				}
				Ok(Type::Int)
			}
			Append | Contains => {
				let found = self.check_expression(&arguments[0])?;
				let Type::Array { element, size: None } = found.deref() else {
					return Err(mismatch(0, "dynamic array", &found));
				};
				let element = (**element).clone();
				let item = self.check_expression_with(&arguments[1], Some(&element))?;
				if !element.accepts(&item) {
					return Err(mismatch(1, &element.to_string(), &item));
				}
				Ok(if builtin == Append { Type::Void } else { Type::Bool })
			}
			Pop => {
				let found = self.check_expression(&arguments[0])?;
				let Type::Array { element, size: None } = found.deref() else {
					return Err(mismatch(0, "dynamic array", &found));
				};
				Ok((**element).clone())
			}
			HasKey | Delete => {
				let found = self.check_expression(&arguments[0])?;
				let Type::Map { key, .. } = found.deref() else {
					return Err(mismatch(0, "map", &found));
				};
				let key = (**key).clone();
				let given = self.check_expression(&arguments[1])?;
				if !key.accepts(&given) {
					return Err(mismatch(1, &key.to_string(), &given));
				}
				Ok(if builtin == HasKey { Type::Bool } else { Type::Void })
			}
			Keys => {
				let found = self.check_expression(&arguments[0])?;
				let Type::Map { key, .. } = found.deref() else {
					return Err(mismatch(0, "map", &found));
				};
				Ok(Type::dynamic_array((**key).clone()))
			}
		}
	}
}

/// Conservative reachability: does this body always reach a `return`?
fn returns_always(body: &[Statement]) -> bool {
	for statement in body {
		match statement {
			Statement::Return { .. } => return true,
			Statement::If { then_body, else_body, .. }
				if returns_always(then_body) && returns_always(else_body) =>
			{
				return true;
			}
			// `while true` with no break never falls through.
			Statement::While { condition: Expression::Bool(true, _), body, .. }
				if !contains_break(body) =>
			{
				return true;
			}
			_ => {}
		}
	}
	false
}

/// Breaks binding to the *enclosing* loop; nested loops consume theirs.
fn contains_break(body: &[Statement]) -> bool {
	body.iter().any(|statement| match statement {
		Statement::Break(_) => true,
		Statement::If { then_body, else_body, .. } => {
			contains_break(then_body) || contains_break(else_body)
		}
		_ => false,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::parser::Parser;
	use crate::scanner::Scanner;

	fn check(source: &str) -> Result<(), NoxyError> {
		let tokens = Scanner::new(source).scan_tokens().unwrap();
		let program = Parser::new(tokens).parse().unwrap();
		let loader = Handle::new(ModuleLoader::new("."));
		Analyzer::new(loader).check_program(&program)
	}

	fn check_err(source: &str) -> String {
		check(source).unwrap_err().to_string()
	}

	#[test]
	fn accepts_well_typed_programs() {
		check("let x: int = 1\nx = x + 2").unwrap();
		check("let s: string = \"a\" + \"b\"").unwrap();
		check("let b: bool = 1 < 2 & true").unwrap();
		check("let a: int[3] = [1, 2, 3]\nlet n: int = a[0]").unwrap();
		check("let d: int[] = [1, 2]\nappend(d, 3)\nlet t: int = pop(d)").unwrap();
		check("let m: map[string, int] = {}\nm[\"k\"] = 1\nlet v: int = m[\"k\"]").unwrap();
	}

	#[test]
	fn rejects_declaration_mismatches() {
		assert!(check_err("let x: int = 1.5").contains("cannot assign 'float'"));
		assert!(check_err("let x: int = 1\nx = 2.0").contains("declared 'int'"));
		assert!(check_err("let x: int = 1\nlet x: int = 2").contains("already declared"));
	}

	#[test]
	fn rejects_mixed_arithmetic() {
		assert!(check_err("let x: int = 1 + 2.0").contains("matching operands"));
		check("let x: float = to_float(1) + 2.0").unwrap();
	}

	#[test]
	fn rejects_bad_conditions_and_logic() {
		assert!(check_err("if 1 then end").contains("must be 'bool'"));
		assert!(check_err("while 1 do end").contains("must be 'bool'"));
		assert!(check_err("let b: bool = 1 & true").contains("requires bool"));
	}

	#[test]
	fn rejects_undeclared_and_uncallable() {
		assert!(check_err("print(ghost)").contains("not defined"));
		assert!(check_err("ghost(1)").contains("not defined"));
		assert!(check_err("let x: int = 1\nx(2)").contains("not callable"));
	}

	#[test]
	fn checks_functions_and_returns() {
		check("func add(a: int, b: int) -> int\n return a + b\nend\nlet s: int = add(1, 2)").unwrap();
		assert!(check_err("func f() -> int\n let x: int = 1\nend").contains("every path"));
		assert!(check_err("func f() -> int\n return 1.0\nend").contains("must return 'int'"));
		assert!(check_err("func f(a: int)\nend\nf(true)").contains("argument 1"));
		assert!(check_err("func f(a: int)\nend\nf(1, 2)").contains("expects 1 arguments"));
		assert!(check_err("return 1").contains("outside of a function"));
	}

	#[test]
	fn return_paths_through_branches_and_loops() {
		check("func f(n: int) -> int\n if n > 0 then\n  return 1\n else\n  return 2\n end\nend").unwrap();
		assert!(
			check_err("func f(n: int) -> int\n if n > 0 then\n  return 1\n end\nend")
				.contains("every path")
		);
		check("func f() -> int\n while true do\n  let x: int = 1\n end\nend").unwrap();
		assert!(
			check_err("func f() -> int\n while true do\n  break\n end\nend").contains("every path")
		);
	}

	#[test]
	fn checks_structs() {
		check("struct P\n x: int\n y: int\nend\nlet p: P = P(1, 2)\nlet n: int = p.x").unwrap();
		assert!(check_err("struct P\n x: int\nend\nlet p: P = P(1, 2)").contains("expects 1 arguments"));
		assert!(check_err("struct P\n x: int\nend\nlet p: P = P(1)\nlet q: int = p.y").contains("no field"));
		assert!(check_err("struct P\n p: P\nend").contains("cannot contain itself"));
		check("struct Node\n valor: int\n proximo: ref Node\nend").unwrap();
	}

	#[test]
	fn checks_refs() {
		let source = "struct C\n v: int\nend\nlet x: C = C(1)\nlet r: ref C = ref x\nlet n: int = r.v";
		check(source).unwrap();
		assert!(check_err("let r: ref int = null").contains("references point at"));
		assert!(check_err("ref 5").contains("l-value"));
		check("struct C\n v: int\nend\nlet r: ref C = null\nlet b: bool = r == null").unwrap();
	}

	#[test]
	fn checks_fstring_specs() {
		check("let n: int = 42\nlet s: string = f\"{n:05} {n:x}\"").unwrap();
		check("let p: float = 1.5\nlet s: string = f\"{p:.2f}\"").unwrap();
		assert!(check_err("let p: float = 1.5\nlet s: string = f\"{p:x}\"").contains("cannot be applied"));
		assert!(check_err("let n: int = 1\nlet s: string = f\"{n:.2f}\"").contains("cannot be applied"));
		assert!(check_err("let n: int = 1\nlet s: string = f\"{n:.2}\"").contains("cannot be applied"));
		assert!(check_err("let s: string = f\"{missing}\"").contains("not defined"));
	}

	#[test]
	fn checks_zeros_against_context() {
		check("let a: int[4] = zeros(4)").unwrap();
		check("let a: float[] = zeros(3)").unwrap();
		check("let a: bool[2] = zeros(2)").unwrap();
		assert!(check_err("struct C\n v: int\nend\nlet a: C[2] = zeros(2)").contains("zeros()"));
	}

	#[test]
	fn checks_map_operations() {
		check("let m: map[string, int] = {\"a\": 1}\nlet b: bool = has_key(m, \"a\")\ndelete(m, \"a\")")
			.unwrap();
		check("let m: map[int, string] = {}\nlet ks: int[] = keys(m)").unwrap();
		assert!(check_err("let m: map[float, int] = {}").contains("map keys"));
		assert!(
			check_err("let m: map[string, int] = {}\nlet b: bool = has_key(m, 1)").contains("argument 2")
		);
	}

	#[test]
	fn breaks_only_inside_loops() {
		check("while true do\n break\nend").unwrap();
		assert!(check_err("break").contains("outside of a loop"));
	}

	#[test]
	fn globals_only_at_top_level() {
		check("global g: int = 1\nlet x: int = g").unwrap();
		assert!(check_err("func f()\n global g: int = 1\nend").contains("top level"));
		assert!(check_err("if true then\n global g: int = 1\nend").contains("top level"));
	}
}
