//! Statement-level AST nodes: declarations, control flow and the module
//! import form. Function and struct declarations are reference-counted
//! because the environment and the module loader both hold on to them
//! after registration.

use std::rc::Rc;

use crate::parser::expression::Expression;
use crate::scanner::Loc;
use crate::types::Type;

/// A complete parsed source file.
#[derive(Debug)]
pub struct Program {
	pub statements: Vec<Statement>,
}

#[derive(Debug)]
pub enum Statement {
	/// `let name: type = expr` — a typed slot in the innermost scope.
	Let { name: String, declared: Type, initializer: Expression, loc: Loc },
	/// `global name: type = expr` — top level only.
	Global { name: String, declared: Type, initializer: Expression, loc: Loc },
	/// `lvalue = expr`.
	Assign { target: Expression, value: Expression, loc: Loc },
	/// An expression evaluated for its effects.
	Expression(Expression),
	If { condition: Expression, then_body: Vec<Statement>, else_body: Vec<Statement>, loc: Loc },
	While { condition: Expression, body: Vec<Statement>, loc: Loc },
	Return { value: Option<Expression>, loc: Loc },
	Break(Loc),
	Func(Rc<FuncDef>),
	Struct(Rc<StructDef>),
	Use(UseStmt),
}

impl Statement {
	pub fn loc(&self) -> Loc {
		match self {
			Statement::Let { loc, .. }
			| Statement::Global { loc, .. }
			| Statement::Assign { loc, .. }
			| Statement::If { loc, .. }
			| Statement::While { loc, .. }
			| Statement::Return { loc, .. }
			| Statement::Break(loc) => *loc,
			Statement::Expression(expr) => expr.loc(),
			Statement::Func(def) => def.loc,
			Statement::Struct(def) => def.loc,
			Statement::Use(use_stmt) => use_stmt.loc,
		}
	}
}

#[derive(Debug)]
pub struct FuncDef {
	pub name:        String,
	pub params:      Vec<Param>,
	pub return_type: Type,
	pub body:        Vec<Statement>,
	pub loc:         Loc,
}

#[derive(Debug)]
pub struct Param {
	pub name:   String,
	pub r#type: Type,
}

#[derive(Debug)]
pub struct StructDef {
	pub name:   String,
	pub fields: Vec<FieldDef>,
	pub loc:    Loc,
}

impl StructDef {
	pub fn field(&self, name: &str) -> Option<&FieldDef> {
		self.fields.iter().find(|f| f.name == name)
	}
}

#[derive(Debug)]
pub struct FieldDef {
	pub name:   String,
	pub r#type: Type,
}

/// `use a.b.c [as alias | select x, y | select *]`.
#[derive(Debug)]
pub struct UseStmt {
	pub path:   Vec<String>,
	pub import: UseImport,
	pub loc:    Loc,
}

impl UseStmt {
	pub fn dotted(&self) -> String { self.path.join(".") }
}

#[derive(Debug, PartialEq)]
pub enum UseImport {
	/// Bind the module as a namespace under its leaf name or an alias.
	Namespace(Option<String>),
	/// Pull the listed exports into the current scope.
	Select(Vec<String>),
	/// `select *`: everything from a file, or one namespace per child
	/// file of a directory.
	Wildcard,
}
