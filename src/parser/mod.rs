//! Recursive descent parser for Noxy.
//!
//! Precedence, lowest to highest:
//!
//! |Level|Operators|
//! --|--
//! or|`\|`
//! and|`&`
//! not|`!`
//! comparison|`< > <= >= == !=` (non-associative)
//! additive|`+ -`
//! multiplicative|`* / %`
//! unary|`-`
//! postfix|`.field` `[index]` `(args)`
//!
//! Statements end at newlines; the scanner keeps newline tokens and the
//! parser skips them wherever a statement or list element may start.
//! The parser reports the first error and stops.

pub(crate) mod expression;

use std::rc::Rc;

use TokenType::*;
use expression::{BinaryOp, Expression, FStringPiece, FormatSpec, UnaryOp};

use crate::error::parser::{ParseError, ParseErrorKind};
use crate::scanner::{FStringPart, Loc, Scanner, Token, TokenType};
use crate::statement::{FieldDef, FuncDef, Param, Program, Statement, StructDef, UseImport, UseStmt};
use crate::types::Type;

pub struct Parser {
	tokens: Vec<Token>,
	pos:    usize,
}

impl Parser {
	pub fn new(tokens: Vec<Token>) -> Self {
		debug_assert!(matches!(tokens.last(), Some(t) if t.r#type == Eof));
		Self { tokens, pos: 0 }
	}

	pub fn parse(mut self) -> Result<Program, ParseError> {
		let mut statements = Vec::new();
		loop {
			self.skip_newlines();
			if self.check(&Eof) {
				return Ok(Program { statements });
			}
			statements.push(self.statement()?);
		}
	}

	/// Parses a single expression and requires the input to end there.
	/// Used for f-string holes.
	fn parse_expression_entire(mut self) -> Result<Expression, ParseError> {
		let expr = self.expression()?;
		if !self.check(&Eof) {
			return Err(self.unexpected("end of hole expression"));
		}
		Ok(expr)
	}

	// =====================================================================
	// Token plumbing
	// =====================================================================

	fn current(&self) -> &Token { &self.tokens[self.pos] }

	fn loc(&self) -> Loc { self.current().loc }

	fn advance(&mut self) -> Token {
		let token = self.tokens[self.pos].clone();
		if token.r#type != Eof {
			self.pos += 1;
		}
		token
	}

	fn check(&self, r#type: &TokenType) -> bool { &self.current().r#type == r#type }

	fn match_token(&mut self, r#type: &TokenType) -> bool {
		if self.check(r#type) {
			self.advance();
			return true;
		}
		false
	}

	fn expect(&mut self, r#type: TokenType, expected: &str) -> Result<Token, ParseError> {
		if self.check(&r#type) {
			return Ok(self.advance());
		}
		Err(self.unexpected(expected))
	}

	fn expect_identifier(&mut self, expected: &str) -> Result<(String, Loc), ParseError> {
		let loc = self.loc();
		let name = match &self.current().r#type {
			Identifier(name) => name.clone(),
			_ => return Err(self.unexpected(expected)),
		};
		self.advance();
		Ok((name, loc))
	}

	fn unexpected(&self, expected: &str) -> ParseError {
		ParseError::new(
			self.loc(),
			ParseErrorKind::Expected { expected: expected.to_string(), found: self.current().describe() },
		)
	}

	fn skip_newlines(&mut self) {
		while self.match_token(&Newline) {}
	}

	// =====================================================================
	// Types
	// =====================================================================

	fn parse_type(&mut self) -> Result<Type, ParseError> {
		if self.match_token(&Ref) {
			let inner = self.parse_type()?;
			return Ok(Type::Ref(Box::new(inner)));
		}

		let mut base = match self.current().r#type.clone() {
			TypeInt => {
				self.advance();
				Type::Int
			}
			TypeFloat => {
				self.advance();
				Type::Float
			}
			TypeString => {
				self.advance();
				Type::Str
			}
			TypeBool => {
				self.advance();
				Type::Bool
			}
			TypeVoid => {
				self.advance();
				Type::Void
			}
			TypeMap => {
				self.advance();
				self.expect(LBracket, "'[' after 'map'")?;
				let key = self.parse_type()?;
				self.expect(Comma, "',' between map key and value types")?;
				let value = self.parse_type()?;
				self.expect(RBracket, "']' after map value type")?;
				Type::Map { key: Box::new(key), value: Box::new(value) }
			}
			Identifier(name) => {
				self.advance();
				Type::Struct(name)
			}
			_ => return Err(ParseError::new(self.loc(), ParseErrorKind::ExpectedType(self.current().describe()))),
		};

		// `T[]` and `T[N]` postfixes, left to right: `int[3][]` is a
		// dynamic array of fixed arrays of int.
		while self.match_token(&LBracket) {
			if self.match_token(&RBracket) {
				base = Type::dynamic_array(base);
				continue;
			}
			let size = match self.current().r#type {
				Int(n) if n >= 0 => n as usize,
				_ => return Err(self.unexpected("array length")),
			};
			self.advance();
			self.expect(RBracket, "']' after array length")?;
			base = Type::fixed_array(base, size);
		}

		Ok(base)
	}

	// =====================================================================
	// Statements
	// =====================================================================

	fn statement(&mut self) -> Result<Statement, ParseError> {
		let loc = self.loc();
		if self.check(&Let) {
			self.let_stmt(loc)
		} else if self.check(&Global) {
			self.global_stmt(loc)
		} else if self.check(&Func) {
			self.func_def(loc)
		} else if self.check(&Struct) {
			self.struct_def(loc)
		} else if self.check(&If) {
			self.if_stmt(loc)
		} else if self.check(&While) {
			self.while_stmt(loc)
		} else if self.check(&Return) {
			self.return_stmt(loc)
		} else if self.match_token(&Break) {
			Ok(Statement::Break(loc))
		} else if self.check(&Use) {
			self.use_stmt(loc)
		} else {
			self.assignment_or_expr(loc)
		}
	}

	fn let_stmt(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let (name, _) = self.expect_identifier("variable name after 'let'")?;
		self.expect(Colon, "':' after variable name")?;
		let declared = self.parse_type()?;
		self.expect(Assign, "'=' after variable type")?;
		let initializer = self.expression()?;
		Ok(Statement::Let { name, declared, initializer, loc })
	}

	fn global_stmt(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let (name, _) = self.expect_identifier("variable name after 'global'")?;
		self.expect(Colon, "':' after variable name")?;
		let declared = self.parse_type()?;
		self.expect(Assign, "'=' after variable type")?;
		let initializer = self.expression()?;
		Ok(Statement::Global { name, declared, initializer, loc })
	}

	fn func_def(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let (name, _) = self.expect_identifier("function name after 'func'")?;
		self.expect(LParen, "'(' after function name")?;

		let mut params = Vec::new();
		if !self.check(&RParen) {
			loop {
				let (name, _) = self.expect_identifier("parameter name")?;
				self.expect(Colon, "':' after parameter name")?;
				let r#type = self.parse_type()?;
				params.push(Param { name, r#type });
				if !self.match_token(&Comma) {
					break;
				}
			}
		}
		self.expect(RParen, "')' after parameters")?;

		let return_type = if self.match_token(&Arrow) { self.parse_type()? } else { Type::Void };

		let body = self.block(&[End])?;
		self.expect(End, "'end' closing the function body")?;
		Ok(Statement::Func(Rc::new(FuncDef { name, params, return_type, body, loc })))
	}

	fn struct_def(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let (name, _) = self.expect_identifier("struct name after 'struct'")?;
		self.skip_newlines();

		let mut fields = Vec::new();
		while !self.check(&End) {
			let (field_name, _) = self.expect_identifier("field name or 'end'")?;
			self.expect(Colon, "':' after field name")?;
			let r#type = self.parse_type()?;
			fields.push(FieldDef { name: field_name, r#type });
			self.match_token(&Comma);
			self.skip_newlines();
		}
		self.expect(End, "'end' closing the struct")?;
		Ok(Statement::Struct(Rc::new(StructDef { name, fields, loc })))
	}

	fn if_stmt(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let condition = self.expression()?;
		self.expect(Then, "'then' after if condition")?;

		let then_body = self.block(&[Else, End])?;
		let else_body = if self.match_token(&Else) { self.block(&[End])? } else { Vec::new() };
		self.expect(End, "'end' closing the if")?;
		Ok(Statement::If { condition, then_body, else_body, loc })
	}

	fn while_stmt(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let condition = self.expression()?;
		self.expect(Do, "'do' after while condition")?;

		let body = self.block(&[End])?;
		self.expect(End, "'end' closing the while")?;
		Ok(Statement::While { condition, body, loc })
	}

	/// Statements up to (not consuming) one of the terminator tokens.
	fn block(&mut self, terminators: &[TokenType]) -> Result<Vec<Statement>, ParseError> {
		let mut body = Vec::new();
		loop {
			self.skip_newlines();
			if terminators.iter().any(|t| self.check(t)) || self.check(&Eof) {
				return Ok(body);
			}
			body.push(self.statement()?);
		}
	}

	fn return_stmt(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let value = if matches!(self.current().r#type, Newline | End | Else | Eof) {
			None
		} else {
			Some(self.expression()?)
		};
		Ok(Statement::Return { value, loc })
	}

	fn use_stmt(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		self.advance();
		let mut path = vec![self.expect_identifier("module name after 'use'")?.0];
		while self.match_token(&Dot) {
			path.push(self.expect_identifier("module name after '.'")?.0);
		}

		let import = if self.match_token(&As) {
			UseImport::Namespace(Some(self.expect_identifier("alias after 'as'")?.0))
		} else if self.match_token(&Select) {
			if self.match_token(&Star) {
				UseImport::Wildcard
			} else {
				let mut names = vec![self.expect_identifier("symbol name after 'select'")?.0];
				while self.match_token(&Comma) {
					names.push(self.expect_identifier("symbol name after ','")?.0);
				}
				UseImport::Select(names)
			}
		} else {
			UseImport::Namespace(None)
		};

		Ok(Statement::Use(UseStmt { path, import, loc }))
	}

	fn assignment_or_expr(&mut self, loc: Loc) -> Result<Statement, ParseError> {
		let expr = self.expression()?;
		if self.match_token(&Assign) {
			let value = self.expression()?;
			return Ok(Statement::Assign { target: expr, value, loc });
		}
		Ok(Statement::Expression(expr))
	}

	// =====================================================================
	// Expressions
	// =====================================================================

	fn expression(&mut self) -> Result<Expression, ParseError> { self.or() }

	fn or(&mut self) -> Result<Expression, ParseError> {
		let mut left = self.and()?;
		while self.check(&Pipe) {
			let loc = self.loc();
			self.advance();
			let right = self.and()?;
			left = Expression::Binary { left: left.boxed(), op: BinaryOp::Or, right: right.boxed(), loc };
		}
		Ok(left)
	}

	fn and(&mut self) -> Result<Expression, ParseError> {
		let mut left = self.not()?;
		while self.check(&Amp) {
			let loc = self.loc();
			self.advance();
			let right = self.not()?;
			left = Expression::Binary { left: left.boxed(), op: BinaryOp::And, right: right.boxed(), loc };
		}
		Ok(left)
	}

	fn not(&mut self) -> Result<Expression, ParseError> {
		if self.check(&Bang) {
			let loc = self.loc();
			self.advance();
			let operand = self.not()?;
			return Ok(Expression::Unary { op: UnaryOp::Not, operand: operand.boxed(), loc });
		}
		self.comparison()
	}

	fn comparison_op(&self) -> Option<BinaryOp> {
		match self.current().r#type {
			Gt => Some(BinaryOp::Gt),
			Lt => Some(BinaryOp::Lt),
			Gte => Some(BinaryOp::Gte),
			Lte => Some(BinaryOp::Lte),
			EqEq => Some(BinaryOp::Eq),
			NotEq => Some(BinaryOp::Neq),
			_ => None,
		}
	}

	/// Comparisons do not associate: `a < b < c` is rejected outright.
	fn comparison(&mut self) -> Result<Expression, ParseError> {
		let left = self.additive()?;
		let Some(op) = self.comparison_op() else { return Ok(left) };
		let loc = self.loc();
		self.advance();
		let right = self.additive()?;
		if self.comparison_op().is_some() {
			return Err(ParseError::new(self.loc(), ParseErrorKind::ChainedComparison));
		}
		Ok(Expression::Binary { left: left.boxed(), op, right: right.boxed(), loc })
	}

	fn additive(&mut self) -> Result<Expression, ParseError> {
		let mut left = self.multiplicative()?;
		loop {
			let op = match self.current().r#type {
				Plus => BinaryOp::Add,
				Minus => BinaryOp::Sub,
				_ => return Ok(left),
			};
			let loc = self.loc();
			self.advance();
			let right = self.multiplicative()?;
			left = Expression::Binary { left: left.boxed(), op, right: right.boxed(), loc };
		}
	}

	fn multiplicative(&mut self) -> Result<Expression, ParseError> {
		let mut left = self.unary()?;
		loop {
			let op = match self.current().r#type {
				Star => BinaryOp::Mul,
				Slash => BinaryOp::Div,
				Percent => BinaryOp::Mod,
				_ => return Ok(left),
			};
			let loc = self.loc();
			self.advance();
			let right = self.unary()?;
			left = Expression::Binary { left: left.boxed(), op, right: right.boxed(), loc };
		}
	}

	fn unary(&mut self) -> Result<Expression, ParseError> {
		if self.check(&Minus) {
			let loc = self.loc();
			self.advance();
			let operand = self.unary()?;
			return Ok(Expression::Unary { op: UnaryOp::Neg, operand: operand.boxed(), loc });
		}
		self.postfix()
	}

	fn postfix(&mut self) -> Result<Expression, ParseError> {
		let mut expr = self.primary()?;
		loop {
			if self.match_token(&Dot) {
				let (field, loc) = self.expect_identifier("field name after '.'")?;
				expr = Expression::Field { object: expr.boxed(), field, loc };
			} else if self.check(&LBracket) {
				let loc = self.loc();
				self.advance();
				let index = self.expression()?;
				self.expect(RBracket, "']' after index")?;
				expr = Expression::Index { object: expr.boxed(), index: index.boxed(), loc };
			} else if self.check(&LParen) {
				let loc = self.loc();
				self.advance();
				let arguments = self.arguments()?;
				expr = Expression::Call {
					callee: expr.boxed(),
					arguments,
					resolved: Default::default(),
					loc,
				};
			} else {
				return Ok(expr);
			}
		}
	}

	/// Call arguments, opening paren already consumed.
	fn arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
		let mut arguments = Vec::new();
		if !self.check(&RParen) {
			loop {
				arguments.push(self.expression()?);
				if !self.match_token(&Comma) {
					break;
				}
				self.skip_newlines();
			}
		}
		self.expect(RParen, "')' after arguments")?;
		Ok(arguments)
	}

	fn primary(&mut self) -> Result<Expression, ParseError> {
		let loc = self.loc();
		match self.current().r#type.clone() {
			Int(value) => {
				self.advance();
				Ok(Expression::Int(value, loc))
			}
			Float(value) => {
				self.advance();
				Ok(Expression::Float(value, loc))
			}
			Str(value) => {
				self.advance();
				Ok(Expression::Str(value, loc))
			}
			True => {
				self.advance();
				Ok(Expression::Bool(true, loc))
			}
			False => {
				self.advance();
				Ok(Expression::Bool(false, loc))
			}
			Null => {
				self.advance();
				Ok(Expression::Null(loc))
			}
			FString(parts) => {
				self.advance();
				let pieces = Self::fstring_pieces(parts)?;
				Ok(Expression::FString(pieces, loc))
			}
			Zeros => {
				self.advance();
				self.expect(LParen, "'(' after 'zeros'")?;
				let size = self.expression()?;
				self.expect(RParen, "')' after zeros length")?;
				Ok(Expression::Zeros(size.boxed(), loc))
			}
			Ref => {
				self.advance();
				let target = self.postfix()?;
				Ok(Expression::Ref(target.boxed(), loc))
			}
			LBracket => {
				self.advance();
				let mut elements = Vec::new();
				self.skip_newlines();
				if !self.check(&RBracket) {
					loop {
						elements.push(self.expression()?);
						if !self.match_token(&Comma) {
							break;
						}
						self.skip_newlines();
						if self.check(&RBracket) {
							break; // trailing comma
						}
					}
				}
				self.skip_newlines();
				self.expect(RBracket, "']' closing the array literal")?;
				Ok(Expression::Array(elements, loc))
			}
			LBrace => {
				self.advance();
				let mut entries = Vec::new();
				self.skip_newlines();
				if !self.check(&RBrace) {
					loop {
						let key = self.expression()?;
						self.expect(Colon, "':' between map key and value")?;
						let value = self.expression()?;
						entries.push((key, value));
						if !self.match_token(&Comma) {
							break;
						}
						self.skip_newlines();
						if self.check(&RBrace) {
							break; // trailing comma
						}
					}
				}
				self.skip_newlines();
				self.expect(RBrace, "'}' closing the map literal")?;
				Ok(Expression::Map(entries, loc))
			}
			LParen => {
				self.advance();
				let inner = self.expression()?;
				self.expect(RParen, "')' closing the group")?;
				Ok(Expression::Group(inner.boxed(), loc))
			}
			Identifier(name) => {
				self.advance();
				Ok(Expression::Identifier(name, loc))
			}
			_ => Err(ParseError::new(loc, ParseErrorKind::ExpectedExpression(self.current().describe()))),
		}
	}

	/// Parses each scanned f-string part: literal text stays, hole
	/// expressions are re-scanned and parsed, hole specs are validated.
	fn fstring_pieces(parts: Vec<FStringPart>) -> Result<Vec<FStringPiece>, ParseError> {
		let mut pieces = Vec::new();
		for part in parts {
			match part {
				FStringPart::Text(text) => pieces.push(FStringPiece::Text(text)),
				FStringPart::Hole { expr, spec, loc } => {
					let tokens = Scanner::new_at(&expr, loc).scan_tokens().map_err(|_| {
						ParseError::new(loc, ParseErrorKind::ExpectedExpression("malformed hole".to_string()))
					})?;
					let expr = Parser::new(tokens).parse_expression_entire()?;
					let spec = match spec {
						Some(raw) => Some(FormatSpec::parse(&raw).ok_or_else(|| {
							ParseError::new(loc, ParseErrorKind::InvalidFormatSpec(raw.clone()))
						})?),
						None => None,
					};
					pieces.push(FStringPiece::Hole { expr: expr.boxed(), spec });
				}
			}
		}
		Ok(pieces)
	}
}
