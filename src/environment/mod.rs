//! Scopes and symbol tables.
//!
//! Noxy has a two-level scoping model: a module's global scope plus, per
//! active call, a stack of block scopes. A call frame roots at the
//! *defining* module's globals, never at the caller's locals, so there
//! are no closures. Lookups walk block scopes inner to outer and then
//! the frame's globals.

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::interpreter::value::Value;
use crate::statement::{FuncDef, StructDef};
use crate::types::Type;
use crate::utils::Handle;

/// A named slot: the declared type plus the value currently stored.
#[derive(Debug, Clone)]
pub struct Binding {
	pub declared: Type,
	pub value:    Value,
}

/// A function together with the globals of the module that declared it.
#[derive(Clone)]
pub struct FunctionEntry {
	pub decl: Rc<FuncDef>,
	pub home: Handle<ModuleScope>,
}

/// The global scope of one module (the main program counts as one):
/// variables, declared functions and structs, and imported namespaces.
#[derive(Default)]
pub struct ModuleScope {
	pub vars:       HashMap<String, Binding>,
	pub functions:  HashMap<String, FunctionEntry>,
	pub structs:    HashMap<String, Rc<StructDef>>,
	pub namespaces: HashMap<String, Handle<ModuleScope>>,
	/// Origin of names bound by selective import, as (module path,
	/// exported symbol). Repeating the exact same import is a no-op;
	/// binding the name to anything else is an ambiguous import.
	pub imports:    HashMap<String, (PathBuf, String)>,
}

struct Frame {
	globals: Handle<ModuleScope>,
	scopes:  Vec<HashMap<String, Binding>>,
}

/// The evaluator's view of all live scopes.
pub struct Environment {
	frames: Vec<Frame>,
}

impl Environment {
	/// The base frame executes top-level code directly against the
	/// module globals; it starts with no block scopes.
	pub fn new(globals: Handle<ModuleScope>) -> Self {
		Self { frames: vec![Frame { globals, scopes: Vec::new() }] }
	}

	/// Enters a call frame rooted at `globals`, with one scope for the
	/// parameters.
	pub fn push_frame(&mut self, globals: Handle<ModuleScope>) {
		self.frames.push(Frame { globals, scopes: vec![HashMap::new()] });
	}

	/// Enters a frame for evaluating a module's top level: definitions go
	/// straight to that module's globals, like the base frame.
	pub fn push_module_frame(&mut self, globals: Handle<ModuleScope>) {
		self.frames.push(Frame { globals, scopes: Vec::new() });
	}

	pub fn pop_frame(&mut self) {
		debug_assert!(self.frames.len() > 1);
		self.frames.pop();
	}

	/// Call depth, used for the recursion cap.
	pub fn depth(&self) -> usize { self.frames.len() }

	pub fn push_scope(&mut self) {
		self.frame_mut().scopes.push(HashMap::new());
	}

	pub fn pop_scope(&mut self) {
		self.frame_mut().scopes.pop();
	}

	/// The globals of the currently executing frame.
	pub fn globals(&self) -> Handle<ModuleScope> { self.frame().globals.clone() }

	fn frame(&self) -> &Frame { self.frames.last().expect("environment always has a base frame") }

	fn frame_mut(&mut self) -> &mut Frame {
		self.frames.last_mut().expect("environment always has a base frame")
	}

	/// Defines in the innermost block scope; at top level (no block
	/// scope open) this is the module's global scope.
	pub fn define(&mut self, name: &str, binding: Binding) {
		let frame = self.frame_mut();
		match frame.scopes.last_mut() {
			Some(scope) => {
				scope.insert(name.to_string(), binding);
			}
			None => {
				frame.globals.borrow_mut().vars.insert(name.to_string(), binding);
			}
		}
	}

	pub fn get(&self, name: &str) -> Option<Binding> {
		let frame = self.frame();
		for scope in frame.scopes.iter().rev() {
			if let Some(binding) = scope.get(name) {
				return Some(binding.clone());
			}
		}
		frame.globals.borrow().vars.get(name).cloned()
	}

	/// Writes to an existing slot. Returns false when no slot exists.
	pub fn set(&mut self, name: &str, value: Value) -> bool {
		let frame = self.frame_mut();
		for scope in frame.scopes.iter_mut().rev() {
			if let Some(binding) = scope.get_mut(name) {
				binding.value = value;
				return true;
			}
		}
		match frame.globals.borrow_mut().vars.get_mut(name) {
			Some(binding) => {
				binding.value = value;
				true
			}
			None => false,
		}
	}
}
