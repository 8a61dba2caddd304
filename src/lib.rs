//! # Noxy
//!
//! A tree-walking interpreter for Noxy, a small statically typed
//! imperative language with structs, first-class references, fixed and
//! dynamic arrays, hash maps, formatted string literals, and a module
//! system with selective import.
//!
//! ## Pipeline
//!
//! Source text flows through four stages, each its own module:
//!
//! ``` markdown
//! source bytes
//! └── scanner      — characters to located tokens
//!     └── parser   — tokens to an AST (recursive descent)
//!         └── analyzer — name resolution, type checking, call tagging
//!             └── interpreter — the tree walk that produces effects
//! ```
//!
//! The `modules` loader sits beside the pipeline: when the analyzer or
//! the evaluator meets a `use` statement it resolves the dotted path to
//! a file or directory, re-enters the scanner and parser on that source,
//! and caches the result by canonical path so each module loads once.
//!
//! ## Semantics worth knowing up front
//!
//! - Primitives copy by value; struct and container *arguments* copy
//!   deeply, unless the parameter is `ref`-typed, in which case the
//!   callee shares the caller's instance.
//! - `let` and assignment bind handles; only call boundaries deep-copy.
//! - Functions see their module's globals plus their own locals. There
//!   are no closures, so a call frame is just "globals + block scopes".
//! - Statements evaluate to a `Normal`/`Return`/`Break` signal rather
//!   than unwinding; runtime errors alone travel through `Result`.

pub mod cli;

mod analyzer;
mod environment;
mod error;
mod interpreter;
mod modules;
mod noxy;
mod parser;
mod scanner;
mod statement;
mod types;
mod utils;

pub use error::{
	NoxyError,
	analyzer::TypeError,
	interpreter::RuntimeError,
	module::ModuleError,
	parser::ParseError,
	scanner::ScanError,
};
pub use noxy::{Noxy, Options};

/// Crate-wide result alias; the driver and the binary use it directly.
pub type Result<T, E = NoxyError> = std::result::Result<T, E>;
