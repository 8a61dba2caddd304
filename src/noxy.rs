//! The driver: wires scanner, parser, analyzer and interpreter together
//! for the two front-end modes, file execution and the REPL.

use std::fs::read_to_string;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::analyzer::Analyzer;
use crate::interpreter::Interpreter;
use crate::modules::ModuleLoader;
use crate::parser::Parser;
use crate::scanner::Scanner;
use crate::utils::Handle;

/// Front-end switches, straight from the CLI.
pub struct Options {
	/// Dump tokens and the parsed statement count to stderr.
	pub debug:     bool,
	/// Run the static analyzer before evaluating.
	pub typecheck: bool,
}

impl Default for Options {
	fn default() -> Self { Self { debug: false, typecheck: true } }
}

/// One interpreter session. The analyzer and the evaluator both live for
/// the whole session, which is what lets the REPL keep its global scope
/// between inputs.
pub struct Noxy {
	options:     Options,
	analyzer:    Analyzer,
	interpreter: Interpreter,
}

impl Noxy {
	/// `base_dir` is the module search root, normally the directory of
	/// the file being run. The `NOXY_STDLIB` environment variable adds a
	/// fallback root for library modules.
	pub fn new(base_dir: impl Into<PathBuf>, options: Options) -> Self {
		Self::with_output(base_dir, options, Box::new(std::io::stdout()))
	}

	/// Same, with program output routed to `out`. Tests use this to
	/// capture exact stdout bytes.
	pub fn with_output(base_dir: impl Into<PathBuf>, options: Options, out: Box<dyn Write>) -> Self {
		let mut loader = ModuleLoader::new(base_dir);
		if let Ok(stdlib) = std::env::var("NOXY_STDLIB") {
			loader = loader.with_stdlib(stdlib);
		}
		let loader = Handle::new(loader);
		Self {
			options,
			analyzer: Analyzer::new(loader.clone()),
			interpreter: Interpreter::new(loader, out),
		}
	}

	pub fn run_file(&mut self, path: &Path) -> crate::Result<()> {
		let source = read_to_string(path).context("failed to read source file")?;
		self.run_source(&source)
	}

	/// The full pipeline: scan, parse, analyze (unless disabled), run.
	pub fn run_source(&mut self, source: &str) -> crate::Result<()> {
		let tokens = Scanner::new(source).scan_tokens()?;
		if self.options.debug {
			for token in &tokens {
				eprintln!("  {token:?}");
			}
		}

		let program = Parser::new(tokens).parse()?;
		if self.options.debug {
			eprintln!("{program:#?}");
			eprintln!("  {} statements", program.statements.len());
		}

		if self.options.typecheck {
			self.analyzer.check_program(&program)?;
		}
		self.interpreter.run(&program)
	}

	/// Interactive loop. The global scope persists across inputs; lines
	/// buffer while the parser still expects a closing `end`.
	pub fn run_prompt(&mut self) {
		let stdin = std::io::stdin();
		let mut buffer = String::new();
		let mut line = String::new();
		loop {
			print!("{}", if buffer.is_empty() { ">>> " } else { "... " });
			if let Err(e) = std::io::stdout().flush() {
				eprintln!("failed to flush prompt: {e}");
			}

			line.clear();
			match stdin.read_line(&mut line) {
				Ok(0) => {
					println!();
					break;
				}
				Ok(_) => {}
				Err(e) => {
					eprintln!("failed to read line: {e}");
					continue;
				}
			}

			buffer.push_str(&line);
			match self.run_source_or_buffer(&buffer) {
				InputState::Complete => buffer.clear(),
				InputState::NeedsMore => {}
			}
		}
	}

	fn run_source_or_buffer(&mut self, source: &str) -> InputState {
		match self.run_source(source) {
			Ok(()) => InputState::Complete,
			Err(crate::NoxyError::Parse(e)) if e.is_premature_end() => InputState::NeedsMore,
			Err(e) => {
				eprintln!("{}", e.report("<stdin>"));
				InputState::Complete
			}
		}
	}
}

enum InputState {
	Complete,
	NeedsMore,
}
