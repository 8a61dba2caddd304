use std::path::PathBuf;

use clap::Parser;

/// CLI arguments
#[derive(Parser)]
#[command(name = "noxy", about = "Interpreter for the Noxy programming language")]
pub struct Cli {
	/// Source file to run (.nx); omit to start the interactive REPL
	pub file: Option<PathBuf>,

	/// Dump tokens and the parsed statement count to stderr before running
	#[arg(long)]
	pub debug: bool,

	/// Skip the static analyzer; type mismatches then surface at runtime
	#[arg(long)]
	pub no_typecheck: bool,
}
