use std::path::Path;

use clap::Parser;
use noxy::cli::Cli;
use noxy::{Noxy, Options};

fn main() {
	let cli = Cli::parse();
	let options = Options { debug: cli.debug, typecheck: !cli.no_typecheck };

	match cli.file {
		Some(path) => {
			let base_dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
			let mut noxy = Noxy::new(base_dir, options);
			if let Err(e) = noxy.run_file(&path) {
				eprintln!("{}", e.report(&path.display().to_string()));
				std::process::exit(1);
			}
		}
		None => Noxy::new(".", options).run_prompt(),
	}
}
