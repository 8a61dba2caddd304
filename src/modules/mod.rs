//! Module resolution and loading.
//!
//! A dotted `use` path resolves against the program's root directory
//! first and an optional stdlib root second, to either a single `.nx`
//! file or a directory of `.nx` files. Loading scans and parses the
//! source and pre-loads the module's own imports, so by the time a
//! module is returned its whole dependency tree sits in the cache.
//!
//! The cache is keyed by canonical path: a module is parsed at most once
//! per run no matter how many import paths reach it. A separate
//! in-progress set catches circular imports.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::NoxyError;
use crate::error::module::{ModuleError, ModuleErrorKind};
use crate::parser::Parser;
use crate::scanner::{Loc, Scanner};
use crate::statement::{Program, Statement};

/// One loaded module: a parsed file, or a directory of child modules.
#[derive(Debug)]
pub struct ModuleUnit {
	pub name: String,
	pub path: PathBuf,
	pub kind: ModuleKind,
}

#[derive(Debug)]
pub enum ModuleKind {
	File(Program),
	Dir(Vec<(String, Rc<ModuleUnit>)>),
}

pub struct ModuleLoader {
	root:        PathBuf,
	stdlib_root: Option<PathBuf>,
	cache:       HashMap<PathBuf, Rc<ModuleUnit>>,
	loading:     HashSet<PathBuf>,
}

impl ModuleLoader {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into(), stdlib_root: None, cache: HashMap::new(), loading: HashSet::new() }
	}

	pub fn with_stdlib(mut self, stdlib_root: impl Into<PathBuf>) -> Self {
		self.stdlib_root = Some(stdlib_root.into());
		self
	}

	/// Resolves and loads a dotted path. `loc` positions diagnostics at
	/// the `use` statement.
	pub fn load(&mut self, path: &[String], loc: Loc) -> Result<Rc<ModuleUnit>, NoxyError> {
		let dotted = path.join(".");
		let leaf = path.last().cloned().unwrap_or_default();
		let relative: PathBuf = path.iter().collect();

		let roots: Vec<PathBuf> = [Some(self.root.clone()), self.stdlib_root.clone()]
			.into_iter()
			.flatten()
			.collect();
		for root in roots {
			let file = root.join(&relative).with_extension("nx");
			if file.is_file() {
				return self.load_file(file, leaf, loc);
			}
			let dir = root.join(&relative);
			if dir.is_dir() {
				return self.load_dir(dir, leaf, loc);
			}
		}
		Err(ModuleError::new(loc, ModuleErrorKind::NotFound(dotted)).into())
	}

	fn canonical(&self, path: &Path, loc: Loc) -> Result<PathBuf, NoxyError> {
		path.canonicalize().map_err(|e| {
			ModuleError::new(
				loc,
				ModuleErrorKind::ReadFailed { path: path.display().to_string(), reason: e.to_string() },
			)
			.into()
		})
	}

	fn load_file(&mut self, path: PathBuf, name: String, loc: Loc) -> Result<Rc<ModuleUnit>, NoxyError> {
		let key = self.canonical(&path, loc)?;
		if let Some(unit) = self.cache.get(&key) {
			return Ok(unit.clone());
		}
		if self.loading.contains(&key) {
			return Err(ModuleError::new(loc, ModuleErrorKind::CircularImport(name)).into());
		}
		self.loading.insert(key.clone());
		let result = self.parse_file(&key, &name, loc);
		self.loading.remove(&key);

		let program = result?;
		let unit = Rc::new(ModuleUnit { name, path: key.clone(), kind: ModuleKind::File(program) });
		self.cache.insert(key, unit.clone());
		Ok(unit)
	}

	fn parse_file(&mut self, path: &Path, name: &str, loc: Loc) -> Result<Program, NoxyError> {
		let source = std::fs::read_to_string(path).map_err(|e| {
			ModuleError::new(
				loc,
				ModuleErrorKind::ReadFailed { path: name.to_string(), reason: e.to_string() },
			)
		})?;
		let tokens = Scanner::new(&source).scan_tokens()?;
		let program = Parser::new(tokens).parse()?;

		// Pre-load this module's own imports while it is still marked
		// in-progress; that is what turns an import cycle into an error
		// instead of a hang.
		for statement in &program.statements {
			if let Statement::Use(use_stmt) = statement {
				self.load(&use_stmt.path, use_stmt.loc)?;
			}
		}
		Ok(program)
	}

	fn load_dir(&mut self, dir: PathBuf, name: String, loc: Loc) -> Result<Rc<ModuleUnit>, NoxyError> {
		let key = self.canonical(&dir, loc)?;
		if let Some(unit) = self.cache.get(&key) {
			return Ok(unit.clone());
		}

		let entries = std::fs::read_dir(&key).map_err(|e| {
			ModuleError::new(
				loc,
				ModuleErrorKind::ReadFailed { path: name.clone(), reason: e.to_string() },
			)
		})?;
		let mut files: Vec<PathBuf> = entries
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.path())
			.filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "nx"))
			.collect();
		files.sort();

		let mut children = Vec::new();
		for file in files {
			let stem = match file.file_stem().and_then(|s| s.to_str()) {
				Some(stem) => stem.to_string(),
				None => continue,
			};
			let child = self.load_file(file, stem.clone(), loc)?;
			children.push((stem, child));
		}

		let unit = Rc::new(ModuleUnit { name, path: key.clone(), kind: ModuleKind::Dir(children) });
		self.cache.insert(key, unit.clone());
		Ok(unit)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	/// A scratch module tree on disk; removed on drop.
	struct Tree {
		root: PathBuf,
	}

	impl Tree {
		fn new(label: &str, files: &[(&str, &str)]) -> Self {
			let root =
				std::env::temp_dir().join(format!("noxy-loader-{label}-{}", std::process::id()));
			for (name, source) in files {
				let path = root.join(name);
				std::fs::create_dir_all(path.parent().unwrap()).unwrap();
				std::fs::write(path, source).unwrap();
			}
			std::fs::create_dir_all(&root).unwrap();
			Self { root }
		}
	}

	impl Drop for Tree {
		fn drop(&mut self) {
			let _ = std::fs::remove_dir_all(&self.root);
		}
	}

	#[test]
	fn loads_a_file_module_once() {
		let tree = Tree::new("file", &[("mathmod.nx", "func add(a: int, b: int) -> int\n return a + b\nend\n")]);
		let mut loader = ModuleLoader::new(&tree.root);
		let first = loader.load(&["mathmod".to_string()], Loc::default()).unwrap();
		let second = loader.load(&["mathmod".to_string()], Loc::default()).unwrap();
		assert!(Rc::ptr_eq(&first, &second));
		assert!(matches!(first.kind, ModuleKind::File(_)));
	}

	#[test]
	fn resolves_nested_paths() {
		let tree = Tree::new("nested", &[("utils/text.nx", "func id(s: string) -> string\n return s\nend\n")]);
		let mut loader = ModuleLoader::new(&tree.root);
		let unit = loader.load(&["utils".to_string(), "text".to_string()], Loc::default()).unwrap();
		assert_eq!(unit.name, "text");
	}

	#[test]
	fn loads_a_directory_module() {
		let tree = Tree::new(
			"dir",
			&[("pkg/a.nx", "global one: int = 1\n"), ("pkg/b.nx", "global two: int = 2\n")],
		);
		let mut loader = ModuleLoader::new(&tree.root);
		let unit = loader.load(&["pkg".to_string()], Loc::default()).unwrap();
		let ModuleKind::Dir(children) = &unit.kind else { panic!("expected a directory module") };
		let names: Vec<&str> = children.iter().map(|(n, _)| n.as_str()).collect();
		assert_eq!(names, vec!["a", "b"]);
	}

	#[test]
	fn missing_module_is_an_error() {
		let tree = Tree::new("missing", &[]);
		let mut loader = ModuleLoader::new(&tree.root);
		let err = loader.load(&["ghost".to_string()], Loc::default()).unwrap_err();
		assert!(matches!(err, NoxyError::Module(_)));
	}

	#[test]
	fn detects_import_cycles() {
		let tree = Tree::new("cycle", &[("a.nx", "use b\n"), ("b.nx", "use a\n")]);
		let mut loader = ModuleLoader::new(&tree.root);
		let err = loader.load(&["a".to_string()], Loc::default()).unwrap_err();
		assert!(err.to_string().contains("circular import"));
	}

	#[test]
	fn falls_back_to_the_stdlib_root() {
		let program = Tree::new("prog", &[]);
		let stdlib = Tree::new("stdlib", &[("mathlib.nx", "global pi: float = 3.141592\n")]);
		let mut loader = ModuleLoader::new(&program.root).with_stdlib(&stdlib.root);
		assert!(loader.load(&["mathlib".to_string()], Loc::default()).is_ok());
	}
}
