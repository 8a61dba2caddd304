//! Import system tests against the committed fixture modules in
//! `tests/fixtures/`.

use std::cell::RefCell;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use noxy::{Noxy, Options};

#[derive(Clone, Default)]
struct Sink(Rc<RefCell<Vec<u8>>>);

impl Write for Sink {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.0.borrow_mut().extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
}

fn fixtures() -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn run(source: &str) -> Result<String, String> {
	let sink = Sink::default();
	let mut noxy = Noxy::with_output(fixtures(), Options::default(), Box::new(sink.clone()));
	match noxy.run_source(source) {
		Ok(()) => {
			let bytes = sink.0.borrow().clone();
			Ok(String::from_utf8(bytes).expect("program output is UTF-8"))
		}
		Err(e) => Err(e.report("main.nx")),
	}
}

fn out(source: &str) -> String {
	match run(source) {
		Ok(output) => output,
		Err(e) => panic!("program failed: {e}"),
	}
}

#[test]
fn selective_import() {
	assert_eq!(out("use mathmod select add\nprint(to_str(add(2, 3)))"), "5\n");
	assert_eq!(out("use mathmod select add, mul\nprint(add(mul(2, 3), 4))"), "10\n");
}

#[test]
fn selective_import_of_globals() {
	assert_eq!(out("use mathmod select pi\nprint(pi > 3.14 & pi < 3.15)"), "true\n");
}

#[test]
fn namespace_import() {
	assert_eq!(out("use mathmod\nprint(mathmod.add(2, 3))"), "5\n");
	assert_eq!(out("use mathmod\nprint(mathmod.pi > 3.0)"), "true\n");
}

#[test]
fn aliased_import() {
	assert_eq!(out("use mathmod as m\nprint(m.mul(6, 7))"), "42\n");
}

#[test]
fn wildcard_import_from_a_file() {
	assert_eq!(out("use mathmod select *\nprint(add(1, 1))\nprint(pi > 3.0)"), "2\ntrue\n");
}

#[test]
fn directory_module_as_nested_namespaces() {
	assert_eq!(out("use geo\nprint(geo.shapes.rect_area(3, 4))"), "12\n");
	assert_eq!(out("use geo\nprint(geo.names.describe(\"map\"))"), "geo: map\n");
}

#[test]
fn wildcard_import_from_a_directory() {
	assert_eq!(out("use geo select *\nprint(shapes.square_area(5))"), "25\n");
}

#[test]
fn module_functions_see_their_own_globals() {
	// `circle_area` reads `pi` from mathmod's scope even though the
	// importer never imported `pi` itself.
	assert_eq!(
		out("use mathmod select circle_area\nprint(circle_area(1.0) > 3.14)"),
		"true\n"
	);
	// Same through a namespace.
	assert_eq!(out("use geo\nprint(geo.names.describe(\"x\"))"), "geo: x\n");
}

#[test]
fn transitive_imports() {
	assert_eq!(out("use chain select add_three\nprint(add_three(1, 2, 3))"), "6\n");
}

#[test]
fn module_globals_run_exactly_once() {
	let source = "\
use counter select next
use counter select base
print(next())
print(base)
";
	assert_eq!(out(source), "counter loaded\n42\n41\n");
}

#[test]
fn import_is_idempotent_across_namespace_and_select() {
	let source = "\
use counter
use counter as c
print(counter.next())
print(c.next())
";
	assert_eq!(out(source), "counter loaded\n42\n42\n");
}

#[test]
fn ambiguous_imports_are_rejected() {
	// Two modules each exporting an unrelated `add`.
	let err = run("use mathmod select add\nuse arith select add").unwrap_err();
	assert!(err.contains("ambiguous selective import"), "unexpected report: {err}");

	// A wildcard import colliding with an earlier selective one.
	let err = run("use mathmod select add\nuse arith select *").unwrap_err();
	assert!(err.contains("ambiguous selective import"), "unexpected report: {err}");

	// An import colliding with a local declaration of the same name.
	let err = run("func add(a: int, b: int) -> int\n\treturn a - b\nend\nuse mathmod select add")
		.unwrap_err();
	assert!(err.contains("ambiguous selective import"), "unexpected report: {err}");

	// The same collision with the declaration after the import reads as
	// a duplicate declaration instead; either way it is diagnosed.
	let err = run("use mathmod select add\nfunc add(a: int, b: int) -> int\n\treturn a - b\nend")
		.unwrap_err();
	assert!(err.contains("already declared"), "unexpected report: {err}");
}

#[test]
fn repeating_the_same_import_is_allowed() {
	let source = "use mathmod select add\nuse mathmod select add\nprint(add(1, 2))";
	assert_eq!(out(source), "3\n");
	let source = "use mathmod select *\nuse mathmod select *\nprint(add(1, 1))";
	assert_eq!(out(source), "2\n");
}

#[test]
fn ambiguity_is_caught_at_runtime_without_typecheck() {
	// The evaluator enforces the same rule when the analyzer is skipped.
	let sink = Sink::default();
	let options = Options { debug: false, typecheck: false };
	let mut noxy = Noxy::with_output(fixtures(), options, Box::new(sink.clone()));
	let err = noxy
		.run_source("use mathmod select add\nuse arith select add")
		.unwrap_err()
		.report("main.nx");
	assert!(err.contains("ambiguous selective import"), "unexpected report: {err}");
}

#[test]
fn missing_module_and_symbol_errors() {
	let err = run("use ghost").unwrap_err();
	assert!(err.contains("module error"), "unexpected report: {err}");
	assert!(err.contains("not found"));

	let err = run("use mathmod select nope").unwrap_err();
	assert!(err.contains("does not export"));
}

#[test]
fn unknown_member_is_a_type_error() {
	let err = run("use mathmod\nprint(mathmod.nothing)").unwrap_err();
	assert!(err.contains("no member"), "unexpected report: {err}");
}
