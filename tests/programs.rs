//! End-to-end tests: complete Noxy programs through the public driver,
//! asserting on exact captured output bytes.

use std::cell::RefCell;
use std::io::Write;
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

fn run(source: &str) -> Result<String, String> {
	run_with(source, Options::default())
}

fn run_with(source: &str, options: Options) -> Result<String, String> {
	let sink = Sink::default();
	let mut noxy = Noxy::with_output(".", options, Box::new(sink.clone()));
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
fn fibonacci() {
	let source = "\
func fib(n: int) -> int
	if n < 2 then
		return n
	else
		return fib(n - 1) + fib(n - 2)
	end
end
print(to_str(fib(10)))
";
	assert_eq!(out(source), "55\n");
}

#[test]
fn quicksort_by_value_and_by_ref() {
	let source = "\
func partition(a: ref int[], lo: int, hi: int) -> int
	let pivot: int = a[hi]
	let i: int = lo
	let j: int = lo
	while j < hi do
		if a[j] < pivot then
			let tmp: int = a[i]
			a[i] = a[j]
			a[j] = tmp
			i = i + 1
		end
		j = j + 1
	end
	let tmp: int = a[i]
	a[i] = a[hi]
	a[hi] = tmp
	return i
end

func quicksort(a: ref int[], lo: int, hi: int)
	if lo < hi then
		let p: int = partition(a, lo, hi)
		quicksort(a, lo, p - 1)
		quicksort(a, p + 1, hi)
	end
end

func sort_a_copy(a: int[])
	quicksort(ref a, 0, length(a) - 1)
end

let a: int[16] = [10, 7, 8, 9, 1, 5, 2, 6, 3, 4, 15, 12, 11, 14, 13, 0]
sort_a_copy(a)
print(a)
quicksort(ref a, 0, 15)
print(a)
";
	let expected_unsorted = "[10, 7, 8, 9, 1, 5, 2, 6, 3, 4, 15, 12, 11, 14, 13, 0]\n";
	let expected_sorted = "[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]\n";
	assert_eq!(out(source), format!("{expected_unsorted}{expected_sorted}"));
}

#[test]
fn struct_by_value_vs_by_ref() {
	let source = "\
struct C
	valor: int
end
func incC(c: C)
	c.valor = c.valor + 1
end
func incR(c: ref C)
	c.valor = c.valor + 1
end
let x: C = C(10)
incC(x)
print(to_str(x.valor))
incR(x)
print(to_str(x.valor))
";
	assert_eq!(out(source), "10\n11\n");
}

#[test]
fn fstring_formatting() {
	assert_eq!(out("let n: int = 42\nprint(f\"{n:05} {n:x}\")"), "00042 2a\n");
	assert_eq!(out("let p: float = 3.14159\nprint(f\"{p:.2f}\")"), "3.14\n");
	assert_eq!(out("print(f\"\")"), "\n");
}

#[test]
fn fstring_round_trips_with_to_str() {
	let source = "\
let n: int = 12345
let x: float = 2.5
let b: bool = true
let s: string = \"nx\"
print(f\"{n}\" == to_str(n))
print(f\"{x}\" == to_str(x))
print(f\"{b}\" == to_str(b))
print(f\"{s}\" == to_str(s))
";
	assert_eq!(out(source), "true\ntrue\ntrue\ntrue\n");
}

#[test]
fn linked_list_keeps_insertion_order() {
	let source = "\
struct Node
	valor: int
	proximo: ref Node
end
let n3: Node = Node(30, null)
let n2: Node = Node(20, ref n3)
let n1: Node = Node(10, ref n2)
let total: int = 0
let cursor: ref Node = ref n1
while cursor != null do
	print(cursor.valor)
	total = total + cursor.valor
	cursor = cursor.proximo
end
print(total)
";
	assert_eq!(out(source), "10\n20\n30\n60\n");
}

#[test]
fn reference_identity_and_null() {
	let source = "\
struct C
	v: int
end
let x: C = C(1)
print(ref x == ref x)
print(ref x == null)
let r: ref C = ref x
r = null
print(r == null)
";
	assert_eq!(out(source), "true\nfalse\ntrue\n");
}

#[test]
fn short_circuit_observably_skips() {
	let source = "\
func loud() -> bool
	print(\"evaluated\")
	return true
end
if false & loud() then
	print(\"unreachable\")
end
if true | loud() then
	print(\"taken\")
end
";
	assert_eq!(out(source), "taken\n");
}

#[test]
fn determinism_across_runs() {
	let source = "\
let m: map[string, int] = {\"b\": 2, \"a\": 1, \"c\": 3}
print(keys(m))
let d: int[] = [3, 1, 2]
print(d)
print(f\"{1.0:.3e}\")
";
	let first = out(source);
	let second = out(source);
	assert_eq!(first, second);
	assert_eq!(first, "[a, b, c]\n[3, 1, 2]\n1.000e+00\n");
}

#[test]
fn boundary_cases() {
	assert!(run("print(1 / 0)").unwrap_err().contains("division by zero"));
	assert!(run("let a: int[1] = [1]\nprint(a[1])").unwrap_err().contains("out of bounds"));
	assert!(
		run("let m: map[int, int] = {}\nprint(m[7])").unwrap_err().contains("no key")
	);
	assert_eq!(out("let z: int[0] = zeros(0)\nprint(length(z))"), "0\n");
	assert_eq!(out("let m: map[int, int] = {}\nm[1] = 1\nm[1] = 2\nprint(m[1])"), "2\n");
}

#[test]
fn diagnostics_carry_file_line_column() {
	let err = run("let x: int = 1.5").unwrap_err();
	assert!(err.starts_with("main.nx:1:"), "unexpected report: {err}");
	assert!(err.contains("type error"));

	let err = run("let x: int = )").unwrap_err();
	assert!(err.contains("parse error"));

	let err = run("print(\"unterminated").unwrap_err();
	assert!(err.contains("lex error"));
}

#[test]
fn no_typecheck_defers_errors_to_runtime() {
	let options = Options { debug: false, typecheck: false };
	let err = run_with("let x: int = 1 + true", options).unwrap_err();
	assert!(err.contains("runtime error"), "unexpected report: {err}");

	// A well-typed program still runs identically without the analyzer.
	let options = Options { debug: false, typecheck: false };
	assert_eq!(run_with("print(2 + 3)", options).unwrap(), "5\n");
}

#[test]
fn globals_persist_across_inputs() {
	let sink = Sink::default();
	let mut noxy = Noxy::with_output(".", Options::default(), Box::new(sink.clone()));
	noxy.run_source("let x: int = 40").unwrap();
	noxy.run_source("func double(n: int) -> int\n\treturn n * 2\nend").unwrap();
	noxy.run_source("print(double(x) + 4)").unwrap();
	let bytes = sink.0.borrow().clone();
	assert_eq!(String::from_utf8(bytes).unwrap(), "84\n");
}

#[test]
fn struct_copy_shares_ref_fields() {
	let source = "\
struct Leaf
	v: int
end
struct Tree
	tag: string
	leaf: ref Leaf
end
func rename(t: Tree)
	t.tag = \"copy\"
	t.leaf.v = 99
end
let leaf: Leaf = Leaf(1)
let tree: Tree = Tree(\"original\", ref leaf)
rename(tree)
print(tree.tag)
print(leaf.v)
";
	assert_eq!(out(source), "original\n99\n");
}

#[test]
fn maps_of_each_key_type() {
	let source = "\
let by_int: map[int, string] = {1: \"one\"}
let by_str: map[string, int] = {\"one\": 1}
let by_bool: map[bool, string] = {true: \"yes\", false: \"no\"}
print(by_int[1])
print(by_str[\"one\"])
print(by_bool[false])
";
	assert_eq!(out(source), "one\n1\nno\n");
}
