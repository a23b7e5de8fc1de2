use cinderc::backend::{capture, run_jit};
use cinderc::{BuildError, CodegenError};
use stripmargin::StripMargin;

fn run_with_input(source: &str, input: &str) -> String {
    let (result, output) = capture(input, || run_jit(source));
    assert_eq!(result.unwrap(), 0);
    output
}

fn run(source: &str) -> String {
    run_with_input(source, "")
}

fn compile_errors(source: &str) -> Vec<CodegenError> {
    match run_jit(source) {
        Err(BuildError::Compile(errors)) => errors,
        other => panic!("expected compile errors, got {:?}", other),
    }
}

#[test]
fn scenario_a() {
    assert_eq!(run("i32 x = 5; write x;"), "5\n");
}

#[test]
fn scenario_b() {
    assert_eq!(run("i32 a = 2; i32 b = 3; i32 c = a + b; write c;"), "5\n");
}

#[test]
fn scenario_c() {
    let source = r#"bool t = true; if (t) { write "yes"; } else { write "no"; }"#;
    assert_eq!(run(source), "yes\n");
}

#[test]
fn scenario_d() {
    let source = "i32 i = 0; while (i < 3) { write i; i = i + 1; }";
    assert_eq!(run(source), "0\n1\n2\n");
}

#[test]
fn shadowed_name_is_restored() {
    let source = "
        |i32 x = 1;
        |if (x == 1) {
        |    i32 x = 2;
        |    write x;
        |}
        |write x;
        |"
    .strip_margin();
    assert_eq!(run(&source), "2\n1\n");
}

#[test]
fn if_elif_else() {
    let source = "
        |i32 g = 75;
        |if (g >= 90) { write 'A'; } elif (g >= 70) { write 'B'; } else { write 'C'; }
        |"
    .strip_margin();
    assert_eq!(run(&source), "B\n");
}

#[test]
fn for_with_break_and_continue() {
    let source = "
        |for (i32 i = 0; i < 10; i = i + 1) {
        |    if (i == 2) { continue; }
        |    if (i == 5) { break; }
        |    write i;
        |}
        |"
    .strip_margin();
    assert_eq!(run(&source), "0\n1\n3\n4\n");
}

#[test]
fn while_with_continue() {
    let source = "
        |i32 i = 0;
        |while (i < 5) {
        |    i = i + 1;
        |    if (i == 3) { continue; }
        |    write i;
        |}
        |"
    .strip_margin();
    assert_eq!(run(&source), "1\n2\n4\n5\n");
}

#[test]
fn do_while_runs_once() {
    let source = "i32 n = 5; do { write n; n = n + 1; } while (n < 3);";
    assert_eq!(run(source), "5\n");
}

#[test]
fn recursion() {
    let source = "
        |function i32 fib(i32 n) {
        |    if (n < 2) { return n; }
        |    return fib(n - 1) + fib(n - 2);
        |}
        |write fib(10);
        |"
    .strip_margin();
    assert_eq!(run(&source), "55\n");
}

#[test]
fn functions_with_parameters() {
    let source = r#"
        |function void greet(str name) { write "hi"; write name; }
        |greet("bob");
        |function idouble half(i32 n) { return n / 2.0; }
        |write half(3);
        |"#
    .strip_margin();
    assert_eq!(run(&source), "hi\nbob\n1.500000\n");
}

#[test]
fn functions_update_globals() {
    let source = "
        |i32 counter = 0;
        |function void bump() { counter = counter + 1; }
        |bump();
        |bump();
        |write counter;
        |"
    .strip_margin();
    assert_eq!(run(&source), "2\n");
}

#[test]
fn doubles() {
    let source = "
        |idouble d = 1.5;
        |idouble e = d * 2;
        |write e;
        |write 1 / 2;
        |write -d;
        |"
    .strip_margin();
    assert_eq!(run(&source), "3.000000\n0\n-1.500000\n");
}

#[test]
fn bools_and_chars() {
    let source = "
        |bool b = 3 > 2;
        |write b;
        |write not b;
        |char c = 'z';
        |write c;
        |write 'a' < c;
        |write b and 1 == 2;
        |"
    .strip_margin();
    assert_eq!(run(&source), "true\nfalse\nz\ntrue\nfalse\n");
}

#[test]
fn structs() {
    let source = "
        |struct Point { i32 x; i32 y; }
        |Point p = {1, 2};
        |p.y = p.x + 10;
        |write p.y;
        |Point q = p;
        |q.x = 7;
        |write (p.x, q.x);
        |"
    .strip_margin();
    assert_eq!(run(&source), "11\n1\n7\n");
}

#[test]
fn nested_structs_and_arrays_of_structs() {
    let source = "
        |struct Point { i32 x; i32 y; }
        |struct Line { Point a; Point b; }
        |Line l;
        |l.b.y = 9;
        |write l.b.y;
        |Point pts[2];
        |pts[1].x = 4;
        |write pts[1].x;
        |"
    .strip_margin();
    assert_eq!(run(&source), "9\n4\n");
}

#[test]
fn enums() {
    let source = r#"
        |enum Color { Red, Green = 5, Blue }
        |Color c = Blue;
        |write c;
        |write Color.Green;
        |if (c == Color.Blue) { write "blue"; }
        |"#
    .strip_margin();
    assert_eq!(run(&source), "6\n5\nblue\n");
}

#[test]
fn arrays() {
    let source = "
        |i32 a[5];
        |for (i32 i = 0; i < 5; i = i + 1) { a[i] = i * i; }
        |i32 sum = 0;
        |for (i32 j = 0; j < 5; j = j + 1) { sum = sum + a[j]; }
        |write sum;
        |i32 b[] = {4, 5, 6};
        |write b[2];
        |"
    .strip_margin();
    assert_eq!(run(&source), "30\n6\n");
}

#[test]
fn strings() {
    let source = r#"
        |str s = "hello";
        |write s;
        |write s[1];
        |char buf[] = "hey";
        |write buf;
        |write buf[2];
        |str const greeting = "hi";
        |write greeting;
        |"#
    .strip_margin();
    assert_eq!(run(&source), "hello\ne\nhey\ny\nhi\n");
}

#[test]
fn pointers() {
    let source = "
        |i32 x = 1;
        |i32 *p = &x;
        |*p = 42;
        |write x;
        |write *p + 1;
        |"
    .strip_margin();
    assert_eq!(run(&source), "42\n43\n");
}

#[test]
fn null_pointers() {
    let source = r#"
        |str s = null;
        |write s;
        |i32 *p = null;
        |if (p == null) { write "empty"; }
        |"#
    .strip_margin();
    assert_eq!(run(&source), "(null)\nempty\n");
}

#[test]
fn read_from_input() {
    let source = "
        |i32 n;
        |read n;
        |idouble d;
        |read d;
        |char c;
        |read c;
        |write n * 2;
        |write d;
        |write c;
        |"
    .strip_margin();
    assert_eq!(run_with_input(&source, "7 2.5\nq"), "14\n2.500000\nq\n");
}

#[test]
fn top_level_return_is_the_exit_code() {
    let (result, output) = capture("", || run_jit("write 1; return 3;"));
    assert_eq!(result.unwrap(), 3);
    assert_eq!(output, "1\n");
}

#[test]
fn undefined_name() {
    assert_eq!(
        compile_errors("write missing;"),
        vec![CodegenError::UndefinedName("missing".into())]
    );
}

#[test]
fn assignment_without_declaration() {
    assert_eq!(
        compile_errors("y = 3;"),
        vec![CodegenError::UnknownType("y".into())]
    );
}

#[test]
fn constants_cannot_be_assigned() {
    let errors = compile_errors("i32 const x = 1; x = 2;");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CodegenError::UnsupportedOperation(_)));
}

#[test]
fn independent_errors_are_all_reported() {
    let source = "
        |i32 a = 1;
        |i32 a = 2;
        |write b;
        |function i32 f() { return c; }
        |class Widget { }
        |write a;
        |"
    .strip_margin();
    let errors = compile_errors(&source);
    assert_eq!(
        errors[..3],
        [
            CodegenError::Redefinition("a".into()),
            CodegenError::UndefinedName("b".into()),
            CodegenError::UndefinedName("c".into()),
        ]
    );
    assert!(matches!(errors[3], CodegenError::UnsupportedOperation(_)));
    assert_eq!(errors.len(), 4);
}

#[test]
fn enclosing_locals_are_out_of_reach() {
    let source = "
        |function i32 outer() {
        |    i32 local = 1;
        |    function i32 inner() { return local; }
        |    return inner();
        |}
        |"
    .strip_margin();
    let errors = compile_errors(&source);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CodegenError::UnsupportedOperation(_)));
}

#[test]
fn out_of_bounds_constant_index() {
    let errors = compile_errors("i32 a[2]; a[2] = 1;");
    assert!(matches!(errors[..], [CodegenError::UnsupportedOperation(_)]));
}

#[test]
fn forward_calls_and_mutual_recursion() {
    let source = "
        |write seven();
        |write is_even(10);
        |write is_even(7);
        |function i32 seven() { return 7; }
        |function bool is_even(i32 n) {
        |    if (n == 0) { return true; }
        |    return is_odd(n - 1);
        |}
        |function bool is_odd(i32 n) {
        |    if (n == 0) { return false; }
        |    return is_even(n - 1);
        |}
        |"
    .strip_margin();
    assert_eq!(run(&source), "7\ntrue\nfalse\n");
}

#[test]
fn undefined_function() {
    assert_eq!(
        compile_errors("write nothing(1);"),
        vec![CodegenError::UndefinedName("nothing".into())]
    );
}

#[test]
fn logical_or() {
    let source = "
        |write 1 or 0;
        |write 0 or 0;
        |bool f = false;
        |write f or 2 > 1;
        |write not f or f;
        |"
    .strip_margin();
    assert_eq!(run(&source), "true\nfalse\ntrue\ntrue\n");
}

#[test]
fn nan_comparisons() {
    let source = "
        |idouble zero = 0.0;
        |idouble z = zero / zero;
        |write z == z;
        |write z != z;
        |write z < 1.0;
        |write 1.0 != 2.0;
        |"
    .strip_margin();
    assert_eq!(run(&source), "true\nfalse\nfalse\ntrue\n");
}

#[test]
fn partial_initializers_zero_the_rest_in_functions() {
    let source = "
        |struct Point { i32 x; i32 y; }
        |function void dirty() {
        |    i32 junk[4] = {7, 7, 7, 7};
        |    Point p = {7, 7};
        |    write junk[3] + p.y;
        |}
        |function void clean() {
        |    i32 a[4] = {1};
        |    Point p = {5};
        |    write a[3];
        |    write p.y;
        |}
        |dirty();
        |clean();
        |i32 g[4] = {1};
        |write g[3];
        |"
    .strip_margin();
    assert_eq!(run(&source), "14\n0\n0\n0\n");
}

#[test]
fn large_array_assignment() {
    let source = "
        |i32 a[100];
        |for (i32 i = 0; i < 100; i = i + 1) { a[i] = i; }
        |i32 b[100];
        |b = a;
        |a[99] = 0;
        |write b[99];
        |write a[99];
        |"
    .strip_margin();
    assert_eq!(run(&source), "99\n0\n");
}

#[test]
fn oversized_array_is_rejected() {
    let errors = compile_errors("i32 a[2000000000]; write 1;");
    assert!(matches!(errors[..], [CodegenError::UnsupportedOperation(_)]));
}

#[test]
fn far_constant_index_through_pointer_compiles() {
    let source = "
        |i32 *p = null;
        |if (p != null) { write p[1000000000]; }
        |write 1;
        |"
    .strip_margin();
    assert_eq!(run(&source), "1\n");
}
