use assert_cmd::prelude::{CommandCargoExt, OutputAssertExt};
use std::fs;
use std::process::Command;

fn cinderc() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

fn test_run(file_name: &str, stdout: &str) {
    cinderc()
        .arg(["tests/data/", file_name].concat())
        .arg("--run")
        .assert()
        .stdout(stdout.to_string())
        .success();
}

#[test]
fn fibonacci() {
    test_run("fib.cin", "0\n1\n1\n2\n3\n5\n8\n13\n");
}

#[test]
fn helloworld() {
    test_run("hello.cin", "Hello, world.\n");
}

#[test]
fn shapes() {
    test_run("shapes.cin", "12\n1\n1.333333\n");
}

#[test]
fn exit_code_of_main() {
    cinderc()
        .args(["tests/data/exit_code.cin", "--run"])
        .assert()
        .stdout("leaving\n")
        .code(3);
}

#[test]
fn compile_errors_fail() {
    let assert = cinderc()
        .args(["tests/data/errors.cin", "--emit", "obj"])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("redefinition of `x`"), "{}", stderr);
    assert!(stderr.contains("undefined name `y`"), "{}", stderr);
}

#[test]
fn missing_file() {
    cinderc().arg("tests/data/no_such_file.cin").assert().failure();
}

#[test]
fn missing_argument() {
    cinderc().assert().failure();
}

#[test]
fn emit_ir() {
    let assert = cinderc()
        .args(["tests/data/fib.cin", "--emit", "ir"])
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.contains("; fib"));
    assert!(stdout.contains("; main"));
    assert!(stdout.contains("function "));
}

#[test]
fn emit_object() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("hello.o");
    cinderc()
        .args(["tests/data/hello.cin", "--emit", "obj", "-o"])
        .arg(&output)
        .assert()
        .success();
    assert!(!fs::read(&output).unwrap().is_empty());
}

#[test]
fn native_executable() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("fib");
    cinderc()
        .args(["tests/data/fib.cin", "-o"])
        .arg(&output)
        .assert()
        .success();
    Command::new(&output)
        .assert()
        .stdout("0\n1\n1\n2\n3\n5\n8\n13\n")
        .success();
}
