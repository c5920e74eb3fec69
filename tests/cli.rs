//! Black-box tests of the `lox` and `loxc` binaries: the exit-code contract (0/65/70/1) and the
//! end-to-end scenarios, run against real stdout/stderr rather than in-process.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn script(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(source.as_bytes()).expect("failed to write script");
    file
}

fn lox() -> Command {
    Command::cargo_bin("lox").expect("lox binary should build")
}

fn loxc() -> Command {
    Command::cargo_bin("loxc").expect("loxc binary should build")
}

#[test]
fn tree_walk_runs_a_file_and_exits_zero() {
    let file = script("print 1 + 2 * 3;");
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("7\n"));
}

#[test]
fn tree_walk_classes_and_inheritance() {
    let file = script(
        r#"
        class A { greet() { print "hi from " + this.name; } }
        var a = A();
        a.name = "x";
        a.greet();
        "#,
    );
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("hi from x\n"));
}

#[test]
fn tree_walk_syntax_error_exits_65() {
    let file = script("var ;");
    lox().arg(file.path()).assert().code(65);
}

#[test]
fn tree_walk_runtime_error_exits_70() {
    let file = script(r#"print "a" + 1;"#);
    lox()
        .arg(file.path())
        .assert()
        .code(70)
        .stderr(predicate::str::contains("[line 1]"));
}

#[test]
fn tree_walk_missing_file_exits_1() {
    lox().arg("/no/such/file.lox").assert().code(1);
}

#[test]
fn tree_walk_recursive_fibonacci() {
    let file = script(
        "fun fib(n) { if (n < 2) return n; return fib(n-1) + fib(n-2); } print fib(10);",
    );
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("55\n"));
}

#[test]
fn bytecode_runs_a_file_and_exits_zero() {
    let file = script("print 1 + 2 * 3;");
    loxc()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("7\n"));
}

#[test]
fn bytecode_globals_persist_within_one_file() {
    let file = script("var a = 1; var b = 2; print a + b;");
    loxc()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("3\n"));
}

#[test]
fn bytecode_syntax_error_exits_65() {
    let file = script("print \"unterminated;");
    loxc().arg(file.path()).assert().code(65);
}

#[test]
fn bytecode_runtime_error_exits_70() {
    let file = script(r#"print 1 + "two";"#);
    loxc().arg(file.path()).assert().code(70);
}

#[test]
fn bytecode_missing_file_exits_1() {
    loxc().arg("/no/such/file.lox").assert().code(1);
}

#[test]
fn bytecode_while_loop() {
    let file = script("var i = 0; while (i < 3) { print i; i = i + 1; }");
    loxc()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("0\n1\n2\n"));
}
