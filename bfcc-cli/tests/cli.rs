use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::cargo_bin("bfcc").unwrap();
    cmd.timeout(Duration::from_secs(20));
    cmd
}

fn hello_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../test_programs/hello.bf")
}

#[test]
fn test_compile_and_run_artifact() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("hello.exe");

    cargo_bin()
        .arg("compile")
        .arg(hello_path())
        .arg(&artifact)
        .args(["--optimize", "BOTH"])
        .assert()
        .success();

    Command::new(&artifact)
        .timeout(Duration::from_secs(20))
        .assert()
        .success()
        .stdout("Hello World!\n");
}

#[test]
fn test_interpreter_artifact_reads_input() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("echo.bf");
    let artifact = dir.path().join("echo");
    fs::write(&source, "read until end of input\n,[.,]").unwrap();

    cargo_bin()
        .arg("compile")
        .arg(&source)
        .arg(&artifact)
        .args(["--engine", "interpreter", "-O", "value"])
        .assert()
        .success();

    Command::new(&artifact)
        .timeout(Duration::from_secs(20))
        .write_stdin("grüße")
        .assert()
        .success()
        .stdout("grüße");
}

#[test]
fn test_syntax_error() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("broken.bf");
    let artifact = dir.path().join("broken");
    fs::write(&source, "+\n+[.").unwrap();

    cargo_bin()
        .arg("compile")
        .arg(&source)
        .arg(&artifact)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("[PARSE] Unclosed loop at row 2, column 2"));

    assert!(!artifact.exists());
}

#[test]
fn test_unmatched_close() {
    cargo_bin()
        .args(["run", "-"])
        .write_stdin("+]")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[PARSE] Badly closed loop at row 1, column 2"));
}

#[test]
fn test_invalid_configuration() {
    cargo_bin()
        .args(["run", "-", "--optimize", "fast"])
        .write_stdin("+.")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[BUILD]").and(predicate::str::contains("fast")));

    cargo_bin()
        .args(["run", "-", "--buffer-size", "0"])
        .write_stdin("+.")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[BUILD] Invalid buffer size 0"));
}

#[test]
fn test_run_from_stdin() {
    for jit in [false, true] {
        let mut cmd = cargo_bin();
        cmd.args(["run", "-"]);
        if jit {
            cmd.arg("--jit");
        }

        cmd.write_stdin("++++++++[>++++++++<-]>+.")
            .assert()
            .success()
            .stdout("A");
    }
}

#[test]
fn test_debug_print() {
    cargo_bin()
        .args(["run", "-", "--debug"])
        .write_stdin("+++?>>-?")
        .assert()
        .success()
        .stdout("[0:3][2:65535]");
}

#[test]
fn test_pointer_out_of_bounds() {
    cargo_bin()
        .args(["run", "-", "--buffer-size", "2"])
        .write_stdin(">>+")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Pointer 2 is outside of the buffer with 2 cells"));
}

#[test]
fn test_dump_ir() {
    cargo_bin()
        .args(["compile", "--format", "ir", "-"])
        .write_stdin("+[-]")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("PTR_INIT")
                .and(predicate::str::contains("BUF_INIT 65536"))
                .and(predicate::str::contains("JZ L1"))
                .and(predicate::str::contains("HALT")),
        );
}

#[test]
fn test_emit_rust() {
    cargo_bin()
        .args(["compile", "--format", "rust", "-"])
        .write_stdin("+[-].")
        .assert()
        .success()
        .stdout(predicate::str::contains("while rt.value() != 0 {").and(predicate::str::contains("fn main()")));
}

#[test]
fn test_missing_source() {
    cargo_bin()
        .args(["run", "does-not-exist.bf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Source file not found"));
}

#[test]
fn test_run_with_jit_level() {
    for level in ["none", "speed", "speed_and_size"] {
        cargo_bin()
            .args(["run", "-", "--jit", "--jit-level", level])
            .write_stdin("++++++++[>++++++++<-]>++.")
            .assert()
            .success()
            .stdout("B");
    }
}

#[test]
fn test_syntax_error_location_with_crlf() {
    cargo_bin()
        .args(["run", "-"])
        .write_stdin("+\r\n+]")
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("Badly closed loop at row 2, column 2")
                .and(predicate::str::contains("<stdin>:2:2")),
        );
}
