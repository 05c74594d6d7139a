//! Runs the `nitro` binary end to end
//!
//! Skipped when the native library cannot be loaded, unless
//! `NITRO_REQUIRE_JSC` is set.

use std::io::Write;
use std::process::{Command, Output, Stdio};
use tempfile::NamedTempFile;

const REQUIRE_ENGINE_VAR: &str = "NITRO_REQUIRE_JSC";

fn engine_available() -> bool {
    match nitro_jsc_core::JscContext::new() {
        Ok(_) => true,
        Err(err) if std::env::var_os(REQUIRE_ENGINE_VAR).is_some() => {
            panic!("{REQUIRE_ENGINE_VAR} is set but JavaScriptCore is unavailable: {err}")
        }
        Err(err) => {
            eprintln!("skipping: JavaScriptCore not available: {err}");
            false
        }
    }
}

fn nitro(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_nitro"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn script(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".js").unwrap();
    file.write_all(source.as_bytes()).unwrap();
    file
}

fn path(file: &NamedTempFile) -> &str {
    file.path().to_str().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_option_e() {
    if !engine_available() {
        return;
    }
    let output = nitro(&["-e", "print('Hello')", "-e", "print('World')"], "");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "Hello\nWorld\n");
}

#[test]
fn test_option_f() {
    if !engine_available() {
        return;
    }
    let file = script("print('Hello World')");
    let output = nitro(&["-f", path(&file), "-f", path(&file)], "");
    assert_eq!(stdout(&output), "Hello World\nHello World\n");
}

#[test]
fn test_option_e_and_f_in_order() {
    if !engine_available() {
        return;
    }
    let file = script("print('Hello World')");
    let output = nitro(&["-f", path(&file), "-e", "print('Hello')"], "");
    assert_eq!(stdout(&output), "Hello World\nHello\n");
}

#[test]
fn test_main_script_runs_last_with_arguments() {
    if !engine_available() {
        return;
    }
    let main = script("print(x, ':', arguments.length, ':', arguments[1], arguments[2])");
    let output = nitro(&["-e", "var x = 'set'", path(&main), "one", "-two"], "");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "set:3:one-two\n");
}

#[test]
fn test_exception_sets_exit_status() {
    if !engine_available() {
        return;
    }
    let file = script("print('ran');\nthrow new RangeError('out of range')");
    let output = nitro(&["-f", path(&file), "-e", "print('skipped')"], "");
    assert!(!output.status.success());
    assert_eq!(stdout(&output), "ran\n");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains(&format!("Exception thrown: RangeError: out of range: at {}[2]", path(&file))),
        "{stderr}"
    );
}

#[test]
fn test_repl_after_queue() {
    if !engine_available() {
        return;
    }
    let output = nitro(&["-e", "var base = 40", "-f", "-"], "base + 2\n.exit\n");
    assert!(output.status.success());
    assert!(stdout(&output).contains("42\n"));
}

#[test]
fn test_repl_starts_after_unprintable_exception() {
    if !engine_available() {
        return;
    }
    let output = nitro(
        &["-e", "var e = new Error('m'); e.tag = Symbol('t'); throw e", "-f", "-"],
        "Symbol('x')\n6 * 7\n",
    );
    assert!(output.status.success());
    assert!(stdout(&output).contains("42\n"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Exception thrown: Error: m: at <command line>[1]"), "{stderr}");
    assert!(stderr.contains("   tag: <unprintable>"), "{stderr}");
    assert!(stderr.contains("Exception thrown: TypeError: "), "{stderr}");
    assert!(!stderr.contains("nitro: "), "{stderr}");
}

#[test]
fn test_repl_without_arguments() {
    if !engine_available() {
        return;
    }
    let output = nitro(&[], "print('typed')\n");
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("nitro> "));
    assert!(out.contains("typed\n"));
}

#[test]
fn test_missing_script_is_reported() {
    if !engine_available() {
        return;
    }
    let output = nitro(&["-f", "/nonexistent/nitro/missing.js"], "");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to read script"));
}
