use std::{
    env,
    path::PathBuf,
    process::{Command, Output},
};

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_cool-infer")
}

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn run(args: &[&str], file: &str) -> Output {
    Command::new(bin_path())
        .args(args)
        .arg(fixture(file))
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run cool-infer")
}

#[test]
fn infer_prints_the_rewritten_program() {
    let output = run(&["infer"], "points.cl");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "cool-infer failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("step(p : Point) : Int {"), "{stdout}");
    assert!(!stdout.contains("AUTO_TYPE"), "{stdout}");
}

#[test]
fn dump_bags_shows_final_candidates() {
    let output = run(&["infer", "--dump-bags"], "points.cl");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("method step"), "{stdout}");
    assert!(stdout.contains("p: {Point}"), "{stdout}");
}

#[test]
fn check_reports_semantic_errors_and_fails() {
    let output = run(&["check"], "mismatch.cl");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("Cannot convert \"Int\" into \"Bool\"."), "{stderr}");
    assert!(stderr.contains("Cannot convert \"Int\" into \"String\"."), "{stderr}");
}

#[test]
fn sweep_limit_fails_the_run() {
    let output = run(&["infer", "--max-sweeps", "1"], "points.cl");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("did not converge"), "{stderr}");
}

#[test]
fn rejects_other_extensions() {
    let output = Command::new(bin_path())
        .args(["check", "program.txt"])
        .output()
        .expect("failed to run cool-infer");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Only .cl files"));
}
