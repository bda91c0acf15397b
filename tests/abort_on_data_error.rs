//! Runs the built binary against an `i1k` document whose manifest
//! directory does not exist.

use std::{
    fs,
    path::PathBuf,
    process::{Command, Output},
};

const I1K_DOC: &str = "\
dataset: {name: i1k}
batchsize: 4
layers:
  - {type: linear, nout: 1000, activation: softmax}
cost: {type: cross_entropy_multi}
optimizer: {type: sgd, learning_rate: 0.01}
";

fn workdir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("modelrun-it-{label}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("model.yaml"), I1K_DOC).unwrap();
    dir
}

fn run(dir: &PathBuf, extra: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_modelrun"))
        .arg(dir.join("model.yaml"))
        .arg("-w")
        .arg(dir.join("no-such-data"))
        .arg("--no_progress_bar")
        .args(extra)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn abort_flag_logs_and_exits_with_status_one() {
    let dir = workdir("abort");
    let out = run(&dir, &["--abort_on_data_error"]);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert_eq!(out.status.code(), Some(1), "stderr: {stderr}");
    assert!(stderr.contains("Failed to set up the i1k data"), "stderr: {stderr}");
    assert!(out.stdout.is_empty());
}

#[test]
fn without_the_flag_the_error_propagates() {
    let dir = workdir("no-abort");
    let out = run(&dir, &[]);
    let stderr = String::from_utf8_lossy(&out.stderr);

    assert!(!out.status.success());
    assert!(stderr.contains("Failed to load dataset 'i1k'"), "stderr: {stderr}");
    assert!(!stderr.contains("Failed to set up the i1k data"), "stderr: {stderr}");
}
