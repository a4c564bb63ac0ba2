use std::process::Command;

fn shardctl() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shardctl"))
}

#[test]
fn missing_topology_file_is_a_startup_failure_reported_once() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");

    let output = shardctl()
        .arg("--topology")
        .arg(&missing)
        .env("RUST_LOG", "info")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Failed to load topology").count(), 1);
    assert!(output.stdout.is_empty());
}

#[test]
fn simulated_second_run_changes_nothing() {
    let output = shardctl()
        .args(["--simulate", "--runs", "2"])
        .env("RUST_LOG", "off")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let headlines = stdout
        .lines()
        .filter(|line| line.starts_with("Run "))
        .collect::<Vec<_>>();
    assert_eq!(headlines.len(), 2);
    assert!(headlines[1].contains(" 0 applied"));
    assert!(headlines[1].contains(" 0 failed"));
    assert!(stdout.contains("Intended topology:"));
}
