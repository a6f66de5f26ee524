use std::process::Command;

fn amoebots() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_amoebots"));
    cmd.env("RUST_LOG", "off").env_remove("AMOEBOTS_CONFIG");
    cmd
}

#[test]
fn headless_run_prints_grid_information() {
    let output = amoebots()
        .args([
            "--algorithm",
            "separation",
            "--shape",
            "hexagonal",
            "--size",
            "6",
            "--particles",
            "16",
            "--activations",
            "500",
            "--report-every",
            "250",
            "--seed",
            "7",
            "--param",
            "alpha=6",
        ])
        .output()
        .expect("failed to run amoebots binary");
    assert!(output.status.success(), "run failed: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("replica 0 (seed 7)"));
    assert!(stdout.contains("Activations run: 500"));
    assert!(stdout.contains("Same-class adjacencies"));
    assert!(stdout.contains("Invariants hold: true"));
}

#[test]
fn snapshot_file_holds_every_particle() {
    let path = std::env::temp_dir().join(format!("amoebots-snapshot-{}.json", std::process::id()));
    let status = amoebots()
        .args(["--particles", "10", "--activations", "200", "--seed", "3", "--size", "5"])
        .args(["--shape", "toroidal", "--snapshot"])
        .arg(&path)
        .status()
        .expect("failed to run amoebots binary");
    assert!(status.success());
    let raw = std::fs::read_to_string(&path).expect("snapshot written");
    let snapshot: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(snapshot["topology"]["shape"], "toroidal");
    assert_eq!(snapshot["particles"].as_array().map(Vec::len), Some(10));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn unknown_parameters_are_rejected() {
    let output = amoebots()
        .args(["--algorithm", "compression", "--param", "alpha=2", "--activations", "1"])
        .output()
        .expect("failed to run amoebots binary");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("alpha"));
}
