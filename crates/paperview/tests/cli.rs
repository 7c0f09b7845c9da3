use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn write_scene(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("scene.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn check_reports_valid_scene() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("wave.frag"),
        "#version 300 es\nprecision mediump float;\nout vec4 fragColor;\nvoid main() { fragColor = vec4(1.0); }\n",
    )
    .unwrap();
    let scene = write_scene(
        &dir,
        r##"
version = 1
shader = "wave.frag"

[uniforms]
u_colorBack = { color = "#336699" }
"##,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_paperview"))
        .args(["check"])
        .arg(&scene)
        .output()
        .expect("failed to run paperview check");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("is valid"));
    assert!(stdout.contains("u_colorBack"));
    assert!(stdout.contains("vec4"));
}

#[test]
fn check_json_lists_uniform_kinds() {
    let dir = TempDir::new().unwrap();
    let scene = write_scene(
        &dir,
        r#"
version = 1
shader = "builtin:linear-gradient"

[playback]
speed = 0.5
start = "1s"

[uniforms]
u_mix = { float = 0.25 }
"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_paperview"))
        .args(["check", "--json"])
        .arg(&scene)
        .output()
        .expect("failed to run paperview check --json");

    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["shader"], "builtin:linear-gradient");
    assert_eq!(summary["speed"], 0.5);
    assert_eq!(summary["frame"], 1000.0);
    assert_eq!(summary["uniforms"]["u_mix"], "float");
    assert_eq!(summary["uniforms"]["u_fit"], "float");
}

#[test]
fn check_rejects_invalid_scene() {
    let dir = TempDir::new().unwrap();
    let scene = write_scene(&dir, "version = 3\nshader = \"builtin:solid\"\n");

    let status = Command::new(env!("CARGO_BIN_EXE_paperview"))
        .args(["check"])
        .arg(&scene)
        .status()
        .expect("failed to run paperview check");

    assert!(!status.success());
}

#[test]
fn color_prints_normalised_rgba() {
    let output = Command::new(env!("CARGO_BIN_EXE_paperview"))
        .args(["color", "rgb(255, 0, 0)"])
        .output()
        .expect("failed to run paperview color");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("vec4(1.0000, 0.0000, 0.0000, 1.0000)"));
    assert!(stdout.contains("#ff0000ff"));
}

#[test]
fn run_without_scene_fails_before_opening_a_window() {
    let output = Command::new(env!("CARGO_BIN_EXE_paperview"))
        .output()
        .expect("failed to run paperview");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no scene given"));
}
