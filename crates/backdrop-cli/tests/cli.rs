use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn backdrop(config_dir: &TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_backdrop"));
    command
        .env("BACKDROP_CONFIG_DIR", config_dir.path())
        .env_remove("BACKDROP_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

#[test]
fn still_writes_png_using_settings_file() {
    let config_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("settings.png");
    fs::write(
        config_dir.path().join("backdrop.toml"),
        format!(
            "[still]\ntime = \"2s\"\nwidth = 24\nheight = 16\noutput = {:?}\n",
            output.display().to_string()
        ),
    )
    .unwrap();

    let status = backdrop(&config_dir)
        .arg("still")
        .status()
        .expect("failed to run backdrop still");

    assert!(status.success());
    let image = fs::read(&output).unwrap();
    assert_eq!(&image[..4], b"\x89PNG");
}

#[test]
fn still_flags_override_settings() {
    let config_dir = TempDir::new().unwrap();
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("flag.png");

    let status = backdrop(&config_dir)
        .args(["still", "--time", "1.5", "--size", "8x8"])
        .arg(&output)
        .status()
        .expect("failed to run backdrop still");

    assert!(status.success());
    assert!(output.exists());
}

#[test]
fn simulate_reports_a_clean_teardown() {
    let config_dir = TempDir::new().unwrap();

    let result = backdrop(&config_dir)
        .args(["simulate", "--frames", "30", "--size", "320x200"])
        .output()
        .expect("failed to run backdrop simulate");

    assert!(result.status.success());
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("status:    Running"), "{stdout}");
    assert!(stdout.contains("backing:   160x100"), "{stdout}");
    assert!(stdout.contains("0 live after unmount"), "{stdout}");
}

#[test]
fn invalid_settings_file_fails() {
    let config_dir = TempDir::new().unwrap();
    fs::write(config_dir.path().join("backdrop.toml"), "scale = -2\n").unwrap();

    let result = backdrop(&config_dir)
        .args(["simulate", "--frames", "1"])
        .output()
        .expect("failed to run backdrop simulate");

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("scale must be greater than zero"), "{stderr}");
}
