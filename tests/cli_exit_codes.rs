//! Exit status and error reporting of the `bg-remover` binary

#[cfg(feature = "tract")]
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn bg_remover(args: &[&str]) -> Output {
    bg_remover_with_env(args, &[])
}

fn bg_remover_with_env(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_bg-remover"));
    command
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("IMGLY_PUBLIC_PATH");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().expect("failed to run bg-remover")
}

#[cfg(feature = "tract")]
fn write_png(path: &Path) {
    image::RgbImage::from_pixel(16, 12, image::Rgb([40, 90, 160]))
        .save(path)
        .unwrap();
}

#[test]
fn test_missing_input_exits_with_one() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("does-not-exist.png");
    let output = temp.path().join("out/result.png");

    let result = bg_remover(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]);

    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Error: Input file not found"), "stderr: {stderr}");
    assert!(!output.exists());
    assert!(!output.parent().unwrap().exists());
}

#[test]
fn test_conflicting_modes_exit_with_one() {
    let result = bg_remover(&[
        "-i",
        "a.png",
        "-o",
        "b.png",
        "--remove-foreground",
        "--segment-only",
    ]);
    assert_eq!(result.status.code(), Some(1));
}

#[test]
fn test_missing_required_arguments_exit_with_one() {
    let result = bg_remover(&["-i", "a.png"]);
    assert_eq!(result.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&result.stderr).contains("--output"));
}

#[test]
fn test_help_exits_with_zero() {
    let result = bg_remover(&["--help"]);
    assert_eq!(result.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("--remove-foreground"));
    assert!(stdout.contains("--segment-only"));
}

#[test]
fn test_debug_prints_error_details() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("missing.png");
    let output = temp.path().join("out.png");

    let result = bg_remover(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--debug",
    ]);

    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    // the summary line plus the full error report
    assert!(
        stderr.matches("Input file not found").count() >= 2,
        "stderr: {stderr}"
    );
}

#[test]
fn test_missing_input_wins_over_unavailable_engine() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("missing.png");
    let output = temp.path().join("out.png");

    // whether or not the onnx engine is compiled in, the input is checked first
    let result = bg_remover(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
        "--engine",
        "onnx",
    ]);

    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Error: Input file not found"), "stderr: {stderr}");
    assert!(!stderr.contains("not available"), "stderr: {stderr}");
}

#[cfg(feature = "tract")]
#[test]
fn test_missing_model_points_at_public_path() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("photo.png");
    let output = temp.path().join("out.png");
    write_png(&input);
    let public_path = format!("file://{}/assets/", temp.path().display());

    let result = bg_remover_with_env(
        &["-i", input.to_str().unwrap(), "-o", output.to_str().unwrap()],
        &[("IMGLY_PUBLIC_PATH", public_path.as_str())],
    );

    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Model file not found"), "stderr: {stderr}");
    assert!(
        stderr.contains(&format!("Hint: models are resolved from {public_path}models/")),
        "stderr: {stderr}"
    );
    assert!(!output.exists());
}

#[cfg(feature = "tracing-json")]
#[test]
fn test_json_log_format_emits_json_lines() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("missing.png");

    let result = bg_remover(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        "out.png",
        "--log-format",
        "json",
        "-vv",
    ]);

    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr
            .lines()
            .any(|line| line.starts_with('{') && line.contains("\"level\":\"DEBUG\"")),
        "stderr: {stderr}"
    );
}

#[cfg(not(feature = "tracing-json"))]
#[test]
fn test_json_log_format_without_feature_warns() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("missing.png");

    let result = bg_remover(&[
        "-i",
        input.to_str().unwrap(),
        "-o",
        "out.png",
        "--log-format",
        "json",
    ]);

    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("Warning: Log format 'json'"), "stderr: {stderr}");
    assert!(stderr.contains("Error: Input file not found"), "stderr: {stderr}");
}
