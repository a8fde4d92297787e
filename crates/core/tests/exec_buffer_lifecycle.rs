//! Exec buffer integration tests.
//!
//! These tests spawn real `sh` processes through the proxy:
//! start -> portable id -> resume elsewhere -> poll until the marker appears

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use vidkit_core::{
    process::{CommandArgument, ExecBufferFactory},
    FfmpegProcess, PortableId, ProcessConfig, ProcessError,
};

/// A process running `sh -c <script>` with its storage in `dir`.
fn shell_process(dir: &Path, script: &str) -> FfmpegProcess {
    let factory = Arc::new(ExecBufferFactory::new(dir));
    let mut process = FfmpegProcess::with_factory("sh", factory);
    process.add_pre_input_command("-c", CommandArgument::value(script), false);
    process
}

fn wait_for_completion(process: &FfmpegProcess) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !process.is_completed().unwrap() {
        assert!(Instant::now() < deadline, "process did not complete in time");
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_blocking_run_reports_exit_code_and_messages() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut process = shell_process(
        temp_dir.path(),
        "echo '[h264 @ 0x1f] missing reference'; echo 'Conversion failed!' >&2; exit 1",
    );
    process.execute().unwrap();

    assert!(process.is_completed().unwrap());
    assert_eq!(process.error_code().unwrap(), Some(1));
    assert!(process.has_error(false).unwrap());
    assert_eq!(
        process.last_line().unwrap().as_deref(),
        Some("Conversion failed!")
    );
    assert_eq!(
        process.messages().unwrap().get("h264", "0x1f"),
        Some(&["missing reference".to_string()][..])
    );
}

#[test]
fn test_failed_run_removes_written_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let output = temp_dir.path().join("out.mp4");

    // The output path is the trailing token, which `sh -c` binds to $0.
    let mut process = shell_process(temp_dir.path(), "printf partial > \"$0\"; exit 1");
    process.set_output_path(output.to_string_lossy());
    process.execute().unwrap();

    assert!(process.has_error(true).unwrap());
    assert!(!output.exists());
}

#[test]
fn test_storage_removed_when_blocking_process_dropped() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut process = shell_process(temp_dir.path(), "echo hi");
    process.execute().unwrap();

    let storage = process.buffer_output().unwrap().unwrap();
    assert!(storage.is_file());
    drop(process);
    assert!(!storage.exists());
}

#[test]
fn test_execute_after_start_waits_for_termination() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut process = shell_process(temp_dir.path(), "sleep 0.3; exit 2");
    process.start().unwrap();
    assert!(!process.is_completed().unwrap());

    process.execute().unwrap();
    assert!(process.is_completed().unwrap());
    assert_eq!(process.error_code().unwrap(), Some(2));
}

#[test]
fn test_execute_on_resumed_run_waits_for_marker() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = ProcessConfig::default().with_temp_dir(temp_dir.path());

    let mut process = shell_process(temp_dir.path(), "sleep 0.3; echo finished");
    process.start().unwrap();
    let id = process.portable_id().unwrap();

    let mut resumed = FfmpegProcess::resume(&id, &config).unwrap();
    resumed.execute().unwrap();
    assert!(resumed.is_completed().unwrap());
    assert_eq!(resumed.error_code().unwrap(), Some(0));
    assert_eq!(resumed.last_line().unwrap().as_deref(), Some("finished"));
}

#[test]
fn test_resume_non_blocking_run_from_portable_id() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = ProcessConfig::default().with_temp_dir(temp_dir.path());

    let rendered = {
        let mut process = shell_process(
            temp_dir.path(),
            "sleep 0.2; echo '[aac @ 0xa1] channel element not allocated'; exit 3",
        );
        process.start().unwrap();
        assert!(!process.is_completed().unwrap());
        process.portable_id().unwrap().to_string()
    };

    let id: PortableId = rendered.parse().unwrap();
    let resumed = FfmpegProcess::resume(&id, &config).unwrap();
    wait_for_completion(&resumed);

    assert_eq!(resumed.error_code().unwrap(), Some(3));
    assert!(resumed.has_error(false).unwrap());
    assert!(resumed.run_time().unwrap().is_some());
    assert_eq!(resumed.messages().unwrap().addresses("aac"), vec!["0xa1"]);
    assert!(!resumed
        .buffer(false)
        .unwrap()
        .unwrap_or_default()
        .contains(id.boundary()));

    // Storage is left for whoever holds the id.
    drop(resumed);
    assert!(id.storage_path(temp_dir.path()).is_file());
}

#[test]
fn test_resume_missing_storage_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = ProcessConfig::default().with_temp_dir(temp_dir.path());
    let id: PortableId = "gone.cafebabe.1700000000".parse().unwrap();

    let err = FfmpegProcess::resume(&id, &config).unwrap_err();
    assert!(matches!(err, ProcessError::StorageNotFound { .. }));
}
