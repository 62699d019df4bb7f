use std::thread;

use tempfile::tempdir;

use super::*;

#[test]
fn test_write_checked_truncates() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("command");
  write_checked(&path, b"a much longer first command").unwrap();
  write_checked(&path, b"short").unwrap();
  assert_eq!(fs::read(&path).unwrap(), b"short");
}

#[test]
fn test_write_checked_reports_io_failure() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("missing-dir").join("command");
  let err = write_checked(&path, b"x").unwrap_err();
  assert!(matches!(err, IsoError::IoFailure { .. }));
}

#[test]
fn test_storage_blocking_publishes_directly() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("result0");
  let barrier = StorageBlocking;

  assert!(!barrier.is_complete(&path));
  barrier.publish(&path, b"unit").unwrap();
  assert!(barrier.is_complete(&path));
  barrier.wait_for(&path).unwrap();
  assert_eq!(fs::read(&path).unwrap(), b"unit");
  assert!(!CompletionMarker::partial_path(&path).exists());
}

#[test]
fn test_storage_blocking_ignores_half_written_unit() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("command");
  let barrier = StorageBlocking;

  // What a writer leaves behind mid-publish.
  fs::write(CompletionMarker::partial_path(&path), b"/data/run1.vti 1").unwrap();
  assert!(!barrier.is_complete(&path));

  barrier.reset(&path).unwrap();
  assert!(!CompletionMarker::partial_path(&path).exists());

  barrier.publish(&path, b"/data/run1.vti 1 1 0 0\n").unwrap();
  assert!(barrier.is_complete(&path));
  assert_eq!(fs::read(&path).unwrap(), b"/data/run1.vti 1 1 0 0\n");
}

#[test]
fn test_marker_publish_sequence() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("result0");
  let barrier = CompletionMarker::default();

  assert!(!barrier.is_complete(&path));
  barrier.publish(&path, b"unit").unwrap();

  assert!(barrier.is_complete(&path));
  assert!(CompletionMarker::marker_path(&path).exists());
  assert!(!CompletionMarker::partial_path(&path).exists());
  assert_eq!(fs::read(&path).unwrap(), b"unit");
}

#[test]
fn test_marker_reset_clears_stale_state() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("result1");
  let barrier = CompletionMarker::default();
  barrier.publish(&path, b"old").unwrap();
  fs::write(CompletionMarker::partial_path(&path), b"half").unwrap();

  barrier.reset(&path).unwrap();

  assert!(!barrier.is_complete(&path));
  assert!(!CompletionMarker::partial_path(&path).exists());
  // Reset twice is fine.
  barrier.reset(&path).unwrap();
}

#[test]
fn test_marker_wait_times_out() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("result2");
  let barrier = CompletionMarker::new(Duration::from_millis(1), Some(Duration::from_millis(20)));

  let err = barrier.wait_for(&path).unwrap_err();
  assert!(matches!(err, IsoError::ResultTimeout { .. }));
}

#[test]
fn test_marker_wait_returns_once_published() {
  let dir = tempdir().unwrap();
  let path = dir.path().join("result0");
  let barrier = CompletionMarker::new(Duration::from_millis(1), Some(Duration::from_secs(10)));

  let writer_path = path.clone();
  let writer = thread::spawn(move || {
    thread::sleep(Duration::from_millis(20));
    barrier.publish(&writer_path, b"late").unwrap();
  });

  barrier.wait_for(&path).unwrap();
  assert_eq!(fs::read(&path).unwrap(), b"late");
  writer.join().unwrap();
}

#[test]
fn test_marker_paths() {
  let path = Path::new("/fuse/result0");
  assert_eq!(
    CompletionMarker::marker_path(path),
    PathBuf::from("/fuse/result0.done")
  );
  assert_eq!(
    CompletionMarker::partial_path(path),
    PathBuf::from("/fuse/result0.partial")
  );
}
