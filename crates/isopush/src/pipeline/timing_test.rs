use super::*;

#[test]
fn test_entries_keep_order() {
  let mut timing = TimingRecord::new();
  timing.record(Stage::Io, Duration::from_millis(5));
  timing.record(Stage::Contour, Duration::from_millis(2));
  timing.record(Stage::Contour, Duration::from_millis(3));

  let stages: Vec<_> = timing.entries().iter().map(|(s, _)| *s).collect();
  assert_eq!(stages, vec![Stage::Io, Stage::Contour, Stage::Contour]);
  assert_eq!(timing.stages(), vec![Stage::Io, Stage::Contour]);
}

#[test]
fn test_get_sums_repeated_stages() {
  let mut timing = TimingRecord::new();
  timing.record(Stage::Contour, Duration::from_millis(2));
  timing.record(Stage::Contour, Duration::from_millis(3));

  assert_eq!(timing.get(Stage::Contour), Some(Duration::from_millis(5)));
  assert_eq!(timing.get(Stage::Render), None);
  assert_eq!(timing.total(), Duration::from_millis(5));
}

#[test]
fn test_time_records_closure() {
  let mut timing = TimingRecord::new();
  let value = timing.time(Stage::Encode, || {
    std::thread::sleep(Duration::from_millis(2));
    42
  });

  assert_eq!(value, 42);
  assert!(timing.get(Stage::Encode).unwrap() >= Duration::from_millis(2));
}

#[test]
fn test_display_lists_stages_and_total() {
  let mut timing = TimingRecord::new();
  timing.record(Stage::RoundTrip, Duration::from_millis(1500));
  timing.record(Stage::Decode, Duration::from_millis(250));

  let text = timing.to_string();
  let lines: Vec<_> = text.lines().collect();
  assert_eq!(lines.len(), 3);
  assert!(lines[0].starts_with("round_trip"));
  assert!(lines[0].contains("1.500000"));
  assert!(lines[1].starts_with("decode"));
  assert!(lines[2].starts_with("total"));
  assert!(lines[2].contains("1.750000"));
}

