// 该文件是 Tianmu （天目） 项目的一部分。
// tests/batch_tests.rs - 批量检测任务集成测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;
use std::path::Path;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use tianmu::detector::{Detect, Detection};
use tianmu::runner::{FailurePolicy, SubmitTask};

/// 返回固定检测结果的检测器替身
struct FixedDetector;

impl Detect for FixedDetector {
  type Error = Infallible;

  fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, Infallible> {
    Ok(vec![
      Detection {
        class_id: 0,
        score: 0.9,
        bbox: [10.0, 5.0, 50.0, 45.0],
      },
      Detection {
        class_id: 1,
        score: 0.8,
        bbox: [20.0, 15.0, 60.0, 55.0],
      },
    ])
  }
}

/// 不产生检测结果的检测器替身
struct EmptyDetector;

impl Detect for EmptyDetector {
  type Error = Infallible;

  fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, Infallible> {
    Ok(Vec::new())
  }
}

#[derive(Debug, thiserror::Error)]
#[error("模拟推理失败")]
struct StubError;

/// 推理一定失败的检测器替身
struct FailingDetector;

impl Detect for FailingDetector {
  type Error = StubError;

  fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, StubError> {
    Err(StubError)
  }
}

fn write_image(path: &Path) {
  RgbImage::from_pixel(100, 100, Rgb([32, 64, 96]))
    .save(path)
    .unwrap();
}

fn fixture_dirs() -> (TempDir, TempDir) {
  (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap())
}

#[test]
fn corrupt_files_are_skipped_without_record() {
  let (img_root, summit_dir) = fixture_dirs();
  write_image(&img_root.path().join("a.png"));
  write_image(&img_root.path().join("b.png"));
  std::fs::write(img_root.path().join("broken.jpg"), b"not an image").unwrap();

  let task = SubmitTask::new(img_root.path(), summit_dir.path());
  let records = task.run_task(&FixedDetector).unwrap();

  assert_eq!(records.len(), 2);
  assert_eq!(records[0].name, "a.png");
  assert_eq!(records[1].name, "b.png");
  assert_eq!(records[0].coordinate, "15_20_40_40;5_10_40_40");

  let content = std::fs::read_to_string(summit_dir.path().join("summit.csv")).unwrap();
  let lines: Vec<&str> = content.lines().collect();
  assert_eq!(lines.len(), 3);
  assert_eq!(lines[0], "name,coordinate");
  assert_eq!(lines[1], "a.png,15_20_40_40;5_10_40_40");
}

#[test]
fn empty_directory_yields_header_only() {
  let (img_root, summit_dir) = fixture_dirs();

  let task = SubmitTask::new(img_root.path(), summit_dir.path());
  let records = task.run_task(&FixedDetector).unwrap();

  assert!(records.is_empty());
  let content = std::fs::read_to_string(summit_dir.path().join("summit.csv")).unwrap();
  assert_eq!(content, "name,coordinate\n");
}

#[test]
fn subdirectories_are_not_descended() {
  let (img_root, summit_dir) = fixture_dirs();
  write_image(&img_root.path().join("a.png"));
  let nested = img_root.path().join("nested");
  std::fs::create_dir(&nested).unwrap();
  write_image(&nested.join("hidden.png"));

  let task = SubmitTask::new(img_root.path(), summit_dir.path());
  let records = task.run_task(&FixedDetector).unwrap();

  assert_eq!(records.len(), 1);
  assert_eq!(records[0].name, "a.png");
}

#[test]
fn records_come_out_in_sorted_filename_order() {
  let (img_root, summit_dir) = fixture_dirs();
  for name in ["c.png", "a.png", "b.png"] {
    write_image(&img_root.path().join(name));
  }

  let task = SubmitTask::new(img_root.path(), summit_dir.path());
  let records = task.run_task(&EmptyDetector).unwrap();

  let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
  assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
  assert!(records.iter().all(|r| r.coordinate.is_empty()));
}

#[test]
fn rerun_produces_identical_output() {
  let (img_root, summit_dir) = fixture_dirs();
  write_image(&img_root.path().join("a.png"));
  write_image(&img_root.path().join("b.png"));

  let task = SubmitTask::new(img_root.path(), summit_dir.path());
  task.run_task(&FixedDetector).unwrap();
  let first = std::fs::read_to_string(summit_dir.path().join("summit.csv")).unwrap();
  task.run_task(&FixedDetector).unwrap();
  let second = std::fs::read_to_string(summit_dir.path().join("summit.csv")).unwrap();

  assert_eq!(first, second);
}

#[test]
fn abort_policy_stops_batch_without_summit_file() {
  let (img_root, summit_dir) = fixture_dirs();
  write_image(&img_root.path().join("a.png"));

  let task =
    SubmitTask::new(img_root.path(), summit_dir.path()).with_policy(FailurePolicy::Abort);
  let result = task.run_task(&FailingDetector);

  assert!(result.is_err());
  assert!(!summit_dir.path().join("summit.csv").exists());
}

#[test]
fn skip_policy_continues_past_detect_failures() {
  let (img_root, summit_dir) = fixture_dirs();
  write_image(&img_root.path().join("a.png"));
  write_image(&img_root.path().join("b.png"));

  let task =
    SubmitTask::new(img_root.path(), summit_dir.path()).with_policy(FailurePolicy::Skip);
  let records = task.run_task(&FailingDetector).unwrap();

  assert!(records.is_empty());
  let content = std::fs::read_to_string(summit_dir.path().join("summit.csv")).unwrap();
  assert_eq!(content, "name,coordinate\n");
}
