// 该文件是 Tianmu （天目） 项目的一部分。
// src/config.rs - 类别与锚框配置加载
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("锚框配置无效 {path}: {reason}")]
  InvalidAnchors { path: PathBuf, reason: String },
}

/// 类别名称表，类别编号即行号（按序、可重复）。
#[derive(Debug, Clone)]
pub struct ClassList {
  names: Vec<String>,
}

impl ClassList {
  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

/// 锚框表，(宽, 高) 对的有序序列。
/// 恰好 6 个锚框时对应 tiny 变体（2 个检测头），其余为完整变体（3 个检测头）。
#[derive(Debug, Clone)]
pub struct AnchorSet {
  anchors: Vec<(f32, f32)>,
}

impl AnchorSet {
  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<(f32, f32)> {
    self.anchors.get(index).copied()
  }
}

/// 从文本文件加载类别表，每行一个类别名，空行跳过，重复保留。
pub fn load_classes(path: &Path) -> Result<ClassList, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;

  let names: Vec<String> = content
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(str::to_string)
    .collect();

  debug!("从 {} 加载 {} 个类别", path.display(), names.len());
  Ok(ClassList { names })
}

/// 从文本文件加载锚框表：首行为逗号分隔的浮点数，两两组成 (宽, 高) 对。
pub fn load_anchors(path: &Path) -> Result<AnchorSet, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  let line = content.lines().next().unwrap_or("");

  let mut values = Vec::new();
  for token in line.split(',') {
    let token = token.trim();
    let value: f32 = token.parse().map_err(|_| ConfigError::InvalidAnchors {
      path: path.to_path_buf(),
      reason: format!("无法解析为数值: {:?}", token),
    })?;
    values.push(value);
  }

  if values.len() % 2 != 0 {
    return Err(ConfigError::InvalidAnchors {
      path: path.to_path_buf(),
      reason: format!("数值个数为奇数: {}", values.len()),
    });
  }

  let anchors: Vec<(f32, f32)> = values.chunks(2).map(|pair| (pair[0], pair[1])).collect();
  debug!("从 {} 加载 {} 个锚框", path.display(), anchors.len());
  Ok(AnchorSet { anchors })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
  }

  #[test]
  fn classes_preserve_order_and_duplicates() {
    let file = write_config("person\ncar\nperson\n");
    let classes = load_classes(file.path()).unwrap();
    assert_eq!(classes.len(), 3);
    assert_eq!(classes.get(0), Some("person"));
    assert_eq!(classes.get(1), Some("car"));
    assert_eq!(classes.get(2), Some("person"));
  }

  #[test]
  fn classes_skip_blank_lines_and_trim() {
    let file = write_config("  person \n\n\tcar\n   \n");
    let classes = load_classes(file.path()).unwrap();
    assert_eq!(classes.iter().collect::<Vec<_>>(), vec!["person", "car"]);
  }

  #[test]
  fn classes_missing_file_fails() {
    let result = load_classes(Path::new("/nonexistent/classes.txt"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
  }

  #[test]
  fn anchors_pairs_in_file_order() {
    let file = write_config("10,13,  16,30, 33,23\n");
    let anchors = load_anchors(file.path()).unwrap();
    assert_eq!(anchors.len(), 3);
    assert_eq!(anchors.get(0), Some((10.0, 13.0)));
    assert_eq!(anchors.get(1), Some((16.0, 30.0)));
    assert_eq!(anchors.get(2), Some((33.0, 23.0)));
  }

  #[test]
  fn anchors_only_first_line_is_read() {
    let file = write_config("10,13,16,30\n99,99\n");
    let anchors = load_anchors(file.path()).unwrap();
    assert_eq!(anchors.len(), 2);
  }

  #[test]
  fn anchors_odd_count_fails() {
    let file = write_config("10,13,16\n");
    let result = load_anchors(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidAnchors { .. })));
  }

  #[test]
  fn anchors_non_numeric_fails() {
    let file = write_config("10,13,abc,30\n");
    let result = load_anchors(file.path());
    assert!(matches!(result, Err(ConfigError::InvalidAnchors { .. })));
  }
}
