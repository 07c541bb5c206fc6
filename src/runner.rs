// 该文件是 Tianmu （天目） 项目的一部分。
// src/runner.rs - 批量检测任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::ImageReader;
use tracing::{info, warn};

use crate::detector::Detect;
use crate::encode::encode;

#[cfg(feature = "draw")]
use crate::detector::Detection;
#[cfg(feature = "draw")]
use image::RgbImage;

/// 提交文件名
const SUMMIT_FILE: &str = "summit.csv";

/// 一张图像的提交记录：文件名与编码后的检测串（可为空）。
#[derive(Debug, Clone)]
pub struct ImageRecord {
  pub name: String,
  pub coordinate: String,
}

/// 推理失败时的处理策略。打开图像失败始终只跳过该文件；
/// 该策略决定推理阶段的失败是中止整个批次还是同样跳过。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
  /// 中止整个批次（默认）
  #[default]
  Abort,
  /// 记录后跳过该图像
  Skip,
}

/// 标注图像输出配置
#[cfg(feature = "draw")]
pub struct DrawSink {
  pub dir: PathBuf,
  pub palette: Vec<[u8; 3]>,
}

/// 批量检测任务：遍历图像目录，逐张推理并累积提交记录，
/// 最后在提交目录写出 summit.csv。
pub struct SubmitTask {
  img_root: PathBuf,
  summit_dir: PathBuf,
  policy: FailurePolicy,
  #[cfg(feature = "draw")]
  draw: Option<DrawSink>,
}

impl SubmitTask {
  pub fn new(img_root: impl Into<PathBuf>, summit_dir: impl Into<PathBuf>) -> Self {
    SubmitTask {
      img_root: img_root.into(),
      summit_dir: summit_dir.into(),
      policy: FailurePolicy::default(),
      #[cfg(feature = "draw")]
      draw: None,
    }
  }

  pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
    self.policy = policy;
    self
  }

  #[cfg(feature = "draw")]
  pub fn with_draw(mut self, dir: impl Into<PathBuf>, palette: Vec<[u8; 3]>) -> Self {
    self.draw = Some(DrawSink {
      dir: dir.into(),
      palette,
    });
    self
  }

  /// 执行批量检测。返回累积的提交记录，同时写出提交文件。
  ///
  /// 目录只遍历一层，子目录跳过；文件名排序后处理，保证两次运行
  /// 在相同输入下输出逐字节一致。无法打开的文件记录警告后跳过，
  /// 不产生任何记录。
  pub fn run_task<D: Detect>(&self, detector: &D) -> Result<Vec<ImageRecord>> {
    info!("开始批量检测: {}", self.img_root.display());

    let mut files = Vec::new();
    let entries = std::fs::read_dir(&self.img_root)
      .with_context(|| format!("无法读取图像目录 {}", self.img_root.display()))?;
    for entry in entries {
      let path = entry?.path();
      if path.is_dir() {
        continue;
      }
      files.push(path);
    }
    files.sort();

    let total = files.len();
    info!("共 {} 个文件", total);

    let mut records = Vec::with_capacity(total);
    for (index, path) in files.iter().enumerate() {
      let image = match ImageReader::open(path)
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode())
      {
        Ok(image) => image.to_rgb8(),
        Err(e) => {
          warn!("打开图像失败，请重试！{}: {}", path.display(), e);
          continue;
        }
      };

      let detections = match detector.detect(&image) {
        Ok(detections) => detections,
        Err(e) => match self.policy {
          FailurePolicy::Abort => {
            return Err(e).with_context(|| format!("推理失败: {}", path.display()));
          }
          FailurePolicy::Skip => {
            warn!("推理失败，跳过 {}: {}", path.display(), e);
            continue;
          }
        },
      };

      let coordinate = encode(&detections, image.dimensions());

      #[cfg(feature = "draw")]
      self.save_annotated(path, &image, &detections);

      let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
      records.push(ImageRecord { name, coordinate });

      print!("\r>> i = {} / {}", index + 1, total);
      let _ = std::io::stdout().flush();
    }
    println!();

    let summit_path = self.summit_dir.join(SUMMIT_FILE);
    write_summit(&records, &summit_path)
      .with_context(|| format!("无法写出提交文件 {}", summit_path.display()))?;
    info!("path = {}", summit_path.display());

    Ok(records)
  }

  #[cfg(feature = "draw")]
  fn save_annotated(&self, source: &Path, image: &RgbImage, detections: &[Detection]) {
    let Some(sink) = &self.draw else {
      return;
    };
    let Some(name) = source.file_name() else {
      return;
    };

    let mut annotated = image.clone();
    crate::draw::draw_detections(&mut annotated, detections, &sink.palette);

    let target = sink.dir.join(name);
    if let Err(e) = annotated.save(&target) {
      warn!("保存标注图像失败 {}: {}", target.display(), e);
    }
  }
}

/// 写出两列提交表：表头 name,coordinate，每行一张图像，无行号列。
fn write_summit(records: &[ImageRecord], path: &Path) -> std::io::Result<()> {
  let mut lines = Vec::with_capacity(records.len() + 1);
  lines.push("name,coordinate".to_string());
  for record in records {
    lines.push(format!(
      "{},{}",
      escape_field(&record.name),
      escape_field(&record.coordinate)
    ));
  }

  let mut content = lines.join("\n");
  content.push('\n');
  std::fs::write(path, content)
}

/// 字段含分隔符或引号时按 CSV 规则加引号转义。
fn escape_field(field: &str) -> String {
  if field.contains(',') || field.contains('"') || field.contains('\n') {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_string()
  }
}
