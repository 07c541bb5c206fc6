// 该文件是 Tianmu （天目） 项目的一部分。
// src/detector.rs - 目标检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::tract_ndarray::Array4;
use tract_onnx::prelude::Tensor;

use crate::config::{AnchorSet, ClassList};
use crate::model::{ModelError, YoloNetwork};

pub mod eval;
pub mod letterbox;

/// 置信度阈值
const SCORE_THRESHOLD: f32 = 0.3;
/// NMS IOU 阈值
const IOU_THRESHOLD: f32 = 0.45;
/// 默认模型输入尺寸（宽, 高）
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (416, 416);
/// 颜色表打乱所用的固定种子，保证多次运行颜色一致
const COLOR_SHUFFLE_SEED: u64 = 10101;

/// 检测结果
#[derive(Debug, Clone)]
pub struct Detection {
  /// 类别编号（类别表中的行号）
  pub class_id: usize,
  /// 置信度
  pub score: f32,
  /// 边界框，原图像素坐标
  pub bbox: [f32; 4], // [top, left, bottom, right]
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("模型输入尺寸 {0}x{1} 不是 32 的倍数")]
  InputSizeNotMultiple(u32, u32),
  #[error("图像过小，无法推理: {0}x{1}")]
  ImageTooSmall(u32, u32),
  #[error("推理失败: {0}")]
  Inference(#[from] ModelError),
}

/// 检测能力：单张图像进，检测结果出。
/// 批处理任务只依赖该接口。
pub trait Detect {
  type Error: std::error::Error + Send + Sync + 'static;

  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error>;
}

/// YOLO 目标检测器
pub struct Detector {
  network: YoloNetwork,
  classes: ClassList,
  anchors: AnchorSet,
  /// 固定输入尺寸（宽, 高），None 表示按图像尺寸自适应
  input_size: Option<(u32, u32)>,
  /// 置信度阈值
  score_threshold: f32,
  /// NMS IOU 阈值
  iou_threshold: f32,
  /// 每个类别的显示颜色
  colors: Vec<[u8; 3]>,
}

impl Detector {
  /// 创建检测器。固定输入尺寸必须是 32 的倍数，否则立即失败，不做取整。
  pub fn new(
    network: YoloNetwork,
    classes: ClassList,
    anchors: AnchorSet,
    input_size: Option<(u32, u32)>,
  ) -> Result<Self, DetectorError> {
    if let Some(size) = input_size {
      check_input_size(size)?;
    }

    let colors = generate_colors(classes.len());
    Ok(Detector {
      network,
      classes,
      anchors,
      input_size,
      score_threshold: SCORE_THRESHOLD,
      iou_threshold: IOU_THRESHOLD,
      colors,
    })
  }

  pub fn colors(&self) -> &[[u8; 3]] {
    &self.colors
  }

  /// 释放推理会话。提前中止时由析构兜底释放。
  pub fn close(self) {
    info!("释放推理会话");
    drop(self);
  }
}

impl Detect for Detector {
  type Error = DetectorError;

  fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    let (img_w, img_h) = image.dimensions();
    let target = target_size(self.input_size, (img_w, img_h));
    if target.0 == 0 || target.1 == 0 {
      return Err(DetectorError::ImageTooSmall(img_w, img_h));
    }

    let boxed = letterbox::letterbox_image(image, target);
    let (tw, th) = target;
    let input = Array4::from_shape_fn(
      (1, th as usize, tw as usize, 3),
      |(_, y, x, c)| boxed.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
    );

    let now = std::time::Instant::now();
    let outputs = self.network.forward(Tensor::from(input))?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let detections = eval::evaluate(
      &outputs,
      &self.anchors,
      self.classes.len(),
      target,
      (img_w, img_h),
      self.score_threshold,
      self.iou_threshold,
    );

    debug!("检测到 {} 个物体", detections.len());
    for det in &detections {
      debug!(
        "  - {}: {:.2}% at [{:.0}, {:.0}, {:.0}, {:.0}]",
        self.classes.get(det.class_id).unwrap_or("unknown"),
        det.score * 100.0,
        det.bbox[0],
        det.bbox[1],
        det.bbox[2],
        det.bbox[3]
      );
    }

    Ok(detections)
  }
}

fn check_input_size(size: (u32, u32)) -> Result<(), DetectorError> {
  let (width, height) = size;
  if width % 32 != 0 || height % 32 != 0 || width == 0 || height == 0 {
    return Err(DetectorError::InputSizeNotMultiple(width, height));
  }
  Ok(())
}

/// 推理目标尺寸：固定尺寸直接使用，自适应时把图像宽高
/// 各自向下取整到 32 的倍数。
fn target_size(input_size: Option<(u32, u32)>, image_size: (u32, u32)) -> (u32, u32) {
  match input_size {
    Some(size) => size,
    None => {
      let (w, h) = image_size;
      (w - w % 32, h - h % 32)
    }
  }
}

/// 为每个类别生成显示颜色：色相在类别数上均匀展开，
/// 再用固定种子打乱以使相邻类别颜色不相关。
/// 种子只作用于此处的局部随机数生成器。
fn generate_colors(count: usize) -> Vec<[u8; 3]> {
  let mut colors: Vec<[u8; 3]> = (0..count)
    .map(|i| hsv_to_rgb(i as f32 / count as f32, 1.0, 1.0))
    .collect();

  let mut rng = StdRng::seed_from_u64(COLOR_SHUFFLE_SEED);
  colors.shuffle(&mut rng);
  colors
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
  let i = (h * 6.0).floor();
  let f = h * 6.0 - i;
  let p = v * (1.0 - s);
  let q = v * (1.0 - f * s);
  let t = v * (1.0 - (1.0 - f) * s);

  let (r, g, b) = match (i as i32).rem_euclid(6) {
    0 => (v, t, p),
    1 => (q, v, p),
    2 => (p, v, t),
    3 => (p, q, v),
    4 => (t, p, v),
    _ => (v, p, q),
  };

  [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}
