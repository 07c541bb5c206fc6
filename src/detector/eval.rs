// 该文件是 Tianmu （天目） 项目的一部分。
// src/detector/eval.rs - 检测头解码与非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::{debug, error};
use tract_onnx::prelude::tract_ndarray::ArrayD;

use crate::config::AnchorSet;
use crate::detector::Detection;

/// 锚框到检测头的分配，检测头按输出顺序从粗到细。
const ANCHOR_MASKS_FULL: [[usize; 3]; 3] = [[6, 7, 8], [3, 4, 5], [0, 1, 2]];
const ANCHOR_MASKS_TINY: [[usize; 3]; 2] = [[3, 4, 5], [0, 1, 2]];

/// 把各检测头的原始输出转换为原图坐标下的检测结果：
/// 逐格解码、按置信度过滤、反算 letterbox 坐标、逐类别 NMS。
/// 输出顺序为类别升序，类别内按置信度降序。
pub fn evaluate(
  outputs: &[ArrayD<f32>],
  anchors: &AnchorSet,
  num_classes: usize,
  input_size: (u32, u32),
  image_size: (u32, u32),
  score_threshold: f32,
  iou_threshold: f32,
) -> Vec<Detection> {
  let masks: &[[usize; 3]] = match outputs.len() {
    2 => &ANCHOR_MASKS_TINY,
    3 => &ANCHOR_MASKS_FULL,
    n => {
      error!("检测头数量异常: {}, 无法分配锚框", n);
      return Vec::new();
    }
  };

  let correction = BoxCorrection::new(input_size, image_size);
  let mut candidates = Vec::new();

  for (head_idx, (output, mask)) in outputs.iter().zip(masks).enumerate() {
    decode_head(
      head_idx,
      output,
      mask,
      anchors,
      num_classes,
      input_size,
      &correction,
      score_threshold,
      &mut candidates,
    );
  }

  debug!("阈值过滤后候选框数量: {}", candidates.len());

  // 逐类别抑制，保持类别升序输出
  let mut detections = Vec::new();
  for class_id in 0..num_classes {
    let class_boxes: Vec<Detection> = candidates
      .iter()
      .filter(|det| det.class_id == class_id)
      .cloned()
      .collect();
    if class_boxes.is_empty() {
      continue;
    }
    detections.extend(nms(class_boxes, iou_threshold));
  }

  detections
}

/// 解码单个检测头的输出张量，形状应为 [1, 格高, 格宽, 锚框数 * (5 + 类别数)]。
/// 形状不符时记录错误并跳过该检测头。
#[allow(clippy::too_many_arguments)]
fn decode_head(
  head_idx: usize,
  output: &ArrayD<f32>,
  mask: &[usize; 3],
  anchors: &AnchorSet,
  num_classes: usize,
  input_size: (u32, u32),
  correction: &BoxCorrection,
  score_threshold: f32,
  candidates: &mut Vec<Detection>,
) {
  let shape = output.shape();
  let stride = num_classes + 5;
  let expected = mask.len() * stride;

  if shape.len() != 4 || shape[0] != 1 || shape[3] != expected {
    error!(
      "检测头 {}: 输出形状不匹配 - 实际 {:?}, 期望 [1, 格高, 格宽, {}]",
      head_idx, shape, expected
    );
    return;
  }

  let (grid_h, grid_w) = (shape[1], shape[2]);
  let (input_w, input_h) = (input_size.0 as f32, input_size.1 as f32);

  for y in 0..grid_h {
    for x in 0..grid_w {
      for (slot, &anchor_idx) in mask.iter().enumerate() {
        let Some((anchor_w, anchor_h)) = anchors.get(anchor_idx) else {
          error!("检测头 {}: 锚框编号 {} 超出锚框表", head_idx, anchor_idx);
          continue;
        };
        let base = slot * stride;

        let confidence = sigmoid(output[[0, y, x, base + 4]]);

        // 中心与宽高，均归一化到模型输入
        let cx = (sigmoid(output[[0, y, x, base]]) + x as f32) / grid_w as f32;
        let cy = (sigmoid(output[[0, y, x, base + 1]]) + y as f32) / grid_h as f32;
        let bw = output[[0, y, x, base + 2]].exp() * anchor_w / input_w;
        let bh = output[[0, y, x, base + 3]].exp() * anchor_h / input_h;

        for class_id in 0..num_classes {
          let score = confidence * sigmoid(output[[0, y, x, base + 5 + class_id]]);
          if score < score_threshold {
            continue;
          }
          candidates.push(Detection {
            class_id,
            score,
            bbox: correction.to_image_box(cx, cy, bw, bh),
          });
        }
      }
    }
  }
}

/// letterbox 的逆变换：把归一化到模型输入的框坐标还原到原图像素坐标。
struct BoxCorrection {
  offset: (f32, f32),
  scale: (f32, f32),
  image_size: (f32, f32),
}

impl BoxCorrection {
  fn new(input_size: (u32, u32), image_size: (u32, u32)) -> Self {
    let (input_w, input_h) = (input_size.0 as f32, input_size.1 as f32);
    let (img_w, img_h) = (image_size.0 as f32, image_size.1 as f32);

    // 与 letterbox 相同的缩放与取整，保证坐标还原一致
    let scale = (input_w / img_w).min(input_h / img_h);
    let new_w = ((img_w * scale) as u32).max(1) as f32;
    let new_h = ((img_h * scale) as u32).max(1) as f32;

    BoxCorrection {
      offset: (
        (input_w - new_w) / 2.0 / input_w,
        (input_h - new_h) / 2.0 / input_h,
      ),
      scale: (input_w / new_w, input_h / new_h),
      image_size: (img_w, img_h),
    }
  }

  /// 输入为归一化到模型输入的中心点与宽高，输出 [上, 左, 下, 右] 原图像素坐标。
  fn to_image_box(&self, cx: f32, cy: f32, bw: f32, bh: f32) -> [f32; 4] {
    let x = (cx - self.offset.0) * self.scale.0;
    let y = (cy - self.offset.1) * self.scale.1;
    let w = bw * self.scale.0;
    let h = bh * self.scale.1;

    let (img_w, img_h) = self.image_size;
    [
      (y - h / 2.0) * img_h,
      (x - w / 2.0) * img_w,
      (y + h / 2.0) * img_h,
      (x + w / 2.0) * img_w,
    ]
  }
}

/// 贪心非极大值抑制，输入为同一类别的候选框。
fn nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
  detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

  let mut result = Vec::new();
  while !detections.is_empty() {
    let best = detections.remove(0);
    detections.retain(|det| iou(&best.bbox, &det.bbox) < iou_threshold);
    result.push(best);
  }
  result
}

/// 两个 [上, 左, 下, 右] 框的交并比。
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let top = a[0].max(b[0]);
  let left = a[1].max(b[1]);
  let bottom = a[2].min(b[2]);
  let right = a[3].min(b[3]);

  let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
