// 该文件是 Tianmu （天目） 项目的一部分。
// src/draw.rs - 检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detector::Detection;

/// 未知类别的边框色
const FALLBACK_COLOR: [u8; 3] = [0, 0, 255];

/// 在图像上绘制全部检测框，颜色取类别对应的调色板颜色。
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection], palette: &[[u8; 3]]) {
  for det in detections {
    let color = palette
      .get(det.class_id)
      .copied()
      .unwrap_or(FALLBACK_COLOR);
    draw_bbox(image, &det.bbox, color);
  }
}

/// 绘制一个 [上, 左, 下, 右] 边框，坐标钳到图像范围内，线宽 2 像素。
fn draw_bbox(image: &mut RgbImage, bbox: &[f32; 4], color: [u8; 3]) {
  let (w, h) = (image.width() as i32, image.height() as i32);

  let top = (bbox[0].round() as i32).clamp(0, h - 1);
  let left = (bbox[1].round() as i32).clamp(0, w - 1);
  let bottom = (bbox[2].round() as i32).clamp(0, h - 1);
  let right = (bbox[3].round() as i32).clamp(0, w - 1);

  if left >= right || top >= bottom {
    return;
  }

  // 向内收缩一像素画第二圈，得到加粗边框
  for inset in 0..2 {
    let width = right - left - 2 * inset;
    let height = bottom - top - 2 * inset;
    if width <= 0 || height <= 0 {
      break;
    }
    let rect = Rect::at(left + inset, top + inset).of_size(width as u32, height as u32);
    draw_hollow_rect_mut(image, rect, Rgb(color));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn draws_border_in_class_color() {
    let mut image = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
    let detections = vec![Detection {
      class_id: 0,
      score: 0.9,
      bbox: [4.0, 4.0, 28.0, 28.0],
    }];
    draw_detections(&mut image, &detections, &[[255, 0, 0]]);

    assert_eq!(*image.get_pixel(4, 4), Rgb([255, 0, 0]));
    assert_eq!(*image.get_pixel(16, 16), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_boxes_draw_nothing() {
    let mut image = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
    let detections = vec![Detection {
      class_id: 0,
      score: 0.9,
      bbox: [10.0, 10.0, 10.0, 10.0],
    }];
    draw_detections(&mut image, &detections, &[[255, 0, 0]]);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn missing_palette_entry_falls_back() {
    let mut image = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
    let detections = vec![Detection {
      class_id: 7,
      score: 0.9,
      bbox: [2.0, 2.0, 14.0, 14.0],
    }];
    draw_detections(&mut image, &detections, &[]);
    assert_eq!(*image.get_pixel(2, 2), Rgb(FALLBACK_COLOR));
  }
}
