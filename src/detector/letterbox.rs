// 该文件是 Tianmu （天目） 项目的一部分。
// src/detector/letterbox.rs - 保持纵横比的图像缩放
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// 画布填充色
const PAD_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

/// 把图像缩放到目标尺寸，保持纵横比，空余部分以灰色填充并居中。
pub fn letterbox_image(image: &RgbImage, size: (u32, u32)) -> RgbImage {
  let (iw, ih) = image.dimensions();
  let (w, h) = size;

  let scale = (w as f32 / iw as f32).min(h as f32 / ih as f32);
  let nw = ((iw as f32 * scale) as u32).max(1);
  let nh = ((ih as f32 * scale) as u32).max(1);

  let resized = imageops::resize(image, nw, nh, FilterType::CatmullRom);
  let mut canvas = RgbImage::from_pixel(w, h, PAD_COLOR);
  imageops::overlay(
    &mut canvas,
    &resized,
    ((w - nw) / 2) as i64,
    ((h - nh) / 2) as i64,
  );
  canvas
}
