// 该文件是 Tianmu （天目） 项目的一部分。
// src/encode.rs - 检测结果文本编码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::detector::Detection;

/// 把一张图像的检测结果编码为提交格式的紧凑字符串。
///
/// 按检测结果的逆序逐框输出：坐标四舍五入后，上/左钳到 0 以上，
/// 下/右钳到图像高/宽以内，再换算为 `左_上_宽_高`，多个框以 `;` 连接。
/// 无检测时返回空字符串。字段顺序与分隔符是下游约定，逐字节固定。
pub fn encode(detections: &[Detection], image_size: (u32, u32)) -> String {
  let (img_w, img_h) = image_size;
  let mut parts = Vec::with_capacity(detections.len());

  for det in detections.iter().rev() {
    let [top, left, bottom, right] = det.bbox;
    let top = (top.round() as i64).max(0);
    let left = (left.round() as i64).max(0);
    let bottom = (bottom.round() as i64).min(img_h as i64);
    let right = (right.round() as i64).min(img_w as i64);

    let width = right - left;
    let height = bottom - top;
    parts.push(format!("{}_{}_{}_{}", left, top, width, height));
  }

  parts.join(";")
}
