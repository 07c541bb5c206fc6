// 该文件是 Tianmu （天目） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;

use tianmu::runner::FailurePolicy;

/// Tianmu 批量检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件路径（完整模型或仅含权重的模型文件）
  #[arg(long, value_name = "FILE", default_value = "model_data/yolo.onnx")]
  pub model_path: PathBuf,

  /// 类别文件路径，每行一个类别名
  #[arg(long, value_name = "FILE", default_value = "model_data/coco_classes.txt")]
  pub classes_path: PathBuf,

  /// 锚框文件路径，单行逗号分隔
  #[arg(long, value_name = "FILE", default_value = "model_data/yolo_anchors.txt")]
  pub anchors_path: PathBuf,

  /// 待检测图像根目录（只遍历一层）
  #[arg(long, value_name = "DIR")]
  pub img_root: PathBuf,

  /// 提交文件输出目录（须已存在）
  #[arg(long, value_name = "DIR")]
  pub summit_dir: PathBuf,

  /// 模型输入尺寸，须为 32 的倍数；0 表示按各图像尺寸自适应
  #[arg(long, default_value = "416", value_name = "SIZE")]
  pub input_size: u32,

  /// 推理失败时的处理策略
  #[arg(
    long,
    default_value = "abort",
    value_name = "POLICY",
    value_parser = parse_policy
  )]
  pub on_detect_error: FailurePolicy,

  /// 标注图像输出目录（可选，绘制检测框后另存）
  #[cfg(feature = "draw")]
  #[arg(long, value_name = "DIR")]
  pub draw_dir: Option<PathBuf>,
}

fn parse_policy(value: &str) -> Result<FailurePolicy, String> {
  match value {
    "abort" => Ok(FailurePolicy::Abort),
    "skip" => Ok(FailurePolicy::Skip),
    other => Err(format!("未知策略: {} (可选 abort / skip)", other)),
  }
}
