// 该文件是 Tianmu （天目） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use tianmu::detector::{Detector, DEFAULT_INPUT_SIZE};
use tianmu::runner::SubmitTask;
use tianmu::{config, model};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model_path.display());
  info!("类别文件路径: {}", args.classes_path.display());
  info!("锚框文件路径: {}", args.anchors_path.display());
  info!("图像根目录: {}", args.img_root.display());
  info!("提交目录: {}", args.summit_dir.display());

  let classes = config::load_classes(&args.classes_path)?;
  let anchors = config::load_anchors(&args.anchors_path)?;
  info!("类别数量: {}, 锚框数量: {}", classes.len(), anchors.len());

  let input_size = if args.input_size == 0 {
    None
  } else {
    Some((args.input_size, args.input_size))
  };

  let network = model::resolve(
    &args.model_path,
    anchors.len(),
    classes.len(),
    input_size.unwrap_or(DEFAULT_INPUT_SIZE),
  )?;
  let detector = Detector::new(network, classes, anchors, input_size)?;

  let task = SubmitTask::new(&args.img_root, &args.summit_dir).with_policy(args.on_detect_error);
  #[cfg(feature = "draw")]
  let task = match &args.draw_dir {
    Some(dir) => task.with_draw(dir, detector.colors().to_vec()),
    None => task,
  };

  let outcome = task.run_task(&detector);
  detector.close();

  outcome.map(|_| ())
}
