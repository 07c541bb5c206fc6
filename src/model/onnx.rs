// 该文件是 Tianmu （天目） 项目的一部分。
// src/model/onnx.rs - ONNX 网络加载与推理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::ArrayD;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载失败 {path}: {reason}")]
  Load { path: PathBuf, reason: String },
  #[error("锚框/类别与模型不匹配: 检测头 {head} 期望 {expected} 通道, 实际 {actual}")]
  Mismatch {
    head: usize,
    expected: usize,
    actual: usize,
  },
  #[error("模型推理错误: {0}")]
  Inference(String),
}

impl ModelError {
  fn load(path: &Path, e: impl std::fmt::Display) -> Self {
    ModelError::Load {
      path: path.to_path_buf(),
      reason: e.to_string(),
    }
  }
}

/// 已就绪的推理网络，每个检测头对应一个输出张量。
/// 推理会话随句柄析构一并释放。
pub struct YoloNetwork {
  plan: TypedRunnableModel<TypedModel>,
}

impl YoloNetwork {
  /// 直接加载自包含模型（结构 + 权重），构建推理计划。
  pub fn load(path: &Path) -> Result<Self, ModelError> {
    info!("加载模型文件: {}", path.display());
    let plan = tract_onnx::onnx()
      .model_for_path(path)
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| ModelError::load(path, e))?;

    debug!("模型检测头数量: {}", plan.model().outputs.len());
    Ok(YoloNetwork { plan })
  }

  /// 回退重建：模型文件缺少输入形状描述时，显式声明输入张量
  /// （1 x 高 x 宽 x 3, f32）后再构建推理计划。
  pub fn rebuild(path: &Path, input_size: (u32, u32)) -> Result<Self, ModelError> {
    let (width, height) = input_size;
    info!(
      "按输入形状 1x{}x{}x3 重建网络: {}",
      height,
      width,
      path.display()
    );

    let plan = tract_onnx::onnx()
      .model_for_path(path)
      .and_then(|model| {
        model.with_input_fact(0, f32::fact([1, height as usize, width as usize, 3]).into())
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| ModelError::load(path, e))?;

    debug!("模型检测头数量: {}", plan.model().outputs.len());
    Ok(YoloNetwork { plan })
  }

  pub fn num_heads(&self) -> usize {
    self.plan.model().outputs.len()
  }

  /// 检测头的输出通道数（形状静态已知时）。
  fn head_channels(&self, head: usize) -> Option<usize> {
    let fact = self.plan.model().output_fact(head).ok()?;
    let dims = fact.shape.as_concrete()?;
    dims.last().copied()
  }

  /// 校验各检测头的输出通道数与锚框/类别数量一致。
  /// 每个锚框贡献 4 个坐标 + 1 个置信度 + num_classes 个类别分数。
  pub fn check_channels(&self, num_anchors: usize, num_classes: usize) -> Result<(), ModelError> {
    let heads = self.num_heads();
    if heads == 0 {
      return Err(ModelError::Inference("模型没有输出张量".to_string()));
    }

    let expected = num_anchors / heads * (num_classes + 5);
    for head in 0..heads {
      if let Some(actual) = self.head_channels(head) {
        if actual != expected {
          return Err(ModelError::Mismatch {
            head,
            expected,
            actual,
          });
        }
      }
    }
    Ok(())
  }

  /// 单次前向推理，输入为 1 x 高 x 宽 x 3 的归一化张量，
  /// 输出按检测头顺序排列。
  pub fn forward(&self, input: Tensor) -> Result<Vec<ArrayD<f32>>, ModelError> {
    let outputs = self
      .plan
      .run(tvec!(input.into()))
      .map_err(|e| ModelError::Inference(e.to_string()))?;

    let mut arrays = Vec::with_capacity(outputs.len());
    for output in outputs.iter() {
      let view = output
        .to_array_view::<f32>()
        .map_err(|e| ModelError::Inference(e.to_string()))?;
      arrays.push(view.to_owned());
    }
    Ok(arrays)
  }
}
