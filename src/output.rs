// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 验证结果输出
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

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::confusion::ConfusionMatrix;

mod prediction_json;
pub use self::prediction_json::{ImageId, PredictionRecord, save_predictions};

#[cfg(feature = "plots")]
mod heatmap;
#[cfg(feature = "plots")]
pub use self::heatmap::{HeatmapPlotError, HeatmapPlotter};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[cfg(feature = "plots")]
  #[error("混淆矩阵绘制错误: {0}")]
  HeatmapPlotError(#[from] HeatmapPlotError),
}

/// 混淆矩阵绘制
pub trait Plot {
  /// 将混淆矩阵绘制到 `save_dir`，返回生成的文件路径
  fn plot_confusion(
    &self,
    matrix: &ConfusionMatrix,
    normalize: bool,
    save_dir: &Path,
  ) -> Result<PathBuf, OutputError>;
}

/// 混淆矩阵图像的文件名
pub fn confusion_file_name(normalize: bool) -> &'static str {
  if normalize {
    "confusion_matrix_normalized.png"
  } else {
    "confusion_matrix.png"
  }
}
