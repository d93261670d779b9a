// 该文件是 Shanan （山南西风） 项目的一部分。
// src/stats.rs - 验证统计累积
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

use thiserror::Error;

use crate::{
  matching::NUM_IOU,
  tensor::{Matrix, MatrixError},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
  #[error("正确性矩阵形状错误: 期望 {expected_rows}x{}, 实际 {rows}x{cols}", NUM_IOU)]
  CorrectShape {
    expected_rows: usize,
    rows: usize,
    cols: usize,
  },
  #[error("属性矩阵形状错误: 预测 {pred:?}, 标注 {truth:?}, 属性数 {num_attr}")]
  AttrShape {
    pred: (usize, usize),
    truth: (usize, usize),
    num_attr: usize,
  },
  #[error("预测类别数 {classes} 与置信度数 {conf} 不一致")]
  PredLength { classes: usize, conf: usize },
  #[error(transparent)]
  Matrix(#[from] MatrixError),
}

/// 单张图像的统计行
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStats {
  /// [predictions × NUM_IOU]
  pub correct: Matrix<bool>,
  /// [labels × num_attr]，只在图像同时有预测和标注时非空
  pub pred_attrs: Matrix<bool>,
  /// [labels × num_attr]
  pub true_attrs: Matrix<bool>,
  pub conf: Vec<f32>,
  pub pred_cls: Vec<u32>,
  pub target_cls: Vec<u32>,
}

impl ImageStats {
  /// 没有预测框的图像：零行矩阵，仅保留标注类别
  pub fn missed(num_attr: usize, target_cls: Vec<u32>) -> Self {
    ImageStats {
      correct: Matrix::zeros(0, NUM_IOU),
      pred_attrs: Matrix::zeros(0, num_attr),
      true_attrs: Matrix::zeros(0, num_attr),
      conf: Vec::new(),
      pred_cls: Vec::new(),
      target_cls,
    }
  }
}

/// 一次验证运行的统计累积器
///
/// 在运行开始时创建，逐图追加，运行结束时由 [`StatsAccumulator::finish`] 一次性消费。
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
  num_attr: usize,
  rows: Vec<ImageStats>,
}

impl StatsAccumulator {
  pub fn new(num_attr: usize) -> Self {
    StatsAccumulator {
      num_attr,
      rows: Vec::new(),
    }
  }

  pub fn num_attr(&self) -> usize {
    self.num_attr
  }

  pub fn len(&self) -> usize {
    self.rows.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn rows(&self) -> &[ImageStats] {
    &self.rows
  }

  pub fn push(&mut self, row: ImageStats) -> Result<(), StatsError> {
    let npr = row.conf.len();
    if row.pred_cls.len() != npr {
      return Err(StatsError::PredLength {
        classes: row.pred_cls.len(),
        conf: npr,
      });
    }
    if row.correct.shape() != (npr, NUM_IOU) {
      return Err(StatsError::CorrectShape {
        expected_rows: npr,
        rows: row.correct.rows(),
        cols: row.correct.cols(),
      });
    }
    if row.pred_attrs.shape() != row.true_attrs.shape() || row.pred_attrs.cols() != self.num_attr {
      return Err(StatsError::AttrShape {
        pred: row.pred_attrs.shape(),
        truth: row.true_attrs.shape(),
        num_attr: self.num_attr,
      });
    }
    self.rows.push(row);
    Ok(())
  }

  /// 拼接所有统计行
  pub fn finish(self) -> Result<Stats, StatsError> {
    let correct = Matrix::concat_rows(NUM_IOU, self.rows.iter().map(|r| &r.correct))?;
    let pred_attrs = Matrix::concat_rows(self.num_attr, self.rows.iter().map(|r| &r.pred_attrs))?;
    let true_attrs = Matrix::concat_rows(self.num_attr, self.rows.iter().map(|r| &r.true_attrs))?;
    let mut conf = Vec::new();
    let mut pred_cls = Vec::new();
    let mut target_cls = Vec::new();
    for row in self.rows {
      conf.extend(row.conf);
      pred_cls.extend(row.pred_cls);
      target_cls.extend(row.target_cls);
    }
    Ok(Stats {
      correct,
      pred_attrs,
      true_attrs,
      conf,
      pred_cls,
      target_cls,
    })
  }
}

/// 整个数据集拼接后的统计
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
  pub correct: Matrix<bool>,
  pub pred_attrs: Matrix<bool>,
  pub true_attrs: Matrix<bool>,
  pub conf: Vec<f32>,
  pub pred_cls: Vec<u32>,
  pub target_cls: Vec<u32>,
}

impl Stats {
  /// 每个类别的标注实例数，长度至少为 `nc`
  pub fn nt_per_class(&self, nc: usize) -> Vec<usize> {
    let len = self
      .target_cls
      .iter()
      .map(|&c| c as usize + 1)
      .max()
      .unwrap_or(0)
      .max(nc);
    let mut counts = vec![0; len];
    for &c in &self.target_cls {
      counts[c as usize] += 1;
    }
    counts
  }
}
