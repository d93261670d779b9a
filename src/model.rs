// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测结果定义
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ops::BBox;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RawOutputError {
  #[error("输出数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("输出通道数 {channels} 不足以容纳 4 个坐标和 {nc} 个类别")]
  TooFewChannels { channels: usize, nc: usize },
}

/// 单个检测目标
#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: BBox, // [x_min, y_min, x_max, y_max]
  /// 属性 logits，未经过 sigmoid
  pub attributes: Box<[f32]>,
}

/// 单张图像的检测结果，按置信度降序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn boxes(&self) -> Vec<BBox> {
    self.items.iter().map(|item| item.bbox).collect()
  }

  pub fn scores(&self) -> Vec<f32> {
    self.items.iter().map(|item| item.score).collect()
  }

  pub fn classes(&self) -> Vec<u32> {
    self.items.iter().map(|item| item.class_id).collect()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

/// 单张图像的模型原始输出
///
/// 通道优先布局 `[channels, anchors]`，每个 anchor 的通道依次为
/// `cx, cy, w, h`、`nc` 个类别分数、若干属性 logits。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOutputRepr")]
pub struct RawOutput {
  channels: usize,
  anchors: usize,
  data: Box<[f32]>,
}

#[derive(Deserialize)]
struct RawOutputRepr {
  channels: usize,
  anchors: usize,
  data: Vec<f32>,
}

impl TryFrom<RawOutputRepr> for RawOutput {
  type Error = RawOutputError;

  fn try_from(repr: RawOutputRepr) -> Result<Self, Self::Error> {
    RawOutput::new(repr.channels, repr.anchors, repr.data)
  }
}

impl RawOutput {
  pub fn new(channels: usize, anchors: usize, data: Vec<f32>) -> Result<Self, RawOutputError> {
    if data.len() != channels * anchors {
      return Err(RawOutputError::LengthMismatch {
        expected: channels * anchors,
        actual: data.len(),
      });
    }
    Ok(RawOutput {
      channels,
      anchors,
      data: data.into_boxed_slice(),
    })
  }

  /// 由按 anchor 排列的行构造，每行为 `[cx, cy, w, h, cls..., attr...]`
  pub fn from_anchor_rows<R: AsRef<[f32]>>(channels: usize, rows: &[R]) -> Result<Self, RawOutputError> {
    let anchors = rows.len();
    let mut data = vec![0.0; channels * anchors];
    for (a, row) in rows.iter().enumerate() {
      let row = row.as_ref();
      if row.len() != channels {
        return Err(RawOutputError::LengthMismatch {
          expected: channels,
          actual: row.len(),
        });
      }
      for (c, &v) in row.iter().enumerate() {
        data[c * anchors + a] = v;
      }
    }
    Self::new(channels, anchors, data)
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn anchors(&self) -> usize {
    self.anchors
  }

  #[inline]
  pub fn value(&self, channel: usize, anchor: usize) -> f32 {
    self.data[channel * self.anchors + anchor]
  }

  /// 属性通道数
  pub fn num_extra(&self, nc: usize) -> Result<usize, RawOutputError> {
    self
      .channels
      .checked_sub(4 + nc)
      .ok_or(RawOutputError::TooFewChannels {
        channels: self.channels,
        nc,
      })
  }
}
