// 该文件是 Shanan （山南西风） 项目的一部分。
// src/batch.rs - 验证批次定义
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

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  ops::{BBox, RatioPad, Shape},
  tensor::Matrix,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
  #[error("标注字段长度不一致: batch_idx {batch_idx}, cls {cls}, bboxes {bboxes}, attributes {attributes}")]
  InstanceLength {
    batch_idx: usize,
    cls: usize,
    bboxes: usize,
    attributes: usize,
  },
  #[error("图像字段长度不一致: ori_shape {ori_shape}, im_file {im_file}, ratio_pad {ratio_pad}")]
  ImageLength {
    ori_shape: usize,
    im_file: usize,
    ratio_pad: usize,
  },
  #[error("实例 {instance} 的图像下标 {index} 超出批次大小 {images}")]
  ImageIndex {
    instance: usize,
    index: usize,
    images: usize,
  },
  #[error("实例 {instance} 的类别 {class} 超出类别数 {nc}")]
  ClassIndex { instance: usize, class: u32, nc: usize },
  #[error("预测数量 {preds} 与批次图像数 {images} 不一致")]
  PredictionCount { preds: usize, images: usize },
}

/// 一个验证批次
///
/// 标注按实例展开，`batch_idx` 给出每个实例所属的图像。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "A: Clone + Serialize", deserialize = "A: Deserialize<'de>"))]
pub struct Batch<A> {
  /// 模型输入尺寸 [height, width]
  pub input_shape: Shape,
  pub batch_idx: Vec<usize>,
  pub cls: Vec<u32>,
  /// 归一化的 xywh 标注框
  pub bboxes: Vec<BBox>,
  /// 属性标记 [instances × num_attr]
  pub attributes: Matrix<A>,
  /// 原图尺寸 [height, width]
  pub ori_shape: Vec<Shape>,
  /// 加载时的缩放与填充，缺省时按 letterbox 推算
  #[serde(default)]
  pub ratio_pad: Vec<Option<RatioPad>>,
  pub im_file: Vec<PathBuf>,
}

impl<A> Batch<A> {
  pub fn num_images(&self) -> usize {
    self.ori_shape.len()
  }

  pub fn num_attr(&self) -> usize {
    self.attributes.cols()
  }

  /// 检查各字段长度是否一致
  pub fn validate(&self) -> Result<(), BatchError> {
    let n = self.batch_idx.len();
    if self.cls.len() != n || self.bboxes.len() != n || self.attributes.rows() != n {
      return Err(BatchError::InstanceLength {
        batch_idx: n,
        cls: self.cls.len(),
        bboxes: self.bboxes.len(),
        attributes: self.attributes.rows(),
      });
    }
    let images = self.num_images();
    if self.im_file.len() != images || (!self.ratio_pad.is_empty() && self.ratio_pad.len() != images) {
      return Err(BatchError::ImageLength {
        ori_shape: images,
        im_file: self.im_file.len(),
        ratio_pad: self.ratio_pad.len(),
      });
    }
    if let Some((instance, &index)) = self.batch_idx.iter().enumerate().find(|(_, i)| **i >= images) {
      return Err(BatchError::ImageIndex {
        instance,
        index,
        images,
      });
    }
    Ok(())
  }

  /// 检查所有标注类别都小于 `nc`
  pub fn check_classes(&self, nc: usize) -> Result<(), BatchError> {
    match self.cls.iter().enumerate().find(|(_, c)| **c as usize >= nc) {
      Some((instance, &class)) => Err(BatchError::ClassIndex { instance, class, nc }),
      None => Ok(()),
    }
  }

  /// 属于第 `si` 张图像的实例下标
  pub fn instances_of(&self, si: usize) -> Vec<usize> {
    self
      .batch_idx
      .iter()
      .enumerate()
      .filter_map(|(i, &b)| (b == si).then_some(i))
      .collect()
  }

  pub fn ratio_pad(&self, si: usize) -> Option<&RatioPad> {
    self.ratio_pad.get(si).and_then(|rp| rp.as_ref())
  }

  /// 转换属性矩阵的元素类型，其余字段不变
  pub fn map_attributes<B, F: FnMut(&A) -> B>(self, f: F) -> Batch<B> {
    Batch {
      input_shape: self.input_shape,
      batch_idx: self.batch_idx,
      cls: self.cls,
      bboxes: self.bboxes,
      attributes: self.attributes.map(f),
      ori_shape: self.ori_shape,
      ratio_pad: self.ratio_pad,
      im_file: self.im_file,
    }
  }
}
