// 该文件是 Shanan （山南西风） 项目的一部分。
// src/confusion.rs - 混淆矩阵
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

use std::collections::HashSet;

use tracing::warn;

use crate::{
  model::DetectResult,
  ops::{BBox, box_iou},
  tensor::Matrix,
};

/// 混淆矩阵使用的 IoU 阈值
pub const CONFUSION_IOU: f32 = 0.45;
/// 未指定置信度阈值（或使用验证默认值 0.001）时的阈值
pub const CONFUSION_DEFAULT_CONF: f32 = 0.25;
/// 归一化后低于该值的单元不显示
pub const CONFUSION_MIN_VALUE: f64 = 0.005;

/// 检测混淆矩阵，行为预测类别，列为真实类别，最后一行/列为背景
#[derive(Debug, Clone, PartialEq)]
pub struct ConfusionMatrix {
  nc: usize,
  conf: f32,
  iou_thres: f32,
  matrix: Matrix<f64>,
}

impl ConfusionMatrix {
  pub fn new(nc: usize, conf: Option<f32>) -> Self {
    let conf = match conf {
      None => CONFUSION_DEFAULT_CONF,
      Some(c) if (c - 0.001).abs() < f32::EPSILON => CONFUSION_DEFAULT_CONF,
      Some(c) => c,
    };
    ConfusionMatrix {
      nc,
      conf,
      iou_thres: CONFUSION_IOU,
      matrix: Matrix::zeros(nc + 1, nc + 1),
    }
  }

  pub fn nc(&self) -> usize {
    self.nc
  }

  pub fn conf(&self) -> f32 {
    self.conf
  }

  pub fn matrix(&self) -> &Matrix<f64> {
    &self.matrix
  }

  fn bump(&mut self, pred: usize, truth: usize) {
    let v = *self.matrix.get(pred, truth);
    self.matrix.set(pred, truth, v + 1.0);
  }

  /// 累加一张图像的检测与标注
  ///
  /// `detections` 为 `None` 表示该图像没有预测，所有标注计为背景漏检。
  /// 含有超出 `nc` 的类别编号的图像整体跳过。
  pub fn process_batch(&mut self, detections: Option<&DetectResult>, gt_cls: &[u32], gt_boxes: &[BBox]) {
    let bg = self.nc;
    let out_of_range = gt_cls
      .iter()
      .copied()
      .chain(detections.iter().flat_map(|d| d.items.iter().map(|i| i.class_id)))
      .find(|&c| c as usize >= self.nc);
    if let Some(c) = out_of_range {
      warn!("类别编号 {} 超出类别数 {}，混淆矩阵跳过该图像", c, self.nc);
      return;
    }
    let Some(detections) = detections else {
      for &gc in gt_cls {
        self.bump(bg, gc as usize);
      }
      return;
    };

    let dets: Vec<_> = detections.items.iter().filter(|d| d.score > self.conf).collect();
    if gt_cls.is_empty() {
      for d in dets {
        self.bump(d.class_id as usize, bg);
      }
      return;
    }

    let det_boxes: Vec<BBox> = dets.iter().map(|d| d.bbox).collect();
    let iou = box_iou(gt_boxes, &det_boxes);

    let mut matches: Vec<(usize, usize, f32)> = Vec::new();
    for l in 0..iou.rows() {
      for (d, &v) in iou.row(l).iter().enumerate() {
        if v > self.iou_thres {
          matches.push((l, d, v));
        }
      }
    }
    if matches.len() > 1 {
      matches.sort_by(|a, b| b.2.total_cmp(&a.2));
      let mut seen = HashSet::new();
      matches.retain(|m| seen.insert(m.1));
      let mut seen = HashSet::new();
      matches.retain(|m| seen.insert(m.0));
    }

    for (l, &gc) in gt_cls.iter().enumerate() {
      match matches.iter().find(|m| m.0 == l) {
        Some(&(_, d, _)) => self.bump(dets[d].class_id as usize, gc as usize),
        None => self.bump(bg, gc as usize),
      }
    }

    for (d, det) in dets.iter().enumerate() {
      if !matches.iter().any(|m| m.1 == d) {
        self.bump(det.class_id as usize, bg);
      }
    }
  }

  /// 按列（真实类别）归一化，过小的值置为 NaN
  pub fn normalized(&self) -> Matrix<f64> {
    let n = self.nc + 1;
    let col_sums: Vec<f64> = (0..n)
      .map(|c| (0..n).map(|r| *self.matrix.get(r, c)).sum::<f64>())
      .collect();
    let mut out = Matrix::zeros(n, n);
    for r in 0..n {
      for c in 0..n {
        let v = *self.matrix.get(r, c) / (col_sums[c] + 1e-9);
        out.set(r, c, if v < CONFUSION_MIN_VALUE { f64::NAN } else { v });
      }
    }
    out
  }

  /// 各类别的 TP 和 FP，不含背景
  pub fn tp_fp(&self) -> (Vec<f64>, Vec<f64>) {
    let tp: Vec<f64> = (0..self.nc).map(|i| *self.matrix.get(i, i)).collect();
    let fp = (0..self.nc)
      .map(|i| self.matrix.row(i).iter().sum::<f64>() - tp[i])
      .collect();
    (tp, fp)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  fn det(bbox: BBox, score: f32, class_id: u32) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
      attributes: Box::new([]),
    }
  }

  #[test]
  fn default_validation_conf_is_raised() {
    assert_eq!(ConfusionMatrix::new(2, Some(0.001)).conf(), CONFUSION_DEFAULT_CONF);
    assert_eq!(ConfusionMatrix::new(2, None).conf(), CONFUSION_DEFAULT_CONF);
    assert_eq!(ConfusionMatrix::new(2, Some(0.4)).conf(), 0.4);
  }

  #[test]
  fn missing_predictions_count_as_background() {
    let mut cm = ConfusionMatrix::new(2, None);
    cm.process_batch(None, &[0, 1, 1], &[]);
    assert_eq!(*cm.matrix().get(2, 0), 1.0);
    assert_eq!(*cm.matrix().get(2, 1), 2.0);
  }

  #[test]
  fn matched_unmatched_and_false_positive() {
    let mut cm = ConfusionMatrix::new(2, None);
    let dets = DetectResult::from(vec![
      det([0.0, 0.0, 10.0, 10.0], 0.9, 1),
      det([50.0, 50.0, 60.0, 60.0], 0.8, 0),
      det([200.0, 200.0, 210.0, 210.0], 0.1, 0),
    ]);
    let gt_boxes = [[0.0, 0.0, 10.0, 10.0], [100.0, 100.0, 110.0, 110.0]];
    cm.process_batch(Some(&dets), &[0, 1], &gt_boxes);
    let m = cm.matrix();
    // 标注 0 被预测为类别 1
    assert_eq!(*m.get(1, 0), 1.0);
    // 标注 1 漏检
    assert_eq!(*m.get(2, 1), 1.0);
    // 第二个检测为背景误检，第三个低于阈值被忽略
    assert_eq!(*m.get(0, 2), 1.0);
    assert_eq!(m.as_slice().iter().sum::<f64>(), 3.0);

    let (tp, fp) = cm.tp_fp();
    assert_eq!(tp, vec![0.0, 0.0]);
    assert_eq!(fp, vec![1.0, 1.0]);
  }

  #[test]
  fn out_of_range_classes_are_skipped() {
    let mut cm = ConfusionMatrix::new(2, None);
    cm.process_batch(None, &[2], &[]);
    cm.process_batch(None, &[7], &[]);
    let dets = DetectResult::from(vec![det([0.0, 0.0, 10.0, 10.0], 0.9, 5)]);
    cm.process_batch(Some(&dets), &[0], &[[0.0, 0.0, 10.0, 10.0]]);
    assert_eq!(cm.matrix().as_slice().iter().sum::<f64>(), 0.0);
  }

  #[test]
  fn normalized_columns_sum_to_one() {
    let mut cm = ConfusionMatrix::new(1, None);
    let dets = DetectResult::from(vec![det([0.0, 0.0, 10.0, 10.0], 0.9, 0)]);
    cm.process_batch(Some(&dets), &[0, 0], &[[0.0, 0.0, 10.0, 10.0], [40.0, 40.0, 50.0, 50.0]]);
    let n = cm.normalized();
    assert!((n.get(0, 0) - 0.5).abs() < 1e-6);
    assert!((n.get(1, 0) - 0.5).abs() < 1e-6);
    assert!(n.get(0, 1).is_nan());
  }
}
