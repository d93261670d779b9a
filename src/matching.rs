// 该文件是 Shanan （山南西风） 项目的一部分。
// src/matching.rs - 预测框与标注框匹配
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

use crate::tensor::Matrix;

/// IoU 阈值个数，0.50:0.05:0.95
pub const NUM_IOU: usize = 10;

/// mAP50-95 使用的 IoU 阈值
pub fn iou_thresholds() -> [f32; NUM_IOU] {
  std::array::from_fn(|i| 0.5 + 0.05 * i as f32)
}

/// 每个标注框对应 IoU 最大的预测框下标
///
/// `iou` 形状为 [labels × predictions]，并列时取下标最小者。
/// 多个标注框可以指向同一个预测框。
pub fn best_per_label(iou: &Matrix<f32>) -> Vec<usize> {
  iou
    .iter_rows()
    .map(|row| {
      row
        .iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |best, (j, &v)| {
          if v > best.1 { (j, v) } else { best }
        })
        .0
    })
    .collect()
}

/// 计算正确性矩阵 [predictions × NUM_IOU]
///
/// `iou` 形状为 [labels × predictions]。类别不同的配对不参与匹配。
/// 每个阈值下，先按 IoU 降序（并列按置信度降序）为每个预测框保留一个标注框，
/// 再按置信度降序为每个标注框保留一个预测框。
pub fn match_predictions(
  pred_classes: &[u32],
  pred_conf: &[f32],
  true_classes: &[u32],
  iou: &Matrix<f32>,
) -> Matrix<bool> {
  let npr = pred_classes.len();
  let mut correct = Matrix::zeros(npr, NUM_IOU);
  debug_assert_eq!(iou.shape(), (true_classes.len(), npr));

  for (ti, threshold) in iou_thresholds().into_iter().enumerate() {
    let mut matches: Vec<(usize, usize, f32)> = Vec::new();
    for (l, &tc) in true_classes.iter().enumerate() {
      for (p, &pc) in pred_classes.iter().enumerate() {
        let v = *iou.get(l, p);
        if pc == tc && v >= threshold {
          matches.push((l, p, v));
        }
      }
    }

    if matches.len() > 1 {
      matches.sort_by(|a, b| {
        b.2
          .total_cmp(&a.2)
          .then_with(|| pred_conf[b.1].total_cmp(&pred_conf[a.1]))
          .then_with(|| a.1.cmp(&b.1))
      });
      let mut seen = HashSet::new();
      matches.retain(|m| seen.insert(m.1));

      matches.sort_by(|a, b| {
        pred_conf[b.1]
          .total_cmp(&pred_conf[a.1])
          .then_with(|| a.1.cmp(&b.1))
      });
      let mut seen = HashSet::new();
      matches.retain(|m| seen.insert(m.0));
    }

    for (_, p, _) in matches {
      correct.set(p, ti, true);
    }
  }

  correct
}
