// 该文件是 Shanan （山南西风） 项目的一部分。
// src/metrics.rs - 检测与属性指标
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

use std::collections::BTreeMap;

use crate::{matching::NUM_IOU, stats::Stats, tensor::Matrix};

const EPS: f64 = 1e-16;
/// 置信度曲线的采样点数
const CURVE_POINTS: usize = 1000;
/// AP 插值点数（COCO 101 点）
const AP_POINTS: usize = 101;

/// 与 numpy.interp 一致的分段线性插值，`xp` 需单调不减
fn interp(x: f64, xp: &[f64], fp: &[f64], left: f64, right: f64) -> f64 {
  let n = xp.len();
  if n == 0 {
    return left;
  }
  if x < xp[0] {
    return left;
  }
  if x > xp[n - 1] {
    return right;
  }
  if x == xp[n - 1] {
    return fp[n - 1];
  }
  // xp[j] <= x < xp[j + 1]
  let j = xp.partition_point(|&v| v <= x) - 1;
  let slope = (fp[j + 1] - fp[j]) / (xp[j + 1] - xp[j]);
  slope * (x - xp[j]) + fp[j]
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
  if n == 1 {
    return vec![start];
  }
  let step = (end - start) / (n - 1) as f64;
  (0..n).map(|i| start + step * i as f64).collect()
}

fn trapz(y: &[f64], x: &[f64]) -> f64 {
  x.windows(2)
    .zip(y.windows(2))
    .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
    .sum()
}

/// 盒式滤波平滑，`fraction` 为窗口占序列长度的比例
fn smooth(y: &[f64], fraction: f64) -> Vec<f64> {
  if y.is_empty() {
    return Vec::new();
  }
  let nf = ((y.len() as f64 * fraction * 2.0).round() as usize) / 2 + 1;
  let half = nf / 2;
  let mut padded = Vec::with_capacity(y.len() + 2 * half);
  padded.extend(std::iter::repeat_n(y[0], half));
  padded.extend_from_slice(y);
  padded.extend(std::iter::repeat_n(y[y.len() - 1], half));
  padded
    .windows(nf)
    .map(|w| w.iter().sum::<f64>() / nf as f64)
    .collect()
}

fn argmax(v: &[f64]) -> usize {
  v.iter()
    .enumerate()
    .fold((0usize, f64::NEG_INFINITY), |best, (i, &x)| if x > best.1 { (i, x) } else { best })
    .0
}

fn mean(v: &[f64]) -> f64 {
  if v.is_empty() {
    0.0
  } else {
    v.iter().sum::<f64>() / v.len() as f64
  }
}

/// 由召回率和精确率曲线计算 AP
///
/// 返回 (ap, mpre, mrec)，其中 mpre 为精确率包络。
pub fn compute_ap(recall: &[f64], precision: &[f64]) -> (f64, Vec<f64>, Vec<f64>) {
  let mut mrec = Vec::with_capacity(recall.len() + 2);
  mrec.push(0.0);
  mrec.extend_from_slice(recall);
  mrec.push(1.0);

  let mut mpre = Vec::with_capacity(precision.len() + 2);
  mpre.push(1.0);
  mpre.extend_from_slice(precision);
  mpre.push(0.0);

  for i in (0..mpre.len() - 1).rev() {
    mpre[i] = mpre[i].max(mpre[i + 1]);
  }

  let x = linspace(0.0, 1.0, AP_POINTS);
  let y: Vec<f64> = x
    .iter()
    .map(|&q| interp(q, &mrec, &mpre, mpre[0], mpre[mpre.len() - 1]))
    .collect();
  (trapz(&y, &x), mpre, mrec)
}

/// 逐类别 AP 计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct ApPerClass {
  pub tp: Vec<f64>,
  pub fp: Vec<f64>,
  pub p: Vec<f64>,
  pub r: Vec<f64>,
  pub f1: Vec<f64>,
  /// [classes × NUM_IOU]
  pub ap: Matrix<f64>,
  pub unique_classes: Vec<u32>,
}

/// 逐类别计算 AP、P、R、F1
///
/// `tp` 形状为 [predictions × NUM_IOU]。只有出现在标注中的类别会被统计。
pub fn ap_per_class(tp: &Matrix<bool>, conf: &[f32], pred_cls: &[u32], target_cls: &[u32]) -> ApPerClass {
  let n_iou = tp.cols();

  // 按置信度降序
  let mut order: Vec<usize> = (0..conf.len()).collect();
  order.sort_by(|&a, &b| conf[b].total_cmp(&conf[a]));

  let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
  for &c in target_cls {
    *counts.entry(c).or_default() += 1;
  }
  let unique_classes: Vec<u32> = counts.keys().copied().collect();
  let nt: Vec<usize> = counts.values().copied().collect();
  let nc = unique_classes.len();

  let x = linspace(0.0, 1.0, CURVE_POINTS);
  let mut ap = Matrix::zeros(nc, n_iou);
  let mut p_curve = Matrix::zeros(nc, CURVE_POINTS);
  let mut r_curve = Matrix::zeros(nc, CURVE_POINTS);

  for (ci, &c) in unique_classes.iter().enumerate() {
    let idx: Vec<usize> = order.iter().copied().filter(|&i| pred_cls[i] == c).collect();
    let n_l = nt[ci] as f64;
    if idx.is_empty() || nt[ci] == 0 {
      continue;
    }

    let neg_conf: Vec<f64> = idx.iter().map(|&i| -(conf[i] as f64)).collect();
    let mut recall = Matrix::zeros(idx.len(), n_iou);
    let mut precision = Matrix::zeros(idx.len(), n_iou);
    let mut tpc = vec![0.0f64; n_iou];
    for (k, &i) in idx.iter().enumerate() {
      for j in 0..n_iou {
        if *tp.get(i, j) {
          tpc[j] += 1.0;
        }
        let fpc = (k + 1) as f64 - tpc[j];
        recall.set(k, j, tpc[j] / (n_l + EPS));
        precision.set(k, j, tpc[j] / (tpc[j] + fpc));
      }
    }

    let recall0: Vec<f64> = recall.iter_rows().map(|r| r[0]).collect();
    let precision0: Vec<f64> = precision.iter_rows().map(|r| r[0]).collect();
    let last = recall0.len() - 1;
    for (q, &xv) in x.iter().enumerate() {
      r_curve.set(ci, q, interp(-xv, &neg_conf, &recall0, 0.0, recall0[last]));
      p_curve.set(ci, q, interp(-xv, &neg_conf, &precision0, 1.0, precision0[last]));
    }

    for j in 0..n_iou {
      let rj: Vec<f64> = recall.iter_rows().map(|r| r[j]).collect();
      let pj: Vec<f64> = precision.iter_rows().map(|r| r[j]).collect();
      ap.set(ci, j, compute_ap(&rj, &pj).0);
    }
  }

  let mut f1_curve = Matrix::zeros(nc, CURVE_POINTS);
  for ci in 0..nc {
    for q in 0..CURVE_POINTS {
      let (p, r) = (*p_curve.get(ci, q), *r_curve.get(ci, q));
      f1_curve.set(ci, q, 2.0 * p * r / (p + r + EPS));
    }
  }
  let mean_f1: Vec<f64> = (0..CURVE_POINTS)
    .map(|q| mean(&(0..nc).map(|ci| *f1_curve.get(ci, q)).collect::<Vec<_>>()))
    .collect();
  let best = argmax(&smooth(&mean_f1, 0.1));

  let p: Vec<f64> = (0..nc).map(|ci| *p_curve.get(ci, best)).collect();
  let r: Vec<f64> = (0..nc).map(|ci| *r_curve.get(ci, best)).collect();
  let f1: Vec<f64> = (0..nc).map(|ci| *f1_curve.get(ci, best)).collect();
  let tp_count: Vec<f64> = r.iter().zip(&nt).map(|(r, &n)| (r * n as f64).round()).collect();
  let fp_count: Vec<f64> = tp_count
    .iter()
    .zip(&p)
    .map(|(t, p)| (t / (p + EPS) - t).round())
    .collect();

  ApPerClass {
    tp: tp_count,
    fp: fp_count,
    p,
    r,
    f1,
    ap,
    unique_classes,
  }
}

/// 检测框指标
#[derive(Debug, Clone, PartialEq)]
pub struct DetMetric {
  pub p: Vec<f64>,
  pub r: Vec<f64>,
  pub f1: Vec<f64>,
  /// [classes × NUM_IOU]
  pub all_ap: Matrix<f64>,
  pub ap_class_index: Vec<u32>,
}

impl Default for DetMetric {
  fn default() -> Self {
    DetMetric {
      p: Vec::new(),
      r: Vec::new(),
      f1: Vec::new(),
      all_ap: Matrix::zeros(0, NUM_IOU),
      ap_class_index: Vec::new(),
    }
  }
}

impl DetMetric {
  pub fn update(&mut self, result: ApPerClass) {
    self.p = result.p;
    self.r = result.r;
    self.f1 = result.f1;
    self.all_ap = result.ap;
    self.ap_class_index = result.unique_classes;
  }

  /// 每个类别在 IoU=0.5 下的 AP
  pub fn ap50(&self) -> Vec<f64> {
    self.all_ap.iter_rows().map(|r| r[0]).collect()
  }

  /// 每个类别在 IoU=0.5:0.95 下的平均 AP
  pub fn ap(&self) -> Vec<f64> {
    self.all_ap.iter_rows().map(mean).collect()
  }

  pub fn mp(&self) -> f64 {
    mean(&self.p)
  }

  pub fn mr(&self) -> f64 {
    mean(&self.r)
  }

  pub fn map50(&self) -> f64 {
    mean(&self.ap50())
  }

  pub fn map(&self) -> f64 {
    mean(&self.ap())
  }

  pub fn mean_results(&self) -> [f64; 4] {
    [self.mp(), self.mr(), self.map50(), self.map()]
  }

  pub fn class_result(&self, i: usize) -> [f64; 4] {
    let row = self.all_ap.row(i);
    [self.p[i], self.r[i], row[0], mean(row)]
  }

  pub fn fitness(&self) -> f64 {
    0.1 * self.map50() + 0.9 * self.map()
  }
}

/// 属性指标，按 (标注, 属性) 单元微平均
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AttrMetric {
  pub tp: usize,
  pub tn: usize,
  pub fp: usize,
  pub fn_: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
  if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl AttrMetric {
  pub fn update(&mut self, pred: &Matrix<bool>, truth: &Matrix<bool>) {
    *self = AttrMetric::default();
    for (&p, &t) in pred.as_slice().iter().zip(truth.as_slice()) {
      match (p, t) {
        (true, true) => self.tp += 1,
        (false, false) => self.tn += 1,
        (true, false) => self.fp += 1,
        (false, true) => self.fn_ += 1,
      }
    }
  }

  pub fn total(&self) -> usize {
    self.tp + self.tn + self.fp + self.fn_
  }

  pub fn accuracy(&self) -> f64 {
    ratio(self.tp + self.tn, self.total())
  }

  pub fn precision(&self) -> f64 {
    ratio(self.tp, self.tp + self.fp)
  }

  pub fn recall(&self) -> f64 {
    ratio(self.tp, self.tp + self.fn_)
  }

  pub fn f1(&self) -> f64 {
    let (p, r) = (self.precision(), self.recall());
    if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
  }

  pub fn mean_results(&self) -> [f64; 4] {
    [self.accuracy(), self.precision(), self.recall(), self.f1()]
  }
}

/// DWA 模型的检测框与属性指标
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DwaMetrics {
  pub bbox: DetMetric,
  pub attr: AttrMetric,
}

impl DwaMetrics {
  pub const KEYS: [&'static str; 8] = [
    "metrics/precision(B)",
    "metrics/recall(B)",
    "metrics/mAP50(B)",
    "metrics/mAP50-95(B)",
    "metrics/accuracy(A)",
    "metrics/precision(A)",
    "metrics/recall(A)",
    "metrics/f1(A)",
  ];

  /// 只包含检测框指标的键个数，逐类结果只打印这部分
  pub const DET_KEYS: usize = 4;

  pub fn process(&mut self, stats: &Stats) {
    let result = ap_per_class(&stats.correct, &stats.conf, &stats.pred_cls, &stats.target_cls);
    self.bbox.update(result);
    self.attr.update(&stats.pred_attrs, &stats.true_attrs);
  }

  pub fn mean_results(&self) -> Vec<f64> {
    let mut out = self.bbox.mean_results().to_vec();
    out.extend(self.attr.mean_results());
    out
  }

  pub fn class_result(&self, i: usize) -> [f64; DwaMetrics::DET_KEYS] {
    self.bbox.class_result(i)
  }

  pub fn ap_class_index(&self) -> &[u32] {
    &self.bbox.ap_class_index
  }

  pub fn fitness(&self) -> f64 {
    self.bbox.fitness()
  }

  /// 指标名到数值的有序映射，附带 fitness
  pub fn results_dict(&self) -> Vec<(String, f64)> {
    let mut out: Vec<(String, f64)> = Self::KEYS
      .iter()
      .map(|k| k.to_string())
      .zip(self.mean_results())
      .collect();
    out.push(("fitness".to_string(), self.fitness()));
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interp_matches_numpy() {
    let xp = [0.0, 1.0, 2.0];
    let fp = [0.0, 10.0, 40.0];
    assert_eq!(interp(0.5, &xp, &fp, -1.0, 99.0), 5.0);
    assert_eq!(interp(1.5, &xp, &fp, -1.0, 99.0), 25.0);
    assert_eq!(interp(-0.1, &xp, &fp, -1.0, 99.0), -1.0);
    assert_eq!(interp(2.5, &xp, &fp, -1.0, 99.0), 99.0);
    assert_eq!(interp(2.0, &xp, &fp, -1.0, 99.0), 40.0);
  }

  #[test]
  fn smooth_keeps_length_and_constants() {
    let y = vec![3.0; 1000];
    let s = smooth(&y, 0.1);
    assert_eq!(s.len(), 1000);
    assert!(s.iter().all(|v| (v - 3.0).abs() < 1e-9));
  }

  #[test]
  fn perfect_detector_ap() {
    // 末端哨兵使最后一段插值降为 0，完美检测的 AP 为 0.995
    let (ap, mpre, mrec) = compute_ap(&[0.5, 1.0], &[1.0, 1.0]);
    assert!((ap - 0.995).abs() < 1e-6);
    assert_eq!(mpre, vec![1.0, 1.0, 1.0, 0.0]);
    assert_eq!(mrec, vec![0.0, 0.5, 1.0, 1.0]);
  }

  #[test]
  fn useless_detector_has_zero_ap() {
    let (ap, _, _) = compute_ap(&[0.0, 0.0], &[0.0, 0.0]);
    assert!(ap.abs() < 1e-9);
  }

  #[test]
  fn ap_per_class_counts_each_target_class() {
    // 类别 0 两个预测全部正确，类别 1 一个预测错误
    let tp = Matrix::from_rows(
      NUM_IOU,
      &[vec![true; NUM_IOU], vec![true; NUM_IOU], vec![false; NUM_IOU]],
    )
    .unwrap();
    let result = ap_per_class(&tp, &[0.9, 0.8, 0.7], &[0, 0, 1], &[0, 0, 1]);
    assert_eq!(result.unique_classes, vec![0, 1]);
    assert_eq!(result.ap.shape(), (2, NUM_IOU));
    assert!((result.ap.get(0, 0) - 0.995).abs() < 1e-6);
    assert!(result.ap.get(1, 0).abs() < 1e-9);
    assert!((result.r[0] - 1.0).abs() < 1e-6);
    assert!((result.p[0] - 1.0).abs() < 1e-6);
  }

  #[test]
  fn attr_metric_is_micro_averaged() {
    let pred = Matrix::from_rows(2, &[[true, false], [true, true]]).unwrap();
    let truth = Matrix::from_rows(2, &[[true, false], [false, true]]).unwrap();
    let mut m = AttrMetric::default();
    m.update(&pred, &truth);
    assert_eq!((m.tp, m.tn, m.fp, m.fn_), (2, 1, 1, 0));
    assert!((m.accuracy() - 0.75).abs() < 1e-9);
    assert!((m.precision() - 2.0 / 3.0).abs() < 1e-9);
    assert!((m.recall() - 1.0).abs() < 1e-9);
    assert!((m.f1() - 0.8).abs() < 1e-9);
  }

  #[test]
  fn empty_attr_metric_is_zero() {
    let m = AttrMetric::default();
    assert_eq!(m.mean_results(), [0.0; 4]);
  }

  #[test]
  fn results_dict_lists_every_key_and_fitness() {
    let m = DwaMetrics::default();
    let dict = m.results_dict();
    assert_eq!(dict.len(), DwaMetrics::KEYS.len() + 1);
    assert_eq!(dict.last().map(|(k, _)| k.as_str()), Some("fitness"));
  }

  #[test]
  fn per_class_columns_are_the_box_metrics() {
    let (det, attr) = DwaMetrics::KEYS.split_at(DwaMetrics::DET_KEYS);
    assert!(det.iter().all(|k| k.ends_with("(B)")));
    assert!(attr.iter().all(|k| k.ends_with("(A)")));

    let tp = Matrix::from_rows(NUM_IOU, &[vec![true; NUM_IOU]]).unwrap();
    let mut m = DwaMetrics::default();
    m.bbox.update(ap_per_class(&tp, &[0.9], &[0], &[0]));
    assert_eq!(m.class_result(0).to_vec(), m.mean_results()[..DwaMetrics::DET_KEYS].to_vec());
  }
}
