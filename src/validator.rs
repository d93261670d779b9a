// 该文件是 Shanan （山南西风） 项目的一部分。
// src/validator.rs - 检测-属性模型验证器
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

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  batch::{Batch, BatchError},
  config::ValidatorArgs,
  confusion::ConfusionMatrix,
  diagnostics::{Diagnostics, TracingDiagnostics},
  matching::{NUM_IOU, best_per_label, match_predictions},
  metrics::DwaMetrics,
  model::{DetectResult, RawOutput, RawOutputError},
  nms::non_max_suppression,
  ops::{BBox, box_iou, round_to, scale_boxes, sigmoid, xywh2xyxy, xyxy2xywh},
  output::{ImageId, OutputError, Plot, PredictionRecord, save_predictions},
  report,
  stats::{ImageStats, StatsAccumulator, StatsError},
  tensor::Matrix,
};

/// 属性概率阈值
pub const ATTR_THRESHOLD: f32 = 0.5;

/// 验证器固定使用的任务名
pub const DWA_TASK: &str = "dwa";

/// COCO 80 类到 91 类编号的映射
const COCO80_TO_COCO91: [u32; 80] = [
  1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 27, 28, 31,
  32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57,
  58, 59, 60, 61, 62, 63, 64, 65, 67, 70, 72, 73, 74, 75, 76, 77, 78, 79, 80, 81, 82, 84, 85, 86, 87,
  88, 89, 90,
];

#[derive(Error, Debug)]
pub enum ValidatorError {
  #[error("批次错误: {0}")]
  BatchError(#[from] BatchError),
  #[error("模型输出错误: {0}")]
  RawOutputError(#[from] RawOutputError),
  #[error("统计错误: {0}")]
  StatsError(#[from] StatsError),
  #[error("输出错误: {0}")]
  OutputError(#[from] OutputError),
  #[error("属性数量不匹配: 期望 {expected}, 实际 {actual}")]
  AttributeCount { expected: usize, actual: usize },
  #[error("图像 {image} 的预测类别 {class} 超出类别数 {nc}")]
  PredictionClass { image: usize, class: u32, nc: usize },
  #[error("类别 {0} 没有对应的数据集类别编号")]
  UnknownClass(u32),
  #[error("验证器尚未初始化指标")]
  NotInitialized,
}

/// 数据集描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
  /// 类别编号到名称
  pub names: BTreeMap<u32, String>,
  /// 每个目标的属性个数
  pub num_attr: usize,
  /// 是否为 COCO 数据集（决定 JSON 中的类别编号）
  #[serde(default)]
  pub is_coco: bool,
}

/// 属性概率按阈值转为布尔值
pub fn threshold_attributes(probs: &Matrix<f32>) -> Matrix<bool> {
  probs.map(|&p| p >= ATTR_THRESHOLD)
}

/// 每次验证运行的状态，由 `init_metrics` 创建
struct RunState {
  num_attrs: usize,
  stats: StatsAccumulator,
  confusion_matrix: ConfusionMatrix,
}

pub struct AttrValidatorBuilder {
  args: ValidatorArgs,
  diagnostics: Arc<dyn Diagnostics>,
  plotter: Option<Box<dyn Plot>>,
}

impl AttrValidatorBuilder {
  pub fn new(args: ValidatorArgs) -> Self {
    AttrValidatorBuilder {
      args,
      diagnostics: Arc::new(TracingDiagnostics),
      plotter: None,
    }
  }

  pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
    self.diagnostics = diagnostics;
    self
  }

  pub fn plotter(mut self, plotter: Box<dyn Plot>) -> Self {
    self.plotter = Some(plotter);
    self
  }

  pub fn build(self) -> AttrValidator {
    let mut args = self.args;
    args.task = DWA_TASK.to_string();

    if args.is_mps() {
      self.diagnostics.warn(
        "Apple MPS 设备存在已知问题，属性检测模型建议使用 'device=cpu'。\
         参见 https://github.com/ultralytics/ultralytics/issues/4031",
      );
    }

    let save_dir = args.save_dir.clone().unwrap_or_else(|| {
      PathBuf::from("runs")
        .join(&args.task)
        .join(format!("val-{}", Utc::now().format("%Y%m%d-%H%M%S")))
    });

    AttrValidator {
      args,
      diagnostics: self.diagnostics,
      plotter: self.plotter,
      save_dir,
      names: BTreeMap::new(),
      nc: 0,
      is_coco: false,
      seen: 0,
      state: None,
      jdict: Vec::new(),
      metrics: DwaMetrics::default(),
      nt_per_class: Vec::new(),
      stats_rows: 0,
    }
  }
}

/// 检测-属性（DWA）模型验证器
pub struct AttrValidator {
  args: ValidatorArgs,
  diagnostics: Arc<dyn Diagnostics>,
  plotter: Option<Box<dyn Plot>>,
  save_dir: PathBuf,
  names: BTreeMap<u32, String>,
  nc: usize,
  is_coco: bool,
  seen: usize,
  state: Option<RunState>,
  jdict: Vec<PredictionRecord>,
  metrics: DwaMetrics,
  nt_per_class: Vec<usize>,
  stats_rows: usize,
}

impl AttrValidator {
  pub fn args(&self) -> &ValidatorArgs {
    &self.args
  }

  pub fn save_dir(&self) -> &Path {
    &self.save_dir
  }

  pub fn nc(&self) -> usize {
    self.nc
  }

  pub fn num_attrs(&self) -> Option<usize> {
    self.state.as_ref().map(|s| s.num_attrs)
  }

  pub fn seen(&self) -> usize {
    self.seen
  }

  pub fn jdict(&self) -> &[PredictionRecord] {
    &self.jdict
  }

  pub fn metrics(&self) -> &DwaMetrics {
    &self.metrics
  }

  pub fn nt_per_class(&self) -> &[usize] {
    &self.nt_per_class
  }

  /// 当前运行已累积的统计行
  pub fn stats(&self) -> Option<&StatsAccumulator> {
    self.state.as_ref().map(|s| &s.stats)
  }

  pub fn confusion_matrix(&self) -> Option<&ConfusionMatrix> {
    self.state.as_ref().map(|s| &s.confusion_matrix)
  }

  /// 表头
  pub fn get_desc(&self) -> String {
    report::desc()
  }

  /// 开始一次验证运行，重置所有累积状态
  pub fn init_metrics(&mut self, meta: &DatasetMeta) {
    self.names = meta.names.clone();
    self.nc = meta.names.len();
    self.is_coco = meta.is_coco;
    self.seen = 0;
    self.jdict.clear();
    self.metrics = DwaMetrics::default();
    self.nt_per_class.clear();
    self.stats_rows = 0;
    self.state = Some(RunState {
      num_attrs: meta.num_attr,
      stats: StatsAccumulator::new(meta.num_attr),
      confusion_matrix: ConfusionMatrix::new(self.nc, Some(self.args.conf)),
    });
    debug!(
      "初始化指标: {} 个类别, {} 个属性",
      self.nc, meta.num_attr
    );
  }

  /// 属性标记转为浮点数并放到计算设备上
  pub fn preprocess(&self, batch: Batch<u8>) -> Result<Batch<f32>, ValidatorError> {
    batch.validate()?;
    debug!("批次属性放置到设备 {}", self.args.device);
    Ok(batch.map_attributes(|&v| v as f32))
  }

  /// 对模型原始输出执行 NMS
  pub fn postprocess(&self, preds: &[RawOutput]) -> Result<Vec<DetectResult>, ValidatorError> {
    Ok(non_max_suppression(preds, &self.args.nms_config(self.nc))?)
  }

  /// 逐图像匹配预测与标注，并追加统计
  pub fn update_metrics(&mut self, preds: &[DetectResult], batch: &Batch<f32>) -> Result<(), ValidatorError> {
    let state = self.state.as_mut().ok_or(ValidatorError::NotInitialized)?;
    let num_attr = state.num_attrs;

    batch.validate()?;
    batch.check_classes(self.nc)?;
    if preds.len() != batch.num_images() {
      return Err(BatchError::PredictionCount {
        preds: preds.len(),
        images: batch.num_images(),
      }
      .into());
    }
    if batch.num_attr() != num_attr {
      return Err(ValidatorError::AttributeCount {
        expected: num_attr,
        actual: batch.num_attr(),
      });
    }
    // 先检查整个批次的预测，出错时不留下部分统计
    for (si, pred) in preds.iter().enumerate() {
      for item in pred.items.iter() {
        if item.attributes.len() != num_attr {
          return Err(ValidatorError::AttributeCount {
            expected: num_attr,
            actual: item.attributes.len(),
          });
        }
        if !self.args.single_cls && item.class_id as usize >= self.nc {
          return Err(ValidatorError::PredictionClass {
            image: si,
            class: item.class_id,
            nc: self.nc,
          });
        }
      }
    }

    let [in_h, in_w] = batch.input_shape;
    let mut to_json = Vec::new();

    for (si, pred) in preds.iter().enumerate() {
      let idx = batch.instances_of(si);
      let cls: Vec<u32> = idx.iter().map(|&i| batch.cls[i]).collect();
      let (nl, npr) = (cls.len(), pred.len());
      let shape = batch.ori_shape[si];
      self.seen += 1;

      if npr == 0 {
        if nl > 0 {
          state.stats.push(ImageStats::missed(num_attr, cls.clone()))?;
          if self.args.plots {
            state.confusion_matrix.process_batch(None, &cls, &[]);
          }
        }
        continue;
      }

      // 预测框还原到原图尺寸
      let mut predn = pred.clone();
      let mut boxes = predn.boxes();
      scale_boxes(batch.input_shape, &mut boxes, shape, batch.ratio_pad(si));
      for (item, bbox) in predn.items.iter_mut().zip(&boxes) {
        item.bbox = *bbox;
        if self.args.single_cls {
          item.class_id = 0;
        }
      }
      let pred_cls = predn.classes();
      let conf = predn.scores();

      let mut correct = Matrix::zeros(npr, NUM_IOU);
      let mut pred_attrs = Matrix::zeros(0, num_attr);
      let mut true_attrs = Matrix::zeros(0, num_attr);

      if nl > 0 {
        let mut tbox: Vec<BBox> = idx
          .iter()
          .map(|&i| {
            let b = xywh2xyxy(&batch.bboxes[i]);
            let (w, h) = (in_w as f32, in_h as f32);
            [b[0] * w, b[1] * h, b[2] * w, b[3] * h]
          })
          .collect();
        scale_boxes(batch.input_shape, &mut tbox, shape, batch.ratio_pad(si));

        let iou = box_iou(&tbox, &boxes);
        let best = best_per_label(&iou);
        correct = match_predictions(&pred_cls, &conf, &cls, &iou);

        let probs = Matrix::from_rows(
          num_attr,
          &predn
            .items
            .iter()
            .map(|item| item.attributes.iter().map(|&x| sigmoid(x)).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
        )
        .map_err(StatsError::from)?;
        pred_attrs = threshold_attributes(&probs.select_rows(&best));
        true_attrs = batch.attributes.select_rows(&idx).map(|&v| v != 0.0);

        if self.args.plots {
          state.confusion_matrix.process_batch(Some(&predn), &cls, &tbox);
        }
      }

      state.stats.push(ImageStats {
        correct,
        pred_attrs,
        true_attrs,
        conf,
        pred_cls,
        target_cls: cls,
      })?;

      if self.args.save_json {
        to_json.push((predn, si));
      }
    }

    for (predn, si) in to_json {
      self.pred_to_json(&predn, &batch.im_file[si])?;
    }
    Ok(())
  }

  fn category_id(&self, class_id: u32) -> Result<u32, ValidatorError> {
    if self.is_coco {
      COCO80_TO_COCO91
        .get(class_id as usize)
        .copied()
        .ok_or(ValidatorError::UnknownClass(class_id))
    } else {
      Ok(class_id)
    }
  }

  /// 将原图坐标下的检测结果转为 COCO JSON 记录
  pub fn pred_to_json(&mut self, predn: &DetectResult, filename: &Path) -> Result<(), ValidatorError> {
    let image_id = ImageId::from_path(filename);
    for item in predn.items.iter() {
      let b = xyxy2xywh(&item.bbox);
      let tl = [b[0] - b[2] / 2.0, b[1] - b[3] / 2.0, b[2], b[3]];
      let record = PredictionRecord {
        image_id: image_id.clone(),
        category_id: self.category_id(item.class_id)?,
        bbox: tl.map(|v| round_to(v, 3)),
        attributes: item.attributes.to_vec(),
        score: round_to(item.score, 5),
      };
      self.jdict.push(record);
    }
    Ok(())
  }

  /// 结束运行，汇总统计并计算指标
  pub fn get_stats(&mut self) -> Result<Vec<(String, f64)>, ValidatorError> {
    let state = self.state.as_mut().ok_or(ValidatorError::NotInitialized)?;
    let num_attrs = state.num_attrs;
    let acc = std::mem::replace(&mut state.stats, StatsAccumulator::new(num_attrs));
    self.stats_rows = acc.len();

    let stats = acc.finish()?;
    self.nt_per_class = stats.nt_per_class(self.nc);
    if stats.correct.any() {
      self.metrics.process(&stats);
    }

    if self.args.plots {
      let (tp, fp) = state.confusion_matrix.tp_fp();
      debug!("混淆矩阵 TP: {:?}, FP: {:?}", tp, fp);
    }

    Ok(self.metrics.results_dict())
  }

  /// 输出总体结果与逐类别结果
  pub fn print_results(&self) -> Result<(), ValidatorError> {
    let total: usize = self.nt_per_class.iter().sum();
    self.diagnostics.info(&report::format_row(
      "all",
      self.seen,
      total,
      &self.metrics.mean_results(),
    ));
    if total == 0 {
      self.diagnostics.warn(&format!(
        "{} 数据集中没有找到标注，无法计算指标",
        self.args.task
      ));
    }

    // 逐类别只输出检测框指标
    if self.args.verbose && !self.args.training && self.nc > 1 && self.stats_rows > 0 {
      for (i, &c) in self.metrics.ap_class_index().iter().enumerate() {
        let name = self
          .names
          .get(&c)
          .cloned()
          .unwrap_or_else(|| c.to_string());
        let instances = self.nt_per_class.get(c as usize).copied().unwrap_or(0);
        self.diagnostics.info(&report::format_row(
          &name,
          self.seen,
          instances,
          &self.metrics.class_result(i),
        ));
      }
    }

    if self.args.plots {
      match (&self.plotter, &self.state) {
        (Some(plotter), Some(state)) => {
          for normalize in [true, false] {
            plotter.plot_confusion(&state.confusion_matrix, normalize, &self.save_dir)?;
          }
        }
        (None, _) => self.diagnostics.warn("未配置绘图器，跳过混淆矩阵绘制"),
        (_, None) => return Err(ValidatorError::NotInitialized),
      }
    }

    Ok(())
  }

  /// 保存 JSON 预测结果，返回写入的文件路径
  pub fn save_json(&self) -> Result<Option<PathBuf>, ValidatorError> {
    if !self.args.save_json || self.jdict.is_empty() {
      return Ok(None);
    }
    let path = self.save_dir.join("predictions.json");
    save_predictions(&path, &self.jdict)?;
    Ok(Some(path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{diagnostics::RecordingDiagnostics, model::DetectItem, ops::RatioPad};

  const IDENTITY: RatioPad = RatioPad {
    ratio: [1.0, 1.0],
    pad: [0.0, 0.0],
  };

  fn meta() -> DatasetMeta {
    DatasetMeta {
      names: BTreeMap::from([(0, "person".to_string()), (1, "car".to_string())]),
      num_attr: 2,
      is_coco: false,
    }
  }

  fn validator(args: ValidatorArgs) -> (AttrValidator, Arc<RecordingDiagnostics>) {
    let diag = Arc::new(RecordingDiagnostics::default());
    let mut v = AttrValidatorBuilder::new(args).diagnostics(diag.clone()).build();
    v.init_metrics(&meta());
    (v, diag)
  }

  /// 单张 100x100 图像，标注框以归一化 xywh 给出
  fn batch(labels: &[(u32, BBox, [f32; 2])]) -> Batch<f32> {
    Batch {
      input_shape: [100, 100],
      batch_idx: vec![0; labels.len()],
      cls: labels.iter().map(|l| l.0).collect(),
      bboxes: labels.iter().map(|l| l.1).collect(),
      attributes: Matrix::from_rows(2, &labels.iter().map(|l| l.2).collect::<Vec<_>>()).unwrap(),
      ori_shape: vec![[100, 100]],
      ratio_pad: vec![Some(IDENTITY)],
      im_file: vec![PathBuf::from("images/000123.jpg")],
    }
  }

  fn det(bbox: BBox, score: f32, class_id: u32, attrs: [f32; 2]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
      attributes: Box::new(attrs),
    }
  }

  #[test]
  fn no_predictions_no_labels_appends_nothing() {
    let (mut v, _) = validator(ValidatorArgs::default());
    v.update_metrics(&[DetectResult::default()], &batch(&[])).unwrap();
    assert_eq!(v.seen(), 1);
    assert!(v.stats().unwrap().is_empty());
  }

  #[test]
  fn no_predictions_with_labels_appends_empty_row() {
    let (mut v, _) = validator(ValidatorArgs::default());
    let b = batch(&[(1, [0.5, 0.5, 0.2, 0.2], [1.0, 0.0])]);
    v.update_metrics(&[DetectResult::default()], &b).unwrap();
    let rows = v.stats().unwrap().rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].correct.shape(), (0, NUM_IOU));
    assert_eq!(rows[0].pred_attrs.shape(), (0, 2));
    assert_eq!(rows[0].true_attrs.shape(), (0, 2));
    assert_eq!(rows[0].target_cls, vec![1]);
  }

  #[test]
  fn exact_match_is_correct_and_attributes_are_thresholded() {
    let (mut v, _) = validator(ValidatorArgs::default());
    // 归一化 xywh (0.5, 0.5, 0.2, 0.4) 对应 xyxy (40, 30, 60, 70)
    let b = batch(&[(0, [0.5, 0.5, 0.2, 0.4], [1.0, 0.0])]);
    let preds = DetectResult::from(vec![
      det([40.0, 30.0, 60.0, 70.0], 0.9, 0, [2.0, -2.0]),
      det([0.0, 0.0, 5.0, 5.0], 0.3, 0, [0.0, 0.0]),
    ]);
    v.update_metrics(&[preds], &b).unwrap();

    let row = &v.stats().unwrap().rows()[0];
    assert!(row.correct.row(0).iter().all(|&c| c));
    assert!(row.correct.row(1).iter().all(|&c| !c));
    assert_eq!(row.pred_attrs.row(0), &[true, false]);
    assert_eq!(row.true_attrs.row(0), &[true, false]);
    assert_eq!(row.conf, vec![0.9, 0.3]);
  }

  #[test]
  fn predictions_without_labels_keep_attribute_matrices_empty() {
    let (mut v, _) = validator(ValidatorArgs::default());
    let preds = DetectResult::from(vec![det([0.0, 0.0, 5.0, 5.0], 0.3, 1, [0.0, 0.0])]);
    v.update_metrics(&[preds], &batch(&[])).unwrap();
    let row = &v.stats().unwrap().rows()[0];
    assert_eq!(row.correct.shape(), (1, NUM_IOU));
    assert!(!row.correct.any());
    assert_eq!(row.pred_attrs.shape(), (0, 2));
    assert!(row.target_cls.is_empty());
  }

  #[test]
  fn single_cls_forces_class_zero() {
    let args = ValidatorArgs {
      single_cls: true,
      ..Default::default()
    };
    let (mut v, _) = validator(args);
    let b = batch(&[(0, [0.5, 0.5, 0.2, 0.4], [0.0, 0.0])]);
    let preds = DetectResult::from(vec![det([40.0, 30.0, 60.0, 70.0], 0.9, 1, [0.0, 0.0])]);
    v.update_metrics(&[preds], &b).unwrap();
    let row = &v.stats().unwrap().rows()[0];
    assert_eq!(row.pred_cls, vec![0]);
    assert!(row.correct.row(0)[0]);
  }

  #[test]
  fn threshold_is_inclusive_at_half() {
    let probs = Matrix::from_rows(3, &[[0.5, 0.49, 0.9]]).unwrap();
    assert_eq!(threshold_attributes(&probs).row(0), &[true, false, true]);
  }

  #[test]
  fn attribute_count_mismatch_is_an_error() {
    let (mut v, _) = validator(ValidatorArgs::default());
    let b = batch(&[(0, [0.5, 0.5, 0.2, 0.4], [0.0, 0.0])]);
    let preds = DetectResult::from(vec![DetectItem {
      class_id: 0,
      score: 0.5,
      bbox: [40.0, 30.0, 60.0, 70.0],
      attributes: Box::new([0.0]),
    }]);
    assert!(matches!(
      v.update_metrics(&[preds], &b),
      Err(ValidatorError::AttributeCount {
        expected: 2,
        actual: 1
      })
    ));
  }

  #[test]
  fn label_class_outside_dataset_is_an_error() {
    let args = ValidatorArgs {
      plots: true,
      ..Default::default()
    };
    let (mut v, _) = validator(args);
    for class in [2, 7] {
      let b = batch(&[(class, [0.5, 0.5, 0.2, 0.4], [0.0, 0.0])]);
      assert!(matches!(
        v.update_metrics(&[DetectResult::default()], &b),
        Err(ValidatorError::BatchError(BatchError::ClassIndex { nc: 2, .. }))
      ));
    }
    assert_eq!(v.seen(), 0);
    assert!(v.stats().unwrap().is_empty());
    assert_eq!(v.confusion_matrix().unwrap().matrix().as_slice().iter().sum::<f64>(), 0.0);
  }

  #[test]
  fn prediction_class_outside_dataset_is_an_error() {
    let (mut v, _) = validator(ValidatorArgs::default());
    let preds = DetectResult::from(vec![det([0.0, 0.0, 5.0, 5.0], 0.3, 2, [0.0, 0.0])]);
    assert!(matches!(
      v.update_metrics(&[preds], &batch(&[])),
      Err(ValidatorError::PredictionClass { image: 0, class: 2, nc: 2 })
    ));
  }

  #[test]
  fn malformed_batch_leaves_no_partial_state() {
    let (mut v, _) = validator(ValidatorArgs::default());
    let mut b = batch(&[(0, [0.5, 0.5, 0.2, 0.4], [1.0, 0.0])]);
    b.ori_shape.push([100, 100]);
    b.ratio_pad.push(None);
    b.im_file.push(PathBuf::from("images/000124.jpg"));
    let good = DetectResult::from(vec![det([40.0, 30.0, 60.0, 70.0], 0.9, 0, [2.0, -2.0])]);
    let bad = DetectResult::from(vec![DetectItem {
      class_id: 0,
      score: 0.5,
      bbox: [0.0, 0.0, 5.0, 5.0],
      attributes: Box::new([0.0]),
    }]);
    assert!(matches!(
      v.update_metrics(&[good.clone(), bad], &b),
      Err(ValidatorError::AttributeCount { .. })
    ));
    assert_eq!(v.seen(), 0);
    assert!(v.stats().unwrap().is_empty());

    // 图像字段缺失同样在逐图像处理前报错
    b.im_file.pop();
    assert!(matches!(
      v.update_metrics(&[good.clone(), good], &b),
      Err(ValidatorError::BatchError(BatchError::ImageLength { .. }))
    ));
    assert_eq!(v.seen(), 0);
  }

  #[test]
  fn pred_to_json_converts_boxes() {
    let args = ValidatorArgs {
      save_json: true,
      ..Default::default()
    };
    let (mut v, _) = validator(args);
    let b = batch(&[]);
    let preds = DetectResult::from(vec![det([10.0, 20.0, 30.5, 60.25], 0.876543, 1, [0.25, -1.5])]);
    v.update_metrics(&[preds], &b).unwrap();

    let rec = &v.jdict()[0];
    assert_eq!(rec.image_id, ImageId::Number(123));
    assert_eq!(rec.category_id, 1);
    assert_eq!(rec.bbox, [10.0, 20.0, 20.5, 40.25]);
    assert_eq!(rec.attributes, vec![0.25, -1.5]);
    assert!((rec.score - 0.87654).abs() < 1e-9);

    // 左上角 xywh 还原为 xyxy
    let [x, y, w, h] = rec.bbox;
    assert_eq!([x, y, x + w, y + h], [10.0, 20.0, 30.5, 60.25]);
  }

  #[test]
  fn coco_class_map_is_applied() {
    let (mut v, _) = validator(ValidatorArgs::default());
    v.init_metrics(&DatasetMeta {
      is_coco: true,
      ..meta()
    });
    let preds = DetectResult::from(vec![det([0.0, 0.0, 1.0, 1.0], 0.5, 11, [0.0, 0.0])]);
    v.pred_to_json(&preds, Path::new("x/abc.jpg")).unwrap();
    assert_eq!(v.jdict()[0].category_id, 13);
    assert_eq!(v.jdict()[0].image_id, ImageId::Name("abc".into()));
  }

  #[test]
  fn mps_device_warns_through_diagnostics() {
    let args = ValidatorArgs {
      device: "mps".to_string(),
      ..Default::default()
    };
    let (v, diag) = validator(args);
    assert_eq!(v.args().task, DWA_TASK);
    assert_eq!(diag.warnings().len(), 1);
    assert!(diag.warnings()[0].contains("MPS"));
  }

  #[test]
  fn empty_dataset_warns_on_print() {
    let (mut v, diag) = validator(ValidatorArgs::default());
    v.update_metrics(&[DetectResult::default()], &batch(&[])).unwrap();
    v.get_stats().unwrap();
    v.print_results().unwrap();
    assert_eq!(diag.infos().len(), 1);
    assert!(diag.infos()[0].trim_start().starts_with("all"));
    assert_eq!(diag.warnings().len(), 1);
  }

  #[test]
  fn verbose_prints_detection_metrics_per_class() {
    let args = ValidatorArgs {
      verbose: true,
      ..Default::default()
    };
    let (mut v, diag) = validator(args);
    let b = Batch {
      batch_idx: vec![0, 0],
      cls: vec![0, 1],
      bboxes: vec![[0.5, 0.5, 0.2, 0.4], [0.2, 0.2, 0.2, 0.2]],
      attributes: Matrix::from_rows(2, &[[1.0, 0.0], [0.0, 1.0]]).unwrap(),
      ..batch(&[])
    };
    let preds = DetectResult::from(vec![
      det([40.0, 30.0, 60.0, 70.0], 0.9, 0, [2.0, -2.0]),
      det([10.0, 10.0, 30.0, 30.0], 0.8, 1, [-2.0, 2.0]),
    ]);
    v.update_metrics(&[preds], &b).unwrap();
    let results = v.get_stats().unwrap();
    assert_eq!(results.len(), DwaMetrics::KEYS.len() + 1);
    // 属性全部预测正确
    assert_eq!(results[4].1, 1.0);
    v.print_results().unwrap();

    let infos = diag.infos();
    assert_eq!(infos.len(), 3);
    assert_eq!(infos[0].len(), report::NAME_WIDTH + 10 * report::VALUE_WIDTH);
    assert!(infos[1].trim_start().starts_with("person"));
    assert_eq!(infos[1].len(), report::NAME_WIDTH + 6 * report::VALUE_WIDTH);
    assert!(diag.warnings().is_empty());
  }

  #[test]
  fn update_before_init_fails() {
    let mut v = AttrValidatorBuilder::new(ValidatorArgs::default()).build();
    assert!(matches!(
      v.update_metrics(&[], &batch(&[])),
      Err(ValidatorError::NotInitialized)
    ));
  }
}
