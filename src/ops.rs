// 该文件是 Shanan （山南西风） 项目的一部分。
// src/ops.rs - 边界框几何运算
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

use crate::tensor::Matrix;

/// 边界框，具体格式（xyxy 或 xywh）由上下文决定
pub type BBox = [f32; 4];

/// 图像尺寸 [height, width]
pub type Shape = [u32; 2];

const IOU_EPS: f32 = 1e-7;

/// 加载图像时记录的缩放比例与填充
///
/// `ratio` 为 `[ratio_h, ratio_w]`，`pad` 为 `[pad_w, pad_h]`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioPad {
  pub ratio: [f32; 2],
  pub pad: [f32; 2],
}

impl RatioPad {
  /// 按 letterbox 规则由输入尺寸和原图尺寸推算
  pub fn letterbox(input: Shape, original: Shape) -> Self {
    let (ih, iw) = (input[0] as f32, input[1] as f32);
    let (oh, ow) = (original[0] as f32, original[1] as f32);
    let gain = (ih / oh).min(iw / ow);
    let pad_w = ((iw - ow * gain) / 2.0 - 0.1).round();
    let pad_h = ((ih - oh * gain) / 2.0 - 0.1).round();
    RatioPad {
      ratio: [gain, gain],
      pad: [pad_w, pad_h],
    }
  }
}

pub fn xywh2xyxy(b: &BBox) -> BBox {
  let (hw, hh) = (b[2] / 2.0, b[3] / 2.0);
  [b[0] - hw, b[1] - hh, b[0] + hw, b[1] + hh]
}

pub fn xyxy2xywh(b: &BBox) -> BBox {
  [
    (b[0] + b[2]) / 2.0,
    (b[1] + b[3]) / 2.0,
    b[2] - b[0],
    b[3] - b[1],
  ]
}

/// 将 xyxy 框裁剪到图像范围内
pub fn clip_boxes(boxes: &mut [BBox], shape: Shape) {
  let (h, w) = (shape[0] as f32, shape[1] as f32);
  for b in boxes.iter_mut() {
    b[0] = b[0].clamp(0.0, w);
    b[1] = b[1].clamp(0.0, h);
    b[2] = b[2].clamp(0.0, w);
    b[3] = b[3].clamp(0.0, h);
  }
}

/// 将 xyxy 框从模型输入尺寸 `input` 还原到原图尺寸 `original`
///
/// 未提供 `ratio_pad` 时按 letterbox 规则推算。
pub fn scale_boxes(input: Shape, boxes: &mut [BBox], original: Shape, ratio_pad: Option<&RatioPad>) {
  let rp = match ratio_pad {
    Some(rp) => *rp,
    None => RatioPad::letterbox(input, original),
  };
  let gain = rp.ratio[0];
  let [pad_x, pad_y] = rp.pad;
  for b in boxes.iter_mut() {
    b[0] = (b[0] - pad_x) / gain;
    b[1] = (b[1] - pad_y) / gain;
    b[2] = (b[2] - pad_x) / gain;
    b[3] = (b[3] - pad_y) / gain;
  }
  clip_boxes(boxes, original);
}

pub fn box_area(b: &BBox) -> f32 {
  (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// 两个 xyxy 框的 IoU
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
  let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
  let inter = w * h;
  inter / (box_area(a) + box_area(b) - inter + IOU_EPS)
}

/// 两组 xyxy 框的两两 IoU，结果形状为 [a.len() × b.len()]
pub fn box_iou(a: &[BBox], b: &[BBox]) -> Matrix<f32> {
  let mut out = Matrix::zeros(a.len(), b.len());
  for (i, ba) in a.iter().enumerate() {
    let row = out.row_mut(i);
    for (j, bb) in b.iter().enumerate() {
      row[j] = iou(ba, bb);
    }
  }
  out
}

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 保留 `decimals` 位小数
pub fn round_to(x: f32, decimals: i32) -> f64 {
  let scale = 10f64.powi(decimals);
  (x as f64 * scale).round() / scale
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: &BBox, b: &BBox, tol: f32) -> bool {
    a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tol)
  }

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = [10.0, 20.0, 50.0, 80.0];
    assert!((iou(&b, &b) - 1.0).abs() < 1e-5);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[20.0, 20.0, 30.0, 30.0]), 0.0);
  }

  #[test]
  fn iou_partial_overlap() {
    // 交集 5x5=25，并集 175
    let v = iou(&[0.0, 0.0, 10.0, 10.0], &[5.0, 5.0, 15.0, 15.0]);
    assert!((v - 25.0 / 175.0).abs() < 1e-5);
  }

  #[test]
  fn box_iou_shape() {
    let a = [[0.0, 0.0, 10.0, 10.0], [5.0, 5.0, 15.0, 15.0]];
    let b = [[0.0, 0.0, 10.0, 10.0]];
    let m = box_iou(&a, &b);
    assert_eq!(m.shape(), (2, 1));
    assert!((m.get(0, 0) - 1.0).abs() < 1e-5);
  }

  #[test]
  fn xywh_xyxy_round_trip() {
    let b = [12.5, 30.0, 100.25, 40.0];
    let xywh = xyxy2xywh(&b);
    assert!(close(&xywh2xyxy(&xywh), &b, 1e-4));
  }

  #[test]
  fn scale_boxes_undoes_letterbox() {
    // 原图 480x640 (h, w)，letterbox 到 640x640：gain=1，上下各填充 80
    let rp = RatioPad::letterbox([640, 640], [480, 640]);
    assert_eq!(rp.ratio, [1.0, 1.0]);
    assert_eq!(rp.pad, [0.0, 80.0]);

    let mut boxes = [[10.0, 90.0, 110.0, 190.0]];
    scale_boxes([640, 640], &mut boxes, [480, 640], Some(&rp));
    assert!(close(&boxes[0], &[10.0, 10.0, 110.0, 110.0], 1e-4));
  }

  #[test]
  fn scale_boxes_clips_to_original() {
    let rp = RatioPad {
      ratio: [0.5, 0.5],
      pad: [0.0, 0.0],
    };
    let mut boxes = [[-5.0, 0.0, 400.0, 100.0]];
    scale_boxes([320, 320], &mut boxes, [640, 640], Some(&rp));
    assert!(close(&boxes[0], &[0.0, 0.0, 640.0, 200.0], 1e-4));
  }

  #[test]
  fn round_to_decimals() {
    assert!((round_to(1.23456, 3) - 1.235).abs() < 1e-9);
    assert!((round_to(0.876543, 5) - 0.87654).abs() < 1e-6);
  }
}
