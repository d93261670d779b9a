// 该文件是 Shanan （山南西风） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::{
  model::{DetectItem, DetectResult, RawOutput, RawOutputError},
  ops::{BBox, iou, xywh2xyxy},
};

/// 进入 NMS 的最大候选框数量
pub const MAX_NMS: usize = 30000;
/// 按类别偏移框时使用的最大边长
pub const MAX_WH: f32 = 7680.0;

/// NMS 参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsConfig {
  /// 置信度阈值
  pub conf: f32,
  /// IoU 阈值
  pub iou: f32,
  /// 类别无关 NMS
  pub agnostic: bool,
  /// 每个 anchor 允许多个类别
  pub multi_label: bool,
  /// 每张图像最多保留的检测数
  pub max_det: usize,
  /// 类别数
  pub nc: usize,
}

struct Candidate {
  bbox: BBox,
  score: f32,
  class_id: u32,
  anchor: usize,
}

/// 对一个批次的原始输出执行 NMS
pub fn non_max_suppression(
  outputs: &[RawOutput],
  config: &NmsConfig,
) -> Result<Vec<DetectResult>, RawOutputError> {
  outputs
    .iter()
    .map(|output| non_max_suppression_single(output, config))
    .collect()
}

/// 对单张图像的原始输出执行 NMS
pub fn non_max_suppression_single(
  output: &RawOutput,
  config: &NmsConfig,
) -> Result<DetectResult, RawOutputError> {
  let nc = config.nc;
  let num_extra = output.num_extra(nc)?;
  let multi_label = config.multi_label && nc > 1;

  let mut candidates = Vec::new();
  for a in 0..output.anchors() {
    let (best_class, best_score) = (0..nc)
      .map(|c| (c, output.value(4 + c, a)))
      .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
    if best_score <= config.conf {
      continue;
    }

    let bbox = xywh2xyxy(&[
      output.value(0, a),
      output.value(1, a),
      output.value(2, a),
      output.value(3, a),
    ]);

    if multi_label {
      for c in 0..nc {
        let score = output.value(4 + c, a);
        if score > config.conf {
          candidates.push(Candidate {
            bbox,
            score,
            class_id: c as u32,
            anchor: a,
          });
        }
      }
    } else {
      candidates.push(Candidate {
        bbox,
        score: best_score,
        class_id: best_class as u32,
        anchor: a,
      });
    }
  }

  if candidates.is_empty() {
    return Ok(DetectResult::default());
  }

  // 按置信度降序排序
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
  candidates.truncate(MAX_NMS);

  let offset = |c: &Candidate| -> BBox {
    let o = if config.agnostic { 0.0 } else { c.class_id as f32 * MAX_WH };
    [c.bbox[0] + o, c.bbox[1] + o, c.bbox[2] + o, c.bbox[3] + o]
  };

  let mut keep: Vec<&Candidate> = Vec::new();
  let mut suppressed = vec![false; candidates.len()];
  for i in 0..candidates.len() {
    if keep.len() >= config.max_det {
      break;
    }
    if suppressed[i] {
      continue;
    }
    keep.push(&candidates[i]);
    let best = offset(&candidates[i]);
    for j in (i + 1)..candidates.len() {
      if !suppressed[j] && iou(&best, &offset(&candidates[j])) > config.iou {
        suppressed[j] = true;
      }
    }
  }

  debug!(
    "NMS: {} 个候选框, 保留 {} 个",
    candidates.len(),
    keep.len()
  );

  let base = 4 + nc;
  let items = keep
    .into_iter()
    .map(|c| DetectItem {
      class_id: c.class_id,
      score: c.score,
      bbox: c.bbox,
      attributes: (0..num_extra).map(|k| output.value(base + k, c.anchor)).collect(),
    })
    .collect::<Vec<_>>();

  Ok(DetectResult::from(items))
}
