// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/prediction_json.rs - COCO JSON 预测结果
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

use std::{fs::File, io::BufWriter, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::output::OutputError;

/// 图像标识，文件名为纯数字时使用整数
///
/// 超出 `u64` 范围的数字文件名保留为原字符串。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageId {
  Number(u64),
  Name(String),
}

impl ImageId {
  pub fn from_path(path: &Path) -> Self {
    let stem = path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    if !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit()) {
      if let Ok(n) = stem.parse() {
        return ImageId::Number(n);
      }
    }
    ImageId::Name(stem)
  }
}

/// 单个检测的 COCO 风格记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
  pub image_id: ImageId,
  pub category_id: u32,
  /// 左上角 xywh，保留 3 位小数
  pub bbox: [f64; 4],
  /// 属性 logits
  pub attributes: Vec<f32>,
  /// 保留 5 位小数
  pub score: f64,
}

/// 将全部记录写为 JSON 数组
pub fn save_predictions(path: &Path, records: &[PredictionRecord]) -> Result<(), OutputError> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  let writer = BufWriter::new(File::create(path)?);
  serde_json::to_writer(writer, records)?;
  info!("保存 {} 条预测结果到 {}", records.len(), path.display());
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numeric_stem_becomes_number() {
    assert_eq!(ImageId::from_path(Path::new("val/000000139.jpg")), ImageId::Number(139));
    assert_eq!(
      ImageId::from_path(Path::new("val/img_12.png")),
      ImageId::Name("img_12".to_string())
    );
  }

  #[test]
  fn oversized_numeric_stem_stays_a_name() {
    assert_eq!(
      ImageId::from_path(Path::new("val/18446744073709551615.jpg")),
      ImageId::Number(u64::MAX)
    );
    assert_eq!(
      ImageId::from_path(Path::new("val/18446744073709551616.jpg")),
      ImageId::Name("18446744073709551616".to_string())
    );
  }

  #[test]
  fn image_id_serializes_untagged() {
    let n = serde_json::to_string(&ImageId::Number(42)).unwrap();
    let s = serde_json::to_string(&ImageId::Name("cat".into())).unwrap();
    assert_eq!(n, "42");
    assert_eq!(s, "\"cat\"");
  }

  #[test]
  fn save_predictions_writes_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/predictions.json");
    let records = vec![PredictionRecord {
      image_id: ImageId::Number(7),
      category_id: 3,
      bbox: [1.0, 2.0, 3.5, 4.25],
      attributes: vec![0.5, -1.0],
      score: 0.91234,
    }];
    save_predictions(&path, &records).unwrap();
    let loaded: Vec<PredictionRecord> =
      serde_json::from_reader(File::open(&path).unwrap()).unwrap();
    assert_eq!(loaded, records);
  }
}
