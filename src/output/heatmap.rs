// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/heatmap.rs - 混淆矩阵热力图
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

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::info;

use crate::{
  confusion::ConfusionMatrix,
  output::{OutputError, Plot, confusion_file_name},
  tensor::Matrix,
};

const CELL_SIZE: u32 = 32;
const MARGIN: u32 = 8;
const BACKGROUND_COLOR: [u8; 3] = [255, 255, 255];
const GRID_COLOR: [u8; 3] = [200, 200, 200];
// 最大值对应的颜色（深蓝）
const HOT_COLOR: [u8; 3] = [8, 48, 107];

#[derive(Error, Debug)]
pub enum HeatmapPlotError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 将混淆矩阵绘制为无文字的热力图
#[derive(Debug, Clone, Copy)]
pub struct HeatmapPlotter {
  cell_size: u32,
}

impl Default for HeatmapPlotter {
  fn default() -> Self {
    HeatmapPlotter {
      cell_size: CELL_SIZE,
    }
  }
}

fn blend(t: f64) -> Rgb<u8> {
  let t = t.clamp(0.0, 1.0);
  let mix = |lo: u8, hi: u8| (lo as f64 + (hi as f64 - lo as f64) * t).round() as u8;
  Rgb([
    mix(BACKGROUND_COLOR[0], HOT_COLOR[0]),
    mix(BACKGROUND_COLOR[1], HOT_COLOR[1]),
    mix(BACKGROUND_COLOR[2], HOT_COLOR[2]),
  ])
}

impl HeatmapPlotter {
  pub fn with_cell_size(mut self, cell_size: u32) -> Self {
    self.cell_size = cell_size.max(1);
    self
  }

  /// 渲染热力图，NaN 单元留白
  pub fn render(&self, values: &Matrix<f64>) -> RgbImage {
    let (rows, cols) = values.shape();
    let width = cols as u32 * self.cell_size + 2 * MARGIN;
    let height = rows as u32 * self.cell_size + 2 * MARGIN;
    let mut image = RgbImage::from_pixel(width, height, Rgb(BACKGROUND_COLOR));

    let max = values
      .as_slice()
      .iter()
      .copied()
      .filter(|v| v.is_finite())
      .fold(0.0f64, f64::max);

    for r in 0..rows {
      for c in 0..cols {
        let x = (MARGIN + c as u32 * self.cell_size) as i32;
        let y = (MARGIN + r as u32 * self.cell_size) as i32;
        let rect = Rect::at(x, y).of_size(self.cell_size, self.cell_size);
        let v = *values.get(r, c);
        if v.is_finite() && max > 0.0 {
          draw_filled_rect_mut(&mut image, rect, blend(v / max));
        }
        draw_hollow_rect_mut(&mut image, rect, Rgb(GRID_COLOR));
      }
    }

    image
  }
}

impl Plot for HeatmapPlotter {
  fn plot_confusion(
    &self,
    matrix: &ConfusionMatrix,
    normalize: bool,
    save_dir: &Path,
  ) -> Result<PathBuf, OutputError> {
    let values = if normalize {
      matrix.normalized()
    } else {
      matrix.matrix().clone()
    };
    let image = self.render(&values);

    std::fs::create_dir_all(save_dir)?;
    let path = save_dir.join(confusion_file_name(normalize));
    image.save(&path).map_err(HeatmapPlotError::from)?;
    info!("混淆矩阵已保存: {}", path.display());
    Ok(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn render_colors_cells_by_value() {
    let values = Matrix::from_rows(2, &[[0.0, 1.0], [f64::NAN, 0.5]]).unwrap();
    let image = HeatmapPlotter::default().with_cell_size(10).render(&values);
    assert_eq!(image.dimensions(), (20 + 2 * MARGIN, 20 + 2 * MARGIN));

    let center = |r: u32, c: u32| *image.get_pixel(MARGIN + c * 10 + 5, MARGIN + r * 10 + 5);
    assert_eq!(center(0, 0), Rgb(BACKGROUND_COLOR));
    assert_eq!(center(0, 1), Rgb(HOT_COLOR));
    assert_eq!(center(1, 0), Rgb(BACKGROUND_COLOR));
    assert_ne!(center(1, 1), Rgb(BACKGROUND_COLOR));
  }

  #[test]
  fn plot_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let mut cm = ConfusionMatrix::new(2, None);
    cm.process_batch(None, &[0, 1], &[]);
    let path = HeatmapPlotter::default()
      .plot_confusion(&cm, true, dir.path())
      .unwrap();
    assert!(path.ends_with("confusion_matrix_normalized.png"));
    assert!(path.exists());
  }
}
