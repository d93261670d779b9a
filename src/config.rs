// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 验证参数配置
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

use clap::Args;

use crate::nms::NmsConfig;

/// 验证参数配置
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ValidatorArgs {
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.001, value_name = "THRESHOLD")]
  pub conf: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = 0.7, value_name = "THRESHOLD")]
  pub iou: f32,

  /// 类别无关 NMS
  #[arg(long)]
  pub agnostic_nms: bool,

  /// 每张图像最多保留的检测数
  #[arg(long, default_value_t = 300, value_name = "COUNT")]
  pub max_det: usize,

  /// 将所有类别视为同一类
  #[arg(long)]
  pub single_cls: bool,

  /// 打印逐类别结果
  #[arg(long)]
  pub verbose: bool,

  /// 绘制混淆矩阵
  #[arg(long)]
  pub plots: bool,

  /// 保存 COCO JSON 格式的预测结果
  #[arg(long)]
  pub save_json: bool,

  /// 任务名称
  #[arg(long, default_value = "dwa", value_name = "TASK")]
  pub task: String,

  /// 计算设备
  #[arg(long, default_value = "cpu", value_name = "DEVICE")]
  pub device: String,

  /// 结果保存目录，缺省为 runs/<task>/val-<时间戳>
  #[arg(long, value_name = "DIR")]
  pub save_dir: Option<PathBuf>,

  /// 作为训练过程中的验证运行，此时不打印逐类别结果
  #[arg(skip)]
  pub training: bool,
}

impl Default for ValidatorArgs {
  fn default() -> Self {
    ValidatorArgs {
      conf: 0.001,
      iou: 0.7,
      agnostic_nms: false,
      max_det: 300,
      single_cls: false,
      verbose: false,
      plots: false,
      save_json: false,
      task: "dwa".to_string(),
      device: "cpu".to_string(),
      save_dir: None,
      training: false,
    }
  }
}

impl ValidatorArgs {
  /// 由配置生成 NMS 参数，单类别模式下使用类别无关 NMS
  pub fn nms_config(&self, nc: usize) -> NmsConfig {
    NmsConfig {
      conf: self.conf,
      iou: self.iou,
      agnostic: self.agnostic_nms || self.single_cls,
      multi_label: true,
      max_det: self.max_det,
      nc,
    }
  }

  /// 是否为已知有问题的加速设备
  pub fn is_mps(&self) -> bool {
    self.device.eq_ignore_ascii_case("mps")
  }
}
