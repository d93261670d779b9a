// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 验证程序入口
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

use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_dwa::{
  FromUrl,
  config::ValidatorArgs,
  input::InputWrapper,
  task::{Task, ValidationTask},
  validator::{AttrValidatorBuilder, DatasetMeta},
};

/// DWA 模型验证参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 录制的批次来源 (jsonl:// 或 json://)
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 数据集描述文件 (JSON)
  #[arg(long, value_name = "DATA")]
  pub data: PathBuf,
  /// 最多处理的批次数
  #[arg(long, value_name = "BATCH_NUMBER")]
  pub batch_number: Option<usize>,

  #[command(flatten)]
  pub validator: ValidatorArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("批次来源: {}", args.input);
  info!("数据集描述: {}", args.data.display());

  let meta: DatasetMeta = {
    let file = File::open(&args.data)
      .with_context(|| format!("无法打开数据集描述文件 {}", args.data.display()))?;
    serde_json::from_reader(BufReader::new(file))?
  };
  info!("类别数: {}, 属性数: {}", meta.names.len(), meta.num_attr);

  let input = InputWrapper::from_url(&args.input)?;

  let builder = AttrValidatorBuilder::new(args.validator);
  #[cfg(feature = "plots")]
  let builder = builder.plotter(Box::new(shanan_dwa::output::HeatmapPlotter::default()));
  let mut validator = builder.build();
  info!("结果保存目录: {}", validator.save_dir().display());

  let summary = ValidationTask::new(meta)
    .with_batch_number(args.batch_number)
    .with_interrupt_handler(true)
    .run_task(input, &mut validator)?;

  for (key, value) in &summary.results {
    info!("{}: {:.5}", key, value);
  }
  info!(
    "验证完成: {} 个批次, {} 张图像{}",
    summary.batches,
    summary.images,
    if summary.interrupted { " (已中断)" } else { "" }
  );

  Ok(())
}
