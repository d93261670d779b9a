// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 验证任务
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  input::RecordedBatch,
  validator::{AttrValidator, DatasetMeta},
};

pub trait Task<I, V>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, validator: V) -> Result<Self::Output, Self::Error>;
}

/// 各阶段累计耗时
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Speed {
  pub preprocess: Duration,
  pub postprocess: Duration,
  pub metrics: Duration,
}

impl Speed {
  /// 每张图像的平均耗时，单位毫秒
  pub fn per_image_ms(&self, images: usize) -> [f64; 3] {
    let n = images.max(1) as f64;
    [self.preprocess, self.postprocess, self.metrics].map(|d| d.as_secs_f64() * 1e3 / n)
  }
}

/// 一次验证运行的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationSummary {
  pub results: Vec<(String, f64)>,
  pub batches: usize,
  pub images: usize,
  pub speed: Speed,
  pub interrupted: bool,
}

/// 逐批次驱动 [`AttrValidator`] 的任务
#[derive(Debug)]
pub struct ValidationTask {
  meta: DatasetMeta,
  batch_number: Option<usize>,
  handle_interrupt: bool,
}

impl ValidationTask {
  pub fn new(meta: DatasetMeta) -> Self {
    ValidationTask {
      meta,
      batch_number: None,
      handle_interrupt: false,
    }
  }

  pub fn with_batch_number(mut self, batch_number: Option<usize>) -> Self {
    self.batch_number = batch_number;
    self
  }

  pub fn with_interrupt_handler(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }

  fn interrupt_flag(&self) -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    if self.handle_interrupt {
      let handler_flag = flag.clone();
      if let Err(e) = ctrlc::set_handler(move || {
        info!("收到中断信号，处理完当前批次后退出...");
        handler_flag.store(true, Ordering::SeqCst);
      }) {
        warn!("无法设置 Ctrl-C 处理器: {}", e);
      }
    }
    flag
  }
}

impl<'a, E, I> Task<I, &'a mut AttrValidator> for ValidationTask
where
  E: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<RecordedBatch, E>>,
{
  type Output = ValidationSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: I, validator: &'a mut AttrValidator) -> Result<Self::Output, Self::Error> {
    let interrupted = self.interrupt_flag();

    validator.init_metrics(&self.meta);
    info!("{}", validator.get_desc());

    let mut speed = Speed::default();
    let mut batches = 0;
    let mut images = 0;
    for recorded in input {
      let RecordedBatch { batch, preds } = recorded?;
      batches += 1;
      images += batch.num_images();
      debug!("处理第 {} 个批次，共 {} 张图像", batches, batch.num_images());

      let now = Instant::now();
      let batch = validator.preprocess(batch)?;
      speed.preprocess += now.elapsed();

      let now = Instant::now();
      let dets = validator.postprocess(&preds)?;
      speed.postprocess += now.elapsed();

      let now = Instant::now();
      validator.update_metrics(&dets, &batch)?;
      speed.metrics += now.elapsed();

      if self.batch_number.map(|n| batches >= n).unwrap_or(false) {
        info!("达到指定批次数 {}, 退出验证循环", batches);
        break;
      }
      if interrupted.load(Ordering::SeqCst) {
        warn!("中断信号接收，使用已处理的 {} 个批次计算指标", batches);
        break;
      }
    }

    let results = validator.get_stats()?;
    validator.print_results()?;
    if let Some(path) = validator.save_json()? {
      info!("预测结果已保存至 {}", path.display());
    }

    let [pre, post, metrics] = speed.per_image_ms(images);
    info!(
      "速度: 预处理 {:.1}ms, 后处理 {:.1}ms, 指标 {:.1}ms 每张图像",
      pre, post, metrics
    );

    Ok(ValidationSummary {
      results,
      batches,
      images,
      speed,
      interrupted: interrupted.load(Ordering::SeqCst),
    })
  }
}
