// 该文件是 Shanan （山南西风） 项目的一部分。
// src/diagnostics.rs - 诊断信息输出
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

use std::sync::Mutex;

use tracing::{info, warn};

/// 验证过程中的提示与警告的接收者
pub trait Diagnostics: Send + Sync {
  fn info(&self, message: &str);
  fn warn(&self, message: &str);
}

/// 转发到 tracing 的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
  fn info(&self, message: &str) {
    info!("{}", message);
  }

  fn warn(&self, message: &str) {
    warn!("{}", message);
  }
}

/// 记录所有消息，便于检查
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
  infos: Mutex<Vec<String>>,
  warnings: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
  pub fn infos(&self) -> Vec<String> {
    self.infos.lock().map(|v| v.clone()).unwrap_or_default()
  }

  pub fn warnings(&self) -> Vec<String> {
    self.warnings.lock().map(|v| v.clone()).unwrap_or_default()
  }
}

impl Diagnostics for RecordingDiagnostics {
  fn info(&self, message: &str) {
    if let Ok(mut v) = self.infos.lock() {
      v.push(message.to_string());
    }
  }

  fn warn(&self, message: &str) {
    if let Ok(mut v) = self.warnings.lock() {
      v.push(message.to_string());
    }
  }
}
