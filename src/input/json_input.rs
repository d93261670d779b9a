// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/json_input.rs - JSON 数组批次输入
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

use std::{fs::File, io::BufReader};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::RecordedBatch};

#[derive(Error, Debug)]
pub enum JsonArrayInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析失败: {0}")]
  ParseError(#[from] serde_json::Error),
}

/// 整个文件为 [`RecordedBatch`] 数组，`json:///path/to/batches.json`
pub struct JsonArrayInput {
  batches: std::vec::IntoIter<RecordedBatch>,
}

impl FromUrlWithScheme for JsonArrayInput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonArrayInput {
  type Error = JsonArrayInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(JsonArrayInputError::SchemeMismatch);
    }

    let file = File::open(url.path())?;
    let batches: Vec<RecordedBatch> = serde_json::from_reader(BufReader::new(file))?;
    debug!("读取 {} 个批次: {}", batches.len(), url.path());
    Ok(JsonArrayInput {
      batches: batches.into_iter(),
    })
  }
}

impl Iterator for JsonArrayInput {
  type Item = Result<RecordedBatch, JsonArrayInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.batches.next().map(Ok)
  }
}
