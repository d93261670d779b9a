// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/jsonl_input.rs - JSON Lines 批次输入
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
  fs::File,
  io::{BufRead, BufReader, Lines},
};

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::RecordedBatch};

#[derive(Error, Debug)]
pub enum JsonLinesInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("第 {line} 行解析失败: {source}")]
  ParseError {
    line: usize,
    source: serde_json::Error,
  },
}

/// 每行一个 [`RecordedBatch`] 的文件，`jsonl:///path/to/batches.jsonl`
pub struct JsonLinesInput {
  lines: Lines<BufReader<File>>,
  line: usize,
}

impl FromUrlWithScheme for JsonLinesInput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesInput {
  type Error = JsonLinesInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(JsonLinesInputError::SchemeMismatch);
    }

    debug!("打开批次文件: {}", url.path());
    let file = File::open(url.path())?;
    Ok(JsonLinesInput {
      lines: BufReader::new(file).lines(),
      line: 0,
    })
  }
}

impl Iterator for JsonLinesInput {
  type Item = Result<RecordedBatch, JsonLinesInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let line = match self.lines.next()? {
        Ok(line) => line,
        Err(e) => return Some(Err(e.into())),
      };
      self.line += 1;
      if line.trim().is_empty() {
        continue;
      }
      return Some(
        serde_json::from_str(&line).map_err(|source| JsonLinesInputError::ParseError {
          line: self.line,
          source,
        }),
      );
    }
  }
}
