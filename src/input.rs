// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 验证批次输入
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
use thiserror::Error;

use crate::{FromUrl, batch::Batch, model::RawOutput};

/// 一个批次的标注以及模型对该批次的原始输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedBatch {
  pub batch: Batch<u8>,
  pub preds: Vec<RawOutput>,
}

#[cfg(feature = "jsonl_input")]
mod jsonl_input;
#[cfg(feature = "jsonl_input")]
pub use self::jsonl_input::{JsonLinesInput, JsonLinesInputError};

#[cfg(feature = "json_input")]
mod json_input;
#[cfg(feature = "json_input")]
pub use self::json_input::{JsonArrayInput, JsonArrayInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "jsonl_input")]
  #[error("JSON Lines 输入错误: {0}")]
  JsonLinesInputError(#[from] JsonLinesInputError),
  #[cfg(feature = "json_input")]
  #[error("JSON 输入错误: {0}")]
  JsonArrayInputError(#[from] JsonArrayInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "jsonl_input")]
  JsonLines(JsonLinesInput),
  #[cfg(feature = "json_input")]
  JsonArray(JsonArrayInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "jsonl_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == JsonLinesInput::SCHEME {
        let input = JsonLinesInput::from_url(url)?;
        return Ok(InputWrapper::JsonLines(input));
      }
    }
    #[cfg(feature = "json_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == JsonArrayInput::SCHEME {
        let input = JsonArrayInput::from_url(url)?;
        return Ok(InputWrapper::JsonArray(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl Iterator for InputWrapper {
  type Item = Result<RecordedBatch, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "jsonl_input")]
      InputWrapper::JsonLines(input) => input.next().map(|r| r.map_err(InputError::from)),
      #[cfg(feature = "json_input")]
      InputWrapper::JsonArray(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{io::Write, path::PathBuf};

  use super::*;
  use crate::tensor::Matrix;

  fn recorded(cls: u32) -> RecordedBatch {
    RecordedBatch {
      batch: Batch {
        input_shape: [64, 64],
        batch_idx: vec![0],
        cls: vec![cls],
        bboxes: vec![[0.5, 0.5, 0.25, 0.25]],
        attributes: Matrix::from_rows(1, &[[1u8]]).unwrap(),
        ori_shape: vec![[64, 64]],
        ratio_pad: vec![None],
        im_file: vec![PathBuf::from("images/1.jpg")],
      },
      preds: vec![RawOutput::new(6, 1, vec![32.0, 32.0, 16.0, 16.0, 0.9, 2.0]).unwrap()],
    }
  }

  #[cfg(feature = "jsonl_input")]
  #[test]
  fn reads_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batches.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    for cls in [0, 1] {
      writeln!(file, "{}", serde_json::to_string(&recorded(cls)).unwrap()).unwrap();
    }
    writeln!(file).unwrap();
    drop(file);

    let url = url::Url::parse(&format!("jsonl://{}", path.display())).unwrap();
    let batches: Vec<_> = InputWrapper::from_url(&url)
      .unwrap()
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(batches, vec![recorded(0), recorded(1)]);
  }

  #[cfg(feature = "jsonl_input")]
  #[test]
  fn reports_bad_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batches.jsonl");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{}", serde_json::to_string(&recorded(0)).unwrap()).unwrap();
    writeln!(file, "{{\"batch\": 1}}").unwrap();
    drop(file);

    let url = url::Url::parse(&format!("jsonl://{}", path.display())).unwrap();
    let mut input = InputWrapper::from_url(&url).unwrap();
    assert!(input.next().unwrap().is_ok());
    match input.next() {
      Some(Err(InputError::JsonLinesInputError(JsonLinesInputError::ParseError { line, .. }))) => {
        assert_eq!(line, 2)
      }
      other => panic!("unexpected: {:?}", other.map(|r| r.is_ok())),
    }
    assert!(input.next().is_none());
  }

  #[cfg(feature = "json_input")]
  #[test]
  fn reads_json_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batches.json");
    std::fs::write(&path, serde_json::to_string(&vec![recorded(1)]).unwrap()).unwrap();

    let url = url::Url::parse(&format!("json://{}", path.display())).unwrap();
    let batches: Vec<_> = InputWrapper::from_url(&url)
      .unwrap()
      .collect::<Result<_, _>>()
      .unwrap();
    assert_eq!(batches, vec![recorded(1)]);
  }

  #[test]
  fn rejects_unknown_scheme() {
    let url = url::Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }
}
