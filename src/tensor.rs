// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 二维矩阵
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

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
  #[error("数据长度不匹配: 期望 {rows}x{cols}={expected}, 实际 {actual}")]
  LengthMismatch {
    rows: usize,
    cols: usize,
    expected: usize,
    actual: usize,
  },
  #[error("列数不一致: 期望 {expected}, 实际 {actual}")]
  ColumnMismatch { expected: usize, actual: usize },
}

/// 行主序的二维矩阵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixRepr<T>", into = "MatrixRepr<T>")]
#[serde(bound(
  serialize = "T: Clone + Serialize",
  deserialize = "T: Deserialize<'de>"
))]
pub struct Matrix<T> {
  rows: usize,
  cols: usize,
  data: Box<[T]>,
}

#[derive(Serialize, Deserialize)]
struct MatrixRepr<T> {
  rows: usize,
  cols: usize,
  data: Vec<T>,
}

impl<T> TryFrom<MatrixRepr<T>> for Matrix<T> {
  type Error = MatrixError;

  fn try_from(repr: MatrixRepr<T>) -> Result<Self, Self::Error> {
    Matrix::from_vec(repr.rows, repr.cols, repr.data)
  }
}

impl<T> From<Matrix<T>> for MatrixRepr<T> {
  fn from(matrix: Matrix<T>) -> Self {
    MatrixRepr {
      rows: matrix.rows,
      cols: matrix.cols,
      data: matrix.data.into_vec(),
    }
  }
}

impl<T: Clone> Matrix<T> {
  pub fn filled(rows: usize, cols: usize, value: T) -> Self {
    Self {
      rows,
      cols,
      data: vec![value; rows * cols].into_boxed_slice(),
    }
  }

  /// 按索引挑选行，索引可以重复
  pub fn select_rows(&self, indices: &[usize]) -> Self {
    let mut data = Vec::with_capacity(indices.len() * self.cols);
    for &i in indices {
      data.extend_from_slice(self.row(i));
    }
    Self {
      rows: indices.len(),
      cols: self.cols,
      data: data.into_boxed_slice(),
    }
  }

  /// 沿行方向拼接，所有矩阵的列数必须一致
  pub fn concat_rows<'a, I>(cols: usize, parts: I) -> Result<Self, MatrixError>
  where
    I: IntoIterator<Item = &'a Matrix<T>>,
    T: 'a,
  {
    let mut rows = 0;
    let mut data = Vec::new();
    for part in parts {
      if part.cols != cols {
        return Err(MatrixError::ColumnMismatch {
          expected: cols,
          actual: part.cols,
        });
      }
      rows += part.rows;
      data.extend_from_slice(&part.data);
    }
    Ok(Self {
      rows,
      cols,
      data: data.into_boxed_slice(),
    })
  }
}

impl<T: Default + Clone> Matrix<T> {
  pub fn zeros(rows: usize, cols: usize) -> Self {
    Self::filled(rows, cols, T::default())
  }
}

impl<T> Matrix<T> {
  pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, MatrixError> {
    if data.len() != rows * cols {
      return Err(MatrixError::LengthMismatch {
        rows,
        cols,
        expected: rows * cols,
        actual: data.len(),
      });
    }
    Ok(Self {
      rows,
      cols,
      data: data.into_boxed_slice(),
    })
  }

  pub fn from_rows<R: AsRef<[T]>>(cols: usize, rows: &[R]) -> Result<Self, MatrixError>
  where
    T: Clone,
  {
    let mut data = Vec::with_capacity(rows.len() * cols);
    for row in rows {
      let row = row.as_ref();
      if row.len() != cols {
        return Err(MatrixError::ColumnMismatch {
          expected: cols,
          actual: row.len(),
        });
      }
      data.extend_from_slice(row);
    }
    Self::from_vec(rows.len(), cols, data)
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn shape(&self) -> (usize, usize) {
    (self.rows, self.cols)
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[T] {
    &self.data
  }

  pub fn row(&self, r: usize) -> &[T] {
    &self.data[r * self.cols..(r + 1) * self.cols]
  }

  pub fn row_mut(&mut self, r: usize) -> &mut [T] {
    &mut self.data[r * self.cols..(r + 1) * self.cols]
  }

  pub fn get(&self, r: usize, c: usize) -> &T {
    &self.data[r * self.cols + c]
  }

  pub fn set(&mut self, r: usize, c: usize, value: T) {
    self.data[r * self.cols + c] = value;
  }

  pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> {
    // cols 为 0 时 chunks 不可用
    (0..self.rows).map(move |r| self.row(r))
  }

  pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Matrix<U> {
    Matrix {
      rows: self.rows,
      cols: self.cols,
      data: self.data.iter().map(f).collect(),
    }
  }
}

impl Matrix<bool> {
  pub fn any(&self) -> bool {
    self.data.iter().any(|&v| v)
  }
}
