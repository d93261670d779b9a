// 该文件是 Shanan （山南西风） 项目的一部分。
// src/report.rs - 验证结果表格格式化
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

/// 名称列宽度
pub const NAME_WIDTH: usize = 22;
/// 数值列宽度
pub const VALUE_WIDTH: usize = 11;
/// 指标的有效数字位数
pub const METRIC_PRECISION: usize = 3;

/// 表头各列
pub const DESC_COLUMNS: [&str; 11] = [
  "Class",
  "Images",
  "Instances",
  "Box(P",
  "R",
  "mAP50",
  "mAP50-95)",
  "Attr(Acc",
  "P",
  "R",
  "F1)",
];

fn strip_trailing_zeros(s: &str) -> &str {
  if s.contains('.') {
    s.trim_end_matches('0').trim_end_matches('.')
  } else {
    s
  }
}

/// 与 C printf `%.{precision}g` 一致的格式化
pub fn format_g(value: f64, precision: usize) -> String {
  if value.is_nan() {
    return "nan".to_string();
  }
  if value.is_infinite() {
    return if value > 0.0 { "inf" } else { "-inf" }.to_string();
  }
  if value == 0.0 {
    return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
  }

  let p = precision.max(1);
  let sci = format!("{:.*e}", p - 1, value);
  let (mantissa, exp) = match sci.split_once('e') {
    Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
    None => (sci.as_str(), 0),
  };

  if exp >= -4 && exp < p as i32 {
    let fixed = format!("{:.*}", (p as i32 - 1 - exp) as usize, value);
    strip_trailing_zeros(&fixed).to_string()
  } else {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", strip_trailing_zeros(mantissa), sign, exp.abs())
  }
}

/// 表头，`%22s` 加 10 个 `%11s`
pub fn desc() -> String {
  let mut out = format!("{:>w$}", DESC_COLUMNS[0], w = NAME_WIDTH);
  for col in &DESC_COLUMNS[1..] {
    out.push_str(&format!("{:>w$}", col, w = VALUE_WIDTH));
  }
  out
}

/// 一行结果：名称、图像数、实例数以及若干指标
pub fn format_row(name: &str, images: usize, instances: usize, values: &[f64]) -> String {
  let mut out = format!(
    "{:>nw$}{:>vw$}{:>vw$}",
    name,
    images,
    instances,
    nw = NAME_WIDTH,
    vw = VALUE_WIDTH
  );
  for &v in values {
    out.push_str(&format!("{:>w$}", format_g(v, METRIC_PRECISION), w = VALUE_WIDTH));
  }
  out
}
