// 该文件是 Kanjian （看见） 项目的一部分。
// src/request.rs - 视觉请求类型
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

use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// 单个视觉请求类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
  /// 图像分类
  Classification,
  /// 矩形检测
  RectangleDetection,
  /// 条码识别
  BarcodeScanning,
}

impl RequestKind {
  pub const ALL: [RequestKind; 3] = [
    RequestKind::Classification,
    RequestKind::RectangleDetection,
    RequestKind::BarcodeScanning,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      RequestKind::Classification => "classification",
      RequestKind::RectangleDetection => "rectangle",
      RequestKind::BarcodeScanning => "barcode",
    }
  }
}

impl fmt::Display for RequestKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("未知的请求类型: {0}")]
pub struct UnknownRequestKind(pub String);

impl FromStr for RequestKind {
  type Err = UnknownRequestKind;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "classification" | "classify" => Ok(RequestKind::Classification),
      "rectangle" | "rectangles" | "rectangle-detection" => Ok(RequestKind::RectangleDetection),
      "barcode" | "barcodes" | "barcode-scanning" => Ok(RequestKind::BarcodeScanning),
      other => Err(UnknownRequestKind(other.to_string())),
    }
  }
}

/// 一组同时启用的视觉请求
///
/// 每个请求类型对应一个独立的布尔成员，组合只能通过 [`RequestKinds::union`]
/// 或 `|` 运算得到。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RequestKinds {
  classification: bool,
  rectangle_detection: bool,
  barcode_scanning: bool,
}

impl RequestKinds {
  pub const NONE: RequestKinds = RequestKinds {
    classification: false,
    rectangle_detection: false,
    barcode_scanning: false,
  };

  pub const CLASSIFICATION: RequestKinds = RequestKinds {
    classification: true,
    ..RequestKinds::NONE
  };

  pub const RECTANGLE_DETECTION: RequestKinds = RequestKinds {
    rectangle_detection: true,
    ..RequestKinds::NONE
  };

  pub const BARCODE_SCANNING: RequestKinds = RequestKinds {
    barcode_scanning: true,
    ..RequestKinds::NONE
  };

  pub const fn only(kind: RequestKind) -> Self {
    match kind {
      RequestKind::Classification => Self::CLASSIFICATION,
      RequestKind::RectangleDetection => Self::RECTANGLE_DETECTION,
      RequestKind::BarcodeScanning => Self::BARCODE_SCANNING,
    }
  }

  pub const fn union(self, other: RequestKinds) -> Self {
    RequestKinds {
      classification: self.classification || other.classification,
      rectangle_detection: self.rectangle_detection || other.rectangle_detection,
      barcode_scanning: self.barcode_scanning || other.barcode_scanning,
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::NONE
  }

  pub fn contains(&self, kind: RequestKind) -> bool {
    match kind {
      RequestKind::Classification => self.classification,
      RequestKind::RectangleDetection => self.rectangle_detection,
      RequestKind::BarcodeScanning => self.barcode_scanning,
    }
  }

  /// 是否包含 `other` 中的全部请求
  pub fn contains_all(&self, other: RequestKinds) -> bool {
    other.iter().all(|kind| self.contains(kind))
  }

  pub fn insert(&mut self, kind: RequestKind) {
    *self.slot(kind) = true;
  }

  pub fn remove(&mut self, kind: RequestKind) {
    *self.slot(kind) = false;
  }

  pub fn iter(&self) -> impl Iterator<Item = RequestKind> + '_ {
    RequestKind::ALL
      .into_iter()
      .filter(move |kind| self.contains(*kind))
  }

  pub fn len(&self) -> usize {
    self.iter().count()
  }

  fn slot(&mut self, kind: RequestKind) -> &mut bool {
    match kind {
      RequestKind::Classification => &mut self.classification,
      RequestKind::RectangleDetection => &mut self.rectangle_detection,
      RequestKind::BarcodeScanning => &mut self.barcode_scanning,
    }
  }
}

impl From<RequestKind> for RequestKinds {
  fn from(kind: RequestKind) -> Self {
    RequestKinds::only(kind)
  }
}

impl FromIterator<RequestKind> for RequestKinds {
  fn from_iter<I: IntoIterator<Item = RequestKind>>(iter: I) -> Self {
    let mut kinds = RequestKinds::NONE;
    for kind in iter {
      kinds.insert(kind);
    }
    kinds
  }
}

impl BitOr for RequestKinds {
  type Output = RequestKinds;

  fn bitor(self, rhs: RequestKinds) -> Self::Output {
    self.union(rhs)
  }
}

impl BitOr<RequestKind> for RequestKinds {
  type Output = RequestKinds;

  fn bitor(self, rhs: RequestKind) -> Self::Output {
    self.union(RequestKinds::only(rhs))
  }
}

impl fmt::Display for RequestKinds {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return f.write_str("none");
    }
    let names: Vec<&str> = self.iter().map(|kind| kind.name()).collect();
    f.write_str(&names.join(","))
  }
}

impl FromStr for RequestKinds {
  type Err = UnknownRequestKind;

  /// 解析逗号分隔的请求列表，例如 `classification,rectangle`
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("none") {
      return Ok(RequestKinds::NONE);
    }
    s.split(',')
      .filter(|part| !part.trim().is_empty())
      .map(RequestKind::from_str)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn none_is_empty() {
    assert!(RequestKinds::NONE.is_empty());
    assert_eq!(RequestKinds::default(), RequestKinds::NONE);
    assert_eq!(RequestKinds::NONE.len(), 0);
  }

  #[test]
  fn union_combines_named_kinds() {
    let kinds = RequestKinds::CLASSIFICATION | RequestKinds::RECTANGLE_DETECTION;
    assert!(kinds.contains(RequestKind::Classification));
    assert!(kinds.contains(RequestKind::RectangleDetection));
    assert!(!kinds.contains(RequestKind::BarcodeScanning));
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains_all(RequestKinds::CLASSIFICATION));
    assert!(!RequestKinds::CLASSIFICATION.contains_all(kinds));
  }

  #[test]
  fn remove_is_idempotent() {
    let mut kinds = RequestKinds::BARCODE_SCANNING | RequestKind::Classification;
    kinds.remove(RequestKind::BarcodeScanning);
    kinds.remove(RequestKind::BarcodeScanning);
    assert_eq!(kinds, RequestKinds::CLASSIFICATION);
    kinds.remove(RequestKind::Classification);
    assert!(kinds.is_empty());
  }

  #[test]
  fn parse_and_display() {
    let kinds: RequestKinds = "barcode, classification".parse().unwrap();
    assert_eq!(
      kinds,
      RequestKinds::CLASSIFICATION | RequestKinds::BARCODE_SCANNING
    );
    assert_eq!(kinds.to_string(), "classification,barcode");
    assert_eq!("none".parse::<RequestKinds>().unwrap(), RequestKinds::NONE);
    assert_eq!(RequestKinds::NONE.to_string(), "none");
    assert!("face".parse::<RequestKinds>().is_err());
  }

  #[test]
  fn iter_follows_declaration_order() {
    let kinds = RequestKinds::BARCODE_SCANNING | RequestKinds::CLASSIFICATION;
    let collected: Vec<_> = kinds.iter().collect();
    assert_eq!(
      collected,
      vec![RequestKind::Classification, RequestKind::BarcodeScanning]
    );
  }
}
