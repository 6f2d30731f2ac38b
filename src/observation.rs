// 该文件是 Kanjian （看见） 项目的一部分。
// src/observation.rs - 观测结果定义
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

use crate::request::RequestKind;

/// 每个矩形在点缓冲区中占用的点数
pub const POINTS_PER_RECTANGLE: usize = 4;

/// 归一化坐标点，取值范围 [0, 1] x [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub const ONE: Point = Point { x: 1.0, y: 1.0 };

  pub const fn new(x: f32, y: f32) -> Self {
    Point { x, y }
  }
}

impl std::ops::Sub for Point {
  type Output = Point;

  fn sub(self, rhs: Point) -> Self::Output {
    Point::new(self.x - rhs.x, self.y - rhs.y)
  }
}

/// 引擎侧的点布局（双精度）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NativePoint {
  pub x: f64,
  pub y: f64,
}

impl NativePoint {
  pub const fn new(x: f64, y: f64) -> Self {
    NativePoint { x, y }
  }
}

impl From<NativePoint> for Point {
  fn from(point: NativePoint) -> Self {
    Point::new(point.x as f32, point.y as f32)
  }
}

impl From<[f64; 2]> for NativePoint {
  fn from([x, y]: [f64; 2]) -> Self {
    NativePoint::new(x, y)
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Classification {
  pub label: String,
  pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Barcode {
  pub symbology: String,
  pub payload: String,
}

/// 矩形检测结果，面积在构造时计算并缓存
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rectangle {
  top_left: Point,
  top_right: Point,
  bottom_right: Point,
  bottom_left: Point,
  area: f32,
}

impl Rectangle {
  pub fn new(top_left: Point, top_right: Point, bottom_right: Point, bottom_left: Point) -> Self {
    // 面积按 左上 -> 左下 -> 右下 -> 右上 的顺序计算
    let area = shoelace_area(&[top_left, bottom_left, bottom_right, top_right]);
    Rectangle {
      top_left,
      top_right,
      bottom_right,
      bottom_left,
      area,
    }
  }

  /// 由缓冲区中连续的四个点构造，顺序为 左上、右上、右下、左下
  pub fn from_corners(corners: &[Point; POINTS_PER_RECTANGLE]) -> Self {
    Rectangle::new(corners[0], corners[1], corners[2], corners[3])
  }

  pub fn top_left(&self) -> Point {
    self.top_left
  }

  pub fn top_right(&self) -> Point {
    self.top_right
  }

  pub fn bottom_right(&self) -> Point {
    self.bottom_right
  }

  pub fn bottom_left(&self) -> Point {
    self.bottom_left
  }

  /// 有符号面积，符号表示环绕方向
  pub fn area(&self) -> f32 {
    self.area
  }

  pub fn corners(&self) -> [Point; POINTS_PER_RECTANGLE] {
    [
      self.top_left,
      self.top_right,
      self.bottom_right,
      self.bottom_left,
    ]
  }
}

/// 鞋带公式计算多边形的有符号面积
pub fn shoelace_area(vertices: &[Point]) -> f32 {
  if vertices.len() < 3 {
    return 0.0;
  }

  let mut area = 0.0f32;
  let mut previous = vertices[vertices.len() - 1];
  for &current in vertices {
    area += previous.x * current.y - current.x * previous.y;
    previous = current;
  }
  area * 0.5
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Observation {
  Classification(Classification),
  Rectangle(Rectangle),
  Barcode(Barcode),
}

impl Observation {
  pub fn kind(&self) -> RequestKind {
    match self {
      Observation::Classification(_) => RequestKind::Classification,
      Observation::Rectangle(_) => RequestKind::RectangleDetection,
      Observation::Barcode(_) => RequestKind::BarcodeScanning,
    }
  }
}

/// 一次请求完成后得到的同类观测结果
///
/// 结果是外观层缓冲区的拷贝，下一次完成回调不会影响已经发出的批次。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultBatch {
  kind: RequestKind,
  observations: Box<[Observation]>,
}

impl ResultBatch {
  pub fn classifications(items: &[Classification]) -> Self {
    ResultBatch {
      kind: RequestKind::Classification,
      observations: items
        .iter()
        .cloned()
        .map(Observation::Classification)
        .collect(),
    }
  }

  /// 每四个点组成一个矩形，末尾不足四个的点被忽略
  pub fn rectangles(points: &[Point]) -> Self {
    ResultBatch {
      kind: RequestKind::RectangleDetection,
      observations: points
        .chunks_exact(POINTS_PER_RECTANGLE)
        .filter_map(|chunk| <&[Point; POINTS_PER_RECTANGLE]>::try_from(chunk).ok())
        .map(|corners| Observation::Rectangle(Rectangle::from_corners(corners)))
        .collect(),
    }
  }

  pub fn barcodes(items: &[Barcode]) -> Self {
    ResultBatch {
      kind: RequestKind::BarcodeScanning,
      observations: items.iter().cloned().map(Observation::Barcode).collect(),
    }
  }

  pub fn kind(&self) -> RequestKind {
    self.kind
  }

  pub fn len(&self) -> usize {
    self.observations.len()
  }

  pub fn is_empty(&self) -> bool {
    self.observations.is_empty()
  }

  pub fn observations(&self) -> &[Observation] {
    &self.observations
  }

  pub fn iter_classifications(&self) -> impl Iterator<Item = &Classification> {
    self.observations.iter().filter_map(|o| match o {
      Observation::Classification(c) => Some(c),
      _ => None,
    })
  }

  pub fn iter_rectangles(&self) -> impl Iterator<Item = &Rectangle> {
    self.observations.iter().filter_map(|o| match o {
      Observation::Rectangle(r) => Some(r),
      _ => None,
    })
  }

  pub fn iter_barcodes(&self) -> impl Iterator<Item = &Barcode> {
    self.observations.iter().filter_map(|o| match o {
      Observation::Barcode(b) => Some(b),
      _ => None,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn unit_square() -> Rectangle {
    // 原点位于左下角
    Rectangle::new(
      Point::new(0.0, 1.0),
      Point::new(1.0, 1.0),
      Point::new(1.0, 0.0),
      Point::new(0.0, 0.0),
    )
  }

  #[test]
  fn unit_square_area_is_one() {
    let rect = unit_square();
    assert!((rect.area().abs() - 1.0).abs() < f32::EPSILON);
    // 左上 -> 左下 -> 右下 -> 右上 为逆时针
    assert!(rect.area() > 0.0);
  }

  #[test]
  fn reversed_winding_flips_sign() {
    let ccw = [
      Point::new(0.0, 0.0),
      Point::new(1.0, 0.0),
      Point::new(1.0, 1.0),
      Point::new(0.0, 1.0),
    ];
    let mut cw = ccw;
    cw.reverse();
    assert_eq!(shoelace_area(&ccw), 1.0);
    assert_eq!(shoelace_area(&cw), -1.0);
  }

  #[test]
  fn degenerate_polygon_has_no_area() {
    assert_eq!(shoelace_area(&[Point::new(0.5, 0.5)]), 0.0);
    assert_eq!(shoelace_area(&[]), 0.0);
  }

  #[test]
  fn rectangle_batch_groups_points_in_fours() {
    let square = unit_square().corners();
    let mut points = Vec::new();
    points.extend_from_slice(&square);
    points.extend_from_slice(&square);
    // 不完整的尾部
    points.push(Point::new(0.3, 0.3));

    let batch = ResultBatch::rectangles(&points);
    assert_eq!(batch.kind(), RequestKind::RectangleDetection);
    assert_eq!(batch.len(), 2);
    for rect in batch.iter_rectangles() {
      assert_eq!(rect.corners(), square);
      assert_eq!(rect.area(), 1.0);
    }
  }

  #[test]
  fn native_point_narrows_to_f32() {
    let point: Point = NativePoint::new(0.25, 0.75).into();
    assert_eq!(point, Point::new(0.25, 0.75));
  }

  #[test]
  fn batches_are_homogeneous() {
    let batch = ResultBatch::barcodes(&[Barcode {
      symbology: "VNBarcodeSymbologyQR".to_string(),
      payload: "hello".to_string(),
    }]);
    assert_eq!(batch.kind(), RequestKind::BarcodeScanning);
    assert_eq!(batch.iter_barcodes().count(), 1);
    assert_eq!(batch.iter_classifications().count(), 0);
    assert!(batch.observations().iter().all(|o| o.kind() == batch.kind()));
  }
}
