// 该文件是 Kanjian （看见） 项目的一部分。
// src/orientation.rs - 归一化坐标方向对齐
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
use std::str::FromStr;

use thiserror::Error;

use crate::observation::Point;

/// 屏幕方向，参考方向为 `LandscapeLeft`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
  #[default]
  LandscapeLeft,
  LandscapeRight,
  Portrait,
  PortraitUpsideDown,
}

impl Orientation {
  pub fn name(&self) -> &'static str {
    match self {
      Orientation::LandscapeLeft => "landscape-left",
      Orientation::LandscapeRight => "landscape-right",
      Orientation::Portrait => "portrait",
      Orientation::PortraitUpsideDown => "portrait-upside-down",
    }
  }
}

impl fmt::Display for Orientation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrientationError {
  #[error("当前屏幕方向 {0} 尚未实现归一化坐标对齐")]
  Unsupported(Orientation),
  #[error("未知的屏幕方向: {0}")]
  Unknown(String),
}

impl FromStr for Orientation {
  type Err = OrientationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
      "landscape-left" | "landscape" => Ok(Orientation::LandscapeLeft),
      "landscape-right" => Ok(Orientation::LandscapeRight),
      "portrait" => Ok(Orientation::Portrait),
      "portrait-upside-down" => Ok(Orientation::PortraitUpsideDown),
      other => Err(OrientationError::Unknown(other.to_string())),
    }
  }
}

/// 将参考方向下的归一化坐标原地转换到 `orientation` 方向
///
/// 不支持的方向返回错误且不修改坐标，由调用方决定是否原样使用。
pub fn normalize(points: &mut [Point], orientation: Orientation) -> Result<(), OrientationError> {
  match orientation {
    Orientation::LandscapeLeft => Ok(()),
    Orientation::LandscapeRight => {
      for point in points.iter_mut() {
        *point = Point::ONE - *point;
      }
      Ok(())
    }
    other => Err(OrientationError::Unsupported(other)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Vec<Point> {
    vec![
      Point::new(0.0, 0.0),
      Point::new(0.25, 0.75),
      Point::new(0.5, 0.125),
      Point::new(1.0, 1.0),
    ]
  }

  #[test]
  fn reference_orientation_is_identity() {
    let mut points = sample();
    normalize(&mut points, Orientation::LandscapeLeft).unwrap();
    assert_eq!(points, sample());
  }

  #[test]
  fn landscape_right_mirrors_both_axes() {
    let mut points = sample();
    normalize(&mut points, Orientation::LandscapeRight).unwrap();
    assert_eq!(points[0], Point::new(1.0, 1.0));
    assert_eq!(points[1], Point::new(0.75, 0.25));
    assert_eq!(points[3], Point::new(0.0, 0.0));
  }

  #[test]
  fn landscape_right_twice_round_trips() {
    let mut points = sample();
    normalize(&mut points, Orientation::LandscapeRight).unwrap();
    normalize(&mut points, Orientation::LandscapeRight).unwrap();
    assert_eq!(points, sample());
  }

  #[test]
  fn portrait_is_rejected_untouched() {
    let mut points = sample();
    let err = normalize(&mut points, Orientation::Portrait).unwrap_err();
    assert_eq!(err, OrientationError::Unsupported(Orientation::Portrait));
    assert_eq!(points, sample());
    assert!(normalize(&mut points, Orientation::PortraitUpsideDown).is_err());
  }

  #[test]
  fn parse_orientation() {
    assert_eq!(
      "landscape_right".parse::<Orientation>().unwrap(),
      Orientation::LandscapeRight
    );
    assert_eq!(Orientation::default(), Orientation::LandscapeLeft);
    assert!("sideways".parse::<Orientation>().is_err());
  }
}
