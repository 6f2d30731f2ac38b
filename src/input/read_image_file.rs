// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;
use std::sync::Arc;

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{PixelBuffer, PixelBufferError},
  input::parse_repeat,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("像素缓冲区错误: {0}")]
  PixelBufferError(#[from] PixelBufferError),
  #[error("无效的查询参数 {key}={value}")]
  InvalidQuery { key: String, value: String },
}

/// 把图像文件解码为 ARGB32 像素缓冲区
///
/// 同一个缓冲区会重复产出 `repeat` 次，`repeat=0` 表示无限重复。
#[derive(Debug)]
pub struct ImageFileInput {
  buffer: Arc<PixelBuffer>,
  repeat: Option<usize>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}'，实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    let repeat =
      parse_repeat(url).map_err(|(key, value)| ImageFileInputError::InvalidQuery { key, value })?;
    let input = ImageFileInput::open(url.path())?;
    Ok(input.with_repeat(repeat))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let image = ImageReader::open(path.as_ref())?.decode()?.to_rgba8();
    let (width, height) = image.dimensions();
    let buffer = PixelBuffer::from_rgba(image.into_raw(), width, height, true)?;
    info!(
      "已加载图像 {} ({}x{})",
      path.as_ref().display(),
      width,
      height
    );

    Ok(ImageFileInput {
      buffer: Arc::new(buffer),
      repeat: Some(1),
    })
  }

  pub fn with_repeat(mut self, repeat: Option<usize>) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn buffer(&self) -> &Arc<PixelBuffer> {
    &self.buffer
  }
}

impl IntoIterator for ImageFileInput {
  type Item = Arc<PixelBuffer>;
  type IntoIter = ImageFileInputIter;

  fn into_iter(self) -> Self::IntoIter {
    ImageFileInputIter {
      buffer: self.buffer,
      remaining: self.repeat,
    }
  }
}

pub struct ImageFileInputIter {
  buffer: Arc<PixelBuffer>,
  remaining: Option<usize>,
}

impl Iterator for ImageFileInputIter {
  type Item = Arc<PixelBuffer>;

  fn next(&mut self) -> Option<Self::Item> {
    match self.remaining.as_mut() {
      None => {}
      Some(0) => return None,
      Some(n) => *n -= 1,
    }
    Some(Arc::clone(&self.buffer))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::{ImageKind, PixelFormat, VisionFrame};
  use image::{Rgba, RgbaImage};

  #[test]
  fn png_is_loaded_as_argb() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbaImage::from_pixel(2, 3, Rgba([10, 20, 30, 255]))
      .save(&path)
      .unwrap();

    let url = Url::parse(&format!("image://{}?repeat=2", path.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();

    let buffer = input.buffer();
    assert_eq!(buffer.width(), 2);
    assert_eq!(buffer.height(), 3);
    assert_eq!(buffer.format(), PixelFormat::Argb32);
    assert_eq!(&buffer.as_bytes()[..4], &[255, 10, 20, 30]);

    let frames: Vec<_> = input.into_iter().collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].image_handle(), frames[1].image_handle());
    assert_eq!(frames[0].image_kind(), ImageKind::PixelBufferHandle);
  }

  #[test]
  fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.png");
    assert!(matches!(
      ImageFileInput::open(&path),
      Err(ImageFileInputError::IoError(_))
    ));
  }

  #[test]
  fn scheme_is_checked() {
    let url = Url::parse("file:///tmp/frame.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemeMismatch)
    ));
  }
}
