// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 图像帧输入
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

use std::sync::Arc;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ImageHandle, ImageKind, PixelBuffer, RawFrame, VisionFrame},
};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

/// 解析 `repeat` 参数，缺省为 1，0 表示无限重复
pub(crate) fn parse_repeat(url: &Url) -> Result<Option<usize>, (String, String)> {
  for (k, v) in url.query_pairs() {
    if k == "repeat" {
      return match v.parse::<usize>() {
        Ok(0) => Ok(None),
        Ok(n) => Ok(Some(n)),
        Err(_) => Err((k.into_owned(), v.into_owned())),
      };
    }
  }
  Ok(Some(1))
}

#[derive(Error, Debug)]
pub enum RawHandleInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的句柄: {0}")]
  InvalidHandle(String),
  #[error("无效的查询参数 {key}={value}")]
  InvalidQuery { key: String, value: String },
}

/// 宿主提供的原始句柄
///
/// `handle:0x7f00a000?kind=texture&repeat=10`，`kind` 缺省为 `pixel_buffer`。
#[derive(Debug, Clone)]
pub struct RawHandleInput {
  frame: RawFrame,
  repeat: Option<usize>,
}

impl FromUrlWithScheme for RawHandleInput {
  const SCHEME: &'static str = "handle";
}

impl FromUrl for RawHandleInput {
  type Error = RawHandleInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}'，实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(RawHandleInputError::SchemeMismatch);
    }

    let text = url.path().trim_start_matches('/');
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
      Some(hex) => usize::from_str_radix(hex, 16),
      None => text.parse::<usize>(),
    };
    let handle = parsed.map_err(|_| RawHandleInputError::InvalidHandle(text.to_string()))?;

    let mut kind = ImageKind::PixelBufferHandle;
    for (k, v) in url.query_pairs() {
      if k == "kind" {
        kind = match v.as_ref() {
          "texture" => ImageKind::TextureHandle,
          "pixel_buffer" => ImageKind::PixelBufferHandle,
          _ => {
            return Err(RawHandleInputError::InvalidQuery {
              key: k.into_owned(),
              value: v.into_owned(),
            });
          }
        };
      }
    }

    let repeat = parse_repeat(url)
      .map_err(|(key, value)| RawHandleInputError::InvalidQuery { key, value })?;

    Ok(RawHandleInput {
      frame: RawFrame {
        handle: ImageHandle::from_raw(handle),
        kind,
      },
      repeat,
    })
  }
}

impl RawHandleInput {
  pub fn new(frame: RawFrame) -> Self {
    RawHandleInput {
      frame,
      repeat: Some(1),
    }
  }

  pub fn with_repeat(mut self, repeat: Option<usize>) -> Self {
    self.repeat = repeat;
    self
  }
}

impl IntoIterator for RawHandleInput {
  type Item = RawFrame;
  type IntoIter = RawHandleInputIter;

  fn into_iter(self) -> Self::IntoIter {
    RawHandleInputIter {
      frame: self.frame,
      remaining: self.repeat,
    }
  }
}

pub struct RawHandleInputIter {
  frame: RawFrame,
  remaining: Option<usize>,
}

impl Iterator for RawHandleInputIter {
  type Item = RawFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self.remaining.as_mut() {
      None => Some(self.frame),
      Some(0) => None,
      Some(n) => {
        *n -= 1;
        Some(self.frame)
      }
    }
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("原始句柄输入错误: {0}")]
  RawHandleInputError(#[from] RawHandleInputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  RawHandle(RawHandleInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    if url.scheme() == RawHandleInput::SCHEME {
      let input = RawHandleInput::from_url(url)?;
      return Ok(InputWrapper::RawHandle(input));
    }
    Err(InputError::SchemeMismatch)
  }
}

/// 输入产生的帧
#[derive(Debug, Clone)]
pub enum InputFrame {
  Buffer(Arc<PixelBuffer>),
  Raw(RawFrame),
}

impl VisionFrame for InputFrame {
  fn image_handle(&self) -> ImageHandle {
    match self {
      InputFrame::Buffer(buffer) => buffer.image_handle(),
      InputFrame::Raw(frame) => frame.image_handle(),
    }
  }

  fn image_kind(&self) -> ImageKind {
    match self {
      InputFrame::Buffer(buffer) => buffer.image_kind(),
      InputFrame::Raw(frame) => frame.image_kind(),
    }
  }
}

impl IntoIterator for InputWrapper {
  type Item = InputFrame;
  type IntoIter = InputWrapperIter;

  fn into_iter(self) -> Self::IntoIter {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => InputWrapperIter::ReadImageFile(input.into_iter()),
      InputWrapper::RawHandle(input) => InputWrapperIter::RawHandle(input.into_iter()),
    }
  }
}

pub enum InputWrapperIter {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(self::read_image_file::ImageFileInputIter),
  RawHandle(RawHandleInputIter),
}

impl Iterator for InputWrapperIter {
  type Item = InputFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapperIter::ReadImageFile(input) => input.next().map(InputFrame::Buffer),
      InputWrapperIter::RawHandle(input) => input.next().map(InputFrame::Raw),
    }
  }
}
