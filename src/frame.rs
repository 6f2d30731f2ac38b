// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 图像句柄与像素缓冲区定义
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

use thiserror::Error;
use tracing::debug;

/// 指向图像数据的不透明句柄，0 表示空句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ImageHandle(usize);

impl ImageHandle {
  pub const NULL: ImageHandle = ImageHandle(0);

  pub const fn from_raw(raw: usize) -> Self {
    ImageHandle(raw)
  }

  pub const fn as_raw(&self) -> usize {
    self.0
  }

  pub const fn is_null(&self) -> bool {
    self.0 == 0
  }
}

impl fmt::Display for ImageHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:#x}", self.0)
  }
}

/// 句柄所指图像数据的类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
  /// GPU 纹理句柄
  TextureHandle,
  /// 像素缓冲区句柄
  PixelBufferHandle,
}

impl ImageKind {
  /// 原生接口中的类型编码：0 为纹理，1 为像素缓冲区
  pub const fn from_raw(code: i32) -> Option<ImageKind> {
    match code {
      0 => Some(ImageKind::TextureHandle),
      1 => Some(ImageKind::PixelBufferHandle),
      _ => None,
    }
  }

  pub const fn as_raw(&self) -> i32 {
    match self {
      ImageKind::TextureHandle => 0,
      ImageKind::PixelBufferHandle => 1,
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      ImageKind::TextureHandle => "texture",
      ImageKind::PixelBufferHandle => "pixel_buffer",
    }
  }
}

impl fmt::Display for ImageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// 可以提交给视觉外观层的帧
pub trait VisionFrame {
  fn image_handle(&self) -> ImageHandle;
  fn image_kind(&self) -> ImageKind;
}

/// 由宿主直接提供的句柄，例如渲染引擎导出的纹理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
  pub handle: ImageHandle,
  pub kind: ImageKind,
}

impl VisionFrame for RawFrame {
  fn image_handle(&self) -> ImageHandle {
    self.handle
  }

  fn image_kind(&self) -> ImageKind {
    self.kind
  }
}

impl<F: VisionFrame + ?Sized> VisionFrame for &F {
  fn image_handle(&self) -> ImageHandle {
    (**self).image_handle()
  }

  fn image_kind(&self) -> ImageKind {
    (**self).image_kind()
  }
}

impl<F: VisionFrame + ?Sized> VisionFrame for std::sync::Arc<F> {
  fn image_handle(&self) -> ImageHandle {
    (**self).image_handle()
  }

  fn image_kind(&self) -> ImageKind {
    (**self).image_kind()
  }
}

/// 单个像素的内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
  /// A, R, G, B 各 8 位
  Argb32,
  /// R, G, B 各 8 位
  Rgb24,
}

impl PixelFormat {
  pub const fn from_raw(code: i32) -> Option<PixelFormat> {
    match code {
      0 => Some(PixelFormat::Argb32),
      1 => Some(PixelFormat::Rgb24),
      _ => None,
    }
  }

  pub const fn bytes_per_pixel(&self) -> usize {
    match self {
      PixelFormat::Argb32 => 4,
      PixelFormat::Rgb24 => 3,
    }
  }
}

/// 像素缓冲区操作错误，`code()` 与 CoreVideo 的返回码一致
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PixelBufferError {
  #[error("无效参数: {0}")]
  InvalidArgument(String),
  #[error("像素缓冲区分配失败")]
  AllocationFailed,
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  InvalidSize { expected: usize, actual: usize },
  #[error("不支持的像素格式: {0}")]
  InvalidPixelFormat(i32),
}

impl PixelBufferError {
  pub fn code(&self) -> i32 {
    match self {
      PixelBufferError::InvalidArgument(_) => -6661,
      PixelBufferError::AllocationFailed => -6662,
      PixelBufferError::InvalidSize { .. } => -6681,
      PixelBufferError::InvalidPixelFormat(_) => -6680,
    }
  }
}

/// 持有像素内存的缓冲区
///
/// 句柄在缓冲区存活期间有效，缓冲区离开作用域时释放内存。
pub struct PixelBuffer {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  format: PixelFormat,
}

impl fmt::Debug for PixelBuffer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PixelBuffer")
      .field("width", &self.width)
      .field("height", &self.height)
      .field("format", &self.format)
      .field("handle", &self.handle())
      .finish()
  }
}

impl PixelBuffer {
  pub fn create(
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
  ) -> Result<Self, PixelBufferError> {
    if width == 0 || height == 0 {
      return Err(PixelBufferError::InvalidArgument(format!(
        "图像尺寸必须为正: {}x{}",
        width, height
      )));
    }

    let expected = (width as usize)
      .checked_mul(height as usize)
      .and_then(|n| n.checked_mul(format.bytes_per_pixel()))
      .ok_or(PixelBufferError::AllocationFailed)?;

    if data.len() != expected {
      return Err(PixelBufferError::InvalidSize {
        expected,
        actual: data.len(),
      });
    }

    debug!("创建像素缓冲区: {}x{} {:?}", width, height, format);
    Ok(PixelBuffer {
      data: data.into_boxed_slice(),
      width,
      height,
      format,
    })
  }

  /// 从原始格式编码创建，编码含义见 [`PixelFormat::from_raw`]
  pub fn create_raw(
    data: Vec<u8>,
    width: u32,
    height: u32,
    format_code: i32,
  ) -> Result<Self, PixelBufferError> {
    let format =
      PixelFormat::from_raw(format_code).ok_or(PixelBufferError::InvalidPixelFormat(format_code))?;
    Self::create(data, width, height, format)
  }

  /// 从 RGBA 数据创建 ARGB32 缓冲区，`align_pixel_format` 为真时重排通道
  pub fn from_rgba(
    mut rgba: Vec<u8>,
    width: u32,
    height: u32,
    align_pixel_format: bool,
  ) -> Result<Self, PixelBufferError> {
    if align_pixel_format {
      shift_rgba_to_argb(&mut rgba);
    }
    Self::create(rgba, width, height, PixelFormat::Argb32)
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn handle(&self) -> ImageHandle {
    ImageHandle::from_raw(self.data.as_ptr() as usize)
  }
}

impl VisionFrame for PixelBuffer {
  fn image_handle(&self) -> ImageHandle {
    self.handle()
  }

  fn image_kind(&self) -> ImageKind {
    ImageKind::PixelBufferHandle
  }
}

impl Drop for PixelBuffer {
  fn drop(&mut self) {
    debug!(
      "释放像素缓冲区: {} ({}x{})",
      self.handle(),
      self.width,
      self.height
    );
  }
}

/// RGBA -> ARGB
pub fn shift_rgba_to_argb(buffer: &mut [u8]) {
  for pixel in buffer.chunks_exact_mut(4) {
    pixel.rotate_right(1);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn create_checks_length() {
    let err = PixelBuffer::create(vec![0u8; 10], 2, 2, PixelFormat::Argb32).unwrap_err();
    assert_eq!(
      err,
      PixelBufferError::InvalidSize {
        expected: 16,
        actual: 10
      }
    );
    assert_eq!(err.code(), -6681);

    let buffer = PixelBuffer::create(vec![0u8; 12], 2, 2, PixelFormat::Rgb24).unwrap();
    assert_eq!(buffer.as_bytes().len(), 12);
    assert!(!buffer.handle().is_null());
    assert_eq!(buffer.image_kind(), ImageKind::PixelBufferHandle);
  }

  #[test]
  fn create_rejects_empty_dimensions() {
    let err = PixelBuffer::create(Vec::new(), 0, 4, PixelFormat::Rgb24).unwrap_err();
    assert_eq!(err.code(), -6661);
  }

  #[test]
  fn create_raw_rejects_unknown_format() {
    let err = PixelBuffer::create_raw(vec![0u8; 4], 1, 1, 7).unwrap_err();
    assert_eq!(err, PixelBufferError::InvalidPixelFormat(7));
    assert_eq!(err.code(), -6680);
  }

  #[test]
  fn rgba_is_shifted_to_argb() {
    let rgba = vec![1, 2, 3, 4, 5, 6, 7, 8];
    let buffer = PixelBuffer::from_rgba(rgba.clone(), 2, 1, true).unwrap();
    assert_eq!(buffer.as_bytes(), &[4, 1, 2, 3, 8, 5, 6, 7]);

    let untouched = PixelBuffer::from_rgba(rgba.clone(), 2, 1, false).unwrap();
    assert_eq!(untouched.as_bytes(), rgba.as_slice());
  }

  #[test]
  fn image_kind_raw_codes() {
    assert_eq!(ImageKind::from_raw(0), Some(ImageKind::TextureHandle));
    assert_eq!(ImageKind::from_raw(1), Some(ImageKind::PixelBufferHandle));
    assert_eq!(ImageKind::from_raw(2), None);
    assert_eq!(ImageKind::PixelBufferHandle.as_raw(), 1);
  }

  #[test]
  fn null_handle() {
    assert!(ImageHandle::NULL.is_null());
    assert!(!ImageHandle::from_raw(0x1000).is_null());
  }
}
