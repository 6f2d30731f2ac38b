// 该文件是 Kanjian （看见） 项目的一部分。
// src/engine.rs - 视觉引擎接口
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

use std::sync::mpsc::{self, Receiver, Sender};

use tracing::debug;

use crate::{
  frame::{ImageHandle, ImageKind},
  observation::{Barcode, Classification, NativePoint},
  request::{RequestKind, RequestKinds},
};

/// 引擎完成某类请求后发回的消息，`message` 为空表示成功
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
  pub kind: RequestKind,
  pub message: String,
}

/// 完成回调的发送端，可在任意线程使用
///
/// 回调只负责投递消息，外观层在所属线程上取出消息后才会修改状态。
#[derive(Debug, Clone)]
pub struct CompletionSender {
  tx: Sender<Completion>,
}

impl CompletionSender {
  /// 接收端已经释放时返回 `false`
  pub fn complete(&self, kind: RequestKind, message: impl Into<String>) -> bool {
    let completion = Completion {
      kind,
      message: message.into(),
    };
    match self.tx.send(completion) {
      Ok(()) => true,
      Err(e) => {
        debug!("完成回调接收端已关闭，丢弃消息: {:?}", e.0);
        false
      }
    }
  }
}

pub(crate) fn completion_channel() -> (CompletionSender, Receiver<Completion>) {
  let (tx, rx) = mpsc::channel();
  (CompletionSender { tx }, rx)
}

/// 完成消息的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus<'a> {
  Success,
  Error(&'a str),
  Warning(&'a str),
}

impl<'a> CompletionStatus<'a> {
  /// 引擎没有提供结构化错误码，只能在消息文本中查找 "error"（不区分大小写）
  pub fn classify(message: &'a str) -> Self {
    if message.is_empty() {
      CompletionStatus::Success
    } else if message.to_lowercase().contains("error") {
      CompletionStatus::Error(message)
    } else {
      CompletionStatus::Warning(message)
    }
  }
}

/// 外观层预先分配的结果缓冲区，容量即切片长度
#[derive(Debug)]
pub enum DrainBuffer<'a> {
  Classifications(&'a mut [Classification]),
  /// 每个矩形占连续四个点
  Points(&'a mut [NativePoint]),
  Barcodes(&'a mut [Barcode]),
}

impl DrainBuffer<'_> {
  pub fn kind(&self) -> RequestKind {
    match self {
      DrainBuffer::Classifications(_) => RequestKind::Classification,
      DrainBuffer::Points(_) => RequestKind::RectangleDetection,
      DrainBuffer::Barcodes(_) => RequestKind::BarcodeScanning,
    }
  }

  pub fn capacity(&self) -> usize {
    match self {
      DrainBuffer::Classifications(buffer) => buffer.len(),
      DrainBuffer::Points(buffer) => buffer.len(),
      DrainBuffer::Barcodes(buffer) => buffer.len(),
    }
  }
}

/// 把 `source` 的前若干项拷入 `target`，返回拷贝数量
pub fn fill_buffer<T: Clone>(source: &[T], target: &mut [T]) -> usize {
  let count = source.len().min(target.len());
  target[..count].clone_from_slice(&source[..count]);
  count
}

/// 视觉引擎
///
/// 引擎异步处理提交的图像，每个启用的请求类型完成后通过
/// [`CompletionSender`] 投递一条 [`Completion`]。
pub trait VisionEngine {
  /// 设置完成回调的目标
  fn set_completion_sender(&mut self, sender: CompletionSender);

  /// 重建内部请求对象，开销较大，不应逐帧调用
  fn allocate(&mut self, kinds: RequestKinds, max_observations: usize);

  /// 提交一帧图像，返回引擎是否接受
  fn submit(&mut self, handle: ImageHandle, kind: ImageKind) -> bool;

  /// 把 `buffer.kind()` 对应的结果拷入缓冲区，返回实际拷贝数量
  fn drain(&mut self, buffer: DrainBuffer<'_>) -> usize;
}

impl<E: VisionEngine + ?Sized> VisionEngine for Box<E> {
  fn set_completion_sender(&mut self, sender: CompletionSender) {
    (**self).set_completion_sender(sender)
  }

  fn allocate(&mut self, kinds: RequestKinds, max_observations: usize) {
    (**self).allocate(kinds, max_observations)
  }

  fn submit(&mut self, handle: ImageHandle, kind: ImageKind) -> bool {
    (**self).submit(handle, kind)
  }

  fn drain(&mut self, buffer: DrainBuffer<'_>) -> usize {
    (**self).drain(buffer)
  }
}

mod simulated;
pub use self::simulated::{
  Scene, SceneErrors, SceneRectangle, SimulatedEngine, SimulatedEngineBuilder,
  SimulatedEngineError,
};
