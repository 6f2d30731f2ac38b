// 该文件是 Kanjian （看见） 项目的一部分。
// src/vision.rs - 视觉请求外观层
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

//! # 视觉请求外观层
//!
//! [`Vision`] 位于调用方与 [`VisionEngine`] 之间：
//! - 记录需要执行的请求以及正在执行的请求
//! - 同一时刻最多只有一批请求在执行，忙碌时拒绝新的提交
//! - 在所属线程上取出引擎的完成消息，把引擎结果拷入预分配的缓冲区
//! - 对矩形坐标做方向对齐，然后把结果批次分发给监听者
//!
//! 外观层的所有状态只能在所属线程上访问。引擎在其他线程完成请求后，
//! 通过通道把完成消息交回，由 [`Vision::process_completions`] 或
//! [`Vision::wait_idle`] 处理。
//!
//! 请求执行期间重新调用 [`Vision::configure`] 的行为未定义，调用方应当
//! 在 [`Vision::in_progress`] 为假时再重新配置。

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::{
  engine::{Completion, CompletionStatus, DrainBuffer, VisionEngine, completion_channel},
  frame::{ImageHandle, ImageKind, VisionFrame},
  listener::{ListenerId, Listeners},
  observation::{
    Barcode, Classification, NativePoint, POINTS_PER_RECTANGLE, Point, ResultBatch,
  },
  orientation::{Orientation, normalize},
  request::{RequestKind, RequestKinds},
};

pub const DEFAULT_MAX_OBSERVATIONS: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
  #[error("未指定视觉请求")]
  Unspecified,
  #[error("仍有视觉请求正在执行: {0}")]
  InProgress(RequestKinds),
  #[error("图像缓冲区指针为空")]
  NullBuffer,
  #[error("无法执行视觉请求，{kind} 句柄类型不符或已不可访问")]
  EngineRejected { kind: ImageKind },
}

/// 单次完成回调的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
  /// 结果已分发
  Emitted { observations: usize, listeners: usize },
  /// 结果数量不足，未分发
  Empty,
  /// 没有监听者，未读取结果
  NoListeners,
  /// 该请求并不在执行中
  Stale,
  EngineError(String),
  EngineWarning(String),
}

pub struct Vision<E: VisionEngine> {
  engine: E,
  completions: Receiver<Completion>,
  requests_to_perform: RequestKinds,
  requests_in_progress: RequestKinds,
  max_observations: usize,
  classification_buffer: Vec<Classification>,
  point_buffer: Vec<NativePoint>,
  barcode_buffer: Vec<Barcode>,
  orientation: Orientation,
  listeners: Listeners,
}

impl<E: VisionEngine> Vision<E> {
  pub fn new(mut engine: E) -> Self {
    let (sender, completions) = completion_channel();
    engine.set_completion_sender(sender);

    Vision {
      engine,
      completions,
      requests_to_perform: RequestKinds::NONE,
      requests_in_progress: RequestKinds::NONE,
      max_observations: DEFAULT_MAX_OBSERVATIONS,
      classification_buffer: vec![Classification::default(); DEFAULT_MAX_OBSERVATIONS],
      point_buffer: vec![NativePoint::default(); DEFAULT_MAX_OBSERVATIONS * POINTS_PER_RECTANGLE],
      barcode_buffer: vec![Barcode::default(); DEFAULT_MAX_OBSERVATIONS],
      orientation: Orientation::default(),
      listeners: Listeners::default(),
    }
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  pub fn engine_mut(&mut self) -> &mut E {
    &mut self.engine
  }

  /// 设置需要执行的请求并重新分配结果缓冲区
  ///
  /// 会让引擎重建内部请求对象，开销较大，不要逐帧调用。
  pub fn configure(&mut self, kinds: RequestKinds, max_observations: usize) {
    if self.in_progress() {
      warn!(
        "在请求 [{}] 执行期间重新配置视觉请求",
        self.requests_in_progress
      );
      if !kinds.contains_all(self.requests_in_progress) {
        warn!(
          "新配置 [{}] 不包含执行中的请求，其完成消息仍会清除执行状态",
          kinds
        );
      }
    }

    let Some(point_count) = max_observations.checked_mul(POINTS_PER_RECTANGLE) else {
      error!(
        "最大观测数 {} 过大，保留原有配置 [{}]",
        max_observations, self.requests_to_perform
      );
      return;
    };

    self.requests_to_perform = kinds;
    self.engine.allocate(kinds, max_observations);

    self.barcode_buffer = vec![Barcode::default(); max_observations];
    self.point_buffer = vec![NativePoint::default(); point_count];
    self.classification_buffer = vec![Classification::default(); max_observations];
    self.max_observations = max_observations;

    info!(
      "视觉请求已配置: [{}]，最大观测数 {}",
      kinds, max_observations
    );
  }

  pub fn requests_to_perform(&self) -> RequestKinds {
    self.requests_to_perform
  }

  pub fn requests_in_progress(&self) -> RequestKinds {
    self.requests_in_progress
  }

  pub fn max_observations(&self) -> usize {
    self.max_observations
  }

  /// 是否有请求正在执行
  pub fn in_progress(&self) -> bool {
    !self.requests_in_progress.is_empty()
  }

  pub fn orientation(&self) -> Orientation {
    self.orientation
  }

  pub fn set_orientation(&mut self, orientation: Orientation) {
    self.orientation = orientation;
  }

  /// 提交一帧图像，立即返回，不等待引擎完成
  pub fn submit(&mut self, handle: ImageHandle, kind: ImageKind) -> Result<(), SubmitError> {
    self.check_preconditions(handle)?;
    self.dispatch(handle, kind)
  }

  pub fn submit_frame<F: VisionFrame + ?Sized>(&mut self, frame: &F) -> Result<(), SubmitError> {
    self.submit(frame.image_handle(), frame.image_kind())
  }

  /// 使用原生接口的类型编码提交
  ///
  /// 先按 [`Vision::submit`] 的顺序检查请求配置、忙碌状态和空指针，
  /// 全部通过后才解析类型编码。
  ///
  /// # Panics
  ///
  /// `kind_code` 不是受支持的图像类型时直接 panic，这属于调用方的编程错误。
  pub fn submit_raw(&mut self, handle: usize, kind_code: i32) -> Result<(), SubmitError> {
    let handle = ImageHandle::from_raw(handle);
    self.check_preconditions(handle)?;
    let Some(kind) = ImageKind::from_raw(kind_code) else {
      panic!("不支持的图像数据类型: {}", kind_code);
    };
    self.dispatch(handle, kind)
  }

  fn check_preconditions(&self, handle: ImageHandle) -> Result<(), SubmitError> {
    if self.requests_to_perform.is_empty() {
      error!("未指定视觉请求");
      return Err(SubmitError::Unspecified);
    }

    if self.in_progress() {
      error!("仍有视觉请求正在执行: [{}]", self.requests_in_progress);
      return Err(SubmitError::InProgress(self.requests_in_progress));
    }

    if handle.is_null() {
      error!("图像缓冲区指针为空");
      return Err(SubmitError::NullBuffer);
    }
    Ok(())
  }

  fn dispatch(&mut self, handle: ImageHandle, kind: ImageKind) -> Result<(), SubmitError> {
    if !self.engine.submit(handle, kind) {
      error!(
        "无法执行视觉请求，{} 句柄 {} 类型不符或已不可访问",
        kind, handle
      );
      return Err(SubmitError::EngineRejected { kind });
    }

    self.requests_in_progress = self.requests_to_perform;
    debug!(
      "已提交 {} 句柄 {}，执行请求 [{}]",
      kind, handle, self.requests_in_progress
    );
    Ok(())
  }

  /// 处理某类请求的完成消息
  pub fn complete(&mut self, kind: RequestKind, message: &str) -> CompletionOutcome {
    let was_in_progress = self.requests_in_progress.contains(kind);
    self.requests_in_progress.remove(kind);

    if !was_in_progress {
      debug!("忽略未在执行中的 {} 请求的完成消息", kind);
      return CompletionOutcome::Stale;
    }

    match CompletionStatus::classify(message) {
      CompletionStatus::Error(message) => {
        error!("{} 请求失败: {}", kind, message);
        return CompletionOutcome::EngineError(message.to_string());
      }
      CompletionStatus::Warning(message) => {
        warn!("{} 请求: {}", kind, message);
        return CompletionOutcome::EngineWarning(message.to_string());
      }
      CompletionStatus::Success => {}
    }

    if !self.listeners.has_listeners(kind) {
      trace!("{} 请求没有监听者，跳过结果读取", kind);
      return CompletionOutcome::NoListeners;
    }

    let Some(batch) = self.acquire_batch(kind) else {
      return CompletionOutcome::Empty;
    };

    let listeners = self.listeners.emit(&batch);
    debug!(
      "{} 请求完成: {} 个结果分发给 {} 个监听者",
      kind,
      batch.len(),
      listeners
    );
    CompletionOutcome::Emitted {
      observations: batch.len(),
      listeners,
    }
  }

  /// 从引擎读取结果并生成批次，数量不足时返回 `None`
  fn acquire_batch(&mut self, kind: RequestKind) -> Option<ResultBatch> {
    match kind {
      RequestKind::Classification => {
        let buffer = &mut self.classification_buffer;
        let capacity = buffer.len();
        let count = self
          .engine
          .drain(DrainBuffer::Classifications(buffer))
          .min(capacity);
        if count < 1 {
          return None;
        }
        Some(ResultBatch::classifications(&buffer[..count]))
      }
      RequestKind::RectangleDetection => {
        let buffer = &mut self.point_buffer;
        let capacity = buffer.len();
        let count = self.engine.drain(DrainBuffer::Points(buffer)).min(capacity);
        if count < POINTS_PER_RECTANGLE {
          return None;
        }

        let mut points: Vec<Point> = buffer[..count].iter().copied().map(Point::from).collect();
        if let Err(e) = normalize(&mut points, self.orientation) {
          warn!("{}，坐标按原样使用", e);
        }
        Some(ResultBatch::rectangles(&points))
      }
      RequestKind::BarcodeScanning => {
        let buffer = &mut self.barcode_buffer;
        let capacity = buffer.len();
        let count = self.engine.drain(DrainBuffer::Barcodes(buffer)).min(capacity);
        if count < 1 {
          return None;
        }
        Some(ResultBatch::barcodes(&buffer[..count]))
      }
    }
  }

  /// 处理所有已到达的完成消息，不阻塞，返回处理的消息数
  pub fn process_completions(&mut self) -> usize {
    let mut processed = 0;
    while let Ok(completion) = self.completions.try_recv() {
      self.complete(completion.kind, &completion.message);
      processed += 1;
    }
    processed
  }

  /// 阻塞直到所有请求完成或超时，返回是否已空闲
  ///
  /// 超时并不会取消正在执行的请求。
  pub fn wait_idle(&mut self, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    self.process_completions();

    while self.in_progress() {
      let remaining = deadline.saturating_duration_since(Instant::now());
      match self.completions.recv_timeout(remaining) {
        Ok(completion) => {
          self.complete(completion.kind, &completion.message);
        }
        Err(RecvTimeoutError::Timeout) => {
          warn!(
            "等待视觉请求 [{}] 完成超时",
            self.requests_in_progress
          );
          return false;
        }
        Err(RecvTimeoutError::Disconnected) => {
          error!("视觉引擎已断开完成回调");
          return false;
        }
      }
    }
    true
  }

  /// 订阅某类请求的结果事件
  pub fn subscribe<F>(&mut self, kind: RequestKind, listener: F) -> ListenerId
  where
    F: Fn(&ResultBatch) + Send + Sync + 'static,
  {
    self.listeners.add(kind, listener)
  }

  pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
    self.listeners.remove(id)
  }

  pub fn listener_count(&self, kind: RequestKind) -> usize {
    self.listeners.count(kind)
  }
}
