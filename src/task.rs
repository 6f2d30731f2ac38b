// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 帧处理任务
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

use std::fmt::Display;
use std::sync::Arc;
use std::{thread, time::Duration, time::Instant};

use tracing::{error, info, warn};

use crate::{
  engine::VisionEngine,
  frame::VisionFrame,
  output::{Render, attach_output},
  vision::{SubmitError, Vision},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// 请求未完成时引擎可能仍在读取帧数据，只能放弃释放
fn keep_alive<F>(frame: F) {
  warn!("视觉请求未完成，保留已提交的帧");
  std::mem::forget(frame);
}

pub trait Task<I, E: VisionEngine, O>: Sized {
  type Error;
  fn run_task(self, input: I, vision: &mut Vision<E>, output: Arc<O>) -> Result<(), Self::Error>;
}

/// 处理第一帧，等待所有请求完成
#[derive(Debug)]
pub struct OneShotTask {
  timeout: Duration,
}

impl Default for OneShotTask {
  fn default() -> Self {
    OneShotTask {
      timeout: DEFAULT_TIMEOUT,
    }
  }
}

impl OneShotTask {
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

impl<F, I, E, O> Task<I, E, O> for OneShotTask
where
  F: VisionFrame,
  I: IntoIterator<Item = F>,
  E: VisionEngine,
  O: Render + Send + Sync + 'static,
  O::Error: Display,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, vision: &mut Vision<E>, output: Arc<O>) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input
      .into_iter()
      .next()
      .ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;

    let kinds = vision.requests_to_perform();
    let listeners = attach_output(vision, kinds, output);

    let now = Instant::now();
    // 帧在请求完成前必须保持存活
    let result = match vision.submit_frame(&frame) {
      Ok(()) => {
        if vision.wait_idle(self.timeout) {
          info!("请求完成，耗时: {:.2?}", now.elapsed());
          Ok(())
        } else {
          keep_alive(frame);
          Err(anyhow::anyhow!(
            "等待视觉请求完成超时 ({:.2?})",
            self.timeout
          ))
        }
      }
      Err(e) => Err(e.into()),
    };

    for id in listeners {
      vision.unsubscribe(id);
    }
    result
  }
}

/// 逐帧提交，忙碌时跳过
///
/// 每个周期先处理完成消息，外观层空闲时才取下一帧提交。
#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  tick: Duration,
  timeout: Duration,
  ctrlc: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    ContinuousTask {
      frame_number: None,
      tick: Duration::from_millis(5),
      timeout: DEFAULT_TIMEOUT,
      ctrlc: true,
    }
  }
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_tick(mut self, tick: Duration) -> Self {
    self.tick = tick;
    self
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// 中断处理函数每个进程只能安装一次，测试或嵌入使用时应关闭
  pub fn with_ctrlc(mut self, ctrlc: bool) -> Self {
    self.ctrlc = ctrlc;
    self
  }
}

impl<F, I, E, O> Task<I, E, O> for ContinuousTask
where
  F: VisionFrame,
  I: IntoIterator<Item = F>,
  E: VisionEngine,
  O: Render + Send + Sync + 'static,
  O::Error: Display,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, vision: &mut Vision<E>, output: Arc<O>) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if self.ctrlc {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    } else {
      drop(tx);
    }

    let kinds = vision.requests_to_perform();
    let listeners = attach_output(vision, kinds, output);

    let mut input = input.into_iter();
    let mut in_flight: Option<F> = None;
    let mut frame_index = 0usize;
    let mut now = Instant::now();
    let mut failure = None;

    loop {
      vision.process_completions();

      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }

      if vision.in_progress() {
        thread::sleep(self.tick);
        continue;
      }

      // 上一帧的请求已全部完成，可以释放
      if in_flight.take().is_some() {
        info!("第 {} 帧处理完成，耗时: {:.2?}", frame_index, now.elapsed());
      }

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }

      let Some(frame) = input.next() else {
        info!("输入结束，退出任务循环");
        break;
      };

      frame_index = frame_index.wrapping_add(1);
      now = Instant::now();
      match vision.submit_frame(&frame) {
        Ok(()) => in_flight = Some(frame),
        // 未配置请求时后续的帧也无法提交
        Err(SubmitError::Unspecified) => {
          failure = Some(anyhow::anyhow!(
            "第 {} 帧提交失败: {}",
            frame_index,
            SubmitError::Unspecified
          ));
          break;
        }
        Err(e) => {
          error!("第 {} 帧提交失败: {}", frame_index, e);
          thread::sleep(self.tick);
        }
      }
    }

    if let Some(frame) = in_flight {
      if vision.wait_idle(self.timeout) {
        drop(frame);
      } else {
        warn!("仍有视觉请求未完成: [{}]", vision.requests_in_progress());
        keep_alive(frame);
      }
    }

    for id in listeners {
      vision.unsubscribe(id);
    }

    match failure {
      Some(e) => Err(e),
      None => {
        info!("任务完成，退出");
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    engine::{Scene, SimulatedEngine},
    frame::{ImageHandle, ImageKind, RawFrame},
    observation::ResultBatch,
    request::{RequestKind, RequestKinds},
  };
  use crate::frame::PixelBuffer;
  use std::convert::Infallible;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Collect {
    batches: Mutex<Vec<ResultBatch>>,
  }

  impl Render for Collect {
    type Error = Infallible;

    fn render_result(&self, batch: &ResultBatch) -> Result<(), Self::Error> {
      self.batches.lock().unwrap().push(batch.clone());
      Ok(())
    }
  }

  const FRAME: RawFrame = RawFrame {
    handle: ImageHandle::from_raw(0x2000),
    kind: ImageKind::PixelBufferHandle,
  };

  fn vision() -> Vision<SimulatedEngine> {
    let scene = Scene::from_json_str(
      r#"{
        "classifications": [{ "label": "cat", "confidence": 0.9 }],
        "barcodes": [{ "symbology": "QR", "payload": "kanjian" }]
      }"#,
    )
    .unwrap();
    let engine = SimulatedEngine::builder().scene(scene).build().unwrap();
    let mut vision = Vision::new(engine);
    vision.configure(
      RequestKinds::CLASSIFICATION | RequestKinds::BARCODE_SCANNING,
      4,
    );
    vision
  }

  #[test]
  fn one_shot_processes_first_frame() {
    let mut vision = vision();
    let output = Arc::new(Collect::default());

    OneShotTask::default()
      .run_task(vec![FRAME, FRAME], &mut vision, Arc::clone(&output))
      .unwrap();

    let batches = output.batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    assert!(!vision.in_progress());
    assert_eq!(vision.listener_count(RequestKind::Classification), 0);
    assert_eq!(vision.listener_count(RequestKind::BarcodeScanning), 0);
  }

  #[test]
  fn one_shot_without_frames_fails() {
    let mut vision = vision();
    let output = Arc::new(Collect::default());
    let result = OneShotTask::default().run_task(Vec::<RawFrame>::new(), &mut vision, output);
    assert!(result.is_err());
  }

  #[test]
  fn one_shot_reports_rejected_submission() {
    let mut vision = Vision::new(SimulatedEngine::builder().build().unwrap());
    let output = Arc::new(Collect::default());
    // 未配置请求
    let result = OneShotTask::default().run_task(vec![FRAME], &mut vision, output);
    assert!(result.is_err());
  }

  #[test]
  fn one_shot_timeout_keeps_frame_alive() {
    let engine = SimulatedEngine::builder()
      .latency(Duration::from_millis(200))
      .build()
      .unwrap();
    let mut vision = Vision::new(engine);
    vision.configure(RequestKinds::CLASSIFICATION, 1);
    let buffer = Arc::new(PixelBuffer::from_rgba(vec![0u8; 16], 2, 2, true).unwrap());

    let result = OneShotTask::default()
      .with_timeout(Duration::from_millis(10))
      .run_task(vec![Arc::clone(&buffer)], &mut vision, Arc::new(Collect::default()));
    assert!(result.is_err());
    assert!(vision.in_progress());
    assert_eq!(Arc::strong_count(&buffer), 2);
  }

  #[test]
  fn continuous_fails_without_configured_requests() {
    let mut vision = Vision::new(SimulatedEngine::builder().build().unwrap());
    let output = Arc::new(Collect::default());

    let result = ContinuousTask::default()
      .with_ctrlc(false)
      .run_task(std::iter::repeat(FRAME), &mut vision, Arc::clone(&output));
    assert!(result.is_err());
    assert!(output.batches.lock().unwrap().is_empty());
  }

  #[test]
  fn continuous_waits_a_tick_after_rejection() {
    let engine = SimulatedEngine::builder()
      .accept_only(ImageKind::TextureHandle)
      .build()
      .unwrap();
    let mut vision = Vision::new(engine);
    vision.configure(RequestKinds::CLASSIFICATION, 1);
    let tick = Duration::from_millis(5);

    let now = Instant::now();
    ContinuousTask::default()
      .with_ctrlc(false)
      .with_tick(tick)
      .with_frame_number(Some(3))
      .run_task(std::iter::repeat(FRAME), &mut vision, Arc::new(Collect::default()))
      .unwrap();
    assert!(now.elapsed() >= tick * 3);
    assert!(!vision.in_progress());
  }

  #[test]
  fn continuous_stops_at_frame_number() {
    let mut vision = vision();
    let output = Arc::new(Collect::default());

    ContinuousTask::default()
      .with_ctrlc(false)
      .with_frame_number(Some(3))
      .run_task(std::iter::repeat(FRAME), &mut vision, Arc::clone(&output))
      .unwrap();

    let batches = output.batches.lock().unwrap();
    let classifications = batches
      .iter()
      .filter(|b| b.kind() == RequestKind::Classification)
      .count();
    assert_eq!(classifications, 3);
    assert_eq!(batches.len(), 6);
    assert!(!vision.in_progress());
  }

  #[test]
  fn continuous_stops_when_input_ends() {
    let mut vision = vision();
    let output = Arc::new(Collect::default());

    ContinuousTask::default()
      .with_ctrlc(false)
      .run_task(vec![FRAME; 2], &mut vision, Arc::clone(&output))
      .unwrap();

    assert_eq!(output.batches.lock().unwrap().len(), 4);
  }
}
