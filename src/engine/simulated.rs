// 该文件是 Kanjian （看见） 项目的一部分。
// src/engine/simulated.rs - 基于场景脚本的模拟视觉引擎
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

//! # 模拟视觉引擎
//!
//! 与原生引擎的行为保持一致：
//! - 所有请求在一个串行工作线程上执行
//! - 每个启用的请求类型完成后投递一条完成消息
//! - 没有结果时投递 `"No results"`，出错时投递 `"[VisionNative] Error: ..."`
//!
//! 识别结果来自预先给定的 [`Scene`]，可以从 JSON 文件加载：
//!
//! ```json
//! {
//!   "classifications": [{ "label": "cat", "confidence": 0.92 }],
//!   "rectangles": [{
//!     "top_left": [0.1, 0.9], "top_right": [0.9, 0.9],
//!     "bottom_right": [0.9, 0.1], "bottom_left": [0.1, 0.1]
//!   }],
//!   "barcodes": [{ "symbology": "VNBarcodeSymbologyQR", "payload": "hello" }],
//!   "errors": { "barcode": "camera busy" }
//! }
//! ```
//!
//! URL 形式：`sim:///path/to/scene.json?latency_ms=5&accept=pixel_buffer`

use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  engine::{CompletionSender, DrainBuffer, VisionEngine, fill_buffer},
  frame::{ImageHandle, ImageKind},
  observation::{Barcode, Classification, NativePoint},
  request::{RequestKind, RequestKinds},
};

const NO_RESULTS_MESSAGE: &str = "No results";
const ERROR_MESSAGE_PREFIX: &str = "[VisionNative] Error: ";
const DEFAULT_MAX_OBSERVATIONS: usize = 10;

#[derive(Error, Debug)]
pub enum SimulatedEngineError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("场景文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("场景文件解析错误: {0}")]
  SceneError(#[from] serde_json::Error),
  #[error("无效的参数 {key}: {value}")]
  InvalidQuery { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SceneRectangle {
  pub top_left: [f64; 2],
  pub top_right: [f64; 2],
  pub bottom_right: [f64; 2],
  pub bottom_left: [f64; 2],
}

impl SceneRectangle {
  fn corners(&self) -> [NativePoint; 4] {
    [
      self.top_left.into(),
      self.top_right.into(),
      self.bottom_right.into(),
      self.bottom_left.into(),
    ]
  }
}

/// 每类请求预设的失败消息
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SceneErrors {
  pub classification: Option<String>,
  pub rectangle: Option<String>,
  pub barcode: Option<String>,
}

impl SceneErrors {
  fn get(&self, kind: RequestKind) -> Option<&str> {
    match kind {
      RequestKind::Classification => self.classification.as_deref(),
      RequestKind::RectangleDetection => self.rectangle.as_deref(),
      RequestKind::BarcodeScanning => self.barcode.as_deref(),
    }
  }
}

/// 模拟引擎每一帧“看到”的内容
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Scene {
  pub classifications: Vec<Classification>,
  pub rectangles: Vec<SceneRectangle>,
  pub barcodes: Vec<Barcode>,
  pub errors: SceneErrors,
}

impl Scene {
  pub fn from_json_str(json: &str) -> Result<Self, SimulatedEngineError> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimulatedEngineError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_json_str(&content)
  }
}

/// 引擎内部的结果缓存，相当于原生侧暴露的结果缓冲区
#[derive(Debug, Default)]
struct NativeStore {
  classifications: Vec<Classification>,
  points: Vec<NativePoint>,
  barcodes: Vec<Barcode>,
}

struct Job {
  handle: ImageHandle,
  kinds: RequestKinds,
  max_observations: usize,
  sender: CompletionSender,
}

pub struct SimulatedEngineBuilder {
  scene: Scene,
  latency: Duration,
  accept_texture: bool,
  accept_pixel_buffer: bool,
}

impl Default for SimulatedEngineBuilder {
  fn default() -> Self {
    SimulatedEngineBuilder {
      scene: Scene::default(),
      latency: Duration::ZERO,
      accept_texture: true,
      accept_pixel_buffer: true,
    }
  }
}

impl FromUrlWithScheme for SimulatedEngineBuilder {
  const SCHEME: &'static str = "sim";
}

impl FromUrl for SimulatedEngineBuilder {
  type Error = SimulatedEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SimulatedEngineError::SchemeMismatch(format!(
        "期望引擎 '{}', 实际引擎 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = SimulatedEngineBuilder::default();

    let path = url.path();
    if !path.is_empty() && path != "/" {
      info!("加载场景文件: {}", path);
      builder.scene = Scene::from_path(path)?;
    }

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "latency_ms" => {
          let ms = value
            .parse::<u64>()
            .map_err(|_| SimulatedEngineError::InvalidQuery {
              key: key.to_string(),
              value: value.to_string(),
            })?;
          builder.latency = Duration::from_millis(ms);
        }
        "accept" => {
          builder.accept_texture = false;
          builder.accept_pixel_buffer = false;
          for part in value.split(',') {
            match part.trim() {
              "texture" => builder.accept_texture = true,
              "pixel_buffer" => builder.accept_pixel_buffer = true,
              other => {
                return Err(SimulatedEngineError::InvalidQuery {
                  key: key.to_string(),
                  value: other.to_string(),
                });
              }
            }
          }
        }
        other => warn!("忽略未知的引擎参数: {}", other),
      }
    }

    Ok(builder)
  }
}

impl SimulatedEngineBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn scene(mut self, scene: Scene) -> Self {
    self.scene = scene;
    self
  }

  pub fn latency(mut self, latency: Duration) -> Self {
    self.latency = latency;
    self
  }

  /// 仅接受指定类型的图像句柄
  pub fn accept_only(mut self, kind: ImageKind) -> Self {
    self.accept_texture = kind == ImageKind::TextureHandle;
    self.accept_pixel_buffer = kind == ImageKind::PixelBufferHandle;
    self
  }

  pub fn build(self) -> Result<SimulatedEngine, SimulatedEngineError> {
    let store = Arc::new(Mutex::new(NativeStore::default()));
    let (job_tx, job_rx) = mpsc::channel::<Job>();

    let worker_store = Arc::clone(&store);
    let scene = self.scene;
    let latency = self.latency;
    let worker = thread::Builder::new()
      .name("kanjian-vision".to_string())
      .spawn(move || {
        debug!("视觉请求工作线程启动");
        for job in job_rx {
          if !latency.is_zero() {
            thread::sleep(latency);
          }
          perform_requests(&scene, &worker_store, job);
        }
        debug!("视觉请求工作线程退出");
      })?;

    info!("模拟视觉引擎已创建");
    Ok(SimulatedEngine {
      store,
      job_tx: Some(job_tx),
      worker: Some(worker),
      sender: None,
      requests: RequestKinds::NONE,
      max_observations: DEFAULT_MAX_OBSERVATIONS,
      accept_texture: self.accept_texture,
      accept_pixel_buffer: self.accept_pixel_buffer,
    })
  }
}

/// 在串行工作线程上执行请求的模拟引擎
pub struct SimulatedEngine {
  store: Arc<Mutex<NativeStore>>,
  job_tx: Option<Sender<Job>>,
  worker: Option<JoinHandle<()>>,
  sender: Option<CompletionSender>,
  requests: RequestKinds,
  max_observations: usize,
  accept_texture: bool,
  accept_pixel_buffer: bool,
}

impl SimulatedEngine {
  pub fn builder() -> SimulatedEngineBuilder {
    SimulatedEngineBuilder::default()
  }

  pub fn requests(&self) -> RequestKinds {
    self.requests
  }

  pub fn max_observations(&self) -> usize {
    self.max_observations
  }

  fn accepts(&self, kind: ImageKind) -> bool {
    match kind {
      ImageKind::TextureHandle => self.accept_texture,
      ImageKind::PixelBufferHandle => self.accept_pixel_buffer,
    }
  }
}

fn lock_store(store: &Mutex<NativeStore>) -> MutexGuard<'_, NativeStore> {
  store.lock().unwrap_or_else(PoisonError::into_inner)
}

fn perform_requests(scene: &Scene, store: &Mutex<NativeStore>, job: Job) {
  debug!("执行视觉请求 [{}]，图像句柄 {}", job.kinds, job.handle);
  for kind in job.kinds.iter() {
    let message = perform_request(scene, store, kind, job.max_observations);
    job.sender.complete(kind, message);
  }
}

fn perform_request(
  scene: &Scene,
  store: &Mutex<NativeStore>,
  kind: RequestKind,
  max_observations: usize,
) -> String {
  if let Some(reason) = scene.errors.get(kind) {
    return format!("{}{}", ERROR_MESSAGE_PREFIX, reason);
  }

  let mut store = lock_store(store);
  match kind {
    RequestKind::Classification => {
      if scene.classifications.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
      }
      let mut sorted = scene.classifications.clone();
      sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
      sorted.truncate(max_observations);
      store.classifications = sorted;
    }
    RequestKind::RectangleDetection => {
      if scene.rectangles.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
      }
      store.points = scene
        .rectangles
        .iter()
        .take(max_observations)
        .flat_map(|rect| rect.corners())
        .collect();
    }
    RequestKind::BarcodeScanning => {
      if scene.barcodes.is_empty() {
        return NO_RESULTS_MESSAGE.to_string();
      }
      // 无法解码出内容的条码直接跳过
      store.barcodes = scene
        .barcodes
        .iter()
        .take(max_observations)
        .filter(|barcode| !barcode.payload.is_empty())
        .cloned()
        .collect();
    }
  }
  String::new()
}

impl VisionEngine for SimulatedEngine {
  fn set_completion_sender(&mut self, sender: CompletionSender) {
    self.sender = Some(sender);
  }

  fn allocate(&mut self, kinds: RequestKinds, max_observations: usize) {
    self.requests = kinds;
    self.max_observations = max_observations;
    if kinds.is_empty() {
      info!("未指定任何视觉请求");
      return;
    }
    info!(
      "已分配视觉请求 [{}]，最大观测数 {}",
      kinds, max_observations
    );
  }

  fn submit(&mut self, handle: ImageHandle, kind: ImageKind) -> bool {
    if handle.is_null() || !self.accepts(kind) {
      return false;
    }

    if self.requests.is_empty() {
      warn!("尚未分配视觉请求，拒绝提交");
      return false;
    }

    let Some(sender) = self.sender.clone() else {
      error!("未设置完成回调目标，拒绝提交");
      return false;
    };

    let Some(job_tx) = self.job_tx.as_ref() else {
      return false;
    };

    let job = Job {
      handle,
      kinds: self.requests,
      max_observations: self.max_observations,
      sender,
    };
    match job_tx.send(job) {
      Ok(()) => true,
      Err(_) => {
        error!("视觉请求工作线程已退出");
        false
      }
    }
  }

  fn drain(&mut self, buffer: DrainBuffer<'_>) -> usize {
    let store = lock_store(&self.store);
    debug!("读取 {} 结果，缓冲区容量 {}", buffer.kind(), buffer.capacity());
    match buffer {
      DrainBuffer::Classifications(target) => fill_buffer(&store.classifications, target),
      DrainBuffer::Points(target) => fill_buffer(&store.points, target),
      DrainBuffer::Barcodes(target) => fill_buffer(&store.barcodes, target),
    }
  }
}

impl Drop for SimulatedEngine {
  fn drop(&mut self) {
    // 关闭任务队列后等待工作线程退出
    self.job_tx.take();
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      error!("视觉请求工作线程异常退出");
    }
  }
}
