// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 结果输出定义
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

use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  engine::VisionEngine,
  listener::ListenerId,
  observation::{Observation, ResultBatch},
  request::RequestKinds,
  vision::Vision,
};

pub trait Render {
  type Error;
  fn render_result(&self, batch: &ResultBatch) -> Result<(), Self::Error>;
}

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 把结果写入日志
///
/// `log:` 只输出每个批次的摘要，`log:?verbose` 逐条输出观测结果。
#[derive(Debug, Default, Clone)]
pub struct LogOutput {
  verbose: bool,
}

impl LogOutput {
  pub fn new(verbose: bool) -> Self {
    LogOutput { verbose }
  }
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    let verbose = url.query_pairs().any(|(k, _)| k == "verbose");
    Ok(LogOutput { verbose })
  }
}

impl Render for LogOutput {
  type Error = Infallible;

  fn render_result(&self, batch: &ResultBatch) -> Result<(), Self::Error> {
    info!("收到 {} 结果: {} 个", batch.kind(), batch.len());
    for (index, observation) in batch.observations().iter().enumerate() {
      let line = match observation {
        Observation::Classification(c) => format!("{} ({:.4})", c.label, c.confidence),
        Observation::Rectangle(r) => format!(
          "[{:.4}, {:.4}] [{:.4}, {:.4}] [{:.4}, {:.4}] [{:.4}, {:.4}] 面积 {:.4}",
          r.top_left().x,
          r.top_left().y,
          r.top_right().x,
          r.top_right().y,
          r.bottom_right().x,
          r.bottom_right().y,
          r.bottom_left().x,
          r.bottom_left().y,
          r.area()
        ),
        Observation::Barcode(b) => format!("{}: {}", b.symbology, b.payload),
      };
      if self.verbose {
        info!("  #{} {}", index, line);
      } else {
        debug!("  #{} {}", index, line);
      }
    }
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

#[derive(Debug)]
pub enum OutputWrapper {
  Log(LogOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogOutput::SCHEME => Ok(OutputWrapper::Log(LogOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, batch: &ResultBatch) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Log(output) => output.render_result(batch).map_err(|never| match never {}),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(batch)
        .map_err(OutputError::from),
    }
  }
}

/// 为每个请求类型订阅输出，返回监听者标识
///
/// 监听者内部无法传播错误，输出失败只记录日志。
pub fn attach_output<E, O>(
  vision: &mut Vision<E>,
  kinds: RequestKinds,
  output: Arc<O>,
) -> Vec<ListenerId>
where
  E: VisionEngine,
  O: Render + Send + Sync + 'static,
  O::Error: Display,
{
  kinds
    .iter()
    .map(|kind| {
      let output = Arc::clone(&output);
      vision.subscribe(kind, move |batch| {
        if let Err(e) = output.render_result(batch) {
          error!("输出 {} 结果失败: {}", batch.kind(), e);
        }
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wrapper_selects_by_scheme() {
    let url = Url::parse("log:?verbose").unwrap();
    match OutputWrapper::from_url(&url).unwrap() {
      OutputWrapper::Log(output) => assert!(output.verbose),
      #[allow(unreachable_patterns)]
      other => panic!("意外的输出: {:?}", other),
    }

    let url = Url::parse("rtsp://localhost/stream").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn log_output_renders_every_kind() {
    use crate::observation::{Barcode, Classification, Point};

    let output = LogOutput::new(true);
    let batches = [
      ResultBatch::classifications(&[Classification::default()]),
      ResultBatch::rectangles(&[Point::default(); 4]),
      ResultBatch::barcodes(&[Barcode::default()]),
    ];
    for batch in batches.iter() {
      assert!(output.render_result(batch).is_ok());
    }
  }
}
