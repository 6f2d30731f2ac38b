// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

use crate::{FromUrl, FromUrlWithScheme, observation::ResultBatch, output::Render};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct BatchRecord<'a> {
  id: u16,
  time: String,
  count: usize,
  #[serde(flatten)]
  batch: &'a ResultBatch,
}

/// 按日期目录保存每个结果批次
///
/// 文件路径为 `<dir>/YYYY/MM/DD/HH-MM-SS-<kind>-<id>.json`，`?pretty` 输出缩进格式。
#[derive(Debug)]
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counters: Mutex<u16>,
  pretty: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let pretty = uri.query_pairs().any(|(k, _)| k == "pretty");
    Ok(DirectoryRecordOutput::new(uri.path()).with_pretty(pretty))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    DirectoryRecordOutput {
      directory: directory.as_ref().to_path_buf(),
      frame_counters: Mutex::new(0),
      pretty: false,
    }
  }

  pub fn with_pretty(mut self, pretty: bool) -> Self {
    self.pretty = pretty;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counters
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    let id = counter.wrapping_add(1);
    *counter = id;
    id
  }

  fn record_path(
    &self,
    now: &DateTime<Utc>,
    kind: &str,
    id: u16,
  ) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{}-{:04X}.json",
      now.format("%H-%M-%S"),
      kind,
      id
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, batch: &ResultBatch) -> Result<(), Self::Error> {
    let now = Utc::now();
    let id = self.frame_id();
    let path = self.record_path(&now, batch.kind().name(), id)?;

    let record = BatchRecord {
      id,
      time: now.to_rfc3339(),
      count: batch.len(),
      batch,
    };

    let mut writer = BufWriter::new(File::create(&path)?);
    if self.pretty {
      serde_json::to_writer_pretty(&mut writer, &record)?;
    } else {
      serde_json::to_writer(&mut writer, &record)?;
    }
    writer.flush()?;

    debug!("结果已记录到 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::observation::{Barcode, Point};

  fn json_files(dir: &Path, found: &mut Vec<PathBuf>) {
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        json_files(&path, found);
      } else if path.extension().is_some_and(|e| e == "json") {
        found.push(path);
      }
    }
  }

  #[test]
  fn from_url_reads_path_and_options() {
    let url = url::Url::parse("folder:///var/kanjian/records?pretty").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory(), Path::new("/var/kanjian/records"));
    assert!(output.pretty);

    let url = url::Url::parse("file:///var/kanjian").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn batches_are_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path());

    let barcodes = ResultBatch::barcodes(&[Barcode {
      symbology: "QR".to_string(),
      payload: "kanjian".to_string(),
    }]);
    let rectangles = ResultBatch::rectangles(&[
      Point::new(0.0, 1.0),
      Point::new(1.0, 1.0),
      Point::new(1.0, 0.0),
      Point::new(0.0, 0.0),
    ]);
    output.render_result(&barcodes).unwrap();
    output.render_result(&rectangles).unwrap();

    let mut files = Vec::new();
    json_files(dir.path(), &mut files);
    assert_eq!(files.len(), 2);

    let mut records: Vec<serde_json::Value> = files
      .iter()
      .map(|p| serde_json::from_str(&std::fs::read_to_string(p).unwrap()).unwrap())
      .collect();
    records.sort_by_key(|r| r["id"].as_u64());

    assert_eq!(records[0]["kind"], "barcode_scanning");
    assert_eq!(records[0]["count"], 1);
    assert_eq!(records[0]["observations"][0]["payload"], "kanjian");
    assert_eq!(records[1]["kind"], "rectangle_detection");
    assert_eq!(records[1]["observations"][0]["area"], 1.0);
  }
}
