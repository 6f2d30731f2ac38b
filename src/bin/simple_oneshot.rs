// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧视觉请求示例
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
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl,
  engine::SimulatedEngineBuilder,
  input::InputWrapper,
  orientation::Orientation,
  output::OutputWrapper,
  request::RequestKinds,
  task::{OneShotTask, Task},
  vision::Vision,
};
use tracing::info;

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 视觉引擎，例如 sim:///path/to/scene.json
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,
  /// 需要执行的请求，逗号分隔
  #[arg(long, value_name = "REQUESTS", default_value = "classification,rectangle,barcode")]
  pub requests: RequestKinds,
  /// 每类请求的最大结果数
  #[arg(long, value_name = "N", default_value_t = 10)]
  pub max_observations: usize,
  /// 屏幕方向
  #[arg(long, value_name = "ORIENTATION", default_value = "landscape-left")]
  pub orientation: Orientation,
  /// 等待超时（毫秒）
  #[arg(long, value_name = "MS", default_value_t = 10_000)]
  pub timeout_ms: u64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("视觉引擎: {}", args.engine);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let engine = SimulatedEngineBuilder::from_url(&args.engine)?.build()?;
  let output = Arc::new(OutputWrapper::from_url(&args.output)?);

  let mut vision = Vision::new(engine);
  vision.configure(args.requests, args.max_observations);
  vision.set_orientation(args.orientation);

  OneShotTask::default()
    .with_timeout(Duration::from_millis(args.timeout_ms))
    .run_task(input, &mut vision, output)?;

  Ok(())
}
