// 该文件是 Zitai （姿态） 项目的一部分。
// src/bin/predict_folder.rs - 对图像目录批量进行姿态估计
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

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use zitai::{
  FromUrl,
  input::ImageListing,
  model::{Device, ModelBuilder},
  output::JsonRecordOutput,
  task::{BatchTask, Task},
};

/// 对图像目录运行姿态估计，每张图像保存一个 JSON 结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像目录（PNG 或 JPG）
  #[arg(value_name = "INPUT_DIR")]
  pub input_dir: PathBuf,
  /// JSON 结果输出目录
  #[arg(value_name = "OUTPUT_DIR")]
  pub output_dir: PathBuf,
  /// 推理设备，如 cpu、cuda、cuda:1
  #[arg(long, default_value = "cuda", value_name = "DEVICE")]
  pub device: Device,
  /// 模型来源
  /// 支持格式:
  /// - 回放离线结果: replay:///path/to/dumps
  /// - 外部推理程序: exec:///path/to/infer?arg=...
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 模型架构配置文件
  #[arg(long, value_name = "CONFIG")]
  pub pose2d: Option<PathBuf>,
  /// 模型权重文件
  #[arg(long, value_name = "WEIGHTS")]
  pub pose2d_weights: Option<PathBuf>,
  /// 本次最多推理的图像数量
  #[arg(long, value_name = "COUNT")]
  pub limit: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("输入目录: {}", args.input_dir.display());
  info!("输出目录: {}", args.output_dir.display());
  info!("模型来源: {}", args.model);
  info!("推理设备: {}", args.device);

  let listing = ImageListing::scan(&args.input_dir)?;
  let output = JsonRecordOutput::create(&args.output_dir)
    .with_context(|| format!("无法创建输出目录: {}", args.output_dir.display()))?;
  let model = ModelBuilder::from_url(&args.model)?
    .config(args.pose2d)
    .weights(args.pose2d_weights)
    .device(args.device)
    .build()?;

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
      warn!("收到中断信号，当前图像处理完成后退出...");
      stop.store(true, Ordering::SeqCst);
    })
    .context("无法设置 Ctrl-C 处理")?;
  }

  let summary = BatchTask::default()
    .with_limit(args.limit)
    .with_stop_signal(stop)
    .run_task(listing, model, output)?;

  info!("结果保存在: {}", args.output_dir.display());
  if !summary.interrupted && !summary.state.is_consistent() {
    warn!("计数不一致: {:?}", summary.state);
  }

  Ok(())
}
