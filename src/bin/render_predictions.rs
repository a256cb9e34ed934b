// 该文件是 Zitai （姿态） 项目的一部分。
// src/bin/render_predictions.rs - 将 JSON 结果叠加到原图上
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

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zitai::{
  input::ImageListing,
  output::{OverlayOutput, Render, draw::Draw, load_predictions},
};

/// 将姿态结果绘制到图像上，便于人工检查
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 原始图像目录
  #[arg(value_name = "IMAGE_DIR")]
  pub image_dir: PathBuf,
  /// JSON 结果目录
  #[arg(value_name = "PRED_DIR")]
  pub pred_dir: PathBuf,
  /// 叠加图像输出目录
  #[arg(value_name = "OUTPUT_DIR")]
  pub output_dir: PathBuf,
  /// 关键点置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.3", value_name = "THRESHOLD")]
  pub threshold: f64,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  let predictions = load_predictions(&args.pred_dir)?;
  if predictions.is_empty() {
    bail!("{} 中没有找到结果文件", args.pred_dir.display());
  }
  info!("载入 {} 份结果", predictions.len());

  let listing = ImageListing::scan(&args.image_dir)?;
  let output = OverlayOutput::create(&args.output_dir, Draw::default().with_threshold(args.threshold))?;

  let mut rendered = 0usize;
  for name in &listing.eligible {
    let stem = Path::new(name)
      .file_stem()
      .and_then(|stem| stem.to_str())
      .unwrap_or(name);
    let Some(result) = predictions.get(stem) else {
      continue;
    };
    let path = listing.path_of(name);
    match output.render_result(&path.to_string_lossy(), result) {
      Ok(()) => rendered += 1,
      Err(e) => warn!("无法绘制 {}: {}", name, e),
    }
  }

  info!("已绘制 {} 张图像，保存在 {}", rendered, args.output_dir.display());
  Ok(())
}
