// 该文件是 Zitai （姿态） 项目的一部分。
// src/output/overlay.rs - 叠加图像输出
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

use image::ImageReader;
use thiserror::Error;
use tracing::debug;

use crate::{
  output::{Render, draw::Draw},
  record::CanonicalResult,
};

#[derive(Error, Debug)]
pub enum OverlayOutputError {
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 在原图上叠加结果并保存为 `<stem>.png`
pub struct OverlayOutput {
  directory: PathBuf,
  draw: Draw,
}

impl OverlayOutput {
  pub fn create(directory: &Path, draw: Draw) -> Result<Self, OverlayOutputError> {
    std::fs::create_dir_all(directory)?;
    Ok(OverlayOutput {
      directory: directory.to_path_buf(),
      draw,
    })
  }

  pub fn overlay_path(&self, image: &Path) -> PathBuf {
    let stem = image.file_stem().unwrap_or(image.as_os_str());
    let mut name = stem.to_os_string();
    name.push(".png");
    self.directory.join(name)
  }
}

impl Render<CanonicalResult> for OverlayOutput {
  type Error = OverlayOutputError;

  /// `name` 为原图路径
  fn render_result(&self, name: &str, result: &CanonicalResult) -> Result<(), Self::Error> {
    let source = Path::new(name);
    let mut image = ImageReader::open(source)?.decode()?.to_rgb8();
    self.draw.draw_result(&mut image, result);

    let path = self.overlay_path(source);
    image.save(&path)?;
    debug!("叠加图像已保存到 {}", path.display());
    Ok(())
  }
}
