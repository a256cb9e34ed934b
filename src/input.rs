// 该文件是 Zitai （姿态） 项目的一部分。
// src/input.rs - 图像目录输入
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

use thiserror::Error;
use tracing::{debug, info};

/// 支持的图像扩展名（不区分大小写）
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum InputError {
  #[error("不是有效的目录: {0}")]
  NotADirectory(PathBuf),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

pub fn is_image_file(name: &str) -> bool {
  Path::new(name)
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|candidate| ext.eq_ignore_ascii_case(candidate))
    })
}

/// 输入目录的一次列举结果，条目按文件名排序
#[derive(Debug, Clone, Default)]
pub struct ImageListing {
  pub directory: PathBuf,
  pub eligible: Vec<String>,
  pub ignored: Vec<String>,
}

impl ImageListing {
  /// 列举目录的直接子项，不递归
  pub fn scan(directory: &Path) -> Result<Self, InputError> {
    if !directory.is_dir() {
      return Err(InputError::NotADirectory(directory.to_path_buf()));
    }

    let mut eligible = Vec::new();
    let mut ignored = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let entry = entry?;
      if !entry.path().is_file() {
        continue;
      }
      let Ok(name) = entry.file_name().into_string() else {
        debug!("忽略非 UTF-8 文件名: {:?}", entry.file_name());
        continue;
      };
      if is_image_file(&name) {
        eligible.push(name);
      } else {
        ignored.push(name);
      }
    }
    eligible.sort();
    ignored.sort();

    info!("在 {} 中发现 {} 张图像", directory.display(), eligible.len());
    if !ignored.is_empty() {
      info!("跳过 {} 个非 PNG/JPG 文件", ignored.len());
    }

    Ok(ImageListing {
      directory: directory.to_path_buf(),
      eligible,
      ignored,
    })
  }

  pub fn path_of(&self, name: &str) -> PathBuf {
    self.directory.join(name)
  }

  pub fn len(&self) -> usize {
    self.eligible.len()
  }

  pub fn is_empty(&self) -> bool {
    self.eligible.is_empty()
  }
}
