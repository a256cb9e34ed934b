// 该文件是 Zitai （姿态） 项目的一部分。
// src/output/json_record.rs - 逐图像 JSON 结果输出
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

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  output::{Completion, Render},
  record::CanonicalResult,
};

const RECORD_EXTENSION: &str = "json";

#[derive(Error, Debug)]
pub enum JsonRecordOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每张输入图像对应输出目录中的一个 `<stem>.json`
///
/// 文件存在即视为已完成，不校验内容。写入时无条件覆盖。
#[derive(Debug, Clone)]
pub struct JsonRecordOutput {
  directory: PathBuf,
}

impl JsonRecordOutput {
  /// 使用已有目录，不做检查
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    JsonRecordOutput {
      directory: directory.into(),
    }
  }

  /// 目录不存在时创建
  pub fn create(directory: &Path) -> Result<Self, JsonRecordOutputError> {
    std::fs::create_dir_all(directory)?;
    Ok(Self::new(directory))
  }

  /// 输入文件名去掉扩展名后加 `.json`
  pub fn artifact_path(&self, name: &str) -> PathBuf {
    let stem = Path::new(name)
      .file_stem()
      .and_then(|stem| stem.to_str())
      .unwrap_or(name);
    self
      .directory
      .join(format!("{}.{}", stem, RECORD_EXTENSION))
  }
}

impl Completion for JsonRecordOutput {
  fn is_complete(&self, name: &str) -> bool {
    self.artifact_path(name).exists()
  }
}

impl Render<CanonicalResult> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(&self, name: &str, result: &CanonicalResult) -> Result<(), Self::Error> {
    let path = self.artifact_path(name);
    let mut writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.flush()?;
    debug!("结果已保存到 {}", path.display());
    Ok(())
  }
}

/// 读取目录下全部 `*.json` 结果，以文件名（不含扩展名）为键
///
/// 无法解析的文件会被跳过。
pub fn load_predictions(
  directory: &Path,
) -> Result<BTreeMap<String, CanonicalResult>, JsonRecordOutputError> {
  let mut predictions = BTreeMap::new();
  for entry in std::fs::read_dir(directory)? {
    let path = entry?.path();
    if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
      continue;
    }
    let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
      continue;
    };

    let parsed = std::fs::read_to_string(&path)
      .map_err(JsonRecordOutputError::from)
      .and_then(|text| serde_json::from_str::<CanonicalResult>(&text).map_err(Into::into));
    match parsed {
      Ok(result) => {
        predictions.insert(stem.to_string(), result);
      }
      Err(e) => warn!("无法读取结果文件 {}: {}", path.display(), e),
    }
  }
  Ok(predictions)
}
