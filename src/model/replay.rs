// 该文件是 Zitai （姿态） 项目的一部分。
// src/model/replay.rs - 回放离线推理结果
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

use tracing::debug;
use url::Url;

use super::{Device, Model, ModelError, RawPrediction};
use crate::{FromUrl, FromUrlWithScheme, url_path};

/// 从目录中读取 `<图像名>.json` 形式的预测转储
pub struct ReplayModel {
  directory: PathBuf,
  device: Device,
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let directory = url_path(url);
    if !directory.is_dir() {
      return Err(ModelError::PathNotFound(directory));
    }

    Ok(ReplayModel {
      directory,
      device: Device::Cpu,
    })
  }
}

impl ReplayModel {
  pub fn with_device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  pub fn dump_path(&self, image: &Path) -> PathBuf {
    let stem = image.file_stem().unwrap_or(image.as_os_str());
    let mut name = stem.to_os_string();
    name.push(".json");
    self.directory.join(name)
  }
}

impl Model for ReplayModel {
  type Input = Path;
  type Output = Vec<RawPrediction>;
  type Error = ModelError;

  fn infer(&self, input: &Path) -> Result<Self::Output, Self::Error> {
    let path = self.dump_path(input);
    debug!("回放预测结果: {} (设备: {})", path.display(), self.device);
    let text = std::fs::read_to_string(&path)?;
    Ok(vec![RawPrediction::from_json(&text)?])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn replay_reads_dump_by_stem() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("face_01.json"),
      r#"{"predictions": [{"pred_instances": {"keypoints": [[[1, 2]]]}}]}"#,
    )
    .unwrap();

    let url = Url::parse(&format!("replay://{}", dir.path().display())).unwrap();
    let model = ReplayModel::from_url(&url).unwrap();

    let output = model.infer(Path::new("/images/face_01.png")).unwrap();
    assert_eq!(output.len(), 1);
    assert!(matches!(output[0], RawPrediction::MappingWithPredictions(_)));

    assert!(matches!(
      model.infer(Path::new("/images/face_02.png")),
      Err(ModelError::IoError(_))
    ));
  }

  #[test]
  fn replay_requires_directory() {
    let url = Url::parse("replay:///definitely/not/here").unwrap();
    assert!(matches!(
      ReplayModel::from_url(&url),
      Err(ModelError::PathNotFound(_))
    ));
  }
}
