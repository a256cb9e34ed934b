// 该文件是 Zitai （姿态） 项目的一部分。
// src/model/command.rs - 外部推理程序
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
use std::process::Command;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{Device, Model, ModelError, RawPrediction};
use crate::{FromUrl, FromUrlWithScheme, url_path};

/// 每张图像调用一次外部推理程序，从标准输出读取预测 JSON
///
/// 调用形式: `<program> [arg...] [--config C] [--weights W] --device D <image>`
pub struct CommandModel {
  program: PathBuf,
  args: Vec<String>,
  config: Option<PathBuf>,
  weights: Option<PathBuf>,
  device: Device,
}

impl FromUrlWithScheme for CommandModel {
  const SCHEME: &'static str = "exec";
}

impl FromUrl for CommandModel {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let program = url_path(url);
    if !program.is_file() {
      return Err(ModelError::PathNotFound(program));
    }

    let args = url
      .query_pairs()
      .filter(|(k, _)| k == "arg")
      .map(|(_, v)| v.into_owned())
      .collect();

    Ok(CommandModel {
      program,
      args,
      config: None,
      weights: None,
      device: Device::Cpu,
    })
  }
}

impl CommandModel {
  pub fn with_checkpoint(mut self, config: Option<PathBuf>, weights: Option<PathBuf>) -> Self {
    self.config = config;
    self.weights = weights;
    self
  }

  pub fn with_device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  fn command(&self, image: &Path) -> Command {
    let mut command = Command::new(&self.program);
    command.args(&self.args);
    if let Some(config) = &self.config {
      command.arg("--config").arg(config);
    }
    if let Some(weights) = &self.weights {
      command.arg("--weights").arg(weights);
    }
    command.arg("--device").arg(self.device.to_string()).arg(image);
    command
  }
}

impl Model for CommandModel {
  type Input = Path;
  type Output = Vec<RawPrediction>;
  type Error = ModelError;

  fn infer(&self, input: &Path) -> Result<Self::Output, Self::Error> {
    debug!("调用推理程序: {} {}", self.program.display(), input.display());
    let output = self.command(input).output()?;
    if !output.status.success() {
      return Err(ModelError::CommandFailed {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    // 推理程序可以连续输出多个 JSON 文档
    let mut predictions = Vec::new();
    for value in serde_json::Deserializer::from_slice(&output.stdout).into_iter::<Value>() {
      predictions.push(RawPrediction::from_value(&value?));
    }
    if predictions.is_empty() {
      warn!("推理程序没有输出任何预测: {}", input.display());
    }
    Ok(predictions)
  }
}
