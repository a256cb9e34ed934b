// 该文件是 Zitai （姿态） 项目的一部分。
// src/model.rs - 姿态估计模型
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
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

pub trait Model {
  type Input: ?Sized;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

mod command;
mod prediction;
mod replay;
mod tensor;

pub use self::command::CommandModel;
pub use self::prediction::{DetectionContainer, InstancePayload, RawPrediction, tensor_from_value};
pub use self::replay::ReplayModel;
pub use self::tensor::{
  Device, DeviceTensor, DeviceTransfer, HostArray, OpaqueValue, Tensor, TensorError, materialize,
};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("路径不存在: {0}")]
  PathNotFound(PathBuf),
  #[error("设备错误: {0}")]
  Device(#[from] TensorError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("预测结果解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("推理程序退出异常 ({status}): {stderr}")]
  CommandFailed { status: String, stderr: String },
}

/// 模型构建参数：架构描述、权重与设备
pub struct ModelBuilder {
  url: Url,
  config: Option<PathBuf>,
  weights: Option<PathBuf>,
  device: Device,
}

impl FromUrl for ModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayModel::SCHEME | CommandModel::SCHEME => Ok(ModelBuilder {
        url: url.clone(),
        config: None,
        weights: None,
        device: Device::Cuda(0),
      }),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl ModelBuilder {
  pub fn config(mut self, config: Option<PathBuf>) -> Self {
    self.config = config;
    self
  }

  pub fn weights(mut self, weights: Option<PathBuf>) -> Self {
    self.weights = weights;
    self
  }

  pub fn device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  pub fn build(self) -> Result<ModelWrapper, ModelError> {
    for path in self.config.iter().chain(self.weights.iter()) {
      if !path.exists() {
        return Err(ModelError::PathNotFound(path.clone()));
      }
    }

    info!("初始化模型: {} (设备: {})", self.url, self.device);
    let model = match self.url.scheme() {
      ReplayModel::SCHEME => ModelWrapper::Replay(ReplayModel::from_url(&self.url)?.with_device(self.device)),
      CommandModel::SCHEME => ModelWrapper::Command(
        CommandModel::from_url(&self.url)?
          .with_checkpoint(self.config, self.weights)
          .with_device(self.device),
      ),
      other => return Err(ModelError::SchemeMismatch(other.to_string())),
    };
    info!("模型初始化完成");
    Ok(model)
  }
}

pub enum ModelWrapper {
  Replay(ReplayModel),
  Command(CommandModel),
}

impl Model for ModelWrapper {
  type Input = Path;
  type Output = Vec<RawPrediction>;
  type Error = ModelError;

  fn infer(&self, input: &Path) -> Result<Self::Output, Self::Error> {
    match self {
      ModelWrapper::Replay(model) => model.infer(input),
      ModelWrapper::Command(model) => model.infer(input),
    }
  }
}
