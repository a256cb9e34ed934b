// 该文件是 Zitai （姿态） 项目的一部分。
// src/model/tensor.rs - 张量数据与主机侧物化
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

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum TensorError {
  #[error("未知设备: {0}")]
  UnknownDevice(String),
  #[error("张量形状 {shape:?} 需要 {expected} 个元素, 实际为 {actual}")]
  ShapeMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("张量形状 {0:?} 超出可表示范围")]
  ShapeTooLarge(Vec<usize>),
  #[error("张量既不在主机内存中，也不支持设备搬运")]
  NotMaterializable,
}

/// 推理设备标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
  Cpu,
  Cuda(u32),
  Mps,
}

impl FromStr for Device {
  type Err = TensorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_lowercase();
    match lower.as_str() {
      "cpu" => Ok(Device::Cpu),
      "cuda" => Ok(Device::Cuda(0)),
      "mps" => Ok(Device::Mps),
      _ => lower
        .strip_prefix("cuda:")
        .and_then(|index| index.parse().ok())
        .map(Device::Cuda)
        .ok_or_else(|| TensorError::UnknownDevice(s.to_string())),
    }
  }
}

impl fmt::Display for Device {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Device::Cpu => write!(f, "cpu"),
      Device::Cuda(index) => write!(f, "cuda:{}", index),
      Device::Mps => write!(f, "mps"),
    }
  }
}

/// 零长度维度之前允许出现的空列表数量
const EMPTY_NODE_ALLOWANCE: usize = 1 << 16;

/// 主机内存中的嵌套数值数组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostArray {
  Scalar(f64),
  List(Vec<HostArray>),
}

impl HostArray {
  /// 按行优先顺序把扁平数据还原为指定形状
  ///
  /// 形状来自模型输出，需先确认元素数与嵌套节点数都在数据长度允许的范围内。
  pub fn from_shape(shape: &[usize], data: &[f64]) -> Result<Self, TensorError> {
    let (expected, nodes) =
      Self::layout(shape).ok_or_else(|| TensorError::ShapeTooLarge(shape.to_vec()))?;
    let node_limit = data
      .len()
      .saturating_mul(shape.len() + 1)
      .saturating_add(EMPTY_NODE_ALLOWANCE);
    if nodes > node_limit {
      return Err(TensorError::ShapeTooLarge(shape.to_vec()));
    }
    if expected != data.len() {
      return Err(TensorError::ShapeMismatch {
        shape: shape.to_vec(),
        expected,
        actual: data.len(),
      });
    }
    Ok(Self::build(shape, data))
  }

  /// 元素总数与列表节点总数，溢出时返回 `None`
  fn layout(shape: &[usize]) -> Option<(usize, usize)> {
    shape
      .iter()
      .try_fold((1usize, 1usize), |(elements, nodes), &dim| {
        let elements = elements.checked_mul(dim)?;
        Some((elements, nodes.checked_add(elements)?))
      })
  }

  fn build(shape: &[usize], data: &[f64]) -> Self {
    match shape.split_first() {
      None => HostArray::Scalar(data[0]),
      Some((&len, rest)) => {
        let stride: usize = rest.iter().product();
        HostArray::List(
          (0..len)
            .map(|i| Self::build(rest, &data[i * stride..(i + 1) * stride]))
            .collect(),
        )
      }
    }
  }

  pub fn as_scalar(&self) -> Option<f64> {
    match self {
      HostArray::Scalar(value) => Some(*value),
      HostArray::List(_) => None,
    }
  }

  pub fn as_list(&self) -> Option<&[HostArray]> {
    match self {
      HostArray::Scalar(_) => None,
      HostArray::List(items) => Some(items),
    }
  }

  /// `[n]` 形状的向量
  pub fn to_vector(&self) -> Option<Vec<f64>> {
    self.as_list()?.iter().map(HostArray::as_scalar).collect()
  }

  /// `[n][m]` 形状的矩阵，允许各行长度不同
  pub fn to_matrix(&self) -> Option<Vec<Vec<f64>>> {
    self.as_list()?.iter().map(HostArray::to_vector).collect()
  }

  /// `[n][N]` 形状的定长行
  pub fn to_rows<const N: usize>(&self) -> Option<Vec<[f64; N]>> {
    self
      .as_list()?
      .iter()
      .map(|row| row.to_vector()?.try_into().ok())
      .collect()
  }

  /// `[instance][keypoint][x, y]` 形状的关键点
  pub fn to_points(&self) -> Option<Vec<Vec<[f64; 2]>>> {
    self.as_list()?.iter().map(HostArray::to_rows::<2>).collect()
  }

  /// 按深度优先顺序展开所有标量
  pub fn flatten(&self) -> Vec<f64> {
    let mut out = Vec::new();
    self.flatten_into(&mut out);
    out
  }

  fn flatten_into(&self, out: &mut Vec<f64>) {
    match self {
      HostArray::Scalar(value) => out.push(*value),
      HostArray::List(items) => items.iter().for_each(|item| item.flatten_into(out)),
    }
  }
}

/// 位于加速器上的数据需要显式搬运回主机
pub trait DeviceTransfer {
  fn device(&self) -> &Device;
  fn to_host(&self) -> Result<HostArray, TensorError>;
}

/// 模型输出中的数值字段
///
/// 通过能力查询决定如何物化，而不是判断具体类型。
pub trait Tensor: fmt::Debug {
  fn as_host(&self) -> Option<&HostArray> {
    None
  }

  fn device_transfer(&self) -> Option<&dyn DeviceTransfer> {
    None
  }
}

impl Tensor for HostArray {
  fn as_host(&self) -> Option<&HostArray> {
    Some(self)
  }
}

/// 设备端张量：扁平数据加形状
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTensor {
  pub device: Device,
  pub shape: Vec<usize>,
  pub data: Vec<f64>,
}

impl DeviceTransfer for DeviceTensor {
  fn device(&self) -> &Device {
    &self.device
  }

  fn to_host(&self) -> Result<HostArray, TensorError> {
    HostArray::from_shape(&self.shape, &self.data)
  }
}

impl Tensor for DeviceTensor {
  fn device_transfer(&self) -> Option<&dyn DeviceTransfer> {
    Some(self)
  }
}

/// 无法识别的字段值，保留原样用于诊断
#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueValue(pub serde_json::Value);

impl Tensor for OpaqueValue {}

/// 把任意张量物化为主机侧嵌套数组
pub fn materialize(tensor: &dyn Tensor) -> Result<HostArray, TensorError> {
  if let Some(transfer) = tensor.device_transfer() {
    debug!("从 {} 搬运张量到主机", transfer.device());
    return transfer.to_host();
  }
  tensor
    .as_host()
    .cloned()
    .ok_or(TensorError::NotMaterializable)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_device() {
    assert_eq!("cpu".parse::<Device>(), Ok(Device::Cpu));
    assert_eq!("CUDA".parse::<Device>(), Ok(Device::Cuda(0)));
    assert_eq!("cuda:3".parse::<Device>(), Ok(Device::Cuda(3)));
    assert!("tpu".parse::<Device>().is_err());
    assert!("cuda:x".parse::<Device>().is_err());
    assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
  }

  #[test]
  fn from_shape_rebuilds_nesting() {
    let array = HostArray::from_shape(&[1, 2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(array.to_points(), Some(vec![vec![[1.0, 2.0], [3.0, 4.0]]]));
  }

  #[test]
  fn from_shape_rejects_wrong_length() {
    let err = HostArray::from_shape(&[2, 2], &[1.0, 2.0, 3.0]).unwrap_err();
    assert_eq!(
      err,
      TensorError::ShapeMismatch {
        shape: vec![2, 2],
        expected: 4,
        actual: 3
      }
    );
  }

  #[test]
  fn from_shape_with_zero_dimension() {
    let array = HostArray::from_shape(&[0, 17, 2], &[]).unwrap();
    assert_eq!(array, HostArray::List(vec![]));
  }

  #[test]
  fn from_shape_rejects_oversized_shapes() {
    assert_eq!(
      HostArray::from_shape(&[usize::MAX, 2, 2], &[]),
      Err(TensorError::ShapeTooLarge(vec![usize::MAX, 2, 2]))
    );
    // 元素数为 0，但外层维度会生成大量空列表
    assert_eq!(
      HostArray::from_shape(&[1 << 40, 1 << 20, 0], &[]),
      Err(TensorError::ShapeTooLarge(vec![1 << 40, 1 << 20, 0]))
    );
    assert_eq!(
      HostArray::from_shape(&[2, 0, 3], &[]),
      Ok(HostArray::List(vec![HostArray::List(vec![]), HostArray::List(vec![])]))
    );
    assert_eq!(
      HostArray::from_shape(&[5, 0, 2], &[]).unwrap().as_list().map(<[_]>::len),
      Some(5)
    );
  }

  #[test]
  fn materialize_prefers_transfer() {
    let tensor = DeviceTensor {
      device: Device::Cuda(0),
      shape: vec![2],
      data: vec![0.5, 0.25],
    };
    assert_eq!(
      tensor.device_transfer().map(|transfer| transfer.device()),
      Some(&Device::Cuda(0))
    );
    let host = materialize(&tensor).unwrap();
    assert_eq!(host.to_vector(), Some(vec![0.5, 0.25]));

    let plain: HostArray = serde_json::from_str("[[0.1, 0.2]]").unwrap();
    assert_eq!(materialize(&plain).unwrap(), plain);

    let opaque = OpaqueValue(serde_json::json!("not numbers"));
    assert_eq!(materialize(&opaque), Err(TensorError::NotMaterializable));
  }

  #[test]
  fn rows_require_exact_width() {
    let boxes: HostArray = serde_json::from_str("[[0, 0, 10, 10], [1, 2, 3]]").unwrap();
    assert_eq!(boxes.to_rows::<4>(), None);
    assert_eq!(boxes.flatten().len(), 7);
  }
}
