// 该文件是 Zitai （姿态） 项目的一部分。
// src/model/prediction.rs - 模型原始预测结果
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

use serde_json::{Map, Value};

use super::tensor::{Device, DeviceTensor, HostArray, OpaqueValue, Tensor};

const PREDICTIONS_KEY: &str = "predictions";
const PRED_INSTANCES_KEY: &str = "pred_instances";
const KEYPOINTS_KEY: &str = "keypoints";
const KEYPOINT_SCORES_KEY: &str = "keypoint_scores";
const BBOXES_KEY: &str = "bboxes";

/// 单张图像中所有实例的检测数据
#[derive(Debug, Default)]
pub struct InstancePayload {
  pub keypoints: Option<Box<dyn Tensor>>,
  pub keypoint_scores: Option<Box<dyn Tensor>>,
  pub bboxes: Option<Box<dyn Tensor>>,
}

/// 检测容器，可能不带实例数据
#[derive(Debug, Default)]
pub struct DetectionContainer {
  pub pred_instances: Option<InstancePayload>,
}

/// 模型一次推理的原始输出
///
/// 历史上出现过的几种形态都在这里显式列出，其余形态归入 `Unsupported`。
#[derive(Debug)]
pub enum RawPrediction {
  /// 带 `predictions` 字段的映射
  MappingWithPredictions(Vec<DetectionContainer>),
  /// 不带 `predictions` 字段的映射
  Mapping,
  /// 直接给出的检测容器序列
  BareSequence(Vec<DetectionContainer>),
  Unsupported,
}

impl RawPrediction {
  pub fn from_value(value: &Value) -> Self {
    match value {
      Value::Object(map) => match map.get(PREDICTIONS_KEY) {
        Some(Value::Array(items)) => {
          RawPrediction::MappingWithPredictions(items.iter().map(DetectionContainer::from_value).collect())
        }
        Some(_) => RawPrediction::Unsupported,
        None => RawPrediction::Mapping,
      },
      Value::Array(items) => {
        RawPrediction::BareSequence(items.iter().map(DetectionContainer::from_value).collect())
      }
      _ => RawPrediction::Unsupported,
    }
  }

  pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    Ok(Self::from_value(&value))
  }

  /// 第一个检测容器
  pub fn container(&self) -> Option<&DetectionContainer> {
    match self {
      RawPrediction::MappingWithPredictions(items) | RawPrediction::BareSequence(items) => {
        items.first()
      }
      RawPrediction::Mapping | RawPrediction::Unsupported => None,
    }
  }
}

impl DetectionContainer {
  pub fn from_value(value: &Value) -> Self {
    let pred_instances = value
      .as_object()
      .and_then(|map| map.get(PRED_INSTANCES_KEY))
      .and_then(Value::as_object)
      .map(InstancePayload::from_map);
    DetectionContainer { pred_instances }
  }
}

impl InstancePayload {
  pub fn from_map(map: &Map<String, Value>) -> Self {
    InstancePayload {
      keypoints: map.get(KEYPOINTS_KEY).map(tensor_from_value),
      keypoint_scores: map.get(KEYPOINT_SCORES_KEY).map(tensor_from_value),
      bboxes: map.get(BBOXES_KEY).map(tensor_from_value),
    }
  }
}

/// 解析字段值：嵌套数组视为主机数据，`{device, shape, data}` 视为设备张量
pub fn tensor_from_value(value: &Value) -> Box<dyn Tensor> {
  if value.is_array() {
    if let Ok(array) = serde_json::from_value::<HostArray>(value.clone()) {
      return Box::new(array);
    }
  }
  if let Some(tensor) = device_tensor_from_value(value) {
    return Box::new(tensor);
  }
  Box::new(OpaqueValue(value.clone()))
}

fn device_tensor_from_value(value: &Value) -> Option<DeviceTensor> {
  let map = value.as_object()?;
  let device = map.get("device")?.as_str()?.parse::<Device>().ok()?;
  let shape = map
    .get("shape")?
    .as_array()?
    .iter()
    .map(|dim| dim.as_u64().and_then(|dim| usize::try_from(dim).ok()))
    .collect::<Option<Vec<_>>>()?;
  let data = map
    .get("data")?
    .as_array()?
    .iter()
    .map(Value::as_f64)
    .collect::<Option<Vec<_>>>()?;
  Some(DeviceTensor {
    device,
    shape,
    data,
  })
}
