// 该文件是 Zitai （姿态） 项目的一部分。
// src/normalize.rs - 预测结果规范化
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

//! 把形态各异的模型输出转换为 [`CanonicalResult`]。
//!
//! 规范化过程从不返回错误：任何无法识别的形态都退化为空结果，
//! 缺失或形状不符的字段会被省略并记录警告。

use tracing::{info, warn};

use crate::model::{HostArray, InstancePayload, RawPrediction, Tensor, materialize};
use crate::record::CanonicalResult;

/// 规范化输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
  pub record: CanonicalResult,
  /// 所有关键点置信度的平均值，仅用于观测
  pub average_score: Option<f64>,
}

impl Normalized {
  pub fn has_keypoints(&self) -> bool {
    self.record.has_keypoints()
  }
}

pub fn normalize(prediction: &RawPrediction) -> Normalized {
  let container = match prediction {
    RawPrediction::MappingWithPredictions(_) | RawPrediction::BareSequence(_) => {
      prediction.container()
    }
    RawPrediction::Mapping => {
      warn!("预测结果中没有 predictions 字段");
      return Normalized::default();
    }
    RawPrediction::Unsupported => {
      warn!("无法识别的预测结果格式");
      return Normalized::default();
    }
  };

  let Some(container) = container else {
    warn!("预测结果列表为空");
    return Normalized::default();
  };

  match &container.pred_instances {
    Some(instances) => normalize_instances(instances),
    None => {
      warn!("预测结果中没有 pred_instances");
      Normalized::default()
    }
  }
}

fn normalize_instances(instances: &InstancePayload) -> Normalized {
  let keypoints = instances
    .keypoints
    .as_deref()
    .and_then(|tensor| host_field("keypoints", tensor))
    .and_then(|array| {
      let points = array.to_points();
      if points.is_none() {
        warn!("keypoints 形状应为 [实例][关键点][2]，已忽略");
      }
      points
    });
  if let Some(points) = &keypoints {
    info!("发现 {} 个实例的关键点", points.len());
  }

  let mut average_score = None;
  let keypoint_scores = instances
    .keypoint_scores
    .as_deref()
    .and_then(|tensor| host_field("keypoint_scores", tensor))
    .and_then(|array| {
      average_score = mean_score(&array.flatten());
      if let Some(average) = average_score {
        info!("平均置信度: {:.3}", average);
      }
      score_rows(&array)
    })
    .and_then(|scores| align_scores(keypoints.as_deref(), scores));

  let bboxes = instances
    .bboxes
    .as_deref()
    .and_then(|tensor| host_field("bboxes", tensor))
    .and_then(|array| {
      let boxes = array
        .to_rows::<4>()
        .or_else(|| array.to_vector()?.try_into().ok().map(|b: [f64; 4]| vec![b]));
      if boxes.is_none() {
        warn!("bboxes 形状应为 [实例][4]，已忽略");
      }
      boxes
    });
  if let Some(boxes) = &bboxes {
    info!("发现 {} 个边界框", boxes.len());
  }

  Normalized {
    record: CanonicalResult {
      keypoints,
      keypoint_scores,
      bboxes,
    },
    average_score,
  }
}

fn host_field(name: &str, tensor: &dyn Tensor) -> Option<HostArray> {
  materialize(tensor)
    .map_err(|e| warn!("字段 {} 无法读取: {}", name, e))
    .ok()
}

/// 置信度可能是 `[实例][关键点]`，也可能是单实例的扁平 `[关键点]`
fn score_rows(array: &HostArray) -> Option<Vec<Vec<f64>>> {
  let rows = array.to_matrix().or_else(|| array.to_vector().map(|flat| vec![flat]));
  if rows.is_none() {
    warn!("keypoint_scores 形状无法识别，已忽略");
  }
  rows
}

fn align_scores(keypoints: Option<&[Vec<[f64; 2]>]>, scores: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
  let Some(keypoints) = keypoints else {
    return Some(scores);
  };
  let aligned = keypoints.len() == scores.len()
    && keypoints
      .iter()
      .zip(&scores)
      .all(|(points, row)| points.len() == row.len());
  if aligned {
    Some(scores)
  } else {
    warn!("keypoint_scores 与 keypoints 数量不一致，已忽略");
    None
  }
}

/// 算术平均，空序列返回 `None`
pub fn mean_score(scores: &[f64]) -> Option<f64> {
  if scores.is_empty() {
    return None;
  }
  Some(scores.iter().sum::<f64>() / scores.len() as f64)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn normalize_json(value: serde_json::Value) -> Normalized {
    normalize(&RawPrediction::from_value(&value))
  }

  #[test]
  fn mapping_with_predictions() {
    let normalized = normalize_json(json!({"predictions": [{"pred_instances": {
      "keypoints": [[[10.0, 20.0], [30.0, 40.0]]],
      "keypoint_scores": [[0.9, 0.7]],
      "bboxes": [[0.0, 0.0, 64.0, 64.0]]
    }}]}));
    assert!(normalized.has_keypoints());
    assert_eq!(
      normalized.record,
      CanonicalResult {
        keypoints: Some(vec![vec![[10.0, 20.0], [30.0, 40.0]]]),
        keypoint_scores: Some(vec![vec![0.9, 0.7]]),
        bboxes: Some(vec![[0.0, 0.0, 64.0, 64.0]]),
      }
    );
  }

  #[test]
  fn mapping_without_predictions_is_empty() {
    let normalized = normalize_json(json!({"visualization": [1, 2, 3]}));
    assert!(!normalized.has_keypoints());
    assert!(normalized.record.is_empty());
  }

  #[test]
  fn bare_sequence_uses_first_container() {
    let normalized = normalize_json(json!([
      {"pred_instances": {"keypoints": [[[1, 2]]]}},
      {"pred_instances": {"keypoints": [[[9, 9]]]}}
    ]));
    assert!(normalized.has_keypoints());
    assert_eq!(normalized.record.keypoints, Some(vec![vec![[1.0, 2.0]]]));
  }

  #[test]
  fn missing_bboxes_is_not_an_error() {
    let normalized = normalize_json(json!([{"pred_instances": {"keypoints": [[[1, 2]]]}}]));
    assert!(normalized.has_keypoints());
    assert!(normalized.record.bboxes.is_none());
    assert!(normalized.record.keypoint_scores.is_none());
    assert_eq!(normalized.average_score, None);
  }

  #[test]
  fn missing_pred_instances_is_empty() {
    let normalized = normalize_json(json!({"predictions": [{"gt_instances": {}}]}));
    assert!(normalized.record.is_empty());
    assert!(normalize_json(json!({"predictions": []})).record.is_empty());
    assert!(normalize_json(json!(42)).record.is_empty());
  }

  #[test]
  fn empty_keypoints_report_none() {
    let normalized = normalize_json(json!([{"pred_instances": {"keypoints": []}}]));
    assert_eq!(normalized.record.keypoints, Some(vec![]));
    assert!(!normalized.has_keypoints());
  }

  #[test]
  fn average_over_nested_scores() {
    let normalized = normalize_json(json!([{"pred_instances": {
      "keypoint_scores": [[0.9, 0.1], [0.5]]
    }}]));
    let average = normalized.average_score.unwrap();
    assert!((average - 0.5).abs() < 1e-12);
    assert_eq!(
      normalized.record.keypoint_scores,
      Some(vec![vec![0.9, 0.1], vec![0.5]])
    );
  }

  #[test]
  fn mean_of_empty_is_none() {
    assert_eq!(mean_score(&[]), None);
    assert_eq!(mean_score(&[0.25, 0.75]), Some(0.5));
  }

  #[test]
  fn flat_scores_are_lifted_to_one_instance() {
    let normalized = normalize_json(json!([{"pred_instances": {
      "keypoints": [[[1, 1], [2, 2]]],
      "keypoint_scores": [0.4, 0.6]
    }}]));
    assert_eq!(normalized.record.keypoint_scores, Some(vec![vec![0.4, 0.6]]));
    assert!((normalized.average_score.unwrap() - 0.5).abs() < 1e-12);
  }

  #[test]
  fn misaligned_scores_are_dropped() {
    let normalized = normalize_json(json!([{"pred_instances": {
      "keypoints": [[[1, 1], [2, 2]]],
      "keypoint_scores": [[0.4, 0.6], [0.1, 0.2]]
    }}]));
    assert!(normalized.has_keypoints());
    assert!(normalized.record.keypoint_scores.is_none());
    assert!(normalized.average_score.is_some());
  }

  #[test]
  fn per_instance_length_mismatch_drops_scores() {
    let normalized = normalize_json(json!([{"pred_instances": {
      "keypoints": [[[1, 1], [2, 2]]],
      "keypoint_scores": [[0.4]]
    }}]));
    assert!(normalized.has_keypoints());
    assert_eq!(
      normalized.record.keypoints,
      Some(vec![vec![[1.0, 1.0], [2.0, 2.0]]])
    );
    assert!(normalized.record.keypoint_scores.is_none());
    assert_eq!(normalized.average_score, Some(0.4));
  }

  #[test]
  fn oversized_device_shape_is_omitted() {
    let normalized = normalize_json(json!({"predictions": [{"pred_instances": {
      "keypoints": {"device": "cuda:0", "shape": [4294967296u64, 4294967296u64, 2], "data": []},
      "keypoint_scores": {"device": "cuda:0", "shape": [4294967296u64, 4294967296u64, 0], "data": []},
      "bboxes": [[0, 0, 4, 4]]
    }}]}));
    assert!(!normalized.has_keypoints());
    assert!(normalized.record.keypoints.is_none());
    assert!(normalized.record.keypoint_scores.is_none());
    assert_eq!(normalized.record.bboxes, Some(vec![[0.0, 0.0, 4.0, 4.0]]));
  }

  #[test]
  fn device_tensors_are_transferred() {
    let normalized = normalize_json(json!({"predictions": [{"pred_instances": {
      "keypoints": {"device": "cuda:0", "shape": [1, 2, 2], "data": [1, 2, 3, 4]},
      "keypoint_scores": {"device": "cuda:0", "shape": [1, 2], "data": [0.5, 0.5]},
      "bboxes": {"device": "cuda:0", "shape": [1, 4], "data": [0, 0, 8, 8]}
    }}]}));
    assert_eq!(
      normalized.record,
      CanonicalResult {
        keypoints: Some(vec![vec![[1.0, 2.0], [3.0, 4.0]]]),
        keypoint_scores: Some(vec![vec![0.5, 0.5]]),
        bboxes: Some(vec![[0.0, 0.0, 8.0, 8.0]]),
      }
    );
  }

  #[test]
  fn broken_fields_are_omitted() {
    let normalized = normalize_json(json!([{"pred_instances": {
      "keypoints": {"device": "cuda:0", "shape": [1, 2, 2], "data": [1, 2, 3]},
      "bboxes": [[1, 2, 3]]
    }}]));
    assert!(normalized.record.is_empty());
    assert!(!normalized.has_keypoints());
  }

  #[test]
  fn single_flat_box_is_lifted() {
    let normalized = normalize_json(json!([{"pred_instances": {"bboxes": [1, 2, 3, 4]}}]));
    assert_eq!(normalized.record.bboxes, Some(vec![[1.0, 2.0, 3.0, 4.0]]));
  }
}
