// 该文件是 Zitai （姿态） 项目的一部分。
// src/record.rs - 规范化的姿态结果
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

use serde::{Deserialize, Serialize};

/// 单张图像的姿态结果，缺失的字段不会出现在 JSON 中
///
/// `keypoints` 与 `keypoint_scores` 按实例、按关键点一一对应。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
  /// `[instance][keypoint][x, y]`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub keypoints: Option<Vec<Vec<[f64; 2]>>>,
  /// `[instance][keypoint]`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub keypoint_scores: Option<Vec<Vec<f64>>>,
  /// `[instance][x1, y1, x2, y2]`
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bboxes: Option<Vec<[f64; 4]>>,
}

impl CanonicalResult {
  pub fn is_empty(&self) -> bool {
    self.keypoints.is_none() && self.keypoint_scores.is_none() && self.bboxes.is_none()
  }

  /// 至少有一个实例带有关键点
  pub fn has_keypoints(&self) -> bool {
    self
      .keypoints
      .as_ref()
      .is_some_and(|instances| instances.iter().any(|points| !points.is_empty()))
  }

  /// 某个实例的关键点及其置信度，缺少置信度时视为 1.0
  pub fn scored_keypoints(&self, instance: usize) -> Vec<([f64; 2], f64)> {
    let Some(points) = self.keypoints.as_ref().and_then(|k| k.get(instance)) else {
      return Vec::new();
    };
    let scores = self.keypoint_scores.as_ref().and_then(|s| s.get(instance));
    points
      .iter()
      .enumerate()
      .map(|(i, point)| (*point, scores.and_then(|s| s.get(i)).copied().unwrap_or(1.0)))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn absent_fields_are_omitted() {
    let result = CanonicalResult {
      keypoints: Some(vec![vec![[1.0, 2.0]]]),
      ..Default::default()
    };
    let text = serde_json::to_string(&result).unwrap();
    assert_eq!(text, r#"{"keypoints":[[[1.0,2.0]]]}"#);

    let empty: CanonicalResult = serde_json::from_str("{}").unwrap();
    assert!(empty.is_empty());
    assert!(!empty.has_keypoints());
  }

  #[test]
  fn instances_without_points_do_not_count() {
    let result = CanonicalResult {
      keypoints: Some(vec![vec![]]),
      ..Default::default()
    };
    assert!(!result.has_keypoints());
  }

  #[test]
  fn scored_keypoints_pairs_scores() {
    let result = CanonicalResult {
      keypoints: Some(vec![vec![[1.0, 2.0], [3.0, 4.0]]]),
      keypoint_scores: Some(vec![vec![0.9]]),
      bboxes: None,
    };
    assert_eq!(
      result.scored_keypoints(0),
      vec![([1.0, 2.0], 0.9), ([3.0, 4.0], 1.0)]
    );
    assert!(result.scored_keypoints(1).is_empty());
  }
}
