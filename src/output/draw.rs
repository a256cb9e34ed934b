// 该文件是 Zitai （姿态） 项目的一部分。
// src/output/draw.rs - 姿态结果可视化
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

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::record::CanonicalResult;

// 置信度分档与颜色
const DEFAULT_THRESHOLD: f64 = 0.3;
const HIGH_CONFIDENCE: f64 = 0.7;
const MEDIUM_CONFIDENCE: f64 = 0.5;
const HIGH_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const MEDIUM_COLOR: [u8; 3] = [255, 255, 0]; // 黄色
const LOW_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const BBOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

const POINT_RADIUS: i32 = 2;
const RING_RADIUS: i32 = 4;

pub struct Draw {
  threshold: f64,
  bbox_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      bbox_color: BBOX_COLOR,
    }
  }
}

impl Draw {
  pub fn with_threshold(mut self, threshold: f64) -> Self {
    self.threshold = threshold;
    self
  }

  /// 低于阈值的关键点不绘制
  pub fn keypoint_color(&self, score: f64) -> Option<Rgb<u8>> {
    if score < self.threshold {
      None
    } else if score > HIGH_CONFIDENCE {
      Some(Rgb(HIGH_COLOR))
    } else if score > MEDIUM_CONFIDENCE {
      Some(Rgb(MEDIUM_COLOR))
    } else {
      Some(Rgb(LOW_COLOR))
    }
  }

  // 边框加粗为 2 像素
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f64; 4]) {
    let x_min = bbox[0].floor() as i32;
    let y_min = bbox[1].floor() as i32;
    let x_max = bbox[2].ceil() as i32;
    let y_max = bbox[3].ceil() as i32;

    for thickness in 0..2 {
      let width = x_max - x_min - 2 * thickness;
      let height = y_max - y_min - 2 * thickness;
      if width <= 0 || height <= 0 {
        return;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.bbox_color));
    }
  }

  /// 绘制全部边框以及第一个实例的关键点
  pub fn draw_result(&self, image: &mut RgbImage, result: &CanonicalResult) {
    for bbox in result.bboxes.iter().flatten() {
      self.draw_bbox(image, bbox);
    }

    for ([x, y], score) in result.scored_keypoints(0) {
      let Some(color) = self.keypoint_color(score) else {
        continue;
      };
      let center = (x as i32, y as i32);
      draw_filled_circle_mut(image, center, POINT_RADIUS, color);
      draw_hollow_circle_mut(image, center, RING_RADIUS, color);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn color_bands() {
    let draw = Draw::default();
    assert_eq!(draw.keypoint_color(0.2), None);
    assert_eq!(draw.keypoint_color(0.3), Some(Rgb(LOW_COLOR)));
    assert_eq!(draw.keypoint_color(0.6), Some(Rgb(MEDIUM_COLOR)));
    assert_eq!(draw.keypoint_color(0.95), Some(Rgb(HIGH_COLOR)));
    assert_eq!(draw.with_threshold(0.9).keypoint_color(0.8), None);
  }

  #[test]
  fn draws_points_and_boxes() {
    let mut image = RgbImage::new(32, 32);
    let result = CanonicalResult {
      keypoints: Some(vec![vec![[8.0, 8.0], [20.0, 20.0]]]),
      keypoint_scores: Some(vec![vec![0.9, 0.1]]),
      bboxes: Some(vec![[2.0, 2.0, 28.0, 28.0]]),
    };
    Draw::default().draw_result(&mut image, &result);

    assert_eq!(*image.get_pixel(8, 8), Rgb(HIGH_COLOR));
    assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(2, 15), Rgb(BBOX_COLOR));
    assert_eq!(*image.get_pixel(3, 15), Rgb(BBOX_COLOR));
  }
}
