// 该文件是 YoloLite 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::preprocess::Ratio;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 轴对齐边界框，像素坐标 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  /// 由中心点与宽高构造
  pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn iou(&self, other: &BBox) -> f32 {
    let x1 = self.x1.max(other.x1);
    let y1 = self.y1.max(other.y1);
    let x2 = self.x2.min(other.x2);
    let y2 = self.y2.min(other.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }

  /// x 坐标乘 `ratio.x`，y 坐标乘 `ratio.y`
  pub fn scaled(&self, ratio: Ratio) -> Self {
    Self::new(
      self.x1 * ratio.x,
      self.y1 * ratio.y,
      self.x2 * ratio.x,
      self.y2 * ratio.y,
    )
  }

  pub fn shifted(&self, dx: f32, dy: f32) -> Self {
    Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: BBox,
}

/// 一次推理的检测结果，`bbox` 位于模型输入坐标系
#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
  pub ratio: Option<Ratio>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

mod detector;
mod labels;
mod nms;

pub use self::detector::{DetectorBuilder, DetectorConfig, ModelError, OnnxDetector, OutputLayout};
pub use self::labels::{COCO_CLASSES, Labels, LabelsError};
pub use self::nms::non_max_suppression;

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let a = BBox::new(10.0, 10.0, 20.0, 20.0);
    assert_relative_eq!(a.iou(&a), 1.0);
  }

  #[test]
  fn iou_of_disjoint_boxes_is_zero() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(20.0, 20.0, 30.0, 30.0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    let a = BBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BBox::new(5.0, 0.0, 15.0, 10.0);
    assert_relative_eq!(a.iou(&b), 50.0 / 150.0);
  }

  #[test]
  fn scaling_is_per_axis() {
    let b = BBox::new(10.0, 20.0, 30.0, 40.0).scaled(Ratio::new(2.0, 0.5));
    assert_eq!(b, BBox::new(20.0, 10.0, 60.0, 20.0));
  }

  #[test]
  fn center_form_converts_to_corners() {
    let b = BBox::from_cxcywh(50.0, 40.0, 20.0, 10.0);
    assert_eq!(b, BBox::new(40.0, 35.0, 60.0, 45.0));
  }
}
