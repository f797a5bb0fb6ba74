// 该文件是 YoloLite 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use crate::model::DetectItem;

/// 按类别分别抑制，保留至多 `max_det` 个结果，按置信度降序
pub fn non_max_suppression(
  mut items: Vec<DetectItem>,
  iou_threshold: f32,
  max_det: usize,
) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::new();
  for item in items {
    if kept.len() >= max_det {
      break;
    }

    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && k.bbox.iou(&item.bbox) > iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }

  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BBox;

  fn item(class_id: u32, score: f32, x: f32) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox: BBox::new(x, 0.0, x + 10.0, 10.0),
    }
  }

  #[test]
  fn keeps_best_of_overlapping_same_class() {
    let kept = non_max_suppression(vec![item(0, 0.6, 1.0), item(0, 0.9, 0.0)], 0.45, 100);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].score, 0.9);
  }

  #[test]
  fn keeps_overlapping_boxes_of_other_classes() {
    let kept = non_max_suppression(vec![item(0, 0.6, 0.0), item(1, 0.9, 0.0)], 0.45, 100);
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].class_id, 1);
  }

  #[test]
  fn keeps_distant_boxes_of_same_class() {
    let kept = non_max_suppression(vec![item(3, 0.6, 0.0), item(3, 0.7, 50.0)], 0.45, 100);
    assert_eq!(kept.len(), 2);
  }

  #[test]
  fn truncates_to_max_det() {
    let items = (0..10).map(|i| item(0, i as f32 / 10.0, i as f32 * 100.0)).collect();
    let kept = non_max_suppression(items, 0.45, 3);
    assert_eq!(kept.len(), 3);
    assert_eq!(kept[0].score, 0.9);
  }

  #[test]
  fn empty_input_yields_empty_output() {
    assert!(non_max_suppression(Vec::new(), 0.45, 10).is_empty());
  }
}
