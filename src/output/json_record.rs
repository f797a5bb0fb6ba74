// 该文件是 YoloLite 项目的一部分。
// src/output/json_record.rs - 检测结果 JSON 记录
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

use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{BBox, DetectResult, Labels},
  output::Render,
};

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 单个检测结果的记录，坐标位于原图坐标系
#[derive(Debug, Serialize)]
pub struct DetectionRecord<'a> {
  pub class_id: u32,
  pub label: &'a str,
  pub score: f32,
  pub bbox: BBox,
}

#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
  width: u32,
  height: u32,
  detections: Vec<DetectionRecord<'a>>,
}

/// 把检测结果以 JSON 写入文件，不绘制图像
pub struct JsonRecordOutput {
  path: PathBuf,
  labels: Labels,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(uri.path()))
  }
}

impl JsonRecordOutput {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      labels: Labels::default(),
    }
  }

  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<Frame, DetectResult> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let names: Vec<_> = result
      .items
      .iter()
      .map(|item| self.labels.name(item.class_id))
      .collect();

    let detections = result
      .items
      .iter()
      .zip(names.iter())
      .map(|(item, name)| DetectionRecord {
        class_id: item.class_id,
        label: name,
        score: item.score,
        bbox: match result.ratio {
          Some(ratio) => item.bbox.scaled(ratio),
          None => item.bbox,
        },
      })
      .collect();

    let record = FrameRecord {
      width: frame.width(),
      height: frame.height(),
      detections,
    };

    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;
    warn!("保存检测记录到文件: {}", self.path.display());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{model::DetectItem, preprocess::Ratio};
  use approx::assert_relative_eq;
  use image::RgbImage;

  #[test]
  fn records_rescaled_boxes_with_names() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.json");
    let output = JsonRecordOutput::new(&path)
      .with_labels(Labels::new(vec!["cat".to_string(), "dog".to_string()]));

    let frame = Frame::from(RgbImage::new(640, 480));
    let result = DetectResult {
      items: vec![
        DetectItem {
          class_id: 1,
          score: 0.75,
          bbox: BBox::new(10.0, 20.0, 30.0, 40.0),
        },
        DetectItem {
          class_id: 7,
          score: 0.5,
          bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
        },
      ]
      .into_boxed_slice(),
      ratio: Some(Ratio::new(2.0, 1.5)),
    };
    output.render_result(&frame, &result)?;

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(value["width"], 640);
    assert_eq!(value["height"], 480);
    let detections = value["detections"].as_array().ok_or("detections")?;
    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0]["label"], "dog");
    assert_eq!(detections[1]["label"], "7");
    assert_relative_eq!(detections[0]["bbox"]["x2"].as_f64().ok_or("x2")?, 60.0);
    assert_relative_eq!(detections[0]["bbox"]["y2"].as_f64().ok_or("y2")?, 60.0);
    Ok(())
  }

  #[test]
  fn empty_result_writes_empty_list() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty.json");
    let frame = Frame::from(RgbImage::new(4, 4));
    let result = DetectResult {
      items: Box::new([]),
      ratio: None,
    };
    JsonRecordOutput::new(&path).render_result(&frame, &result)?;

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert!(value["detections"].as_array().ok_or("detections")?.is_empty());
    Ok(())
  }
}
