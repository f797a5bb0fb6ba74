// 该文件是 YoloLite 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::{
  path::{Path, PathBuf},
  time::Instant,
};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{DetectResult, Labels},
  output::{
    Render,
    draw::{BoxRenderer, Palette},
  },
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  renderer: BoxRenderer,
  labels: Labels,
  palette: Palette,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(uri.path()))
  }
}

impl SaveImageFileOutput {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    let labels = Labels::default();
    Self {
      path: path.as_ref().to_path_buf(),
      renderer: BoxRenderer::default(),
      palette: Palette::new(labels.len()),
      labels,
    }
  }

  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.palette = Palette::new(labels.len());
    self.labels = labels;
    self
  }

  pub fn with_renderer(mut self, renderer: BoxRenderer) -> Self {
    self.renderer = renderer;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<Frame, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let now = Instant::now();
    let mut image = frame.to_rgb_image();
    self
      .renderer
      .draw_detections(&mut image, result, &self.labels, &self.palette);
    info!("绘制 {} 个检测框，耗时: {:.2?}", result.len(), now.elapsed());
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{BBox, DetectItem};
  use image::{Rgb, RgbImage};

  #[test]
  fn saves_annotated_image_creating_parent_dirs() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested/out/result.png");
    let output = SaveImageFileOutput::new(&path);

    let frame = Frame::from(RgbImage::from_pixel(64, 48, Rgb([0, 0, 0])));
    let result = DetectResult {
      items: vec![DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: BBox::new(10.0, 20.0, 40.0, 40.0),
      }]
      .into_boxed_slice(),
      ratio: None,
    };
    output.render_result(&frame, &result)?;

    let saved = image::open(&path)?.to_rgb8();
    assert_eq!(saved.dimensions(), (64, 48));
    assert_eq!(*saved.get_pixel(10, 30), Palette::default().color(0));
    assert_eq!(*saved.get_pixel(25, 30), Rgb([0, 0, 0]));
    Ok(())
  }

  #[test]
  fn wrong_scheme_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse("json:///tmp/out.json")?;
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
    Ok(())
  }
}
