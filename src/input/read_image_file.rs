// 该文件是 YoloLite 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch: expected '{expected}', found '{found}'")]
  SchemaMismatch { expected: String, found: String },
  #[error("Image file not found: {0}")]
  NotFound(PathBuf),
  #[error("Image read error: {path}: {source}")]
  ImageReadError {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 单张图像输入，迭代时只产出一帧
pub struct ImageFileInput {
  path: PathBuf,
  image: Option<Frame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch {
        expected: Self::SCHEME.to_string(),
        found: url.scheme().to_string(),
      });
    }

    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref().to_path_buf();
    if !path.is_file() {
      error!("图像文件不存在: {}", path.display());
      return Err(ImageFileInputError::NotFound(path));
    }

    let now = Instant::now();
    let read_error = |source| ImageFileInputError::ImageReadError {
      path: path.clone(),
      source,
    };
    let image = ImageReader::open(&path)
      .map_err(|e| read_error(image::ImageError::IoError(e)))?
      .with_guessed_format()
      .map_err(|e| read_error(image::ImageError::IoError(e)))?
      .decode()
      .map_err(&read_error)?
      .to_rgb8();
    info!(
      "读取图像 {} ({}x{})，耗时: {:.2?}",
      path.display(),
      image.width(),
      image.height(),
      now.elapsed()
    );

    Ok(ImageFileInput {
      path,
      image: Some(Frame::from(image)),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}
