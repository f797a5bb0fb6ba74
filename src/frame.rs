// 该文件是 YoloLite 项目的一部分。
// src/frame.rs - HWC 帧定义
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

use std::str::FromStr;

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("未知的通道顺序: {0}")]
  UnknownChannelOrder(String),
}

/// 像素通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl ChannelOrder {
  pub fn reversed(self) -> Self {
    match self {
      ChannelOrder::Rgb => ChannelOrder::Bgr,
      ChannelOrder::Bgr => ChannelOrder::Rgb,
    }
  }
}

impl FromStr for ChannelOrder {
  type Err = FrameError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb" => Ok(ChannelOrder::Rgb),
      "bgr" => Ok(ChannelOrder::Bgr),
      _ => Err(FrameError::UnknownChannelOrder(s.to_string())),
    }
  }
}

/// 原地交换第 0 与第 2 通道，连续调用两次恢复原图
pub fn reverse_channels_in_place(image: &mut RgbImage) {
  for pixel in image.pixels_mut() {
    pixel.0.swap(0, 2);
  }
}

/// 一帧 HWC 排布的 8 位三通道图像，附带通道顺序标记
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
  order: ChannelOrder,
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Self {
      image,
      order: ChannelOrder::Rgb,
    }
  }
}

impl Frame {
  pub fn new(image: RgbImage, order: ChannelOrder) -> Self {
    Self { image, order }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn order(&self) -> ChannelOrder {
    self.order
  }

  pub fn is_empty(&self) -> bool {
    self.image.width() == 0 || self.image.height() == 0
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn image_mut(&mut self) -> &mut RgbImage {
    &mut self.image
  }

  pub fn into_image(self) -> RgbImage {
    self.image
  }

  pub fn reverse_channels(&mut self) {
    reverse_channels_in_place(&mut self.image);
    self.order = self.order.reversed();
  }

  /// 以 RGB 顺序复制出图像，用于绘制与保存
  pub fn to_rgb_image(&self) -> RgbImage {
    let mut image = self.image.clone();
    if self.order == ChannelOrder::Bgr {
      reverse_channels_in_place(&mut image);
    }
    image
  }
}
