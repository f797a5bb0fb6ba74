// 该文件是 YoloLite 项目的一部分。
// src/preprocess.rs - 模型输入预处理
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

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use ndarray::{Array3, Array4, ArrayD, Axis, Ix4};
use thiserror::Error;
use tracing::debug;

use crate::frame::{ChannelOrder, Frame, reverse_channels_in_place};

/// 信箱填充使用的灰度值
pub const LETTERBOX_PAD_VALUE: u8 = 114;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("目标尺寸不能为 0: {0}x{1}")]
  ZeroTargetSize(u32, u32),
  #[error("步长不能为 0")]
  ZeroStride,
  #[error("输入图像为空")]
  EmptyImage,
  #[error("张量形状不支持: {0:?}")]
  BatchShape(Vec<usize>),
}

/// 模型输入坐标系到原图坐标系的逐轴比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratio {
  pub x: f32,
  pub y: f32,
}

impl Ratio {
  pub const IDENTITY: Ratio = Ratio { x: 1.0, y: 1.0 };

  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
  pub width: u32,
  pub height: u32,
}

impl TargetSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub fn square(size: u32) -> Self {
    Self::new(size, size)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
  /// 直接拉伸到目标尺寸
  Resize,
  /// 保持长宽比缩放并填充，`auto` 时只填充到 `stride` 的整数倍
  Letterbox { stride: u32, auto: bool },
}

/// 信箱缩放的几何参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
  pub content_width: u32,
  pub content_height: u32,
  pub canvas_width: u32,
  pub canvas_height: u32,
  pub pad_left: u32,
  pub pad_top: u32,
}

impl Letterbox {
  pub fn compute(
    src_width: u32,
    src_height: u32,
    target: TargetSize,
    stride: u32,
    auto: bool,
  ) -> Result<Self, PreprocessError> {
    if src_width == 0 || src_height == 0 {
      return Err(PreprocessError::EmptyImage);
    }
    if target.width == 0 || target.height == 0 {
      return Err(PreprocessError::ZeroTargetSize(target.width, target.height));
    }
    if stride == 0 {
      return Err(PreprocessError::ZeroStride);
    }

    let r = (target.width as f32 / src_width as f32).min(target.height as f32 / src_height as f32);
    let content_width = ((src_width as f32 * r).round() as u32).clamp(1, target.width);
    let content_height = ((src_height as f32 * r).round() as u32).clamp(1, target.height);

    let mut dw = target.width - content_width;
    let mut dh = target.height - content_height;
    if auto {
      dw %= stride;
      dh %= stride;
    }

    // 填充量均分到两侧，奇数时多出的一个像素落在右/下侧
    let (half_w, half_h) = (dw as f32 / 2.0, dh as f32 / 2.0);
    let pad_left = (half_w - 0.1).round() as u32;
    let pad_right = (half_w + 0.1).round() as u32;
    let pad_top = (half_h - 0.1).round() as u32;
    let pad_bottom = (half_h + 0.1).round() as u32;

    Ok(Self {
      content_width,
      content_height,
      canvas_width: content_width + pad_left + pad_right,
      canvas_height: content_height + pad_top + pad_bottom,
      pad_left,
      pad_top,
    })
  }
}

/// 预处理结果
#[derive(Debug, Clone)]
pub struct PreparedInput {
  /// NCHW，批维度恒为 1
  pub tensor: Array4<f32>,
  /// 去除 `pad` 后的模型坐标乘以该比例即为原图坐标
  pub ratio: Ratio,
  /// 左侧与上侧的填充像素数
  pub pad: (f32, f32),
}

pub fn normalize_pixel(value: u8) -> f32 {
  value as f32 / 255.0
}

/// HWC u8 图像转为归一化的 CHW 张量
pub fn to_chw_tensor(image: &RgbImage) -> Array3<f32> {
  let (width, height) = image.dimensions();
  Array3::from_shape_fn(
    (RGB_CHANNELS, height as usize, width as usize),
    |(c, y, x)| normalize_pixel(image.get_pixel(x as u32, y as u32)[c]),
  )
}

/// 缺少批维度时在最前面补一个大小为 1 的维度
pub fn ensure_batch(tensor: ArrayD<f32>) -> Result<ArrayD<f32>, PreprocessError> {
  match tensor.ndim() {
    3 => Ok(tensor.insert_axis(Axis(0))),
    4 if tensor.shape()[0] == 1 => Ok(tensor),
    _ => Err(PreprocessError::BatchShape(tensor.shape().to_vec())),
  }
}

fn resize_to(image: &RgbImage, width: u32, height: u32) -> RgbImage {
  if image.dimensions() == (width, height) {
    image.clone()
  } else {
    imageops::resize(image, width, height, FilterType::Triangle)
  }
}

/// 缩放或信箱化图像，按需翻转通道，归一化并补齐批维度
pub fn prepare(
  frame: &Frame,
  target: TargetSize,
  mode: ResizeMode,
  model_order: ChannelOrder,
) -> Result<PreparedInput, PreprocessError> {
  if frame.is_empty() {
    return Err(PreprocessError::EmptyImage);
  }
  if target.width == 0 || target.height == 0 {
    return Err(PreprocessError::ZeroTargetSize(target.width, target.height));
  }

  let (src_width, src_height) = (frame.width(), frame.height());

  let (mut canvas, ratio, pad) = match mode {
    ResizeMode::Resize => {
      let canvas = resize_to(frame.image(), target.width, target.height);
      let ratio = Ratio::new(
        src_width as f32 / target.width as f32,
        src_height as f32 / target.height as f32,
      );
      (canvas, ratio, (0.0, 0.0))
    }
    ResizeMode::Letterbox { stride, auto } => {
      let geometry = Letterbox::compute(src_width, src_height, target, stride, auto)?;
      debug!("信箱参数: {:?}", geometry);

      let content = resize_to(
        frame.image(),
        geometry.content_width,
        geometry.content_height,
      );
      let mut canvas = RgbImage::from_pixel(
        geometry.canvas_width,
        geometry.canvas_height,
        Rgb([LETTERBOX_PAD_VALUE; 3]),
      );
      imageops::replace(
        &mut canvas,
        &content,
        geometry.pad_left as i64,
        geometry.pad_top as i64,
      );

      let ratio = Ratio::new(
        src_width as f32 / geometry.content_width as f32,
        src_height as f32 / geometry.content_height as f32,
      );
      let pad = (geometry.pad_left as f32, geometry.pad_top as f32);
      (canvas, ratio, pad)
    }
  };

  if frame.order() != model_order {
    reverse_channels_in_place(&mut canvas);
  }

  let tensor = ensure_batch(to_chw_tensor(&canvas).into_dyn())?
    .into_dimensionality::<Ix4>()
    .map_err(|_| PreprocessError::BatchShape(vec![]))?;

  Ok(PreparedInput { tensor, ratio, pad })
}
