// 该文件是 YoloLite 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  model::{BBox, COCO_CLASSES, DetectItem, DetectResult, Labels},
  preprocess::Ratio,
};

// 文本渲染常量
const LABEL_TEXT_COLOR: [u8; 3] = [225, 255, 255];
const LABEL_BASE_PX: f32 = 30.0; // 字号 1.0 对应的像素高度
const LABEL_PADDING: i32 = 3;

// 调色板的饱和度与明度
const PALETTE_SATURATION: f32 = 0.8;
const PALETTE_VALUE: f32 = 0.9;

/// 内置的默认字体
const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无法解析字体文件: {0}")]
  FontLoadError(PathBuf),
}

/// 由图像尺寸推导线宽
pub fn default_line_thickness(width: u32, height: u32) -> u32 {
  (0.002 * (width + height) as f32 / 2.0).round() as u32 + 1
}

/// 标签文字所用字体，默认使用内置的 DejaVu Sans
#[derive(Clone)]
pub struct LabelFont {
  font: FontArc,
}

impl Default for LabelFont {
  fn default() -> Self {
    Self::bundled()
  }
}

impl LabelFont {
  pub fn bundled() -> Self {
    let font = FontArc::try_from_slice(BUNDLED_FONT).expect("无法加载内置字体");
    Self { font }
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DrawError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font =
      FontArc::try_from_vec(data).map_err(|_| DrawError::FontLoadError(path.to_path_buf()))?;
    info!("加载字体文件: {}", path.display());
    Ok(Self { font })
  }

  /// 文字占用的宽高，宽度包含笔画加粗带来的偏移
  pub fn text_size(&self, text: &str, font_scale: f32, stroke: u32) -> (u32, u32) {
    let (w, h) = text_size(PxScale::from(LABEL_BASE_PX * font_scale), &self.font, text);
    (w + stroke.max(1) - 1, h)
  }

  fn draw_text(
    &self,
    image: &mut RgbImage,
    text: &str,
    (x, y): (i32, i32),
    font_scale: f32,
    stroke: u32,
  ) {
    let scale = PxScale::from(LABEL_BASE_PX * font_scale);
    // 横向错位重复绘制模拟笔画粗细
    for dx in 0..stroke.max(1) as i32 {
      draw_text_mut(image, Rgb(LABEL_TEXT_COLOR), x + dx, y, scale, &self.font, text);
    }
  }
}

/// 类别索引到颜色的固定映射，色相在类别间均匀分布
#[derive(Debug, Clone)]
pub struct Palette {
  colors: Vec<Rgb<u8>>,
}

impl Default for Palette {
  fn default() -> Self {
    Self::new(COCO_CLASSES.len())
  }
}

impl Palette {
  pub fn new(num_classes: usize) -> Self {
    Self::with_tone(num_classes, PALETTE_SATURATION, PALETTE_VALUE)
  }

  pub fn with_tone(num_classes: usize, saturation: f32, value: f32) -> Self {
    let n = num_classes.max(1);
    let step = 360.0 / n as f32;
    let colors = (0..n)
      .map(|i| Self::tone(i as f32 * step, saturation, value))
      .collect();
    Self { colors }
  }

  pub fn color(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  pub fn len(&self) -> usize {
    self.colors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }

  /// 色相 `hue` 取值 [0, 360)
  fn tone(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
    let chroma = value * saturation;
    let sector = (hue / 60.0).rem_euclid(6.0);
    let rising = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
    let base = value - chroma;

    let (r, g, b) = match sector as u32 {
      0 => (chroma, rising, 0.0),
      1 => (rising, chroma, 0.0),
      2 => (0.0, chroma, rising),
      3 => (0.0, rising, chroma),
      4 => (rising, 0.0, chroma),
      _ => (chroma, 0.0, rising),
    };
    Rgb([r, g, b].map(|c| ((c + base) * 255.0).round().clamp(0.0, 255.0) as u8))
  }
}

/// 在图像上绘制带标签的边界框
#[derive(Default)]
pub struct BoxRenderer {
  font: LabelFont,
  line_thickness: Option<u32>,
}

impl BoxRenderer {
  pub fn new(font: LabelFont) -> Self {
    Self {
      font,
      line_thickness: None,
    }
  }

  pub fn with_line_thickness(mut self, line_thickness: Option<u32>) -> Self {
    self.line_thickness = line_thickness;
    self
  }

  pub fn line_thickness(&self) -> Option<u32> {
    self.line_thickness
  }

  pub fn font(&self) -> &LabelFont {
    &self.font
  }

  /// 绘制一个边界框及其标签。
  ///
  /// `rescale` 为 `Some((rx, ry))` 时先把 x 坐标乘 `rx`、y 坐标乘 `ry`；
  /// `line_thickness` 为空时按图像尺寸推导。标签底色放在框的左上角上方，
  /// 上方空间不足时放进框内，所有绘制都裁剪到图像范围内。
  pub fn render(
    &self,
    image: &mut RgbImage,
    bbox: &BBox,
    label: Option<&str>,
    color: Rgb<u8>,
    line_thickness: Option<u32>,
    rescale: Option<Ratio>,
  ) {
    let bbox = match rescale {
      Some(ratio) => bbox.scaled(ratio),
      None => *bbox,
    };
    let (width, height) = image.dimensions();
    let tl = line_thickness
      .unwrap_or_else(|| default_line_thickness(width, height))
      .min(width.max(height))
      .max(1);

    // 角点限制在图像外扩一个线宽的范围内，非有限值不会溢出
    let margin = tl as f32;
    let clamp_x = |v: f32| v.clamp(-margin, width as f32 + margin) as i32;
    let clamp_y = |v: f32| v.clamp(-margin, height as f32 + margin) as i32;
    let (x1, y1, x2, y2) = (
      clamp_x(bbox.x1),
      clamp_y(bbox.y1),
      clamp_x(bbox.x2),
      clamp_y(bbox.y2),
    );
    let (left, right) = (x1.min(x2), x1.max(x2));
    let (top, bottom) = (y1.min(y2), y1.max(y2));

    draw_stroke(image, (left, top, right, bottom), tl, color);

    let visible = right >= 0 && bottom >= 0 && left < width as i32 && top < height as i32;
    let Some(label) = label.filter(|l| !l.is_empty() && visible) else {
      return;
    };

    let stroke = tl.saturating_sub(1).max(1);
    let font_scale = tl as f32 / 3.0;
    let (text_w, text_h) = self.font.text_size(label, font_scale, stroke);
    let tag_h = text_h as i32 + LABEL_PADDING;

    let tag_top = if top - tag_h >= 0 { top - tag_h } else { top };
    let tag_left = left.min(width as i32 - text_w as i32).max(0);
    debug!(
      "标签 '{}' 位于 ({}, {}) 尺寸 {}x{}",
      label, tag_left, tag_top, text_w, tag_h
    );

    draw_filled_rect_mut(
      image,
      Rect::at(tag_left, tag_top).of_size(text_w.max(1), tag_h as u32),
      color,
    );
    self
      .font
      .draw_text(image, label, (tag_left, tag_top + 1), font_scale, stroke);
  }

  pub fn draw_detections(
    &self,
    image: &mut RgbImage,
    result: &DetectResult,
    labels: &Labels,
    palette: &Palette,
  ) {
    for DetectItem {
      class_id,
      score,
      bbox,
    } in result.items.iter()
    {
      let label = format!("{} {:.2}", labels.name(*class_id), score);
      self.render(
        image,
        bbox,
        Some(&label),
        palette.color(*class_id),
        self.line_thickness,
        result.ratio,
      );
    }
  }
}

/// 以框边为中心绘制 `thickness` 像素宽的空心矩形
fn draw_stroke(
  image: &mut RgbImage,
  (left, top, right, bottom): (i32, i32, i32, i32),
  thickness: u32,
  color: Rgb<u8>,
) {
  let t = thickness as i32;
  for offset in -(t / 2)..(t - t / 2) {
    let w = right - left - 2 * offset + 1;
    let h = bottom - top - 2 * offset + 1;
    if w <= 0 || h <= 0 {
      continue;
    }
    let rect = Rect::at(left + offset, top + offset).of_size(w as u32, h as u32);
    draw_hollow_rect_mut(image, rect, color);
  }
}
