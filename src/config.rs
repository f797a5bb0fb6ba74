// 该文件是 YoloLite 项目的一部分。
// src/config.rs - 运行参数配置
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

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  input::{InputError, InputWrapper},
  model::{DetectorBuilder, Labels, LabelsError, ModelError, OnnxDetector},
  output::{BoxRenderer, DrawError, LabelFont, OutputError, OutputWrapper},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("标签文件错误: {0}")]
  LabelsError(#[from] LabelsError),
  #[error("绘制配置错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("模型错误: {0}")]
  ModelError(#[from] ModelError),
  #[error("输入错误: {0}")]
  InputError(#[from] InputError),
  #[error("输出错误: {0}")]
  OutputError(#[from] OutputError),
}

/// YoloLite 检测参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct DetectConfig {
  /// 模型地址，例如 yolov7:///models/yolov7-tiny.onnx?size=320
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 image:///data/horses.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，image:///out.png 或 json:///out.json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别名称文件（JSON 字符串数组或每行一个名称），默认 COCO
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 标签字体文件（TTF/OTF），缺省时使用内置的 DejaVu Sans
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,
  /// 边框线宽，缺省时按图像尺寸推导
  #[arg(long, value_name = "PIXELS")]
  pub line_thickness: Option<u32>,
  /// 置信度阈值，覆盖模型地址中的 conf
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,
  /// NMS IoU 阈值，覆盖模型地址中的 iou
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
}

impl DetectConfig {
  pub fn labels(&self) -> Result<Labels, ConfigError> {
    match &self.labels {
      Some(path) => Ok(Labels::from_file(path)?),
      None => Ok(Labels::default()),
    }
  }

  pub fn renderer(&self) -> Result<BoxRenderer, ConfigError> {
    let font = match &self.font {
      Some(path) => LabelFont::from_file(path)?,
      None => LabelFont::default(),
    };
    Ok(BoxRenderer::new(font).with_line_thickness(self.line_thickness))
  }

  pub fn detector_builder(&self) -> Result<DetectorBuilder, ConfigError> {
    let mut builder = DetectorBuilder::from_url(&self.model)?;
    if let Some(confidence) = self.confidence {
      builder = builder.confidence(confidence);
    }
    if let Some(iou) = self.iou {
      builder = builder.iou(iou);
    }
    Ok(builder)
  }

  pub fn detector(&self) -> Result<OnnxDetector, ConfigError> {
    Ok(self.detector_builder()?.build()?)
  }

  pub fn input(&self) -> Result<InputWrapper, ConfigError> {
    Ok(InputWrapper::from_url(&self.input)?)
  }

  pub fn output(&self) -> Result<OutputWrapper, ConfigError> {
    let output = OutputWrapper::from_url(&self.output)?
      .with_labels(self.labels()?)
      .with_renderer(self.renderer()?);
    Ok(output)
  }

  pub fn log_summary(&self) {
    info!("模型地址: {}", self.model);
    info!("输入来源: {}", self.input);
    info!("输出路径: {}", self.output);
    if let Some(labels) = &self.labels {
      info!("标签文件: {}", labels.display());
    }
    if let Some(font) = &self.font {
      info!("字体文件: {}", font.display());
    }
  }
}
