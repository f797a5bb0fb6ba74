// 该文件是 YoloLite 项目的一部分。
// src/model/detector.rs - ONNX YOLO 检测器
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

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  frame::{ChannelOrder, Frame},
  model::{BBox, DetectItem, DetectResult, Model, non_max_suppression},
  preprocess::{PreparedInput, PreprocessError, ResizeMode, TargetSize, prepare},
};

const YOLOV7_SCHEME: &str = "yolov7";
const YOLO_E2E_SCHEME: &str = "yolo-e2e";

const YOLOV7_INPUT_SIZE: u32 = 320;
const YOLOV7_STRIDE: u32 = 32;
const YOLO_E2E_INPUT_SIZE: u32 = 640;
const DEFAULT_CONF_THRESH: f32 = 0.25;
const DEFAULT_IOU_THRESH: f32 = 0.45;
const DEFAULT_MAX_DET: usize = 300;

/// 原始输出每行: cx, cy, w, h, obj, cls...
const RAW_BOX_FIELDS: usize = 5;
/// 端到端输出每行: batch, x1, y1, x2, y2, cls, score
const E2E_ROW_FIELDS: usize = 7;

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型加载错误: {path}: {message}")]
  ModelLoadError { path: PathBuf, message: String },
  #[error("推理错误: {0}")]
  InferenceError(#[from] ort::Error),
  #[error("模型输出形状不符: {0}")]
  OutputShapeError(String),
  #[error("参数 {name} 取值无效: {value}")]
  InvalidParameter { name: String, value: String },
  #[error("预处理错误: {0}")]
  PreprocessError(#[from] PreprocessError),
}

impl ModelError {
  fn invalid(name: &str, value: impl ToString) -> Self {
    ModelError::InvalidParameter {
      name: name.to_string(),
      value: value.to_string(),
    }
  }
}

/// 模型输出的排布方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
  /// 未经 NMS 的原始候选框 `[1, N, 5 + nc]`
  Raw,
  /// 已内置 NMS 的导出 `[N, 7]`
  EndToEnd,
}

impl OutputLayout {
  pub fn scheme(&self) -> &'static str {
    match self {
      OutputLayout::Raw => YOLOV7_SCHEME,
      OutputLayout::EndToEnd => YOLO_E2E_SCHEME,
    }
  }
}

/// 检测器的全部运行参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
  pub model_path: PathBuf,
  pub layout: OutputLayout,
  pub input_size: TargetSize,
  pub resize: ResizeMode,
  pub channel_order: ChannelOrder,
  pub confidence: f32,
  pub iou: f32,
  pub max_detections: usize,
}

impl DetectorConfig {
  pub fn yolov7<P: Into<PathBuf>>(model_path: P) -> Self {
    Self {
      model_path: model_path.into(),
      layout: OutputLayout::Raw,
      input_size: TargetSize::square(YOLOV7_INPUT_SIZE),
      resize: ResizeMode::Letterbox {
        stride: YOLOV7_STRIDE,
        auto: false,
      },
      channel_order: ChannelOrder::Rgb,
      confidence: DEFAULT_CONF_THRESH,
      iou: DEFAULT_IOU_THRESH,
      max_detections: DEFAULT_MAX_DET,
    }
  }

  pub fn end_to_end<P: Into<PathBuf>>(model_path: P) -> Self {
    Self {
      model_path: model_path.into(),
      layout: OutputLayout::EndToEnd,
      input_size: TargetSize::square(YOLO_E2E_INPUT_SIZE),
      resize: ResizeMode::Resize,
      channel_order: ChannelOrder::Rgb,
      confidence: DEFAULT_CONF_THRESH,
      iou: DEFAULT_IOU_THRESH,
      max_detections: DEFAULT_MAX_DET,
    }
  }
}

pub struct DetectorBuilder {
  config: DetectorConfig,
  intra_threads: Option<usize>,
}

fn parse_param<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ModelError> {
  value.parse().map_err(|_| ModelError::invalid(name, value))
}

fn parse_size(value: &str) -> Result<TargetSize, ModelError> {
  match value.split_once(['x', 'X']) {
    Some((w, h)) => Ok(TargetSize::new(
      parse_param("size", w)?,
      parse_param("size", h)?,
    )),
    None => Ok(TargetSize::square(parse_param("size", value)?)),
  }
}

impl FromUrl for DetectorBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let path = url.path();
    if path.is_empty() {
      return Err(ModelError::ModelPathError(format!("URL 中缺少模型路径: {}", url)));
    }

    let mut config = match url.scheme() {
      YOLOV7_SCHEME => DetectorConfig::yolov7(path),
      YOLO_E2E_SCHEME => DetectorConfig::end_to_end(path),
      other => {
        return Err(ModelError::ModelPathError(format!(
          "模型路径必须使用 {} 或 {} 方案, 实际为 {}",
          YOLOV7_SCHEME, YOLO_E2E_SCHEME, other
        )));
      }
    };

    let mut intra_threads = None;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "size" => config.input_size = parse_size(&value)?,
        "conf" => config.confidence = parse_param("conf", &value)?,
        "iou" => config.iou = parse_param("iou", &value)?,
        "max_det" => config.max_detections = parse_param("max_det", &value)?,
        "order" => {
          config.channel_order = value
            .parse()
            .map_err(|_| ModelError::invalid("order", &value))?
        }
        "stride" | "auto" => {
          let (mut stride, mut auto) = match config.resize {
            ResizeMode::Letterbox { stride, auto } => (stride, auto),
            ResizeMode::Resize => (YOLOV7_STRIDE, false),
          };
          if key == "stride" {
            stride = parse_param("stride", &value)?;
          } else {
            auto = parse_param("auto", &value)?;
          }
          config.resize = ResizeMode::Letterbox { stride, auto };
        }
        "threads" => intra_threads = Some(parse_param("threads", &value)?),
        other => warn!("忽略未知的模型参数: {}={}", other, value),
      }
    }

    Ok(DetectorBuilder {
      config,
      intra_threads,
    })
  }
}

impl DetectorBuilder {
  pub fn new(config: DetectorConfig) -> Self {
    Self {
      config,
      intra_threads: None,
    }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.config.confidence = confidence;
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.config.iou = iou;
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.config.max_detections = max_detections;
    self
  }

  pub fn input_size(mut self, input_size: TargetSize) -> Self {
    self.config.input_size = input_size;
    self
  }

  pub fn resize_mode(mut self, resize: ResizeMode) -> Self {
    self.config.resize = resize;
    self
  }

  pub fn channel_order(mut self, order: ChannelOrder) -> Self {
    self.config.channel_order = order;
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  /// ONNX Runtime 单算子内的线程数，空值使用运行时默认值
  pub fn threads(&self) -> Option<usize> {
    self.intra_threads
  }

  fn validate(&self) -> Result<(), ModelError> {
    let config = &self.config;
    if !(0.0..=1.0).contains(&config.confidence) {
      return Err(ModelError::invalid("conf", config.confidence));
    }
    if !(0.0..=1.0).contains(&config.iou) {
      return Err(ModelError::invalid("iou", config.iou));
    }
    if config.max_detections == 0 {
      return Err(ModelError::invalid("max_det", config.max_detections));
    }
    if config.input_size.width == 0 || config.input_size.height == 0 {
      return Err(ModelError::invalid(
        "size",
        format!("{}x{}", config.input_size.width, config.input_size.height),
      ));
    }
    if let ResizeMode::Letterbox { stride: 0, .. } = config.resize {
      return Err(ModelError::invalid("stride", 0));
    }
    Ok(())
  }

  pub fn build(self) -> Result<OnnxDetector, ModelError> {
    self.validate()?;

    let path = self.config.model_path.clone();
    if !path.is_file() {
      error!("模型文件不存在: {}", path.display());
      return Err(ModelError::ModelNotFound(path));
    }

    info!("加载模型文件: {}", path.display());
    let now = Instant::now();
    let session = load_session(&path, self.intra_threads).map_err(|message| {
      error!("模型加载失败: {}", message);
      ModelError::ModelLoadError {
        path: path.clone(),
        message,
      }
    })?;
    info!("模型加载完成，耗时: {:.2?}", now.elapsed());

    for input in session.inputs.iter() {
      debug!("模型输入: {}", input.name);
    }
    for output in session.outputs.iter() {
      debug!("模型输出: {}", output.name);
    }

    Ok(OnnxDetector {
      session,
      config: self.config,
    })
  }
}

fn load_session(path: &Path, intra_threads: Option<usize>) -> Result<Session, String> {
  let mut builder = Session::builder()
    .map_err(|e| e.to_string())?
    .with_optimization_level(GraphOptimizationLevel::Level3)
    .map_err(|e| e.to_string())?;
  if let Some(threads) = intra_threads {
    builder = builder
      .with_intra_threads(threads)
      .map_err(|e| e.to_string())?;
  }
  builder.commit_from_file(path).map_err(|e| e.to_string())
}

/// 基于 ONNX Runtime 的 YOLO 检测器
pub struct OnnxDetector {
  session: Session,
  config: DetectorConfig,
}

impl OnnxDetector {
  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }
}

impl Model for OnnxDetector {
  type Input = Frame;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let now = Instant::now();
    let PreparedInput { tensor, ratio, pad } = prepare(
      input,
      self.config.input_size,
      self.config.resize,
      self.config.channel_order,
    )?;
    info!("预处理完成，耗时: {:.2?}", now.elapsed());
    debug!("输入张量形状: {:?}, 比例: {:?}, 填充: {:?}", tensor.shape(), ratio, pad);

    let now = Instant::now();
    let input_tensor = Tensor::from_array(tensor)?;
    let outputs = self.session.run(ort::inputs![input_tensor])?;
    let first = outputs
      .iter()
      .next()
      .ok_or_else(|| ModelError::OutputShapeError("模型没有输出".to_string()))?
      .1;
    let (shape, data) = first.try_extract_tensor::<f32>()?;
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    debug!("模型输出形状: {:?}", dims);

    let params = DecodeParams {
      confidence: self.config.confidence,
      iou: self.config.iou,
      max_detections: self.config.max_detections,
      pad,
    };
    let items = match self.config.layout {
      OutputLayout::Raw => decode_raw(&dims, data, &params)?,
      OutputLayout::EndToEnd => decode_end_to_end(&dims, data, &params)?,
    };

    if items.is_empty() {
      warn!("未检测到任何物体");
    } else {
      debug!("检测到 {} 个物体", items.len());
    }

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      ratio: Some(ratio),
    })
  }
}

#[derive(Debug, Clone, Copy)]
struct DecodeParams {
  confidence: f32,
  iou: f32,
  max_detections: usize,
  pad: (f32, f32),
}

fn check_len(dims: &[usize], data: &[f32]) -> Result<(), ModelError> {
  let expected: usize = dims.iter().product();
  if expected != data.len() {
    return Err(ModelError::OutputShapeError(format!(
      "形状 {:?} 需要 {} 个元素, 实际 {}",
      dims,
      expected,
      data.len()
    )));
  }
  Ok(())
}

/// 解码原始候选框并执行 NMS，坐标去除信箱填充
fn decode_raw(
  dims: &[usize],
  data: &[f32],
  params: &DecodeParams,
) -> Result<Vec<DetectItem>, ModelError> {
  let fields = match dims {
    [1, _, fields] if *fields > RAW_BOX_FIELDS => *fields,
    _ => {
      return Err(ModelError::OutputShapeError(format!(
        "期望 [1, N, 5 + nc], 实际 {:?}",
        dims
      )));
    }
  };
  check_len(dims, data)?;

  let (pad_x, pad_y) = params.pad;
  let mut candidates = Vec::new();
  for row in data.chunks_exact(fields) {
    let objectness = row[4];
    if objectness <= params.confidence {
      continue;
    }

    let (class_id, class_score) = row[RAW_BOX_FIELDS..]
      .iter()
      .enumerate()
      .fold((0usize, f32::MIN), |best, (i, &s)| {
        if s > best.1 { (i, s) } else { best }
      });

    let score = objectness * class_score;
    if score <= params.confidence {
      continue;
    }

    let bbox = BBox::from_cxcywh(row[0], row[1], row[2], row[3]).shifted(-pad_x, -pad_y);
    candidates.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox,
    });
  }

  debug!("NMS 前候选框数量: {}", candidates.len());
  Ok(non_max_suppression(
    candidates,
    params.iou,
    params.max_detections,
  ))
}

/// 解码已内置 NMS 的输出，仅保留第 0 张图的结果
fn decode_end_to_end(
  dims: &[usize],
  data: &[f32],
  params: &DecodeParams,
) -> Result<Vec<DetectItem>, ModelError> {
  match dims {
    [_, E2E_ROW_FIELDS] | [1, _, E2E_ROW_FIELDS] => {}
    _ => {
      return Err(ModelError::OutputShapeError(format!(
        "期望 [N, 7], 实际 {:?}",
        dims
      )));
    }
  }
  check_len(dims, data)?;

  let (pad_x, pad_y) = params.pad;
  let mut items: Vec<DetectItem> = data
    .chunks_exact(E2E_ROW_FIELDS)
    .filter(|row| row[0] == 0.0 && row[6] >= params.confidence)
    .map(|row| DetectItem {
      class_id: row[5].max(0.0) as u32,
      score: row[6],
      bbox: BBox::new(row[1], row[2], row[3], row[4]).shifted(-pad_x, -pad_y),
    })
    .collect();

  items.sort_by(|a, b| b.score.total_cmp(&a.score));
  items.truncate(params.max_detections);
  Ok(items)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(pad: (f32, f32)) -> DecodeParams {
    DecodeParams {
      confidence: 0.25,
      iou: 0.45,
      max_detections: 300,
      pad,
    }
  }

  #[test]
  fn yolov7_url_uses_letterbox_defaults() -> Result<(), ModelError> {
    let url = Url::parse("yolov7:///weights/yolov7.onnx").unwrap();
    let builder = DetectorBuilder::from_url(&url)?;
    let config = builder.config();

    assert_eq!(config.model_path, PathBuf::from("/weights/yolov7.onnx"));
    assert_eq!(config.layout, OutputLayout::Raw);
    assert_eq!(config.input_size, TargetSize::square(320));
    assert_eq!(
      config.resize,
      ResizeMode::Letterbox {
        stride: 32,
        auto: false
      }
    );
    assert_eq!(config.confidence, 0.25);
    assert_eq!(config.iou, 0.45);
    Ok(())
  }

  #[test]
  fn e2e_url_reads_query_overrides() -> Result<(), ModelError> {
    let url =
      Url::parse("yolo-e2e:///weights/yolo.onnx?size=416x352&conf=0.5&order=bgr&max_det=100")
        .unwrap();
    let builder = DetectorBuilder::from_url(&url)?;
    let config = builder.config();

    assert_eq!(config.layout, OutputLayout::EndToEnd);
    assert_eq!(config.resize, ResizeMode::Resize);
    assert_eq!(config.input_size, TargetSize::new(416, 352));
    assert_eq!(config.confidence, 0.5);
    assert_eq!(config.channel_order, ChannelOrder::Bgr);
    assert_eq!(config.max_detections, 100);
    Ok(())
  }

  #[test]
  fn threads_query_sets_intra_op_threads() -> Result<(), ModelError> {
    let url = Url::parse("yolov7:///m.onnx?threads=4").unwrap();
    assert_eq!(DetectorBuilder::from_url(&url)?.threads(), Some(4));

    let url = Url::parse("yolov7:///m.onnx").unwrap();
    assert_eq!(DetectorBuilder::from_url(&url)?.threads(), None);

    let url = Url::parse("yolov7:///m.onnx?threads=many").unwrap();
    assert!(matches!(
      DetectorBuilder::from_url(&url),
      Err(ModelError::InvalidParameter { .. })
    ));
    Ok(())
  }

  #[test]
  fn stride_query_switches_to_letterbox() -> Result<(), ModelError> {
    let url = Url::parse("yolo-e2e:///m.onnx?stride=64&auto=true").unwrap();
    let builder = DetectorBuilder::from_url(&url)?;
    assert_eq!(
      builder.config().resize,
      ResizeMode::Letterbox {
        stride: 64,
        auto: true
      }
    );
    Ok(())
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rknn:///m.rknn").unwrap();
    assert!(matches!(
      DetectorBuilder::from_url(&url),
      Err(ModelError::ModelPathError(_))
    ));
  }

  #[test]
  fn bad_query_value_is_rejected() {
    let url = Url::parse("yolov7:///m.onnx?conf=high").unwrap();
    assert!(matches!(
      DetectorBuilder::from_url(&url),
      Err(ModelError::InvalidParameter { .. })
    ));
  }

  #[test]
  fn missing_model_file_is_reported_before_loading() {
    let builder = DetectorBuilder::new(DetectorConfig::yolov7("/nonexistent/yolov7.onnx"));
    assert!(matches!(builder.build(), Err(ModelError::ModelNotFound(_))));
  }

  #[test]
  fn out_of_range_confidence_is_rejected() {
    let builder = DetectorBuilder::new(DetectorConfig::yolov7("/nonexistent.onnx")).confidence(1.5);
    assert!(matches!(
      builder.build(),
      Err(ModelError::InvalidParameter { .. })
    ));
  }

  #[test]
  fn raw_output_is_filtered_suppressed_and_unpadded() -> Result<(), ModelError> {
    // 两类，三个候选框：前两个重叠且同类，第三个置信度不足
    #[rustfmt::skip]
    let data = [
      50.0, 60.0, 20.0, 20.0, 0.9, 0.9, 0.1,
      51.0, 60.0, 20.0, 20.0, 0.8, 0.9, 0.1,
      10.0, 10.0,  4.0,  4.0, 0.2, 0.9, 0.1,
    ];
    let items = decode_raw(&[1, 3, 7], &data, &params((0.0, 40.0)))?;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 0);
    approx::assert_relative_eq!(items[0].score, 0.81, epsilon = 1e-6);
    assert_eq!(items[0].bbox, BBox::new(40.0, 10.0, 60.0, 30.0));
    Ok(())
  }

  #[test]
  fn raw_output_picks_best_class() -> Result<(), ModelError> {
    let data = [50.0, 50.0, 10.0, 10.0, 0.8, 0.1, 0.7, 0.2];
    let items = decode_raw(&[1, 1, 8], &data, &params((0.0, 0.0)))?;
    assert_eq!(items[0].class_id, 1);
    Ok(())
  }

  #[test]
  fn raw_output_rejects_bad_shape() {
    let data = [0.0; 12];
    assert!(matches!(
      decode_raw(&[2, 2, 3], &data, &params((0.0, 0.0))),
      Err(ModelError::OutputShapeError(_))
    ));
    assert!(matches!(
      decode_raw(&[1, 3, 7], &data, &params((0.0, 0.0))),
      Err(ModelError::OutputShapeError(_))
    ));
  }

  #[test]
  fn end_to_end_rows_are_filtered_and_sorted() -> Result<(), ModelError> {
    #[rustfmt::skip]
    let data = [
      0.0, 10.0, 20.0, 110.0, 220.0, 17.0, 0.60,
      0.0, 30.0, 40.0, 130.0, 240.0,  0.0, 0.92,
      0.0,  1.0,  1.0,   2.0,   2.0,  3.0, 0.10,
      1.0, 30.0, 40.0, 130.0, 240.0,  0.0, 0.99,
    ];
    let items = decode_end_to_end(&[4, 7], &data, &params((0.0, 0.0)))?;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 0);
    assert_eq!(items[0].score, 0.92);
    assert_eq!(items[1].class_id, 17);
    assert_eq!(items[1].bbox, BBox::new(10.0, 20.0, 110.0, 220.0));
    Ok(())
  }

  #[test]
  fn end_to_end_accepts_batched_shape() -> Result<(), ModelError> {
    let data = [0.0, 10.0, 20.0, 30.0, 40.0, 2.0, 0.5];
    let items = decode_end_to_end(&[1, 1, 7], &data, &params((5.0, 0.0)))?;
    assert_eq!(items[0].bbox, BBox::new(5.0, 20.0, 25.0, 40.0));
    Ok(())
  }

  #[test]
  fn empty_end_to_end_output_is_not_an_error() -> Result<(), ModelError> {
    let items = decode_end_to_end(&[0, 7], &[], &params((0.0, 0.0)))?;
    assert!(items.is_empty());
    Ok(())
  }
}
