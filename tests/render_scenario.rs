// 该文件是 YoloLite 项目的一部分。
// tests/render_scenario.rs - 绘制与输出流程测试
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

use image::{Rgb, RgbImage};
use url::Url;

use yololite::{
  FromUrl,
  frame::Frame,
  input::InputWrapper,
  model::{BBox, DetectItem, DetectResult, Model},
  output::{BoxRenderer, OutputWrapper},
  preprocess::Ratio,
  task::{OneShotTask, Task},
};

const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 200, 0]);

#[test]
fn person_box_with_label_on_blank_canvas() {
  let mut image = RgbImage::from_pixel(640, 480, BACKGROUND);
  let bbox = BBox::new(100.0, 100.0, 200.0, 200.0);

  BoxRenderer::default().render(&mut image, &bbox, Some("person 0.87"), GREEN, Some(3), None);

  // 四条边
  for (x, y) in [(100, 150), (200, 150), (150, 100), (150, 200)] {
    assert_eq!(*image.get_pixel(x, y), GREEN, "edge ({x}, {y})");
  }
  // 框内不变
  assert_eq!(*image.get_pixel(150, 150), BACKGROUND);
  // 标签底色在左上角上方
  assert_eq!(*image.get_pixel(100, 80), GREEN);
  assert_eq!(*image.get_pixel(100, 60), BACKGROUND);
  // 标签文字为浅色，只出现在底色范围内
  let text: Vec<(u32, u32)> = image
    .enumerate_pixels()
    .filter(|(_, _, p)| p.0[0] > 128)
    .map(|(x, y, _)| (x, y))
    .collect();
  assert!(!text.is_empty(), "label text was not drawn");
  assert!(text.iter().all(|&(x, y)| x > 100 && x < 400 && y > 60 && y < 100));
  // 框下方不变
  assert_eq!(*image.get_pixel(150, 210), BACKGROUND);
}

/// 固定输出的检测器，坐标位于 320x240 的模型输入坐标系
struct FixedModel;

impl Model for FixedModel {
  type Input = Frame;
  type Output = DetectResult;
  type Error = std::convert::Infallible;

  fn infer(&mut self, input: &Frame) -> Result<DetectResult, Self::Error> {
    let ratio = Ratio::new(input.width() as f32 / 320.0, input.height() as f32 / 240.0);
    Ok(DetectResult {
      items: vec![DetectItem {
        class_id: 16,
        score: 0.91,
        bbox: BBox::new(50.0, 50.0, 100.0, 100.0),
      }]
      .into_boxed_slice(),
      ratio: Some(ratio),
    })
  }
}

#[test]
fn one_shot_pipeline_writes_rescaled_image_and_record() -> anyhow::Result<()> {
  let dir = tempfile::tempdir()?;
  let input_path = dir.path().join("input.png");
  RgbImage::from_pixel(640, 480, BACKGROUND).save(&input_path)?;

  let input_url = Url::parse(&format!("image://{}", input_path.display()))?;
  let image_out = dir.path().join("out/result.png");
  let json_out = dir.path().join("out/result.json");

  let renderer = BoxRenderer::default().with_line_thickness(Some(1));
  let output = OutputWrapper::from_url(&Url::parse(&format!("image://{}", image_out.display()))?)?
    .with_renderer(renderer);
  OneShotTask.run_task(InputWrapper::from_url(&input_url)?, FixedModel, output)?;

  let saved = image::open(&image_out)?.to_rgb8();
  assert_eq!(saved.dimensions(), (640, 480));
  // 模型坐标 (50, 50) 按 (2, 2) 还原到 (100, 100)
  assert_ne!(*saved.get_pixel(100, 150), BACKGROUND);
  assert_ne!(*saved.get_pixel(200, 150), BACKGROUND);
  assert_eq!(*saved.get_pixel(150, 150), BACKGROUND);
  assert_eq!(*saved.get_pixel(50, 75), BACKGROUND);

  let output = OutputWrapper::from_url(&Url::parse(&format!("json://{}", json_out.display()))?)?;
  OneShotTask.run_task(InputWrapper::from_url(&input_url)?, FixedModel, output)?;

  let record: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_out)?)?;
  let first = &record["detections"][0];
  assert_eq!(first["label"], "dog");
  assert_eq!(first["class_id"], 16);
  assert_eq!(first["bbox"]["x1"].as_f64(), Some(100.0));
  assert_eq!(first["bbox"]["y2"].as_f64(), Some(200.0));
  Ok(())
}
