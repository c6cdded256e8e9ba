// 该文件是 Wanglou （望楼） 项目的一部分。
// tests/decode_pipeline.rs - 解码流水线端到端测试
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

use wanglou::{
  decode::{DecodeConfig, DecodeFrameError, GridGeometry, KITTI_ANCHOR_SHAPES},
  input::AsNetInput,
  model::{InferenceEngine, KittiLabel, Model, SqueezeDet, SqueezeDetBuilder},
  tensor::{Stream, Tensor},
};

struct TestFrame {
  name: String,
  data: Vec<f32>,
  img_w: u32,
  img_h: u32,
}

impl TestFrame {
  fn sized(img_w: u32, img_h: u32) -> Self {
    let g = GridGeometry::kitti();
    Self {
      name: "000001".into(),
      data: vec![0f32; 3 * g.input_w * g.input_h],
      img_w,
      img_h,
    }
  }
}

impl AsNetInput for TestFrame {
  fn net_input(&self) -> &[f32] {
    &self.data
  }

  fn frame_name(&self) -> &str {
    &self.name
  }

  fn image_size(&self) -> (u32, u32) {
    (self.img_w, self.img_h)
  }
}

/// 把预先构造的卷积输出原样送上执行流的引擎。
struct CannedEngine {
  convout: Vec<f32>,
}

impl InferenceEngine for CannedEngine {
  type Error = std::convert::Infallible;

  fn infer<F: AsNetInput>(
    &mut self,
    stream: &Stream,
    _frame: &F,
    _input: &Tensor,
    convout: &Tensor,
  ) -> Result<(), Self::Error> {
    stream.upload(convout, &self.convout);
    Ok(())
  }
}

/// 通道主序 [1, 72, 24, 78] 的卷积输出构造器。
struct ConvoutBuilder {
  g: GridGeometry,
  data: Vec<f32>,
}

impl ConvoutBuilder {
  fn new() -> Self {
    let g = GridGeometry::kitti();
    let data = vec![0f32; g.total_channels() * g.grid_h * g.grid_w];
    Self { g, data }
  }

  fn set(&mut self, ch: usize, h: usize, w: usize, value: f32) {
    let plane = self.g.grid_h * self.g.grid_w;
    self.data[ch * plane + h * self.g.grid_w + w] = value;
  }

  /// 在格 (h, w) 的第 b 个锚框处放一个候选。
  fn candidate(
    &mut self,
    h: usize,
    w: usize,
    b: usize,
    probs: [f32; 3],
    conf: f32,
    deltas: [f32; 4],
  ) {
    for (c, &p) in probs.iter().enumerate() {
      self.set(b * self.g.num_classes + c, h, w, p);
    }
    self.set(self.g.class_channels() + b, h, w, conf);
    let bbox_base = self.g.class_channels() + self.g.conf_channels();
    for (d, &v) in deltas.iter().enumerate() {
      self.set(bbox_base + 4 * b + d, h, w, v);
    }
  }

  fn engine(self) -> CannedEngine {
    CannedEngine { convout: self.data }
  }
}

fn model_with(
  engine: CannedEngine,
  config: DecodeConfig,
) -> SqueezeDet<CannedEngine, TestFrame, KittiLabel> {
  SqueezeDetBuilder::new().config(config).build(engine).unwrap()
}

/// 格 (h, w) 第 b 个锚框在网络输入平面上的角点。
fn anchor_corners(h: usize, w: usize, b: usize) -> [f32; 4] {
  let g = GridGeometry::kitti();
  let cx = (w as f32 + 1.0) * g.input_w as f32 / (g.grid_w as f32 + 1.0);
  let cy = (h as f32 + 1.0) * g.input_h as f32 / (g.grid_h as f32 + 1.0);
  let [aw, ah] = KITTI_ANCHOR_SHAPES[b];
  [cx - aw * 0.5, cy - ah * 0.5, cx + aw * 0.5, cy + ah * 0.5]
}

fn assert_close(actual: [f32; 4], expected: [f32; 4]) {
  for i in 0..4 {
    assert!(
      (actual[i] - expected[i]).abs() < 1e-3,
      "第 {} 维: {} != {}",
      i,
      actual[i],
      expected[i]
    );
  }
}

#[test]
fn zero_delta_candidate_lands_on_its_anchor() {
  let mut conv = ConvoutBuilder::new();
  conv.candidate(2, 3, 1, [0.1, 0.8, 0.1], 0.9, [0.0; 4]);
  let mut model = model_with(conv.engine(), DecodeConfig::default());

  let result = model.infer(&TestFrame::sized(1248, 384)).unwrap();

  assert_eq!(result.items.len(), 1);
  let item = &result.items[0];
  assert!(matches!(item.kind, KittiLabel::Pedestrian));
  assert!((item.score - 0.72).abs() < 1e-6);
  assert_close(item.bbox, anchor_corners(2, 3, 1));

  let timing = model.context().timing();
  assert!(timing.detect_ms >= 0.0 && timing.misc_ms >= 0.0);
}

#[test]
fn overlapping_boxes_suppress_within_class_only() {
  let mut conv = ConvoutBuilder::new();
  // 三个候选都落在同一个框上：两辆车互相抑制，行人不受影响
  conv.candidate(5, 10, 0, [0.9, 0.0, 0.0], 0.9, [0.0; 4]);
  conv.candidate(
    5,
    10,
    2,
    [0.6, 0.0, 0.0],
    0.9,
    [0.0, 0.0, (36f32 / 115.0).ln(), (37f32 / 59.0).ln()],
  );
  conv.candidate(
    5,
    10,
    4,
    [0.0, 0.8, 0.0],
    0.9,
    [0.0, 0.0, (36f32 / 38.0).ln(), (37f32 / 90.0).ln()],
  );
  let mut model = model_with(conv.engine(), DecodeConfig::default());

  let result = model.infer(&TestFrame::sized(1248, 384)).unwrap();

  assert_eq!(result.items.len(), 2);
  assert!(matches!(result.items[0].kind, KittiLabel::Car));
  assert!((result.items[0].score - 0.81).abs() < 1e-6);
  assert!(matches!(result.items[1].kind, KittiLabel::Pedestrian));
  assert!((result.items[1].score - 0.72).abs() < 1e-6);
  assert_close(result.items[0].bbox, anchor_corners(5, 10, 0));
  assert_close(result.items[1].bbox, anchor_corners(5, 10, 0));
}

#[test]
fn emit_threshold_filters_without_touching_keep_mask() {
  let mut conv = ConvoutBuilder::new();
  conv.candidate(2, 3, 0, [0.9, 0.0, 0.0], 0.9, [0.0; 4]);
  conv.candidate(20, 70, 0, [0.5, 0.0, 0.0], 0.4, [0.0; 4]);
  let mut model = model_with(conv.engine(), DecodeConfig::default());

  let result = model.infer(&TestFrame::sized(1248, 384)).unwrap();
  assert_eq!(result.items.len(), 1);
  assert!((result.items[0].score - 0.81).abs() < 1e-6);

  let preds = model.context().predictions();
  assert!((preds.score[1] - 0.2).abs() < 1e-6);
  assert!(preds.keep[1], "低分候选未被抑制，只是不发射");
}

#[test]
fn boxes_are_rescaled_and_shifted_to_image_coordinates() {
  let mut conv = ConvoutBuilder::new();
  conv.candidate(2, 3, 1, [0.1, 0.8, 0.1], 0.9, [0.0; 4]);
  let config = DecodeConfig {
    x_shift: 5,
    y_shift: 7,
    ..DecodeConfig::default()
  };
  let mut model = model_with(conv.engine(), config);

  let result = model.infer(&TestFrame::sized(2496, 768)).unwrap();

  assert_eq!(result.items.len(), 1);
  let a = anchor_corners(2, 3, 1);
  let expected = [
    a[0] * 2.0 + 5.0,
    a[1] * 2.0 + 7.0,
    a[2] * 2.0 + 5.0,
    a[3] * 2.0 + 7.0,
  ];
  assert_close(result.items[0].bbox, expected);
}

#[test]
fn repeated_frames_decode_bit_identically() {
  let mut conv = ConvoutBuilder::new();
  conv.candidate(2, 3, 1, [0.1, 0.8, 0.1], 0.9, [0.25, -0.5, 0.125, -0.25]);
  conv.candidate(9, 40, 6, [0.3, 0.3, 0.4], 0.7, [0.0; 4]);
  let mut model = model_with(conv.engine(), DecodeConfig::default());
  let frame = TestFrame::sized(1242, 375);

  model.infer(&frame).unwrap();
  let first = model.context().predictions().clone();
  model.infer(&frame).unwrap();
  let second = model.context().predictions();

  assert_eq!(first.num, second.num);
  for i in 0..first.num {
    assert_eq!(first.score[i].to_bits(), second.score[i].to_bits());
    assert_eq!(first.klass[i].to_bits(), second.klass[i].to_bits());
    assert_eq!(first.keep[i], second.keep[i]);
  }
  for i in 0..4 * first.num {
    assert_eq!(first.bbox[i].to_bits(), second.bbox[i].to_bits());
  }
}

#[derive(Debug, thiserror::Error)]
#[error("引擎故障")]
struct BrokenEngineError;

struct BrokenEngine;

impl InferenceEngine for BrokenEngine {
  type Error = BrokenEngineError;

  fn infer<F: AsNetInput>(
    &mut self,
    _stream: &Stream,
    _frame: &F,
    _input: &Tensor,
    _convout: &Tensor,
  ) -> Result<(), Self::Error> {
    Err(BrokenEngineError)
  }
}

#[test]
fn engine_failure_aborts_the_frame() {
  let mut model: SqueezeDet<BrokenEngine, TestFrame, KittiLabel> =
    SqueezeDetBuilder::new().build(BrokenEngine).unwrap();

  let err = model.infer(&TestFrame::sized(1248, 384)).unwrap_err();
  assert!(matches!(err, DecodeFrameError::Engine(_)));
}
