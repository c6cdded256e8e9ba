// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode/context.rs - 解码上下文
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

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::input::AsNetInput;
use crate::model::InferenceEngine;
use crate::tensor::{DeviceHeap, Shape, Stream, StreamError, Tensor};

use super::{
  AnchorGrid, BoxDecoder, DecodeConfig, DecodeError, DecodeTiming, GridGeometry,
  KITTI_ANCHOR_SHAPES, LayoutNormalizer, Predictions, ScoreFuser, TopKSelector,
  filter_detections,
};

/// 逐帧解码中的错误。引擎错误与设备错误分开报告，
/// 设备错误发生后执行流已被污染，整个流水线应当终止。
#[derive(Error, Debug)]
pub enum DecodeFrameError<E: std::error::Error + 'static> {
  #[error("推理引擎执行失败: {0}")]
  Engine(#[source] E),
  #[error("设备执行流失败: {0}")]
  Device(#[from] StreamError),
}

/// 解码上下文：持有执行流与全部阶段对象。
///
/// 所有设备缓冲在建立时一次性分配，逐帧复用；单缓冲意味着
/// 帧处理严格串行。每帧恰好两个同步点：解码链之后与回读之后。
pub struct DecodeContext {
  geometry: GridGeometry,
  config: DecodeConfig,
  stream: Stream,
  input: Tensor,
  convout: Tensor,
  layout: LayoutNormalizer,
  fuser: ScoreFuser,
  boxes: BoxDecoder,
  selector: TopKSelector,
  preds: Predictions,
  timing: DecodeTiming,
}

impl DecodeContext {
  /// 以 KITTI 锚框模板建立上下文。
  pub fn new(geometry: GridGeometry, config: DecodeConfig) -> Result<Self, DecodeError> {
    Self::with_anchor_shapes(geometry, config, &KITTI_ANCHOR_SHAPES)
  }

  pub fn with_anchor_shapes(
    geometry: GridGeometry,
    config: DecodeConfig,
    shapes: &[[f32; 2]],
  ) -> Result<Self, DecodeError> {
    geometry.validate()?;
    config.validate()?;

    let mut heap = DeviceHeap::new();
    let input = heap.alloc_f32(
      "input",
      Shape::new(&[geometry.batch, 3, geometry.input_h, geometry.input_w]),
    );
    let convout = heap.alloc_f32(
      "convout",
      Shape::new(&[
        geometry.batch,
        geometry.total_channels(),
        geometry.grid_h,
        geometry.grid_w,
      ]),
    );
    let layout = LayoutNormalizer::new(&mut heap, &geometry)?;
    let fuser = ScoreFuser::new(&mut heap, &geometry);
    let grid = AnchorGrid::build(&geometry, shapes)?;
    let boxes = BoxDecoder::new(&mut heap, &geometry, &grid)?;
    let k = config.top_k.min(geometry.anchor_count());
    let selector = TopKSelector::new(&mut heap, &geometry, k, &fuser.fused)?;
    let preds = Predictions::with_capacity(k);

    info!(
      "解码上下文就绪: 网格 {}x{}, 每格 {} 锚框, {} 类, 候选 {} 个, top-{}",
      geometry.grid_h,
      geometry.grid_w,
      geometry.anchors_per_cell,
      geometry.num_classes,
      geometry.anchor_count(),
      k
    );
    let stream = Stream::spawn(heap)?;

    Ok(Self {
      geometry,
      config,
      stream,
      input,
      convout,
      layout,
      fuser,
      boxes,
      selector,
      preds,
      timing: DecodeTiming::default(),
    })
  }

  pub fn geometry(&self) -> &GridGeometry {
    &self.geometry
  }

  pub fn config(&self) -> &DecodeConfig {
    &self.config
  }

  /// 最近一帧的解码结果。
  pub fn predictions(&self) -> &Predictions {
    &self.preds
  }

  /// 最近一帧的耗时。
  pub fn timing(&self) -> DecodeTiming {
    self.timing
  }

  /// 处理一帧：上传输入，让引擎填充卷积输出，随后走完
  /// 布局归一、得分融合、边框解码、top-k 与抑制。
  pub fn process<E, F>(
    &mut self,
    engine: &mut E,
    frame: &F,
  ) -> Result<(), DecodeFrameError<E::Error>>
  where
    E: InferenceEngine,
    F: AsNetInput,
  {
    let start = Instant::now();
    self.stream.upload(&self.input, frame.net_input());
    engine
      .infer(&self.stream, frame, &self.input, &self.convout)
      .map_err(DecodeFrameError::Engine)?;

    self.layout.enqueue(&self.stream, &self.convout);
    self
      .fuser
      .enqueue(&self.stream, &self.layout.class_trans, &self.layout.conf_trans);
    let (img_w, img_h) = frame.image_size();
    self.boxes.enqueue(
      &self.stream,
      &self.layout.bbox_trans,
      img_w as f32,
      img_h as f32,
      self.config.x_shift,
      self.config.y_shift,
    );
    // 同步点一：解码链执行完毕，检测窗口到此为止。
    self.stream.synchronize()?;
    self.timing.detect_ms = ms_since(start);

    let start = Instant::now();
    let (rb_scores, rb_class, rb_boxes) =
      self
        .selector
        .enqueue(&self.stream, &self.fuser.fused, &self.fuser.max_class, &self.boxes.boxes);
    // 同步点二：回读完成后才允许等待句柄。
    self.stream.synchronize()?;
    let scores = rb_scores.wait()?;
    let klass = rb_class.wait()?;
    let bbox = rb_boxes.wait()?;
    self.preds.score.copy_from_slice(&scores);
    self.preds.klass.copy_from_slice(&klass);
    self.preds.bbox.copy_from_slice(&bbox);
    filter_detections(&mut self.preds, self.config.nms_threshold);
    self.timing.misc_ms = ms_since(start);

    debug!(
      "单帧解码完成: 检测 {:.3} ms, 杂项 {:.3} ms",
      self.timing.detect_ms, self.timing.misc_ms
    );
    Ok(())
  }
}

fn ms_since(start: Instant) -> f32 {
  start.elapsed().as_secs_f32() * 1000.0
}
