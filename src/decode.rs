// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode.rs - 检测解码的几何与配置
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

use thiserror::Error;

use crate::model::{DetectItem, DetectResult, WithLabel};
use crate::tensor::{KernelError, StreamError, TensorError};

mod anchors;
mod boxes;
mod context;
mod fuse;
mod layout;
mod select;
mod suppress;

pub use self::anchors::{AnchorGrid, KITTI_ANCHOR_SHAPES};
pub use self::boxes::BoxDecoder;
pub use self::context::{DecodeContext, DecodeFrameError};
pub use self::fuse::ScoreFuser;
pub use self::layout::LayoutNormalizer;
pub use self::select::TopKSelector;
pub use self::suppress::{filter_detections, iou};

/// 卷积输出网格的几何描述。
///
/// 通道轴由三段连续区间组成：每格 `B*C` 个类别概率通道、`B` 个
/// 置信度通道、`B*4` 个边框回归通道，顺序固定，无空隙无重叠。
#[derive(Debug, Clone)]
pub struct GridGeometry {
  /// 批大小，恒为 1。
  pub batch: usize,
  /// 网络输入分辨率。
  pub input_w: usize,
  pub input_h: usize,
  /// 卷积输出网格的行列数。
  pub grid_h: usize,
  pub grid_w: usize,
  /// 每格锚框数 B。
  pub anchors_per_cell: usize,
  /// 类别数 C。
  pub num_classes: usize,
}

impl GridGeometry {
  /// KITTI 检测网络的缺省几何：1248x384 输入，24x78 网格，
  /// 每格 9 个锚框，3 个类别。
  pub fn kitti() -> Self {
    Self {
      batch: 1,
      input_w: 1248,
      input_h: 384,
      grid_h: 24,
      grid_w: 78,
      anchors_per_cell: 9,
      num_classes: 3,
    }
  }

  pub fn class_channels(&self) -> usize {
    self.anchors_per_cell * self.num_classes
  }

  pub fn conf_channels(&self) -> usize {
    self.anchors_per_cell
  }

  pub fn bbox_channels(&self) -> usize {
    self.anchors_per_cell * 4
  }

  pub fn total_channels(&self) -> usize {
    self.class_channels() + self.conf_channels() + self.bbox_channels()
  }

  /// 锚框总数 A = H * W * B。
  pub fn anchor_count(&self) -> usize {
    self.grid_h * self.grid_w * self.anchors_per_cell
  }

  pub fn validate(&self) -> Result<(), DecodeError> {
    if self.batch != 1 {
      return Err(DecodeError::BadBatch(self.batch));
    }
    if self.input_w == 0
      || self.input_h == 0
      || self.grid_h == 0
      || self.grid_w == 0
      || self.anchors_per_cell == 0
      || self.num_classes == 0
    {
      return Err(DecodeError::ZeroDim);
    }
    Ok(())
  }
}

/// 解码阶段的运行参数。
#[derive(Debug, Clone)]
pub struct DecodeConfig {
  /// 非极大值抑制的交并比阈值。
  pub nms_threshold: f32,
  /// 输出检测的得分阈值，仅在产出时过滤。
  pub score_threshold: f32,
  /// 排序后保留的候选数。
  pub top_k: usize,
  /// 输出坐标的整数像素平移。
  pub x_shift: i32,
  pub y_shift: i32,
}

impl Default for DecodeConfig {
  fn default() -> Self {
    Self {
      nms_threshold: 0.4,
      score_threshold: 0.3,
      top_k: 64,
      x_shift: 0,
      y_shift: 0,
    }
  }
}

impl DecodeConfig {
  pub fn validate(&self) -> Result<(), DecodeError> {
    for (name, value) in [
      ("nms_threshold", self.nms_threshold),
      ("score_threshold", self.score_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(DecodeError::BadThreshold { name, value });
      }
    }
    if self.top_k == 0 {
      return Err(DecodeError::ZeroTopK);
    }
    Ok(())
  }
}

/// 建立解码上下文时的致命错误。
#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("批大小仅支持 1, 实际 {0}")]
  BadBatch(usize),
  #[error("网格尺寸不能为零")]
  ZeroDim,
  #[error("阈值 {name} 必须在 [0, 1] 内: {value}")]
  BadThreshold { name: &'static str, value: f32 },
  #[error("top-k 必须至少为 1")]
  ZeroTopK,
  #[error("锚框模板数量不匹配: 期望 {expected} 个, 实际 {actual} 个")]
  AnchorShapes { expected: usize, actual: usize },
  #[error(transparent)]
  Tensor(#[from] TensorError),
  #[error("张量初始化失败: {0}")]
  Setup(#[from] KernelError),
  #[error(transparent)]
  Stream(#[from] StreamError),
}

/// 一帧解码后的主机侧结果，长度为有效的 top-k 数。
///
/// `keep` 是抑制阶段的保留掩码；得分阈值在产出时另行过滤，
/// 不会改写掩码本身。
#[derive(Debug, Clone)]
pub struct Predictions {
  /// 类别编号（以 f32 存放）。
  pub klass: Box<[f32]>,
  /// 融合得分，降序排列。
  pub score: Box<[f32]>,
  /// 角点形式边框 [x1, y1, x2, y2]，逐项连续存放。
  pub bbox: Box<[f32]>,
  /// 非极大值抑制的保留掩码。
  pub keep: Box<[bool]>,
  /// 有效项数。
  pub num: usize,
}

impl Predictions {
  pub fn with_capacity(num: usize) -> Self {
    Self {
      klass: vec![0f32; num].into_boxed_slice(),
      score: vec![0f32; num].into_boxed_slice(),
      bbox: vec![0f32; 4 * num].into_boxed_slice(),
      keep: vec![true; num].into_boxed_slice(),
      num,
    }
  }

  pub fn bbox_of(&self, i: usize) -> [f32; 4] {
    [
      self.bbox[4 * i],
      self.bbox[4 * i + 1],
      self.bbox[4 * i + 2],
      self.bbox[4 * i + 3],
    ]
  }

  /// 产出最终检测：保留掩码为真且得分不低于阈值的项。
  pub fn emit<T: WithLabel>(&self, score_threshold: f32) -> DetectResult<T> {
    let mut items = Vec::new();
    for i in 0..self.num {
      if !self.keep[i] || self.score[i] < score_threshold {
        continue;
      }
      items.push(DetectItem {
        kind: T::from_label_id(self.klass[i] as u32),
        score: self.score[i],
        bbox: self.bbox_of(i),
      });
    }
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

/// 单帧解码耗时，毫秒。
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeTiming {
  /// 第一个同步点覆盖的检测窗口。
  pub detect_ms: f32,
  /// 排序、收集与抑制的杂项窗口。
  pub misc_ms: f32,
}
