// 该文件是 Wanglou （望楼） 项目的一部分。
// src/model.rs - 模型
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

use std::marker::PhantomData;

use crate::decode::{
  DecodeConfig, DecodeContext, DecodeError, DecodeFrameError, GridGeometry,
};
use crate::input::AsNetInput;
use crate::tensor::{Stream, Tensor};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

/// KITTI 三类目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KittiLabel {
  Car,
  Pedestrian,
  Cyclist,
}

impl WithLabel for KittiLabel {
  fn to_label_str(&self) -> String {
    match self {
      KittiLabel::Car => "car",
      KittiLabel::Pedestrian => "pedestrian",
      KittiLabel::Cyclist => "cyclist",
    }
    .to_string()
  }

  fn to_label_id(&self) -> u32 {
    match self {
      KittiLabel::Car => 0,
      KittiLabel::Pedestrian => 1,
      KittiLabel::Cyclist => 2,
    }
  }

  fn from_label_id(id: u32) -> Self {
    match id {
      0 => KittiLabel::Car,
      1 => KittiLabel::Pedestrian,
      2 => KittiLabel::Cyclist,
      // 类别编号来自类别轴上的最大值下标，结构上不会越界。
      _ => panic!("未知的类别编号: {id}"),
    }
  }
}

/// 主干网络的注入点。
///
/// 引擎只通过两个张量句柄与执行流和解码侧交互：读取已上传的
/// 网络输入，把卷积输出写进 convout。到达 convout 的类别概率
/// 已经归一化，解码侧不再做 softmax。
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer<F: AsNetInput>(
    &mut self,
    stream: &Stream,
    frame: &F,
    input: &Tensor,
    convout: &Tensor,
  ) -> Result<(), Self::Error>;
}

/// 组装好的检测模型：解码上下文加注入的推理引擎。
pub struct SqueezeDet<E, F, T> {
  context: DecodeContext,
  engine: E,
  _marker: PhantomData<(F, T)>,
}

impl<E, F, T> SqueezeDet<E, F, T> {
  pub fn context(&self) -> &DecodeContext {
    &self.context
  }
}

impl<E, F, T> Model for SqueezeDet<E, F, T>
where
  E: InferenceEngine,
  F: AsNetInput,
  T: WithLabel,
{
  type Input = F;
  type Output = DetectResult<T>;
  type Error = DecodeFrameError<E::Error>;

  fn infer(&mut self, input: &F) -> Result<Self::Output, Self::Error> {
    self.context.process(&mut self.engine, input)?;
    let score_threshold = self.context.config().score_threshold;
    Ok(self.context.predictions().emit(score_threshold))
  }
}

#[derive(Debug, Clone, Default)]
pub struct SqueezeDetBuilder {
  geometry: Option<GridGeometry>,
  config: DecodeConfig,
}

impl SqueezeDetBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// 缺省为 KITTI 几何。
  pub fn geometry(mut self, geometry: GridGeometry) -> Self {
    self.geometry = Some(geometry);
    self
  }

  pub fn config(mut self, config: DecodeConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build<E, F, T>(self, engine: E) -> Result<SqueezeDet<E, F, T>, DecodeError>
  where
    E: InferenceEngine,
    F: AsNetInput,
    T: WithLabel,
  {
    let geometry = self.geometry.unwrap_or_else(GridGeometry::kitti);
    let context = DecodeContext::new(geometry, self.config)?;
    Ok(SqueezeDet {
      context,
      engine,
      _marker: PhantomData,
    })
  }
}

mod replay;
pub use self::replay::{ReplayEngine, ReplayEngineError};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kitti_labels_round_trip() {
    for id in 0..3 {
      let label = KittiLabel::from_label_id(id);
      assert_eq!(label.to_label_id(), id);
    }
    assert_eq!(KittiLabel::Pedestrian.to_label_str(), "pedestrian");
  }

  #[test]
  #[should_panic(expected = "未知的类别编号")]
  fn out_of_range_label_id_panics() {
    let _ = KittiLabel::from_label_id(7);
  }
}
