// 该文件是 Wanglou （望楼） 项目的一部分。
// src/tensor.rs - 设备张量句柄
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

use std::fmt;

use thiserror::Error;

mod heap;
mod kernel;
mod stream;

pub use self::heap::{BufferId, DeviceHeap};
pub use self::kernel::{
  BoxTransform, KernelError, decode_boxes, gather_rows, mul_elementwise, reduce_max_arg,
  slice_channels, sort_pairs_desc, transpose,
};
pub use self::stream::{Op, Readback, Stream, StreamError};

/// 设备数据的元素类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
  F32,
  I32,
}

impl fmt::Display for DType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DType::F32 => write!(f, "f32"),
      DType::I32 => write!(f, "i32"),
    }
  }
}

/// 张量形状，元素个数为各维度之积。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(Box<[usize]>);

impl Shape {
  pub fn new(dims: &[usize]) -> Self {
    Self(dims.into())
  }

  pub fn dims(&self) -> &[usize] {
    &self.0
  }

  pub fn rank(&self) -> usize {
    self.0.len()
  }

  pub fn elem_count(&self) -> usize {
    self.0.iter().product()
  }
}

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("重塑 {name} 形状不匹配: 期望 {expected} 个元素, 实际 {actual} 个")]
  ReshapeMismatch {
    name: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("前缀视图 {name} 超界: 需要 {need} 个元素, 仅有 {have} 个")]
  PrefixTooLong {
    name: &'static str,
    need: usize,
    have: usize,
  },
}

/// 设备张量句柄：名称、类型、形状以及底层缓冲的编号。
///
/// 句柄可以廉价克隆；视图与原张量共享同一缓冲。
#[derive(Debug, Clone)]
pub struct Tensor {
  name: &'static str,
  dtype: DType,
  shape: Shape,
  buffer: BufferId,
}

impl Tensor {
  pub(crate) fn new(name: &'static str, dtype: DType, shape: Shape, buffer: BufferId) -> Self {
    Self {
      name,
      dtype,
      shape,
      buffer,
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn dtype(&self) -> DType {
    self.dtype
  }

  pub fn shape(&self) -> &Shape {
    &self.shape
  }

  pub fn elem_count(&self) -> usize {
    self.shape.elem_count()
  }

  pub fn buffer(&self) -> BufferId {
    self.buffer
  }

  /// 重塑视图：元素个数不变，共享缓冲。
  pub fn reshape(&self, name: &'static str, shape: Shape) -> Result<Tensor, TensorError> {
    if shape.elem_count() != self.elem_count() {
      return Err(TensorError::ReshapeMismatch {
        name,
        expected: self.elem_count(),
        actual: shape.elem_count(),
      });
    }
    Ok(Tensor::new(name, self.dtype, shape, self.buffer))
  }

  /// 前缀视图：取缓冲起始的一段，元素个数可以更少。
  pub fn prefix_view(&self, name: &'static str, shape: Shape) -> Result<Tensor, TensorError> {
    if shape.elem_count() > self.elem_count() {
      return Err(TensorError::PrefixTooLong {
        name,
        need: shape.elem_count(),
        have: self.elem_count(),
      });
    }
    Ok(Tensor::new(name, self.dtype, shape, self.buffer))
  }
}
