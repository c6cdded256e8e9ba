// 该文件是 Wanglou （望楼） 项目的一部分。
// src/tensor/heap.rs - 设备缓冲区
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

use std::cell::{Ref, RefCell, RefMut};

use super::kernel::KernelError;
use super::{DType, Shape, Tensor};

/// 设备缓冲编号，仅由所属堆分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferId(usize);

enum Buffer {
  F32(RefCell<Box<[f32]>>),
  I32(RefCell<Box<[i32]>>),
}

impl Buffer {
  fn dtype(&self) -> DType {
    match self {
      Buffer::F32(_) => DType::F32,
      Buffer::I32(_) => DType::I32,
    }
  }
}

/// 设备内存堆。所有缓冲在流水线建立阶段一次性分配，
/// 随后整个堆移交给执行流的工作线程，逐帧复用。
#[derive(Default)]
pub struct DeviceHeap {
  buffers: Vec<Buffer>,
}

impl DeviceHeap {
  pub fn new() -> Self {
    Self::default()
  }

  /// 分配一块 f32 缓冲并返回覆盖整块缓冲的张量句柄。
  pub fn alloc_f32(&mut self, name: &'static str, shape: Shape) -> Tensor {
    let len = shape.elem_count();
    let id = BufferId(self.buffers.len());
    self
      .buffers
      .push(Buffer::F32(RefCell::new(vec![0f32; len].into_boxed_slice())));
    Tensor::new(name, DType::F32, shape, id)
  }

  /// 分配一块 i32 缓冲并返回覆盖整块缓冲的张量句柄。
  pub fn alloc_i32(&mut self, name: &'static str, shape: Shape) -> Tensor {
    let len = shape.elem_count();
    let id = BufferId(self.buffers.len());
    self
      .buffers
      .push(Buffer::I32(RefCell::new(vec![0i32; len].into_boxed_slice())));
    Tensor::new(name, DType::I32, shape, id)
  }

  /// 建立阶段的主机写入（锚框表、序号模板等）。
  pub fn write_f32(&self, tensor: &Tensor, data: &[f32]) -> Result<(), KernelError> {
    let mut buf = self.f32_mut(tensor)?;
    if data.len() != buf.len() {
      return Err(KernelError::LengthMismatch {
        expected: buf.len(),
        actual: data.len(),
      });
    }
    buf.copy_from_slice(data);
    Ok(())
  }

  pub fn write_i32(&self, tensor: &Tensor, data: &[i32]) -> Result<(), KernelError> {
    let mut buf = self.i32_mut(tensor)?;
    if data.len() != buf.len() {
      return Err(KernelError::LengthMismatch {
        expected: buf.len(),
        actual: data.len(),
      });
    }
    buf.copy_from_slice(data);
    Ok(())
  }

  /// 把张量覆盖的元素拷回主机。
  pub fn read_f32(&self, tensor: &Tensor) -> Result<Box<[f32]>, KernelError> {
    let buf = self.f32(tensor)?;
    Ok(buf.to_vec().into_boxed_slice())
  }

  pub fn f32(&self, tensor: &Tensor) -> Result<Ref<'_, [f32]>, KernelError> {
    match self.buffer_of(tensor, DType::F32)? {
      Buffer::F32(cell) => {
        let n = tensor.elem_count();
        let buf = cell.borrow();
        if buf.len() < n {
          return Err(KernelError::Capacity {
            tensor: tensor.name(),
            need: n,
            have: buf.len(),
          });
        }
        Ok(Ref::map(buf, |b| &b[..n]))
      }
      Buffer::I32(_) => unreachable!(),
    }
  }

  pub fn f32_mut(&self, tensor: &Tensor) -> Result<RefMut<'_, [f32]>, KernelError> {
    match self.buffer_of(tensor, DType::F32)? {
      Buffer::F32(cell) => {
        let n = tensor.elem_count();
        let buf = cell.borrow_mut();
        if buf.len() < n {
          return Err(KernelError::Capacity {
            tensor: tensor.name(),
            need: n,
            have: buf.len(),
          });
        }
        Ok(RefMut::map(buf, |b| &mut b[..n]))
      }
      Buffer::I32(_) => unreachable!(),
    }
  }

  pub fn i32(&self, tensor: &Tensor) -> Result<Ref<'_, [i32]>, KernelError> {
    match self.buffer_of(tensor, DType::I32)? {
      Buffer::I32(cell) => {
        let n = tensor.elem_count();
        let buf = cell.borrow();
        if buf.len() < n {
          return Err(KernelError::Capacity {
            tensor: tensor.name(),
            need: n,
            have: buf.len(),
          });
        }
        Ok(Ref::map(buf, |b| &b[..n]))
      }
      Buffer::F32(_) => unreachable!(),
    }
  }

  pub fn i32_mut(&self, tensor: &Tensor) -> Result<RefMut<'_, [i32]>, KernelError> {
    match self.buffer_of(tensor, DType::I32)? {
      Buffer::I32(cell) => {
        let n = tensor.elem_count();
        let buf = cell.borrow_mut();
        if buf.len() < n {
          return Err(KernelError::Capacity {
            tensor: tensor.name(),
            need: n,
            have: buf.len(),
          });
        }
        Ok(RefMut::map(buf, |b| &mut b[..n]))
      }
      Buffer::F32(_) => unreachable!(),
    }
  }

  fn buffer_of(&self, tensor: &Tensor, expected: DType) -> Result<&Buffer, KernelError> {
    if tensor.dtype() != expected {
      return Err(KernelError::DTypeMismatch {
        tensor: tensor.name(),
        expected,
        actual: tensor.dtype(),
      });
    }
    let id = tensor.buffer().0;
    let buffer = self
      .buffers
      .get(id)
      .ok_or(KernelError::UnknownBuffer {
        tensor: tensor.name(),
        id,
        len: self.buffers.len(),
      })?;
    if buffer.dtype() != expected {
      return Err(KernelError::DTypeMismatch {
        tensor: tensor.name(),
        expected,
        actual: buffer.dtype(),
      });
    }
    Ok(buffer)
  }
}
