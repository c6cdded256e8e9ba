// 该文件是 Wanglou （望楼） 项目的一部分。
// src/tensor/stream.rs - 先进先出执行流
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

use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::error;

use super::heap::DeviceHeap;
use super::kernel::{self, BoxTransform, KernelError};
use super::{DType, Tensor};

/// 可入队的核函数启动。
#[derive(Debug, Clone)]
pub enum Op {
  Slice {
    src: Tensor,
    dst: Tensor,
    axis: usize,
    start: usize,
    len: usize,
  },
  Transpose {
    src: Tensor,
    dst: Tensor,
    axes: Box<[usize]>,
  },
  ReduceMaxArg {
    src: Tensor,
    max_dst: Tensor,
    arg_dst: Tensor,
    axis: usize,
  },
  Mul {
    a: Tensor,
    b: Tensor,
    dst: Tensor,
  },
  DecodeBoxes {
    deltas: Tensor,
    anchors: Tensor,
    dst: Tensor,
    transform: BoxTransform,
  },
  SortPairsDesc {
    keys: Tensor,
    order: Tensor,
  },
  Gather {
    src: Tensor,
    order: Tensor,
    dst: Tensor,
    components: usize,
    count: usize,
  },
  /// 设备内拷贝。
  CopyWithin {
    src: Tensor,
    dst: Tensor,
  },
}

impl Op {
  pub fn label(&self) -> &'static str {
    match self {
      Op::Slice { .. } => "slice",
      Op::Transpose { .. } => "transpose",
      Op::ReduceMaxArg { .. } => "reduce_max_arg",
      Op::Mul { .. } => "mul",
      Op::DecodeBoxes { .. } => "decode_boxes",
      Op::SortPairsDesc { .. } => "sort_pairs_desc",
      Op::Gather { .. } => "gather",
      Op::CopyWithin { .. } => "copy_within",
    }
  }
}

enum Command {
  Launch(Op),
  Upload { dst: Tensor, data: Box<[f32]> },
  ReadBack { src: Tensor, tx: Sender<Box<[f32]>> },
  Sync { tx: Sender<Result<(), StreamError>> },
}

#[derive(Error, Debug, Clone)]
pub enum StreamError {
  #[error("设备操作 {op} 执行失败: {source}")]
  Kernel {
    op: &'static str,
    #[source]
    source: KernelError,
  },
  #[error("主机到设备上传 {tensor} 失败: {source}")]
  Upload {
    tensor: &'static str,
    #[source]
    source: KernelError,
  },
  #[error("设备到主机回读 {tensor} 失败: {source}")]
  ReadBack {
    tensor: &'static str,
    #[source]
    source: KernelError,
  },
  #[error("执行流已断开")]
  Disconnected,
  #[error("执行流线程启动失败: {0}")]
  Spawn(String),
}

/// 单条先进先出执行流。
///
/// 建堆之后把堆移交给工作线程，命令按入队次序逐条执行。某条命令失败后
/// 流进入污染状态：后续启动全部跳过，之后每次同步都报告最初的失败。
pub struct Stream {
  tx: Option<Sender<Command>>,
  worker: Option<JoinHandle<()>>,
}

impl Stream {
  pub fn spawn(heap: DeviceHeap) -> Result<Self, StreamError> {
    let (tx, rx) = channel();
    let worker = thread::Builder::new()
      .name("wanglou-stream".into())
      .spawn(move || run_worker(heap, rx))
      .map_err(|e| StreamError::Spawn(e.to_string()))?;
    Ok(Self {
      tx: Some(tx),
      worker: Some(worker),
    })
  }

  /// 入队一次核函数启动，立即返回。失败在下一次同步时报告。
  pub fn launch(&self, op: Op) {
    self.send(Command::Launch(op));
  }

  /// 入队一次主机到设备的拷贝。
  pub fn upload(&self, dst: &Tensor, data: &[f32]) {
    self.send(Command::Upload {
      dst: dst.clone(),
      data: data.into(),
    });
  }

  /// 入队一次设备到主机的拷贝，结果经 [`Readback`] 领取。
  ///
  /// 句柄应在一次成功的同步之后再等待，否则失败的流只会表现为断开。
  pub fn read_back(&self, src: &Tensor) -> Readback {
    let (tx, rx) = channel();
    self.send(Command::ReadBack {
      src: src.clone(),
      tx,
    });
    Readback { rx }
  }

  /// 等待此前入队的全部命令完成，返回首个失败（如有）。
  pub fn synchronize(&self) -> Result<(), StreamError> {
    let (tx, rx) = channel();
    self.send(Command::Sync { tx });
    rx.recv().map_err(|_| StreamError::Disconnected)?
  }

  fn send(&self, cmd: Command) {
    if let Some(tx) = &self.tx {
      // 发送失败说明工作线程已经退出，统一在同步时报告断开。
      let _ = tx.send(cmd);
    }
  }
}

impl Drop for Stream {
  fn drop(&mut self) {
    drop(self.tx.take());
    if let Some(worker) = self.worker.take() {
      let _ = worker.join();
    }
  }
}

/// 一次异步回读的领取句柄。
pub struct Readback {
  rx: Receiver<Box<[f32]>>,
}

impl Readback {
  pub fn wait(self) -> Result<Box<[f32]>, StreamError> {
    self.rx.recv().map_err(|_| StreamError::Disconnected)
  }
}

fn run_worker(heap: DeviceHeap, rx: Receiver<Command>) {
  let mut failed: Option<StreamError> = None;
  while let Ok(cmd) = rx.recv() {
    match cmd {
      Command::Launch(op) => {
        if failed.is_some() {
          continue;
        }
        if let Err(e) = execute(&heap, &op) {
          error!("设备操作 {} 执行失败: {}", op.label(), e);
          failed = Some(StreamError::Kernel {
            op: op.label(),
            source: e,
          });
        }
      }
      Command::Upload { dst, data } => {
        if failed.is_some() {
          continue;
        }
        if let Err(e) = upload(&heap, &dst, &data) {
          error!("上传 {} 失败: {}", dst.name(), e);
          failed = Some(StreamError::Upload {
            tensor: dst.name(),
            source: e,
          });
        }
      }
      Command::ReadBack { src, tx } => {
        if failed.is_some() {
          continue;
        }
        match heap.read_f32(&src) {
          Ok(data) => {
            let _ = tx.send(data);
          }
          Err(e) => {
            error!("回读 {} 失败: {}", src.name(), e);
            failed = Some(StreamError::ReadBack {
              tensor: src.name(),
              source: e,
            });
          }
        }
      }
      Command::Sync { tx } => {
        let reply = match &failed {
          Some(e) => Err(e.clone()),
          None => Ok(()),
        };
        let _ = tx.send(reply);
      }
    }
  }
}

fn upload(heap: &DeviceHeap, dst: &Tensor, data: &[f32]) -> Result<(), KernelError> {
  let mut buf = heap.f32_mut(dst)?;
  if data.len() != buf.len() {
    return Err(KernelError::LengthMismatch {
      expected: buf.len(),
      actual: data.len(),
    });
  }
  buf.copy_from_slice(data);
  Ok(())
}

fn execute(heap: &DeviceHeap, op: &Op) -> Result<(), KernelError> {
  match op {
    Op::Slice {
      src,
      dst,
      axis,
      start,
      len,
    } => {
      let s = heap.f32(src)?;
      let mut d = heap.f32_mut(dst)?;
      kernel::slice_channels(&s, src.shape().dims(), &mut d, *axis, *start, *len)
    }
    Op::Transpose { src, dst, axes } => {
      let s = heap.f32(src)?;
      let mut d = heap.f32_mut(dst)?;
      kernel::transpose(&s, src.shape().dims(), &mut d, axes)
    }
    Op::ReduceMaxArg {
      src,
      max_dst,
      arg_dst,
      axis,
    } => {
      let s = heap.f32(src)?;
      let mut m = heap.f32_mut(max_dst)?;
      let mut a = heap.f32_mut(arg_dst)?;
      kernel::reduce_max_arg(&s, src.shape().dims(), &mut m, &mut a, *axis)
    }
    Op::Mul { a, b, dst } => {
      let x = heap.f32(a)?;
      let y = heap.f32(b)?;
      let mut d = heap.f32_mut(dst)?;
      kernel::mul_elementwise(&x, &y, &mut d)
    }
    Op::DecodeBoxes {
      deltas,
      anchors,
      dst,
      transform,
    } => {
      let dl = heap.f32(deltas)?;
      let an = heap.f32(anchors)?;
      let mut d = heap.f32_mut(dst)?;
      kernel::decode_boxes(&dl, &an, &mut d, transform)
    }
    Op::SortPairsDesc { keys, order } => {
      let mut k = heap.f32_mut(keys)?;
      let mut o = heap.i32_mut(order)?;
      kernel::sort_pairs_desc(&mut k, &mut o)
    }
    Op::Gather {
      src,
      order,
      dst,
      components,
      count,
    } => {
      let s = heap.f32(src)?;
      let o = heap.i32(order)?;
      let mut d = heap.f32_mut(dst)?;
      kernel::gather_rows(&s, &o, &mut d, *components, *count)
    }
    Op::CopyWithin { src, dst } => copy_within(heap, src, dst),
  }
}

fn copy_within(heap: &DeviceHeap, src: &Tensor, dst: &Tensor) -> Result<(), KernelError> {
  match src.dtype() {
    DType::F32 => {
      let s = heap.f32(src)?;
      let mut d = heap.f32_mut(dst)?;
      if s.len() != d.len() {
        return Err(KernelError::LengthMismatch {
          expected: s.len(),
          actual: d.len(),
        });
      }
      d.copy_from_slice(&s);
    }
    DType::I32 => {
      let s = heap.i32(src)?;
      let mut d = heap.i32_mut(dst)?;
      if s.len() != d.len() {
        return Err(KernelError::LengthMismatch {
          expected: s.len(),
          actual: d.len(),
        });
      }
      d.copy_from_slice(&s);
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::super::Shape;
  use super::*;

  #[test]
  fn commands_run_in_fifo_order() {
    let mut heap = DeviceHeap::new();
    let a = heap.alloc_f32("a", Shape::new(&[4]));
    let b = heap.alloc_f32("b", Shape::new(&[4]));
    let c = heap.alloc_f32("c", Shape::new(&[4]));
    let stream = Stream::spawn(heap).unwrap();

    stream.upload(&a, &[1.0, 2.0, 3.0, 4.0]);
    stream.upload(&b, &[10.0, 10.0, 10.0, 10.0]);
    stream.launch(Op::Mul {
      a: a.clone(),
      b: b.clone(),
      dst: c.clone(),
    });
    // 覆盖 b 再乘一次，顺序错了结果就不同。
    stream.upload(&b, &[2.0, 2.0, 2.0, 2.0]);
    stream.launch(Op::Mul {
      a: c.clone(),
      b: b.clone(),
      dst: a.clone(),
    });
    let rb = stream.read_back(&a);
    stream.synchronize().unwrap();
    let got = rb.wait().unwrap();
    assert_eq!(&got[..], &[20.0, 40.0, 60.0, 80.0]);
  }

  #[test]
  fn failure_poisons_stream_and_reports_op_label() {
    let mut heap = DeviceHeap::new();
    let a = heap.alloc_f32("a", Shape::new(&[4]));
    let b = heap.alloc_f32("b", Shape::new(&[2]));
    let c = heap.alloc_f32("c", Shape::new(&[4]));
    let stream = Stream::spawn(heap).unwrap();

    stream.launch(Op::Mul {
      a: a.clone(),
      b: b.clone(),
      dst: c.clone(),
    });
    // 污染之后的启动与回读都被跳过。
    let rb = stream.read_back(&c);
    let err = stream.synchronize().unwrap_err();
    assert!(matches!(err, StreamError::Kernel { op: "mul", .. }));
    let again = stream.synchronize().unwrap_err();
    assert!(matches!(again, StreamError::Kernel { op: "mul", .. }));
    assert!(matches!(rb.wait(), Err(StreamError::Disconnected)));
  }

  #[test]
  fn upload_length_mismatch_fails_at_sync() {
    let mut heap = DeviceHeap::new();
    let a = heap.alloc_f32("a", Shape::new(&[4]));
    let stream = Stream::spawn(heap).unwrap();
    stream.upload(&a, &[1.0, 2.0]);
    let err = stream.synchronize().unwrap_err();
    assert!(matches!(err, StreamError::Upload { tensor: "a", .. }));
  }

  #[test]
  fn device_copy_and_sort_work_through_the_stream() {
    let mut heap = DeviceHeap::new();
    let keys = heap.alloc_f32("keys", Shape::new(&[5]));
    let order_init = heap.alloc_i32("order_init", Shape::new(&[5]));
    let order = heap.alloc_i32("order", Shape::new(&[5]));
    heap.write_i32(&order_init, &[0, 1, 2, 3, 4]).unwrap();
    let stream = Stream::spawn(heap).unwrap();

    stream.upload(&keys, &[0.3, 0.9, 0.1, 0.9, 0.5]);
    stream.launch(Op::CopyWithin {
      src: order_init.clone(),
      dst: order.clone(),
    });
    stream.launch(Op::SortPairsDesc {
      keys: keys.clone(),
      order: order.clone(),
    });
    let rb = stream.read_back(&keys);
    stream.synchronize().unwrap();
    let got = rb.wait().unwrap();
    assert_eq!(&got[..], &[0.9, 0.9, 0.5, 0.3, 0.1]);
  }
}
