// 该文件是 Wanglou （望楼） 项目的一部分。
// src/tensor/kernel.rs - 设备核函数
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

use super::DType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
  #[error("长度不匹配: 期望 {expected} 个元素, 实际 {actual} 个")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("轴 {axis} 超出张量秩 {rank}")]
  BadAxis { axis: usize, rank: usize },
  #[error("通道范围 [{start}, {start}+{len}) 超出通道数 {channels}")]
  ChannelRange {
    start: usize,
    len: usize,
    channels: usize,
  },
  #[error("轴置换无效: {axes:?}")]
  BadPermutation { axes: Box<[usize]> },
  #[error("归约仅支持非空的最内层轴: 轴 {axis}, 秩 {rank}")]
  UnsupportedAxis { axis: usize, rank: usize },
  #[error("边框数据长度 {len} 不是 4 的倍数")]
  BadBoxLength { len: usize },
  #[error("索引 {index} 超出范围 (共 {len} 个元素)")]
  IndexOutOfRange { index: i64, len: usize },
  #[error("张量 {tensor} 数据类型不匹配: 期望 {expected}, 实际 {actual}")]
  DTypeMismatch {
    tensor: &'static str,
    expected: DType,
    actual: DType,
  },
  #[error("张量 {tensor} 超出缓冲容量: 需要 {need} 个元素, 仅有 {have} 个")]
  Capacity {
    tensor: &'static str,
    need: usize,
    have: usize,
  },
  #[error("张量 {tensor} 的缓冲编号 {id} 不属于该堆 (共 {len} 块)")]
  UnknownBuffer {
    tensor: &'static str,
    id: usize,
    len: usize,
  },
}

fn check_len(data: &[f32], expected: usize) -> Result<(), KernelError> {
  if data.len() != expected {
    return Err(KernelError::LengthMismatch {
      expected,
      actual: data.len(),
    });
  }
  Ok(())
}

/// 沿指定轴拷出一段连续通道，目的张量按紧凑布局排列。
pub fn slice_channels(
  src: &[f32],
  src_dims: &[usize],
  dst: &mut [f32],
  axis: usize,
  start: usize,
  len: usize,
) -> Result<(), KernelError> {
  let rank = src_dims.len();
  if axis >= rank {
    return Err(KernelError::BadAxis { axis, rank });
  }
  let channels = src_dims[axis];
  if start + len > channels {
    return Err(KernelError::ChannelRange {
      start,
      len,
      channels,
    });
  }
  let outer: usize = src_dims[..axis].iter().product();
  let inner: usize = src_dims[axis + 1..].iter().product();
  check_len(src, outer * channels * inner)?;
  check_len(dst, outer * len * inner)?;

  for o in 0..outer {
    let src_base = (o * channels + start) * inner;
    let dst_base = o * len * inner;
    dst[dst_base..dst_base + len * inner].copy_from_slice(&src[src_base..src_base + len * inner]);
  }
  Ok(())
}

/// 轴置换: dst_dims[i] = src_dims[axes[i]]。
pub fn transpose(
  src: &[f32],
  src_dims: &[usize],
  dst: &mut [f32],
  axes: &[usize],
) -> Result<(), KernelError> {
  let rank = src_dims.len();
  if axes.len() != rank {
    return Err(KernelError::BadPermutation { axes: axes.into() });
  }
  let mut seen = vec![false; rank];
  for &a in axes {
    if a >= rank || seen[a] {
      return Err(KernelError::BadPermutation { axes: axes.into() });
    }
    seen[a] = true;
  }
  let total: usize = src_dims.iter().product();
  check_len(src, total)?;
  check_len(dst, total)?;

  let mut src_strides = vec![0usize; rank];
  let mut acc = 1usize;
  for i in (0..rank).rev() {
    src_strides[i] = acc;
    acc *= src_dims[i];
  }
  let dst_dims: Vec<usize> = axes.iter().map(|&a| src_dims[a]).collect();
  let step: Vec<usize> = axes.iter().map(|&a| src_strides[a]).collect();

  // 目的坐标按里程计方式递增，源下标随步长同步增减。
  let mut coord = vec![0usize; rank];
  let mut src_idx = 0usize;
  for slot in dst.iter_mut() {
    *slot = src[src_idx];
    for d in (0..rank).rev() {
      coord[d] += 1;
      src_idx += step[d];
      if coord[d] < dst_dims[d] {
        break;
      }
      src_idx -= step[d] * dst_dims[d];
      coord[d] = 0;
    }
  }
  Ok(())
}

/// 对最内层轴做最大值归约，同时给出首个取到最大值的下标（写成 f32）。
///
/// 相等时取最小下标。
pub fn reduce_max_arg(
  src: &[f32],
  src_dims: &[usize],
  max_out: &mut [f32],
  arg_out: &mut [f32],
  axis: usize,
) -> Result<(), KernelError> {
  let rank = src_dims.len();
  if rank == 0 || axis != rank - 1 || src_dims[axis] == 0 {
    return Err(KernelError::UnsupportedAxis { axis, rank });
  }
  let inner = src_dims[axis];
  let total: usize = src_dims.iter().product();
  let groups = total / inner;
  check_len(src, total)?;
  check_len(max_out, groups)?;
  check_len(arg_out, groups)?;

  for g in 0..groups {
    let row = &src[g * inner..(g + 1) * inner];
    let mut best = row[0];
    let mut arg = 0usize;
    for (i, &v) in row.iter().enumerate().skip(1) {
      if v > best {
        best = v;
        arg = i;
      }
    }
    max_out[g] = best;
    arg_out[g] = arg as f32;
  }
  Ok(())
}

/// 逐元素相乘。
pub fn mul_elementwise(a: &[f32], b: &[f32], dst: &mut [f32]) -> Result<(), KernelError> {
  check_len(b, a.len())?;
  check_len(dst, a.len())?;
  for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
    *d = x * y;
  }
  Ok(())
}

/// 边框解码的坐标变换参数。
#[derive(Debug, Clone, Copy)]
pub struct BoxTransform {
  /// 网络输入分辨率。
  pub net_w: f32,
  pub net_h: f32,
  /// 原始图像分辨率。
  pub img_w: f32,
  pub img_h: f32,
  /// 整数像素平移。
  pub x_shift: f32,
  pub y_shift: f32,
}

/// SqueezeDet 边框解码：锚框中心按回归量平移，尺寸按 exp 缩放，
/// 转成角点后缩放到原图分辨率并加上平移。不做越界裁剪。
pub fn decode_boxes(
  deltas: &[f32],
  anchors: &[f32],
  dst: &mut [f32],
  t: &BoxTransform,
) -> Result<(), KernelError> {
  if deltas.len() % 4 != 0 {
    return Err(KernelError::BadBoxLength { len: deltas.len() });
  }
  check_len(anchors, deltas.len())?;
  check_len(dst, deltas.len())?;

  let sx = t.img_w / t.net_w;
  let sy = t.img_h / t.net_h;
  for k in 0..deltas.len() / 4 {
    let d = &deltas[4 * k..4 * k + 4];
    let a = &anchors[4 * k..4 * k + 4];
    let cx = a[0] + d[0] * a[2];
    let cy = a[1] + d[1] * a[3];
    let w = a[2] * d[2].exp();
    let h = a[3] * d[3].exp();
    dst[4 * k] = (cx - w * 0.5) * sx + t.x_shift;
    dst[4 * k + 1] = (cy - h * 0.5) * sy + t.y_shift;
    dst[4 * k + 2] = (cx + w * 0.5) * sx + t.x_shift;
    dst[4 * k + 3] = (cy + h * 0.5) * sy + t.y_shift;
  }
  Ok(())
}

/// 键值对的全量降序排序：keys 就地排好，order 按同一置换重排。
///
/// 相等键保持原有相对次序，任意浮点输入都有确定结果（total_cmp）。
pub fn sort_pairs_desc(keys: &mut [f32], order: &mut [i32]) -> Result<(), KernelError> {
  check_len_i32(order, keys.len())?;
  let n = keys.len();
  let mut perm: Vec<u32> = (0..n as u32).collect();
  perm.sort_by(|&i, &j| keys[j as usize].total_cmp(&keys[i as usize]));

  let sorted_keys: Vec<f32> = perm.iter().map(|&i| keys[i as usize]).collect();
  let sorted_order: Vec<i32> = perm.iter().map(|&i| order[i as usize]).collect();
  keys.copy_from_slice(&sorted_keys);
  order.copy_from_slice(&sorted_order);
  Ok(())
}

fn check_len_i32(data: &[i32], expected: usize) -> Result<(), KernelError> {
  if data.len() != expected {
    return Err(KernelError::LengthMismatch {
      expected,
      actual: data.len(),
    });
  }
  Ok(())
}

/// 按序号表收集前 count 行，每行 components 个元素。
pub fn gather_rows(
  src: &[f32],
  order: &[i32],
  dst: &mut [f32],
  components: usize,
  count: usize,
) -> Result<(), KernelError> {
  if count > order.len() {
    return Err(KernelError::LengthMismatch {
      expected: count,
      actual: order.len(),
    });
  }
  check_len(dst, count * components)?;

  for i in 0..count {
    let idx = order[i];
    if idx < 0 {
      return Err(KernelError::IndexOutOfRange {
        index: idx as i64,
        len: src.len() / components.max(1),
      });
    }
    let off = idx as usize * components;
    if off + components > src.len() {
      return Err(KernelError::IndexOutOfRange {
        index: idx as i64,
        len: src.len() / components.max(1),
      });
    }
    dst[i * components..(i + 1) * components].copy_from_slice(&src[off..off + components]);
  }
  Ok(())
}
