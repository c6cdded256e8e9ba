// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode/anchors.rs - 锚框网格
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

use super::{DecodeError, GridGeometry};

/// KITTI 检测网络的 9 个锚框尺寸模板 (宽, 高)，网络输入像素单位。
pub const KITTI_ANCHOR_SHAPES: [[f32; 2]; 9] = [
  [36.0, 37.0],
  [366.0, 174.0],
  [115.0, 59.0],
  [162.0, 87.0],
  [38.0, 90.0],
  [258.0, 173.0],
  [224.0, 108.0],
  [78.0, 170.0],
  [72.0, 43.0],
];

/// 锚框主序的固定锚框表：格 (h, w) 的第 b 个模板位于
/// `(h * W + w) * B + b`，每项为 `[cx, cy, w, h]`。
///
/// 中心在网络输入平面上均匀分布且不贴边：
/// `cx = (w + 1) * input_w / (W + 1)`，`cy = (h + 1) * input_h / (H + 1)`。
#[derive(Debug, Clone)]
pub struct AnchorGrid {
  data: Box<[f32]>,
  count: usize,
}

impl AnchorGrid {
  pub fn build(geometry: &GridGeometry, shapes: &[[f32; 2]]) -> Result<Self, DecodeError> {
    if shapes.len() != geometry.anchors_per_cell {
      return Err(DecodeError::AnchorShapes {
        expected: geometry.anchors_per_cell,
        actual: shapes.len(),
      });
    }
    let count = geometry.anchor_count();
    let mut data = Vec::with_capacity(count * 4);
    for h in 0..geometry.grid_h {
      let cy = (h as f32 + 1.0) * geometry.input_h as f32 / (geometry.grid_h as f32 + 1.0);
      for w in 0..geometry.grid_w {
        let cx = (w as f32 + 1.0) * geometry.input_w as f32 / (geometry.grid_w as f32 + 1.0);
        for shape in shapes {
          data.extend_from_slice(&[cx, cy, shape[0], shape[1]]);
        }
      }
    }
    Ok(Self {
      data: data.into_boxed_slice(),
      count,
    })
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn count(&self) -> usize {
    self.count
  }

  /// 第 k 个锚框的 `[cx, cy, w, h]`。
  pub fn anchor(&self, k: usize) -> [f32; 4] {
    [
      self.data[4 * k],
      self.data[4 * k + 1],
      self.data[4 * k + 2],
      self.data[4 * k + 3],
    ]
  }

  /// 第 k 个锚框的角点形式 `[x1, y1, x2, y2]`。
  pub fn corners(&self, k: usize) -> [f32; 4] {
    let [cx, cy, w, h] = self.anchor(k);
    [
      cx - w * 0.5,
      cy - h * 0.5,
      cx + w * 0.5,
      cy + h * 0.5,
    ]
  }
}
