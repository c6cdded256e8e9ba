// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode/boxes.rs - 边框解码阶段
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

use crate::tensor::{BoxTransform, DeviceHeap, Op, Shape, Stream, Tensor};

use super::{AnchorGrid, DecodeError, GridGeometry};

/// 边框解码阶段：持有建立时上传的锚框表，逐帧把回归量
/// 解码成原图坐标系下的角点边框。
pub struct BoxDecoder {
  anchors: Tensor,
  /// 解码后的角点边框 [N,H,W,B,4]。
  pub boxes: Tensor,
  net_w: f32,
  net_h: f32,
}

impl BoxDecoder {
  pub fn new(
    heap: &mut DeviceHeap,
    g: &GridGeometry,
    grid: &AnchorGrid,
  ) -> Result<Self, DecodeError> {
    let (n, h, w, b) = (g.batch, g.grid_h, g.grid_w, g.anchors_per_cell);
    let anchors = heap.alloc_f32("anchors", Shape::new(&[n, h, w, b, 4]));
    heap.write_f32(&anchors, grid.data())?;
    let boxes = heap.alloc_f32("boxes", Shape::new(&[n, h, w, b, 4]));
    Ok(Self {
      anchors,
      boxes,
      net_w: g.input_w as f32,
      net_h: g.input_h as f32,
    })
  }

  /// 入队一帧的边框解码。原图尺寸逐帧变化，平移量来自配置。
  pub fn enqueue(
    &self,
    stream: &Stream,
    bbox_trans: &Tensor,
    img_w: f32,
    img_h: f32,
    x_shift: i32,
    y_shift: i32,
  ) {
    stream.launch(Op::DecodeBoxes {
      deltas: bbox_trans.clone(),
      anchors: self.anchors.clone(),
      dst: self.boxes.clone(),
      transform: BoxTransform {
        net_w: self.net_w,
        net_h: self.net_h,
        img_w,
        img_h,
        x_shift: x_shift as f32,
        y_shift: y_shift as f32,
      },
    });
  }
}
