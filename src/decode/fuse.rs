// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode/fuse.rs - 得分融合
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

use crate::tensor::{DeviceHeap, Op, Shape, Stream, Tensor};

use super::GridGeometry;

/// 得分融合：对类别轴做最大值归约取出最优类别及其概率，
/// 再与置信度逐元素相乘得到每个锚框的融合得分。
pub struct ScoreFuser {
  max_probs: Tensor,
  /// 每个锚框的最优类别编号（f32） [N,H,W,B,1]。
  pub max_class: Tensor,
  /// 每个锚框的融合得分 [N,H,W,B,1]。
  pub fused: Tensor,
}

impl ScoreFuser {
  pub fn new(heap: &mut DeviceHeap, g: &GridGeometry) -> Self {
    let (n, h, w, b) = (g.batch, g.grid_h, g.grid_w, g.anchors_per_cell);
    let shape = [n, h, w, b, 1];
    Self {
      max_probs: heap.alloc_f32("max_probs", Shape::new(&shape)),
      max_class: heap.alloc_f32("max_class", Shape::new(&shape)),
      fused: heap.alloc_f32("fused_scores", Shape::new(&shape)),
    }
  }

  pub fn enqueue(&self, stream: &Stream, class_trans: &Tensor, conf_trans: &Tensor) {
    // 类别轴是转置后的最内层轴。
    stream.launch(Op::ReduceMaxArg {
      src: class_trans.clone(),
      max_dst: self.max_probs.clone(),
      arg_dst: self.max_class.clone(),
      axis: class_trans.shape().rank() - 1,
    });
    stream.launch(Op::Mul {
      a: self.max_probs.clone(),
      b: conf_trans.clone(),
      dst: self.fused.clone(),
    });
  }
}
