// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode/layout.rs - 通道布局归一化
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

use super::{DecodeError, GridGeometry};

/// 把锚框相关的几个轴换到一起的置换: [N,B,x,H,W] -> [N,H,W,B,x]。
const ANCHOR_MAJOR: [usize; 5] = [0, 3, 4, 1, 2];

/// 通道布局归一化：把通道主序的卷积输出切成三段，
/// 再分别转置成锚框主序，使每个锚框的数值连续存放。
pub struct LayoutNormalizer {
  class_slice: Tensor,
  conf_slice: Tensor,
  bbox_slice: Tensor,
  class_grouped: Tensor,
  conf_grouped: Tensor,
  bbox_grouped: Tensor,
  /// 锚框主序的类别概率 [N,H,W,B,C]。
  pub class_trans: Tensor,
  /// 锚框主序的置信度 [N,H,W,B,1]。
  pub conf_trans: Tensor,
  /// 锚框主序的边框回归量 [N,H,W,B,4]。
  pub bbox_trans: Tensor,
}

impl LayoutNormalizer {
  pub fn new(heap: &mut DeviceHeap, g: &GridGeometry) -> Result<Self, DecodeError> {
    let (n, h, w, b, c) = (
      g.batch,
      g.grid_h,
      g.grid_w,
      g.anchors_per_cell,
      g.num_classes,
    );

    let class_slice = heap.alloc_f32("class_slice", Shape::new(&[n, g.class_channels(), h, w]));
    let conf_slice = heap.alloc_f32("conf_slice", Shape::new(&[n, g.conf_channels(), h, w]));
    let bbox_slice = heap.alloc_f32("bbox_slice", Shape::new(&[n, g.bbox_channels(), h, w]));

    let class_grouped = class_slice.reshape("class_grouped", Shape::new(&[n, b, c, h, w]))?;
    let conf_grouped = conf_slice.reshape("conf_grouped", Shape::new(&[n, b, 1, h, w]))?;
    let bbox_grouped = bbox_slice.reshape("bbox_grouped", Shape::new(&[n, b, 4, h, w]))?;

    let class_trans = heap.alloc_f32("class_trans", Shape::new(&[n, h, w, b, c]));
    let conf_trans = heap.alloc_f32("conf_trans", Shape::new(&[n, h, w, b, 1]));
    let bbox_trans = heap.alloc_f32("bbox_trans", Shape::new(&[n, h, w, b, 4]));

    Ok(Self {
      class_slice,
      conf_slice,
      bbox_slice,
      class_grouped,
      conf_grouped,
      bbox_grouped,
      class_trans,
      conf_trans,
      bbox_trans,
    })
  }

  /// 入队一帧的切片与转置。通道轴按类别、置信度、边框的次序
  /// 无缝划分，覆盖全部通道。
  pub fn enqueue(&self, stream: &Stream, convout: &Tensor) {
    let class_len = self.class_slice.shape().dims()[1];
    let conf_len = self.conf_slice.shape().dims()[1];
    let bbox_len = self.bbox_slice.shape().dims()[1];

    stream.launch(Op::Slice {
      src: convout.clone(),
      dst: self.class_slice.clone(),
      axis: 1,
      start: 0,
      len: class_len,
    });
    stream.launch(Op::Slice {
      src: convout.clone(),
      dst: self.conf_slice.clone(),
      axis: 1,
      start: class_len,
      len: conf_len,
    });
    stream.launch(Op::Slice {
      src: convout.clone(),
      dst: self.bbox_slice.clone(),
      axis: 1,
      start: class_len + conf_len,
      len: bbox_len,
    });

    stream.launch(Op::Transpose {
      src: self.class_grouped.clone(),
      dst: self.class_trans.clone(),
      axes: ANCHOR_MAJOR.into(),
    });
    stream.launch(Op::Transpose {
      src: self.conf_grouped.clone(),
      dst: self.conf_trans.clone(),
      axes: ANCHOR_MAJOR.into(),
    });
    stream.launch(Op::Transpose {
      src: self.bbox_grouped.clone(),
      dst: self.bbox_trans.clone(),
      axes: ANCHOR_MAJOR.into(),
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tiny_geometry() -> GridGeometry {
    GridGeometry {
      batch: 1,
      input_w: 40,
      input_h: 20,
      grid_h: 2,
      grid_w: 2,
      anchors_per_cell: 2,
      num_classes: 3,
    }
  }

  /// 通道主序下，锚框 b 的类别 c 位于通道 b*C + c，
  /// 置信度位于通道 b，边框分量 q 位于通道 b*4 + q。
  #[test]
  fn normalization_reorders_channels_to_anchor_major() {
    let g = tiny_geometry();
    let mut heap = DeviceHeap::new();
    let convout = heap.alloc_f32(
      "convout",
      Shape::new(&[1, g.total_channels(), g.grid_h, g.grid_w]),
    );
    let layout = LayoutNormalizer::new(&mut heap, &g).unwrap();

    // 每个格子 (h, w) 的通道 ch 填 ch*100 + h*10 + w。
    let hw = g.grid_h * g.grid_w;
    let mut data = vec![0f32; g.total_channels() * hw];
    for ch in 0..g.total_channels() {
      for h in 0..g.grid_h {
        for w in 0..g.grid_w {
          data[(ch * g.grid_h + h) * g.grid_w + w] = (ch * 100 + h * 10 + w) as f32;
        }
      }
    }

    let stream = Stream::spawn(heap).unwrap();
    stream.upload(&convout, &data);
    layout.enqueue(&stream, &convout);
    let rb_class = stream.read_back(&layout.class_trans);
    let rb_conf = stream.read_back(&layout.conf_trans);
    let rb_bbox = stream.read_back(&layout.bbox_trans);
    stream.synchronize().unwrap();
    let class = rb_class.wait().unwrap();
    let conf = rb_conf.wait().unwrap();
    let bbox = rb_bbox.wait().unwrap();

    let (gh, gw, b, c) = (g.grid_h, g.grid_w, g.anchors_per_cell, g.num_classes);
    for h in 0..gh {
      for w in 0..gw {
        for bi in 0..b {
          let anchor = (h * gw + w) * b + bi;
          for ci in 0..c {
            let expect = ((bi * c + ci) * 100 + h * 10 + w) as f32;
            assert_eq!(class[anchor * c + ci], expect);
          }
          let conf_ch = g.class_channels() + bi;
          assert_eq!(conf[anchor], (conf_ch * 100 + h * 10 + w) as f32);
          for q in 0..4 {
            let bbox_ch = g.class_channels() + g.conf_channels() + bi * 4 + q;
            assert_eq!(bbox[anchor * 4 + q], (bbox_ch * 100 + h * 10 + w) as f32);
          }
        }
      }
    }
  }
}
