// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode/select.rs - top-k 候选筛选
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

use crate::tensor::{DeviceHeap, Op, Readback, Shape, Stream, Tensor};

use super::{DecodeError, GridGeometry};

/// top-k 候选筛选：把序号模板拷成本帧的序号表，与融合得分做
/// 全量降序联排，再按前 k 个序号收集类别与边框。
///
/// 得分本身不收集：排序后融合得分缓冲的前缀就是 top-k 得分，
/// 直接以前缀视图回读。
pub struct TopKSelector {
  order_init: Tensor,
  order: Tensor,
  top_class: Tensor,
  top_boxes: Tensor,
  top_scores: Tensor,
  k: usize,
}

impl TopKSelector {
  pub fn new(
    heap: &mut DeviceHeap,
    g: &GridGeometry,
    k: usize,
    fused: &Tensor,
  ) -> Result<Self, DecodeError> {
    let a = g.anchor_count();
    let order_init = heap.alloc_i32("order_init", Shape::new(&[a]));
    let iota: Vec<i32> = (0..a as i32).collect();
    heap.write_i32(&order_init, &iota)?;
    let order = heap.alloc_i32("order", Shape::new(&[a]));

    let n = g.batch;
    let top_class = heap.alloc_f32("top_class", Shape::new(&[n, k, 1]));
    let top_boxes = heap.alloc_f32("top_boxes", Shape::new(&[n, k, 4]));
    let top_scores = fused.prefix_view("top_scores", Shape::new(&[n, k, 1]))?;

    Ok(Self {
      order_init,
      order,
      top_class,
      top_boxes,
      top_scores,
      k,
    })
  }

  /// 入队排序、收集与三路回读。回读句柄须在同步成功后等待。
  pub fn enqueue(
    &self,
    stream: &Stream,
    fused: &Tensor,
    max_class: &Tensor,
    boxes: &Tensor,
  ) -> (Readback, Readback, Readback) {
    stream.launch(Op::CopyWithin {
      src: self.order_init.clone(),
      dst: self.order.clone(),
    });
    stream.launch(Op::SortPairsDesc {
      keys: fused.clone(),
      order: self.order.clone(),
    });
    stream.launch(Op::Gather {
      src: max_class.clone(),
      order: self.order.clone(),
      dst: self.top_class.clone(),
      components: 1,
      count: self.k,
    });
    stream.launch(Op::Gather {
      src: boxes.clone(),
      order: self.order.clone(),
      dst: self.top_boxes.clone(),
      components: 4,
      count: self.k,
    });

    (
      stream.read_back(&self.top_scores),
      stream.read_back(&self.top_class),
      stream.read_back(&self.top_boxes),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn selects_the_top_entries_in_score_order() {
    let g = GridGeometry {
      batch: 1,
      input_w: 40,
      input_h: 20,
      grid_h: 1,
      grid_w: 3,
      anchors_per_cell: 2,
      num_classes: 2,
    };
    let a = g.anchor_count();
    let mut heap = DeviceHeap::new();
    let fused = heap.alloc_f32("fused_scores", Shape::new(&[1, 1, 3, 2, 1]));
    let max_class = heap.alloc_f32("max_class", Shape::new(&[1, 1, 3, 2, 1]));
    let boxes = heap.alloc_f32("boxes", Shape::new(&[1, 1, 3, 2, 4]));
    let selector = TopKSelector::new(&mut heap, &g, 3, &fused).unwrap();
    let stream = Stream::spawn(heap).unwrap();

    stream.upload(&fused, &[0.3, 0.9, 0.1, 0.95, 0.5, 0.2]);
    stream.upload(&max_class, &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    let mut box_data = vec![0f32; a * 4];
    for (k, chunk) in box_data.chunks_exact_mut(4).enumerate() {
      chunk.copy_from_slice(&[k as f32, k as f32, k as f32 + 1.0, k as f32 + 1.0]);
    }
    stream.upload(&boxes, &box_data);

    let (rb_scores, rb_class, rb_boxes) = selector.enqueue(&stream, &fused, &max_class, &boxes);
    stream.synchronize().unwrap();
    let scores = rb_scores.wait().unwrap();
    let klass = rb_class.wait().unwrap();
    let top_boxes = rb_boxes.wait().unwrap();

    // 降序得分 0.95 (锚框 3), 0.9 (锚框 1), 0.5 (锚框 4)。
    assert_eq!(&scores[..], &[0.95, 0.9, 0.5]);
    assert_eq!(&klass[..], &[1.0, 1.0, 0.0]);
    assert_eq!(&top_boxes[..4], &[3.0, 3.0, 4.0, 4.0]);
    assert_eq!(&top_boxes[4..8], &[1.0, 1.0, 2.0, 2.0]);
    assert_eq!(&top_boxes[8..], &[4.0, 4.0, 5.0, 5.0]);
  }
}
