// 该文件是 Wanglou （望楼） 项目的一部分。
// src/decode/suppress.rs - 非极大值抑制
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

use super::Predictions;

/// 角点形式边框的交并比。交集宽高或并集不为正时记 0。
pub fn iou(a: [f32; 4], b: [f32; 4]) -> f32 {
  let iw = a[2].min(b[2]) - a[0].max(b[0]);
  let ih = a[3].min(b[3]) - a[1].max(b[1]);
  if iw <= 0.0 || ih <= 0.0 {
    return 0.0;
  }
  let inter = iw * ih;
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - inter;
  if union <= 0.0 {
    return 0.0;
  }
  inter / union
}

/// 贪心的逐类别非极大值抑制。
///
/// 候选已按得分降序排列。掩码先整体置真；对每对 i < j，
/// 若 j 未被抑制、两者同类且交并比超过阈值，则抑制 j。
/// i 自身是否已被抑制不影响它抑制后面的重叠候选，
/// 掩码只会由真变假。得分阈值在产出阶段另行处理，这里不参与。
pub fn filter_detections(preds: &mut Predictions, nms_threshold: f32) {
  for flag in preds.keep.iter_mut() {
    *flag = true;
  }
  for i in 0..preds.num {
    for j in i + 1..preds.num {
      if !preds.keep[j] || preds.klass[i] != preds.klass[j] {
        continue;
      }
      if iou(preds.bbox_of(i), preds.bbox_of(j)) > nms_threshold {
        preds.keep[j] = false;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  use super::*;

  fn preds_from(klass: &[f32], score: &[f32], bbox: &[f32]) -> Predictions {
    let mut preds = Predictions::with_capacity(klass.len());
    preds.klass.copy_from_slice(klass);
    preds.score.copy_from_slice(score);
    preds.bbox.copy_from_slice(bbox);
    preds
  }

  #[test]
  fn iou_of_known_overlap() {
    // 10x10 与 10x10 重叠 5x10: 50 / 150。
    let a = [0.0, 0.0, 10.0, 10.0];
    let b = [5.0, 0.0, 15.0, 10.0];
    assert!((iou(a, b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn iou_of_disjoint_and_degenerate_boxes_is_zero() {
    let a = [0.0, 0.0, 10.0, 10.0];
    let b = [20.0, 20.0, 30.0, 30.0];
    assert_eq!(iou(a, b), 0.0);
    // 零面积边框与任何边框的交并比都是 0。
    let line = [5.0, 5.0, 5.0, 8.0];
    assert_eq!(iou(a, line), 0.0);
    assert_eq!(iou(line, line), 0.0);
  }

  #[test]
  fn higher_scored_box_suppresses_same_class_overlap() {
    let mut preds = preds_from(
      &[0.0, 0.0],
      &[0.9, 0.5],
      &[0.0, 0.0, 10.0, 10.0, 1.0, 0.0, 11.0, 10.0],
    );
    filter_detections(&mut preds, 0.4);
    assert_eq!(&preds.keep[..], &[true, false]);
  }

  #[test]
  fn different_classes_never_suppress_each_other() {
    let mut preds = preds_from(
      &[0.0, 1.0],
      &[0.9, 0.5],
      &[0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 10.0, 10.0],
    );
    filter_detections(&mut preds, 0.4);
    assert_eq!(&preds.keep[..], &[true, true]);
  }

  #[test]
  fn suppressed_box_still_suppresses_later_overlaps() {
    // A 压住 B；B 虽已被抑制，仍把与它重叠的 C 压掉。
    // A 与 C 本身重叠不足，链式抑制由 B 传递。
    let mut preds = preds_from(
      &[0.0, 0.0, 0.0],
      &[0.9, 0.8, 0.7],
      &[
        0.0, 0.0, 10.0, 10.0, // A
        4.0, 0.0, 14.0, 10.0, // B: 与 A 交并比 6/14
        9.0, 0.0, 19.0, 10.0, // C: 与 B 交并比 5/15, 与 A 交并比 1/19
      ],
    );
    filter_detections(&mut preds, 0.3);
    assert_eq!(&preds.keep[..], &[true, false, false]);
  }

  #[test]
  fn identical_boxes_keep_the_earliest() {
    let mut preds = preds_from(
      &[2.0, 2.0, 2.0],
      &[0.9, 0.9, 0.9],
      &[
        0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 10.0, 10.0,
      ],
    );
    filter_detections(&mut preds, 0.4);
    assert_eq!(&preds.keep[..], &[true, false, false]);
  }

  #[test]
  fn mask_resets_on_every_call() {
    let mut preds = preds_from(
      &[0.0, 0.0],
      &[0.9, 0.5],
      &[0.0, 0.0, 10.0, 10.0, 100.0, 100.0, 110.0, 110.0],
    );
    preds.keep[1] = false;
    filter_detections(&mut preds, 0.4);
    assert_eq!(&preds.keep[..], &[true, true]);
  }

  #[test]
  fn kept_same_class_pairs_stay_under_the_threshold() {
    let mut rng = StdRng::seed_from_u64(11);
    let n = 48;
    let mut klass = Vec::with_capacity(n);
    let mut score = Vec::with_capacity(n);
    let mut bbox = Vec::with_capacity(n * 4);
    for i in 0..n {
      klass.push((i % 3) as f32);
      score.push(1.0 - i as f32 / n as f32);
      let x = rng.random_range(0.0f32..80.0);
      let y = rng.random_range(0.0f32..40.0);
      let w = rng.random_range(4.0f32..30.0);
      let h = rng.random_range(4.0f32..30.0);
      bbox.extend_from_slice(&[x, y, x + w, y + h]);
    }
    let mut preds = preds_from(&klass, &score, &bbox);
    filter_detections(&mut preds, 0.4);

    for i in 0..n {
      for j in i + 1..n {
        if preds.keep[i] && preds.keep[j] && preds.klass[i] == preds.klass[j] {
          assert!(iou(preds.bbox_of(i), preds.bbox_of(j)) <= 0.4);
        }
      }
    }
    // 至少有一个候选留下。
    assert!(preds.keep.iter().any(|&k| k));
  }
}
