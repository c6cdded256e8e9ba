// 该文件是 Wanglou （望楼） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
  frame::EvalFrame,
  input::AsNetInput,
  model::{DetectItem, DetectResult, WithLabel},
};

// 默认调色板，按类别编号取色
const CLASS_COLORS: [[u8; 3]; 3] = [
  [0, 255, 255],  // 车辆
  [255, 0, 255],  // 行人
  [255, 255, 0],  // 骑行者
];
const BORDER_THICKNESS: i32 = 2;

pub struct Draw {
  border_thickness: i32,
  palette: [[u8; 3]; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      border_thickness: BORDER_THICKNESS,
      palette: CLASS_COLORS,
    }
  }
}

impl Draw {
  /// 把得分不低于 `min_score` 的检测框画到图上。
  pub fn draw_detections_on_image<T: WithLabel>(
    &self,
    image: &mut RgbImage,
    result: &DetectResult<T>,
    min_score: f32,
  ) {
    for DetectItem { kind, score, bbox } in result.items.iter() {
      if *score < min_score {
        continue;
      }
      let color = self.palette[kind.to_label_id() as usize % self.palette.len()];
      self.draw_bbox(image, bbox, color);
    }
  }

  // bbox 为原图像素坐标 [x_min, y_min, x_max, y_max]，解码不裁边，
  // 画之前收拢到图像范围内
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &[f32; 4], color: [u8; 3]) {
    let (w, h) = (image.width() as i32, image.height() as i32);

    let x_min = (bbox[0].floor() as i32).clamp(0, w - 1);
    let y_min = (bbox[1].floor() as i32).clamp(0, h - 1);
    let x_max = (bbox[2].ceil() as i32).clamp(0, w - 1);
    let y_max = (bbox[3].ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for thickness in 0..self.border_thickness {
      let left = (x_min + thickness).min(w - 1);
      let top = (y_min + thickness).min(h - 1);
      let right = (x_max - thickness).max(0);
      let bottom = (y_max - thickness).max(0);
      if left >= right || top >= bottom {
        break;
      }

      let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }
  }
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl<const W: u32, const H: u32> ToRgbImage for EvalFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    let (width, height) = self.image_size();
    let data = self.image_rgb();

    // 交错 RGB 转为图像
    ImageBuffer::from_fn(width, height, |x, y| {
      let idx = ((y * width + x) * 3) as usize;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

#[cfg(test)]
mod tests {
  use crate::model::KittiLabel;

  use super::*;

  fn one_car(bbox: [f32; 4], score: f32) -> DetectResult<KittiLabel> {
    DetectResult {
      items: vec![DetectItem {
        kind: KittiLabel::Car,
        score,
        bbox,
      }]
      .into(),
    }
  }

  #[test]
  fn border_is_drawn_hollow() {
    let mut image = RgbImage::new(20, 10);
    let draw = Draw::default();
    draw.draw_detections_on_image(&mut image, &one_car([2.0, 2.0, 10.0, 7.0], 0.9), 0.4);

    let car = Rgb(CLASS_COLORS[0]);
    assert_eq!(*image.get_pixel(2, 2), car);
    assert_eq!(*image.get_pixel(10, 7), car);
    assert_eq!(*image.get_pixel(3, 3), car);
    assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
  }

  #[test]
  fn low_score_is_not_drawn() {
    let mut image = RgbImage::new(20, 10);
    let draw = Draw::default();
    draw.draw_detections_on_image(&mut image, &one_car([2.0, 2.0, 10.0, 7.0], 0.2), 0.4);

    assert_eq!(*image.get_pixel(2, 2), Rgb([0, 0, 0]));
  }

  #[test]
  fn bbox_outside_image_is_clamped() {
    let mut image = RgbImage::new(20, 10);
    let draw = Draw::default();
    draw.draw_detections_on_image(&mut image, &one_car([-5.0, -5.0, 100.0, 100.0], 0.9), 0.4);

    assert_eq!(*image.get_pixel(0, 0), Rgb(CLASS_COLORS[0]));
    assert_eq!(*image.get_pixel(19, 9), Rgb(CLASS_COLORS[0]));
  }

  #[test]
  fn eval_frame_converts_to_rgb_image() {
    let frame = EvalFrame::<2, 1>::new(
      "f".into(),
      2,
      1,
      vec![10, 20, 30, 40, 50, 60],
      crate::frame::BgrNchwFrame::default(),
    );
    let image = frame.to_rgb_image();
    assert_eq!(*image.get_pixel(0, 0), Rgb([10, 20, 30]));
    assert_eq!(*image.get_pixel(1, 0), Rgb([40, 50, 60]));
  }
}
