// 该文件是 Wanglou （望楼） 项目的一部分。
// src/frame.rs - NCHW 帧定义
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

use crate::input::{AsNetInput, AsPlanarFrame};

const BGR_CHANNELS: usize = 3;

/// KITTI 训练集的像素均值，按 B、G、R 顺序。
pub const PIXEL_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// 减去均值后的 BGR 平面帧，布局为 [3, H, W]。
#[derive(Debug, Clone)]
pub struct BgrNchwFrame<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> From<Vec<f32>> for BgrNchwFrame<W, H> {
  fn from(data: Vec<f32>) -> Self {
    if data.len() != (BGR_CHANNELS * W as usize * H as usize) {
      panic!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        BGR_CHANNELS * W as usize * H as usize,
        data.len()
      );
    }

    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> Default for BgrNchwFrame<W, H> {
  fn default() -> Self {
    let size = BGR_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0f32; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> BgrNchwFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    BGR_CHANNELS
  }
}

impl<const W: u32, const H: u32> AsMut<[f32]> for BgrNchwFrame<W, H> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl<const W: u32, const H: u32> AsPlanarFrame<W, H> for BgrNchwFrame<W, H> {
  fn as_planar(&self) -> &[f32] {
    &self.data
  }
}

/// 一帧待检测的图像：原始尺寸的 RGB 像素、预处理后的网络输入张量、
/// 以及不带扩展名的帧名（KITTI 记录与标注图按它命名）。
pub struct EvalFrame<const W: u32, const H: u32> {
  name: String,
  image_w: u32,
  image_h: u32,
  rgb: Box<[u8]>,
  tensor: BgrNchwFrame<W, H>,
}

impl<const W: u32, const H: u32> EvalFrame<W, H> {
  pub fn new(
    name: String,
    image_w: u32,
    image_h: u32,
    rgb: Vec<u8>,
    tensor: BgrNchwFrame<W, H>,
  ) -> Self {
    if rgb.len() != BGR_CHANNELS * image_w as usize * image_h as usize {
      panic!(
        "像素数据长度不匹配: 期望长度 {}, 实际长度 {}",
        BGR_CHANNELS * image_w as usize * image_h as usize,
        rgb.len()
      );
    }

    Self {
      name,
      image_w,
      image_h,
      rgb: rgb.into_boxed_slice(),
      tensor,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// 原始尺寸的交错 RGB 像素，每像素三字节。
  pub fn image_rgb(&self) -> &[u8] {
    &self.rgb
  }

  pub fn tensor(&self) -> &BgrNchwFrame<W, H> {
    &self.tensor
  }
}

impl<const W: u32, const H: u32> AsNetInput for EvalFrame<W, H> {
  fn net_input(&self) -> &[f32] {
    self.tensor.as_planar()
  }

  fn frame_name(&self) -> &str {
    &self.name
  }

  fn image_size(&self) -> (u32, u32) {
    (self.image_w, self.image_h)
  }
}
