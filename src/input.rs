// 该文件是 Wanglou （望楼） 项目的一部分。
// src/input.rs - 图像输入
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

/// 平面 f32 布局（[C, H, W]）的帧。
pub trait AsPlanarFrame<const W: u32, const H: u32> {
  fn as_planar(&self) -> &[f32];
}

/// 可以直接送入检测网络的一帧。
pub trait AsNetInput {
  /// 预处理后的平面数据，长度为 3 * 网络高 * 网络宽。
  fn net_input(&self) -> &[f32];
  /// 不带扩展名的帧名。
  fn frame_name(&self) -> &str;
  /// 原始图像的宽与高。
  fn image_size(&self) -> (u32, u32);
}

#[cfg(feature = "read_image_file")]
mod image_dir;
use crate::{FromUrl, frame::EvalFrame};

#[cfg(feature = "read_image_file")]
pub use self::image_dir::{ImageDirInput, ImageDirInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image directory input error: {0}")]
  ImageDirInputError(#[from] ImageDirInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper<const W: u32, const H: u32> {
  #[cfg(feature = "read_image_file")]
  ImageDir(ImageDirInput<W, H>),
}

impl<const W: u32, const H: u32> FromUrl for InputWrapper<W, H> {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageDirInput::<W, H>::SCHEME {
        let input = ImageDirInput::from_url(url)?;
        return Ok(InputWrapper::ImageDir(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl<const W: u32, const H: u32> InputWrapper<W, H> {
  pub fn into_frames(self) -> InputWrapperIter<W, H> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDir(input) => InputWrapperIter::ImageDir(input.into_frames()),
    }
  }

  pub fn len(&self) -> usize {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDir(input) => input.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

pub enum InputWrapperIter<const W: u32, const H: u32> {
  #[cfg(feature = "read_image_file")]
  ImageDir(self::image_dir::ImageDirFrames<W, H>),
}

impl<const W: u32, const H: u32> Iterator for InputWrapperIter<W, H> {
  type Item = Result<EvalFrame<W, H>, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapperIter::ImageDir(input) => input.next().map(|item| item.map_err(InputError::from)),
    }
  }
}
