// 该文件是 Wanglou （望楼） 项目的一部分。
// src/output.rs - 输出定义
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
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "kitti_record", feature = "save_image_file"))]
use crate::FromUrlWithScheme;
use crate::frame::EvalFrame;
use crate::model::{DetectResult, WithLabel};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "kitti_record")]
mod kitti_record;
#[cfg(feature = "kitti_record")]
pub use self::kitti_record::{KittiRecordOutput, KittiRecordOutputError};

#[cfg(feature = "save_image_file")]
mod bbox_image;
#[cfg(feature = "save_image_file")]
pub use self::bbox_image::{BboxImageOutput, BboxImageOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "kitti_record")]
  #[error("KITTI 记录输出错误: {0}")]
  KittiRecordOutputError(#[from] KittiRecordOutputError),
  #[cfg(feature = "save_image_file")]
  #[error("标注图输出错误: {0}")]
  BboxImageOutputError(#[from] BboxImageOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper<const W: u32, const H: u32> {
  #[cfg(feature = "kitti_record")]
  KittiRecordOutput(KittiRecordOutput<W, H>),
  #[cfg(feature = "save_image_file")]
  BboxImageOutput(BboxImageOutput<W, H>),
}

impl<const W: u32, const H: u32> FromUrl for OutputWrapper<W, H> {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "kitti_record")]
    {
      if url.scheme() == KittiRecordOutput::<W, H>::SCHEME {
        let output = KittiRecordOutput::from_url(url)?;
        return Ok(OutputWrapper::KittiRecordOutput(output));
      }
    }
    #[cfg(feature = "save_image_file")]
    {
      if url.scheme() == BboxImageOutput::<W, H>::SCHEME {
        let output = BboxImageOutput::from_url(url)?;
        return Ok(OutputWrapper::BboxImageOutput(output));
      }
    }
    Err(OutputError::SchemeMismatch)
  }
}

impl<const W: u32, const H: u32, T: WithLabel> Render<EvalFrame<W, H>, DetectResult<T>>
  for OutputWrapper<W, H>
{
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &EvalFrame<W, H>,
    result: &DetectResult<T>,
  ) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "kitti_record")]
      OutputWrapper::KittiRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::BboxImageOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

impl<const W: u32, const H: u32, T: WithLabel> Render<EvalFrame<W, H>, DetectResult<T>>
  for Vec<OutputWrapper<W, H>>
{
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &EvalFrame<W, H>,
    result: &DetectResult<T>,
  ) -> Result<(), Self::Error> {
    for output in self {
      output.render_result(frame, result)?;
    }
    Ok(())
  }
}
