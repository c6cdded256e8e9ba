// 该文件是 Wanglou （望楼） 项目的一部分。
// src/output/bbox_image.rs - 标注图输出
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

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::EvalFrame,
  model::{DetectResult, WithLabel},
  output::{
    Render,
    draw::{Draw, ToRgbImage},
  },
};

#[derive(Error, Debug)]
pub enum BboxImageOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("查询参数 {key}={value} 无法解析")]
  BadQuery { key: &'static str, value: String },
}

const BBOX_IMAGE_SCHEME: &str = "bboxes";
const DEFAULT_PLOT_THRESHOLD: f32 = 0.4;

/// 把检测框画到原图并按帧名保存 PNG 的输出。
///
/// `bboxes:///path/to/dir?min=0.5` 中 `min` 为绘制阈值，默认 0.4；
/// 低于阈值的检测仍会进评测记录，只是不画。
pub struct BboxImageOutput<const W: u32, const H: u32> {
  directory: PathBuf,
  draw: Draw,
  min_score: f32,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for BboxImageOutput<W, H> {
  const SCHEME: &'static str = BBOX_IMAGE_SCHEME;
}

impl<const W: u32, const H: u32> FromUrl for BboxImageOutput<W, H> {
  type Error = BboxImageOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != BBOX_IMAGE_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        BBOX_IMAGE_SCHEME,
        url.scheme()
      );
      return Err(BboxImageOutputError::SchemeMismatch);
    }

    let mut min_score = DEFAULT_PLOT_THRESHOLD;
    for (key, value) in url.query_pairs() {
      if key == "min" {
        min_score = value.parse().map_err(|_| BboxImageOutputError::BadQuery {
          key: "min",
          value: value.to_string(),
        })?;
      }
    }

    let directory = PathBuf::from(url.path());
    fs::create_dir_all(&directory)?;

    Ok(BboxImageOutput {
      directory,
      draw: Draw::default(),
      min_score,
    })
  }
}

impl<const W: u32, const H: u32, T: WithLabel> Render<EvalFrame<W, H>, DetectResult<T>>
  for BboxImageOutput<W, H>
{
  type Error = BboxImageOutputError;

  fn render_result(
    &self,
    frame: &EvalFrame<W, H>,
    result: &DetectResult<T>,
  ) -> Result<(), Self::Error> {
    let mut image = frame.to_rgb_image();
    self
      .draw
      .draw_detections_on_image(&mut image, result, self.min_score);

    let path = self.directory.join(frame.name()).with_extension("png");
    image.save(path)?;
    Ok(())
  }
}
