// 该文件是 Wanglou （望楼） 项目的一部分。
// src/output/kitti_record.rs - KITTI 评测记录输出
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
  output::Render,
};

#[derive(Error, Debug)]
pub enum KittiRecordOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

const KITTI_RECORD_SCHEME: &str = "records";

/// 逐帧写 KITTI 评测记录的输出。
///
/// 每帧在目标目录下生成 `<帧名>.txt`，一条检测一行，
/// 格式与 KITTI 标注一致，截断、遮挡等未知字段按惯例填占位值。
/// 没有检测时也写出空文件，评测脚本要求每帧都有记录。
pub struct KittiRecordOutput<const W: u32, const H: u32> {
  directory: PathBuf,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for KittiRecordOutput<W, H> {
  const SCHEME: &'static str = KITTI_RECORD_SCHEME;
}

impl<const W: u32, const H: u32> FromUrl for KittiRecordOutput<W, H> {
  type Error = KittiRecordOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != KITTI_RECORD_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        KITTI_RECORD_SCHEME,
        url.scheme()
      );
      return Err(KittiRecordOutputError::SchemeMismatch);
    }

    let directory = PathBuf::from(url.path());
    fs::create_dir_all(&directory)?;

    Ok(KittiRecordOutput { directory })
  }
}

impl<const W: u32, const H: u32, T: WithLabel> Render<EvalFrame<W, H>, DetectResult<T>>
  for KittiRecordOutput<W, H>
{
  type Error = KittiRecordOutputError;

  fn render_result(
    &self,
    frame: &EvalFrame<W, H>,
    result: &DetectResult<T>,
  ) -> Result<(), Self::Error> {
    let mut text = String::new();
    for item in result.items.iter() {
      text.push_str(&format!(
        "{} -1 -1 0.0 {:.2} {:.2} {:.2} {:.2} 0.0 0.0 0.0 0.0 0.0 0.0 0.0 {:.3}\n",
        item.kind.to_label_str(),
        item.bbox[0],
        item.bbox[1],
        item.bbox[2],
        item.bbox[3],
        item.score,
      ));
    }

    let path = self.directory.join(frame.name()).with_extension("txt");
    fs::write(path, text)?;
    Ok(())
  }
}
