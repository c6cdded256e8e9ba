// 该文件是 Wanglou （望楼） 项目的一部分。
// src/model/replay.rs - 卷积输出回放引擎
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
use tracing::{debug, error};
use url::Url;

use crate::input::AsNetInput;
use crate::tensor::{Stream, Tensor};
use crate::{FromUrl, FromUrlWithScheme};

use super::InferenceEngine;

#[derive(Error, Debug)]
pub enum ReplayEngineError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("回放数据读取失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("回放数据 {path:?} 第 {line} 行无法解析为浮点数")]
  Parse { path: PathBuf, line: usize },
  #[error("回放数据 {path:?} 长度不符: 期望 {expected} 个值, 实际 {actual} 个")]
  Length {
    path: PathBuf,
    expected: usize,
    actual: usize,
  },
}

const REPLAY_SCHEME: &str = "replay";

/// 从文本转储回放卷积输出的引擎，让流水线离线运行。
///
/// 目录下每帧一个 `<帧名>.txt`，每行一个十进制浮点值，
/// 按通道主序排列，总数等于卷积输出的元素数。
pub struct ReplayEngine {
  directory: PathBuf,
}

impl ReplayEngine {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }

  fn load(&self, name: &str, expected: usize) -> Result<Vec<f32>, ReplayEngineError> {
    let path = self.directory.join(name).with_extension("txt");
    let text = fs::read_to_string(&path)?;
    let mut values = Vec::with_capacity(expected);
    for (lineno, line) in text.lines().enumerate() {
      for token in line.split_whitespace() {
        let value: f32 = token.parse().map_err(|_| ReplayEngineError::Parse {
          path: path.clone(),
          line: lineno + 1,
        })?;
        values.push(value);
      }
    }
    if values.len() != expected {
      return Err(ReplayEngineError::Length {
        path,
        expected,
        actual: values.len(),
      });
    }
    Ok(values)
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = ReplayEngineError;

  fn infer<F: AsNetInput>(
    &mut self,
    stream: &Stream,
    frame: &F,
    _input: &Tensor,
    convout: &Tensor,
  ) -> Result<(), Self::Error> {
    let values = self.load(frame.frame_name(), convout.elem_count())?;
    debug!("回放 {} 的卷积输出: {} 个值", frame.frame_name(), values.len());
    stream.upload(convout, &values);
    Ok(())
  }
}

impl FromUrl for ReplayEngine {
  type Error = ReplayEngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != REPLAY_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        REPLAY_SCHEME,
        url.scheme()
      );
      return Err(ReplayEngineError::SchemeMismatch);
    }
    Ok(Self::new(url.path()))
  }
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = REPLAY_SCHEME;
}
