// 该文件是 Wanglou （望楼） 项目的一部分。
// src/bin/simple_repeatshot.rs - 单帧重复推理测试代码
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use tracing::info;
use wanglou::{
  FromUrl,
  frame::EvalFrame,
  input::InputWrapper,
  model::{KittiLabel, ReplayEngine, SqueezeDet, SqueezeDetBuilder},
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};

const NET_W: u32 = 1248;
const NET_H: u32 = 384;

/// Wanglou 单帧重复推理测试
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎来源
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理引擎: {}", args.engine);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::<NET_W, NET_H>::from_url(&args.input)?;
  let engine = ReplayEngine::from_url(&args.engine)?;
  let output = OutputWrapper::<NET_W, NET_H>::from_url(&args.output)?;
  let model: SqueezeDet<ReplayEngine, EvalFrame<NET_W, NET_H>, KittiLabel> =
    SqueezeDetBuilder::new().build(engine)?;

  RepeatShotTask.run_task(input.into_frames(), model, output)?;

  Ok(())
}
