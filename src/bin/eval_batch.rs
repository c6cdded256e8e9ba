// 该文件是 Wanglou （望楼） 项目的一部分。
// src/bin/eval_batch.rs - 批量评测程序
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
  decode::DecodeConfig,
  frame::EvalFrame,
  input::InputWrapper,
  model::{KittiLabel, ReplayEngine, SqueezeDet, SqueezeDetBuilder},
  output::OutputWrapper,
  task::{EvalTask, Task},
};

const NET_W: u32 = 1248;
const NET_H: u32 = 384;

/// Wanglou 批量评测程序
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理引擎来源，如 replay:///path/to/dumps
  #[arg(long, value_name = "ENGINE")]
  pub engine: Url,
  /// 输入来源，如 images:///path/to/kitti?list=val.txt
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，可多次指定，如 records:///path/to/out 或 bboxes:///path/to/out
  #[arg(long, value_name = "OUTPUT", required = true)]
  pub output: Vec<Url>,
  /// 检测的发射得分阈值
  #[arg(long, value_name = "SCORE", default_value_t = 0.3)]
  pub score_threshold: f32,
  /// 非极大值抑制的交并比阈值
  #[arg(long, value_name = "IOU", default_value_t = 0.4)]
  pub nms_threshold: f32,
  /// 排序后保留的候选数
  #[arg(long, value_name = "TOP_K", default_value_t = 64)]
  pub top_k: usize,
  /// 输出框的横向平移（原图像素）
  #[arg(long, value_name = "PX", default_value_t = 0)]
  pub x_shift: i32,
  /// 输出框的纵向平移（原图像素）
  #[arg(long, value_name = "PX", default_value_t = 0)]
  pub y_shift: i32,
  /// 最多处理的帧数
  #[arg(long, value_name = "FRAME_LIMIT")]
  pub frame_limit: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("推理引擎: {}", args.engine);
  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出路径: {}", output);
  }

  let input = InputWrapper::<NET_W, NET_H>::from_url(&args.input)?;
  let engine = ReplayEngine::from_url(&args.engine)?;
  let mut outputs = Vec::with_capacity(args.output.len());
  for url in &args.output {
    outputs.push(OutputWrapper::<NET_W, NET_H>::from_url(url)?);
  }

  let config = DecodeConfig {
    nms_threshold: args.nms_threshold,
    score_threshold: args.score_threshold,
    top_k: args.top_k,
    x_shift: args.x_shift,
    y_shift: args.y_shift,
    ..DecodeConfig::default()
  };
  let model: SqueezeDet<ReplayEngine, EvalFrame<NET_W, NET_H>, KittiLabel> =
    SqueezeDetBuilder::new().config(config).build(engine)?;

  EvalTask::default()
    .with_frame_limit(args.frame_limit)
    .run_task(input.into_frames(), model, outputs)?;

  Ok(())
}
