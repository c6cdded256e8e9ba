// 该文件是 Wanglou （望楼） 项目的一部分。
// src/task.rs - 任务循环
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

use std::{
  thread,
  time::{Duration, Instant},
};

use tracing::{info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 处理第一张可读的帧后退出。
pub struct OneShotTask;

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = loop {
      match input.next() {
        Some(Ok(frame)) => break frame,
        Some(Err(err)) => warn!("输入帧读取失败，跳过: {}", err),
        None => return Err(anyhow::anyhow!("没有输入帧")),
      }
    };
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 对同一帧反复推理，测量单帧延迟。
pub struct RepeatShotTask;

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    const REPEAT_TIMES: usize = 1000;

    info!("开始任务...");
    let frame = loop {
      match input.next() {
        Some(Ok(frame)) => break frame,
        Some(Err(err)) => warn!("输入帧读取失败，跳过: {}", err),
        None => return Err(anyhow::anyhow!("没有输入帧")),
      }
    };
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(REPEAT_TIMES);
    for i in 0..REPEAT_TIMES {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      info!("({})渲染完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
    }

    // 前两轮算暖场，不计入平均
    warn!(
      "平均推理时间: {:.2?}",
      times.iter().skip(2).sum::<Duration>() / (times.len() - 2) as u32
    );

    Ok(())
  }
}

/// 批量评测任务：遍历输入源的所有帧，逐帧推理并渲染。
///
/// 读取失败的帧记一条警告后跳过，推理与渲染的错误终止任务。
/// Ctrl-C 在当前帧处理完后退出，30 秒内未退出则强制终止进程。
#[derive(Default, Debug)]
pub struct EvalTask {
  frame_limit: Option<usize>,
}

impl EvalTask {
  pub fn with_frame_limit(mut self, frame_limit: Option<usize>) -> Self {
    self.frame_limit = frame_limit;
    self
  }
}

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for EvalTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    // 同一进程里重复注册会失败，评测循环照常跑，只是不响应信号
    if let Err(err) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    }) {
      warn!("注册中断处理器失败: {}", err);
    }

    let mut frames = 0usize;
    let mut read_total = Duration::ZERO;
    let mut infer_total = Duration::ZERO;
    let mut render_total = Duration::ZERO;

    let mut read_start = Instant::now();
    for item in input {
      let read_elapsed = read_start.elapsed();
      let frame = match item {
        Ok(frame) => frame,
        Err(err) => {
          warn!("输入帧读取失败，跳过: {}", err);
          read_start = Instant::now();
          continue;
        }
      };

      let infer_start = Instant::now();
      let result = model.infer(&frame)?;
      let infer_elapsed = infer_start.elapsed();
      let render_start = Instant::now();
      output.render_result(&frame, &result)?;
      let render_elapsed = render_start.elapsed();

      frames += 1;
      read_total += read_elapsed;
      infer_total += infer_elapsed;
      render_total += render_elapsed;
      info!(
        "第 {} 帧: 读图 {:.2?}, 推理 {:.2?}, 渲染 {:.2?}",
        frames, read_elapsed, infer_elapsed, render_elapsed
      );

      if self.frame_limit.map(|n| frames >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frames);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      read_start = Instant::now();
    }

    if frames > 0 {
      let per_frame = (read_total + infer_total + render_total) / frames as u32;
      info!(
        "共处理 {} 帧, 平均读图 {:.2?}, 平均推理 {:.2?}, 平均渲染 {:.2?}, 约 {:.1} fps",
        frames,
        read_total / frames as u32,
        infer_total / frames as u32,
        render_total / frames as u32,
        1.0 / per_frame.as_secs_f64()
      );
    }

    info!("任务完成，退出");
    Ok(())
  }
}
