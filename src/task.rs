// 该文件是 Zitai （姿态） 项目的一部分。
// src/task.rs - 批量推理任务
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

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  input::ImageListing,
  model::{Model, RawPrediction},
  normalize::normalize,
  output::{Completion, Render},
  record::CanonicalResult,
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 单次运行的进度计数，不落盘
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchState {
  pub total: usize,
  pub processed: usize,
  pub skipped_existing: usize,
  pub failed_or_empty: usize,
}

/// 单张图像的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
  SkippedExisting,
  Written,
  Empty,
}

impl BatchState {
  pub fn new(total: usize) -> Self {
    BatchState {
      total,
      ..Default::default()
    }
  }

  pub fn record(&mut self, outcome: ItemOutcome) {
    match outcome {
      ItemOutcome::SkippedExisting => self.skipped_existing += 1,
      ItemOutcome::Written => self.processed += 1,
      ItemOutcome::Empty => self.failed_or_empty += 1,
    }
  }

  /// `total == processed + skipped_existing + failed_or_empty`
  pub fn is_consistent(&self) -> bool {
    self.total == self.processed + self.skipped_existing + self.failed_or_empty
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
  pub state: BatchState,
  /// 因数量上限或中断信号提前结束
  pub interrupted: bool,
}

/// 逐张处理输入目录，已有结果的图像直接跳过
#[derive(Default, Debug)]
pub struct BatchTask {
  limit: Option<usize>,
  stop: Option<Arc<AtomicBool>>,
}

impl BatchTask {
  /// 本次运行最多调用模型的次数
  pub fn with_limit(mut self, limit: Option<usize>) -> Self {
    self.limit = limit;
    self
  }

  pub fn with_stop_signal(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  fn should_stop(&self, inferred: usize) -> bool {
    if self.limit.is_some_and(|limit| inferred >= limit) {
      info!("达到数量上限 {}, 退出任务循环", inferred);
      return true;
    }
    if self.stop.as_ref().is_some_and(|stop| stop.load(Ordering::SeqCst)) {
      warn!("中断信号接收，退出任务循环");
      return true;
    }
    false
  }

  /// 处理一张尚未完成的图像：推理、规范化、写出
  ///
  /// 推理失败与空结果一样计为失败；写出失败直接返回错误。
  pub fn process_item<M, O>(
    &self,
    name: &str,
    path: &Path,
    model: &M,
    output: &O,
  ) -> anyhow::Result<ItemOutcome>
  where
    M: Model<Input = Path>,
    M::Output: IntoIterator<Item = RawPrediction>,
    M::Error: std::fmt::Display,
    O: Render<CanonicalResult>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let prediction = match model.infer(path) {
      Ok(output) => output.into_iter().next(),
      Err(e) => {
        warn!("推理失败 {}: {}", name, e);
        return Ok(ItemOutcome::Empty);
      }
    };

    let Some(prediction) = prediction else {
      warn!("模型没有返回预测结果: {}", name);
      return Ok(ItemOutcome::Empty);
    };

    let normalized = normalize(&prediction);
    if !normalized.has_keypoints() {
      warn!("未在 {} 中检测到关键点，跳过", name);
      return Ok(ItemOutcome::Empty);
    }

    output
      .render_result(name, &normalized.record)
      .with_context(|| format!("无法保存 {} 的结果", name))?;
    Ok(ItemOutcome::Written)
  }
}

impl<M, O> Task<ImageListing, M, O> for BatchTask
where
  M: Model<Input = Path>,
  M::Output: IntoIterator<Item = RawPrediction>,
  M::Error: std::fmt::Display,
  O: Render<CanonicalResult> + Completion,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = BatchSummary;
  type Error = anyhow::Error;

  fn run_task(self, input: ImageListing, model: M, output: O) -> Result<Self::Output, Self::Error> {
    let mut state = BatchState::new(input.len());
    if input.is_empty() {
      warn!("{} 中没有 PNG 或 JPG 文件", input.directory.display());
      return Ok(BatchSummary {
        state,
        interrupted: false,
      });
    }

    info!("开始处理 {} 张图像...", state.total);
    let mut inferred = 0usize;
    let mut interrupted = false;
    for (index, name) in input.eligible.iter().enumerate() {
      let index = index + 1;
      if output.is_complete(name) {
        info!("跳过 {}，结果已存在", name);
        state.record(ItemOutcome::SkippedExisting);
        continue;
      }

      if self.should_stop(inferred) {
        interrupted = true;
        break;
      }

      info!("处理第 {}/{} 张图像: {}", index, state.total, name);
      let outcome = self.process_item(name, &input.path_of(name), &model, &output)?;
      inferred += 1;
      state.record(outcome);
      if outcome == ItemOutcome::Written {
        info!(
          "进度: {}/{} ({:.1}%)",
          index,
          state.total,
          index as f64 / state.total as f64 * 100.0
        );
      }
    }

    info!("处理完成!");
    info!("图像总数: {}", state.total);
    info!("成功处理: {}", state.processed);
    info!("跳过（已存在）: {}", state.skipped_existing);
    info!("失败或无关键点: {}", state.failed_or_empty);
    if interrupted {
      warn!(
        "任务提前结束，剩余 {} 张图像未处理",
        state.total - state.processed - state.skipped_existing - state.failed_or_empty
      );
    }

    Ok(BatchSummary { state, interrupted })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn state_records_outcomes() {
    let mut state = BatchState::new(3);
    assert!(!state.is_consistent());
    for outcome in [
      ItemOutcome::SkippedExisting,
      ItemOutcome::Written,
      ItemOutcome::Empty,
    ] {
      state.record(outcome);
    }
    assert_eq!(
      state,
      BatchState {
        total: 3,
        processed: 1,
        skipped_existing: 1,
        failed_or_empty: 1,
      }
    );
    assert!(state.is_consistent());
  }
}
