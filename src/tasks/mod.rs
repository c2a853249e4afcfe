//! `HardPointTask` 变体：每个通道的刺激/采样序列，针对两条 PLC 链路执行，
//! 产出一个原始结果。四个变体共用一个 trait 和一个协作式 yield 辅助
//! (`CooperativeControl`)，集中处理暂停/取消检查和结算延时，避免重复。

pub mod ai;
pub mod ao;
pub mod di;
pub mod do_task;

pub use ai::AiHardPointTask;
pub use ao::AoHardPointTask;
pub use di::DiHardPointTask;
pub use do_task::DoHardPointTask;

use crate::models::{AnalogSamples, DigitalStep};
use crate::plc::PlcLink;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const SETTLE_DELAY: Duration = Duration::from_secs(3);
pub const INTER_STEP_SPACING: Duration = Duration::from_secs(1);
pub const DEVIATION_THRESHOLD_PCT: f32 = 1.0;

/// 一次硬点测试的原始结果；`samples`/`digital_steps` 是
/// `ChannelInstance` 里对应字段的待合并快照（由 `TaskManager` 的单线程
/// apply-outcomes 阶段写回）。
#[derive(Debug, Clone, Default)]
pub struct RawOutcome {
    pub is_success: bool,
    pub detail: Option<String>,
    pub samples: Option<AnalogSamples>,
    pub digital_steps: Vec<DigitalStep>,
}

impl RawOutcome {
    pub fn success() -> Self {
        Self { is_success: true, ..Default::default() }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self { is_success: false, detail: Some(detail.into()), ..Default::default() }
    }

    pub fn cancelled() -> Self {
        Self::failure("cancelled")
    }
}

/// 取消信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// 暂停/取消的协作式控制柄，所有 yield 点都经过这里检查
#[derive(Clone)]
pub struct CooperativeControl {
    pub cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    resume_notify: Arc<Notify>,
}

impl CooperativeControl {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            paused: Arc::new(AtomicBool::new(false)),
            resume_notify: Arc::new(Notify::new()),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// 检查取消；如已暂停则等待恢复或取消
    pub async fn yield_point(&self) -> Result<(), Cancelled> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }
        while self.paused.load(Ordering::Acquire) {
            tokio::select! {
                _ = self.resume_notify.notified() => {}
                _ = self.cancel.cancelled() => return Err(Cancelled),
            }
            if self.cancel.is_cancelled() {
                return Err(Cancelled);
            }
        }
        Ok(())
    }

    /// yield -> sleep(duration) 取消感知 -> yield，集中settle延时/取消检查序列
    pub async fn cooperative_delay(&self, duration: Duration) -> Result<(), Cancelled> {
        self.yield_point().await?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel.cancelled() => return Err(Cancelled),
        }
        self.yield_point().await
    }
}

#[async_trait]
pub trait HardPointTask: Send + Sync {
    async fn run(
        &self,
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
        control: &CooperativeControl,
    ) -> RawOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yield_point_blocks_while_paused_and_releases_on_resume() {
        let control = CooperativeControl::new(CancellationToken::new());
        control.pause();
        let control2 = control.clone();
        let handle = tokio::spawn(async move { control2.yield_point().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        control.resume();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn yield_point_returns_cancelled_when_token_cancelled() {
        let token = CancellationToken::new();
        let control = CooperativeControl::new(token.clone());
        token.cancel();
        assert!(control.yield_point().await.is_err());
    }
}
