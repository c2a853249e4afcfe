//! AO（模拟量输出）硬点任务：被测 PLC 依次被命令到 0/25/50/75/100% 的工程量，
//! 测试 PLC 采样对应百分比读数，偏差须 ≤ 1% of range。
//! 与 AI 互为镜像：写/读两端调换。

use super::{CooperativeControl, Cancelled, HardPointTask, RawOutcome, DEVIATION_THRESHOLD_PCT, INTER_STEP_SPACING, SETTLE_DELAY};
use crate::models::AnalogSamples;
use crate::plc::PlcLink;
use async_trait::async_trait;
use std::sync::Arc;

const PERCENTAGES: [f32; 5] = [0.0, 25.0, 50.0, 75.0, 100.0];

pub struct AoHardPointTask {
    pub test_plc_address: String,
    pub target_plc_address: String,
    pub range_low: f32,
    pub range_high: f32,
}

impl AoHardPointTask {
    pub fn new(test_plc_address: String, target_plc_address: String, range_low: f32, range_high: f32) -> Self {
        Self { test_plc_address, target_plc_address, range_low, range_high }
    }

    fn commanded(&self, percent: f32) -> f32 {
        self.range_low + (self.range_high - self.range_low) * percent / 100.0
    }
}

async fn run_steps(
    task: &AoHardPointTask,
    test_link: &Arc<dyn PlcLink>,
    target_link: &Arc<dyn PlcLink>,
    control: &CooperativeControl,
) -> Result<RawOutcome, Cancelled> {
    let range = task.range_high - task.range_low;
    let mut samples = AnalogSamples::default();

    for (index, percent) in PERCENTAGES.iter().enumerate() {
        control.yield_point().await?;
        let commanded = task.commanded(*percent);
        if let Err(e) = target_link.write_f32(&task.target_plc_address, commanded).await {
            return Ok(RawOutcome {
                is_success: false,
                detail: Some(format!("第{}步写入被测PLC失败 ({}%): {}", index + 1, percent, e)),
                samples: Some(samples),
                digital_steps: Vec::new(),
            });
        }

        control.cooperative_delay(SETTLE_DELAY).await?;

        let sampled = match test_link.read_f32(&task.test_plc_address).await {
            Ok(v) => v,
            Err(e) => {
                return Ok(RawOutcome {
                    is_success: false,
                    detail: Some(format!("第{}步读取测试PLC失败 ({}%): {}", index + 1, percent, e)),
                    samples: Some(samples),
                    digital_steps: Vec::new(),
                });
            }
        };

        samples.set(index, sampled);

        let deviation_pct = if range.abs() > f32::EPSILON {
            (sampled - commanded).abs() / range * 100.0
        } else {
            0.0
        };

        if deviation_pct > DEVIATION_THRESHOLD_PCT {
            return Ok(RawOutcome {
                is_success: false,
                detail: Some(format!(
                    "第{}步偏差超限 ({}%): 命令={:.3} 采样={:.3} 偏差={:.2}% > {:.2}%",
                    index + 1,
                    percent,
                    commanded,
                    sampled,
                    deviation_pct,
                    DEVIATION_THRESHOLD_PCT
                )),
                samples: Some(samples),
                digital_steps: Vec::new(),
            });
        }

        if index + 1 < PERCENTAGES.len() {
            control.cooperative_delay(INTER_STEP_SPACING).await?;
        }
    }

    Ok(RawOutcome { is_success: true, detail: None, samples: Some(samples), digital_steps: Vec::new() })
}

#[async_trait]
impl HardPointTask for AoHardPointTask {
    async fn run(
        &self,
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
        control: &CooperativeControl,
    ) -> RawOutcome {
        let outcome = run_steps(self, &test_link, &target_link, control).await;

        // finally: 被测PLC AO复位到量程下限
        let reset_value = if self.range_low.is_finite() { self.range_low } else { 0.0 };
        let _ = target_link.write_f32(&self.target_plc_address, reset_value).await;

        match outcome {
            Ok(o) => o,
            Err(Cancelled) => RawOutcome::cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plc::StubPlcLink;
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn happy_path_mirrors_ai() {
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        test_link.connect().await.unwrap();
        target_link.connect().await.unwrap();

        // test PLC always samples exactly what was commanded
        test_link.write_f32("4TEST", 0.0).await.unwrap();

        let task = AoHardPointTask::new("4TEST".into(), "4TARGET".into(), 0.0, 100.0);
        let control = CooperativeControl::new(CancellationToken::new());

        // drive the stub forward so each write to 4TARGET is mirrored into 4TEST
        // via a concurrent watcher task
        let watcher_test = test_link.clone();
        let watcher_target = target_link.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if let Ok(v) = watcher_target.read_f32("4TARGET").await {
                    watcher_test.write_f32("4TEST", v).await.ok();
                }
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        });

        target_link.write_f32("4TARGET", 0.0).await.unwrap();
        let outcome = task.run(test_link, target_link, &control).await;
        watcher.abort();

        assert!(outcome.is_success);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_on_cancel_leaves_target_at_range_low() {
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        test_link.connect().await.unwrap();
        target_link.connect().await.unwrap();
        test_link.write_f32("4TEST", 0.0).await.unwrap();

        let task = AoHardPointTask::new("4TEST".into(), "4TARGET".into(), 0.0, 100.0);
        let token = CancellationToken::new();
        let control = CooperativeControl::new(token.clone());
        token.cancel();

        let outcome = task.run(test_link, target_link.clone(), &control).await;
        assert!(!outcome.is_success);
        assert_eq!(target_link.read_f32("4TARGET").await.unwrap(), 0.0);
    }
}
