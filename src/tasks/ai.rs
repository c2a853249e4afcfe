//! AI（模拟量输入）硬点任务：测试 PLC 依次写入 0/25/50/75/100% 的百分比值，
//! 被测 PLC 读出对应的工程量 `minValue + range·p/100`，偏差须 ≤ 1%。
//! 偏差超过阈值立即失败。

use super::{CooperativeControl, Cancelled, HardPointTask, RawOutcome, DEVIATION_THRESHOLD_PCT, INTER_STEP_SPACING, SETTLE_DELAY};
use crate::models::AnalogSamples;
use crate::plc::PlcLink;
use async_trait::async_trait;
use std::sync::Arc;

const PERCENTAGES: [f32; 5] = [0.0, 25.0, 50.0, 75.0, 100.0];

/// 一个 AI 通道的硬点任务；`range_low`/`range_high` 已由 `ChannelStateManager`
/// 校验过（无效量程回落到 0-100）
pub struct AiHardPointTask {
    pub test_plc_address: String,
    pub target_plc_address: String,
    pub range_low: f32,
    pub range_high: f32,
}

impl AiHardPointTask {
    pub fn new(test_plc_address: String, target_plc_address: String, range_low: f32, range_high: f32) -> Self {
        Self { test_plc_address, target_plc_address, range_low, range_high }
    }

    fn expected(&self, percent: f32) -> f32 {
        self.range_low + (self.range_high - self.range_low) * percent / 100.0
    }
}

async fn run_steps(
    task: &AiHardPointTask,
    test_link: &Arc<dyn PlcLink>,
    target_link: &Arc<dyn PlcLink>,
    control: &CooperativeControl,
) -> Result<RawOutcome, Cancelled> {
    let range = task.range_high - task.range_low;
    let mut samples = AnalogSamples::default();

    for (index, percent) in PERCENTAGES.iter().enumerate() {
        control.yield_point().await?;
        if let Err(e) = test_link.write_f32(&task.test_plc_address, *percent).await {
            return Ok(RawOutcome {
                is_success: false,
                detail: Some(format!("第{}步写入测试PLC失败 ({}%): {}", index + 1, percent, e)),
                samples: Some(samples),
                digital_steps: Vec::new(),
            });
        }

        control.cooperative_delay(SETTLE_DELAY).await?;

        let expected = task.expected(*percent);
        let actual = match target_link.read_f32(&task.target_plc_address).await {
            Ok(v) => v,
            Err(e) => {
                return Ok(RawOutcome {
                    is_success: false,
                    detail: Some(format!("第{}步读取被测PLC失败 ({}%): {}", index + 1, percent, e)),
                    samples: Some(samples),
                    digital_steps: Vec::new(),
                });
            }
        };

        samples.set(index, actual);

        let deviation_pct = if range.abs() > f32::EPSILON {
            (actual - expected).abs() / range * 100.0
        } else {
            0.0
        };

        if deviation_pct > DEVIATION_THRESHOLD_PCT {
            return Ok(RawOutcome {
                is_success: false,
                detail: Some(format!(
                    "第{}步偏差超限 ({}%): 期望={:.3} 实际={:.3} 偏差={:.2}% > {:.2}%",
                    index + 1,
                    percent,
                    expected,
                    actual,
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
impl HardPointTask for AiHardPointTask {
    async fn run(
        &self,
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
        control: &CooperativeControl,
    ) -> RawOutcome {
        let outcome = run_steps(self, &test_link, &target_link, control).await;

        // finally: 测试PLC输出复位到量程下限（未知量程时为0）
        let reset_value = if self.range_low.is_finite() { self.range_low } else { 0.0 };
        let _ = test_link.write_f32(&self.test_plc_address, reset_value).await;

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

    #[tokio::test]
    async fn happy_path_all_steps_within_tolerance() {
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        test_link.connect().await.unwrap();
        target_link.connect().await.unwrap();

        // stub target PLC: whenever test writes a %, pre-seed exact expected value
        for p in PERCENTAGES {
            target_link.write_f32("4TARGET", 0.0 + 100.0 * p / 100.0).await.unwrap();
        }

        let task = AiHardPointTask::new("4TEST".into(), "4TARGET".into(), 0.0, 100.0);
        let control = CooperativeControl::new(CancellationToken::new());
        let outcome = task.run(test_link.clone(), target_link.clone(), &control).await;

        assert!(outcome.is_success);
        let samples = outcome.samples.unwrap();
        assert_eq!(samples.value_50pct, Some(50.0));
    }

    #[tokio::test(start_paused = true)]
    async fn one_step_deviation_fails_fast_and_later_samples_unset() {
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        test_link.connect().await.unwrap();
        target_link.connect().await.unwrap();

        // Flat target reading of 0.0: the 0% step matches (expected 0), every
        // later step deviates by more than 1% of range, so the 25% step is the
        // first failure and fail-fast stops the sequence there.
        target_link.write_f32("4TARGET", 0.0).await.unwrap();

        let task = AiHardPointTask::new("4TEST".into(), "4TARGET".into(), 0.0, 100.0);
        let control = CooperativeControl::new(CancellationToken::new());
        let outcome = task.run(test_link, target_link, &control).await;

        assert!(!outcome.is_success);
        assert!(outcome.detail.unwrap().contains("第2步"));
        let samples = outcome.samples.unwrap();
        assert_eq!(samples.value_0pct, Some(0.0));
        assert_eq!(samples.value_25pct, None);
    }
}
