//! DI（数字量输入）硬点任务：测试 PLC 写 DO {false, true, false}，每步 3s 结算后
//! 被测 PLC 读出的 DI 必须等于命令的逻辑值。

use super::{CooperativeControl, Cancelled, HardPointTask, RawOutcome, INTER_STEP_SPACING, SETTLE_DELAY};
use crate::models::{DigitalStep, SubTestStatus};
use crate::plc::PlcLink;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const SEQUENCE: [bool; 3] = [false, true, false];

pub struct DiHardPointTask {
    pub test_plc_address: String,
    pub target_plc_address: String,
}

impl DiHardPointTask {
    pub fn new(test_plc_address: String, target_plc_address: String) -> Self {
        Self { test_plc_address, target_plc_address }
    }
}

async fn run_steps(
    task: &DiHardPointTask,
    test_link: &Arc<dyn PlcLink>,
    target_link: &Arc<dyn PlcLink>,
    control: &CooperativeControl,
) -> Result<RawOutcome, Cancelled> {
    let mut steps = Vec::with_capacity(SEQUENCE.len());

    for (index, set_value) in SEQUENCE.iter().enumerate() {
        control.yield_point().await?;
        if let Err(e) = test_link.write_bool(&task.test_plc_address, *set_value).await {
            return Ok(RawOutcome {
                is_success: false,
                detail: Some(format!("第{}步写入测试PLC DO失败: {}", index + 1, e)),
                samples: None,
                digital_steps: steps,
            });
        }

        control.cooperative_delay(SETTLE_DELAY).await?;

        let actual = match target_link.read_bool(&task.target_plc_address).await {
            Ok(v) => v,
            Err(e) => {
                return Ok(RawOutcome {
                    is_success: false,
                    detail: Some(format!("第{}步读取被测PLC DI失败: {}", index + 1, e)),
                    samples: None,
                    digital_steps: steps,
                });
            }
        };

        let status = if actual == *set_value { SubTestStatus::Passed } else { SubTestStatus::Failed };
        steps.push(DigitalStep {
            step_number: (index + 1) as u32,
            description: format!("写入测试PLC DO={}，校验被测PLC DI", set_value),
            set_value: *set_value,
            expected: *set_value,
            actual,
            status,
            timestamp: Utc::now(),
        });

        if status == SubTestStatus::Failed {
            return Ok(RawOutcome {
                is_success: false,
                detail: Some(format!(
                    "第{}步失败: 期望DI={} 实际DI={}",
                    index + 1,
                    set_value,
                    actual
                )),
                samples: None,
                digital_steps: steps,
            });
        }

        if index + 1 < SEQUENCE.len() {
            control.cooperative_delay(INTER_STEP_SPACING).await?;
        }
    }

    Ok(RawOutcome { is_success: true, detail: None, samples: None, digital_steps: steps })
}

#[async_trait]
impl HardPointTask for DiHardPointTask {
    async fn run(
        &self,
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
        control: &CooperativeControl,
    ) -> RawOutcome {
        let outcome = run_steps(self, &test_link, &target_link, control).await;

        // finally: 测试PLC DO强制复位为false
        let _ = test_link.write_bool(&self.test_plc_address, false).await;

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
    async fn three_step_sequence_all_passed_and_resets_do_false() {
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        test_link.connect().await.unwrap();
        target_link.connect().await.unwrap();

        let watcher_test = test_link.clone();
        let watcher_target = target_link.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if let Ok(v) = watcher_test.read_bool("0TEST").await {
                    watcher_target.write_bool("0TARGET", v).await.ok();
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        });
        test_link.write_bool("0TEST", false).await.unwrap();
        target_link.write_bool("0TARGET", false).await.unwrap();

        let task = DiHardPointTask::new("0TEST".into(), "0TARGET".into());
        let control = CooperativeControl::new(CancellationToken::new());
        let outcome = task.run(test_link.clone(), target_link, &control).await;
        watcher.abort();

        assert!(outcome.is_success);
        assert_eq!(outcome.digital_steps.len(), 3);
        assert!(outcome.digital_steps.iter().all(|s| s.status == SubTestStatus::Passed));
        assert_eq!(test_link.read_bool("0TEST").await.unwrap(), false);
    }
}
