//! DO（数字量输出）硬点任务：被测 PLC DO 依次被命令 {true, false}，
//! 测试 PLC DI 必须观测到命令的逻辑值。
//! 与 DI 互为镜像：写/读两端调换。

use super::{CooperativeControl, Cancelled, HardPointTask, RawOutcome, INTER_STEP_SPACING, SETTLE_DELAY};
use crate::models::{DigitalStep, SubTestStatus};
use crate::plc::PlcLink;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const SEQUENCE: [bool; 2] = [true, false];

pub struct DoHardPointTask {
    pub test_plc_address: String,
    pub target_plc_address: String,
}

impl DoHardPointTask {
    pub fn new(test_plc_address: String, target_plc_address: String) -> Self {
        Self { test_plc_address, target_plc_address }
    }
}

async fn run_steps(
    task: &DoHardPointTask,
    test_link: &Arc<dyn PlcLink>,
    target_link: &Arc<dyn PlcLink>,
    control: &CooperativeControl,
) -> Result<RawOutcome, Cancelled> {
    let mut steps = Vec::with_capacity(SEQUENCE.len());

    for (index, set_value) in SEQUENCE.iter().enumerate() {
        control.yield_point().await?;
        if let Err(e) = target_link.write_bool(&task.target_plc_address, *set_value).await {
            return Ok(RawOutcome {
                is_success: false,
                detail: Some(format!("第{}步写入被测PLC DO失败: {}", index + 1, e)),
                samples: None,
                digital_steps: steps,
            });
        }

        control.cooperative_delay(SETTLE_DELAY).await?;

        let actual = match test_link.read_bool(&task.test_plc_address).await {
            Ok(v) => v,
            Err(e) => {
                return Ok(RawOutcome {
                    is_success: false,
                    detail: Some(format!("第{}步读取测试PLC DI失败: {}", index + 1, e)),
                    samples: None,
                    digital_steps: steps,
                });
            }
        };

        let status = if actual == *set_value { SubTestStatus::Passed } else { SubTestStatus::Failed };
        steps.push(DigitalStep {
            step_number: (index + 1) as u32,
            description: format!("命令被测PLC DO={}，校验测试PLC DI", set_value),
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
impl HardPointTask for DoHardPointTask {
    async fn run(
        &self,
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
        control: &CooperativeControl,
    ) -> RawOutcome {
        let outcome = run_steps(self, &test_link, &target_link, control).await;

        // finally: 被测PLC DO强制复位为false
        let _ = target_link.write_bool(&self.target_plc_address, false).await;

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
    async fn cancel_mid_sequence_forces_target_do_false() {
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        test_link.connect().await.unwrap();
        target_link.connect().await.unwrap();
        target_link.write_bool("0TARGET", false).await.unwrap();

        let task = DoHardPointTask::new("0TEST".into(), "0TARGET".into());
        let token = CancellationToken::new();
        let control = CooperativeControl::new(token.clone());

        // cancel right after the first write lands, before the settle delay elapses
        let cancel_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            cancel_token.cancel();
        });

        let outcome = task.run(test_link, target_link.clone(), &control).await;

        assert!(!outcome.is_success);
        assert!(outcome.detail.unwrap().contains("cancelled"));
        assert_eq!(target_link.read_bool("0TARGET").await.unwrap(), false);
    }
}
