//! 通道测试实例（ChannelInstance）——由分配器创建，由状态机变更

use super::enums::{ErrorNoteClass, HardPointStatus, OverallStatus, SubTestItem, SubTestStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 一步数字量切换的记录（DI/DO 硬点测试轨迹）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalStep {
    pub step_number: u32,
    pub description: String,
    pub set_value: bool,
    pub expected: bool,
    pub actual: bool,
    pub status: SubTestStatus,
    pub timestamp: DateTime<Utc>,
}

/// 三类错误备注
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotes {
    pub integration: Option<String>,
    pub plc_programming: Option<String>,
    pub hmi_configuration: Option<String>,
}

impl ErrorNotes {
    pub fn set(&mut self, class: ErrorNoteClass, note: Option<String>) {
        match class {
            ErrorNoteClass::Integration => self.integration = note,
            ErrorNoteClass::PlcProgramming => self.plc_programming = note,
            ErrorNoteClass::HmiConfiguration => self.hmi_configuration = note,
        }
    }
}

/// 0/25/50/75/100% 五点采样（AI/AO）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalogSamples {
    pub value_0pct: Option<f32>,
    pub value_25pct: Option<f32>,
    pub value_50pct: Option<f32>,
    pub value_75pct: Option<f32>,
    pub value_100pct: Option<f32>,
}

impl AnalogSamples {
    /// 按百分比序号写入对应字段；NaN 按 null 语义处理（重置-为-null 哨兵）
    pub fn set(&mut self, index: usize, value: f32) {
        let value = if value.is_nan() { None } else { Some(value) };
        match index {
            0 => self.value_0pct = value,
            1 => self.value_25pct = value,
            2 => self.value_50pct = value,
            3 => self.value_75pct = value,
            4 => self.value_100pct = value,
            _ => {}
        }
    }
}

/// 执行期记录：一个 `PointDefinition` 在一个批次里的实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInstance {
    pub instance_id: String,
    pub definition_id: String,
    pub batch_id: String,

    pub test_plc_channel_tag: Option<String>,
    pub test_plc_address: Option<String>,

    pub hard_point_status: HardPointStatus,
    pub sub_items: HashMap<SubTestItem, SubTestStatus>,
    pub overall_status: OverallStatus,

    /// 校验后的量程（I6）：无效或缺失时回落到 0.0/100.0，`range_defaulted`
    /// 标记是否发生了回落
    pub effective_range_low: f32,
    pub effective_range_high: f32,
    pub range_defaulted: bool,

    pub samples: AnalogSamples,
    pub digital_steps: Vec<DigitalStep>,

    pub error_notes: ErrorNotes,
    /// evaluate_overall_status 拼出的复合失败消息
    pub status_message: Option<String>,
    pub skip_reason: Option<String>,

    pub start_time: Option<DateTime<Utc>>,
    pub test_time: Option<DateTime<Utc>>,
    pub final_test_time: Option<DateTime<Utc>>,
    pub updated_time: DateTime<Utc>,

    pub retries_count: u32,
}

impl ChannelInstance {
    pub fn new(definition_id: String, batch_id: String) -> Self {
        let now = Utc::now();
        Self {
            instance_id: super::new_id(),
            definition_id,
            batch_id,
            test_plc_channel_tag: None,
            test_plc_address: None,
            hard_point_status: HardPointStatus::NotTested,
            sub_items: HashMap::new(),
            overall_status: OverallStatus::NotTested,
            effective_range_low: 0.0,
            effective_range_high: 100.0,
            range_defaulted: false,
            samples: AnalogSamples::default(),
            digital_steps: Vec::new(),
            error_notes: ErrorNotes::default(),
            status_message: None,
            skip_reason: None,
            start_time: None,
            test_time: None,
            final_test_time: None,
            updated_time: now,
            retries_count: 0,
        }
    }
}
