//! `channel_instances` 表：ChannelInstance 的 SeaORM 映射
//!
//! 子项状态表、数字量步骤轨迹、采样点、错误备注均作为 JSON 文本列存储，
//! 与点位定义/批次表采用同一种 `From<&T> for ActiveModel` / `From<&Model> for T`
//! 转换模式。

use crate::models::{
    AnalogSamples, ChannelInstance, DigitalStep, ErrorNotes, HardPointStatus, OverallStatus,
    SubTestItem, SubTestStatus,
};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "channel_instances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub instance_id: String,
    pub definition_id: String,
    #[sea_orm(indexed)]
    pub batch_id: String,

    #[sea_orm(nullable)]
    pub test_plc_channel_tag: Option<String>,
    #[sea_orm(nullable)]
    pub test_plc_address: Option<String>,

    pub hard_point_status: String,
    #[sea_orm(column_type = "Text")]
    pub sub_items_json: String,
    pub overall_status: String,

    pub effective_range_low: f32,
    pub effective_range_high: f32,
    pub range_defaulted: bool,

    #[sea_orm(column_type = "Text")]
    pub samples_json: String,
    #[sea_orm(column_type = "Text")]
    pub digital_steps_json: String,
    #[sea_orm(column_type = "Text")]
    pub error_notes_json: String,

    #[sea_orm(nullable)]
    pub status_message: Option<String>,
    #[sea_orm(nullable)]
    pub skip_reason: Option<String>,

    #[sea_orm(nullable)]
    pub start_time: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub test_time: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub final_test_time: Option<DateTime<Utc>>,
    pub updated_time: DateTime<Utc>,

    pub retries_count: u32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn hard_point_status_str(s: HardPointStatus) -> String {
    format!("{:?}", s)
}

fn parse_hard_point_status(s: &str) -> HardPointStatus {
    match s {
        "Waiting" => HardPointStatus::Waiting,
        "Testing" => HardPointStatus::Testing,
        "Passed" => HardPointStatus::Passed,
        "Failed" => HardPointStatus::Failed,
        "Skipped" => HardPointStatus::Skipped,
        "NotApplicable" => HardPointStatus::NotApplicable,
        _ => HardPointStatus::NotTested,
    }
}

fn parse_overall_status(s: &str) -> OverallStatus {
    match s {
        "InProgress" => OverallStatus::InProgress,
        "Passed" => OverallStatus::Passed,
        "Failed" => OverallStatus::Failed,
        "Skipped" => OverallStatus::Skipped,
        _ => OverallStatus::NotTested,
    }
}

impl From<&ChannelInstance> for ActiveModel {
    fn from(i: &ChannelInstance) -> Self {
        let sub_items_json = serde_json::to_string(
            &i.sub_items
                .iter()
                .map(|(k, v)| (format!("{:?}", k), *v))
                .collect::<HashMap<String, SubTestStatus>>(),
        )
        .unwrap_or_else(|_| "{}".to_string());

        Self {
            instance_id: Set(i.instance_id.clone()),
            definition_id: Set(i.definition_id.clone()),
            batch_id: Set(i.batch_id.clone()),
            test_plc_channel_tag: Set(i.test_plc_channel_tag.clone()),
            test_plc_address: Set(i.test_plc_address.clone()),
            hard_point_status: Set(hard_point_status_str(i.hard_point_status)),
            sub_items_json: Set(sub_items_json),
            overall_status: Set(format!("{:?}", i.overall_status)),
            effective_range_low: Set(i.effective_range_low),
            effective_range_high: Set(i.effective_range_high),
            range_defaulted: Set(i.range_defaulted),
            samples_json: Set(serde_json::to_string(&i.samples).unwrap_or_else(|_| "{}".to_string())),
            digital_steps_json: Set(serde_json::to_string(&i.digital_steps).unwrap_or_else(|_| "[]".to_string())),
            error_notes_json: Set(serde_json::to_string(&i.error_notes).unwrap_or_else(|_| "{}".to_string())),
            status_message: Set(i.status_message.clone()),
            skip_reason: Set(i.skip_reason.clone()),
            start_time: Set(i.start_time),
            test_time: Set(i.test_time),
            final_test_time: Set(i.final_test_time),
            updated_time: Set(i.updated_time),
            retries_count: Set(i.retries_count),
        }
    }
}

impl From<&Model> for ChannelInstance {
    fn from(m: &Model) -> Self {
        let raw_sub_items: HashMap<String, SubTestStatus> =
            serde_json::from_str(&m.sub_items_json).unwrap_or_default();
        let sub_items = raw_sub_items
            .into_iter()
            .filter_map(|(k, v)| parse_sub_test_item(&k).map(|item| (item, v)))
            .collect();

        ChannelInstance {
            instance_id: m.instance_id.clone(),
            definition_id: m.definition_id.clone(),
            batch_id: m.batch_id.clone(),
            test_plc_channel_tag: m.test_plc_channel_tag.clone(),
            test_plc_address: m.test_plc_address.clone(),
            hard_point_status: parse_hard_point_status(&m.hard_point_status),
            sub_items,
            overall_status: parse_overall_status(&m.overall_status),
            effective_range_low: m.effective_range_low,
            effective_range_high: m.effective_range_high,
            range_defaulted: m.range_defaulted,
            samples: serde_json::from_str::<AnalogSamples>(&m.samples_json).unwrap_or_default(),
            digital_steps: serde_json::from_str::<Vec<DigitalStep>>(&m.digital_steps_json).unwrap_or_default(),
            error_notes: serde_json::from_str::<ErrorNotes>(&m.error_notes_json).unwrap_or_default(),
            status_message: m.status_message.clone(),
            skip_reason: m.skip_reason.clone(),
            start_time: m.start_time,
            test_time: m.test_time,
            final_test_time: m.final_test_time,
            updated_time: m.updated_time,
            retries_count: m.retries_count,
        }
    }
}

fn parse_sub_test_item(s: &str) -> Option<SubTestItem> {
    Some(match s {
        "ShowValue" => SubTestItem::ShowValue,
        "LowLowAlarm" => SubTestItem::LowLowAlarm,
        "LowAlarm" => SubTestItem::LowAlarm,
        "HighAlarm" => SubTestItem::HighAlarm,
        "HighHighAlarm" => SubTestItem::HighHighAlarm,
        "AlarmValueSet" => SubTestItem::AlarmValueSet,
        "MaintenanceFunction" => SubTestItem::MaintenanceFunction,
        "TrendCheck" => SubTestItem::TrendCheck,
        "ReportCheck" => SubTestItem::ReportCheck,
        _ => return None,
    })
}
