//! 通道状态管理器：唯一允许修改 `ChannelInstance` 核心状态的组件
//!
//! 纯函数式模块，不做任何 I/O；所有状态变更都通过这里完成，从而保证
//! `overall_status` 始终是 `hard_point_status` 与子项状态向量的纯函数，
//! 在任意静止点都成立。

use crate::models::{
    AnalogSamples, ChannelInstance, ErrorNoteClass, HardPointStatus, ModuleType, OverallStatus,
    PointDefinition, SubTestItem, SubTestStatus,
};
use chrono::Utc;

/// 纯状态机；`legacy_manual_pass_without_hardpoint` 是一个兼容开关，控制是否
/// 允许手动子测试在 `hard_point_status` 仍为 `NotTested` 时把整体状态判为
/// `Passed`，默认关闭（采用修正后的规则，硬点必须先完成才能整体通过）。
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelStateManager {
    pub legacy_manual_pass_without_hardpoint: bool,
}

impl ChannelStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_legacy_manual_pass(mut self, enabled: bool) -> Self {
        self.legacy_manual_pass_without_hardpoint = enabled;
        self
    }

    /// 从定义初始化一个全新的实例
    pub fn initialize(&self, definition: &PointDefinition) -> ChannelInstance {
        let mut instance = ChannelInstance::new(definition.id.clone(), String::new());

        let is_analog = matches!(definition.module_type, ModuleType::AI | ModuleType::AO);
        if is_analog {
            let (low, high, defaulted) = self.validate_range(definition.range_low, definition.range_high);
            if defaulted {
                log::warn!(
                    "点位 {} 量程无效 (low={:?}, high={:?})，回落为 0.0-100.0",
                    definition.tag,
                    definition.range_low,
                    definition.range_high
                );
            }
            instance.effective_range_low = low;
            instance.effective_range_high = high;
            instance.range_defaulted = defaulted;
        }

        for item in SubTestItem::ALL {
            instance.sub_items.insert(item, SubTestStatus::NotTested);
        }

        if definition.is_yldw() || !is_analog {
            // DI/DO 及 YLDW 变量：所有模拟量子项不适用
            for item in [
                SubTestItem::ShowValue,
                SubTestItem::LowLowAlarm,
                SubTestItem::LowAlarm,
                SubTestItem::HighAlarm,
                SubTestItem::HighHighAlarm,
                SubTestItem::AlarmValueSet,
                SubTestItem::MaintenanceFunction,
                SubTestItem::TrendCheck,
                SubTestItem::ReportCheck,
            ] {
                instance.sub_items.insert(item, SubTestStatus::NotApplicable);
            }
        } else {
            match definition.module_type {
                ModuleType::AI => {
                    instance.sub_items.insert(
                        SubTestItem::LowLowAlarm,
                        na_if_absent(definition.sll.value),
                    );
                    instance.sub_items.insert(
                        SubTestItem::LowAlarm,
                        na_if_absent(definition.sl.value),
                    );
                    instance.sub_items.insert(
                        SubTestItem::HighAlarm,
                        na_if_absent(definition.sh.value),
                    );
                    instance.sub_items.insert(
                        SubTestItem::HighHighAlarm,
                        na_if_absent(definition.shh.value),
                    );
                    if !definition.has_any_alarm_setpoint() {
                        instance
                            .sub_items
                            .insert(SubTestItem::AlarmValueSet, SubTestStatus::NotApplicable);
                    }
                }
                ModuleType::AO => {
                    for item in [
                        SubTestItem::LowLowAlarm,
                        SubTestItem::LowAlarm,
                        SubTestItem::HighAlarm,
                        SubTestItem::HighHighAlarm,
                        SubTestItem::AlarmValueSet,
                    ] {
                        instance.sub_items.insert(item, SubTestStatus::NotApplicable);
                    }
                    // AO 维护功能按惯例直接置为 Passed
                    instance
                        .sub_items
                        .insert(SubTestItem::MaintenanceFunction, SubTestStatus::Passed);
                }
                _ => unreachable!("analog guard above excludes DI/DO"),
            }
        }

        instance.hard_point_status = HardPointStatus::NotTested;
        instance.overall_status = OverallStatus::NotTested;
        instance
    }

    /// 校验量程；无效量程回落到 0-100 并返回是否发出了警告
    pub fn validate_range(&self, low: Option<f32>, high: Option<f32>) -> (f32, f32, bool) {
        match (low, high) {
            (Some(l), Some(h)) if h > l => (l, h, false),
            (None, None) => (0.0, 100.0, false),
            _ => (0.0, 100.0, true),
        }
    }

    /// 应用通道分配
    pub fn apply_allocation(&self, instance: &mut ChannelInstance, batch_id: &str, tag: &str, address: &str) {
        instance.batch_id = batch_id.to_string();
        instance.test_plc_channel_tag = Some(tag.to_string());
        instance.test_plc_address = Some(address.to_string());
        self.reset_non_applicable_to_not_tested(instance);
        self.evaluate_overall_status(instance);
    }

    /// 清除通道分配
    pub fn clear_allocation(&self, instance: &mut ChannelInstance) {
        instance.test_plc_channel_tag = None;
        instance.test_plc_address = None;
        self.reset_non_applicable_to_not_tested(instance);
        self.evaluate_overall_status(instance);
    }

    fn reset_non_applicable_to_not_tested(&self, instance: &mut ChannelInstance) {
        for status in instance.sub_items.values_mut() {
            if *status != SubTestStatus::NotApplicable {
                *status = SubTestStatus::NotTested;
            }
        }
        instance.hard_point_status = HardPointStatus::NotTested;
        instance.samples = AnalogSamples::default();
        instance.digital_steps.clear();
        instance.start_time = None;
        instance.test_time = None;
        instance.final_test_time = None;
    }

    /// 准备接线：NotTested -> Waiting
    pub fn prepare_for_wiring(&self, instance: &mut ChannelInstance) {
        if instance.hard_point_status == HardPointStatus::NotTested {
            instance.hard_point_status = HardPointStatus::Waiting;
        }
        self.evaluate_overall_status(instance);
    }

    /// 开始硬点测试
    pub fn begin_hard_point(&self, instance: &mut ChannelInstance) {
        let now = Utc::now();
        instance.hard_point_status = HardPointStatus::Testing;
        instance.start_time = Some(now);
        instance.test_time = Some(now);
        instance.final_test_time = None;
        self.evaluate_overall_status(instance);
    }

    /// 应用硬点测试原始结果
    pub fn set_hard_point_outcome(&self, instance: &mut ChannelInstance, success: bool, detail: Option<String>) {
        instance.hard_point_status = if success {
            HardPointStatus::Passed
        } else {
            HardPointStatus::Failed
        };
        if !success {
            instance.error_notes.set(ErrorNoteClass::Integration, detail);
        }
        self.evaluate_overall_status(instance);
    }

    /// 应用手动子测试结果
    pub fn set_manual(&self, instance: &mut ChannelInstance, item: SubTestItem, passed: bool) -> Result<(), String> {
        let terminal = matches!(instance.overall_status, OverallStatus::Failed | OverallStatus::Skipped);
        let current = instance.sub_items.get(&item).copied().unwrap_or(SubTestStatus::NotApplicable);
        if terminal && current == SubTestStatus::NotApplicable {
            return Err(format!("子测试项 {} 不适用于当前终态实例", item));
        }
        instance.sub_items.insert(
            item,
            if passed { SubTestStatus::Passed } else { SubTestStatus::Failed },
        );
        self.evaluate_overall_status(instance);
        Ok(())
    }

    /// 标记跳过：所有子项变为 NotApplicable，整体状态锁定为 Skipped
    pub fn mark_skipped(&self, instance: &mut ChannelInstance, reason: String) {
        for status in instance.sub_items.values_mut() {
            *status = SubTestStatus::NotApplicable;
        }
        instance.hard_point_status = HardPointStatus::Skipped;
        instance.skip_reason = Some(reason);
        instance.overall_status = OverallStatus::Skipped;
        instance.updated_time = Utc::now();
    }

    /// 重置为重测前状态（分配后的初始状态），保留分配信息
    pub fn reset_for_retest(&self, instance: &mut ChannelInstance) {
        instance.retries_count += 1;
        self.reset_non_applicable_to_not_tested(instance);
        instance.status_message = None;
        instance.error_notes = Default::default();
        self.evaluate_overall_status(instance);
    }

    /// 重新评估整体状态；规则按固定顺序求值，重复调用结果不变（幂等）
    pub fn evaluate_overall_status(&self, instance: &mut ChannelInstance) {
        instance.updated_time = Utc::now();

        // 规则 0：Skipped 是锁定终态
        if instance.overall_status == OverallStatus::Skipped {
            return;
        }

        let failed_manual: Vec<SubTestItem> = instance
            .sub_items
            .iter()
            .filter(|(_, status)| **status == SubTestStatus::Failed)
            .map(|(item, _)| *item)
            .collect();

        // 规则 1：任一手动子项失败
        if !failed_manual.is_empty() {
            let mut items: Vec<String> = failed_manual.iter().map(|i| format!("{}: Failed", i)).collect();
            items.sort();
            instance.status_message = Some(format!("手动子测试失败: {}", items.join(", ")));
            instance.overall_status = OverallStatus::Failed;
            instance.final_test_time = Some(Utc::now());
            return;
        }

        // 规则 2：硬点失败
        if instance.hard_point_status == HardPointStatus::Failed {
            instance.status_message = Some("硬点测试失败".to_string());
            instance.overall_status = OverallStatus::Failed;
            instance.final_test_time = Some(Utc::now());
            return;
        }

        let any_manual_not_tested = instance
            .sub_items
            .values()
            .any(|status| *status == SubTestStatus::NotTested);

        // 规则 3：硬点通过，且没有手动子项未测
        // legacy_manual_pass_without_hardpoint 开启时，允许硬点仍为 NotTested
        // 时按手动子项判定整体通过（见 spec.md §9 第一条待决问题）
        let hard_point_gate = instance.hard_point_status == HardPointStatus::Passed
            || (self.legacy_manual_pass_without_hardpoint
                && instance.hard_point_status == HardPointStatus::NotTested);
        if hard_point_gate && !any_manual_not_tested {
            instance.status_message = None;
            instance.overall_status = OverallStatus::Passed;
            instance.final_test_time = Some(Utc::now());
            return;
        }

        // 规则 4：正在测试/等待，或仍有手动子项未测（硬点未失败）
        if matches!(
            instance.hard_point_status,
            HardPointStatus::Testing | HardPointStatus::Waiting
        ) || any_manual_not_tested
        {
            instance.status_message = None;
            instance.overall_status = OverallStatus::InProgress;
            instance.final_test_time = None;
            return;
        }

        // 规则 5：硬点未测，且无手动失败
        if instance.hard_point_status == HardPointStatus::NotTested {
            instance.status_message = None;
            instance.overall_status = OverallStatus::NotTested;
            return;
        }

        // 规则 6：兜底
        instance.status_message = None;
        instance.overall_status = OverallStatus::InProgress;
    }
}

fn na_if_absent(setpoint: Option<f32>) -> SubTestStatus {
    if setpoint.is_none() {
        SubTestStatus::NotApplicable
    } else {
        SubTestStatus::NotTested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointDefinition;
    use chrono::Utc;

    fn ai_definition() -> PointDefinition {
        let mut d = PointDefinition::new(
            "Station1".into(),
            "TI_101".into(),
            "TI101".into(),
            "反应器温度".into(),
            ModuleType::AI,
            crate::models::PointDataType::Float,
            "40001".into(),
            Utc::now(),
        );
        d.range_low = Some(0.0);
        d.range_high = Some(100.0);
        d.sh.value = Some(80.0);
        d
    }

    #[test]
    fn p2_evaluate_is_idempotent() {
        let mgr = ChannelStateManager::new();
        let def = ai_definition();
        let mut instance = mgr.initialize(&def);
        mgr.begin_hard_point(&mut instance);
        mgr.set_hard_point_outcome(&mut instance, true, None);
        let before = instance.overall_status;
        mgr.evaluate_overall_status(&mut instance);
        assert_eq!(before, instance.overall_status);
    }

    #[test]
    fn manual_failure_dominates_hardpoint_pass() {
        let mgr = ChannelStateManager::new();
        let def = ai_definition();
        let mut instance = mgr.initialize(&def);
        mgr.begin_hard_point(&mut instance);
        mgr.set_hard_point_outcome(&mut instance, true, None);
        assert_eq!(instance.overall_status, OverallStatus::InProgress);
        mgr.set_manual(&mut instance, SubTestItem::LowAlarm, false).unwrap();
        assert_eq!(instance.overall_status, OverallStatus::Failed);
        assert!(instance.status_message.as_ref().unwrap().contains("低报: Failed"));
        assert!(instance.final_test_time.is_some());
    }

    #[test]
    fn skip_locks_all_sub_items_not_applicable() {
        let mgr = ChannelStateManager::new();
        let def = ai_definition();
        let mut instance = mgr.initialize(&def);
        mgr.mark_skipped(&mut instance, "no wire".into());
        assert_eq!(instance.overall_status, OverallStatus::Skipped);
        assert!(instance.sub_items.values().all(|s| *s == SubTestStatus::NotApplicable));
        // 已跳过的实例不再被进一步修改
        mgr.evaluate_overall_status(&mut instance);
        assert_eq!(instance.overall_status, OverallStatus::Skipped);
    }

    #[test]
    fn legacy_flag_allows_pass_without_hardpoint() {
        let mgr = ChannelStateManager::new().with_legacy_manual_pass(true);
        let def = ai_definition();
        let mut instance = mgr.initialize(&def);
        for item in SubTestItem::ALL {
            if instance.sub_items.get(&item) == Some(&SubTestStatus::NotTested) {
                mgr.set_manual(&mut instance, item, true).unwrap();
            }
        }
        assert_eq!(instance.hard_point_status, HardPointStatus::NotTested);
        assert_eq!(instance.overall_status, OverallStatus::Passed);
    }

    #[test]
    fn default_rejects_pass_without_hardpoint() {
        let mgr = ChannelStateManager::new();
        let def = ai_definition();
        let mut instance = mgr.initialize(&def);
        for item in SubTestItem::ALL {
            if instance.sub_items.get(&item) == Some(&SubTestStatus::NotTested) {
                mgr.set_manual(&mut instance, item, true).unwrap();
            }
        }
        assert_eq!(instance.overall_status, OverallStatus::InProgress);
    }

    #[test]
    fn invalid_range_falls_back_to_0_100_with_warning_flag() {
        let mgr = ChannelStateManager::new();
        let mut def = ai_definition();
        def.range_low = Some(100.0);
        def.range_high = Some(50.0); // high < low: invalid (I6)
        let instance = mgr.initialize(&def);
        assert_eq!(instance.effective_range_low, 0.0);
        assert_eq!(instance.effective_range_high, 100.0);
        assert!(instance.range_defaulted);
    }

    #[test]
    fn valid_range_is_carried_through_unchanged() {
        let mgr = ChannelStateManager::new();
        let mut def = ai_definition();
        def.range_low = Some(10.0);
        def.range_high = Some(210.0);
        let instance = mgr.initialize(&def);
        assert_eq!(instance.effective_range_low, 10.0);
        assert_eq!(instance.effective_range_high, 210.0);
        assert!(!instance.range_defaulted);
    }

    #[test]
    fn di_do_have_all_analog_sub_items_not_applicable() {
        let mgr = ChannelStateManager::new();
        let mut def = ai_definition();
        def.module_type = ModuleType::DI;
        let instance = mgr.initialize(&def);
        assert_eq!(
            instance.sub_items.get(&SubTestItem::LowAlarm),
            Some(&SubTestStatus::NotApplicable)
        );
        assert_eq!(
            instance.sub_items.get(&SubTestItem::TrendCheck),
            Some(&SubTestStatus::NotApplicable)
        );
    }
}
