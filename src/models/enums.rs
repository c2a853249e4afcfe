//! 核心枚举定义
//!
//! 测试流程中用到的强类型枚举：模块类型、数据类型、各类测试状态。

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// PLC 模块类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    AI,
    AO,
    DI,
    DO,
}

impl Display for ModuleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModuleType::AI => "AI",
            ModuleType::AO => "AO",
            ModuleType::DI => "DI",
            ModuleType::DO => "DO",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ModuleType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AI" => Ok(ModuleType::AI),
            "AO" => Ok(ModuleType::AO),
            "DI" => Ok(ModuleType::DI),
            "DO" => Ok(ModuleType::DO),
            _ => Err(format!("未知模块类型: {}", s)),
        }
    }
}

/// 点位数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointDataType {
    Bool,
    Float,
    Int,
}

impl Default for PointDataType {
    fn default() -> Self {
        PointDataType::Float
    }
}

/// 硬点（自动化刺激/采样序列）测试状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardPointStatus {
    NotTested,
    Waiting,
    Testing,
    Passed,
    Failed,
    Skipped,
    NotApplicable,
}

impl Default for HardPointStatus {
    fn default() -> Self {
        HardPointStatus::NotTested
    }
}

/// 子测试项状态（手动/报警类子测试共用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubTestStatus {
    NotTested,
    Passed,
    Failed,
    NotApplicable,
}

impl Default for SubTestStatus {
    fn default() -> Self {
        SubTestStatus::NotTested
    }
}

/// 手动/报警类子测试项的枚举键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubTestItem {
    ShowValue,
    LowLowAlarm,
    LowAlarm,
    HighAlarm,
    HighHighAlarm,
    AlarmValueSet,
    MaintenanceFunction,
    TrendCheck,
    ReportCheck,
}

impl SubTestItem {
    /// 遍历全部子测试项，顺序固定，便于初始化与展示
    pub const ALL: [SubTestItem; 9] = [
        SubTestItem::ShowValue,
        SubTestItem::LowLowAlarm,
        SubTestItem::LowAlarm,
        SubTestItem::HighAlarm,
        SubTestItem::HighHighAlarm,
        SubTestItem::AlarmValueSet,
        SubTestItem::MaintenanceFunction,
        SubTestItem::TrendCheck,
        SubTestItem::ReportCheck,
    ];
}

impl Display for SubTestItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubTestItem::ShowValue => "显示值",
            SubTestItem::LowLowAlarm => "低低报",
            SubTestItem::LowAlarm => "低报",
            SubTestItem::HighAlarm => "高报",
            SubTestItem::HighHighAlarm => "高高报",
            SubTestItem::AlarmValueSet => "报警设定",
            SubTestItem::MaintenanceFunction => "维护功能",
            SubTestItem::TrendCheck => "趋势检查",
            SubTestItem::ReportCheck => "报表检查",
        };
        write!(f, "{}", s)
    }
}

/// 整体测试状态（ChannelInstance.overall_status），由 ChannelStateManager 独占写入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    NotTested,
    InProgress,
    Passed,
    Failed,
    Skipped,
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::NotTested
    }
}

/// 错误备注分类（三类：集成错误 / PLC 程序错误 / HMI 组态错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorNoteClass {
    Integration,
    PlcProgramming,
    HmiConfiguration,
}

/// 全局检查（host check）状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalCheckStatus {
    NotTested,
    Passed,
    Failed,
}

impl Default for GlobalCheckStatus {
    fn default() -> Self {
        GlobalCheckStatus::NotTested
    }
}
