//! 点位定义（PointDefinition）——导入后不可变

use super::enums::{ModuleType, PointDataType};
use serde::{Deserialize, Serialize};

/// 报警设定点：设定值 + 通信地址
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AlarmSetpoint {
    pub value: Option<f32>,
    pub address: Option<String>,
}

/// 一个逻辑测试点的静态配置，通常从 Excel 点表导入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDefinition {
    pub id: String,
    pub station_name: String,
    pub variable_name: String,
    pub tag: String,
    pub description: String,
    pub module_type: ModuleType,
    pub data_type: PointDataType,
    /// 被测 PLC 上的通信地址
    pub plc_address: String,

    pub range_low: Option<f32>,
    pub range_high: Option<f32>,

    pub sll: AlarmSetpoint,
    pub sl: AlarmSetpoint,
    pub sh: AlarmSetpoint,
    pub shh: AlarmSetpoint,

    pub import_time: chrono::DateTime<chrono::Utc>,

    /// 惰性元数据，随导入携带但不被状态机解释
    pub engineering_unit: Option<String>,
    pub access_property: Option<String>,
    pub wire_system: Option<String>,
    pub power_supply_type: Option<String>,
}

impl PointDefinition {
    pub fn new(
        station_name: String,
        variable_name: String,
        tag: String,
        description: String,
        module_type: ModuleType,
        data_type: PointDataType,
        plc_address: String,
        import_time: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            id: super::new_id(),
            station_name,
            variable_name,
            tag,
            description,
            module_type,
            data_type,
            plc_address,
            range_low: None,
            range_high: None,
            sll: AlarmSetpoint::default(),
            sl: AlarmSetpoint::default(),
            sh: AlarmSetpoint::default(),
            shh: AlarmSetpoint::default(),
            import_time,
            engineering_unit: None,
            access_property: None,
            wire_system: None,
            power_supply_type: None,
        }
    }

    /// DI/DO 以及变量名包含 "YLDW" 的点位没有模拟量子项
    pub fn is_yldw(&self) -> bool {
        self.variable_name.contains("YLDW")
    }

    /// 是否存在任何报警设定值
    pub fn has_any_alarm_setpoint(&self) -> bool {
        self.sll.value.is_some() || self.sl.value.is_some() || self.sh.value.is_some() || self.shh.value.is_some()
    }
}

/// 产生 `PointDefinition` 记录的外部协作者：真正的 Excel 解析在 `excel` 模块，
/// 这里只是引擎一侧看到的窄接口，只关心"给我一批点位定义"
pub trait DefinitionSource: Send + Sync {
    fn read_all(&self) -> crate::error::AppResult<Vec<PointDefinition>>;
}
