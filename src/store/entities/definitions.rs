//! `point_definitions` 表：PointDefinition 的 SeaORM 映射

use crate::models::{AlarmSetpoint, ModuleType, PointDataType, PointDefinition};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "point_definitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub station_name: String,
    pub variable_name: String,
    pub tag: String,
    pub description: String,
    pub module_type: String,
    pub data_type: String,
    pub plc_address: String,

    #[sea_orm(nullable)]
    pub range_low: Option<f32>,
    #[sea_orm(nullable)]
    pub range_high: Option<f32>,

    #[sea_orm(column_type = "Text")]
    pub sll_json: String,
    #[sea_orm(column_type = "Text")]
    pub sl_json: String,
    #[sea_orm(column_type = "Text")]
    pub sh_json: String,
    #[sea_orm(column_type = "Text")]
    pub shh_json: String,

    pub import_time: DateTime<Utc>,

    #[sea_orm(nullable)]
    pub engineering_unit: Option<String>,
    #[sea_orm(nullable)]
    pub access_property: Option<String>,
    #[sea_orm(nullable)]
    pub wire_system: Option<String>,
    #[sea_orm(nullable)]
    pub power_supply_type: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn setpoint_json(s: &AlarmSetpoint) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "{}".to_string())
}

impl From<&PointDefinition> for ActiveModel {
    fn from(d: &PointDefinition) -> Self {
        Self {
            id: Set(d.id.clone()),
            station_name: Set(d.station_name.clone()),
            variable_name: Set(d.variable_name.clone()),
            tag: Set(d.tag.clone()),
            description: Set(d.description.clone()),
            module_type: Set(d.module_type.to_string()),
            data_type: Set(format!("{:?}", d.data_type)),
            plc_address: Set(d.plc_address.clone()),
            range_low: Set(d.range_low),
            range_high: Set(d.range_high),
            sll_json: Set(setpoint_json(&d.sll)),
            sl_json: Set(setpoint_json(&d.sl)),
            sh_json: Set(setpoint_json(&d.sh)),
            shh_json: Set(setpoint_json(&d.shh)),
            import_time: Set(d.import_time),
            engineering_unit: Set(d.engineering_unit.clone()),
            access_property: Set(d.access_property.clone()),
            wire_system: Set(d.wire_system.clone()),
            power_supply_type: Set(d.power_supply_type.clone()),
        }
    }
}

impl From<&Model> for PointDefinition {
    fn from(m: &Model) -> Self {
        PointDefinition {
            id: m.id.clone(),
            station_name: m.station_name.clone(),
            variable_name: m.variable_name.clone(),
            tag: m.tag.clone(),
            description: m.description.clone(),
            module_type: m.module_type.parse().unwrap_or(ModuleType::AI),
            data_type: match m.data_type.as_str() {
                "Bool" => PointDataType::Bool,
                "Int" => PointDataType::Int,
                _ => PointDataType::Float,
            },
            plc_address: m.plc_address.clone(),
            range_low: m.range_low,
            range_high: m.range_high,
            sll: serde_json::from_str(&m.sll_json).unwrap_or_default(),
            sl: serde_json::from_str(&m.sl_json).unwrap_or_default(),
            sh: serde_json::from_str(&m.sh_json).unwrap_or_default(),
            shh: serde_json::from_str(&m.shh_json).unwrap_or_default(),
            import_time: m.import_time,
            engineering_unit: m.engineering_unit.clone(),
            access_property: m.access_property.clone(),
            wire_system: m.wire_system.clone(),
            power_supply_type: m.power_supply_type.clone(),
        }
    }
}
