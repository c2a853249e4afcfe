//! `global_checks` 表：GlobalCheck 的 SeaORM 映射
//!
//! 主键是复合业务键 `(station_name, import_time, function_key)` 的字符串拼接，
//! 因为 SeaORM 的 `DeriveEntityModel` 更适合单列主键。

use crate::models::{GlobalCheck, GlobalCheckStatus};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "global_checks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub station_name: String,
    pub import_time: DateTime<Utc>,
    pub function_key: String,
    pub status: String,
    #[sea_orm(nullable)]
    pub start_time: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn composite_key(station_name: &str, import_time: DateTime<Utc>, function_key: &str) -> String {
    format!("{}|{}|{}", station_name, import_time.to_rfc3339(), function_key)
}

impl From<&GlobalCheck> for ActiveModel {
    fn from(g: &GlobalCheck) -> Self {
        Self {
            key: Set(composite_key(&g.station_name, g.import_time, &g.function_key)),
            station_name: Set(g.station_name.clone()),
            import_time: Set(g.import_time),
            function_key: Set(g.function_key.clone()),
            status: Set(format!("{:?}", g.status)),
            start_time: Set(g.start_time),
            end_time: Set(g.end_time),
        }
    }
}

impl From<&Model> for GlobalCheck {
    fn from(m: &Model) -> Self {
        GlobalCheck {
            station_name: m.station_name.clone(),
            import_time: m.import_time,
            function_key: m.function_key.clone(),
            status: match m.status.as_str() {
                "Passed" => GlobalCheckStatus::Passed,
                "Failed" => GlobalCheckStatus::Failed,
                _ => GlobalCheckStatus::NotTested,
            },
            start_time: m.start_time,
            end_time: m.end_time,
        }
    }
}
