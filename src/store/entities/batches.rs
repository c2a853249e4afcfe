//! `test_batches` 表：TestBatch 的 SeaORM 映射

use crate::models::{AllocationError, TestBatch};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "test_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub batch_id: String,
    pub batch_name: String,
    pub station_name: String,
    pub import_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,

    pub total_points: u32,
    pub tested: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub in_progress: u32,

    #[sea_orm(column_type = "Text")]
    pub allocation_errors_json: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&TestBatch> for ActiveModel {
    fn from(b: &TestBatch) -> Self {
        Self {
            batch_id: Set(b.batch_id.clone()),
            batch_name: Set(b.batch_name.clone()),
            station_name: Set(b.station_name.clone()),
            import_time: Set(b.import_time),
            created_time: Set(b.created_time),
            total_points: Set(b.total_points),
            tested: Set(b.tested),
            passed: Set(b.passed),
            failed: Set(b.failed),
            skipped: Set(b.skipped),
            in_progress: Set(b.in_progress),
            allocation_errors_json: Set(serde_json::to_string(&b.allocation_errors).unwrap_or_else(|_| "[]".to_string())),
        }
    }
}

impl From<&Model> for TestBatch {
    fn from(m: &Model) -> Self {
        TestBatch {
            batch_id: m.batch_id.clone(),
            batch_name: m.batch_name.clone(),
            station_name: m.station_name.clone(),
            import_time: m.import_time,
            created_time: m.created_time,
            total_points: m.total_points,
            tested: m.tested,
            passed: m.passed,
            failed: m.failed,
            skipped: m.skipped,
            in_progress: m.in_progress,
            allocation_errors: serde_json::from_str::<Vec<AllocationError>>(&m.allocation_errors_json)
                .unwrap_or_default(),
        }
    }
}
