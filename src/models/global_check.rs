//! 全局检查（host check）——操作员手动确认的全局功能项

use super::enums::GlobalCheckStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 键为 (station_name, import_time, function_key) 的全局检查行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalCheck {
    pub station_name: String,
    pub import_time: DateTime<Utc>,
    pub function_key: String,
    pub status: GlobalCheckStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl GlobalCheck {
    pub fn new(station_name: String, import_time: DateTime<Utc>, function_key: String) -> Self {
        Self {
            station_name,
            import_time,
            function_key,
            status: GlobalCheckStatus::NotTested,
            start_time: None,
            end_time: None,
        }
    }

    pub fn key(&self) -> (String, DateTime<Utc>, String) {
        (self.station_name.clone(), self.import_time, self.function_key.clone())
    }
}
