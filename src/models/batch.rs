//! 测试批次（TestBatch）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 分配失败记录：定义未能获得空闲测试通道
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationError {
    pub definition_id: String,
    pub reason: String,
}

/// 从一次导入产生的批次统计与元信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestBatch {
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

    pub allocation_errors: Vec<AllocationError>,
}

impl TestBatch {
    /// 批次名固定为 `{station}|{import_time as yyyyMMddHHmm}`，保证重复导入幂等
    pub fn name_for(station_name: &str, import_time: DateTime<Utc>) -> String {
        format!("{}|{}", station_name, import_time.format("%Y%m%d%H%M"))
    }

    pub fn new(station_name: String, import_time: DateTime<Utc>) -> Self {
        let batch_name = Self::name_for(&station_name, import_time);
        Self {
            batch_id: super::new_id(),
            batch_name,
            station_name,
            import_time,
            created_time: Utc::now(),
            total_points: 0,
            tested: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            in_progress: 0,
            allocation_errors: Vec::new(),
        }
    }

    /// 根据成员实例重新计算聚合计数器，保证批次统计与实例状态始终一致
    pub fn recompute_counters(&mut self, instances: &[super::ChannelInstance]) {
        use super::enums::OverallStatus;
        self.total_points = instances.len() as u32;
        self.tested = 0;
        self.passed = 0;
        self.failed = 0;
        self.skipped = 0;
        self.in_progress = 0;
        for inst in instances {
            match inst.overall_status {
                OverallStatus::Passed => {
                    self.passed += 1;
                    self.tested += 1;
                }
                OverallStatus::Failed => {
                    self.failed += 1;
                    self.tested += 1;
                }
                OverallStatus::Skipped => self.skipped += 1,
                OverallStatus::InProgress => self.in_progress += 1,
                OverallStatus::NotTested => {}
            }
        }
    }
}
