//! 持久化边界：一个 `Store` trait，两种实现
//!
//! `SqliteStore`（SeaORM/SQLite，首次连接自动建表）供生产使用；
//! `MemoryStore`（`RwLock<HashMap<...>>`）供单元/属性测试和嵌入式场景使用。
//! 复杂嵌套字段（子项状态表、数字量步骤轨迹、采样点、分配失败列表）在
//! `SqliteStore` 中以 JSON 文本列存储，与 `store::entities` 的转换模式一致。

pub mod entities;
pub mod memory;
pub mod sqlite;

use crate::error::AppResult;
use crate::models::{ChannelInstance, GlobalCheck, PointDefinition, TestBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 引擎侧持久化契约
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_definition(&self, definition: &PointDefinition) -> AppResult<()>;
    async fn save_definitions(&self, definitions: &[PointDefinition]) -> AppResult<()>;
    async fn get_definition(&self, id: &str) -> AppResult<Option<PointDefinition>>;
    async fn list_definitions_by_station(&self, station_name: &str) -> AppResult<Vec<PointDefinition>>;

    /// 单实例 upsert
    async fn upsert_instance(&self, instance: &ChannelInstance) -> AppResult<()>;
    /// 批量 upsert：`ResultService` 合并窗口刷新时调用，一次事务写入多条实例
    async fn batch_upsert_instances(&self, instances: &[ChannelInstance]) -> AppResult<()>;
    async fn get_instance(&self, instance_id: &str) -> AppResult<Option<ChannelInstance>>;
    async fn get_instances_by_batch(&self, batch_id: &str) -> AppResult<Vec<ChannelInstance>>;

    /// 重测：覆盖既有行的全部测试结果字段（单行）
    async fn update_retest(&self, instance: &ChannelInstance) -> AppResult<()>;
    /// 一次事务写入一个批次里所有实例的硬点相关字段（含未变更的行），
    /// 保证落盘视图是整批运行后的完整快照
    async fn update_hard_point_results(&self, instances: &[ChannelInstance]) -> AppResult<()>;

    async fn save_batch(&self, batch: &TestBatch) -> AppResult<()>;
    async fn list_batches(&self) -> AppResult<Vec<TestBatch>>;
    async fn get_batch(&self, batch_id: &str) -> AppResult<Option<TestBatch>>;
    /// 级联删除：批次本身及其所有 ChannelInstance 行
    async fn delete_batch(&self, batch_id: &str) -> AppResult<()>;

    async fn get_global_check(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        function_key: &str,
    ) -> AppResult<Option<GlobalCheck>>;
    async fn update_global_check(&self, check: &GlobalCheck) -> AppResult<()>;
    async fn reset_global_check(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        function_key: &str,
    ) -> AppResult<()>;

    async fn get_config(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_config(&self, key: &str, value: &str) -> AppResult<()>;
}
