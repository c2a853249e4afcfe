//! `Orchestrator`：批次级命令外观 + 事件发布者。
//!
//! 每个命令要么委托给上面的组件，要么是一个薄的组合；是唯一的事件发布方
//! (`BatchStatusChanged`/`TestProgressUpdate`/`TestStatusChanged`/`TestCompleted`)。

use crate::allocator::{Allocator, ChannelPool};
use crate::channel_state_manager::ChannelStateManager;
use crate::error::{AppError, AppResult};
use crate::events::{BatchStatusChanged, EngineEvent, EventPublisher, TestCompleted, TestProgressUpdate, TestStatusChanged};
use crate::models::{ChannelInstance, ErrorNoteClass, GlobalCheck, OverallStatus, PointDefinition, SubTestItem, TestBatch};
use crate::plc::PlcLink;
use crate::result_service::ResultService;
use crate::store::Store;
use crate::task_manager::TaskManager;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// CLI 映射用的批次结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllPassed,
    SomeFailed,
    ConfigOrConnectionError,
    Cancelled,
}

impl BatchOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            BatchOutcome::AllPassed => 0,
            BatchOutcome::SomeFailed => 1,
            BatchOutcome::ConfigOrConnectionError => 2,
            BatchOutcome::Cancelled => 3,
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    state_manager: ChannelStateManager,
    allocator: Allocator,
    task_manager: Arc<TaskManager>,
    result_service: Arc<ResultService>,
    events: Arc<dyn EventPublisher>,
    test_link: Arc<dyn PlcLink>,
    target_link: Arc<dyn PlcLink>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        events: Arc<dyn EventPublisher>,
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
    ) -> Self {
        let state_manager = ChannelStateManager::new();
        Self {
            allocator: Allocator::new(state_manager),
            task_manager: Arc::new(TaskManager::new(state_manager)),
            result_service: Arc::new(ResultService::start(store.clone())),
            state_manager,
            store,
            events,
            test_link,
            target_link,
        }
    }

    pub async fn shutdown(&self) {
        self.result_service.shutdown().await;
    }

    // ---- 导入 / 分配 ----------------------------------------------------

    pub async fn import(&self, definitions: Vec<PointDefinition>) -> AppResult<()> {
        self.store.save_definitions(&definitions).await
    }

    pub async fn allocate(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        pool: &ChannelPool,
    ) -> AppResult<TestBatch> {
        let definitions = self.store.list_definitions_by_station(station_name).await?;
        let (batch, instances) = self.allocator.allocate(station_name, import_time, definitions, pool);
        self.store.save_batch(&batch).await?;
        for instance in &instances {
            self.store.upsert_instance(instance).await?;
        }
        self.publish_batch_status(&batch);
        Ok(batch)
    }

    // ---- 查询 -------------------------------------------------------------

    pub async fn list_batches(&self) -> AppResult<Vec<TestBatch>> {
        self.store.list_batches().await
    }

    pub async fn get_batch_details(
        &self,
        batch_id: &str,
    ) -> AppResult<(TestBatch, Vec<ChannelInstance>, Vec<PointDefinition>)> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| AppError::state(format!("批次不存在: {}", batch_id)))?;
        let instances = self.store.get_instances_by_batch(batch_id).await?;

        let mut definitions = Vec::with_capacity(instances.len());
        for instance in &instances {
            if let Some(def) = self.store.get_definition(&instance.definition_id).await? {
                definitions.push(def);
            }
        }
        Ok((batch, instances, definitions))
    }

    // ---- PLC 连接 ----------------------------------------------------------

    pub async fn connect_plc(&self) -> AppResult<()> {
        self.task_manager.ensure_plc_connections(&self.test_link, &self.target_link).await
    }

    // ---- 批次执行生命周期 ----------------------------------------------------

    pub async fn confirm_wiring(&self, batch_id: &str) -> AppResult<()> {
        let (batch, mut instances, definitions) = self.get_batch_details(batch_id).await?;
        let def_map: HashMap<String, PointDefinition> = definitions.into_iter().map(|d| (d.id.clone(), d)).collect();

        self.task_manager.confirm_wiring(&mut instances, &def_map).await?;
        for instance in &instances {
            self.store.upsert_instance(instance).await?;
        }
        self.publish_batch_status(&batch);
        Ok(())
    }

    pub async fn start_batch_auto_test(&self, batch_id: &str) -> AppResult<BatchOutcome> {
        let (mut batch, mut instances, _definitions) = self.get_batch_details(batch_id).await?;
        let before: HashMap<String, OverallStatus> =
            instances.iter().map(|i| (i.instance_id.clone(), i.overall_status)).collect();

        let summary = self
            .task_manager
            .start_all(&mut instances, self.test_link.clone(), self.target_link.clone())
            .await?;

        // exactly-once 持久化：一次事务覆盖整批实例（含未变的跳过行），
        // 而不是只写变化的行
        self.store.update_hard_point_results(&instances).await?;

        batch.recompute_counters(&instances);
        self.store.save_batch(&batch).await?;

        let mut completed = 0u32;
        for instance in &instances {
            let old = before.get(&instance.instance_id).copied().unwrap_or(OverallStatus::NotTested);
            if old != instance.overall_status {
                self.events.publish(EngineEvent::TestStatusChanged(TestStatusChanged {
                    instance_id: instance.instance_id.clone(),
                    old,
                    new: instance.overall_status,
                    timestamp: instance.updated_time,
                    tag: instance.test_plc_channel_tag.clone(),
                }));
            }
            self.events.publish(EngineEvent::TestCompleted(TestCompleted {
                instance_id: instance.instance_id.clone(),
                success: matches!(instance.overall_status, OverallStatus::Passed),
                sub_item: None,
                message: instance.status_message.clone(),
                raw: None,
                eng: None,
                tag: instance.test_plc_channel_tag.clone(),
            }));
            completed += 1;
            self.events.publish(EngineEvent::TestProgressUpdate(TestProgressUpdate {
                batch_id: batch.batch_id.clone(),
                total: instances.len() as u32,
                completed,
                success: batch.passed,
                failed: batch.failed,
                percent: if instances.is_empty() { 100.0 } else { completed as f32 / instances.len() as f32 * 100.0 },
                current_point: instance.test_plc_channel_tag.clone(),
            }));
        }
        self.publish_batch_status(&batch);

        Ok(if summary.cancelled {
            BatchOutcome::Cancelled
        } else if batch.failed > 0 {
            BatchOutcome::SomeFailed
        } else {
            BatchOutcome::AllPassed
        })
    }

    pub async fn pause(&self) {
        self.task_manager.pause_all().await;
    }

    pub async fn resume(&self) {
        self.task_manager.resume_all().await;
    }

    pub async fn stop(&self) {
        self.task_manager.stop_all().await;
    }

    pub async fn retest_channel(&self, instance_id: &str) -> AppResult<()> {
        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| AppError::state(format!("实例不存在: {}", instance_id)))?;
        let definition = self
            .store
            .get_definition(&instance.definition_id)
            .await?
            .ok_or_else(|| AppError::config(format!("找不到定义: {}", instance.definition_id)))?;
        let old_status = instance.overall_status;

        self.task_manager
            .retest(&mut instance, &definition, self.test_link.clone(), self.target_link.clone())
            .await?;

        self.store.update_retest(&instance).await?;
        if old_status != instance.overall_status {
            self.events.publish(EngineEvent::TestStatusChanged(TestStatusChanged {
                instance_id: instance.instance_id.clone(),
                old: old_status,
                new: instance.overall_status,
                timestamp: instance.updated_time,
                tag: instance.test_plc_channel_tag.clone(),
            }));
        }
        self.events.publish(EngineEvent::TestCompleted(TestCompleted {
            instance_id: instance.instance_id.clone(),
            success: matches!(instance.overall_status, OverallStatus::Passed),
            sub_item: None,
            message: instance.status_message.clone(),
            raw: None,
            eng: None,
            tag: instance.test_plc_channel_tag.clone(),
        }));
        Ok(())
    }

    pub async fn skip_channel(&self, instance_id: &str, reason: String) -> AppResult<()> {
        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| AppError::state(format!("实例不存在: {}", instance_id)))?;

        let old_status = instance.overall_status;
        self.state_manager.mark_skipped(&mut instance, reason);
        self.store.upsert_instance(&instance).await?;
        self.events.publish(EngineEvent::TestStatusChanged(TestStatusChanged {
            instance_id: instance.instance_id.clone(),
            old: old_status,
            new: instance.overall_status,
            timestamp: instance.updated_time,
            tag: instance.test_plc_channel_tag.clone(),
        }));
        Ok(())
    }

    pub async fn save_error_notes(
        &self,
        instance_id: &str,
        integration: Option<String>,
        plc_programming: Option<String>,
        hmi_configuration: Option<String>,
    ) -> AppResult<()> {
        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| AppError::state(format!("实例不存在: {}", instance_id)))?;

        instance.error_notes.set(ErrorNoteClass::Integration, integration);
        instance.error_notes.set(ErrorNoteClass::PlcProgramming, plc_programming);
        instance.error_notes.set(ErrorNoteClass::HmiConfiguration, hmi_configuration);
        self.store.upsert_instance(&instance).await
    }

    pub async fn set_manual_sub_test(&self, instance_id: &str, item: SubTestItem, passed: bool) -> AppResult<()> {
        let mut instance = self
            .store
            .get_instance(instance_id)
            .await?
            .ok_or_else(|| AppError::state(format!("实例不存在: {}", instance_id)))?;

        let old_status = instance.overall_status;
        self.state_manager
            .set_manual(&mut instance, item, passed)
            .map_err(AppError::state)?;
        if old_status != instance.overall_status {
            self.events.publish(EngineEvent::TestStatusChanged(TestStatusChanged {
                instance_id: instance.instance_id.clone(),
                old: old_status,
                new: instance.overall_status,
                timestamp: instance.updated_time,
                tag: instance.test_plc_channel_tag.clone(),
            }));
        }
        self.result_service.submit(instance).await
    }

    // ---- 全局检查 -----------------------------------------------------------

    pub async fn get_global_check(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        function_key: &str,
    ) -> AppResult<Option<GlobalCheck>> {
        self.store.get_global_check(station_name, import_time, function_key).await
    }

    pub async fn update_global_check(&self, check: GlobalCheck) -> AppResult<()> {
        self.store.update_global_check(&check).await
    }

    pub async fn reset_global_check(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        function_key: &str,
    ) -> AppResult<()> {
        self.store.reset_global_check(station_name, import_time, function_key).await
    }

    fn publish_batch_status(&self, batch: &TestBatch) {
        self.events.publish(EngineEvent::BatchStatusChanged(BatchStatusChanged {
            batch_id: batch.batch_id.clone(),
            status: format!("{}/{}", batch.tested, batch.total_points),
            tested: batch.tested,
            passed: batch.passed,
            failed: batch.failed,
            skipped: batch.skipped,
            in_progress: batch.in_progress,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::TestChannel;
    use crate::events::BroadcastEventPublisher;
    use crate::models::{ModuleType, PointDataType};
    use crate::plc::StubPlcLink;
    use crate::store::MemoryStore;

    fn di_definition(station: &str, tag: &str) -> PointDefinition {
        PointDefinition::new(
            station.into(),
            format!("{}_VAR", tag),
            tag.into(),
            "desc".into(),
            ModuleType::DI,
            PointDataType::Bool,
            "0TARGET".into(),
            Utc::now(),
        )
    }

    async fn orchestrator_with_connected_links() -> (Orchestrator, Arc<dyn PlcLink>, Arc<dyn PlcLink>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let events: Arc<dyn EventPublisher> = Arc::new(BroadcastEventPublisher::default());
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let orchestrator = Orchestrator::new(store, events, test_link.clone(), target_link.clone());
        orchestrator.connect_plc().await.unwrap();
        (orchestrator, test_link, target_link)
    }

    #[tokio::test(start_paused = true)]
    async fn skip_then_start_preserves_invariants_and_counts_correctly() {
        let (orchestrator, test_link, target_link) = orchestrator_with_connected_links().await;
        test_link.write_bool("0TEST", false).await.unwrap();
        target_link.write_bool("0TARGET", false).await.unwrap();

        let watcher_test = test_link.clone();
        let watcher_target = target_link.clone();
        let watcher = tokio::spawn(async move {
            loop {
                if let Ok(v) = watcher_test.read_bool("0TEST").await {
                    watcher_target.write_bool("0TARGET", v).await.ok();
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        });

        let import_time = Utc::now();
        let defs = vec![
            di_definition("S1", "DI1"),
            di_definition("S1", "DI2"),
            di_definition("S1", "DI3"),
        ];
        orchestrator.import(defs).await.unwrap();

        let pool = ChannelPool::new().with_channels(
            ModuleType::DI,
            vec![
                TestChannel { tag: "DI1".into(), address: "0TEST".into() },
                TestChannel { tag: "DI2".into(), address: "0TEST".into() },
                TestChannel { tag: "DI3".into(), address: "0TEST".into() },
            ],
        );
        let batch = orchestrator.allocate("S1", import_time, &pool).await.unwrap();

        let (_, instances, _) = orchestrator.get_batch_details(&batch.batch_id).await.unwrap();
        let to_skip = instances
            .iter()
            .find(|i| i.test_plc_channel_tag.as_deref() == Some("DI2"))
            .unwrap()
            .instance_id
            .clone();
        orchestrator.skip_channel(&to_skip, "no wire".into()).await.unwrap();

        orchestrator.confirm_wiring(&batch.batch_id).await.unwrap();
        let outcome = orchestrator.start_batch_auto_test(&batch.batch_id).await.unwrap();
        watcher.abort();

        let (final_batch, final_instances, _) = orchestrator.get_batch_details(&batch.batch_id).await.unwrap();
        assert_eq!(final_batch.skipped, 1);
        assert_eq!(final_batch.tested, 2);
        assert_eq!(outcome, BatchOutcome::AllPassed);

        let skipped_instance = final_instances.iter().find(|i| i.instance_id == to_skip).unwrap();
        assert_eq!(skipped_instance.overall_status, OverallStatus::Skipped);
        assert!(skipped_instance
            .sub_items
            .values()
            .all(|s| *s == crate::models::SubTestStatus::NotApplicable));

        orchestrator.shutdown().await;
    }
}
