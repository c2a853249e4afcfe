//! `TaskManager`：并发上限执行器，驱动一批 `HardPointTask`，支持取消/暂停/恢复
//! 以及单通道重测。
//!
//! 两条 `PlcLink` 被整批所有并发任务共享；批次内存态（`ChannelInstance` 映射）
//! 只在单线程的 apply-outcomes 阶段或调用方线程（retest/skip）被修改，
//! 两条路径不会并发修改同一个实例。

use crate::channel_state_manager::ChannelStateManager;
use crate::error::{AppError, AppResult};
use crate::models::{ChannelInstance, ModuleType, PointDefinition};
use crate::plc::PlcLink;
use crate::tasks::{
    AiHardPointTask, AoHardPointTask, CooperativeControl, DiHardPointTask, DoHardPointTask, HardPointTask, RawOutcome,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONCURRENCY: usize = 64;

/// 从定义+实例构造对应模块类型的硬点任务变体
fn build_task(definition: &PointDefinition, instance: &ChannelInstance) -> AppResult<Arc<dyn HardPointTask>> {
    let test_address = instance
        .test_plc_address
        .clone()
        .ok_or_else(|| AppError::state("实例尚未分配测试PLC通道"))?;

    Ok(match definition.module_type {
        ModuleType::AI => {
            let (low, high) = (instance.effective_range_low, instance.effective_range_high);
            Arc::new(AiHardPointTask::new(test_address, definition.plc_address.clone(), low, high))
        }
        ModuleType::AO => {
            let (low, high) = (instance.effective_range_low, instance.effective_range_high);
            Arc::new(AoHardPointTask::new(test_address, definition.plc_address.clone(), low, high))
        }
        ModuleType::DI => Arc::new(DiHardPointTask::new(test_address, definition.plc_address.clone())),
        ModuleType::DO => Arc::new(DoHardPointTask::new(test_address, definition.plc_address.clone())),
    })
}

/// 批次整体执行完成后的汇总，供 `Orchestrator` 发布 `TestCompleted`/`BatchStatusChanged`
pub struct BatchRunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

pub struct TaskManager {
    state_manager: ChannelStateManager,
    concurrency: Mutex<usize>,
    running: AtomicBool,
    wiring_confirmed: AtomicBool,
    cancel: Mutex<CancellationToken>,
    control: Mutex<CooperativeControl>,
    tasks: Mutex<HashMap<String, Arc<dyn HardPointTask>>>,
}

impl TaskManager {
    pub fn new(state_manager: ChannelStateManager) -> Self {
        let cancel = CancellationToken::new();
        Self {
            state_manager,
            concurrency: Mutex::new(DEFAULT_CONCURRENCY),
            running: AtomicBool::new(false),
            wiring_confirmed: AtomicBool::new(false),
            control: Mutex::new(CooperativeControl::new(cancel.clone())),
            cancel: Mutex::new(cancel),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 调整并发上限；批次运行中拒绝修改
    pub async fn set_concurrency(&self, bound: usize) -> AppResult<()> {
        if self.is_running() {
            return Err(AppError::state("批次运行中，无法修改并发上限"));
        }
        *self.concurrency.lock().await = bound.max(1);
        Ok(())
    }

    /// 连接两条PLC链路；任一失败则整体短路
    pub async fn ensure_plc_connections(
        &self,
        test_link: &Arc<dyn PlcLink>,
        target_link: &Arc<dyn PlcLink>,
    ) -> AppResult<()> {
        test_link.connect().await.map_err(AppError::from)?;
        target_link.connect().await.map_err(AppError::from)?;
        Ok(())
    }

    /// 为批次内所有非跳过实例执行"准备接线"转换，并重建任务集合
    pub async fn confirm_wiring(
        &self,
        instances: &mut [ChannelInstance],
        definitions: &HashMap<String, PointDefinition>,
    ) -> AppResult<()> {
        if self.is_running() {
            return Err(AppError::state("批次运行中，无法重新确认接线"));
        }

        let mut built = HashMap::new();
        for instance in instances.iter_mut() {
            if matches!(instance.overall_status, crate::models::OverallStatus::Skipped) {
                continue;
            }
            self.state_manager.prepare_for_wiring(instance);
            let definition = definitions
                .get(&instance.definition_id)
                .ok_or_else(|| AppError::config(format!("找不到定义: {}", instance.definition_id)))?;
            let task = build_task(definition, instance)?;
            built.insert(instance.instance_id.clone(), task);
        }

        *self.tasks.lock().await = built;
        self.wiring_confirmed.store(true, Ordering::Release);
        Ok(())
    }

    /// 启动整批执行；按稳定顺序（instance_id 升序即可，调用方已决定好顺序）
    /// 逐个获取信号量后派生任务；批内结果在单线程 apply-outcomes 阶段落回内存状态
    pub async fn start_all(
        &self,
        instances: &mut [ChannelInstance],
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
    ) -> AppResult<BatchRunSummary> {
        if self.is_running() {
            return Err(AppError::state("批次已在运行"));
        }
        if !self.wiring_confirmed.load(Ordering::Acquire) {
            return Err(AppError::state("尚未确认接线"));
        }

        self.running.store(true, Ordering::Release);
        let fresh_cancel = CancellationToken::new();
        *self.cancel.lock().await = fresh_cancel.clone();
        let control = CooperativeControl::new(fresh_cancel.clone());
        *self.control.lock().await = control.clone();

        let bound = *self.concurrency.lock().await;
        let semaphore = Arc::new(Semaphore::new(bound));
        let tasks = self.tasks.lock().await.clone();

        let mut ordered_ids: Vec<String> = instances
            .iter()
            .filter(|i| tasks.contains_key(&i.instance_id))
            .map(|i| i.instance_id.clone())
            .collect();
        ordered_ids.sort();

        for instance in instances.iter_mut() {
            if tasks.contains_key(&instance.instance_id) {
                self.state_manager.begin_hard_point(instance);
            }
        }

        let mut joins = Vec::with_capacity(ordered_ids.len());
        for instance_id in ordered_ids {
            let Some(task) = tasks.get(&instance_id).cloned() else { continue };
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| AppError::generic(e.to_string()))?;
            let test_link = test_link.clone();
            let target_link = target_link.clone();
            let control = control.clone();
            joins.push(tokio::spawn(async move {
                let outcome = task.run(test_link, target_link, &control).await;
                drop(permit);
                (instance_id, outcome)
            }));
        }

        let mut outcomes: HashMap<String, RawOutcome> = HashMap::new();
        for join in joins {
            if let Ok((instance_id, outcome)) = join.await {
                outcomes.insert(instance_id, outcome);
            }
        }

        // apply-outcomes：单线程阶段，批次内不会有并发写入同一个实例
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for instance in instances.iter_mut() {
            if let Some(outcome) = outcomes.remove(&instance.instance_id) {
                if let Some(samples) = &outcome.samples {
                    instance.samples = samples.clone();
                }
                if !outcome.digital_steps.is_empty() {
                    instance.digital_steps = outcome.digital_steps.clone();
                }
                self.state_manager.set_hard_point_outcome(instance, outcome.is_success, outcome.detail.clone());
                if outcome.is_success {
                    succeeded += 1;
                } else {
                    failed += 1;
                }
            }
        }

        let cancelled = fresh_cancel.is_cancelled();
        self.running.store(false, Ordering::Release);
        self.wiring_confirmed.store(false, Ordering::Release);

        Ok(BatchRunSummary { total: succeeded + failed, succeeded, failed, cancelled })
    }

    /// 单通道重测：重置状态、跑一个任务、不经过批量协调
    pub async fn retest(
        &self,
        instance: &mut ChannelInstance,
        definition: &PointDefinition,
        test_link: Arc<dyn PlcLink>,
        target_link: Arc<dyn PlcLink>,
    ) -> AppResult<RawOutcome> {
        if matches!(instance.overall_status, crate::models::OverallStatus::Skipped) {
            return Err(AppError::state("已跳过的实例不能重测"));
        }

        self.state_manager.reset_for_retest(instance);
        self.state_manager.prepare_for_wiring(instance);
        self.state_manager.begin_hard_point(instance);

        let task = build_task(definition, instance)?;
        let control = CooperativeControl::new(CancellationToken::new());
        let outcome = task.run(test_link, target_link, &control).await;

        if let Some(samples) = &outcome.samples {
            instance.samples = samples.clone();
        }
        if !outcome.digital_steps.is_empty() {
            instance.digital_steps = outcome.digital_steps.clone();
        }
        self.state_manager.set_hard_point_outcome(instance, outcome.is_success, outcome.detail.clone());

        Ok(outcome)
    }

    pub async fn pause_all(&self) {
        self.control.lock().await.pause();
    }

    pub async fn resume_all(&self) {
        self.control.lock().await.resume();
    }

    /// 取消主令牌；每个任务最迟在下一个 yield 点观察到取消
    pub async fn stop_all(&self) {
        self.cancel.lock().await.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PointDataType, TestBatch};
    use crate::plc::StubPlcLink;
    use chrono::Utc;

    fn di_definition(tag: &str) -> PointDefinition {
        PointDefinition::new(
            "S1".into(),
            format!("{}_VAR", tag),
            tag.into(),
            "desc".into(),
            ModuleType::DI,
            PointDataType::Bool,
            "0TARGET".into(),
            Utc::now(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn confirm_wiring_then_start_all_produces_outcome_per_instance() {
        let state_manager = ChannelStateManager::new();
        let manager = TaskManager::new(state_manager);
        let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        test_link.connect().await.unwrap();
        target_link.connect().await.unwrap();
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

        let def = di_definition("DI1");
        let batch = TestBatch::new("S1".into(), Utc::now());
        let mut instance = state_manager.initialize(&def);
        state_manager.apply_allocation(&mut instance, &batch.batch_id, "DI1", "0TEST");
        let mut definitions = HashMap::new();
        definitions.insert(def.id.clone(), def);

        let mut instances = vec![instance];
        manager.confirm_wiring(&mut instances, &definitions).await.unwrap();
        let summary = manager.start_all(&mut instances, test_link, target_link).await.unwrap();
        watcher.abort();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.succeeded, 1);
        assert!(!manager.is_running());
    }
}
