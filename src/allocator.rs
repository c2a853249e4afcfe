//! 分配器：把 `PointDefinition` 按模块类型分组，从配置好的测试通道池里取出
//! 空闲通道，生成 `ChannelInstance`，装进一个新 `TestBatch`。

use crate::channel_state_manager::ChannelStateManager;
use crate::models::{AllocationError, ChannelInstance, ModuleType, PointDefinition, TestBatch};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// 一个可分配的测试通道：标签 + 通信地址，按模块类型分组
#[derive(Debug, Clone)]
pub struct TestChannel {
    pub tag: String,
    pub address: String,
}

/// 配置好的测试通道池，键为模块类型，值按配置顺序排列
#[derive(Debug, Clone, Default)]
pub struct ChannelPool {
    pub channels: HashMap<ModuleType, Vec<TestChannel>>,
}

impl ChannelPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(mut self, module_type: ModuleType, channels: Vec<TestChannel>) -> Self {
        self.channels.insert(module_type, channels);
        self
    }
}

pub struct Allocator {
    state_manager: ChannelStateManager,
}

impl Allocator {
    pub fn new(state_manager: ChannelStateManager) -> Self {
        Self { state_manager }
    }

    /// 分配一批点位，产生一个新批次及其实例；耗尽的通道类型记录到
    /// `TestBatch::allocation_errors`，该定义不产生实例
    pub fn allocate(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        mut definitions: Vec<PointDefinition>,
        pool: &ChannelPool,
    ) -> (TestBatch, Vec<ChannelInstance>) {
        definitions.sort_by(|a, b| {
            (a.station_name.as_str(), a.module_type.to_string(), a.tag.as_str()).cmp(&(
                b.station_name.as_str(),
                b.module_type.to_string(),
                b.tag.as_str(),
            ))
        });

        let mut batch = TestBatch::new(station_name.to_string(), import_time);
        let mut used: HashMap<ModuleType, usize> = HashMap::new();
        let mut instances = Vec::new();

        for definition in &definitions {
            let available = pool.channels.get(&definition.module_type);
            let cursor = used.entry(definition.module_type).or_insert(0);

            match available.and_then(|chs| chs.get(*cursor)) {
                Some(channel) => {
                    let mut instance = self.state_manager.initialize(definition);
                    self.state_manager
                        .apply_allocation(&mut instance, &batch.batch_id, &channel.tag, &channel.address);
                    instances.push(instance);
                    *cursor += 1;
                }
                None => {
                    batch.allocation_errors.push(AllocationError {
                        definition_id: definition.id.clone(),
                        reason: format!("{} 类型的测试通道池已耗尽", definition.module_type),
                    });
                }
            }
        }

        batch.recompute_counters(&instances);
        (batch, instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PointDataType;

    fn def(station: &str, tag: &str, module_type: ModuleType) -> PointDefinition {
        PointDefinition::new(
            station.into(),
            format!("{}_VAR", tag),
            tag.into(),
            "desc".into(),
            module_type,
            PointDataType::Float,
            "40001".into(),
            Utc::now(),
        )
    }

    #[test]
    fn exhausted_pool_produces_allocation_error_and_no_instance() {
        let allocator = Allocator::new(ChannelStateManager::new());
        let pool = ChannelPool::new().with_channels(
            ModuleType::AI,
            vec![TestChannel { tag: "AI1".into(), address: "340001".into() }],
        );
        let defs = vec![def("S1", "T1", ModuleType::AI), def("S1", "T2", ModuleType::AI)];
        let (batch, instances) = allocator.allocate("S1", Utc::now(), defs, &pool);

        assert_eq!(instances.len(), 1);
        assert_eq!(batch.allocation_errors.len(), 1);
        assert_eq!(batch.total_points, 1);
    }

    #[test]
    fn deterministic_ordering_by_station_module_tag() {
        let allocator = Allocator::new(ChannelStateManager::new());
        let pool = ChannelPool::new().with_channels(
            ModuleType::AI,
            vec![
                TestChannel { tag: "AI1".into(), address: "340001".into() },
                TestChannel { tag: "AI2".into(), address: "340003".into() },
            ],
        );
        let defs = vec![def("S1", "B", ModuleType::AI), def("S1", "A", ModuleType::AI)];
        let (_, instances) = allocator.allocate("S1", Utc::now(), defs, &pool);

        assert_eq!(instances[0].test_plc_channel_tag.as_deref(), Some("AI1"));
        assert_eq!(instances[1].test_plc_channel_tag.as_deref(), Some("AI2"));
    }
}
