//! 端到端集成测试：导入 -> 分配 -> 确认接线 -> 自动测试 -> 核对批次计数。
//! 用两条 `StubPlcLink` 桥接测试PLC与被测PLC之间的接线，驱动整条
//! `Orchestrator` 命令链，覆盖全部 DI 通过与部分通道跳过两种批次结局。

use chrono::Utc;
use fat_engine::allocator::{ChannelPool, TestChannel};
use fat_engine::config::EngineConfig;
use fat_engine::events::BroadcastEventPublisher;
use fat_engine::models::{ModuleType, OverallStatus, PointDataType, PointDefinition};
use fat_engine::orchestrator::{BatchOutcome, Orchestrator};
use fat_engine::plc::{PlcLink, StubPlcLink};
use fat_engine::store::{MemoryStore, Store};
use std::sync::Arc;
use std::time::Duration;

fn di_definition(tag: &str, target_address: &str) -> PointDefinition {
    PointDefinition::new(
        "STATION_A".into(),
        format!("{}_VAR", tag),
        tag.into(),
        "数字量输入点".into(),
        ModuleType::DI,
        PointDataType::Bool,
        target_address.into(),
        Utc::now(),
    )
}

fn di_pool(addresses: &[&str]) -> ChannelPool {
    let channels = addresses
        .iter()
        .enumerate()
        .map(|(i, addr)| TestChannel { tag: format!("DI{}", i + 1), address: addr.to_string() })
        .collect();
    ChannelPool::new().with_channels(ModuleType::DI, channels)
}

/// 在测试PLC DO与被测PLC DI之间搭一座桥，模拟真实接线：测试PLC写出的
/// 电平被被测PLC忠实复现
fn spawn_wiring_bridge(
    test_link: Arc<dyn PlcLink>,
    target_link: Arc<dyn PlcLink>,
    test_addr: &'static str,
    target_addr: &'static str,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Ok(v) = test_link.read_bool(test_addr).await {
                target_link.write_bool(target_addr, v).await.ok();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

#[tokio::test(start_paused = true)]
async fn full_batch_lifecycle_all_di_points_pass() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let events = Arc::new(BroadcastEventPublisher::default());
    let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
    let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
    test_link.connect().await.unwrap();
    target_link.connect().await.unwrap();
    test_link.write_bool("0TEST1", false).await.unwrap();
    target_link.write_bool("0TARGET1", false).await.unwrap();

    let bridge = spawn_wiring_bridge(test_link.clone(), target_link.clone(), "0TEST1", "0TARGET1");

    let orchestrator = Orchestrator::new(store.clone(), events.clone(), test_link, target_link);

    let def = di_definition("DI1", "0TARGET1");
    orchestrator.import(vec![def]).await.unwrap();

    let pool = di_pool(&["0TEST1"]);
    let import_time = Utc::now();
    let batch = orchestrator.allocate("STATION_A", import_time, &pool).await.unwrap();
    assert_eq!(batch.total_points, 1);
    assert!(batch.allocation_errors.is_empty());

    orchestrator.confirm_wiring(&batch.batch_id).await.unwrap();

    let outcome = orchestrator.start_batch_auto_test(&batch.batch_id).await.unwrap();
    bridge.abort();

    assert_eq!(outcome, BatchOutcome::AllPassed);

    let (final_batch, instances, _defs) = orchestrator.get_batch_details(&batch.batch_id).await.unwrap();
    assert_eq!(final_batch.passed, 1);
    assert_eq!(final_batch.failed, 0);
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].overall_status, OverallStatus::Passed);

    orchestrator.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn skipped_channel_is_excluded_from_auto_test_but_counted() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let events = Arc::new(BroadcastEventPublisher::default());
    let test_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
    let target_link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
    test_link.connect().await.unwrap();
    target_link.connect().await.unwrap();
    test_link.write_bool("0TEST1", false).await.unwrap();
    target_link.write_bool("0TARGET1", false).await.unwrap();

    let bridge = spawn_wiring_bridge(test_link.clone(), target_link.clone(), "0TEST1", "0TARGET1");

    let orchestrator = Orchestrator::new(store.clone(), events.clone(), test_link, target_link);

    orchestrator
        .import(vec![di_definition("DI1", "0TARGET1"), di_definition("DI2", "0TARGET2")])
        .await
        .unwrap();

    let pool = di_pool(&["0TEST1", "0TEST2"]);
    let batch = orchestrator.allocate("STATION_A", Utc::now(), &pool).await.unwrap();
    assert_eq!(batch.total_points, 2);

    let (_, instances, _) = orchestrator.get_batch_details(&batch.batch_id).await.unwrap();
    let to_skip = instances.iter().find(|i| i.test_plc_channel_tag.as_deref() == Some("DI2")).unwrap();
    orchestrator.skip_channel(&to_skip.instance_id, "现场未接线".into()).await.unwrap();

    orchestrator.confirm_wiring(&batch.batch_id).await.unwrap();
    let outcome = orchestrator.start_batch_auto_test(&batch.batch_id).await.unwrap();
    bridge.abort();

    assert_eq!(outcome, BatchOutcome::AllPassed);

    let (final_batch, instances, _) = orchestrator.get_batch_details(&batch.batch_id).await.unwrap();
    assert_eq!(final_batch.skipped, 1);
    assert_eq!(final_batch.passed, 1);
    assert_eq!(final_batch.total_points, 2);

    let skipped_instance = instances.iter().find(|i| i.instance_id == to_skip.instance_id).unwrap();
    assert_eq!(skipped_instance.overall_status, OverallStatus::Skipped);

    orchestrator.shutdown().await;
}

#[test]
fn engine_config_channel_pool_matches_allocator_expectations() {
    let mut config = EngineConfig::default();
    config.channels.push(fat_engine::config::ChannelEntry {
        module_type: "DI".into(),
        tag: "DI1".into(),
        address: "0TEST1".into(),
    });
    let pool = config.channel_pool().unwrap();
    assert_eq!(pool.channels.get(&ModuleType::DI).unwrap()[0].tag, "DI1");
}
