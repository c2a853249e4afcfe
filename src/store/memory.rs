//! `RwLock<HashMap<...>>` 实现，供单元/属性测试以及无需落盘的场景使用。

use super::Store;
use crate::error::AppResult;
use crate::models::{ChannelInstance, GlobalCheck, PointDefinition, TestBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    definitions: HashMap<String, PointDefinition>,
    instances: HashMap<String, ChannelInstance>,
    batches: HashMap<String, TestBatch>,
    global_checks: HashMap<(String, DateTime<Utc>, String), GlobalCheck>,
    config: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_definition(&self, definition: &PointDefinition) -> AppResult<()> {
        self.tables.write().await.definitions.insert(definition.id.clone(), definition.clone());
        Ok(())
    }

    async fn save_definitions(&self, definitions: &[PointDefinition]) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        for d in definitions {
            tables.definitions.insert(d.id.clone(), d.clone());
        }
        Ok(())
    }

    async fn get_definition(&self, id: &str) -> AppResult<Option<PointDefinition>> {
        Ok(self.tables.read().await.definitions.get(id).cloned())
    }

    async fn list_definitions_by_station(&self, station_name: &str) -> AppResult<Vec<PointDefinition>> {
        Ok(self
            .tables
            .read()
            .await
            .definitions
            .values()
            .filter(|d| d.station_name == station_name)
            .cloned()
            .collect())
    }

    async fn upsert_instance(&self, instance: &ChannelInstance) -> AppResult<()> {
        self.tables.write().await.instances.insert(instance.instance_id.clone(), instance.clone());
        Ok(())
    }

    async fn batch_upsert_instances(&self, instances: &[ChannelInstance]) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        for i in instances {
            tables.instances.insert(i.instance_id.clone(), i.clone());
        }
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> AppResult<Option<ChannelInstance>> {
        Ok(self.tables.read().await.instances.get(instance_id).cloned())
    }

    async fn get_instances_by_batch(&self, batch_id: &str) -> AppResult<Vec<ChannelInstance>> {
        Ok(self
            .tables
            .read()
            .await
            .instances
            .values()
            .filter(|i| i.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn update_retest(&self, instance: &ChannelInstance) -> AppResult<()> {
        self.upsert_instance(instance).await
    }

    async fn update_hard_point_results(&self, instances: &[ChannelInstance]) -> AppResult<()> {
        self.batch_upsert_instances(instances).await
    }

    async fn save_batch(&self, batch: &TestBatch) -> AppResult<()> {
        self.tables.write().await.batches.insert(batch.batch_id.clone(), batch.clone());
        Ok(())
    }

    async fn list_batches(&self) -> AppResult<Vec<TestBatch>> {
        Ok(self.tables.read().await.batches.values().cloned().collect())
    }

    async fn get_batch(&self, batch_id: &str) -> AppResult<Option<TestBatch>> {
        Ok(self.tables.read().await.batches.get(batch_id).cloned())
    }

    async fn delete_batch(&self, batch_id: &str) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.batches.remove(batch_id);
        tables.instances.retain(|_, i| i.batch_id != batch_id);
        Ok(())
    }

    async fn get_global_check(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        function_key: &str,
    ) -> AppResult<Option<GlobalCheck>> {
        let key = (station_name.to_string(), import_time, function_key.to_string());
        Ok(self.tables.read().await.global_checks.get(&key).cloned())
    }

    async fn update_global_check(&self, check: &GlobalCheck) -> AppResult<()> {
        self.tables.write().await.global_checks.insert(check.key(), check.clone());
        Ok(())
    }

    async fn reset_global_check(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        function_key: &str,
    ) -> AppResult<()> {
        let check = GlobalCheck::new(station_name.to_string(), import_time, function_key.to_string());
        self.update_global_check(&check).await
    }

    async fn get_config(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.tables.read().await.config.get(key).cloned())
    }

    async fn set_config(&self, key: &str, value: &str) -> AppResult<()> {
        self.tables.write().await.config.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn delete_batch_cascades_to_instances() {
        let store = MemoryStore::new();
        let batch = TestBatch::new("Station1".into(), Utc::now());
        let mut instance = ChannelInstance::new("def1".into(), batch.batch_id.clone());
        instance.batch_id = batch.batch_id.clone();
        store.save_batch(&batch).await.unwrap();
        store.upsert_instance(&instance).await.unwrap();

        store.delete_batch(&batch.batch_id).await.unwrap();

        assert!(store.get_batch(&batch.batch_id).await.unwrap().is_none());
        assert!(store.get_instances_by_batch(&batch.batch_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_kv_roundtrips() {
        let store = MemoryStore::new();
        store.set_config("plc.test.host", "192.168.0.10").await.unwrap();
        assert_eq!(
            store.get_config("plc.test.host").await.unwrap(),
            Some("192.168.0.10".to_string())
        );
        assert_eq!(store.get_config("missing").await.unwrap(), None);
    }
}
