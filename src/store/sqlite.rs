//! SeaORM/SQLite 实现，按 `SqliteOrmPersistenceService::setup_schema` 的模式
//! 在首次连接时为每个实体建表。

use super::entities::{batches, config_kv, definitions, global_checks, instances};
use super::Store;
use crate::error::{AppError, AppResult};
use crate::models::{ChannelInstance, GlobalCheck, PointDefinition, TestBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter, Schema, TransactionTrait,
};
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILE: &str = "fat_engine.sqlite";
const SQLITE_URL_PREFIX: &str = "sqlite://";

pub struct SqliteStore {
    db_conn: DatabaseConnection,
    db_file_path: PathBuf,
}

impl SqliteStore {
    pub async fn new(db_path: Option<&Path>) -> AppResult<Self> {
        let determined = db_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join(DEFAULT_DB_FILE));

        if let Some(parent) = determined.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::storage(format!("创建数据库目录失败 {:?}: {}", parent, e)))?;
            }
        }

        let url = format!("{}{}?mode=rwc", SQLITE_URL_PREFIX, determined.to_string_lossy());
        let conn = Database::connect(&url)
            .await
            .map_err(|e| AppError::storage(format!("连接数据库失败: {}", e)))?;

        Self::setup_schema(&conn).await?;

        Ok(Self {
            db_conn: conn,
            db_file_path: determined,
        })
    }

    async fn setup_schema(db: &DatabaseConnection) -> AppResult<()> {
        let backend = db.get_database_backend();
        let schema = Schema::new(backend);

        macro_rules! create {
            ($entity:expr, $name:literal) => {
                let stmt = schema.create_table_from_entity($entity).if_not_exists().to_owned();
                db.execute(backend.build(&stmt))
                    .await
                    .map_err(|e| AppError::storage(format!("创建 {} 表失败: {}", $name, e)))?;
            };
        }

        create!(definitions::Entity, "point_definitions");
        create!(batches::Entity, "test_batches");
        create!(instances::Entity, "channel_instances");
        create!(global_checks::Entity, "global_checks");
        create!(config_kv::Entity, "config_kv");

        log::info!("数据库表结构设置完成或已存在 ({:?})", db.get_database_backend());
        Ok(())
    }

    pub fn db_file_path(&self) -> &Path {
        &self.db_file_path
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn save_definition(&self, definition: &PointDefinition) -> AppResult<()> {
        let am: definitions::ActiveModel = definition.into();
        am.save(&self.db_conn).await.map_err(AppError::from)?;
        Ok(())
    }

    async fn save_definitions(&self, defs: &[PointDefinition]) -> AppResult<()> {
        for d in defs {
            self.save_definition(d).await?;
        }
        Ok(())
    }

    async fn get_definition(&self, id: &str) -> AppResult<Option<PointDefinition>> {
        let m = definitions::Entity::find_by_id(id.to_string())
            .one(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(m.as_ref().map(Into::into))
    }

    async fn list_definitions_by_station(&self, station_name: &str) -> AppResult<Vec<PointDefinition>> {
        let models = definitions::Entity::find()
            .filter(definitions::Column::StationName.eq(station_name.to_string()))
            .all(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(models.iter().map(Into::into).collect())
    }

    async fn upsert_instance(&self, instance: &ChannelInstance) -> AppResult<()> {
        let am: instances::ActiveModel = instance.into();
        am.save(&self.db_conn).await.map_err(AppError::from)?;
        Ok(())
    }

    async fn batch_upsert_instances(&self, insts: &[ChannelInstance]) -> AppResult<()> {
        let txn = self.db_conn.begin().await.map_err(AppError::from)?;
        for i in insts {
            let am: instances::ActiveModel = i.into();
            am.save(&txn).await.map_err(AppError::from)?;
        }
        txn.commit().await.map_err(AppError::from)?;
        Ok(())
    }

    async fn get_instance(&self, instance_id: &str) -> AppResult<Option<ChannelInstance>> {
        let m = instances::Entity::find_by_id(instance_id.to_string())
            .one(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(m.as_ref().map(Into::into))
    }

    async fn get_instances_by_batch(&self, batch_id: &str) -> AppResult<Vec<ChannelInstance>> {
        let models = instances::Entity::find()
            .filter(instances::Column::BatchId.eq(batch_id.to_string()))
            .all(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(models.iter().map(Into::into).collect())
    }

    async fn update_retest(&self, instance: &ChannelInstance) -> AppResult<()> {
        self.upsert_instance(instance).await
    }

    async fn update_hard_point_results(&self, instances: &[ChannelInstance]) -> AppResult<()> {
        self.batch_upsert_instances(instances).await
    }

    async fn save_batch(&self, batch: &TestBatch) -> AppResult<()> {
        let am: batches::ActiveModel = batch.into();
        am.save(&self.db_conn).await.map_err(AppError::from)?;
        Ok(())
    }

    async fn list_batches(&self) -> AppResult<Vec<TestBatch>> {
        let models = batches::Entity::find().all(&self.db_conn).await.map_err(AppError::from)?;
        Ok(models.iter().map(Into::into).collect())
    }

    async fn get_batch(&self, batch_id: &str) -> AppResult<Option<TestBatch>> {
        let m = batches::Entity::find_by_id(batch_id.to_string())
            .one(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(m.as_ref().map(Into::into))
    }

    async fn delete_batch(&self, batch_id: &str) -> AppResult<()> {
        instances::Entity::delete_many()
            .filter(instances::Column::BatchId.eq(batch_id.to_string()))
            .exec(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        batches::Entity::delete_by_id(batch_id.to_string())
            .exec(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }

    async fn get_global_check(
        &self,
        station_name: &str,
        import_time: DateTime<Utc>,
        function_key: &str,
    ) -> AppResult<Option<GlobalCheck>> {
        let key = global_checks::composite_key(station_name, import_time, function_key);
        let m = global_checks::Entity::find_by_id(key)
            .one(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(m.as_ref().map(Into::into))
    }

    async fn update_global_check(&self, check: &GlobalCheck) -> AppResult<()> {
        let am: global_checks::ActiveModel = check.into();
        am.save(&self.db_conn).await.map_err(AppError::from)?;
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
        let m = config_kv::Entity::find_by_id(key.to_string())
            .one(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(m.map(|m| m.value))
    }

    async fn set_config(&self, key: &str, value: &str) -> AppResult<()> {
        config_kv::active_model(key, value)
            .save(&self.db_conn)
            .await
            .map_err(AppError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModuleType, PointDataType};

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.sqlite");
        let store = SqliteStore::new(Some(&db_path)).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn definition_roundtrips_through_sqlite() {
        let (_dir, store) = temp_store().await;
        let def = PointDefinition::new(
            "S1".into(),
            "LT101".into(),
            "LT101_TAG".into(),
            "液位变送器".into(),
            ModuleType::AI,
            PointDataType::Float,
            "340001".into(),
            Utc::now(),
        );
        store.save_definition(&def).await.unwrap();
        let fetched = store.get_definition(&def.id).await.unwrap().unwrap();
        assert_eq!(fetched.tag, "LT101_TAG");

        let by_station = store.list_definitions_by_station("S1").await.unwrap();
        assert_eq!(by_station.len(), 1);
    }

    #[tokio::test]
    async fn delete_batch_cascades_to_instances() {
        let (_dir, store) = temp_store().await;
        let batch = TestBatch::new("S1".into(), Utc::now());
        store.save_batch(&batch).await.unwrap();

        let def = PointDefinition::new(
            "S1".into(),
            "DI1".into(),
            "DI1_TAG".into(),
            "数字量输入".into(),
            ModuleType::DI,
            PointDataType::Bool,
            "100001".into(),
            Utc::now(),
        );
        let instance = ChannelInstance::new(def.id.clone(), batch.batch_id.clone());
        store.upsert_instance(&instance).await.unwrap();

        store.delete_batch(&batch.batch_id).await.unwrap();

        assert!(store.get_batch(&batch.batch_id).await.unwrap().is_none());
        assert!(store.get_instances_by_batch(&batch.batch_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_kv_roundtrips() {
        let (_dir, store) = temp_store().await;
        assert!(store.get_config("concurrency").await.unwrap().is_none());
        store.set_config("concurrency", "32").await.unwrap();
        assert_eq!(store.get_config("concurrency").await.unwrap().as_deref(), Some("32"));
    }
}
