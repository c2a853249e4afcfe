//! `config_kv` 表：PLC 连接端点等运行期可调配置的键值存储

use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "config_kv")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    #[sea_orm(column_type = "Text")]
    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub fn active_model(key: &str, value: &str) -> ActiveModel {
    ActiveModel {
        key: Set(key.to_string()),
        value: Set(value.to_string()),
    }
}
