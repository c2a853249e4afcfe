//! 应用配置：通过 `config` crate 从文件/环境变量加载 PLC 端点、通道池布局
//! 和并发上限。

use crate::allocator::{ChannelPool, TestChannel};
use crate::error::{AppError, AppResult};
use crate::models::ModuleType;
use crate::plc::PlcConnectionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub module_type: String,
    pub tag: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlcEndpointConfig {
    pub host: String,
    pub port: u16,
    pub unit: u8,
}

impl From<PlcEndpointConfig> for PlcConnectionConfig {
    fn from(value: PlcEndpointConfig) -> Self {
        PlcConnectionConfig {
            host: value.host,
            port: value.port,
            unit: value.unit,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub test_plc: PlcEndpointConfig,
    pub target_plc: PlcEndpointConfig,
    pub concurrency: usize,
    pub channels: Vec<ChannelEntry>,
    pub database_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            test_plc: PlcEndpointConfig { host: "127.0.0.1".into(), port: 502, unit: 1 },
            target_plc: PlcEndpointConfig { host: "127.0.0.1".into(), port: 503, unit: 1 },
            concurrency: 64,
            channels: Vec::new(),
            database_path: None,
        }
    }
}

impl EngineConfig {
    /// 从 TOML/JSON/YAML 配置文件加载，叠加 `FAT_ENGINE_` 前缀的环境变量覆盖；
    /// 未提供文件时，仅从环境变量层构建（缺省字段落到 `Default`）
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("FAT_ENGINE").separator("__"));

        let settings = builder.build().map_err(|e| AppError::config(e.to_string()))?;
        match settings.try_deserialize::<Self>() {
            Ok(cfg) => Ok(cfg),
            Err(_) if path.is_none() => Ok(Self::default()),
            Err(e) => Err(AppError::config(e.to_string())),
        }
    }

    pub fn channel_pool(&self) -> AppResult<ChannelPool> {
        let mut grouped: HashMap<ModuleType, Vec<TestChannel>> = HashMap::new();
        for entry in &self.channels {
            let module_type: ModuleType = entry.module_type.parse().map_err(AppError::config)?;
            grouped.entry(module_type).or_default().push(TestChannel {
                tag: entry.tag.clone(),
                address: entry.address.clone(),
            });
        }
        let mut pool = ChannelPool::new();
        for (module_type, channels) in grouped {
            pool = pool.with_channels(module_type, channels);
        }
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_ports() {
        let config = EngineConfig::default();
        assert_eq!(config.test_plc.port, 502);
        assert_eq!(config.concurrency, 64);
    }

    #[test]
    fn channel_pool_groups_by_module_type() {
        let mut config = EngineConfig::default();
        config.channels.push(ChannelEntry { module_type: "AI".into(), tag: "AI1".into(), address: "340001".into() });
        config.channels.push(ChannelEntry { module_type: "AI".into(), tag: "AI2".into(), address: "340003".into() });
        let pool = config.channel_pool().unwrap();
        assert_eq!(pool.channels.get(&ModuleType::AI).unwrap().len(), 2);
    }
}
