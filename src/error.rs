//! 统一错误类型
//!
//! 跨越组件边界的四类错误：配置错误、PLC 链路错误、
//! 状态错误、持久化错误，外加少量粘合用的变体（序列化、通用）。

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// 点位定义/量程/分配池配置错误，仅影响单个定义，批次继续
    #[error("配置错误: {message}")]
    ConfigError { message: String },

    /// PLC 连接/读写/超时错误，仅影响当前步骤
    #[error("PLC链路错误: {message}")]
    LinkError { message: String },

    /// 命令在当前状态下被拒绝（终态实例、批次已在运行等）
    #[error("状态错误: {message}")]
    StateError { message: String },

    /// 持久化写入失败；内存状态已经前进，调用方需要告警而不是丢弃
    #[error("持久化错误: {message}")]
    StorageError { message: String },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization { message: String },

    /// 兜底错误
    #[error("错误: {message}")]
    Generic { message: String },
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        AppError::ConfigError { message: msg.into() }
    }
    pub fn link(msg: impl Into<String>) -> Self {
        AppError::LinkError { message: msg.into() }
    }
    pub fn state(msg: impl Into<String>) -> Self {
        AppError::StateError { message: msg.into() }
    }
    pub fn storage(msg: impl Into<String>) -> Self {
        AppError::StorageError { message: msg.into() }
    }
    pub fn generic(msg: impl Into<String>) -> Self {
        AppError::Generic { message: msg.into() }
    }

    /// 是否属于"可恢复"类错误（记录并继续，而非终止调用方）
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AppError::LinkError { .. } | AppError::StorageError { .. })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization { message: e.to_string() }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(e: sea_orm::DbErr) -> Self {
        AppError::StorageError { message: e.to_string() }
    }
}

pub type AppResult<T> = Result<T, AppError>;
