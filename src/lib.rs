//! `fat_engine` — 双 PLC 工厂验收测试（FAT）执行引擎核心库。
//!
//! 从导入的点表出发：构建测试批次，把每个逻辑点分配到一个物理测试PLC通道，
//! 再对每个通道运行状态机，完成刺激/采样/比对/记录。

pub mod allocator;
pub mod channel_state_manager;
pub mod config;
pub mod error;
pub mod events;
pub mod excel;
pub mod manual_test_io;
pub mod models;
pub mod orchestrator;
pub mod plc;
pub mod result_service;
pub mod store;
pub mod task_manager;
pub mod tasks;

pub use error::{AppError, AppResult};
pub use orchestrator::Orchestrator;
