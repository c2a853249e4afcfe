//! 核心数据模型
//!
//! 点位定义、通道实例、批次、全局检查。

pub mod enums;
pub mod definitions;
pub mod instance;
pub mod batch;
pub mod global_check;

pub use enums::*;
pub use definitions::*;
pub use instance::*;
pub use batch::*;
pub use global_check::*;

use uuid::Uuid;

/// 生成新的 UUIDv4 字符串，用作各类实体的主键
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
