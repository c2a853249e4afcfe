//! `PlcLink`：单条 PLC 连接上的类型化读写能力
//!
//! 地址字符串携带一个前导前缀字符（例如历史点表里嵌入的命名空间字母），
//! 调用方在发送到线路层之前精确剥离这一个 `char`（而不是一个字节，以便
//! 在 UTF-8 下保持正确）。

pub mod modbus;
pub mod stub;

use async_trait::async_trait;
use std::fmt;

pub use modbus::{ModbusPlcLink, PlcConnectionConfig};
pub use stub::StubPlcLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkErrorKind {
    ConnectFailed,
    Timeout,
    AddressInvalid,
    ProtocolError,
}

#[derive(Debug, Clone)]
pub struct LinkError {
    pub kind: LinkErrorKind,
    pub message: String,
}

impl LinkError {
    pub fn new(kind: LinkErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for LinkError {}

impl From<LinkError> for crate::error::AppError {
    fn from(e: LinkError) -> Self {
        crate::error::AppError::link(e.to_string())
    }
}

/// 剥离地址前缀字符，返回剩余地址；地址为空时报 `AddressInvalid`
pub fn strip_address_prefix(address: &str) -> Result<&str, LinkError> {
    let mut chars = address.chars();
    match chars.next() {
        Some(_) => Ok(chars.as_str()),
        None => Err(LinkError::new(LinkErrorKind::AddressInvalid, "地址为空")),
    }
}

#[async_trait]
pub trait PlcLink: Send + Sync {
    /// 幂等；已连接时直接返回 Ok
    async fn connect(&self) -> Result<(), LinkError>;
    fn is_connected(&self) -> bool;

    async fn read_bool(&self, address: &str) -> Result<bool, LinkError>;
    async fn write_bool(&self, address: &str, value: bool) -> Result<(), LinkError>;

    async fn read_f32(&self, address: &str) -> Result<f32, LinkError>;
    async fn write_f32(&self, address: &str, value: f32) -> Result<(), LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_prefix_removes_exactly_one_char() {
        assert_eq!(strip_address_prefix("N40001").unwrap(), "40001");
        assert_eq!(strip_address_prefix("440001").unwrap(), "40001");
        assert!(strip_address_prefix("").is_err());
    }
}
