//! `tokio-modbus` 承载的 TCP 实现，提供真实的字节序转换与超时/重连策略。

use super::{strip_address_prefix, LinkError, LinkErrorKind, PlcLink};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::time::Duration;
use tokio_modbus::client::Context as ModbusClientContext;
use tokio_modbus::prelude::*;

/// 32 位寄存器对的字节序，默认 CDAB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Abcd,
    Cdab,
    Badc,
    Dcba,
}

impl Default for ByteOrder {
    fn default() -> Self {
        ByteOrder::Cdab
    }
}

fn registers_to_float(r1: u16, r2: u16, order: ByteOrder) -> f32 {
    let [a, b] = r1.to_be_bytes();
    let [c, d] = r2.to_be_bytes();
    let bytes = match order {
        ByteOrder::Abcd => [a, b, c, d],
        ByteOrder::Cdab => [c, d, a, b],
        ByteOrder::Badc => [b, a, d, c],
        ByteOrder::Dcba => [d, c, b, a],
    };
    f32::from_be_bytes(bytes)
}

fn float_to_registers(value: f32, order: ByteOrder) -> (u16, u16) {
    let [a, b, c, d] = value.to_be_bytes();
    let (r1, r2) = match order {
        ByteOrder::Abcd => ([a, b], [c, d]),
        ByteOrder::Cdab => ([c, d], [a, b]),
        ByteOrder::Badc => ([b, a], [d, c]),
        ByteOrder::Dcba => ([d, c], [b, a]),
    };
    (u16::from_be_bytes(r1), u16::from_be_bytes(r2))
}

/// 连接描述符，持久化在 `Store` 的 config 键值集合里
#[derive(Debug, Clone)]
pub struct PlcConnectionConfig {
    pub host: String,
    pub port: u16,
    pub unit: u8,
    pub byte_order: ByteOrder,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for PlcConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit: 1,
            byte_order: ByteOrder::default(),
            connect_timeout_ms: 2000,
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
        }
    }
}

/// 按首字符区分寄存器类型：'0'=线圈 '1'=离散输入 '3'=输入寄存器 '4'=保持寄存器；
/// 地址从 1 起始，转换为 Modbus 0-based 偏移
fn parse_modbus_address(address: &str) -> Result<(char, u16), LinkError> {
    if address.is_empty() {
        return Err(LinkError::new(LinkErrorKind::AddressInvalid, "地址为空"));
    }
    let prefix = address.chars().next().unwrap();
    let offset_str = &address[prefix.len_utf8()..];
    let offset: u16 = offset_str
        .parse()
        .map_err(|_| LinkError::new(LinkErrorKind::AddressInvalid, format!("无效的地址偏移量: {}", offset_str)))?;
    if offset == 0 {
        return Err(LinkError::new(LinkErrorKind::AddressInvalid, "地址偏移量必须从1开始"));
    }
    match prefix {
        '0' | '1' | '3' | '4' => Ok((prefix, offset - 1)),
        other => Err(LinkError::new(
            LinkErrorKind::AddressInvalid,
            format!("不支持的地址类型前缀 '{}'", other),
        )),
    }
}

pub struct ModbusPlcLink {
    config: PlcConnectionConfig,
    ctx: Mutex<Option<ModbusClientContext>>,
    connected: AtomicBool,
}

impl ModbusPlcLink {
    pub fn new(config: PlcConnectionConfig) -> Self {
        Self {
            config,
            ctx: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    fn socket_addr(&self) -> Result<SocketAddr, LinkError> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| LinkError::new(LinkErrorKind::ConnectFailed, format!("无效的地址/端口: {}", e)))
    }

    fn wire_address(&self, address: &str) -> Result<(char, u16), LinkError> {
        let stripped = strip_address_prefix(address)?;
        parse_modbus_address(stripped)
    }
}

#[async_trait]
impl PlcLink for ModbusPlcLink {
    async fn connect(&self) -> Result<(), LinkError> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let addr = self.socket_addr()?;
        let slave = Slave(self.config.unit);
        match tokio::time::timeout(
            Duration::from_millis(self.config.connect_timeout_ms),
            tokio_modbus::client::tcp::connect_slave(addr, slave),
        )
        .await
        {
            Ok(Ok(ctx)) => {
                *self.ctx.lock().await = Some(ctx);
                self.connected.store(true, Ordering::Release);
                Ok(())
            }
            Ok(Err(e)) => Err(LinkError::new(LinkErrorKind::ConnectFailed, e.to_string())),
            Err(_) => Err(LinkError::new(LinkErrorKind::Timeout, "连接超时")),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn read_bool(&self, address: &str) -> Result<bool, LinkError> {
        let (prefix, offset) = self.wire_address(address)?;
        let mut guard = self.ctx.lock().await;
        let ctx = guard
            .as_mut()
            .ok_or_else(|| LinkError::new(LinkErrorKind::ConnectFailed, "未连接"))?;

        let fut = match prefix {
            '0' => ctx.read_coils(offset, 1),
            '1' => ctx.read_discrete_inputs(offset, 1),
            _ => return Err(LinkError::new(LinkErrorKind::AddressInvalid, "地址不是线圈或离散输入")),
        };
        let values = match tokio::time::timeout(Duration::from_millis(self.config.read_timeout_ms), fut).await {
            Ok(Ok(Ok(v))) => v,
            Ok(Ok(Err(e))) => return Err(LinkError::new(LinkErrorKind::ProtocolError, format!("{:?}", e))),
            Ok(Err(e)) => return Err(LinkError::new(LinkErrorKind::ProtocolError, e.to_string())),
            Err(_) => return Err(LinkError::new(LinkErrorKind::Timeout, "读取超时")),
        };
        values
            .first()
            .copied()
            .ok_or_else(|| LinkError::new(LinkErrorKind::ProtocolError, "读取结果为空"))
    }

    async fn write_bool(&self, address: &str, value: bool) -> Result<(), LinkError> {
        let (prefix, offset) = self.wire_address(address)?;
        if prefix != '0' {
            return Err(LinkError::new(LinkErrorKind::AddressInvalid, "地址不是可写线圈"));
        }
        let mut guard = self.ctx.lock().await;
        let ctx = guard
            .as_mut()
            .ok_or_else(|| LinkError::new(LinkErrorKind::ConnectFailed, "未连接"))?;
        match tokio::time::timeout(
            Duration::from_millis(self.config.write_timeout_ms),
            ctx.write_single_coil(offset, value),
        )
        .await
        {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(LinkError::new(LinkErrorKind::ProtocolError, format!("{:?}", e))),
            Ok(Err(e)) => Err(LinkError::new(LinkErrorKind::ProtocolError, e.to_string())),
            Err(_) => Err(LinkError::new(LinkErrorKind::Timeout, "写入超时")),
        }
    }

    async fn read_f32(&self, address: &str) -> Result<f32, LinkError> {
        let (prefix, offset) = self.wire_address(address)?;
        let mut guard = self.ctx.lock().await;
        let ctx = guard
            .as_mut()
            .ok_or_else(|| LinkError::new(LinkErrorKind::ConnectFailed, "未连接"))?;

        let fut = match prefix {
            '4' => ctx.read_holding_registers(offset, 2),
            '3' => ctx.read_input_registers(offset, 2),
            _ => return Err(LinkError::new(LinkErrorKind::AddressInvalid, "地址不是寄存器地址")),
        };
        let values = match tokio::time::timeout(Duration::from_millis(self.config.read_timeout_ms), fut).await {
            Ok(Ok(Ok(v))) => v,
            Ok(Ok(Err(e))) => return Err(LinkError::new(LinkErrorKind::ProtocolError, format!("{:?}", e))),
            Ok(Err(e)) => return Err(LinkError::new(LinkErrorKind::ProtocolError, e.to_string())),
            Err(_) => return Err(LinkError::new(LinkErrorKind::Timeout, "读取超时")),
        };
        if values.len() < 2 {
            return Err(LinkError::new(LinkErrorKind::ProtocolError, "寄存器数量不足"));
        }
        Ok(registers_to_float(values[0], values[1], self.config.byte_order))
    }

    async fn write_f32(&self, address: &str, value: f32) -> Result<(), LinkError> {
        let (prefix, offset) = self.wire_address(address)?;
        if prefix != '4' {
            return Err(LinkError::new(LinkErrorKind::AddressInvalid, "地址不是可写保持寄存器"));
        }
        let (r1, r2) = float_to_registers(value, self.config.byte_order);
        let mut guard = self.ctx.lock().await;
        let ctx = guard
            .as_mut()
            .ok_or_else(|| LinkError::new(LinkErrorKind::ConnectFailed, "未连接"))?;
        match tokio::time::timeout(
            Duration::from_millis(self.config.write_timeout_ms),
            ctx.write_multiple_registers(offset, &[r1, r2]),
        )
        .await
        {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(LinkError::new(LinkErrorKind::ProtocolError, format!("{:?}", e))),
            Ok(Err(e)) => Err(LinkError::new(LinkErrorKind::ProtocolError, e.to_string())),
            Err(_) => Err(LinkError::new(LinkErrorKind::Timeout, "写入超时")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_round_trips() {
        for order in [ByteOrder::Abcd, ByteOrder::Cdab, ByteOrder::Badc, ByteOrder::Dcba] {
            let value = 123.456_f32;
            let (r1, r2) = float_to_registers(value, order);
            let back = registers_to_float(r1, r2, order);
            assert!((back - value).abs() < 1e-3, "order {:?} failed round trip", order);
        }
    }

    #[test]
    fn parse_modbus_address_rejects_zero_offset() {
        assert!(parse_modbus_address("40000").is_err());
        assert_eq!(parse_modbus_address("40001").unwrap(), ('4', 0));
    }
}
