//! 确定性内存 `PlcLink`，供单元测试/属性测试使用：一个真正可编程的桩，
//! 而不是常驻返回默认值的空实现。

use super::{strip_address_prefix, LinkError, LinkErrorKind, PlcLink};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// 可编程的内存寄存器表：测试用例预先 `set_bool`/`set_f32`，被测代码通过
/// `PlcLink` 读取；写入的值同样落回这张表，供断言观察安全默认值是否生效。
#[derive(Default)]
pub struct StubPlcLink {
    bools: Mutex<HashMap<String, bool>>,
    floats: Mutex<HashMap<String, f32>>,
    connected: AtomicBool,
    fail_connect: AtomicBool,
}

impl StubPlcLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_connect(&self) {
        self.fail_connect.store(true, Ordering::Release);
    }

    pub async fn set_bool(&self, address: &str, value: bool) {
        self.bools.lock().await.insert(Self::key(address), value);
    }

    pub async fn set_f32(&self, address: &str, value: f32) {
        self.floats.lock().await.insert(Self::key(address), value);
    }

    pub async fn get_bool(&self, address: &str) -> Option<bool> {
        self.bools.lock().await.get(&Self::key(address)).copied()
    }

    pub async fn get_f32(&self, address: &str) -> Option<f32> {
        self.floats.lock().await.get(&Self::key(address)).copied()
    }

    fn key(address: &str) -> String {
        strip_address_prefix(address).map(|s| s.to_string()).unwrap_or_default()
    }
}

#[async_trait]
impl PlcLink for StubPlcLink {
    async fn connect(&self) -> Result<(), LinkError> {
        if self.fail_connect.swap(false, Ordering::AcqRel) {
            return Err(LinkError::new(LinkErrorKind::ConnectFailed, "模拟连接失败"));
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn read_bool(&self, address: &str) -> Result<bool, LinkError> {
        strip_address_prefix(address)?;
        self.get_bool(address)
            .await
            .ok_or_else(|| LinkError::new(LinkErrorKind::AddressInvalid, format!("未编程的地址: {}", address)))
    }

    async fn write_bool(&self, address: &str, value: bool) -> Result<(), LinkError> {
        strip_address_prefix(address)?;
        self.set_bool(address, value).await;
        Ok(())
    }

    async fn read_f32(&self, address: &str) -> Result<f32, LinkError> {
        strip_address_prefix(address)?;
        self.get_f32(address)
            .await
            .ok_or_else(|| LinkError::new(LinkErrorKind::AddressInvalid, format!("未编程的地址: {}", address)))
    }

    async fn write_f32(&self, address: &str, value: f32) -> Result<(), LinkError> {
        strip_address_prefix(address)?;
        self.set_f32(address, value).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_then_roundtrip() {
        let link = StubPlcLink::new();
        link.connect().await.unwrap();
        assert!(link.is_connected());

        link.write_f32("4MY100", 42.5).await.unwrap();
        assert_eq!(link.read_f32("4MY100").await.unwrap(), 42.5);

        link.write_bool("0MY1", true).await.unwrap();
        assert!(link.read_bool("0MY1").await.unwrap());
    }

    #[tokio::test]
    async fn fail_next_connect_returns_connect_failed() {
        let link = StubPlcLink::new();
        link.fail_next_connect();
        let err = link.connect().await.unwrap_err();
        assert_eq!(err.kind, LinkErrorKind::ConnectFailed);
        assert!(!link.is_connected());
        link.connect().await.unwrap();
        assert!(link.is_connected());
    }
}
