//! `ManualTestIo`：为操作员手动子测试阶段提供三条独立的周期性循环，
//! 外加两个一次性命令。
//!
//! 每个监控槽位持有当前 `JoinHandle`；启动新的监控会中止前一个
//! （"开始一个监控隐式停止前一个"）。循环内的错误被吞掉，通过回调
//! 报告为"monitor exception"，不会使整个引擎崩溃。

use crate::models::ChannelInstance;
use crate::plc::PlcLink;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 四个报警设定点的当前读数
#[derive(Debug, Clone, Default)]
pub struct AlarmReadings {
    pub sl: Option<f32>,
    pub sll: Option<f32>,
    pub sh: Option<f32>,
    pub shh: Option<f32>,
}

pub type AlarmCallback = Arc<dyn Fn(AlarmReadings) + Send + Sync>;
pub type StringCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Default)]
struct MonitorSlot {
    handle: Option<JoinHandle<()>>,
}

impl MonitorSlot {
    fn replace(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.handle.take() {
            old.abort();
        }
        self.handle = Some(handle);
    }

    fn stop(&mut self) {
        if let Some(old) = self.handle.take() {
            old.abort();
        }
    }
}

pub struct ManualTestIo {
    alarm_slot: Mutex<MonitorSlot>,
    ao_feedback_slot: Mutex<MonitorSlot>,
    do_feedback_slot: Mutex<MonitorSlot>,
}

impl Default for ManualTestIo {
    fn default() -> Self {
        Self {
            alarm_slot: Mutex::new(MonitorSlot::default()),
            ao_feedback_slot: Mutex::new(MonitorSlot::default()),
            do_feedback_slot: Mutex::new(MonitorSlot::default()),
        }
    }
}

impl ManualTestIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每 500ms 读取被测PLC上的 sl/sll/sh/shh 四个报警设定点，推送给回调
    pub async fn start_alarm_monitor(
        &self,
        target_link: Arc<dyn PlcLink>,
        addresses: (Option<String>, Option<String>, Option<String>, Option<String>),
        on_update: AlarmCallback,
        on_error: StringCallback,
    ) {
        let (sl_addr, sll_addr, sh_addr, shh_addr) = addresses;
        let handle = tokio::spawn(async move {
            loop {
                let read_one = |addr: &Option<String>| {
                    let link = target_link.clone();
                    let addr = addr.clone();
                    async move {
                        match addr {
                            Some(a) => link.read_f32(&a).await.ok(),
                            None => None,
                        }
                    }
                };

                let readings = AlarmReadings {
                    sl: read_one(&sl_addr).await,
                    sll: read_one(&sll_addr).await,
                    sh: read_one(&sh_addr).await,
                    shh: read_one(&shh_addr).await,
                };
                on_update(readings);
                tokio::time::sleep(POLL_INTERVAL).await;

                // A transient read error on any single address is tolerated
                // (surfaced as None above); a connection-level failure is
                // reported through on_error without stopping the loop.
                if !target_link.is_connected() {
                    on_error("monitor exception: 被测PLC连接已断开".to_string());
                }
            }
        });
        self.alarm_slot.lock().await.replace(handle);
    }

    /// 每 500ms 读取测试PLC采样的百分比，按实例量程换算为工程值并推送
    pub async fn start_ao_feedback(
        &self,
        test_link: Arc<dyn PlcLink>,
        test_plc_address: String,
        range_low: f32,
        range_high: f32,
        on_update: StringCallback,
        on_error: StringCallback,
    ) {
        let handle = tokio::spawn(async move {
            loop {
                match test_link.read_f32(&test_plc_address).await {
                    Ok(percent) => {
                        let eng = range_low + (range_high - range_low) * percent / 100.0;
                        on_update(format!("{:.2}", eng));
                    }
                    Err(e) => on_error(format!("monitor exception: {}", e)),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        });
        self.ao_feedback_slot.lock().await.replace(handle);
    }

    /// 每 500ms 读取测试PLC的数字量反馈，格式化为 "ON"/"OFF"
    pub async fn start_do_feedback(
        &self,
        test_link: Arc<dyn PlcLink>,
        test_plc_address: String,
        on_update: StringCallback,
        on_error: StringCallback,
    ) {
        let handle = tokio::spawn(async move {
            loop {
                match test_link.read_bool(&test_plc_address).await {
                    Ok(v) => on_update(if v { "ON".to_string() } else { "OFF".to_string() }),
                    Err(e) => on_error(format!("monitor exception: {}", e)),
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        });
        self.do_feedback_slot.lock().await.replace(handle);
    }

    /// 一次性命令：把工程值转换为百分比写入测试PLC（AI手动复核用）
    pub async fn send_ai_test_value(
        &self,
        test_link: &Arc<dyn PlcLink>,
        instance: &ChannelInstance,
        test_plc_address: &str,
        range_low: f32,
        range_high: f32,
        engineering_value: f32,
    ) -> Result<(), crate::plc::LinkError> {
        let _ = instance;
        let range = range_high - range_low;
        let percent = if range.abs() > f32::EPSILON { (engineering_value - range_low) / range * 100.0 } else { 0.0 };
        test_link.write_f32(test_plc_address, percent).await
    }

    /// 一次性命令：写布尔量到测试PLC（DI手动复核用）
    pub async fn send_di_signal(
        &self,
        test_link: &Arc<dyn PlcLink>,
        test_plc_address: &str,
        on: bool,
    ) -> Result<(), crate::plc::LinkError> {
        test_link.write_bool(test_plc_address, on).await
    }

    /// 停止全部监控循环
    pub async fn stop_all(&self) {
        self.alarm_slot.lock().await.stop();
        self.ao_feedback_slot.lock().await.stop();
        self.do_feedback_slot.lock().await.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plc::StubPlcLink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn starting_a_new_do_monitor_stops_the_previous_one() {
        let io = ManualTestIo::new();
        let link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        link.connect().await.unwrap();
        link.write_bool("0ADDR", true).await.unwrap();

        let first_calls = Arc::new(AtomicUsize::new(0));
        let first_calls_clone = first_calls.clone();
        io.start_do_feedback(
            link.clone(),
            "0ADDR".into(),
            Arc::new(move |_| {
                first_calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(|_| {}),
        )
        .await;

        tokio::time::sleep(Duration::from_millis(20)).await;

        let second_calls = Arc::new(AtomicUsize::new(0));
        let second_calls_clone = second_calls.clone();
        io.start_do_feedback(
            link,
            "0ADDR".into(),
            Arc::new(move |_| {
                second_calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(|_| {}),
        )
        .await;

        let count_after_replace = first_calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(first_calls.load(Ordering::SeqCst), count_after_replace, "old monitor must not fire again");

        io.stop_all().await;
    }

    #[tokio::test]
    async fn send_ai_test_value_converts_engineering_to_percentage() {
        let io = ManualTestIo::new();
        let link: Arc<dyn PlcLink> = Arc::new(StubPlcLink::new());
        link.connect().await.unwrap();
        let instance = ChannelInstance::new("def1".into(), "batch1".into());

        io.send_ai_test_value(&link, &instance, "4ADDR", 0.0, 100.0, 50.0).await.unwrap();
        assert_eq!(link.read_f32("4ADDR").await.unwrap(), 50.0);
    }
}
