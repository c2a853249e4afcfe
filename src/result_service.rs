//! `ResultService`：合并写入的持久化队列。后台worker从多生产者队列里拉取
//! `ChannelInstance` 快照，攒到 N=10 条或等待 500ms 后落一批盘，保护 `Store`
//! 免受并发硬点完成导致的写风暴冲击，同时保证最终一致的持久化。关闭时把
//! 剩余排空。

use crate::error::AppResult;
use crate::models::ChannelInstance;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const COALESCE_BATCH_SIZE: usize = 10;
const COALESCE_WAIT: Duration = Duration::from_millis(500);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const QUEUE_CAPACITY: usize = 1024;

pub struct ResultService {
    sender: mpsc::Sender<ChannelInstance>,
    worker: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl ResultService {
    pub fn start(store: Arc<dyn Store>) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let shutdown = Arc::new(tokio::sync::Notify::new());
        let worker_shutdown = shutdown.clone();
        let worker = tokio::spawn(Self::run_worker(store, receiver, worker_shutdown));
        Self { sender, worker: tokio::sync::Mutex::new(Some(worker)), shutdown }
    }

    /// 提交一次实例快照；队列满时等待，不丢弃更新
    pub async fn submit(&self, instance: ChannelInstance) -> AppResult<()> {
        self.sender
            .send(instance)
            .await
            .map_err(|_| crate::error::AppError::storage("结果队列已关闭"))
    }

    async fn run_worker(
        store: Arc<dyn Store>,
        mut receiver: mpsc::Receiver<ChannelInstance>,
        shutdown: Arc<tokio::sync::Notify>,
    ) {
        loop {
            let mut batch = Vec::with_capacity(COALESCE_BATCH_SIZE);

            tokio::select! {
                _ = shutdown.notified() => {
                    Self::drain(&mut receiver, &store).await;
                    return;
                }
                maybe_first = receiver.recv() => {
                    match maybe_first {
                        Some(first) => batch.push(first),
                        None => return,
                    }
                }
            }

            // 立即收集当前已到达的，最多到 N；不足则等待至多 500ms 补齐
            while batch.len() < COALESCE_BATCH_SIZE {
                match receiver.try_recv() {
                    Ok(item) => batch.push(item),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => break,
                }
            }

            if batch.len() < COALESCE_BATCH_SIZE {
                if let Ok(Some(item)) = timeout(COALESCE_WAIT, receiver.recv()).await {
                    batch.push(item);
                    while batch.len() < COALESCE_BATCH_SIZE {
                        match receiver.try_recv() {
                            Ok(item) => batch.push(item),
                            Err(_) => break,
                        }
                    }
                }
            }

            if !batch.is_empty() {
                if let Err(e) = store.batch_upsert_instances(&batch).await {
                    log::warn!("结果合并写入失败: {}", e);
                }
            }
        }
    }

    async fn drain(receiver: &mut mpsc::Receiver<ChannelInstance>, store: &Arc<dyn Store>) {
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        let mut remaining = Vec::new();
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            match timeout(deadline - now, receiver.recv()).await {
                Ok(Some(item)) => remaining.push(item),
                _ => break,
            }
        }
        if !remaining.is_empty() {
            if let Err(e) = store.batch_upsert_instances(&remaining).await {
                log::warn!("关闭前排空结果队列失败: {}", e);
            }
        }
    }

    /// 触发关闭信号并等待worker在排空窗口内退出
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TestBatch;
    use crate::store::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn coalesces_bursts_and_persists_all() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let service = ResultService::start(store.clone());
        let batch = TestBatch::new("S1".into(), Utc::now());

        for i in 0..25 {
            let mut instance = ChannelInstance::new(format!("def{}", i), batch.batch_id.clone());
            instance.instance_id = format!("inst{}", i);
            service.submit(instance).await.unwrap();
        }

        // give the worker a moment to flush multiple coalesced batches
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.shutdown().await;

        let persisted = store.get_instances_by_batch(&batch.batch_id).await.unwrap();
        assert_eq!(persisted.len(), 25);
    }
}
