//! 自动重连器
//!
//! 由应用持有的辅助组件：周期性检查客户端状态，掉线则尝试
//! 重新连接，失败静默等待下一个周期。生命周期与客户端相互独立，
//! 停止重连器不影响客户端本身。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use protocol::RECONNECT_CHECK_PERIOD;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::channel::CommState;
use crate::client::ClientHandle;

/// 自动重连器
pub struct Reconnector {
    period_ms: Arc<AtomicU64>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Reconnector {
    /// 以默认检查周期创建并启动
    pub fn new(client: ClientHandle) -> Self {
        Self::with_period(client, RECONNECT_CHECK_PERIOD)
    }

    /// 以指定检查周期创建并启动
    pub fn with_period(client: ClientHandle, period: Duration) -> Self {
        let period_ms = Arc::new(AtomicU64::new(period.as_millis() as u64));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let shared_period = Arc::clone(&period_ms);
        let task = tokio::spawn(async move {
            loop {
                let period =
                    Duration::from_millis(shared_period.load(Ordering::Relaxed).max(1));
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        if client.state() == CommState::Disconnected {
                            if let Err(e) = client.connect().await {
                                debug!(error = %e, "reconnect attempt failed");
                            }
                        }
                    }
                    _ = stop_rx.changed() => break,
                }
            }
        });

        Self {
            period_ms,
            stop_tx,
            task,
        }
    }

    /// 当前检查周期（毫秒）
    pub fn check_period_ms(&self) -> u64 {
        self.period_ms.load(Ordering::Relaxed)
    }

    /// 调整检查周期，下一个周期生效
    pub fn set_check_period_ms(&self, ms: u64) {
        self.period_ms.store(ms, Ordering::Relaxed);
    }

    /// 停止重连检查；不触碰客户端
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        self.task.abort();
    }
}
