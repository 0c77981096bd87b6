//! 套接字调优配置

use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

use crate::{CONNECT_TIMEOUT_MS, RECEIVE_TIMEOUT_MS, SEND_TIMEOUT_MS};

/// 应用到每个套接字（客户端发起或服务端接入）的配置
#[derive(Clone, Debug)]
pub struct SocketOptions {
    /// 禁用 Nagle 批量发送
    pub no_delay: bool,
    /// 启用操作系统层 TCP keep-alive 探测
    pub keep_alive_enabled: bool,
    /// 首次探测前的空闲时间（秒），None 表示用系统默认
    pub keep_alive_time_secs: Option<u32>,
    /// 探测间隔（秒），None 表示用系统默认
    pub keep_alive_interval_secs: Option<u32>,
    /// 发送超时（毫秒），0 表示不限
    pub send_timeout_ms: u64,
    /// 接收超时（毫秒），0 表示不限
    pub receive_timeout_ms: u64,
    /// 连接超时（毫秒）
    pub connect_timeout_ms: u64,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            no_delay: true,
            keep_alive_enabled: false,
            keep_alive_time_secs: None,
            keep_alive_interval_secs: None,
            send_timeout_ms: SEND_TIMEOUT_MS,
            receive_timeout_ms: RECEIVE_TIMEOUT_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
        }
    }
}

impl SocketOptions {
    /// 将配置应用到已建立的流上
    ///
    /// tokio 的 `TcpStream` 只暴露 nodelay；keep-alive 各项在此运行时
    /// 不可设置，启用时记录日志后忽略。
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.no_delay)?;
        if self.keep_alive_enabled {
            debug!(
                time_secs = ?self.keep_alive_time_secs,
                interval_secs = ?self.keep_alive_interval_secs,
                "TCP keep-alive options not supported by this runtime, ignored"
            );
        }
        Ok(())
    }

    /// 发送超时，0 映射为 None（不限）
    pub fn send_timeout(&self) -> Option<Duration> {
        (self.send_timeout_ms > 0).then(|| Duration::from_millis(self.send_timeout_ms))
    }

    /// 接收超时，0 映射为 None（不限）
    pub fn receive_timeout(&self) -> Option<Duration> {
        (self.receive_timeout_ms > 0).then(|| Duration::from_millis(self.receive_timeout_ms))
    }

    /// 连接超时
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
