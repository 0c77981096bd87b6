//! 协议常量定义

use std::time::Duration;

/// 协议版本号（帧头第 5 字节）
pub const PROTOCOL_VERSION: u8 = 0x01;

/// 帧头大小: 4 字节长度 + 1 字节版本
pub const HEADER_SIZE: usize = 5;

/// 单帧负载最大字节数 (128 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 128 * 1024 * 1024;

/// 接收缓冲区大小
pub const RECEIVE_BUFFER_SIZE: usize = 4096;

/// 连接超时（毫秒）
pub const CONNECT_TIMEOUT_MS: u64 = 15_000;

/// 发送超时（毫秒）- 0 表示不限
pub const SEND_TIMEOUT_MS: u64 = 5_000;

/// 接收超时（毫秒）- 0 表示不限
pub const RECEIVE_TIMEOUT_MS: u64 = 0;

/// Ping 定时器默认周期（毫秒）
pub const PING_INTERVAL_MS: u64 = 30_000;

/// Ping 静默门限 - 通道在此时间内有过收发则跳过本轮 ping
pub const PING_QUIET_THRESHOLD: Duration = Duration::from_secs(60);

/// RTT 样本环形缓冲区容量
pub const RTT_SAMPLE_CAPACITY: usize = 10;

/// 重连检查默认周期
pub const RECONNECT_CHECK_PERIOD: Duration = Duration::from_secs(20);

/// 监听器 accept 出错后的重试等待
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_secs(1);
