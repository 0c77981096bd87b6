//! 错误类型定义

use thiserror::Error;

/// 通信协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 负载大小超限
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 当前未连接
    #[error("Not connected")]
    NotConnected,

    /// 已处于连接状态
    #[error("Already connected")]
    AlreadyConnected,

    /// 发送超时
    #[error("Send timeout")]
    SendTimeout,

    /// 接收超时
    #[error("Receive timeout")]
    ReceiveTimeout,
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
