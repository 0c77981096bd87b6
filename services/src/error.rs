//! 服务层错误类型

use protocol::{ProtocolError, RemoteException};
use thiserror::Error;

/// 远程调用错误
#[derive(Error, Debug)]
pub enum ServiceError {
    /// 服务端方法抛出的异常
    #[error("Remote exception: {}", .0.message)]
    Remote(RemoteException),

    /// 等待应答超时
    #[error("Invoke timed out")]
    Timeout,

    /// 等待应答期间连接断开
    #[error("Disconnected while waiting for reply")]
    Disconnected,

    /// 底层通信错误
    #[error(transparent)]
    Comm(#[from] ProtocolError),
}

/// 服务层操作结果类型
pub type Result<T> = std::result::Result<T, ServiceError>;
