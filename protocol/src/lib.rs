//! 消息通信运行时共享协议库
//!
//! 包含:
//! - 消息模型 (Message, MessageBody, ParamValue)
//! - 帧编解码 (FrameCodec)
//! - 传输层抽象 (Transport trait)
//! - 端点与套接字配置 (Endpoint, SocketOptions)

mod codec;
mod constants;
mod endpoint;
mod error;
mod message;
mod options;
mod transport;

pub use codec::FrameCodec;
pub use constants::*;
pub use endpoint::Endpoint;
pub use error::{ProtocolError, Result};
pub use message::{Message, MessageBody, ParamValue, RemoteException};
pub use options::SocketOptions;
pub use transport::{TcpListener, TcpTransport, Transport, TransportListener};
