//! 远程方法调用层
//!
//! 完全构建在消息通信核心之上:
//! - [`RemoteService`]: 服务端可被调用对象的分发抽象
//! - [`ServiceHost`]: 持有服务端，应答 RemoteInvoke 消息
//! - [`ServiceClient`]: 按消息回复标识关联应答的同步调用方
//!
//! 服务端方法抛出的异常以远程异常记录随返回消息传回，
//! 客户端将其还原为 [`ServiceError::Remote`]。

mod client;
mod error;
mod host;
mod service;

pub use client::ServiceClient;
pub use error::{Result, ServiceError};
pub use host::ServiceHost;
pub use service::RemoteService;
