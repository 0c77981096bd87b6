//! 消息通信运行时
//!
//! 在协议库之上实现:
//! - 通信通道 (Channel): 每连接的接收泵、串行化发送与状态机
//! - 服务端 (Server / ServerClient): accept 循环、在线客户端表、ping 自动应答
//! - 客户端 (Client): 连接生命周期、ping 定时器与 RTT 统计
//! - 重连器 (Reconnector): 掉线后周期性重建客户端连接

mod channel;
mod client;
mod listener;
mod reconnector;
mod server;
mod server_client;

pub use channel::{Channel, ChannelEvent, CommState};
pub use client::{Client, ClientEvent, ClientHandle};
pub use reconnector::Reconnector;
pub use server::{Server, ServerEvent};
pub use server_client::ServerClient;
