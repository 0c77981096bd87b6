//! 服务端侧的客户端对等体
//!
//! 包装一条接入连接的通道，持有服务端分配的标识。
//! 应用消息经 [`ServerClient::next_message`] 逐条取出；
//! 心跳在服务端的分发任务里自动应答，不会出现在消息流中。

use protocol::{Message, Result};
use tokio::sync::{mpsc, Mutex};

use crate::channel::{Channel, CommState};

/// 服务端视角的一个已连接客户端
pub struct ServerClient {
    id: u64,
    channel: Channel,
    messages: Mutex<mpsc::Receiver<Message>>,
}

impl ServerClient {
    pub(crate) fn new(id: u64, channel: Channel, messages: mpsc::Receiver<Message>) -> Self {
        Self {
            id,
            channel,
            messages: Mutex::new(messages),
        }
    }

    /// 服务端分配的客户端标识（单调递增）
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 当前通信状态
    pub fn state(&self) -> CommState {
        self.channel.state()
    }

    /// 向该客户端发送一条消息
    pub async fn send_message(&self, msg: &Message) -> Result<()> {
        self.channel.send(msg).await
    }

    /// 断开该客户端
    pub async fn disconnect(&self) {
        self.channel.disconnect().await;
    }

    /// 取出下一条应用消息
    ///
    /// 连接断开且余量取尽后返回 None。
    pub async fn next_message(&self) -> Option<Message> {
        self.messages.lock().await.recv().await
    }

    pub(crate) fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl std::fmt::Debug for ServerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerClient")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
