//! 服务端
//!
//! 持有监听器与在线客户端表。每条接入连接被包装成
//! [`ServerClient`] 并分配单调递增的标识；其分发任务负责
//! 心跳自动应答、应用消息转发以及断开时的注销。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use protocol::{Endpoint, Message, ProtocolError, Result, SocketOptions};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::channel::{Channel, ChannelEvent, EVENT_QUEUE_SIZE};
use crate::listener::{AcceptedChannel, Listener};
use crate::server_client::ServerClient;

/// 服务端事件
#[derive(Debug)]
pub enum ServerEvent {
    /// 新客户端接入
    ClientConnected(Arc<ServerClient>),
    /// 客户端断开（已从在线表移除）
    ClientDisconnected(Arc<ServerClient>),
}

/// 跨任务共享的服务端状态
struct ServerShared {
    /// 在线客户端表: client_id -> ServerClient
    clients: RwLock<HashMap<u64, Arc<ServerClient>>>,
    /// 下一个客户端标识
    next_client_id: AtomicU64,
    event_tx: mpsc::Sender<ServerEvent>,
}

/// 消息通信服务端
pub struct Server {
    endpoint: Endpoint,
    options: SocketOptions,
    shared: Arc<ServerShared>,
    listener: Option<Listener>,
    event_rx: Option<mpsc::Receiver<ServerEvent>>,
}

impl Server {
    /// 以默认套接字配置创建服务端
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_options(endpoint, SocketOptions::default())
    }

    pub fn with_options(endpoint: Endpoint, options: SocketOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        Self {
            endpoint,
            options,
            shared: Arc::new(ServerShared {
                clients: RwLock::new(HashMap::new()),
                next_client_id: AtomicU64::new(1),
                event_tx,
            }),
            listener: None,
            event_rx: Some(event_rx),
        }
    }

    /// 绑定监听器并开始接受连接
    pub async fn start(&mut self) -> Result<()> {
        if self.listener.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }

        let (accepted_tx, mut accepted_rx) = mpsc::channel::<AcceptedChannel>(16);
        let listener =
            Listener::start(self.endpoint.clone(), self.options.clone(), accepted_tx).await?;

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some((channel, event_rx)) = accepted_rx.recv().await {
                register_client(&shared, channel, event_rx).await;
            }
        });

        info!(addr = %listener.local_addr(), "server started");
        self.listener = Some(listener);
        Ok(())
    }

    /// 停止监听并断开所有在线客户端
    pub async fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }

        // 基于快照断开，容忍分发任务并发移除
        let snapshot: Vec<Arc<ServerClient>> =
            self.shared.clients.read().await.values().cloned().collect();
        for client in snapshot {
            client.disconnect().await;
        }
        info!("server stopped");
    }

    /// 监听器实际绑定的地址
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|l| l.local_addr())
    }

    /// 在线客户端快照
    pub async fn clients(&self) -> Vec<Arc<ServerClient>> {
        self.shared.clients.read().await.values().cloned().collect()
    }

    /// 在线客户端数
    pub async fn client_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }

    /// 取出下一个服务端事件
    ///
    /// 事件接收端已被取走时恒返回 None。
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        match self.event_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// 取走事件接收端，交给外部任务消费
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<ServerEvent>> {
        self.event_rx.take()
    }
}

/// 装配一条接入连接: 分配标识、登记、启动通道与分发任务
async fn register_client(
    shared: &Arc<ServerShared>,
    channel: Channel,
    event_rx: mpsc::Receiver<ChannelEvent>,
) {
    let id = shared.next_client_id.fetch_add(1, Ordering::SeqCst);
    let (msg_tx, msg_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let client = Arc::new(ServerClient::new(id, channel.clone(), msg_rx));

    shared.clients.write().await.insert(id, Arc::clone(&client));
    let _ = shared
        .event_tx
        .send(ServerEvent::ClientConnected(Arc::clone(&client)))
        .await;

    channel.start().await;
    info!(client_id = id, "client connected");

    let shared = Arc::clone(shared);
    tokio::spawn(client_pump(shared, client, event_rx, msg_tx));
}

/// 单客户端分发任务
///
/// 新发心跳立即以 pong 应答；其余心跳不上抛；应用消息转入
/// 该客户端的消息流。通道断开后注销并发出断开事件。
async fn client_pump(
    shared: Arc<ServerShared>,
    client: Arc<ServerClient>,
    mut event_rx: mpsc::Receiver<ChannelEvent>,
    msg_tx: mpsc::Sender<Message>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            ChannelEvent::MessageReceived(msg) => {
                if msg.is_fresh_ping() {
                    let pong = Message::pong(&msg);
                    if let Err(e) = client.channel().send(&pong).await {
                        debug!(client_id = client.id(), error = %e, "ping reply failed");
                    }
                } else if msg.is_ping() {
                    debug!(client_id = client.id(), "ping reply received");
                } else if msg_tx.send(msg).await.is_err() {
                    debug!(client_id = client.id(), "message consumer gone");
                }
            }
            ChannelEvent::Disconnected => break,
        }
    }

    shared.clients.write().await.remove(&client.id());
    let _ = shared
        .event_tx
        .send(ServerEvent::ClientDisconnected(Arc::clone(&client)))
        .await;
    info!(client_id = client.id(), "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_start_binds_port() {
        let mut server = Server::new(Endpoint::new("127.0.0.1", 0));
        server.start().await.unwrap();
        assert!(server.local_addr().unwrap().port() > 0);
        assert_eq!(server.client_count().await, 0);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let mut server = Server::new(Endpoint::new("127.0.0.1", 0));
        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(ProtocolError::AlreadyConnected)
        ));
        server.stop().await;
    }
}
