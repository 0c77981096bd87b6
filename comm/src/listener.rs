//! 连接监听器
//!
//! 绑定端点并在专用任务中运行 accept 循环：接入的套接字应用配置、
//! 包装成通道后连同其事件接收端一并交给服务端。accept 出错时关闭
//! 监听套接字，等待一段时间后重新绑定继续。

use std::net::SocketAddr;

use protocol::{
    Endpoint, Result, SocketOptions, TcpListener, TransportListener, ACCEPT_RETRY_DELAY,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::channel::{Channel, ChannelEvent, EVENT_QUEUE_SIZE};

/// 新接入连接的交接单元: 通道 + 其事件流
pub(crate) type AcceptedChannel = (Channel, mpsc::Receiver<ChannelEvent>);

/// 连接监听器句柄
pub(crate) struct Listener {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl Listener {
    /// 绑定端点并启动 accept 循环
    pub(crate) async fn start(
        endpoint: Endpoint,
        options: SocketOptions,
        accepted_tx: mpsc::Sender<AcceptedChannel>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&endpoint).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(addr = %local_addr, "listener started");
        tokio::spawn(accept_loop(listener, endpoint, options, accepted_tx, shutdown_rx));

        Ok(Self {
            local_addr,
            shutdown_tx,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 请求关闭；accept 循环退出时释放监听套接字
    pub(crate) fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn accept_loop(
    mut listener: TcpListener,
    endpoint: Endpoint,
    options: SocketOptions,
    accepted_tx: mpsc::Sender<AcceptedChannel>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            result = listener.accept(&options) => {
                match result {
                    Ok(transport) => {
                        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
                        let channel = Channel::new(transport, options.clone(), event_tx);
                        if accepted_tx.send((channel, event_rx)).await.is_err() {
                            debug!("accept consumer gone, stopping listener");
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed, restarting listener");
                        // 必须先释放旧的监听套接字，同端口才能重新绑定
                        drop(listener);
                        listener = match rebind(&endpoint, &mut shutdown_rx).await {
                            Some(rebound) => rebound,
                            None => break,
                        };
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                info!("listener shutting down");
                break;
            }
        }
    }
}

/// 等待一段时间后重新绑定，失败则按同样间隔重试
///
/// 收到关闭信号时放弃并返回 None。
async fn rebind(
    endpoint: &Endpoint,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<TcpListener> {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {
                match TcpListener::bind(endpoint).await {
                    Ok(listener) => {
                        info!("listener rebound");
                        return Some(listener);
                    }
                    Err(e) => error!(error = %e, "listener rebind failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                info!("listener shutting down");
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{TcpTransport, Transport};

    #[tokio::test]
    async fn test_listener_hands_off_accepted_channel() {
        let (accepted_tx, mut accepted_rx) = mpsc::channel(4);
        let listener = Listener::start(
            Endpoint::new("127.0.0.1", 0),
            SocketOptions::default(),
            accepted_tx,
        )
        .await
        .unwrap();
        let port = listener.local_addr().port();

        let _client = TcpTransport::connect(
            &Endpoint::new("127.0.0.1", port),
            &SocketOptions::default(),
        )
        .await
        .unwrap();

        let (channel, _events) = accepted_rx.recv().await.unwrap();
        assert_eq!(channel.state(), crate::CommState::Disconnected);

        listener.stop();
    }
}
