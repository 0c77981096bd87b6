//! 通信通道
//!
//! 封装一个已连接的套接字。接收泵在独立任务中按固定大小读取字节、
//! 交给帧解码器重组消息并以事件形式上抛；发送路径经写端互斥锁串行化。
//! 收发两条路径全双工并行，只共享时间戳字段。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use protocol::{
    FrameCodec, Message, ProtocolError, Result, SocketOptions, TcpTransport, Transport,
    RECEIVE_BUFFER_SIZE,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

/// 事件队列容量
pub(crate) const EVENT_QUEUE_SIZE: usize = 64;

pub(crate) const STATE_DISCONNECTED: u8 = 0;
pub(crate) const STATE_CONNECTED: u8 = 1;

/// 通信状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommState {
    Disconnected,
    Connected,
}

impl CommState {
    pub(crate) fn from_u8(v: u8) -> Self {
        if v == STATE_CONNECTED {
            CommState::Connected
        } else {
            CommState::Disconnected
        }
    }
}

/// 通道产生的事件
#[derive(Debug)]
pub enum ChannelEvent {
    /// 收到一条完整消息
    MessageReceived(Message),
    /// 通道断开（每个通道恰好发出一次）
    Disconnected,
}

struct ChannelInner {
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<OwnedWriteHalf>,
    codec: FrameCodec,
    state: AtomicU8,
    disconnect_emitted: AtomicBool,
    last_received_ms: AtomicU64,
    last_sent_ms: AtomicU64,
    options: SocketOptions,
    event_tx: mpsc::Sender<ChannelEvent>,
    shutdown_tx: watch::Sender<bool>,
}

/// 通信通道
///
/// 可廉价克隆；所有克隆共享同一条连接。
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// 包装一个已建立的传输连接
    ///
    /// 初始状态为 Disconnected；调用 [`Channel::start`] 后开始收发。
    pub fn new(
        transport: TcpTransport,
        options: SocketOptions,
        event_tx: mpsc::Sender<ChannelEvent>,
    ) -> Self {
        let (reader, writer) = transport.split();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ChannelInner {
                reader: Mutex::new(Some(reader)),
                writer: Mutex::new(writer),
                codec: FrameCodec::new(),
                state: AtomicU8::new(STATE_DISCONNECTED),
                disconnect_emitted: AtomicBool::new(false),
                last_received_ms: AtomicU64::new(0),
                last_sent_ms: AtomicU64::new(0),
                options,
                event_tx,
                shutdown_tx,
            }),
        }
    }

    /// 转入 Connected 状态并启动接收泵
    ///
    /// 重复调用无效果。
    pub async fn start(&self) {
        let Some(reader) = self.inner.reader.lock().await.take() else {
            return;
        };

        // 连接建立视为一次活动，ping 静默计时从此刻起算
        let now = now_millis();
        self.inner.last_received_ms.store(now, Ordering::Relaxed);
        self.inner.last_sent_ms.store(now, Ordering::Relaxed);
        self.inner.state.store(STATE_CONNECTED, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let shutdown_rx = self.inner.shutdown_tx.subscribe();
        tokio::spawn(receive_pump(inner, reader, shutdown_rx));
    }

    /// 当前通信状态
    pub fn state(&self) -> CommState {
        CommState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// 发送一条消息
    ///
    /// 未连接时立即报状态错误。写失败或超时视为通道致命故障：
    /// 通道转入 Disconnected 并发出断开事件，错误同时抛给调用方。
    pub async fn send(&self, msg: &Message) -> Result<()> {
        if self.state() != CommState::Connected {
            return Err(ProtocolError::NotConnected);
        }

        let frame = self.inner.codec.encode(msg)?;

        let mut writer = self.inner.writer.lock().await;
        let write = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        };
        let result = match self.inner.options.send_timeout() {
            Some(limit) => match timeout(limit, write).await {
                Ok(r) => r.map_err(ProtocolError::Io),
                Err(_) => Err(ProtocolError::SendTimeout),
            },
            None => write.await.map_err(ProtocolError::Io),
        };
        drop(writer);

        match result {
            Ok(()) => {
                self.inner.last_sent_ms.store(now_millis(), Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "send failed, closing channel");
                self.inner.mark_disconnected().await;
                Err(e)
            }
        }
    }

    /// 断开通道
    ///
    /// 幂等；断开事件只发出一次。
    pub async fn disconnect(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.shutdown().await;
        drop(writer);
        self.inner.mark_disconnected().await;
    }

    /// 最近一次成功接收的时刻（Unix 毫秒）
    pub fn last_received_millis(&self) -> u64 {
        self.inner.last_received_ms.load(Ordering::Relaxed)
    }

    /// 最近一次成功发送的时刻（Unix 毫秒）
    pub fn last_sent_millis(&self) -> u64 {
        self.inner.last_sent_ms.load(Ordering::Relaxed)
    }

    /// 两个句柄是否指向同一条连接
    pub(crate) fn ptr_eq(a: &Channel, b: &Channel) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// 通道在 `threshold` 内是否既无接收也无发送
    pub fn is_quiet(&self, threshold: Duration) -> bool {
        let last = self
            .inner
            .last_received_ms
            .load(Ordering::Relaxed)
            .max(self.inner.last_sent_ms.load(Ordering::Relaxed));
        now_millis().saturating_sub(last) >= threshold.as_millis() as u64
    }
}

impl ChannelInner {
    /// 转入 Disconnected；断开事件恰好发出一次
    async fn mark_disconnected(&self) {
        self.state.store(STATE_DISCONNECTED, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        if !self.disconnect_emitted.swap(true, Ordering::SeqCst) {
            let _ = self.event_tx.send(ChannelEvent::Disconnected).await;
        }
    }
}

/// 接收泵
///
/// 读取至多 [`RECEIVE_BUFFER_SIZE`] 字节，交给帧解码器，逐条上抛消息。
/// 对端关闭、读错误、超时或帧解码失败都终结本通道。
async fn receive_pump(
    inner: Arc<ChannelInner>,
    mut reader: OwnedReadHalf,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut codec = FrameCodec::new();
    let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];

    'pump: loop {
        tokio::select! {
            result = read_once(&mut reader, &mut buf, inner.options.receive_timeout()) => {
                match result {
                    Ok(0) => {
                        debug!("peer closed connection");
                        break 'pump;
                    }
                    Ok(n) => {
                        inner.last_received_ms.store(now_millis(), Ordering::Relaxed);
                        match codec.decode_chunk(&buf[..n]) {
                            Ok(messages) => {
                                for msg in messages {
                                    if inner
                                        .event_tx
                                        .send(ChannelEvent::MessageReceived(msg))
                                        .await
                                        .is_err()
                                    {
                                        // 消费端已不在，通道随之关闭
                                        break 'pump;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "frame decoding failed, closing channel");
                                break 'pump;
                            }
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "read failed");
                        break 'pump;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                debug!("receive pump shutting down");
                break 'pump;
            }
        }
    }

    inner.mark_disconnected().await;
}

async fn read_once(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    receive_timeout: Option<Duration>,
) -> Result<usize> {
    match receive_timeout {
        Some(limit) => match timeout(limit, reader.read(buf)).await {
            Ok(r) => r.map_err(ProtocolError::Io),
            Err(_) => Err(ProtocolError::ReceiveTimeout),
        },
        None => reader.read(buf).await.map_err(ProtocolError::Io),
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Endpoint, TcpListener, TransportListener};

    async fn channel_pair() -> (Channel, mpsc::Receiver<ChannelEvent>, Channel, mpsc::Receiver<ChannelEvent>) {
        let listener = TcpListener::bind(&Endpoint::new("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connect = tokio::spawn(async move {
            TcpTransport::connect(&Endpoint::new("127.0.0.1", port), &SocketOptions::default())
                .await
                .unwrap()
        });
        let server_transport = listener.accept(&SocketOptions::default()).await.unwrap();
        let client_transport = connect.await.unwrap();

        let (server_tx, server_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let (client_tx, client_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let server_channel = Channel::new(server_transport, SocketOptions::default(), server_tx);
        let client_channel = Channel::new(client_transport, SocketOptions::default(), client_tx);
        server_channel.start().await;
        client_channel.start().await;
        (server_channel, server_rx, client_channel, client_rx)
    }

    #[tokio::test]
    async fn test_channel_send_recv() {
        let (server_ch, mut server_rx, client_ch, _client_rx) = channel_pair().await;
        assert_eq!(client_ch.state(), CommState::Connected);

        let msg = Message::text("hello channel");
        client_ch.send(&msg).await.unwrap();

        match server_rx.recv().await.unwrap() {
            ChannelEvent::MessageReceived(received) => assert_eq!(received, msg),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(server_ch.state(), CommState::Connected);
    }

    #[tokio::test]
    async fn test_send_order_preserved() {
        let (_server_ch, mut server_rx, client_ch, _client_rx) = channel_pair().await;

        let msgs: Vec<Message> = (0..10).map(|i| Message::text(format!("m{}", i))).collect();
        for m in &msgs {
            client_ch.send(m).await.unwrap();
        }

        for expected in &msgs {
            match server_rx.recv().await.unwrap() {
                ChannelEvent::MessageReceived(received) => assert_eq!(&received, expected),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (_server_ch, _server_rx, client_ch, mut client_rx) = channel_pair().await;

        client_ch.disconnect().await;
        client_ch.disconnect().await;
        assert_eq!(client_ch.state(), CommState::Disconnected);

        // 断开事件恰好一次
        let mut disconnects = 0;
        while let Ok(ev) = tokio::time::timeout(Duration::from_millis(200), client_rx.recv()).await {
            match ev {
                Some(ChannelEvent::Disconnected) => disconnects += 1,
                Some(_) => {}
                None => break,
            }
        }
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let (_server_ch, _server_rx, client_ch, _client_rx) = channel_pair().await;
        client_ch.disconnect().await;
        let result = client_ch.send(&Message::ping()).await;
        assert!(matches!(result, Err(ProtocolError::NotConnected)));
    }

    #[tokio::test]
    async fn test_peer_close_emits_disconnected() {
        let (server_ch, _server_rx, _client_ch, mut client_rx) = channel_pair().await;
        server_ch.disconnect().await;

        loop {
            match tokio::time::timeout(Duration::from_secs(2), client_rx.recv())
                .await
                .expect("no disconnect within 2s")
            {
                Some(ChannelEvent::Disconnected) => break,
                Some(_) => continue,
                None => panic!("event stream ended without disconnect"),
            }
        }
    }

    #[tokio::test]
    async fn test_quiet_detection() {
        let (_server_ch, _server_rx, client_ch, _client_rx) = channel_pair().await;
        // 刚建立的通道不算静默
        assert!(!client_ch.is_quiet(Duration::from_secs(60)));
        assert!(client_ch.is_quiet(Duration::from_millis(0)));
    }
}
