//! 客户端
//!
//! 驱动一条到服务端的通道：连接生命周期、ping 定时器与 RTT 统计。
//! 每次连接都建立全新的通道（编解码器随之全新，不残留上次连接的
//! 字节）。收到的心跳在内部消化，其余消息原样上抛给应用。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use protocol::{
    Endpoint, Message, ProtocolError, Result, SocketOptions, TcpTransport, Transport,
    PING_INTERVAL_MS, PING_QUIET_THRESHOLD, RTT_SAMPLE_CAPACITY,
};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::channel::{
    Channel, ChannelEvent, CommState, EVENT_QUEUE_SIZE, STATE_CONNECTED, STATE_DISCONNECTED,
};

/// 内部过渡态，对外报告为 Disconnected
const STATE_CONNECTING: u8 = 2;

/// 客户端事件
#[derive(Debug)]
pub enum ClientEvent {
    /// 连接建立
    Connected,
    /// 连接断开
    Disconnected,
    /// 收到一条应用消息（心跳不在此列）
    MessageReceived(Message),
    /// 成功发出一条消息
    MessageSent(Message),
    /// 一次 ping/pong 往返完成
    PingCompleted { rtt: Duration },
}

/// RTT 统计
///
/// 环形缓冲保留最近 N 个样本，同步维护总和以便 O(1) 求均值。
struct RttTracker {
    last: Option<Duration>,
    samples: VecDeque<Duration>,
    sum: Duration,
}

impl RttTracker {
    fn new() -> Self {
        Self {
            last: None,
            samples: VecDeque::with_capacity(RTT_SAMPLE_CAPACITY),
            sum: Duration::ZERO,
        }
    }

    fn record(&mut self, rtt: Duration) {
        self.last = Some(rtt);
        if self.samples.len() == RTT_SAMPLE_CAPACITY {
            if let Some(oldest) = self.samples.pop_front() {
                self.sum -= oldest;
            }
        }
        self.samples.push_back(rtt);
        self.sum += rtt;
    }

    fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.sum / self.samples.len() as u32)
        }
    }
}

struct ClientInner {
    endpoint: Endpoint,
    options: SocketOptions,
    state: AtomicU8,
    channel: RwLock<Option<Channel>>,
    ping_interval_ms: AtomicU64,
    /// 在途 ping: message id -> 发出时刻
    pending_pings: Mutex<HashMap<String, Instant>>,
    rtt: Mutex<RttTracker>,
    ping_stop: Mutex<Option<watch::Sender<bool>>>,
    event_tx: mpsc::Sender<ClientEvent>,
}

/// 客户端共享句柄
///
/// 可克隆，供重连器等辅助组件与事件消费端并行使用。
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<ClientInner>,
}

/// 消息通信客户端
///
/// 持有事件接收端；其余操作全部经由 [`ClientHandle`]。
pub struct Client {
    handle: ClientHandle,
    event_rx: mpsc::Receiver<ClientEvent>,
}

impl Client {
    /// 以默认套接字配置创建客户端
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_options(endpoint, SocketOptions::default())
    }

    pub fn with_options(endpoint: Endpoint, options: SocketOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let handle = ClientHandle {
            inner: Arc::new(ClientInner {
                endpoint,
                options,
                state: AtomicU8::new(STATE_DISCONNECTED),
                channel: RwLock::new(None),
                ping_interval_ms: AtomicU64::new(PING_INTERVAL_MS),
                pending_pings: Mutex::new(HashMap::new()),
                rtt: Mutex::new(RttTracker::new()),
                ping_stop: Mutex::new(None),
                event_tx,
            }),
        };
        Self { handle, event_rx }
    }

    /// 共享句柄
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// 取出下一个客户端事件
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.recv().await
    }

    pub async fn connect(&self) -> Result<()> {
        self.handle.connect().await
    }

    pub async fn disconnect(&self) {
        self.handle.disconnect().await;
    }

    pub async fn send_message(&self, msg: &Message) -> Result<()> {
        self.handle.send_message(msg).await
    }

    pub fn state(&self) -> CommState {
        self.handle.state()
    }

    pub fn ping_interval_ms(&self) -> u64 {
        self.handle.ping_interval_ms()
    }

    pub fn set_ping_interval_ms(&self, ms: u64) {
        self.handle.set_ping_interval_ms(ms);
    }

    pub async fn last_ping_rtt(&self) -> Option<Duration> {
        self.handle.last_ping_rtt().await
    }

    pub async fn average_ping_rtt(&self) -> Option<Duration> {
        self.handle.average_ping_rtt().await
    }
}

impl ClientHandle {
    /// 建立连接
    ///
    /// 仅在 Disconnected 时有效；连接失败时状态保持 Disconnected。
    /// 成功后发出 [`ClientEvent::Connected`] 并启动 ping 定时器。
    pub async fn connect(&self) -> Result<()> {
        if self
            .inner
            .state
            .compare_exchange(
                STATE_DISCONNECTED,
                STATE_CONNECTING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(ProtocolError::AlreadyConnected);
        }

        match self.establish().await {
            Ok(()) => {
                // 通道可能在建立后立即死亡并已被收尾，此时保持 Disconnected
                let _ = self.inner.state.compare_exchange(
                    STATE_CONNECTING,
                    STATE_CONNECTED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                let _ = self.inner.event_tx.send(ClientEvent::Connected).await;
                info!(endpoint = %self.inner.endpoint, "connected");
                Ok(())
            }
            Err(e) => {
                self.inner.state.store(STATE_DISCONNECTED, Ordering::SeqCst);
                debug!(endpoint = %self.inner.endpoint, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<()> {
        let transport = TcpTransport::connect(&self.inner.endpoint, &self.inner.options).await?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let channel = Channel::new(transport, self.inner.options.clone(), event_tx);
        channel.start().await;
        *self.inner.channel.write().await = Some(channel.clone());

        let (ping_stop_tx, ping_stop_rx) = watch::channel(false);
        *self.inner.ping_stop.lock().await = Some(ping_stop_tx);
        tokio::spawn(ping_task(
            Arc::clone(&self.inner),
            channel.clone(),
            ping_stop_rx,
        ));
        tokio::spawn(event_pump(Arc::clone(&self.inner), channel, event_rx));
        Ok(())
    }

    /// 断开连接；未连接时无操作
    ///
    /// 返回时状态已是 Disconnected。
    pub async fn disconnect(&self) {
        if self.state() != CommState::Connected {
            return;
        }
        let channel = self.inner.channel.read().await.clone();
        if let Some(channel) = channel {
            channel.disconnect().await;
            teardown(&self.inner, &channel).await;
        }
    }

    /// 发送一条消息
    ///
    /// 未连接时报状态错误。新发 ping 在写出前登记到在途表，
    /// RTT 从登记时刻起算。
    pub async fn send_message(&self, msg: &Message) -> Result<()> {
        if self.state() != CommState::Connected {
            return Err(ProtocolError::NotConnected);
        }
        let channel = self
            .inner
            .channel
            .read()
            .await
            .clone()
            .ok_or(ProtocolError::NotConnected)?;

        if msg.is_fresh_ping() {
            self.inner
                .pending_pings
                .lock()
                .await
                .insert(msg.id.clone(), Instant::now());
        }

        channel.send(msg).await?;
        let _ = self
            .inner
            .event_tx
            .send(ClientEvent::MessageSent(msg.clone()))
            .await;
        Ok(())
    }

    /// 当前通信状态
    pub fn state(&self) -> CommState {
        CommState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// ping 定时器周期（毫秒）
    pub fn ping_interval_ms(&self) -> u64 {
        self.inner.ping_interval_ms.load(Ordering::Relaxed)
    }

    /// 调整 ping 定时器周期；连接中也可修改，下一个周期生效
    pub fn set_ping_interval_ms(&self, ms: u64) {
        self.inner.ping_interval_ms.store(ms, Ordering::Relaxed);
    }

    /// 最近一次完成的 ping 往返耗时
    pub async fn last_ping_rtt(&self) -> Option<Duration> {
        self.inner.rtt.lock().await.last
    }

    /// 最近 N 个 RTT 样本的平均值
    pub async fn average_ping_rtt(&self) -> Option<Duration> {
        self.inner.rtt.lock().await.average()
    }

    /// 配置的服务端端点
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// 套接字配置
    pub fn socket_options(&self) -> &SocketOptions {
        &self.inner.options
    }
}

/// ping 定时任务
///
/// 每个周期检查一次：已连接且通道静默超过门限时发出新 ping。
/// 发送失败只记录日志，不终结任务。
async fn ping_task(
    inner: Arc<ClientInner>,
    channel: Channel,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let period = Duration::from_millis(inner.ping_interval_ms.load(Ordering::Relaxed).max(1));
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                if channel.state() != CommState::Connected {
                    continue;
                }
                if !channel.is_quiet(PING_QUIET_THRESHOLD) {
                    continue;
                }

                let ping = Message::ping();
                inner
                    .pending_pings
                    .lock()
                    .await
                    .insert(ping.id.clone(), Instant::now());
                match channel.send(&ping).await {
                    Ok(()) => {
                        debug!("ping sent");
                        let _ = inner.event_tx.send(ClientEvent::MessageSent(ping)).await;
                    }
                    Err(e) => warn!(error = %e, "ping send failed"),
                }
            }
            _ = stop_rx.changed() => break,
        }
    }
}

/// 客户端事件泵
///
/// 消化心跳、完成 RTT 结算，把其余消息抛给应用。
/// 通道断开后做连接收尾并发出客户端断开事件。
async fn event_pump(
    inner: Arc<ClientInner>,
    channel: Channel,
    mut event_rx: mpsc::Receiver<ChannelEvent>,
) {
    while let Some(event) = event_rx.recv().await {
        match event {
            ChannelEvent::MessageReceived(msg) => handle_received(&inner, msg).await,
            ChannelEvent::Disconnected => break,
        }
    }
    teardown(&inner, &channel).await;
}

/// 连接收尾: 停 ping、清空在途表、释放通道、发出断开事件
///
/// 主动断开与事件泵都会到达这里；以取走通道槽的一方为准，
/// 槽里已是别的连接（或已被取走）时不做任何事。
async fn teardown(inner: &Arc<ClientInner>, channel: &Channel) {
    {
        let mut slot = inner.channel.write().await;
        match slot.as_ref() {
            Some(current) if Channel::ptr_eq(current, channel) => {
                *slot = None;
            }
            _ => return,
        }
    }

    if let Some(stop) = inner.ping_stop.lock().await.take() {
        let _ = stop.send(true);
    }
    inner.pending_pings.lock().await.clear();
    inner.state.store(STATE_DISCONNECTED, Ordering::SeqCst);
    let _ = inner.event_tx.send(ClientEvent::Disconnected).await;
    info!("disconnected");
}

async fn handle_received(inner: &Arc<ClientInner>, msg: Message) {
    if msg.is_ping() {
        // 心跳不上抛。携带回复标识且命中在途表的视为 pong，结算 RTT；
        // 其余（含迟到或未登记的应答）不更新任何状态。
        if let Some(reply_to) = &msg.reply_to {
            let started = inner.pending_pings.lock().await.remove(reply_to);
            if let Some(started) = started {
                let rtt = started.elapsed();
                inner.rtt.lock().await.record(rtt);
                debug!(rtt_ms = rtt.as_millis() as u64, "ping completed");
                let _ = inner.event_tx.send(ClientEvent::PingCompleted { rtt }).await;
            }
        }
        return;
    }
    let _ = inner
        .event_tx
        .send(ClientEvent::MessageReceived(msg))
        .await;
}
