//! 服务调用客户端
//!
//! 在消息通信客户端之上实现同步远程调用：每次调用登记一个
//! 一次性应答槽（键为调用消息 id），应答泵按 `reply_to` 撮合
//! RemoteInvokeReturn，调用方在超时范围内等待结果。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use comm::{Client, ClientEvent, ClientHandle, CommState};
use protocol::{Endpoint, Message, MessageBody, ParamValue, RemoteException, SocketOptions};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Result, ServiceError};

/// 默认调用超时
const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(60);

type ReplySlot = oneshot::Sender<(Option<ParamValue>, Option<RemoteException>)>;
type Pending = Arc<Mutex<HashMap<String, ReplySlot>>>;

/// 远程服务调用客户端
pub struct ServiceClient {
    handle: ClientHandle,
    pending: Pending,
    invoke_timeout: Duration,
    pump: JoinHandle<()>,
}

impl ServiceClient {
    /// 以默认套接字配置创建调用客户端
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_options(endpoint, SocketOptions::default())
    }

    pub fn with_options(endpoint: Endpoint, options: SocketOptions) -> Self {
        let client = Client::with_options(endpoint, options);
        let handle = client.handle();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let pump = tokio::spawn(reply_pump(client, Arc::clone(&pending)));
        Self {
            handle,
            pending,
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            pump,
        }
    }

    /// 建立到服务宿主的连接
    pub async fn connect(&self) -> Result<()> {
        self.handle.connect().await?;
        Ok(())
    }

    /// 断开连接；挂起的调用随之失败
    pub async fn disconnect(&self) {
        self.handle.disconnect().await;
    }

    /// 当前通信状态
    pub fn state(&self) -> CommState {
        self.handle.state()
    }

    /// 底层通信客户端句柄
    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// 当前调用超时
    pub fn invoke_timeout(&self) -> Duration {
        self.invoke_timeout
    }

    /// 调整调用超时
    pub fn set_invoke_timeout(&mut self, timeout: Duration) {
        self.invoke_timeout = timeout;
    }

    /// 调用远程服务方法并等待结果
    ///
    /// 服务端异常还原为 [`ServiceError::Remote`]；超时返回
    /// [`ServiceError::Timeout`]；等待期间断开返回
    /// [`ServiceError::Disconnected`]。
    pub async fn invoke(
        &self,
        service: &str,
        method: &str,
        parameters: Vec<ParamValue>,
    ) -> Result<Option<ParamValue>> {
        let msg = Message::new(MessageBody::RemoteInvoke {
            service_name: service.to_string(),
            method_name: method.to_string(),
            parameters,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(msg.id.clone(), tx);

        if let Err(e) = self.handle.send_message(&msg).await {
            self.pending.lock().await.remove(&msg.id);
            return Err(e.into());
        }

        match timeout(self.invoke_timeout, rx).await {
            Ok(Ok((return_value, None))) => Ok(return_value),
            Ok(Ok((_, Some(exception)))) => Err(ServiceError::Remote(exception)),
            // 应答槽被丢弃: 连接在等待期间断开
            Ok(Err(_)) => Err(ServiceError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&msg.id);
                Err(ServiceError::Timeout)
            }
        }
    }
}

impl Drop for ServiceClient {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// 应答泵
///
/// 消费底层客户端事件流，把 RemoteInvokeReturn 撮合到对应的
/// 应答槽。断开时清空挂起表，唤醒所有等待方。
async fn reply_pump(mut client: Client, pending: Pending) {
    while let Some(event) = client.next_event().await {
        match event {
            ClientEvent::MessageReceived(msg) => {
                let Message { reply_to, body, .. } = msg;
                if let MessageBody::RemoteInvokeReturn {
                    return_value,
                    exception,
                } = body
                {
                    let Some(reply_to) = reply_to else {
                        debug!("invoke return without reply id ignored");
                        continue;
                    };
                    match pending.lock().await.remove(&reply_to) {
                        Some(slot) => {
                            let _ = slot.send((return_value, exception));
                        }
                        None => debug!("unmatched invoke return ignored"),
                    }
                } else {
                    debug!("non-invoke message ignored by service client");
                }
            }
            ClientEvent::Disconnected => {
                pending.lock().await.clear();
            }
            _ => {}
        }
    }
}
