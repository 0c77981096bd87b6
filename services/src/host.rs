//! 服务宿主
//!
//! 持有一个消息通信服务端和一张服务注册表。每个接入客户端
//! 由独立任务消费其消息流：RemoteInvoke 被分发到对应服务并以
//! RemoteInvokeReturn 应答（`reply_to` 指向调用消息），未知服务
//! 与方法错误同样以远程异常应答，调用永远不会被无声丢弃。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use comm::{Server, ServerClient, ServerEvent};
use protocol::{Endpoint, Message, MessageBody, ParamValue, RemoteException, SocketOptions};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::error::Result;
use crate::service::RemoteService;

type Registry = Arc<RwLock<HashMap<String, Arc<dyn RemoteService>>>>;

/// 远程服务宿主
pub struct ServiceHost {
    server: Server,
    registry: Registry,
}

impl ServiceHost {
    /// 以默认套接字配置创建宿主
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_options(endpoint, SocketOptions::default())
    }

    pub fn with_options(endpoint: Endpoint, options: SocketOptions) -> Self {
        Self {
            server: Server::with_options(endpoint, options),
            registry: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 注册一个服务；同名服务被替换
    pub async fn add_service(&self, name: impl Into<String>, service: Arc<dyn RemoteService>) {
        let name = name.into();
        info!(service = %name, "service registered");
        self.registry.write().await.insert(name, service);
    }

    /// 注销服务；存在时返回 true
    pub async fn remove_service(&self, name: &str) -> bool {
        self.registry.write().await.remove(name).is_some()
    }

    /// 启动服务端并开始分发调用
    pub async fn start(&mut self) -> Result<()> {
        self.server.start().await?;
        if let Some(events) = self.server.take_event_receiver() {
            tokio::spawn(host_pump(Arc::clone(&self.registry), events));
        }
        Ok(())
    }

    /// 停止服务端并断开所有客户端
    pub async fn stop(&mut self) {
        self.server.stop().await;
    }

    /// 监听器实际绑定的地址
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// 在线客户端数
    pub async fn client_count(&self) -> usize {
        self.server.client_count().await
    }
}

/// 为每个接入客户端派生调用分发任务
async fn host_pump(registry: Registry, mut events: mpsc::Receiver<ServerEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ServerEvent::ClientConnected(client) => {
                tokio::spawn(invoke_loop(Arc::clone(&registry), client));
            }
            ServerEvent::ClientDisconnected(client) => {
                debug!(client_id = client.id(), "service client disconnected");
            }
        }
    }
}

/// 单客户端调用分发
async fn invoke_loop(registry: Registry, client: Arc<ServerClient>) {
    while let Some(msg) = client.next_message().await {
        let reply_body = match &msg.body {
            MessageBody::RemoteInvoke {
                service_name,
                method_name,
                parameters,
            } => match dispatch(&registry, service_name, method_name, parameters).await {
                Ok(return_value) => MessageBody::RemoteInvokeReturn {
                    return_value,
                    exception: None,
                },
                Err(exception) => MessageBody::RemoteInvokeReturn {
                    return_value: None,
                    exception: Some(exception),
                },
            },
            _ => {
                debug!(client_id = client.id(), "non-invoke message ignored");
                continue;
            }
        };

        let reply = Message::in_reply_to(&msg, reply_body);
        if let Err(e) = client.send_message(&reply).await {
            debug!(client_id = client.id(), error = %e, "invoke reply failed");
            break;
        }
    }
}

/// 查找服务并执行调用
///
/// 服务未在异常里写明版本时补上自己的版本号。
async fn dispatch(
    registry: &Registry,
    service_name: &str,
    method_name: &str,
    parameters: &[ParamValue],
) -> std::result::Result<Option<ParamValue>, RemoteException> {
    let service = registry.read().await.get(service_name).cloned();
    match service {
        Some(service) => service.invoke(method_name, parameters).map_err(|mut e| {
            if e.service_version.is_none() {
                e.service_version = Some(service.version().to_string());
            }
            e
        }),
        None => Err(RemoteException::new(format!(
            "Unknown service: {}",
            service_name
        ))),
    }
}
