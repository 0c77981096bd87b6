//! 传输层抽象
//!
//! 提供 Transport trait 使上层协议与具体传输实现解耦，
//! 便于未来从 TCP 切换到 QUIC 等其他传输协议。

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::endpoint::Endpoint;
use crate::error::{ProtocolError, Result};
use crate::options::SocketOptions;

/// 传输层抽象 trait
///
/// 定义了客户端连接和读写分离的基本操作。
/// 通过实现此 trait，可以支持不同的传输协议（TCP、QUIC 等）。
pub trait Transport: Send + Sync + Sized {
    /// 读取端类型
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// 写入端类型
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// 建立连接（客户端使用）
    ///
    /// # Arguments
    /// * `endpoint` - 服务器端点
    /// * `options` - 套接字配置
    fn connect(
        endpoint: &Endpoint,
        options: &SocketOptions,
    ) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 分离读写端
    ///
    /// 将连接分离为独立的读取端和写入端，便于并发读写。
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// 传输层监听器抽象 trait（服务端使用）
pub trait TransportListener: Send + Sync + Sized {
    /// 对应的传输类型
    type Transport: Transport;

    /// 绑定端点并开始监听
    fn bind(endpoint: &Endpoint) -> impl std::future::Future<Output = Result<Self>> + Send;

    /// 接受新连接，并对接入的套接字应用配置
    fn accept(
        &self,
        options: &SocketOptions,
    ) -> impl std::future::Future<Output = Result<Self::Transport>> + Send;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 传输实现
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    async fn connect(endpoint: &Endpoint, options: &SocketOptions) -> Result<Self> {
        // 带超时的连接
        let stream = timeout(options.connect_timeout(), TcpStream::connect(endpoint.addr()))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
            .map_err(ProtocolError::Io)?;

        options.apply(&stream)?;

        Ok(Self { stream })
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        self.stream.into_split()
    }
}

impl TcpTransport {
    /// 从已有的 TcpStream 创建（服务端 accept 后使用）
    pub fn from_stream(stream: TcpStream, options: &SocketOptions) -> Result<Self> {
        options.apply(&stream)?;
        Ok(Self { stream })
    }
}

/// TCP 监听器实现
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

impl TransportListener for TcpListener {
    type Transport = TcpTransport;

    async fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(endpoint.bind_addr())
            .await
            .map_err(ProtocolError::Io)?;
        Ok(Self { listener })
    }

    async fn accept(&self, options: &SocketOptions) -> Result<TcpTransport> {
        let (stream, _addr) = self.listener.accept().await.map_err(ProtocolError::Io)?;
        TcpTransport::from_stream(stream, options)
    }
}

impl TcpListener {
    /// 获取本地绑定地址
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}
