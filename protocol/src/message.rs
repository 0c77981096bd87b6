//! 消息模型定义
//!
//! 所有通过通道传输的消息共享两个公共字段:
//! - `id`: 构造时分配、全局唯一的消息标识
//! - `reply_to`: 可选，指向被回复消息的 `id`
//!
//! 消息体是封闭的变体集合，序列化按变体标签分发。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 远程调用参数与返回值的原语类型集合
///
/// 不支持更丰富的对象图，这是线上格式的固定约束。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// 空值
    Null,
    /// 32 位整数
    I32(i32),
    /// 64 位整数
    I64(i64),
    /// 双精度浮点数
    F64(f64),
    /// 布尔值
    Bool(bool),
    /// 字符串
    Str(String),
    /// 字节序列
    Bytes(Vec<u8>),
}

/// 远程异常记录
///
/// 服务端方法执行失败时，以此形式随返回消息传回客户端。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteException {
    /// 异常描述
    pub message: String,
    /// 抛出异常的服务版本
    pub service_version: Option<String>,
}

impl RemoteException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            service_version: None,
        }
    }

    pub fn with_version(message: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            service_version: Some(version.into()),
        }
    }
}

/// 消息体变体（封闭集合）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// 无附加字段的基础消息
    Base,
    /// 文本消息
    Text { text: Option<String> },
    /// 原始字节消息
    RawData { data: Option<Vec<u8>> },
    /// 心跳消息（ping 与 pong 共用此变体，靠 `reply_to` 区分）
    Ping,
    /// 远程方法调用
    RemoteInvoke {
        /// 目标服务名
        service_name: String,
        /// 目标方法名
        method_name: String,
        /// 调用参数
        parameters: Vec<ParamValue>,
    },
    /// 远程方法调用返回
    RemoteInvokeReturn {
        /// 返回值，方法无返回时为 None
        return_value: Option<ParamValue>,
        /// 远程异常，调用成功时为 None
        exception: Option<RemoteException>,
    },
}

/// 通道中传输的消息
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    /// 全局唯一消息标识
    pub id: String,
    /// 被回复消息的标识
    pub reply_to: Option<String>,
    /// 消息体
    pub body: MessageBody,
}

impl Message {
    /// 构造指定消息体的新消息，自动分配唯一 id
    pub fn new(body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            reply_to: None,
            body,
        }
    }

    /// 构造对 `original` 的回复消息
    pub fn in_reply_to(original: &Message, body: MessageBody) -> Self {
        let mut msg = Self::new(body);
        msg.reply_to = Some(original.id.clone());
        msg
    }

    /// 基础消息
    pub fn base() -> Self {
        Self::new(MessageBody::Base)
    }

    /// 文本消息
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MessageBody::Text {
            text: Some(text.into()),
        })
    }

    /// 原始字节消息
    pub fn raw_data(data: Vec<u8>) -> Self {
        Self::new(MessageBody::RawData { data: Some(data) })
    }

    /// 新发心跳
    pub fn ping() -> Self {
        Self::new(MessageBody::Ping)
    }

    /// 对 `original` 心跳的应答（pong）
    pub fn pong(original: &Message) -> Self {
        Self::in_reply_to(original, MessageBody::Ping)
    }

    /// 是否为心跳消息
    pub fn is_ping(&self) -> bool {
        matches!(self.body, MessageBody::Ping)
    }

    /// 是否为未携带回复标识的新发心跳
    pub fn is_fresh_ping(&self) -> bool {
        self.is_ping() && self.reply_to.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_non_empty_and_unique() {
        let a = Message::ping();
        let b = Message::ping();
        assert!(!a.id.is_empty());
        assert!(!b.id.is_empty());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_pong_links_to_ping() {
        let ping = Message::ping();
        let pong = Message::pong(&ping);
        assert!(pong.is_ping());
        assert!(!pong.is_fresh_ping());
        assert_eq!(pong.reply_to.as_deref(), Some(ping.id.as_str()));
    }

    #[test]
    fn test_text_message_serialize() {
        let msg = Message::text("hello");
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_optional_fields_roundtrip() {
        let msg = Message::new(MessageBody::Text { text: None });
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.body, MessageBody::Text { text: None });

        let msg = Message::new(MessageBody::RawData { data: None });
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.body, MessageBody::RawData { data: None });
    }

    #[test]
    fn test_remote_invoke_serialize() {
        let msg = Message::new(MessageBody::RemoteInvoke {
            service_name: "calculator".to_string(),
            method_name: "add".to_string(),
            parameters: vec![
                ParamValue::I32(1),
                ParamValue::I64(2),
                ParamValue::F64(3.5),
                ParamValue::Bool(true),
                ParamValue::Str("x".to_string()),
                ParamValue::Bytes(vec![0, 1, 2]),
                ParamValue::Null,
            ],
        });
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_remote_invoke_return_with_exception() {
        let msg = Message::new(MessageBody::RemoteInvokeReturn {
            return_value: None,
            exception: Some(RemoteException::with_version("boom", "1.0")),
        });
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: Message = bincode::deserialize(&bytes).unwrap();
        assert_eq!(msg, decoded);
    }
}
