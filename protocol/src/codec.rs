//! 帧编解码
//!
//! 帧格式:
//! ```text
//! ┌────────────────┬────────────┬────────────────────────────────┐
//! │  Length (4B)   │ Version(1B)│         Payload (bincode)      │
//! │    u32 BE      │    u8      │         Message                │
//! └────────────────┴────────────┴────────────────────────────────┘
//! ```
//!
//! 解码端维护一个累积缓冲区：输入可以在任意字节边界切分，
//! 完整帧逐个提取，不完整的尾部字节保留到下一次调用。

use crate::error::{ProtocolError, Result};
use crate::message::Message;
use crate::{HEADER_SIZE, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};

/// 帧编解码器
///
/// 编码是无状态的；解码持有累积缓冲区，一个通道独占一个实例。
/// 重新建立连接时调用 [`FrameCodec::reset`] 丢弃残留字节。
pub struct FrameCodec {
    /// 未消费的字节流尾部
    acc: Vec<u8>,
}

impl FrameCodec {
    /// 创建新的编解码器
    pub fn new() -> Self {
        Self { acc: Vec::new() }
    }

    /// 编码单条消息为完整帧
    ///
    /// 序列化后的负载超过 [`MAX_PAYLOAD_SIZE`] 时报错。
    pub fn encode(&self, msg: &Message) -> Result<Vec<u8>> {
        let payload = bincode::serialize(msg)?;
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.push(PROTOCOL_VERSION);
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// 将新到达的字节块并入累积缓冲区并提取所有完整帧
    ///
    /// 返回按到达顺序排列的消息序列（可能为空）。
    /// 长度前缀超限、版本不匹配或负载反序列化失败都是致命错误：
    /// 累积缓冲区先被清空，错误再向上传播。
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> Result<Vec<Message>> {
        self.acc.extend_from_slice(chunk);

        let mut messages = Vec::new();
        let mut consumed = 0;

        loop {
            let rest = &self.acc[consumed..];
            if rest.len() < HEADER_SIZE {
                break;
            }

            // 解析长度（大端序）
            let length = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
            if length > MAX_PAYLOAD_SIZE {
                self.reset();
                return Err(ProtocolError::PayloadTooLarge {
                    size: length,
                    max: MAX_PAYLOAD_SIZE,
                });
            }

            // 校验版本号
            let version = rest[4];
            if version != PROTOCOL_VERSION {
                self.reset();
                return Err(ProtocolError::VersionMismatch {
                    expected: PROTOCOL_VERSION,
                    actual: version,
                });
            }

            if rest.len() < HEADER_SIZE + length {
                break;
            }

            match bincode::deserialize(&rest[HEADER_SIZE..HEADER_SIZE + length]) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    self.reset();
                    return Err(ProtocolError::Serialization(e));
                }
            }
            consumed += HEADER_SIZE + length;
        }

        if consumed > 0 {
            self.acc.drain(..consumed);
        }
        Ok(messages)
    }

    /// 丢弃累积缓冲区
    pub fn reset(&mut self) {
        self.acc.clear();
    }

    /// 当前累积的未消费字节数
    pub fn pending_len(&self) -> usize {
        self.acc.len()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
