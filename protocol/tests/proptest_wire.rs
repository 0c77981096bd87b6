//! 帧编解码的模糊/属性测试
//!
//! 校验解码器对任意网络输入不崩溃，以及编解码在任意
//! 字段组合与任意分块方式下的往返一致性。

use proptest::prelude::*;
use protocol::{FrameCodec, Message, MessageBody, ParamValue, RemoteException};

/// 任意消息体的生成策略
fn arb_body() -> impl Strategy<Value = MessageBody> {
    prop_oneof![
        Just(MessageBody::Base),
        prop::option::of(".{0,64}").prop_map(|text| MessageBody::Text { text }),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..256))
            .prop_map(|data| MessageBody::RawData { data }),
        Just(MessageBody::Ping),
        (
            "[a-z]{1,16}",
            "[a-z]{1,16}",
            prop::collection::vec(arb_param(), 0..4),
        )
            .prop_map(|(service_name, method_name, parameters)| MessageBody::RemoteInvoke {
                service_name,
                method_name,
                parameters,
            }),
        (
            prop::option::of(arb_param()),
            prop::option::of(arb_exception()),
        )
            .prop_map(|(return_value, exception)| MessageBody::RemoteInvokeReturn {
                return_value,
                exception,
            }),
    ]
}

/// 任意远程异常记录的生成策略
fn arb_exception() -> impl Strategy<Value = RemoteException> {
    (".{0,32}", prop::option::of("[0-9]\\.[0-9]{1,3}")).prop_map(
        |(message, service_version)| RemoteException {
            message,
            service_version,
        },
    )
}

/// 任意原语参数值的生成策略
fn arb_param() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        Just(ParamValue::Null),
        any::<i32>().prop_map(ParamValue::I32),
        any::<i64>().prop_map(ParamValue::I64),
        any::<bool>().prop_map(ParamValue::Bool),
        ".{0,32}".prop_map(ParamValue::Str),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(ParamValue::Bytes),
    ]
}

proptest! {
    /// 属性: 任意字节流不会让解码器 panic
    #[test]
    fn arbitrary_bytes_dont_crash(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..512), 1..8),
    ) {
        let mut decoder = FrameCodec::new();
        for chunk in &chunks {
            if decoder.decode_chunk(chunk).is_err() {
                // 致命错误后累积缓冲区必须已清空
                prop_assert_eq!(decoder.pending_len(), 0);
                break;
            }
        }
    }

    /// 属性: 任意变体与字段组合逐字段往返
    #[test]
    fn any_message_roundtrips(body in arb_body()) {
        let msg = Message::new(body);
        let codec = FrameCodec::new();
        let frame = codec.encode(&msg).unwrap();

        let mut decoder = FrameCodec::new();
        let decoded = decoder.decode_chunk(&frame).unwrap();
        prop_assert_eq!(decoded, vec![msg]);
    }

    /// 属性: 多条消息按任意切分点分块投喂，顺序与条数不变
    #[test]
    fn adversarial_chunking_preserves_sequence(
        bodies in prop::collection::vec(arb_body(), 1..6),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let codec = FrameCodec::new();
        let msgs: Vec<Message> = bodies.into_iter().map(Message::new).collect();

        let mut bytes = Vec::new();
        for m in &msgs {
            bytes.extend_from_slice(&codec.encode(m).unwrap());
        }

        // 将字节流在若干任意位置切开
        let mut positions: Vec<usize> = cuts.iter().map(|i| i.index(bytes.len() + 1)).collect();
        positions.push(0);
        positions.push(bytes.len());
        positions.sort_unstable();
        positions.dedup();

        let mut decoder = FrameCodec::new();
        let mut decoded = Vec::new();
        for window in positions.windows(2) {
            decoded.extend(decoder.decode_chunk(&bytes[window[0]..window[1]]).unwrap());
        }

        prop_assert_eq!(decoded, msgs);
        prop_assert_eq!(decoder.pending_len(), 0);
    }

    /// 属性: 单帧在任意字节边界二分，前半不产出消息，后半恰好产出一条
    #[test]
    fn split_single_frame(body in arb_body(), cut in any::<prop::sample::Index>()) {
        let codec = FrameCodec::new();
        let msg = Message::new(body);
        let frame = codec.encode(&msg).unwrap();
        let at = 1 + cut.index(frame.len() - 1);

        let mut decoder = FrameCodec::new();
        let first = decoder.decode_chunk(&frame[..at]).unwrap();
        prop_assert!(first.is_empty());
        let second = decoder.decode_chunk(&frame[at..]).unwrap();
        prop_assert_eq!(second, vec![msg]);
    }

    /// 属性: 截断的帧不会产出消息也不会 panic
    #[test]
    fn truncated_frames_handled(body in arb_body(), keep in any::<prop::sample::Index>()) {
        let codec = FrameCodec::new();
        let frame = codec.encode(&Message::new(body)).unwrap();
        let at = keep.index(frame.len());

        let mut decoder = FrameCodec::new();
        let decoded = decoder.decode_chunk(&frame[..at]).unwrap();
        prop_assert!(decoded.is_empty());
        prop_assert_eq!(decoder.pending_len(), at);
    }
}
