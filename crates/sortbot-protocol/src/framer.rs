//! 行分帧编解码
//!
//! 每条消息序列化为紧凑 JSON 后追加一个 `\n`。解码器逐字节累积，
//! 遇到终止符立即产出一条消息并清空缓冲区；损坏的载荷被丢弃，
//! 但缓冲区同样清空，不会影响后续帧的同步。

use crate::{Message, ProtocolError};
use serde_json::Value;
use tracing::{error, trace};

/// 帧终止符
pub const TERMINATOR: u8 = b'\n';

/// 默认最大帧长（不含终止符）
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// 编码一条消息（JSON + 单个 `\n`）
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(TERMINATOR);
    Ok(bytes)
}

/// 解码一行（不含终止符）
///
/// 类型名统一转小写；`data` 为 `null` 时视为空对象。
pub fn decode_line(line: &[u8]) -> Result<Message, ProtocolError> {
    let text = std::str::from_utf8(line)?;
    let mut message: Message = serde_json::from_str(text)?;
    message.msg_type.make_ascii_lowercase();

    if message.data.is_null() {
        message.data = Value::Object(serde_json::Map::new());
    }
    if !message.data.is_object() {
        return Err(ProtocolError::NotAnObject(message.data.to_string()));
    }

    Ok(message)
}

/// 流式解码器
///
/// # Example
///
/// ```
/// use sortbot_protocol::{FrameDecoder, Message, encode};
///
/// let bytes = encode(&Message::empty("check_service")).unwrap();
/// let mut decoder = FrameDecoder::new();
/// let messages = decoder.decode_stream(&bytes);
/// assert_eq!(messages.len(), 1);
/// assert_eq!(messages[0].msg_type, "check_service");
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_len: usize,
    /// 超长帧：丢弃到下一个终止符为止
    discarding: bool,
    dropped: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(256),
            max_frame_len,
            discarding: false,
            dropped: 0,
        }
    }

    /// 推入一个字节
    ///
    /// # 返回
    /// - `None`: 帧未结束（或空行）
    /// - `Some(Ok(msg))`: 完整消息
    /// - `Some(Err(e))`: 帧被丢弃（已记录日志）
    pub fn push(&mut self, byte: u8) -> Option<Result<Message, ProtocolError>> {
        if byte != TERMINATOR {
            if self.discarding {
                return None;
            }
            if self.buffer.len() >= self.max_frame_len {
                self.buffer.clear();
                self.discarding = true;
                self.dropped += 1;
                error!(
                    "Frame exceeds {} bytes without terminator, discarding",
                    self.max_frame_len
                );
                return Some(Err(ProtocolError::FrameTooLong {
                    max: self.max_frame_len,
                }));
            }
            self.buffer.push(byte);
            return None;
        }

        if self.discarding {
            self.discarding = false;
            self.buffer.clear();
            return None;
        }

        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            return None;
        }

        trace!("Frame received: {} bytes", line.len());
        match decode_line(&line) {
            Ok(message) => Some(Ok(message)),
            Err(e) => {
                self.dropped += 1;
                error!(
                    "Malformed frame dropped ({}): {}",
                    e,
                    String::from_utf8_lossy(&line)
                );
                Some(Err(e))
            },
        }
    }

    /// 解码一段字节流，返回其中的完整消息
    ///
    /// 损坏的帧已在 [`push`](Self::push) 中记录并丢弃。
    pub fn decode_stream(&mut self, bytes: &[u8]) -> Vec<Message> {
        bytes
            .iter()
            .filter_map(|&b| self.push(b))
            .filter_map(Result::ok)
            .collect()
    }

    /// 当前缓冲的字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 累计丢弃的帧数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 清空缓冲区（重连时使用）
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MotionRequest, ScanRequest};
    use rand::Rng;
    use serde_json::json;

    #[test]
    fn test_encode_appends_single_terminator() {
        let msg = Message::new("scan_service", &ScanRequest { speed: 20.0 }).unwrap();
        let bytes = encode(&msg).unwrap();
        assert_eq!(bytes.last(), Some(&TERMINATOR));
        assert_eq!(bytes.iter().filter(|&&b| b == TERMINATOR).count(), 1);
    }

    #[test]
    fn test_decode_split_across_chunks() {
        let msg = Message::new("pick_service", &MotionRequest::base(270.0, 30.0)).unwrap();
        let bytes = encode(&msg).unwrap();
        let (head, tail) = bytes.split_at(7);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode_stream(head).is_empty());
        assert_eq!(decoder.buffered(), 7);

        let out = decoder.decode_stream(tail);
        assert_eq!(out, vec![msg]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_truncated_frame_does_not_block_next() {
        let mut decoder = FrameDecoder::new();
        let mut stream = br#"{"type": "scan_service","#.to_vec();
        stream.push(TERMINATOR);
        stream.extend(encode(&Message::empty("check_service")).unwrap());

        let out = decoder.decode_stream(&stream);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].msg_type, "check_service");
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn test_push_reports_error_then_recovers() {
        let mut decoder = FrameDecoder::new();
        for &b in b"not json" {
            assert!(decoder.push(b).is_none());
        }
        assert!(matches!(decoder.push(TERMINATOR), Some(Err(ProtocolError::Json(_)))));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_type_lowercased_and_crlf_tolerated() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.decode_stream(b"{\"type\":\"CHECK_SERVICE\",\"data\":null}\r\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].msg_type, "check_service");
        assert_eq!(out[0].data, json!({}));
    }

    #[test]
    fn test_empty_lines_ignored() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.decode_stream(b"\n\n\r\n").is_empty());
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn test_non_object_data_rejected() {
        let err = decode_line(br#"{"type":"scan_service","data":[1,2]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAnObject(_)));
    }

    #[test]
    fn test_oversized_frame_resynchronises() {
        let mut decoder = FrameDecoder::with_max_frame_len(64);
        let mut stream = vec![b'x'; 100];
        stream.push(TERMINATOR);
        stream.extend(encode(&Message::empty("safety_service")).unwrap());

        let out = decoder.decode_stream(&stream);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].msg_type, "safety_service");
        assert_eq!(decoder.dropped(), 1);
    }

    #[test]
    fn test_random_garbage_never_desynchronises() {
        let mut rng = rand::thread_rng();
        let valid = Message::new("scan_service", &ScanRequest { speed: 25.0 }).unwrap();

        for _ in 0..50 {
            let len = rng.gen_range(0..300);
            let garbage: Vec<u8> = (0..len).map(|_| rng.r#gen::<u8>()).collect();

            let mut decoder = FrameDecoder::new();
            decoder.decode_stream(&garbage);
            decoder.decode_stream(&[TERMINATOR]);
            let out = decoder.decode_stream(&encode(&valid).unwrap());
            assert_eq!(out.last(), Some(&valid));
        }
    }
}
