//! # Sortbot Protocol
//!
//! 主机与机械臂控制器之间的消息协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `framer`: 以 `\n` 结尾的 JSON 行编解码
//! - `messages`: 各服务的请求/响应载荷
//!
//! ## 线上格式
//!
//! 每条消息是一个 UTF-8 JSON 对象，占一行：
//!
//! ```text
//! {"type":"scan_service","data":{"speed":20.0}}\n
//! ```

pub mod framer;
pub mod messages;

// 重新导出常用类型
pub use framer::{DEFAULT_MAX_FRAME_LEN, FrameDecoder, TERMINATOR, decode_line, encode};
pub use messages::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid UTF-8 in frame: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Frame too long: exceeds limit of {max} bytes")]
    FrameTooLong { max: usize },

    #[error("Invalid payload for message type {msg_type}: {source}")]
    InvalidPayload {
        msg_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Message data must be a JSON object, got {0}")]
    NotAnObject(String),
}

/// 已知的消息类型
///
/// 未知类型不会报错，由分发方忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    CheckService,
    CheckError,
    SafetyService,
    ScanService,
    PickService,
    PlaceService,
    CurrentAngles,
    Error,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::CheckService,
        MessageType::CheckError,
        MessageType::SafetyService,
        MessageType::ScanService,
        MessageType::PickService,
        MessageType::PlaceService,
        MessageType::CurrentAngles,
        MessageType::Error,
    ];

    /// 线上字符串
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageType::CheckService => "check_service",
            MessageType::CheckError => "check_error",
            MessageType::SafetyService => "safety_service",
            MessageType::ScanService => "scan_service",
            MessageType::PickService => "pick_service",
            MessageType::PlaceService => "place_service",
            MessageType::CurrentAngles => "current_angles",
            MessageType::Error => "error",
        }
    }

    /// 解析消息类型（大小写不敏感），未知类型返回 `None`
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// 消息信封 `{type, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 消息类型（服务名或事件名）
    #[serde(rename = "type")]
    pub msg_type: String,

    /// 载荷（始终为 JSON 对象）
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl Message {
    /// 用类型化载荷构造消息
    ///
    /// # 错误
    /// - `ProtocolError::Json`: 载荷序列化失败
    /// - `ProtocolError::NotAnObject`: 载荷不是 JSON 对象
    pub fn new<T: Serialize>(
        msg_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let data = serde_json::to_value(payload)?;
        if !data.is_object() {
            return Err(ProtocolError::NotAnObject(data.to_string()));
        }
        Ok(Self {
            msg_type: msg_type.into(),
            data,
        })
    }

    /// 构造空载荷消息（`data = {}`）
    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: empty_object(),
        }
    }

    /// 已知类型，未知返回 `None`
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::parse(&self.msg_type)
    }

    /// 将 `data` 解码为类型化载荷
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.data.clone()).map_err(|source| {
            ProtocolError::InvalidPayload {
                msg_type: self.msg_type.clone(),
                source,
            }
        })
    }

    /// 读取 `data` 中的字符串字段
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}
