//! 控制流程错误类型定义

use sortbot_driver::DriverError;
use sortbot_protocol::{Joint, MessageType};
use std::path::PathBuf;
use thiserror::Error;

/// 控制流程错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// 动作序列中某一步未确认（已尝试回到安全位姿）
    #[error("{service} step {step} ({joint}) failed: {reason}")]
    StepFailed {
        service: MessageType,
        step: usize,
        joint: Joint,
        reason: String,
    },

    /// 安全位姿恢复未完成
    #[error("Recovery to safe pose failed at {joint}")]
    RecoveryFailed { joint: Joint },

    /// 扫描登记表中没有该序号
    #[error("No scanned object with index {0}")]
    ObjectNotFound(usize),

    #[error("Failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    ParseConfig(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    SerializeConfig(#[from] toml::ser::Error),
}
