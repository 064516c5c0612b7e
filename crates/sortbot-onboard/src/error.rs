//! 板载侧错误类型定义

use crate::hal::MotorJoint;
use sortbot_protocol::ProtocolError;
use sortbot_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// 硬件访问错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    /// 设备未安装
    #[error("{0} not installed")]
    NotInstalled(&'static str),

    /// 设备故障
    #[error("{device} fault: {reason}")]
    Fault { device: &'static str, reason: String },
}

/// 单个服务执行失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// 超过服务截止时间
    #[error("{task} deadline of {deadline:?} exceeded")]
    Deadline { task: String, deadline: Duration },

    /// 请求缺少必要字段或取值无效
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 关节未到位（阻塞式定位超时）
    #[error("{joint} did not reach {target:.1} within {deadline:?}")]
    NotReached {
        joint: MotorJoint,
        target: f64,
        deadline: Duration,
    },
}

/// 板载主循环错误
#[derive(Error, Debug)]
pub enum OnboardError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

impl OnboardError {
    /// 传输已断开，主循环应当退出
    pub fn is_fatal(&self) -> bool {
        matches!(self, OnboardError::Transport(e) if e.is_fatal())
    }
}
