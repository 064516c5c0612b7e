//! 服务状态机
//!
//! 每个服务是一个按节拍推进的任务：主循环每拍调用一次 `advance`，
//! 任务自己记录所处阶段，从不在内部长时间阻塞（肩部回退除外）。
//! 同一类服务同时只能有一个在运行，不同类服务可以并存。

mod check;
mod motion;
mod safety;
mod scan;

pub use check::CheckTask;
pub use motion::MotionTask;
pub use safety::SafetyTask;
pub use scan::ScanTask;

use crate::config::OnboardConfig;
use crate::control::ControlModule;
use crate::error::ServiceError;
use crate::hal::{ArmHardware, Clock};
use crate::perception::PerceptionModule;
use crate::safety::SafetyModule;
use serde::Serialize;
use sortbot_protocol::{Message, MessageType, ProtocolError};
use std::fmt;
use std::time::Duration;
use tracing::error;

/// 服务类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    Check,
    Safety,
    Scan,
    Pick,
    Place,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::Check,
        ServiceKind::Safety,
        ServiceKind::Scan,
        ServiceKind::Pick,
        ServiceKind::Place,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Check => "check",
            ServiceKind::Safety => "safety",
            ServiceKind::Scan => "scan",
            ServiceKind::Pick => "pick",
            ServiceKind::Place => "place",
        }
    }

    /// 该服务回复所用的消息类型
    pub const fn message_type(&self) -> MessageType {
        match self {
            ServiceKind::Check => MessageType::CheckService,
            ServiceKind::Safety => MessageType::SafetyService,
            ServiceKind::Scan => MessageType::ScanService,
            ServiceKind::Pick => MessageType::PickService,
            ServiceKind::Place => MessageType::PlaceService,
        }
    }

    /// 请求消息类型对应的服务
    pub fn from_message_type(msg_type: MessageType) -> Option<Self> {
        match msg_type {
            MessageType::CheckService => Some(ServiceKind::Check),
            MessageType::SafetyService => Some(ServiceKind::Safety),
            MessageType::ScanService => Some(ServiceKind::Scan),
            MessageType::PickService => Some(ServiceKind::Pick),
            MessageType::PlaceService => Some(ServiceKind::Place),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个服务的运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceState {
    #[default]
    Idle,
    Active,
}

/// 一拍之后的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Done,
}

/// 服务执行所需的硬件与模块
pub struct ServiceContext<'a> {
    pub hw: &'a mut ArmHardware,
    pub clock: &'a dyn Clock,
    pub config: &'a OnboardConfig,
    pub perception: &'a mut PerceptionModule,
}

impl ServiceContext<'_> {
    pub fn control(&self) -> ControlModule {
        ControlModule::new(self.config)
    }

    pub fn safety(&self) -> SafetyModule {
        SafetyModule::new(self.config)
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }
}

/// 待发送消息
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<Message>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: Serialize>(
        &mut self,
        msg_type: MessageType,
        payload: &T,
    ) -> Result<(), ProtocolError> {
        self.messages.push(Message::new(msg_type.as_str(), payload)?);
        Ok(())
    }

    /// 同 `push`，编码失败只记录日志
    pub fn post<T: Serialize>(&mut self, msg_type: MessageType, payload: &T) {
        if let Err(e) = self.push(msg_type, payload) {
            error!("Failed to encode {} reply: {}", msg_type, e);
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, Message> {
        self.messages.drain(..)
    }
}

/// 按节拍推进的服务任务
pub trait ServiceTask: Send {
    fn kind(&self) -> ServiceKind;

    /// 推进一拍
    fn advance(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<TaskStatus, ServiceError>;

    /// `advance` 返回错误后调用一次：停止相关关节并向主机报告
    fn fail(
        &mut self,
        error: &ServiceError,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<(), ServiceError>;
}

/// 秒，保留一位小数
pub(crate) fn elapsed_secs(from: Duration, to: Duration) -> f64 {
    (to.saturating_sub(from).as_secs_f64() * 10.0).round() / 10.0
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_message_type_roundtrip() {
        for kind in ServiceKind::ALL {
            assert_eq!(ServiceKind::from_message_type(kind.message_type()), Some(kind));
        }
        assert_eq!(ServiceKind::from_message_type(MessageType::CurrentAngles), None);
    }

    #[test]
    fn test_elapsed_secs_rounds() {
        assert_eq!(
            elapsed_secs(Duration::from_millis(1000), Duration::from_millis(4260)),
            3.3
        );
        assert_eq!(elapsed_secs(Duration::from_secs(5), Duration::from_secs(1)), 0.0);
    }
}
