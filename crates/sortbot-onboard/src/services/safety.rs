//! 安全复位服务：先抬臂到限位，再张开夹爪

use super::{Outbox, ServiceContext, ServiceKind, ServiceTask, TaskStatus, elapsed_secs};
use crate::error::ServiceError;
use crate::hal::LedColor;
use sortbot_protocol::{Action, MessageType, ReportState, ServiceReport};
use std::time::Duration;
use tracing::info;

/// 抬臂速度（RPM）
const SHOULDER_FORWARD_RPM: f64 = 60.0;
/// 碰限位后的回退速度（RPM）
const SHOULDER_REVERSE_RPM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Shoulder,
    Gripper,
}

#[derive(Debug)]
pub struct SafetyTask {
    phase: Phase,
    started_at: Option<Duration>,
}

impl SafetyTask {
    pub fn new() -> Self {
        Self {
            phase: Phase::Shoulder,
            started_at: None,
        }
    }
}

impl Default for SafetyTask {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceTask for SafetyTask {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Safety
    }

    fn advance(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<TaskStatus, ServiceError> {
        let now = ctx.now();
        let started_at = *self.started_at.get_or_insert(now);
        let deadline = ctx.config.safety_deadline();
        if now.saturating_sub(started_at) >= deadline {
            return Err(ServiceError::Deadline {
                task: "safety".to_string(),
                deadline,
            });
        }

        let safety = ctx.safety();
        match self.phase {
            Phase::Shoulder => {
                if safety.check_shoulder_safety(
                    ctx.hw,
                    ctx.clock,
                    SHOULDER_FORWARD_RPM,
                    SHOULDER_REVERSE_RPM,
                )? {
                    info!("Safety: shoulder clear, opening gripper");
                    self.phase = Phase::Gripper;
                }
                Ok(TaskStatus::Running)
            },
            Phase::Gripper => {
                if !safety.gripper_action(ctx.hw, Action::Open, ServiceKind::Safety)? {
                    return Ok(TaskStatus::Running);
                }
                ctx.hw.set_color(LedColor::Ready)?;
                let time = elapsed_secs(started_at, ctx.now());
                info!("Safety pose reached in {:.1}s", time);
                outbox.post(
                    MessageType::SafetyService,
                    &ServiceReport::approved().with_time(time),
                );
                Ok(TaskStatus::Done)
            },
        }
    }

    fn fail(
        &mut self,
        error: &ServiceError,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<(), ServiceError> {
        let time = elapsed_secs(self.started_at.unwrap_or_default(), ctx.now());
        outbox.post(
            MessageType::SafetyService,
            &ServiceReport {
                state: ReportState::Error,
                time: Some(time),
                error_msg: Some(error.to_string()),
            },
        );
        ctx.control().general_stop(ctx.hw)?;
        ctx.hw.set_color(LedColor::Error)?;
        Ok(())
    }
}
