//! 抓取/放置动作序列
//!
//! 序列按步发送，每步等待机械臂确认后才发下一步。
//! 任一步失败时尝试回到安全位姿（抬臂、张开夹爪、底座回零），再返回错误。

use crate::error::ControlError;
use crate::registry::ScanEntry;
use sortbot_driver::ArmLink;
use sortbot_protocol::{Action, MessageType, MotionRequest};
use std::time::Duration;
use tracing::{error, info, warn};

/// 接近目标时的底座转速（RPM）
pub const APPROACH_SPEED: f64 = 30.0;
/// 放置后回零的底座转速（RPM）
pub const RETURN_SPEED: f64 = 60.0;
/// 安全位姿的抬臂距离（毫米）
pub const SAFE_LIFT_DISTANCE: f64 = 100.0;

/// 抓取：转到物体、下探、夹紧、抬起
pub fn pick_plan(entry: &ScanEntry) -> Vec<MotionRequest> {
    let distance = entry.position.distance;
    vec![
        MotionRequest::base(entry.position.angle, APPROACH_SPEED),
        MotionRequest::arm(distance, Action::Pick),
        MotionRequest::gripper(Action::Close),
        MotionRequest::arm(distance, Action::Up),
    ]
}

/// 放置：转到放置区、下放、张开、抬起、底座回零
pub fn place_plan(entry: &ScanEntry) -> Vec<MotionRequest> {
    let zone = entry.placement_zone;
    vec![
        MotionRequest::base(zone.angle, APPROACH_SPEED),
        MotionRequest::arm(zone.distance, Action::Place),
        MotionRequest::gripper(Action::Open),
        MotionRequest::arm(entry.position.distance, Action::Up),
        MotionRequest::base(0.0, RETURN_SPEED),
    ]
}

pub fn safe_pose_plan() -> Vec<MotionRequest> {
    vec![
        MotionRequest::arm(SAFE_LIFT_DISTANCE, Action::Up),
        MotionRequest::gripper(Action::Open),
        MotionRequest::base(0.0, RETURN_SPEED),
    ]
}

/// 逐步执行动作序列
pub struct SequenceRunner<'a> {
    link: &'a ArmLink,
    step_timeout: Duration,
}

impl<'a> SequenceRunner<'a> {
    pub fn new(link: &'a ArmLink, step_timeout: Duration) -> Self {
        Self { link, step_timeout }
    }

    /// 发送一步并等待确认，失败时返回机械臂报告的原因
    fn run_step(&self, service: MessageType, step: &MotionRequest) -> Result<(), String> {
        self.link
            .send_motion(service, step)
            .map_err(|e| e.to_string())?;
        if self.link.wait_for_confirmation(step.joint, self.step_timeout) {
            return Ok(());
        }

        let reason = self
            .link
            .movement_status(step.joint)
            .and_then(|status| status.detail)
            .and_then(|report| report.error)
            .unwrap_or_else(|| format!("no confirmation within {:?}", self.step_timeout));
        Err(reason)
    }

    /// 执行序列
    ///
    /// # 错误
    /// - `ControlError::StepFailed`: 某步失败（已尝试恢复安全位姿）
    pub fn execute(&self, service: MessageType, plan: &[MotionRequest]) -> Result<(), ControlError> {
        info!("Executing {} ({} steps)", service, plan.len());
        for (i, step) in plan.iter().enumerate() {
            info!("{} step {}: {}", service, i + 1, step.joint);
            if let Err(reason) = self.run_step(service, step) {
                error!("{} step {} ({}) failed: {}", service, i + 1, step.joint, reason);
                if let Err(e) = self.recover(service) {
                    error!("{}", e);
                }
                return Err(ControlError::StepFailed {
                    service,
                    step: i + 1,
                    joint: step.joint,
                    reason,
                });
            }
        }
        info!("{} sequence completed", service);
        Ok(())
    }

    /// 回到安全位姿
    ///
    /// 某步失败后继续执行剩余步骤，返回第一个失败的关节。
    pub fn recover(&self, service: MessageType) -> Result<(), ControlError> {
        warn!("Executing safety protocol, moving to safe pose");
        let mut first_failure = None;
        for step in safe_pose_plan() {
            if let Err(reason) = self.run_step(service, &step) {
                error!("Safe pose step {} failed: {}", step.joint, reason);
                first_failure.get_or_insert(step.joint);
            }
        }
        match first_failure {
            None => {
                info!("System safe, moved to safe pose");
                Ok(())
            },
            Some(joint) => Err(ControlError::RecoveryFailed { joint }),
        }
    }
}
