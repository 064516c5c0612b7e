//! 抓取/放置服务：按关节分派的单步动作
//!
//! 每个请求只驱动一个关节，完成后回复 `completed`；
//! 任何硬件错误、非法请求或超过截止时间都回复 `{joint, state: error, error}`。

use super::{Outbox, ServiceContext, ServiceKind, ServiceTask, TaskStatus};
use crate::control::{SeekStatus, shortest_delta};
use crate::error::ServiceError;
use crate::hal::{BrakeMode, Direction, LedColor, MotorJoint, RangeSensor};
use sortbot_protocol::{Action, Joint, MotionReport, MotionRequest, MotionState};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 抓取时目标较远的距离分界（毫米）
const FAR_OBJECT_MM: f64 = 160.0;
/// 远处目标：肩部 / 肘部转速（RPM）
const FAR_SPEEDS: (f64, f64) = (15.0, 30.0);
/// 近处目标：肩部 / 肘部转速（RPM）
const NEAR_SPEEDS: (f64, f64) = (10.0, 0.0);
/// 放置时肩部 / 肘部转速（RPM）
const PLACE_SPEEDS: (f64, f64) = (20.0, 60.0);
/// 抬臂转速与回退转速（RPM）
const UP_SPEEDS: (f64, f64) = (80.0, 10.0);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Pending,
    Base { target: f64, biased: f64, rpm: f64 },
    ArmPick { shoulder_rpm: f64, elbow_rpm: f64 },
    ArmPlace { until: Duration },
    ArmUp,
    Gripper { action: Action },
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug)]
pub struct MotionTask {
    service: ServiceKind,
    request: MotionRequest,
    phase: Phase,
    deadline_at: Option<Duration>,
}

impl MotionTask {
    /// `service` 为 `Pick` 或 `Place`，决定回复类型和夹爪阈值
    pub fn new(service: ServiceKind, request: MotionRequest) -> Self {
        Self {
            service,
            request,
            phase: Phase::Pending,
            deadline_at: None,
        }
    }

    pub fn joint(&self) -> Joint {
        self.request.joint
    }

    fn label(&self) -> String {
        match self.request.action {
            Some(action) => format!("{} {}", self.request.joint, action),
            None => self.request.joint.to_string(),
        }
    }

    /// 校验请求并确定首个阶段
    fn plan(&self, ctx: &mut ServiceContext<'_>) -> Result<Phase, ServiceError> {
        let request = &self.request;
        match request.joint {
            Joint::Base => {
                let target = request.angle.ok_or_else(|| {
                    ServiceError::InvalidRequest("base motion requires an angle".to_string())
                })?;
                let rpm = request.speed.unwrap_or(ctx.config.base_default_speed);
                Ok(Phase::Base {
                    target,
                    biased: ctx.config.biased_base_target(target),
                    rpm,
                })
            },
            Joint::Arm => match request.action {
                Some(Action::Pick) => {
                    let distance = request.distance.ok_or_else(|| {
                        ServiceError::InvalidRequest("arm pick requires a distance".to_string())
                    })?;
                    let (shoulder_rpm, elbow_rpm) = if distance > FAR_OBJECT_MM {
                        FAR_SPEEDS
                    } else {
                        NEAR_SPEEDS
                    };
                    Ok(Phase::ArmPick {
                        shoulder_rpm,
                        elbow_rpm,
                    })
                },
                Some(Action::Place) => Ok(Phase::ArmPlace {
                    until: ctx.now() + ctx.config.place_dwell(),
                }),
                Some(Action::Up) => {
                    ctx.hw.set_color(LedColor::Warning)?;
                    Ok(Phase::ArmUp)
                },
                other => Err(ServiceError::InvalidRequest(format!(
                    "unsupported arm action: {}",
                    other.map_or("none", |a| a.as_str())
                ))),
            },
            Joint::Gripper => match request.action.unwrap_or(Action::Close) {
                action @ (Action::Open | Action::Close) => Ok(Phase::Gripper { action }),
                other => Err(ServiceError::InvalidRequest(format!(
                    "unsupported gripper action: {}",
                    other
                ))),
            },
        }
    }

    fn step(
        &mut self,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<Option<MotionReport>, ServiceError> {
        let joint = self.request.joint;
        match self.phase {
            Phase::Pending => {
                self.phase = self.plan(ctx)?;
                debug!("{} {} planned: {:?}", self.service, self.label(), self.phase);
                self.step(ctx)
            },
            Phase::Base {
                target,
                biased,
                rpm,
            } => match ctx
                .control()
                .seek_step(ctx.hw, MotorJoint::Base, biased, rpm)?
            {
                SeekStatus::Moving { .. } => Ok(None),
                SeekStatus::Arrived { position, .. } => {
                    let accuracy = round1(shortest_delta(position, target).abs());
                    info!(
                        "Base reached {:.1}° for target {:.1}° (accuracy {:.1}°)",
                        position, target, accuracy
                    );
                    Ok(Some(MotionReport {
                        joint,
                        state: MotionState::Completed,
                        target_angle: Some(target),
                        actual_angle: Some(round1(position)),
                        accuracy: Some(accuracy),
                        error: None,
                    }))
                },
            },
            Phase::ArmPick {
                shoulder_rpm,
                elbow_rpm,
            } => {
                let grip_range = ctx.config.grip_range;
                let reading = ctx.perception.process_sensor_distance(
                    ctx.hw,
                    RangeSensor::Gripper,
                    grip_range,
                )?;
                if reading.detected {
                    ctx.hw.shoulder.stop(BrakeMode::Brake)?;
                    ctx.hw.elbow.stop(BrakeMode::Brake)?;
                    info!("Object within reach at {:.0}mm", reading.distance);
                    return Ok(Some(MotionReport::completed(joint)));
                }
                ctx.hw.shoulder.spin(Direction::Reverse, shoulder_rpm)?;
                ctx.hw.elbow.spin(Direction::Forward, elbow_rpm)?;
                Ok(None)
            },
            Phase::ArmPlace { until } => {
                if ctx.now() >= until {
                    ctx.hw.shoulder.stop(BrakeMode::Brake)?;
                    ctx.hw.elbow.stop(BrakeMode::Brake)?;
                    return Ok(Some(MotionReport::completed(joint)));
                }
                let (shoulder_rpm, elbow_rpm) = PLACE_SPEEDS;
                ctx.hw.shoulder.spin(Direction::Reverse, shoulder_rpm)?;
                ctx.hw.elbow.spin(Direction::Forward, elbow_rpm)?;
                Ok(None)
            },
            Phase::ArmUp => {
                let (forward, reverse) = UP_SPEEDS;
                if ctx
                    .safety()
                    .check_shoulder_safety(ctx.hw, ctx.clock, forward, reverse)?
                {
                    return Ok(Some(MotionReport::completed(joint)));
                }
                Ok(None)
            },
            Phase::Gripper { action } => {
                if ctx.safety().gripper_action(ctx.hw, action, self.service)? {
                    return Ok(Some(MotionReport::completed(joint)));
                }
                Ok(None)
            },
        }
    }

    /// 当前阶段正在驱动的电机
    fn moving_joints(&self) -> &'static [MotorJoint] {
        match self.phase {
            Phase::Pending => &[],
            Phase::Base { .. } => &[MotorJoint::Base],
            Phase::ArmPick { .. } | Phase::ArmPlace { .. } | Phase::ArmUp => {
                &[MotorJoint::Shoulder, MotorJoint::Elbow]
            },
            Phase::Gripper { .. } => &[MotorJoint::Gripper],
        }
    }
}

impl ServiceTask for MotionTask {
    fn kind(&self) -> ServiceKind {
        self.service
    }

    fn advance(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<TaskStatus, ServiceError> {
        let now = ctx.now();
        let deadline = ctx.config.pick_deadline();
        let deadline_at = *self.deadline_at.get_or_insert(now + deadline);
        if now >= deadline_at {
            return Err(ServiceError::Deadline {
                task: self.label(),
                deadline,
            });
        }

        match self.step(ctx)? {
            Some(report) => {
                outbox.post(self.service.message_type(), &report);
                Ok(TaskStatus::Done)
            },
            None => Ok(TaskStatus::Running),
        }
    }

    fn fail(
        &mut self,
        error: &ServiceError,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<(), ServiceError> {
        warn!("{} {} failed: {}", self.service, self.label(), error);
        outbox.post(
            self.service.message_type(),
            &MotionReport::failed(self.request.joint, error.to_string()),
        );
        for &joint in self.moving_joints() {
            ctx.hw.motor_mut(joint).stop(BrakeMode::Brake)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;
    use crate::sim::{SimArm, SimObject};
    use serde_json::json;

    fn report(harness: &mut Harness, service: ServiceKind, request: MotionRequest) -> MotionReport {
        let replies = harness.run(&mut MotionTask::new(service, request), 10_000);
        assert_eq!(replies.len(), 1, "replies: {:?}", replies);
        assert_eq!(replies[0].msg_type, service.message_type().as_str());
        replies[0].payload().unwrap()
    }

    #[test]
    fn test_base_takes_short_way_to_270() {
        let mut harness = Harness::new(SimArm::new().with_heading(260.0));
        let report = report(&mut harness, ServiceKind::Pick, MotionRequest::base(270.0, 20.0));

        assert!(report.is_completed());
        assert_eq!(report.target_angle, Some(270.0));
        assert!(report.accuracy.unwrap() <= 2.0);
        assert!(harness.sim.base_travel() < 20.0);
    }

    #[test]
    fn test_base_bias_below_180() {
        let mut harness = Harness::new(SimArm::new().with_heading(0.0));
        let report = report(&mut harness, ServiceKind::Place, MotionRequest::base(90.0, 30.0));

        // 目标 <= 180 时偏置与微调叠加
        let actual = report.actual_angle.unwrap();
        assert!((actual - 98.0).abs() <= 2.0, "actual {}", actual);
        let accuracy = report.accuracy.unwrap();
        assert!((accuracy - shortest_delta(actual, 90.0).abs()).abs() <= 0.11);
    }

    #[test]
    fn test_base_without_angle_is_invalid() {
        let mut harness = Harness::new(SimArm::new());
        let request = MotionRequest {
            joint: Joint::Base,
            angle: None,
            distance: None,
            action: None,
            speed: Some(20.0),
        };
        let report = report(&mut harness, ServiceKind::Pick, request);
        assert!(!report.is_completed());
        assert!(report.error.unwrap().contains("requires an angle"));
    }

    #[test]
    fn test_arm_pick_stops_when_object_in_reach() {
        let sim = SimArm::new()
            .with_heading(90.0)
            .with_object(SimObject::new(90.0, 15.0, 120.0, 5));
        let mut harness = Harness::new(sim);
        let report = report(
            &mut harness,
            ServiceKind::Pick,
            MotionRequest::arm(120.0, Action::Pick),
        );

        assert!(report.is_completed());
        assert!(harness.sim.object_in_reach());
        assert!(!harness.sim.is_spinning(MotorJoint::Shoulder));
    }

    #[test]
    fn test_arm_pick_without_object_hits_deadline() {
        let mut harness = Harness::new(SimArm::new().with_heading(0.0));
        harness.config.pick_deadline_ms = 2_000;
        let report = report(
            &mut harness,
            ServiceKind::Pick,
            MotionRequest::arm(200.0, Action::Pick),
        );

        assert_eq!(report.state, MotionState::Error);
        assert_eq!(report.joint, Joint::Arm);
        assert!(report.error.unwrap().contains("arm pick deadline"));
        assert!(!harness.sim.is_spinning(MotorJoint::Shoulder));
        assert!(!harness.sim.is_spinning(MotorJoint::Elbow));
    }

    #[test]
    fn test_arm_place_dwells_then_brakes() {
        let mut harness = Harness::new(SimArm::new());
        let start = harness.sim.now();
        let report = report(
            &mut harness,
            ServiceKind::Place,
            MotionRequest::arm(200.0, Action::Place),
        );

        assert!(report.is_completed());
        let elapsed = harness.sim.now() - start;
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3_100));
    }

    #[test]
    fn test_arm_up_until_bumper() {
        let mut harness = Harness::new(SimArm::new().with_shoulder(50.0));
        let report = report(&mut harness, ServiceKind::Pick, MotionRequest::arm(0.0, Action::Up));
        assert!(report.is_completed());
        assert!(harness.sim.shoulder_position() > 200.0);
    }

    #[test]
    fn test_gripper_close_on_object_holds() {
        let sim = SimArm::new()
            .with_heading(90.0)
            .with_shoulder(20.0)
            .with_object(SimObject::new(90.0, 15.0, 120.0, 5));
        let mut harness = Harness::new(sim);
        let report = report(
            &mut harness,
            ServiceKind::Pick,
            MotionRequest::gripper(Action::Close),
        );
        assert!(report.is_completed());
        assert!(harness.sim.holding_object());
    }

    #[test]
    fn test_gripper_close_on_nothing_fails_for_pick_only() {
        // 空抓电流达不到抓取阈值
        let mut harness = Harness::new(SimArm::new());
        harness.config.pick_deadline_ms = 3_000;
        let pick = report(
            &mut harness,
            ServiceKind::Pick,
            MotionRequest::gripper(Action::Close),
        );
        assert_eq!(pick.state, MotionState::Error);

        let mut harness = Harness::new(SimArm::new());
        let place = report(
            &mut harness,
            ServiceKind::Place,
            MotionRequest::gripper(Action::Close),
        );
        assert!(place.is_completed());
    }

    #[test]
    fn test_gripper_rejects_arm_actions() {
        let mut harness = Harness::new(SimArm::new());
        let report = report(
            &mut harness,
            ServiceKind::Place,
            MotionRequest::gripper(Action::Up),
        );
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "joint": "gripper",
                "state": "error",
                "error": "Invalid request: unsupported gripper action: up"
            })
        );
    }
}
