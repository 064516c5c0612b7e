//! 旋转扫描服务
//!
//! Start：记录起始时间和航向，底座开始旋转。
//! Sweep：每拍读取航向并累计转过的角度，读取扫描传感器，喂给建图聚合器；
//!        检测到新目标时暂停旋转并上报 `detected`，进入 Dwell。
//! Dwell：停留一段时间后恢复旋转。
//! 累计转过 360° 或超时（停留期间同样计时）后停止，上报 `complete`。

use super::{Outbox, ServiceContext, ServiceKind, ServiceTask, TaskStatus};
use crate::control::shortest_delta;
use crate::error::ServiceError;
use crate::hal::{BrakeMode, Direction, LedColor, RangeSensor};
use crate::mapping::MappingAggregator;
use sortbot_protocol::{Detection, MessageType, ScanEvent};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Start,
    Sweep,
    Dwell { until: Duration },
}

#[derive(Debug)]
pub struct ScanTask {
    speed: f64,
    phase: Phase,
    start_time: Duration,
    last_angle: f64,
    accumulated_rotation: f64,
    paused_for_object: bool,
    mapping: MappingAggregator,
}

impl ScanTask {
    pub fn new(speed: f64) -> Self {
        Self {
            speed,
            phase: Phase::Start,
            start_time: Duration::ZERO,
            last_angle: 0.0,
            accumulated_rotation: 0.0,
            paused_for_object: false,
            mapping: MappingAggregator::new(),
        }
    }

    pub fn accumulated_rotation(&self) -> f64 {
        self.accumulated_rotation
    }

    fn start(&mut self, ctx: &mut ServiceContext<'_>) -> Result<TaskStatus, ServiceError> {
        self.start_time = ctx.now();
        self.last_angle = ctx.hw.heading.heading()?;
        ctx.hw.base.spin(Direction::Forward, self.speed)?;
        ctx.hw.set_color(LedColor::Running)?;
        info!(
            "Scan started at {:.1}° ({} RPM)",
            self.last_angle, self.speed
        );
        self.phase = Phase::Sweep;
        Ok(TaskStatus::Running)
    }

    fn sweep(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<TaskStatus, ServiceError> {
        let current_angle = ctx.hw.heading.heading()?;
        self.accumulated_rotation += shortest_delta(self.last_angle, current_angle).abs();
        self.last_angle = current_angle;

        let scan_range = ctx.config.scan_range;
        let reading =
            ctx.perception
                .process_sensor_distance(ctx.hw, RangeSensor::Base, scan_range)?;

        if reading.detected && !self.paused_for_object {
            self.paused_for_object = true;
            ctx.hw.base.stop(BrakeMode::Brake)?;
            info!(
                "Object detected at {:.1}° ({:.0}mm, size {})",
                current_angle, reading.distance, reading.size
            );
            outbox.post(
                MessageType::ScanService,
                &ScanEvent::Detected(Detection::new(
                    current_angle,
                    reading.distance,
                    reading.size,
                )),
            );
            self.phase = Phase::Dwell {
                until: ctx.now() + ctx.config.detection_dwell(),
            };
        } else if !reading.detected {
            self.paused_for_object = false;
        }

        self.mapping
            .process(current_angle, reading.size, reading.distance);

        let elapsed = ctx.now().saturating_sub(self.start_time);
        if self.accumulated_rotation >= 360.0 || elapsed >= ctx.config.scan_timeout() {
            return self.complete(ctx, outbox, current_angle, elapsed);
        }
        Ok(TaskStatus::Running)
    }

    fn complete(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
        current_angle: f64,
        elapsed: Duration,
    ) -> Result<TaskStatus, ServiceError> {
        ctx.hw.base.stop(BrakeMode::Brake)?;
        self.mapping.finish(current_angle);
        let objects = self.mapping.take_objects();
        info!(
            "Scan complete: {} objects, {:.1}° in {:.1}s",
            objects.len(),
            self.accumulated_rotation,
            elapsed.as_secs_f64()
        );
        ctx.hw.set_color(LedColor::Ready)?;
        outbox.post(MessageType::ScanService, &ScanEvent::Complete { objects });
        Ok(TaskStatus::Done)
    }
}

impl ServiceTask for ScanTask {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Scan
    }

    fn advance(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<TaskStatus, ServiceError> {
        match self.phase {
            Phase::Start => self.start(ctx),
            Phase::Sweep => self.sweep(ctx, outbox),
            Phase::Dwell { until } => {
                let elapsed = ctx.now().saturating_sub(self.start_time);
                if elapsed >= ctx.config.scan_timeout() {
                    let current_angle = ctx.hw.heading.heading()?;
                    return self.complete(ctx, outbox, current_angle, elapsed);
                }
                if ctx.now() >= until {
                    debug!("Resuming sweep");
                    ctx.hw.base.spin(Direction::Forward, self.speed)?;
                    self.phase = Phase::Sweep;
                }
                Ok(TaskStatus::Running)
            },
        }
    }

    fn fail(
        &mut self,
        error: &ServiceError,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<(), ServiceError> {
        self.mapping.reset();
        outbox.post(
            MessageType::ScanService,
            &ScanEvent::Error {
                error_msg: error.to_string(),
            },
        );
        ctx.hw.base.stop(BrakeMode::Brake)?;
        ctx.hw.set_color(LedColor::Error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MotorJoint;
    use crate::services::test_support::Harness;
    use crate::sim::{SimArm, SimObject};
    use sortbot_protocol::Message;

    fn events(replies: &[Message]) -> Vec<ScanEvent> {
        replies
            .iter()
            .map(|m| {
                assert_eq!(m.msg_type, "scan_service");
                m.payload::<ScanEvent>().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_scan_maps_single_object() {
        let sim = SimArm::new()
            .with_heading(0.0)
            .with_object(SimObject::new(90.0, 15.0, 120.0, 5));
        let mut harness = Harness::new(sim);
        let mut task = ScanTask::new(20.0);
        let replies = harness.run(&mut task, 10_000);

        let events = events(&replies);
        assert_eq!(events.len(), 2);
        match &events[0] {
            ScanEvent::Detected(d) => {
                assert!((d.angle - 82.5).abs() <= 1.5, "detected at {}", d.angle);
                assert_eq!(d.size, 5);
                assert_eq!(d.distance, 120.0);
            },
            other => panic!("Expected detection, got {:?}", other),
        }
        match &events[1] {
            ScanEvent::Complete { objects } => {
                assert_eq!(objects.len(), 1);
                assert!((objects[0].center_angle - 90.0).abs() <= 1.5);
                assert!((objects[0].width - 15.0).abs() <= 2.5);
                assert_eq!(objects[0].max_size, 5);
            },
            other => panic!("Expected completion, got {:?}", other),
        }
        assert!(task.accumulated_rotation() >= 360.0);
        assert!(!harness.sim.is_spinning(MotorJoint::Base));
    }

    #[test]
    fn test_scan_dwells_on_detection() {
        let sim = SimArm::new()
            .with_heading(0.0)
            .with_object(SimObject::new(180.0, 10.0, 200.0, 2));
        let mut harness = Harness::new(sim);
        let start = harness.sim.now();
        harness.run(&mut ScanTask::new(20.0), 10_000);

        // 20 RPM 转一圈 3 秒，加上一次 2 秒停留
        let elapsed = harness.sim.now() - start;
        assert!(elapsed >= Duration::from_millis(4_900), "took {:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(5_300), "took {:?}", elapsed);
    }

    #[test]
    fn test_scan_without_objects_completes_empty() {
        let mut harness = Harness::new(SimArm::new().with_heading(123.0));
        let replies = harness.run(&mut ScanTask::new(20.0), 10_000);
        assert_eq!(
            events(&replies),
            vec![ScanEvent::Complete {
                objects: Vec::new()
            }]
        );
    }

    #[test]
    fn test_scan_timeout_stops_motor() {
        let mut harness = Harness::new(SimArm::new());
        harness.config.scan_timeout_ms = 500;
        let replies = harness.run(&mut ScanTask::new(1.0), 10_000);

        assert!(matches!(
            events(&replies).as_slice(),
            [ScanEvent::Complete { .. }]
        ));
        assert!(!harness.sim.is_spinning(MotorJoint::Base));
    }

    #[test]
    fn test_scan_timeout_cuts_dwell_short() {
        let sim = SimArm::new()
            .with_heading(0.0)
            .with_object(SimObject::new(60.0, 10.0, 120.0, 4));
        let mut harness = Harness::new(sim);
        harness.config.scan_timeout_ms = 600;
        let start = harness.sim.now();
        let replies = harness.run(&mut ScanTask::new(20.0), 10_000);

        assert!(matches!(
            events(&replies).as_slice(),
            [ScanEvent::Detected(_), ScanEvent::Complete { .. }]
        ));
        let elapsed = harness.sim.now() - start;
        assert!(elapsed <= Duration::from_millis(800), "took {:?}", elapsed);
        assert!(!harness.sim.is_spinning(MotorJoint::Base));
    }

    #[test]
    fn test_object_at_start_heading_is_flushed() {
        let sim = SimArm::new()
            .with_heading(0.0)
            .with_object(SimObject::new(0.0, 10.0, 150.0, 3));
        let mut harness = Harness::new(sim);
        let replies = harness.run(&mut ScanTask::new(20.0), 10_000);

        let Some(ScanEvent::Complete { objects }) = events(&replies).pop() else {
            panic!("scan did not complete");
        };
        assert!(!objects.is_empty());
        assert!(objects.iter().all(|o| o.max_size == 3));
    }

    #[test]
    fn test_heading_fault_reports_scan_error() {
        let mut harness = Harness::new(SimArm::new().without("heading"));
        let replies = harness.run(&mut ScanTask::new(20.0), 10);
        assert_eq!(
            events(&replies),
            vec![ScanEvent::Error {
                error_msg: "heading not installed".to_string()
            }]
        );
        assert_eq!(harness.sim.led(), Some(LedColor::Error));
    }
}
