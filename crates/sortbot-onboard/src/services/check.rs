//! 自检服务：一拍完成

use super::{Outbox, ServiceContext, ServiceKind, ServiceTask, TaskStatus};
use crate::error::ServiceError;
use crate::hal::LedColor;
use sortbot_protocol::{CheckError, MessageType, ServiceReport};
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct CheckTask;

impl CheckTask {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceTask for CheckTask {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Check
    }

    fn advance(
        &mut self,
        ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<TaskStatus, ServiceError> {
        let mut missing = ctx.safety().check_sensors(ctx.hw);
        missing.extend(ctx.control().check_motors(ctx.hw));

        if missing.is_empty() {
            ctx.hw.set_color(LedColor::Ready)?;
            info!("Self check passed");
            outbox.post(MessageType::CheckService, &ServiceReport::approved());
        } else {
            let report = format!("missing: {}", missing.join(", "));
            error!("Self check failed, {}", report);
            ctx.hw.set_color(LedColor::Error)?;
            outbox.post(MessageType::CheckError, &CheckError { error: report });
        }
        Ok(TaskStatus::Done)
    }

    fn fail(
        &mut self,
        error: &ServiceError,
        _ctx: &mut ServiceContext<'_>,
        outbox: &mut Outbox,
    ) -> Result<(), ServiceError> {
        outbox.post(
            MessageType::CheckError,
            &CheckError {
                error: error.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::Harness;
    use crate::sim::SimArm;
    use serde_json::json;

    #[test]
    fn test_all_present_is_approved() {
        let mut harness = Harness::new(SimArm::new());
        let replies = harness.run(&mut CheckTask::new(), 1);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].msg_type, "check_service");
        assert_eq!(replies[0].data, json!({"state": "approved"}));
        assert_eq!(harness.sim.led(), Some(LedColor::Ready));
    }

    #[test]
    fn test_missing_devices_are_named() {
        let mut harness = Harness::new(SimArm::new().without("bumper").without("elbow_motor"));
        let replies = harness.run(&mut CheckTask::new(), 1);
        assert_eq!(replies[0].msg_type, "check_error");
        assert_eq!(replies[0].data, json!({"error": "missing: bumper, elbow_motor"}));
        assert_eq!(harness.sim.led(), Some(LedColor::Error));
    }
}
