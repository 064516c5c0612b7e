//! 安全模块：肩部限位复位与夹爪动作
//!
//! 两个方法都是单拍操作，返回 `true` 表示条件已满足，调用方按节拍重复调用。

use crate::config::OnboardConfig;
use crate::control::ControlModule;
use crate::error::HardwareError;
use crate::hal::{ArmHardware, BrakeMode, Clock, Direction, LedColor};
use crate::services::ServiceKind;
use sortbot_protocol::Action;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct SafetyModule {
    control: ControlModule,
    retreat: Duration,
    elbow_compensation_rpm: f64,
    gripper_rpm: f64,
    pick_threshold: f64,
    release_threshold: f64,
}

impl SafetyModule {
    pub fn new(config: &OnboardConfig) -> Self {
        Self {
            control: ControlModule::new(config),
            retreat: config.retreat(),
            elbow_compensation_rpm: config.elbow_compensation_rpm,
            gripper_rpm: config.gripper_rpm,
            pick_threshold: config.pick_current_threshold,
            release_threshold: config.release_current_threshold,
        }
    }

    /// 抬臂直到碰到限位
    ///
    /// 限位已触发：全部停止，红灯，肩部以 `rpm_reverse` 回退一段时间后保持，返回 `true`。
    /// 未触发：肩部以 `rpm_forward` 上抬、肘部反向补偿，橙灯，返回 `false`。
    pub fn check_shoulder_safety(
        &self,
        hw: &mut ArmHardware,
        clock: &dyn Clock,
        rpm_forward: f64,
        rpm_reverse: f64,
    ) -> Result<bool, HardwareError> {
        if hw.bumper.is_pressed()? {
            info!("Shoulder limit reached, retreating");
            self.control.general_stop(hw)?;
            hw.set_color(LedColor::Error)?;
            hw.shoulder.spin(Direction::Reverse, rpm_reverse)?;
            clock.sleep(self.retreat);
            hw.shoulder.stop(BrakeMode::Hold)?;
            return Ok(true);
        }

        hw.shoulder.spin(Direction::Forward, rpm_forward)?;
        hw.elbow.spin(Direction::Reverse, self.elbow_compensation_rpm)?;
        hw.set_color(LedColor::Warning)?;
        Ok(false)
    }

    /// 夹爪电流阈值：抓取需要夹紧，其它服务只需确认到位
    pub fn current_threshold(&self, service: ServiceKind) -> f64 {
        if service == ServiceKind::Pick {
            self.pick_threshold
        } else {
            self.release_threshold
        }
    }

    /// 驱动夹爪一拍
    ///
    /// 肩部和肘部先制动；`Open` 正转，其余动作反转（闭合）。
    /// 电流达到阈值后停止（抓取保持，其它制动）并返回 `true`。
    pub fn gripper_action(
        &self,
        hw: &mut ArmHardware,
        action: Action,
        service: ServiceKind,
    ) -> Result<bool, HardwareError> {
        hw.shoulder.stop(BrakeMode::Brake)?;
        hw.elbow.stop(BrakeMode::Brake)?;

        let direction = if action == Action::Open {
            Direction::Forward
        } else {
            Direction::Reverse
        };
        hw.gripper.spin(direction, self.gripper_rpm)?;

        let current = hw.gripper.current()?;
        let threshold = self.current_threshold(service);
        if current >= threshold {
            let mode = if service == ServiceKind::Pick {
                BrakeMode::Hold
            } else {
                BrakeMode::Brake
            };
            hw.gripper.stop(mode)?;
            debug!(
                "Gripper {} done for {} ({:.2} A >= {:.2} A)",
                action, service, current, threshold
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// 未安装的传感器
    pub fn check_sensors(&self, hw: &ArmHardware) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !hw.base_distance.is_installed() {
            missing.push("base_distance");
        }
        if !hw.gripper_distance.is_installed() {
            missing.push("gripper_distance");
        }
        if !hw.bumper.is_installed() {
            missing.push("bumper");
        }
        missing
    }
}
