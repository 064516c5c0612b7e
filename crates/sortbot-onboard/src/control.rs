//! 关节定位与急停
//!
//! 底座是连续旋转关节，位置取航向传感器读数，误差按最短路径计算；
//! 其它关节直接使用编码器位置。

use crate::config::OnboardConfig;
use crate::error::{HardwareError, ServiceError};
use crate::hal::{ArmHardware, BrakeMode, Clock, Direction, MotorJoint};
use std::time::Duration;
use tracing::{debug, error, trace};

/// 角度归一化到 [0, 360)
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid 对极小的负数可能返回 360.0
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// 从 `current` 转到 `target` 的最短有符号角度差，范围 (-180, 180]
pub fn shortest_delta(current: f64, target: f64) -> f64 {
    let delta = (target - current).rem_euclid(360.0);
    if delta > 180.0 { delta - 360.0 } else { delta }
}

/// 单拍定位结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekStatus {
    /// 仍在转动，`delta` 为剩余误差
    Moving { delta: f64 },
    /// 已进入死区并停止
    Arrived { position: f64, delta: f64 },
}

/// 控制模块
#[derive(Debug, Clone, Copy)]
pub struct ControlModule {
    dead_band: f64,
    tick: Duration,
}

impl ControlModule {
    pub fn new(config: &OnboardConfig) -> Self {
        Self {
            dead_band: config.dead_band_deg,
            tick: config.tick(),
        }
    }

    pub fn dead_band(&self) -> f64 {
        self.dead_band
    }

    /// 关节当前位置（底座为航向）
    pub fn position(&self, hw: &ArmHardware, joint: MotorJoint) -> Result<f64, HardwareError> {
        match joint {
            MotorJoint::Base => hw.heading.heading(),
            _ => hw.motor(joint).position(),
        }
    }

    pub fn current(&self, hw: &ArmHardware, joint: MotorJoint) -> Result<f64, HardwareError> {
        hw.motor(joint).current()
    }

    fn error_to(&self, joint: MotorJoint, current: f64, target: f64) -> f64 {
        match joint {
            MotorJoint::Base => shortest_delta(current, normalize_angle(target)),
            _ => target - current,
        }
    }

    /// 定位一拍：在死区内则制动停止，否则朝目标方向转动
    pub fn seek_step(
        &self,
        hw: &mut ArmHardware,
        joint: MotorJoint,
        target: f64,
        rpm: f64,
    ) -> Result<SeekStatus, HardwareError> {
        let position = self.position(hw, joint)?;
        let delta = self.error_to(joint, position, target);

        if delta.abs() <= self.dead_band {
            hw.motor_mut(joint).stop(BrakeMode::Brake)?;
            debug!("{} arrived at {:.1} (error {:.2})", joint, position, delta);
            return Ok(SeekStatus::Arrived { position, delta });
        }

        trace!("{} at {:.1}, {:.1} to go", joint, position, delta);
        hw.motor_mut(joint).spin(Direction::from_delta(delta), rpm)?;
        Ok(SeekStatus::Moving { delta })
    }

    /// 阻塞式定位，每个节拍调用一次 `seek_step`，直到到位或超过 `deadline`
    ///
    /// 超时会先停止该关节再返回错误。
    pub fn move_to_angle(
        &self,
        hw: &mut ArmHardware,
        clock: &dyn Clock,
        joint: MotorJoint,
        target: f64,
        rpm: f64,
        deadline: Duration,
    ) -> Result<f64, ServiceError> {
        let start = clock.now();
        loop {
            if let SeekStatus::Arrived { position, .. } = self.seek_step(hw, joint, target, rpm)? {
                return Ok(position);
            }
            if clock.now().saturating_sub(start) >= deadline {
                hw.motor_mut(joint).stop(BrakeMode::Brake)?;
                return Err(ServiceError::NotReached {
                    joint,
                    target,
                    deadline,
                });
            }
            clock.sleep(self.tick);
        }
    }

    /// 停止所有关节（滑行）
    ///
    /// 单个电机失败不影响其余电机，返回第一个错误。
    pub fn general_stop(&self, hw: &mut ArmHardware) -> Result<(), HardwareError> {
        let mut first_error = None;
        for joint in MotorJoint::ALL {
            if let Err(e) = hw.motor_mut(joint).stop(BrakeMode::Coast) {
                error!("Failed to stop {}: {}", joint, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// 未安装的电机
    pub fn check_motors(&self, hw: &ArmHardware) -> Vec<&'static str> {
        MotorJoint::ALL
            .into_iter()
            .filter(|&joint| !hw.motor(joint).is_installed())
            .map(|joint| joint.device_name())
            .collect()
    }
}
