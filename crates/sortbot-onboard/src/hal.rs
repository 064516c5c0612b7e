//! 硬件抽象层
//!
//! 电机、传感器、指示灯和屏幕由外部驱动实现，这里只定义接口。
//! 执行器方法取 `&mut self`，传感器读数取 `&self`。

use crate::error::HardwareError;
use std::fmt;
use std::time::{Duration, Instant};

/// 电机转动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// 按有符号角度差选择方向
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }
}

/// 停止方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrakeMode {
    /// 断电滑行
    #[default]
    Coast,
    /// 短路制动
    Brake,
    /// 位置保持
    Hold,
}

/// 指示灯颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    /// 白：初始化
    Init,
    /// 绿：就绪
    Ready,
    /// 蓝：运行中
    Running,
    /// 橙：警告
    Warning,
    /// 红：错误或停止
    Error,
}

impl LedColor {
    pub const fn rgb(self) -> (u8, u8, u8) {
        match self {
            LedColor::Init => (255, 255, 255),
            LedColor::Ready => (0, 255, 0),
            LedColor::Running => (0, 0, 255),
            LedColor::Warning => (255, 150, 0),
            LedColor::Error => (255, 0, 0),
        }
    }
}

pub trait Motor: Send {
    /// 以给定转速（RPM）持续转动
    fn spin(&mut self, direction: Direction, rpm: f64) -> Result<(), HardwareError>;
    fn stop(&mut self, mode: BrakeMode) -> Result<(), HardwareError>;
    /// 编码器位置（度，不取模）
    fn position(&self) -> Result<f64, HardwareError>;
    /// 电流（安培）
    fn current(&self) -> Result<f64, HardwareError>;
    fn is_installed(&self) -> bool;
}

pub trait DistanceSensor: Send {
    fn distance_mm(&self) -> Result<f64, HardwareError>;
    /// 目标的原始尺寸读数，无目标时为 0
    fn raw_size(&self) -> Result<u32, HardwareError>;
    fn is_installed(&self) -> bool;
}

pub trait Bumper: Send {
    fn is_pressed(&self) -> Result<bool, HardwareError>;
    fn is_installed(&self) -> bool;
}

/// 惯性航向传感器，读数范围 [0, 360)
pub trait HeadingSensor: Send {
    fn heading(&self) -> Result<f64, HardwareError>;
}

pub trait Indicator: Send {
    fn set_color(&mut self, color: LedColor) -> Result<(), HardwareError>;
}

pub trait Display: Send {
    fn print(&mut self, text: &str) -> Result<(), HardwareError>;
}

/// 时钟
///
/// 服务状态机只通过此接口读取时间和休眠，仿真时钟推进虚拟时间。
pub trait Clock: Send + Sync {
    /// 自时钟创建以来的单调时间
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// 系统时钟（`spin_sleep` 低抖动休眠）
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    sleeper: spin_sleep::SpinSleeper,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            sleeper: spin_sleep::SpinSleeper::default(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeper.sleep(duration);
    }
}

/// 电机关节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MotorJoint {
    Base,
    Shoulder,
    Elbow,
    Gripper,
}

impl MotorJoint {
    pub const ALL: [MotorJoint; 4] = [
        MotorJoint::Base,
        MotorJoint::Shoulder,
        MotorJoint::Elbow,
        MotorJoint::Gripper,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            MotorJoint::Base => "base",
            MotorJoint::Shoulder => "shoulder",
            MotorJoint::Elbow => "elbow",
            MotorJoint::Gripper => "gripper",
        }
    }

    /// 电机设备名（用于自检报告）
    pub const fn device_name(&self) -> &'static str {
        match self {
            MotorJoint::Base => "base_motor",
            MotorJoint::Shoulder => "shoulder_motor",
            MotorJoint::Elbow => "elbow_motor",
            MotorJoint::Gripper => "gripper_motor",
        }
    }
}

impl fmt::Display for MotorJoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 距离传感器选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSensor {
    /// 底座上的扫描传感器
    Base,
    /// 夹爪上的接近传感器
    Gripper,
}

/// 整机硬件
///
/// 四个电机、航向传感器、两个距离传感器、限位开关、指示灯和屏幕。
pub struct ArmHardware {
    pub base: Box<dyn Motor>,
    pub shoulder: Box<dyn Motor>,
    pub elbow: Box<dyn Motor>,
    pub gripper: Box<dyn Motor>,
    pub heading: Box<dyn HeadingSensor>,
    pub base_distance: Box<dyn DistanceSensor>,
    pub gripper_distance: Box<dyn DistanceSensor>,
    pub bumper: Box<dyn Bumper>,
    pub indicator: Box<dyn Indicator>,
    pub display: Box<dyn Display>,
}

impl ArmHardware {
    pub fn motor(&self, joint: MotorJoint) -> &dyn Motor {
        match joint {
            MotorJoint::Base => self.base.as_ref(),
            MotorJoint::Shoulder => self.shoulder.as_ref(),
            MotorJoint::Elbow => self.elbow.as_ref(),
            MotorJoint::Gripper => self.gripper.as_ref(),
        }
    }

    pub fn motor_mut(&mut self, joint: MotorJoint) -> &mut dyn Motor {
        match joint {
            MotorJoint::Base => self.base.as_mut(),
            MotorJoint::Shoulder => self.shoulder.as_mut(),
            MotorJoint::Elbow => self.elbow.as_mut(),
            MotorJoint::Gripper => self.gripper.as_mut(),
        }
    }

    pub fn range_sensor(&self, sensor: RangeSensor) -> &dyn DistanceSensor {
        match sensor {
            RangeSensor::Base => self.base_distance.as_ref(),
            RangeSensor::Gripper => self.gripper_distance.as_ref(),
        }
    }

    pub fn set_color(&mut self, color: LedColor) -> Result<(), HardwareError> {
        self.indicator.set_color(color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_delta() {
        assert_eq!(Direction::from_delta(10.0), Direction::Forward);
        assert_eq!(Direction::from_delta(-0.5), Direction::Reverse);
        assert_eq!(Direction::Reverse.sign(), -1.0);
    }

    #[test]
    fn test_led_palette() {
        assert_eq!(LedColor::Warning.rgb(), (255, 150, 0));
        assert_eq!(LedColor::Init.rgb(), (255, 255, 255));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() >= a + Duration::from_millis(2));
    }
}
