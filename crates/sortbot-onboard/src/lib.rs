//! # Sortbot Onboard
//!
//! 机械臂控制器侧逻辑：硬件抽象、关节控制、安全动作、感知、建图与服务状态机。
//!
//! ## 模块
//!
//! - `hal`: 电机、传感器、指示灯、屏幕和时钟的 trait，以及 `ArmHardware` 整机捆绑
//! - `control`: 角度归一化、逐拍定位、整机停止
//! - `safety`: 肩部限位复位、夹爪电流判定
//! - `perception`: 距离读数到检测结果的转换
//! - `mapping`: 扫描中把连续检测聚合为物体记录
//! - `services`: check / safety / scan / pick / place 的逐拍任务
//! - `runtime`: 读请求、推进任务、写回复的主循环
//! - `sim`: 仿真硬件（`sim` feature）
//!
//! ## Example
//!
//! ```no_run
//! use sortbot_onboard::{OnboardConfig, OnboardRuntime, SystemClock};
//! # use sortbot_onboard::ArmHardware;
//! # use sortbot_transport::MemoryTransport;
//! # use std::sync::Arc;
//! # fn hardware() -> ArmHardware { unimplemented!() }
//! # let (_host, transport) = MemoryTransport::pair(std::time::Duration::from_millis(50));
//!
//! let mut runtime = OnboardRuntime::new(
//!     transport,
//!     hardware(),
//!     Arc::new(SystemClock::new()),
//!     OnboardConfig::default(),
//! );
//! runtime.run()?;
//! # Ok::<(), sortbot_onboard::OnboardError>(())
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod hal;
pub mod mapping;
pub mod perception;
pub mod runtime;
pub mod safety;
pub mod services;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use config::{DistanceRange, OnboardConfig};
pub use control::{ControlModule, SeekStatus, normalize_angle, shortest_delta};
pub use error::{HardwareError, OnboardError, ServiceError};
pub use hal::{
    ArmHardware, BrakeMode, Bumper, Clock, Direction, Display, DistanceSensor, HeadingSensor,
    Indicator, LedColor, Motor, MotorJoint, RangeSensor, SystemClock,
};
pub use mapping::{DetectionAccumulator, MappingAggregator};
pub use perception::{PerceptionModule, Reading};
pub use runtime::OnboardRuntime;
pub use safety::SafetyModule;
pub use services::{ServiceKind, ServiceState};
