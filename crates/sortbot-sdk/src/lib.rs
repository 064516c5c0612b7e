//! Sortbot SDK - 分拣机械臂 Rust SDK
//!
//! 主机通过串口与机械臂控制器交换 JSON 行消息，控制器按服务逐拍驱动关节。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): `{type, data}` 信封与各服务载荷、行帧编解码
//! - **传输层** (`transport`): 串口与进程内管道
//! - **驱动层** (`driver`): IO 线程、回调、等待器、异步分类
//! - **控制层** (`control`): 扫描登记、放置区、抓取/放置序列
//! - **板载层** (`onboard`): 控制器侧的服务状态机与运行时
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use sortbot_sdk::prelude::*;
//!
//! let link = LinkBuilder::new().port("/dev/ttyUSB0").connect()?;
//! let controller = ArmController::new(link, PlacementZones::default());
//! controller.check()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use sortbot_control as control;
pub use sortbot_driver as driver;
pub use sortbot_onboard as onboard;
pub use sortbot_protocol as protocol;
pub use sortbot_transport as transport;

pub mod prelude;
#[cfg(feature = "sim")]
pub mod simulation;

// 常用类型
pub use sortbot_control::{
    ArmController, ControlError, ControllerConfig, PlacementZone, PlacementZones, ScanEntry,
};
pub use sortbot_driver::{ArmLink, DriverError, LinkBuilder, LinkConfig};
pub use sortbot_onboard::{OnboardConfig, OnboardError, OnboardRuntime};
pub use sortbot_protocol::{Message, MessageType, ProtocolError};
pub use sortbot_transport::{Transport, TransportError};

#[cfg(feature = "sim")]
pub use simulation::SimulatedArm;
