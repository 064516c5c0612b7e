//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use sortbot_sdk::prelude::*;
//! ```

pub use sortbot_control::{ArmController, ControllerConfig, PlacementZones, ScanEntry};
pub use sortbot_driver::{ArmLink, LinkBuilder};
pub use sortbot_protocol::{Action, Joint, MessageType, MotionRequest};

// 错误类型
pub use sortbot_control::ControlError;
pub use sortbot_driver::DriverError;
pub use sortbot_protocol::ProtocolError;
