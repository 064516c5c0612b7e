//! 驱动层模块
//!
//! 本模块提供分拣机械臂主机侧的链路管理，包括：
//! - IO 线程管理（读取、分帧、发送队列）
//! - 状态同步（ArcSwap 无锁读取）
//! - 按消息类型注册的回调
//! - 检测结果的异步分类
//! - 带超时的等待接口
//!
//! 大多数用户应该使用 `sortbot-control` 提供的分拣流程接口。

mod builder;
mod error;
pub mod hooks;
mod link;
pub mod pipeline;
pub mod state;
pub mod vision;

pub use builder::LinkBuilder;
pub use error::DriverError;
pub use hooks::{CallbackRegistry, MessageCallback};
pub use link::ArmLink;
pub use pipeline::{LinkConfig, dispatch_message, io_loop};
pub use state::*;
pub use vision::{
    Camera, Classification, Classifier, DEFAULT_CLASS, DEFAULT_CONFIDENCE_THRESHOLD,
    DetectionModel, ImageHandle, KNOWN_CLASSES, ThresholdClassifier, VisionError,
    VisionPipeline,
};
