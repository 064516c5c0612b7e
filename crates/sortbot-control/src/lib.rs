//! # Sortbot Control
//!
//! 主机侧分拣流程：扫描登记、放置区查询、抓取/放置动作序列与失败恢复。
//!
//! ## Example
//!
//! ```no_run
//! use sortbot_control::{ArmController, PlacementZones};
//! use sortbot_driver::LinkBuilder;
//!
//! let link = LinkBuilder::new().port("/dev/ttyUSB0").connect()?;
//! let controller = ArmController::new(link, PlacementZones::default());
//!
//! controller.check()?;
//! controller.safety()?;
//! let entries = controller.scan_default()?;
//! if let Some(first) = entries.first() {
//!     controller.pick_and_place(first.index)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod controller;
mod error;
pub mod registry;
pub mod sequence;
pub mod zones;

pub use controller::{ArmController, ControllerConfig};
pub use error::ControlError;
pub use registry::{DetectionInfo, ObjectPosition, ScanEntry, ScanRegistry, UNCLASSIFIED};
pub use sequence::{SequenceRunner, pick_plan, place_plan, safe_pose_plan};
pub use zones::{DEFAULT_ZONE, PlacementZone, PlacementZones};
