//! 服务载荷定义
//!
//! 与 `MessageType` 一一对应的请求/响应结构体。字段名即线上 JSON 键名。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 默认扫描转速（RPM）
pub const DEFAULT_SCAN_SPEED: f64 = 20.0;

fn default_scan_speed() -> f64 {
    DEFAULT_SCAN_SPEED
}

// ============================================================================
// 扫描服务
// ============================================================================

/// `scan_service` 请求
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// 底座转速（RPM）
    #[serde(default = "default_scan_speed")]
    pub speed: f64,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SCAN_SPEED,
        }
    }
}

/// 一次完整旋转中聚合出的物体记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// 中心角（度，[0, 360)）
    pub center_angle: f64,
    /// 角宽度（度）
    pub width: f64,
    /// 距离（毫米）
    pub distance: f64,
    /// 检测期间的最大原始尺寸
    pub max_size: u32,
}

/// 扫描中的单次检测
///
/// `class` 之后的字段由主机侧分类后合并，控制器不发送。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub angle: f64,
    pub distance: f64,
    pub size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl Detection {
    pub fn new(angle: f64, distance: f64, size: u32) -> Self {
        Self {
            angle,
            distance,
            size,
            class: None,
            confidence: None,
            timestamp: None,
            image_path: None,
        }
    }

    /// 是否已带分类结果
    pub fn is_classified(&self) -> bool {
        self.class.is_some()
    }
}

/// `scan_service` 事件（按 `state` 区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanEvent {
    Detected(Detection),
    Complete { objects: Vec<ObjectRecord> },
    Error { error_msg: String },
}

// ============================================================================
// 抓取/放置服务
// ============================================================================

/// 可寻址关节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    Base,
    Arm,
    Gripper,
}

impl Joint {
    pub const ALL: [Joint; 3] = [Joint::Base, Joint::Arm, Joint::Gripper];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Joint::Base => "base",
            Joint::Arm => "arm",
            Joint::Gripper => "gripper",
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 关节动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Pick,
    Place,
    Up,
    Open,
    Close,
}

impl Action {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Action::Pick => "pick",
            Action::Place => "place",
            Action::Up => "up",
            Action::Open => "open",
            Action::Close => "close",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `pick_service` / `place_service` 请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    pub joint: Joint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl MotionRequest {
    /// 底座转到目标角度
    pub fn base(angle: f64, speed: f64) -> Self {
        Self {
            joint: Joint::Base,
            angle: Some(angle),
            distance: None,
            action: None,
            speed: Some(speed),
        }
    }

    /// 手臂动作（pick / place / up）
    pub fn arm(distance: f64, action: Action) -> Self {
        Self {
            joint: Joint::Arm,
            angle: None,
            distance: Some(distance),
            action: Some(action),
            speed: None,
        }
    }

    /// 夹爪动作（open / close）
    pub fn gripper(action: Action) -> Self {
        Self {
            joint: Joint::Gripper,
            angle: None,
            distance: None,
            action: Some(action),
            speed: None,
        }
    }
}

/// 关节动作结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    Completed,
    Error,
}

/// `pick_service` / `place_service` 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionReport {
    pub joint: Joint,
    pub state: MotionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_angle: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MotionReport {
    pub fn completed(joint: Joint) -> Self {
        Self {
            joint,
            state: MotionState::Completed,
            target_angle: None,
            actual_angle: None,
            accuracy: None,
            error: None,
        }
    }

    pub fn failed(joint: Joint, error: impl Into<String>) -> Self {
        Self {
            joint,
            state: MotionState::Error,
            target_angle: None,
            actual_angle: None,
            accuracy: None,
            error: Some(error.into()),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == MotionState::Completed && self.error.is_none()
    }
}

// ============================================================================
// 自检 / 安全服务
// ============================================================================

/// 服务结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportState {
    Approved,
    Error,
}

/// `check_service` / `safety_service` 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub state: ReportState,
    /// 耗时（秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl ServiceReport {
    pub fn approved() -> Self {
        Self {
            state: ReportState::Approved,
            time: None,
            error_msg: None,
        }
    }

    pub fn failed(error_msg: impl Into<String>) -> Self {
        Self {
            state: ReportState::Error,
            time: None,
            error_msg: Some(error_msg.into()),
        }
    }

    pub fn with_time(mut self, secs: f64) -> Self {
        self.time = Some(secs);
        self
    }

    pub fn is_approved(&self) -> bool {
        self.state == ReportState::Approved
    }
}

/// `check_error` 载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckError {
    pub error: String,
}

/// `error` 载荷（服务外的通用故障）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub msg: String,
}

/// `current_angles` 响应：关节名 -> 角度（度）
pub type CurrentAngles = BTreeMap<String, f64>;
