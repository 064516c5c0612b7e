//! 板载运行参数

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 距离区间（毫米，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceRange {
    pub min: f64,
    pub max: f64,
}

impl DistanceRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, distance: f64) -> bool {
        self.min <= distance && distance <= self.max
    }
}

/// 板载配置
///
/// 所有时间字段以毫秒计。
///
/// # Example
///
/// ```
/// use sortbot_onboard::OnboardConfig;
/// use std::time::Duration;
///
/// let config = OnboardConfig::default();
/// assert_eq!(config.tick(), Duration::from_millis(10));
/// assert_eq!(config.scan_timeout(), Duration::from_secs(40));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardConfig {
    /// 主循环节拍
    pub tick_ms: u64,
    /// 定位死区（度）
    pub dead_band_deg: f64,
    /// 扫描超时
    pub scan_timeout_ms: u64,
    /// 请求未给出转速时的扫描转速（RPM）
    pub default_scan_speed: f64,
    /// 检测到目标后的停留时间
    pub detection_dwell_ms: u64,
    /// 扫描传感器有效距离
    pub scan_range: DistanceRange,
    /// 夹爪传感器有效距离
    pub grip_range: DistanceRange,
    /// 单个关节动作的截止时间
    pub pick_deadline_ms: u64,
    /// 放置时手臂下降时长
    pub place_dwell_ms: u64,
    /// 安全服务截止时间
    pub safety_deadline_ms: u64,
    /// 碰到限位后肩部回退时长
    pub retreat_ms: u64,
    /// 底座偏置（目标 > 180° 时减，否则加）
    pub base_bias_deg: f64,
    /// 底座微调（总是加）
    pub base_trim_deg: f64,
    /// 底座默认转速（RPM）
    pub base_default_speed: f64,
    /// 夹爪转速（RPM）
    pub gripper_rpm: f64,
    /// 抬臂时肘部补偿转速（RPM）
    pub elbow_compensation_rpm: f64,
    /// 抓取时夹爪电流阈值（安培）
    pub pick_current_threshold: f64,
    /// 其它服务的夹爪电流阈值（安培）
    pub release_current_threshold: f64,
}

impl Default for OnboardConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            dead_band_deg: 2.0,
            scan_timeout_ms: 40_000,
            default_scan_speed: 20.0,
            detection_dwell_ms: 2_000,
            scan_range: DistanceRange::new(50.0, 345.0),
            grip_range: DistanceRange::new(0.0, 40.0),
            pick_deadline_ms: 20_000,
            place_dwell_ms: 3_000,
            safety_deadline_ms: 30_000,
            retreat_ms: 2_000,
            base_bias_deg: 4.0,
            base_trim_deg: 4.0,
            base_default_speed: 20.0,
            gripper_rpm: 20.0,
            elbow_compensation_rpm: 40.0,
            pick_current_threshold: 0.5,
            release_current_threshold: 0.3,
        }
    }
}

impl OnboardConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn detection_dwell(&self) -> Duration {
        Duration::from_millis(self.detection_dwell_ms)
    }

    pub fn pick_deadline(&self) -> Duration {
        Duration::from_millis(self.pick_deadline_ms)
    }

    pub fn place_dwell(&self) -> Duration {
        Duration::from_millis(self.place_dwell_ms)
    }

    pub fn safety_deadline(&self) -> Duration {
        Duration::from_millis(self.safety_deadline_ms)
    }

    pub fn retreat(&self) -> Duration {
        Duration::from_millis(self.retreat_ms)
    }

    /// 底座目标角的偏置修正
    pub fn biased_base_target(&self, target: f64) -> f64 {
        let biased = if target > 180.0 {
            target - self.base_bias_deg
        } else {
            target + self.base_bias_deg
        };
        biased + self.base_trim_deg
    }
}
