//! 距离传感器读数处理

use crate::config::DistanceRange;
use crate::error::HardwareError;
use crate::hal::{ArmHardware, LedColor, RangeSensor};

/// 单次读数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub distance: f64,
    /// 区间外为 0
    pub size: u32,
    pub detected: bool,
}

/// 感知模块
///
/// 读数落在区间内视为检测到目标（绿灯），否则尺寸记 0（蓝灯）。
#[derive(Debug, Default)]
pub struct PerceptionModule {
    current_object_size: u32,
    object_detected: bool,
}

impl PerceptionModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_sensor_distance(
        &mut self,
        hw: &mut ArmHardware,
        sensor: RangeSensor,
        range: DistanceRange,
    ) -> Result<Reading, HardwareError> {
        let distance = hw.range_sensor(sensor).distance_mm()?;

        if range.contains(distance) {
            self.current_object_size = hw.range_sensor(sensor).raw_size()?;
            self.object_detected = true;
            hw.set_color(LedColor::Ready)?;
        } else {
            self.current_object_size = 0;
            self.object_detected = false;
            hw.set_color(LedColor::Running)?;
        }

        Ok(Reading {
            distance,
            size: self.current_object_size,
            detected: self.object_detected,
        })
    }

    pub fn object_detected(&self) -> bool {
        self.object_detected
    }

    pub fn current_object_size(&self) -> u32 {
        self.current_object_size
    }
}
