//! 输入验证模块

use sortbot_sdk::PlacementZone;
use thiserror::Error;

/// 底座最大转速（RPM）
pub const MAX_SPEED_RPM: f64 = 100.0;

/// 输入错误
#[derive(Error, Debug, PartialEq)]
pub enum InputError {
    #[error("invalid number '{0}'")]
    NotANumber(String),

    #[error("speed {0} out of range (0, {max}]", max = MAX_SPEED_RPM)]
    SpeedOutOfRange(f64),

    #[error("angle {0} out of range [0, 360)")]
    AngleOutOfRange(f64),

    #[error("distance must be positive, got {0}")]
    InvalidDistance(f64),

    #[error("expected <class>=<angle>,<distance>, got '{0}'")]
    ZoneFormat(String),

    #[error("object {index} not found ({count} objects scanned)")]
    UnknownObject { index: usize, count: usize },
}

fn parse_number(s: &str) -> Result<f64, InputError> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| InputError::NotANumber(s.trim().to_string()))?;
    if !value.is_finite() {
        return Err(InputError::NotANumber(s.trim().to_string()));
    }
    Ok(value)
}

/// 解析转速（clap `value_parser`）
pub fn parse_speed(s: &str) -> Result<f64, InputError> {
    let speed = parse_number(s)?;
    if speed <= 0.0 || speed > MAX_SPEED_RPM {
        return Err(InputError::SpeedOutOfRange(speed));
    }
    Ok(speed)
}

/// 解析放置区 `<class>=<angle>,<distance>`
pub fn parse_zone(s: &str) -> Result<(String, PlacementZone), InputError> {
    let format_err = || InputError::ZoneFormat(s.to_string());

    let (class, rest) = s.split_once('=').ok_or_else(format_err)?;
    let (angle, distance) = rest.split_once(',').ok_or_else(format_err)?;
    let class = class.trim();
    if class.is_empty() {
        return Err(format_err());
    }

    let angle = parse_number(angle)?;
    if !(0.0..360.0).contains(&angle) {
        return Err(InputError::AngleOutOfRange(angle));
    }
    let distance = parse_number(distance)?;
    if distance <= 0.0 {
        return Err(InputError::InvalidDistance(distance));
    }

    Ok((class.to_lowercase(), PlacementZone::new(angle, distance)))
}

/// 物体序号从 1 开始
pub fn validate_index(index: usize, count: usize) -> Result<usize, InputError> {
    if index == 0 || index > count {
        return Err(InputError::UnknownObject { index, count });
    }
    Ok(index)
}
