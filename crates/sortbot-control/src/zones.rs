//! 放置区配置
//!
//! 物体类别 -> 放置位置（底座角度 + 手臂距离）。类别名不区分大小写，
//! 未配置的类别落到 `default` 区。

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// 兜底类别名
pub const DEFAULT_ZONE: &str = "default";

/// 单个放置区
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementZone {
    /// 底座角度（度）
    pub angle: f64,
    /// 手臂距离（毫米）
    pub distance: f64,
}

impl PlacementZone {
    pub const fn new(angle: f64, distance: f64) -> Self {
        Self { angle, distance }
    }
}

/// 连 `default` 都没有配置时使用
const FALLBACK_ZONE: PlacementZone = PlacementZone::new(270.0, 200.0);

/// 放置区表
///
/// TOML 中每个类别是一张表：
///
/// ```toml
/// [apple]
/// angle = 90.0
/// distance = 200.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlacementZones {
    zones: BTreeMap<String, PlacementZone>,
}

impl Default for PlacementZones {
    fn default() -> Self {
        let zones = [
            ("apple", PlacementZone::new(90.0, 200.0)),
            ("orange", PlacementZone::new(180.0, 200.0)),
            ("bottle", PlacementZone::new(45.0, 200.0)),
            (DEFAULT_ZONE, FALLBACK_ZONE),
        ]
        .into_iter()
        .map(|(class, zone)| (class.to_string(), zone))
        .collect();
        Self { zones }
    }
}

impl PlacementZones {
    /// 空表（查询全部落到内置兜底位置）
    pub fn empty() -> Self {
        Self {
            zones: BTreeMap::new(),
        }
    }

    /// 查询类别的放置区
    pub fn get(&self, class: &str) -> PlacementZone {
        let key = class.to_ascii_lowercase();
        self.zones
            .get(&key)
            .or_else(|| self.zones.get(DEFAULT_ZONE))
            .copied()
            .unwrap_or(FALLBACK_ZONE)
    }

    /// 是否显式配置了该类别
    pub fn contains(&self, class: &str) -> bool {
        self.zones.contains_key(&class.to_ascii_lowercase())
    }

    /// 设置类别的放置区，返回旧值
    pub fn set(&mut self, class: &str, zone: PlacementZone) -> Option<PlacementZone> {
        self.zones.insert(class.to_ascii_lowercase(), zone)
    }

    pub fn remove(&mut self, class: &str) -> Option<PlacementZone> {
        self.zones.remove(&class.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlacementZone)> {
        self.zones.iter().map(|(class, zone)| (class.as_str(), zone))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// 从 TOML 文本解析，类别名统一转小写
    pub fn from_toml_str(content: &str) -> Result<Self, ControlError> {
        let raw: BTreeMap<String, PlacementZone> = toml::from_str(content)?;
        let zones: BTreeMap<_, _> = raw
            .into_iter()
            .map(|(class, zone)| (class.to_ascii_lowercase(), zone))
            .collect();
        if !zones.contains_key(DEFAULT_ZONE) {
            warn!(
                "Placement zones have no '{}' entry, unknown classes go to {:?}",
                DEFAULT_ZONE, FALLBACK_ZONE
            );
        }
        Ok(Self { zones })
    }

    pub fn to_toml_string(&self) -> Result<String, ControlError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ControlError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let zones = Self::from_toml_str(&content)?;
        debug!("Loaded {} placement zones from {}", zones.len(), path.display());
        Ok(zones)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ControlError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| ControlError::WriteConfig {
            path: path.to_path_buf(),
            source,
        })
    }
}
