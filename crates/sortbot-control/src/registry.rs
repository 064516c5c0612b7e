//! 扫描登记表
//!
//! 记录一次扫描中识别出的物体，并为每个物体确定放置区。
//! 序号从 1 开始，按登记顺序递增。

use crate::zones::{DEFAULT_ZONE, PlacementZone, PlacementZones};
use serde::{Deserialize, Serialize};
use sortbot_protocol::{Detection, ObjectRecord};
use tracing::{debug, info};

/// 未分类物体的类别名
pub const UNCLASSIFIED: &str = "unknown";

/// 物体位置（底座坐标）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectPosition {
    pub angle: f64,
    pub distance: f64,
}

/// 分类信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionInfo {
    pub class: String,
    pub confidence: f64,
    /// 检测时拍摄的图像路径（可能为空）
    pub image: String,
}

/// 登记表条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub index: usize,
    pub position: ObjectPosition,
    pub detection: DetectionInfo,
    pub placement_zone: PlacementZone,
}

impl ScanEntry {
    pub fn class(&self) -> &str {
        &self.detection.class
    }

    pub fn is_classified(&self) -> bool {
        self.detection.class != UNCLASSIFIED
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanRegistry {
    entries: Vec<ScanEntry>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        position: ObjectPosition,
        detection: DetectionInfo,
        zones: &PlacementZones,
    ) -> &ScanEntry {
        let placement_zone = zones.get(&detection.class);
        let index = self.entries.len() + 1;
        self.entries.push(ScanEntry {
            index,
            position,
            detection,
            placement_zone,
        });
        &self.entries[index - 1]
    }

    /// 登记一次带分类的检测，未分类的检测被忽略
    pub fn record_detection(
        &mut self,
        detection: &Detection,
        zones: &PlacementZones,
    ) -> Option<&ScanEntry> {
        let class = detection.class.as_deref()?;
        let entry = self.push(
            ObjectPosition {
                angle: detection.angle,
                distance: detection.distance,
            },
            DetectionInfo {
                class: class.to_string(),
                confidence: detection.confidence.unwrap_or(0.0),
                image: detection.image_path.clone().unwrap_or_default(),
            },
            zones,
        );
        info!(
            "Obj {} -> angle: {:.1}°, distance: {:.0}mm, class: {}, conf: {:.2}",
            entry.index,
            entry.position.angle,
            entry.position.distance,
            entry.detection.class,
            entry.detection.confidence
        );
        Some(entry)
    }

    /// 登记扫描结束时聚合出的物体（无分类，使用默认放置区）
    pub fn record_objects(&mut self, objects: &[ObjectRecord], zones: &PlacementZones) -> usize {
        for object in objects {
            let entry = self.push(
                ObjectPosition {
                    angle: object.center_angle,
                    distance: object.distance,
                },
                DetectionInfo {
                    class: UNCLASSIFIED.to_string(),
                    confidence: 0.0,
                    image: String::new(),
                },
                zones,
            );
            debug!(
                "Obj {} -> angle: {:.1}°, width: {:.1}°, distance: {:.0}mm (zone '{}')",
                entry.index, object.center_angle, object.width, object.distance, DEFAULT_ZONE
            );
        }
        objects.len()
    }

    pub fn entries(&self) -> &[ScanEntry] {
        &self.entries
    }

    /// 按序号查找（从 1 开始）
    pub fn get(&self, index: usize) -> Option<&ScanEntry> {
        self.entries.iter().find(|e| e.index == index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(angle: f64, class: &str) -> Detection {
        let mut detection = Detection::new(angle, 150.0, 4);
        detection.class = Some(class.to_string());
        detection.confidence = Some(0.87);
        detection.image_path = Some(format!("/tmp/{}.jpg", class));
        detection
    }

    #[test]
    fn test_record_detection_assigns_zone() {
        let zones = PlacementZones::default();
        let mut registry = ScanRegistry::new();

        let entry = registry
            .record_detection(&classified(30.0, "Orange"), &zones)
            .unwrap()
            .clone();
        assert_eq!(entry.index, 1);
        assert_eq!(entry.position, ObjectPosition { angle: 30.0, distance: 150.0 });
        assert_eq!(entry.detection.class, "Orange");
        assert_eq!(entry.detection.image, "/tmp/Orange.jpg");
        assert_eq!(entry.placement_zone, zones.get("orange"));
        assert!(entry.is_classified());
    }

    #[test]
    fn test_unclassified_detection_is_ignored() {
        let mut registry = ScanRegistry::new();
        let raw = Detection::new(10.0, 100.0, 2);
        assert!(registry.record_detection(&raw, &PlacementZones::default()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_record_objects_uses_default_zone() {
        let zones = PlacementZones::default();
        let mut registry = ScanRegistry::new();
        registry.record_detection(&classified(30.0, "apple"), &zones);

        let objects = vec![ObjectRecord {
            center_angle: 200.0,
            width: 12.0,
            distance: 180.0,
            max_size: 6,
        }];
        assert_eq!(registry.record_objects(&objects, &zones), 1);

        let entry = registry.get(2).unwrap();
        assert_eq!(entry.class(), UNCLASSIFIED);
        assert!(!entry.is_classified());
        assert_eq!(entry.placement_zone, zones.get(DEFAULT_ZONE));
        assert_eq!(entry.position.angle, 200.0);
    }

    #[test]
    fn test_get_and_clear() {
        let zones = PlacementZones::default();
        let mut registry = ScanRegistry::new();
        registry.record_detection(&classified(30.0, "apple"), &zones);
        registry.record_detection(&classified(60.0, "bottle"), &zones);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(2).unwrap().class(), "bottle");
        assert!(registry.get(0).is_none());
        assert!(registry.get(3).is_none());

        registry.clear();
        assert!(registry.entries().is_empty());
    }
}
