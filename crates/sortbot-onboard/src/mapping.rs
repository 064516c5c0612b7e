//! 扫描建图：把逐拍的检测读数聚合成物体记录
//!
//! 一段连续检测到目标的角度区间对应一条记录。区间跨越 0°/360° 时宽度按回绕计算。

use crate::control::normalize_angle;
use sortbot_protocol::ObjectRecord;
use tracing::debug;

/// 正在累积的检测区间
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionAccumulator {
    pub start_angle: f64,
    pub end_angle: f64,
    pub max_size: u32,
    /// 区间起点处的距离
    pub distance: f64,
    pub tracking: bool,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Default)]
pub struct MappingAggregator {
    current: DetectionAccumulator,
    objects: Vec<ObjectRecord>,
}

impl MappingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一拍读数
    ///
    /// `size > 0` 时开始或延伸当前区间；`size == 0` 且区间打开时，
    /// 以本拍角度作为终点结束区间。
    pub fn process(&mut self, angle: f64, size: u32, distance: f64) {
        if size > 0 {
            if self.current.tracking {
                self.current.end_angle = angle;
                self.current.max_size = self.current.max_size.max(size);
            } else {
                self.current = DetectionAccumulator {
                    start_angle: angle,
                    end_angle: angle,
                    max_size: size,
                    distance,
                    tracking: true,
                };
            }
        } else if self.current.tracking {
            self.close(angle);
        }
    }

    /// 扫描结束时关闭仍然打开的区间
    pub fn finish(&mut self, angle: f64) {
        if self.current.tracking {
            self.close(angle);
        }
    }

    fn close(&mut self, end_angle: f64) {
        let start = self.current.start_angle;
        let total = if end_angle >= start {
            end_angle - start
        } else {
            end_angle + 360.0 - start
        };
        let center = normalize_angle(start + total / 2.0);

        let record = ObjectRecord {
            center_angle: normalize_angle(round1(center)),
            width: round1(total),
            distance: self.current.distance,
            max_size: self.current.max_size,
        };
        debug!(
            "Object mapped at {:.1}° (width {:.1}°, size {})",
            record.center_angle, record.width, record.max_size
        );
        self.objects.push(record);
        self.current = DetectionAccumulator::default();
    }

    pub fn is_tracking(&self) -> bool {
        self.current.tracking
    }

    pub fn current(&self) -> &DetectionAccumulator {
        &self.current
    }

    pub fn objects(&self) -> &[ObjectRecord] {
        &self.objects
    }

    /// 取走已完成的记录
    pub fn take_objects(&mut self) -> Vec<ObjectRecord> {
        std::mem::take(&mut self.objects)
    }

    pub fn reset(&mut self) {
        self.current = DetectionAccumulator::default();
        self.objects.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sweep(aggregator: &mut MappingAggregator, angles: &[f64], size: u32) {
        for &angle in angles {
            aggregator.process(angle, size, 120.0);
        }
    }

    #[test]
    fn test_single_arc() {
        let mut aggregator = MappingAggregator::new();
        aggregator.process(80.0, 0, 999.0);
        aggregator.process(82.5, 3, 120.0);
        aggregator.process(90.0, 5, 118.0);
        aggregator.process(97.5, 4, 121.0);
        aggregator.process(98.7, 0, 999.0);

        let objects = aggregator.take_objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].center_angle, 90.6);
        assert_eq!(objects[0].width, 16.2);
        assert_eq!(objects[0].distance, 120.0);
        assert_eq!(objects[0].max_size, 5);
        assert!(aggregator.take_objects().is_empty());
    }

    #[test]
    fn test_arc_across_seam_is_one_record() {
        let mut aggregator = MappingAggregator::new();
        let seen: Vec<f64> = (350..360).chain(0..10).map(f64::from).collect();
        sweep(&mut aggregator, &seen, 2);
        aggregator.process(10.0, 0, 999.0);

        let objects = aggregator.take_objects();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].center_angle, 0.0);
        assert_eq!(objects[0].width, 20.0);
    }

    #[test]
    fn test_finish_flushes_open_arc() {
        let mut aggregator = MappingAggregator::new();
        sweep(&mut aggregator, &[300.0, 301.0, 302.0], 1);
        assert!(aggregator.is_tracking());
        aggregator.finish(303.0);
        assert!(!aggregator.is_tracking());
        assert_eq!(aggregator.objects()[0].width, 3.0);

        // 没有打开的区间时 finish 无效果
        aggregator.finish(304.0);
        assert_eq!(aggregator.objects().len(), 1);
    }

    #[test]
    fn test_two_arcs_and_reset() {
        let mut aggregator = MappingAggregator::new();
        sweep(&mut aggregator, &[10.0, 12.0], 1);
        aggregator.process(14.0, 0, 0.0);
        sweep(&mut aggregator, &[200.0, 202.0], 7);
        aggregator.process(204.0, 0, 0.0);
        assert_eq!(aggregator.objects().len(), 2);
        assert_eq!(aggregator.objects()[1].max_size, 7);

        aggregator.process(210.0, 3, 0.0);
        aggregator.reset();
        assert!(!aggregator.is_tracking());
        assert!(aggregator.objects().is_empty());
    }

    proptest! {
        /// 全零读数不产生记录
        #[test]
        fn zero_size_stream_yields_nothing(
            angles in proptest::collection::vec(0.0..360.0f64, 0..200),
        ) {
            let mut aggregator = MappingAggregator::new();
            for angle in angles {
                aggregator.process(angle, 0, 100.0);
            }
            aggregator.finish(0.0);
            prop_assert!(aggregator.take_objects().is_empty());
        }

        /// 任意起点的连续区间：宽度正确，中心在 [0, 360)
        #[test]
        fn contiguous_arc_width(start in 0.0..360.0f64, width in 1.0..120.0f64) {
            let mut aggregator = MappingAggregator::new();
            aggregator.process(normalize_angle(start), 3, 100.0);
            aggregator.process(normalize_angle(start + width / 2.0), 3, 100.0);
            aggregator.process(normalize_angle(start + width), 0, 100.0);

            let objects = aggregator.take_objects();
            prop_assert_eq!(objects.len(), 1);
            prop_assert!((objects[0].width - width).abs() <= 0.11);
            prop_assert!((0.0..360.0).contains(&objects[0].center_angle));
        }
    }
}
