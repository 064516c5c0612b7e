//! 分拣流程控制器
//!
//! 组合链路、放置区和扫描登记表，提供 check / safety / scan / pick-and-place。

use crate::error::ControlError;
use crate::registry::{ScanEntry, ScanRegistry};
use crate::sequence::{SequenceRunner, pick_plan, place_plan};
use crate::zones::PlacementZones;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sortbot_driver::ArmLink;
use sortbot_protocol::{
    CurrentAngles, DEFAULT_SCAN_SPEED, Message, MessageType, ScanEvent, ServiceReport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 流程超时配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 单步动作确认超时（毫秒）
    pub step_timeout_ms: u64,
    /// check / safety 结果超时（毫秒）
    pub service_timeout_ms: u64,
    /// 扫描结束超时（毫秒）
    pub scan_timeout_ms: u64,
    /// 扫描结束后等待分类结果的时间（毫秒）
    pub classification_grace_ms: u64,
    /// 默认扫描转速（RPM）
    pub scan_speed: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: 30_000,
            service_timeout_ms: 60_000,
            scan_timeout_ms: 60_000,
            classification_grace_ms: 200,
            scan_speed: DEFAULT_SCAN_SPEED,
        }
    }
}

impl ControllerConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.service_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn classification_grace(&self) -> Duration {
        Duration::from_millis(self.classification_grace_ms)
    }
}

/// 分拣控制器
pub struct ArmController {
    link: ArmLink,
    zones: Arc<PlacementZones>,
    registry: Arc<Mutex<ScanRegistry>>,
    config: ControllerConfig,
}

impl ArmController {
    pub fn new(link: ArmLink, zones: PlacementZones) -> Self {
        Self::with_config(link, zones, ControllerConfig::default())
    }

    pub fn with_config(link: ArmLink, zones: PlacementZones, config: ControllerConfig) -> Self {
        Self {
            link,
            zones: Arc::new(zones),
            registry: Arc::new(Mutex::new(ScanRegistry::new())),
            config,
        }
    }

    pub fn link(&self) -> &ArmLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut ArmLink {
        &mut self.link
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn zones(&self) -> &PlacementZones {
        &self.zones
    }

    pub fn set_zones(&mut self, zones: PlacementZones) {
        self.zones = Arc::new(zones);
    }

    /// 当前登记表快照
    pub fn entries(&self) -> Vec<ScanEntry> {
        self.registry.lock().entries().to_vec()
    }

    pub fn entry(&self, index: usize) -> Option<ScanEntry> {
        self.registry.lock().get(index).cloned()
    }

    /// 自检
    pub fn check(&self) -> Result<ServiceReport, ControlError> {
        self.link.request_check()?;
        let report = self
            .link
            .wait_for_service(MessageType::CheckService, self.config.service_timeout())?;
        info!("Check service approved");
        Ok(report)
    }

    /// 安全复位
    pub fn safety(&self) -> Result<ServiceReport, ControlError> {
        self.link.request_safety()?;
        let report = self
            .link
            .wait_for_service(MessageType::SafetyService, self.config.service_timeout())?;
        info!("Safety service approved in {:.1}s", report.time.unwrap_or(0.0));
        Ok(report)
    }

    /// 旋转扫描并重建登记表
    ///
    /// 扫描期间带分类的检测逐条登记；若整轮没有任何分类结果，
    /// 改用扫描结束时聚合出的物体（未分类，放到默认区）。
    pub fn scan(&self, speed: f64, timeout: Duration) -> Result<Vec<ScanEntry>, ControlError> {
        self.registry.lock().clear();

        let registry = self.registry.clone();
        let zones = self.zones.clone();
        self.link
            .register_callback(MessageType::ScanService.as_str(), move |message: &Message| {
                if let Ok(ScanEvent::Detected(detection)) = message.payload::<ScanEvent>() {
                    registry.lock().record_detection(&detection, &zones);
                }
            })?;

        let outcome = self
            .link
            .request_scan(speed)
            .map_err(ControlError::from)
            .and_then(|()| {
                self.link
                    .wait_for_scan_complete(timeout)
                    .map_err(ControlError::from)
            });

        if outcome.is_ok() {
            // 分类在独立线程上进行，给最后一次检测留出时间
            std::thread::sleep(self.config.classification_grace());
        }
        if let Err(e) = self.link.unregister_callback(MessageType::ScanService.as_str()) {
            warn!("Failed to unregister scan callback: {}", e);
        }
        let objects = outcome?;

        let mut registry = self.registry.lock();
        if registry.is_empty() {
            if objects.is_empty() {
                warn!("Scanning completed without object detection");
            } else {
                info!(
                    "No classified detections, registering {} mapped objects",
                    objects.len()
                );
                registry.record_objects(&objects, &self.zones);
            }
        }
        info!("=== objects scanned: {} ===", registry.len());
        Ok(registry.entries().to_vec())
    }

    /// 使用默认转速和超时扫描
    pub fn scan_default(&self) -> Result<Vec<ScanEntry>, ControlError> {
        self.scan(self.config.scan_speed, self.config.scan_timeout())
    }

    /// 抓取登记表中的物体并放到其放置区
    pub fn pick_and_place(&self, index: usize) -> Result<ScanEntry, ControlError> {
        let entry = self
            .entry(index)
            .ok_or(ControlError::ObjectNotFound(index))?;
        info!(
            "Pick & place object {}: angle {:.1}°, distance {:.0}mm, class {}",
            entry.index,
            entry.position.angle,
            entry.position.distance,
            entry.class()
        );

        let runner = SequenceRunner::new(&self.link, self.config.step_timeout());
        runner.execute(MessageType::PickService, &pick_plan(&entry))?;
        info!("Pick completed");
        runner.execute(MessageType::PlaceService, &place_plan(&entry))?;
        info!("Pick and place completed");
        Ok(entry)
    }

    /// 回到安全位姿
    pub fn recover(&self) -> Result<(), ControlError> {
        SequenceRunner::new(&self.link, self.config.step_timeout())
            .recover(MessageType::PlaceService)
    }

    /// 查询各关节角度
    pub fn current_angles(&self) -> Result<CurrentAngles, ControlError> {
        self.link.request_current_angles()?;
        self.link
            .wait_for_angles_response(self.config.service_timeout())
            .ok_or(ControlError::Driver(sortbot_driver::DriverError::Timeout))
    }

    /// 取回链路
    pub fn into_link(self) -> ArmLink {
        self.link
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortbot_driver::{
        Camera, Classification, Classifier, ImageHandle, LinkConfig, VisionError, VisionPipeline,
    };
    use sortbot_onboard::sim::{SimArm, SimObject};
    use sortbot_onboard::{OnboardConfig, OnboardRuntime};
    use sortbot_transport::MemoryTransport;
    use std::sync::atomic::Ordering;
    use std::thread;

    /// 在后台线程上运行仿真控制器，返回主机链路
    fn sim_controller(sim: &SimArm, vision: Option<VisionPipeline>) -> (ArmController, SimHandle) {
        let (host, arm) = MemoryTransport::pair(Duration::from_millis(5));
        let mut runtime = OnboardRuntime::new(
            arm,
            sim.hardware(),
            Arc::new(sim.clock()),
            OnboardConfig::default(),
        );
        let stop = runtime.stop_handle();
        let thread = thread::spawn(move || {
            let _ = runtime.run();
        });

        let mut link = ArmLink::with_vision(LinkConfig::default(), vision);
        link.connect_with(host, "sim").unwrap();
        let config = ControllerConfig {
            step_timeout_ms: 10_000,
            service_timeout_ms: 10_000,
            scan_timeout_ms: 20_000,
            ..ControllerConfig::default()
        };
        (
            ArmController::with_config(link, PlacementZones::default(), config),
            SimHandle {
                stop,
                thread: Some(thread),
            },
        )
    }

    struct SimHandle {
        stop: Arc<std::sync::atomic::AtomicBool>,
        thread: Option<thread::JoinHandle<()>>,
    }

    impl Drop for SimHandle {
        fn drop(&mut self) {
            self.stop.store(false, Ordering::Release);
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    struct StubCamera;

    impl Camera for StubCamera {
        fn capture(&self) -> Result<ImageHandle, VisionError> {
            Ok(ImageHandle::new("/tmp/frame.jpg"))
        }
    }

    struct AppleClassifier;

    impl Classifier for AppleClassifier {
        fn classify(&self, _image: &ImageHandle) -> Result<Option<Classification>, VisionError> {
            Ok(Some(Classification::new("apple", 0.92)))
        }
    }

    #[test]
    fn test_scan_without_vision_registers_mapped_objects() {
        let sim = SimArm::new()
            .with_heading(0.0)
            .with_object(SimObject::new(90.0, 15.0, 120.0, 5));
        let (controller, _sim) = sim_controller(&sim, None);

        let entries = controller.scan(20.0, Duration::from_secs(20)).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_classified());
        assert!((entries[0].position.angle - 90.0).abs() <= 1.5);
        assert_eq!(entries[0].placement_zone, controller.zones().get("default"));
    }

    #[test]
    fn test_scan_with_vision_registers_classified_detection() {
        let sim = SimArm::new()
            .with_heading(0.0)
            .with_object(SimObject::new(90.0, 15.0, 120.0, 5));
        let vision = VisionPipeline::new(Arc::new(StubCamera), Arc::new(AppleClassifier));
        let (controller, _sim) = sim_controller(&sim, Some(vision));

        let entries = controller.scan(20.0, Duration::from_secs(20)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].class(), "apple");
        assert_eq!(entries[0].detection.image, "/tmp/frame.jpg");
        assert_eq!(entries[0].placement_zone, controller.zones().get("apple"));
    }

    #[test]
    fn test_check_reports_missing_device() {
        let sim = SimArm::new().without("gripper_distance");
        let (controller, _sim) = sim_controller(&sim, None);

        let err = controller.check().unwrap_err();
        assert!(err.to_string().contains("gripper_distance"), "{}", err);
    }

    #[test]
    fn test_pick_and_place_unknown_index() {
        let sim = SimArm::new();
        let (controller, _sim) = sim_controller(&sim, None);
        assert!(matches!(
            controller.pick_and_place(3),
            Err(ControlError::ObjectNotFound(3))
        ));
    }

    #[test]
    fn test_current_angles() {
        let sim = SimArm::new().with_heading(135.0);
        let (controller, _sim) = sim_controller(&sim, None);
        let angles = controller.current_angles().unwrap();
        assert_eq!(angles.get("base"), Some(&135.0));
        assert_eq!(angles.len(), 4);
    }
}
