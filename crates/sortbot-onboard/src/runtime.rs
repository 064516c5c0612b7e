//! 板载主循环
//!
//! 单线程：读入字节 -> 解帧 -> 分发请求 -> 推进活动服务 -> 写出回复。
//! 有服务在运行时每拍休眠一个节拍；空闲时阻塞在传输层读超时上。

use crate::config::OnboardConfig;
use crate::control::ControlModule;
use crate::error::OnboardError;
use crate::hal::{ArmHardware, Clock, LedColor, MotorJoint};
use crate::perception::PerceptionModule;
use crate::services::{
    CheckTask, MotionTask, Outbox, SafetyTask, ScanTask, ServiceContext, ServiceKind,
    ServiceState, ServiceTask, TaskStatus,
};
use sortbot_protocol::{
    CurrentAngles, FaultReport, FrameDecoder, Joint, Message, MessageType, MotionReport,
    MotionRequest, ScanRequest, encode,
};
use sortbot_transport::Transport;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, trace, warn};

/// 读缓冲大小
const READ_BUFFER_SIZE: usize = 512;
/// 屏幕上错误信息的最大字符数
const DISPLAY_ERROR_CHARS: usize = 20;

/// 板载运行时
pub struct OnboardRuntime {
    transport: Box<dyn Transport>,
    hw: ArmHardware,
    clock: Arc<dyn Clock>,
    config: OnboardConfig,
    perception: PerceptionModule,
    decoder: FrameDecoder,
    tasks: BTreeMap<ServiceKind, Box<dyn ServiceTask>>,
    outbox: Outbox,
    is_running: Arc<AtomicBool>,
    read_buffer: Vec<u8>,
}

impl OnboardRuntime {
    pub fn new(
        transport: impl Transport + 'static,
        hw: ArmHardware,
        clock: Arc<dyn Clock>,
        config: OnboardConfig,
    ) -> Self {
        Self {
            transport: Box::new(transport),
            hw,
            clock,
            config,
            perception: PerceptionModule::new(),
            decoder: FrameDecoder::new(),
            tasks: BTreeMap::new(),
            outbox: Outbox::new(),
            is_running: Arc::new(AtomicBool::new(true)),
            read_buffer: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// 运行标志，置 `false` 后 `run()` 在当前拍结束时返回
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.is_running.clone()
    }

    pub fn config(&self) -> &OnboardConfig {
        &self.config
    }

    pub fn service_state(&self, kind: ServiceKind) -> ServiceState {
        if self.tasks.contains_key(&kind) {
            ServiceState::Active
        } else {
            ServiceState::Idle
        }
    }

    pub fn active_services(&self) -> Vec<ServiceKind> {
        self.tasks.keys().copied().collect()
    }

    /// 主循环
    ///
    /// 传输层断开时返回错误；其它故障在屏幕上显示、停止全部关节后继续运行。
    pub fn run(&mut self) -> Result<(), OnboardError> {
        if let Err(e) = self.hw.set_color(LedColor::Init) {
            warn!("Failed to set init color: {}", e);
        }
        info!("Onboard runtime started");

        while self.is_running.load(Ordering::Acquire) {
            match self.step() {
                Ok(()) => {},
                Err(e) if e.is_fatal() => {
                    error!("Transport lost, onboard runtime exiting: {}", e);
                    self.stop_all();
                    return Err(e);
                },
                Err(e) => self.fault(&e.to_string()),
            }
        }

        info!("Onboard runtime stopped");
        self.stop_all();
        Ok(())
    }

    /// 执行一拍
    pub fn step(&mut self) -> Result<(), OnboardError> {
        self.poll_inbound()?;
        self.advance_tasks();
        self.flush_outbox()?;
        if !self.tasks.is_empty() {
            self.clock.sleep(self.config.tick());
        }
        Ok(())
    }

    fn poll_inbound(&mut self) -> Result<(), OnboardError> {
        let n = if self.tasks.is_empty() {
            self.transport.read(&mut self.read_buffer)?
        } else {
            let available = self.transport.available()?;
            if available == 0 {
                return Ok(());
            }
            let len = available.min(self.read_buffer.len());
            self.transport.read(&mut self.read_buffer[..len])?
        };
        if n == 0 {
            return Ok(());
        }

        trace!("RX {} bytes", n);
        let messages = self.decoder.decode_stream(&self.read_buffer[..n]);
        for message in messages {
            self.dispatch(message);
        }
        Ok(())
    }

    fn dispatch(&mut self, message: Message) {
        let Some(msg_type) = message.kind() else {
            debug!("Ignoring unknown message type '{}'", message.msg_type);
            return;
        };

        if msg_type == MessageType::CurrentAngles {
            self.reply_current_angles();
            return;
        }

        match ServiceKind::from_message_type(msg_type) {
            Some(kind) => self.start_service(kind, &message),
            None => debug!("Ignoring {} from host", msg_type),
        }
    }

    fn start_service(&mut self, kind: ServiceKind, message: &Message) {
        if self.tasks.contains_key(&kind) {
            warn!("{} service already active, request rejected", kind);
            self.reject(kind, message, format!("{} service busy", kind));
            return;
        }

        let task: Box<dyn ServiceTask> = match kind {
            ServiceKind::Check => Box::new(CheckTask::new()),
            ServiceKind::Safety => Box::new(SafetyTask::new()),
            ServiceKind::Scan => {
                let request = message.payload::<ScanRequest>().unwrap_or_else(|e| {
                    warn!("{}, using default scan speed", e);
                    ScanRequest::default()
                });
                Box::new(ScanTask::new(request.speed))
            },
            ServiceKind::Pick | ServiceKind::Place => match message.payload::<MotionRequest>() {
                Ok(request) => Box::new(MotionTask::new(kind, request)),
                Err(e) => {
                    warn!("Rejecting {} request: {}", kind, e);
                    self.reject(kind, message, e.to_string());
                    return;
                },
            },
        };

        info!("{} service started", kind);
        debug!("{} request: {}", kind, message.data);
        self.tasks.insert(kind, task);
    }

    /// 拒绝请求：动作服务能识别关节就按该服务回复，否则发通用故障
    fn reject(&mut self, kind: ServiceKind, message: &Message, reason: String) {
        let joint = match kind {
            ServiceKind::Pick | ServiceKind::Place => message
                .data
                .get("joint")
                .and_then(|v| serde_json::from_value::<Joint>(v.clone()).ok()),
            _ => None,
        };
        match joint {
            Some(joint) => self
                .outbox
                .post(kind.message_type(), &MotionReport::failed(joint, reason)),
            None => self.outbox.post(
                MessageType::Error,
                &FaultReport {
                    service: Some(kind.to_string()),
                    msg: reason,
                },
            ),
        }
    }

    fn advance_tasks(&mut self) {
        if self.tasks.is_empty() {
            return;
        }

        let mut finished = Vec::new();
        let mut faults = Vec::new();
        let mut ctx = ServiceContext {
            hw: &mut self.hw,
            clock: self.clock.as_ref(),
            config: &self.config,
            perception: &mut self.perception,
        };

        for (kind, task) in self.tasks.iter_mut() {
            match task.advance(&mut ctx, &mut self.outbox) {
                Ok(TaskStatus::Running) => {},
                Ok(TaskStatus::Done) => {
                    info!("{} service finished", kind);
                    finished.push(*kind);
                },
                Err(e) => {
                    warn!("{} service failed: {}", kind, e);
                    if let Err(stop_error) = task.fail(&e, &mut ctx, &mut self.outbox) {
                        faults.push(format!("{}: {}", kind, stop_error));
                    }
                    finished.push(*kind);
                },
            }
        }

        for kind in finished {
            self.tasks.remove(&kind);
        }
        for fault in faults {
            self.fault(&fault);
        }
    }

    fn flush_outbox(&mut self) -> Result<(), OnboardError> {
        if self.outbox.is_empty() {
            return Ok(());
        }
        let mut pending = self.outbox.drain().collect::<Vec<_>>().into_iter();
        while let Some(message) = pending.next() {
            let bytes = match encode(&message) {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to encode {} reply: {}", message.msg_type, e);
                    continue;
                },
            };
            trace!("TX {}", String::from_utf8_lossy(&bytes).trim_end());
            if let Err(e) = self.transport.write_all(&bytes) {
                if e.is_fatal() {
                    return Err(e.into());
                }
                // 未发出的回复留到下一拍重发
                warn!("Write failed, {} replies requeued: {}", pending.len() + 1, e);
                self.outbox.push_message(message);
                pending.for_each(|rest| self.outbox.push_message(rest));
                return Ok(());
            }
        }
        self.transport.flush()?;
        Ok(())
    }

    fn reply_current_angles(&mut self) {
        let control = ControlModule::new(&self.config);
        let mut angles = CurrentAngles::new();
        for joint in MotorJoint::ALL {
            match control.position(&self.hw, joint) {
                Ok(angle) => {
                    angles.insert(joint.as_str().to_string(), angle);
                },
                Err(e) => warn!("Cannot read {} position: {}", joint, e),
            }
        }
        self.outbox.post(MessageType::CurrentAngles, &angles);
    }

    /// 顶层故障：屏幕提示、停止全部关节、通知主机，运行时继续
    fn fault(&mut self, msg: &str) {
        error!("Onboard fault: {}", msg);

        let short: String = msg.chars().take(DISPLAY_ERROR_CHARS).collect();
        if let Err(e) = self.hw.display.print(&format!("Error: {}", short)) {
            warn!("Display unavailable: {}", e);
        }
        if !self.tasks.is_empty() {
            warn!("Aborting active services: {:?}", self.active_services());
            self.tasks.clear();
        }
        self.stop_all();
        self.outbox.post(
            MessageType::Error,
            &FaultReport {
                service: None,
                msg: msg.to_string(),
            },
        );
    }

    fn stop_all(&mut self) {
        if let Err(e) = ControlModule::new(&self.config).general_stop(&mut self.hw) {
            error!("General stop incomplete: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimArm, SimObject};
    use serde_json::json;
    use sortbot_transport::{MemoryTransport, TransportError};
    use std::time::Duration;

    struct Fixture {
        sim: SimArm,
        runtime: OnboardRuntime,
        host: MemoryTransport,
        decoder: FrameDecoder,
    }

    impl Fixture {
        fn new(sim: SimArm) -> Self {
            let (host, arm) = MemoryTransport::pair(Duration::from_millis(1));
            let runtime = OnboardRuntime::new(
                arm,
                sim.hardware(),
                Arc::new(sim.clock()),
                OnboardConfig::default(),
            );
            Self {
                sim,
                runtime,
                host,
                decoder: FrameDecoder::new(),
            }
        }

        fn send(&mut self, msg_type: &str, data: serde_json::Value) {
            let message = Message {
                msg_type: msg_type.to_string(),
                data,
            };
            self.host.write_all(&encode(&message).unwrap()).unwrap();
        }

        fn send_raw(&mut self, bytes: &[u8]) {
            self.host.write_all(bytes).unwrap();
        }

        /// 推进到所有服务结束，收集回复
        fn run_until_idle(&mut self, max_steps: usize) -> Vec<Message> {
            let mut replies = Vec::new();
            for i in 0..max_steps {
                self.runtime.step().unwrap();
                replies.extend(self.drain_replies());
                if i > 0 && self.runtime.active_services().is_empty() {
                    break;
                }
            }
            replies
        }

        fn drain_replies(&mut self) -> Vec<Message> {
            let mut buf = [0u8; 4096];
            let mut out = Vec::new();
            while self.host.available().unwrap_or(0) > 0 {
                let n = self.host.read(&mut buf).unwrap();
                out.extend(self.decoder.decode_stream(&buf[..n]));
            }
            out
        }
    }

    #[test]
    fn test_check_request_is_answered() {
        let mut fixture = Fixture::new(SimArm::new());
        fixture.send("check_service", json!({}));
        let replies = fixture.run_until_idle(10);

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].msg_type, "check_service");
        assert_eq!(replies[0].data, json!({"state": "approved"}));
    }

    #[test]
    fn test_duplicate_request_is_rejected() {
        let mut fixture = Fixture::new(SimArm::new().with_heading(0.0));
        fixture.send("scan_service", json!({"speed": 20.0}));
        fixture.runtime.step().unwrap();
        assert_eq!(
            fixture.runtime.service_state(ServiceKind::Scan),
            ServiceState::Active
        );

        fixture.send("scan_service", json!({"speed": 20.0}));
        let replies = fixture.run_until_idle(10_000);
        let completions = replies
            .iter()
            .filter(|m| m.data.get("state") == Some(&json!("complete")))
            .count();
        assert_eq!(completions, 1);

        let busy: Vec<_> = replies.iter().filter(|m| m.msg_type == "error").collect();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].data["service"], json!("scan"));
        assert_eq!(busy[0].data["msg"], json!("scan service busy"));
    }

    #[test]
    fn test_busy_motion_request_gets_joint_error() {
        let mut fixture = Fixture::new(SimArm::new().with_heading(0.0));
        fixture.send("pick_service", json!({"joint": "base", "angle": 180.0, "speed": 5.0}));
        fixture.runtime.step().unwrap();
        fixture.send("pick_service", json!({"joint": "gripper", "action": "close"}));
        let replies = fixture.run_until_idle(10_000);

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].msg_type, "pick_service");
        assert_eq!(replies[0].data["joint"], json!("gripper"));
        assert_eq!(replies[0].data["state"], json!("error"));
        assert_eq!(replies[1].data["joint"], json!("base"));
        assert_eq!(replies[1].data["state"], json!("completed"));
    }

    #[test]
    fn test_different_services_run_together() {
        let mut fixture = Fixture::new(SimArm::new().with_heading(0.0));
        fixture.send("scan_service", json!({}));
        fixture.send("place_service", json!({"joint": "gripper", "action": "open"}));
        fixture.runtime.step().unwrap();

        assert_eq!(
            fixture.runtime.active_services(),
            vec![ServiceKind::Scan, ServiceKind::Place]
        );
        let replies = fixture.run_until_idle(10_000);
        assert!(replies.iter().any(|m| m.msg_type == "place_service"));
        assert!(replies.iter().any(|m| m.msg_type == "scan_service"));
    }

    #[test]
    fn test_current_angles_reply() {
        let mut fixture = Fixture::new(SimArm::new().with_heading(42.0).with_shoulder(200.0));
        fixture.send("current_angles", json!({}));
        let replies = fixture.run_until_idle(2);

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].data["base"], json!(42.0));
        assert_eq!(replies[0].data["shoulder"], json!(200.0));
        assert!(replies[0].data.get("gripper").is_some());
    }

    #[test]
    fn test_malformed_motion_request() {
        let mut fixture = Fixture::new(SimArm::new());
        fixture.send("pick_service", json!({"joint": "base", "angle": "north"}));
        fixture.send("pick_service", json!({"angle": 10.0}));
        let replies = fixture.run_until_idle(2);

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].msg_type, "pick_service");
        assert_eq!(replies[0].data["joint"], json!("base"));
        assert_eq!(replies[0].data["state"], json!("error"));
        assert_eq!(replies[1].msg_type, "error");
        assert_eq!(replies[1].data["service"], json!("pick"));
        assert!(fixture.runtime.active_services().is_empty());
    }

    #[test]
    fn test_garbage_and_unknown_lines_are_skipped() {
        let mut fixture = Fixture::new(SimArm::new());
        fixture.send_raw(b"{not json\n");
        fixture.send("dance_service", json!({}));
        fixture.send("check_service", json!({}));
        let replies = fixture.run_until_idle(5);

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].msg_type, "check_service");
    }

    #[test]
    fn test_scan_reports_object() {
        let sim = SimArm::new()
            .with_heading(0.0)
            .with_object(SimObject::new(90.0, 15.0, 120.0, 5));
        let mut fixture = Fixture::new(sim);
        fixture.send("scan_service", json!({"speed": 20.0}));
        let replies = fixture.run_until_idle(10_000);

        let complete = replies
            .iter()
            .find(|m| m.data.get("state") == Some(&json!("complete")))
            .unwrap();
        let objects = complete.data["objects"].as_array().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(fixture.sim.led(), Some(LedColor::Ready));
    }

    #[test]
    fn test_fault_prints_truncated_message() {
        let mut fixture = Fixture::new(SimArm::new());
        fixture
            .runtime
            .fault("shoulder_motor fault: overcurrent detected");

        let lines = fixture.sim.display_lines();
        assert_eq!(lines, vec!["Error: shoulder_motor fault".to_string()]);
        fixture.runtime.flush_outbox().unwrap();
        let replies = fixture.drain_replies();
        assert_eq!(replies[0].msg_type, "error");
    }

    /// 前 `failures` 次写入返回可恢复错误
    struct FlakyWrites {
        inner: MemoryTransport,
        failures: usize,
    }

    impl Transport for FlakyWrites {
        fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
            self.inner.read(buffer)
        }

        fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "tx busy",
                )));
            }
            self.inner.write_all(data)
        }

        fn flush(&mut self) -> Result<(), TransportError> {
            self.inner.flush()
        }

        fn available(&mut self) -> Result<usize, TransportError> {
            self.inner.available()
        }
    }

    #[test]
    fn test_failed_write_keeps_pending_replies() {
        let sim = SimArm::new().with_heading(42.0);
        let (mut host, arm) = MemoryTransport::pair(Duration::from_millis(1));
        let mut runtime = OnboardRuntime::new(
            FlakyWrites {
                inner: arm,
                failures: 1,
            },
            sim.hardware(),
            Arc::new(sim.clock()),
            OnboardConfig::default(),
        );

        runtime.reply_current_angles();
        runtime.reply_current_angles();
        runtime.flush_outbox().unwrap();
        assert_eq!(runtime.outbox.len(), 2);
        assert_eq!(host.available().unwrap(), 0);

        runtime.flush_outbox().unwrap();
        assert!(runtime.outbox.is_empty());

        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 4096];
        let mut replies = Vec::new();
        while host.available().unwrap_or(0) > 0 {
            let n = host.read(&mut buf).unwrap();
            replies.extend(decoder.decode_stream(&buf[..n]));
        }
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|m| m.data["base"] == json!(42.0)));
    }

    #[test]
    fn test_run_exits_when_host_disconnects() {
        let sim = SimArm::new();
        let (host, arm) = MemoryTransport::pair(Duration::from_millis(1));
        let mut runtime = OnboardRuntime::new(
            arm,
            sim.hardware(),
            Arc::new(sim.clock()),
            OnboardConfig::default(),
        );
        drop(host);

        let err = runtime.run().unwrap_err();
        assert!(matches!(
            err,
            OnboardError::Transport(TransportError::Closed)
        ));
        assert_eq!(sim.led(), Some(LedColor::Init));
    }

    #[test]
    fn test_stop_handle_ends_run() {
        let fixture = Fixture::new(SimArm::new());
        let Fixture {
            mut runtime, host, ..
        } = fixture;
        runtime.stop_handle().store(false, Ordering::Release);
        assert!(runtime.run().is_ok());
        drop(host);
    }
}
