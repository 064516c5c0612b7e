//! Pipeline IO 循环模块
//!
//! 负责后台 IO 线程的字节接收、分帧、消息分发，以及发送队列的排空。

use crate::state::*;
use crossbeam_channel::{Receiver, TryRecvError};
use serde::{Deserialize, Serialize};
use sortbot_protocol::{
    CheckError, CurrentAngles, Detection, FaultReport, FrameDecoder, Joint, Message,
    MessageType, MotionReport, ScanEvent, ServiceReport,
};
use sortbot_transport::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 链路配置
///
/// # Example
///
/// ```
/// use sortbot_driver::LinkConfig;
///
/// let config = LinkConfig {
///     port: "/dev/ttyUSB0".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.baud_rate, 115_200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// 串口设备
    pub port: String,
    /// 波特率
    pub baud_rate: u32,
    /// 单次读超时（毫秒）
    pub read_timeout_ms: u64,
    /// 等待方轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 关闭时等待 IO 线程退出的上限（毫秒）
    pub join_timeout_ms: u64,
    /// 最大帧长（字节）
    pub max_frame_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM1".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 10,
            poll_interval_ms: 10,
            join_timeout_ms: 1000,
            max_frame_len: sortbot_protocol::DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

/// IO 线程主循环
///
/// 1. 排空发送队列
/// 2. 读取字节（带超时）并逐字节分帧
/// 3. 分发完整消息
///
/// 退出条件：`is_running` 被清除、命令通道断开、或传输层不可恢复错误。
pub fn io_loop(
    mut transport: impl Transport,
    cmd_rx: Receiver<Vec<u8>>,
    ctx: Arc<LinkContext>,
    is_running: Arc<AtomicBool>,
    config: LinkConfig,
) {
    let mut decoder = FrameDecoder::with_max_frame_len(config.max_frame_len);
    let mut buf = [0u8; 512];

    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("IO loop: stop requested");
            break;
        }

        if drain_tx_queue(&mut transport, &cmd_rx, &ctx) {
            // 命令通道断开，退出循环
            break;
        }

        let n = match transport.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => n,
            Err(e) if e.is_fatal() => {
                error!("Transport lost, IO loop exiting: {}", e);
                break;
            },
            Err(e) => {
                error!("Transport read error: {}", e);
                std::thread::sleep(config.read_timeout());
                continue;
            },
        };

        trace!("Received {} bytes", n);
        for &byte in &buf[..n] {
            match decoder.push(byte) {
                Some(Ok(message)) => {
                    ctx.stats.messages_received.fetch_add(1, Ordering::Relaxed);
                    dispatch_message(&ctx, message);
                },
                Some(Err(_)) => {
                    ctx.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                },
                None => {},
            }
        }
    }

    is_running.store(false, Ordering::Release);
}

/// 排空发送队列
///
/// # 返回
/// `true` 表示命令通道已断开，调用方应退出循环。
fn drain_tx_queue(
    transport: &mut impl Transport,
    cmd_rx: &Receiver<Vec<u8>>,
    ctx: &LinkContext,
) -> bool {
    let mut wrote = false;
    loop {
        match cmd_rx.try_recv() {
            Ok(bytes) => match transport.write_all(&bytes) {
                Ok(()) => {
                    wrote = true;
                    ctx.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => error!("Failed to write message: {}", e),
            },
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => return true,
        }
    }

    if wrote && let Err(e) = transport.flush() {
        error!("Failed to flush transport: {}", e);
    }
    false
}

/// 分发一条入站消息
///
/// 先更新共享状态，再调用该类型注册的回调。
/// `scan_service/detected` 交给分类线程，回调在分类完成后调用。
pub fn dispatch_message(ctx: &Arc<LinkContext>, message: Message) {
    let Some(kind) = message.kind() else {
        debug!("Ignoring unknown message type: {}", message.msg_type);
        return;
    };

    match kind {
        MessageType::CheckService => match message.payload::<ServiceReport>() {
            Ok(report) => {
                info!("check_service status: {:?}", report.state);
                ctx.check_report.store(Some(Arc::new(report)));
            },
            Err(e) => warn!("{}", e),
        },

        MessageType::CheckError => match message.payload::<CheckError>() {
            Ok(payload) => {
                error!("Check service failed: {}", payload.error);
                ctx.check_report
                    .store(Some(Arc::new(ServiceReport::failed(payload.error))));
            },
            Err(e) => warn!("{}", e),
        },

        MessageType::SafetyService => match message.payload::<ServiceReport>() {
            Ok(report) => {
                info!(
                    "safety_service status: {:?}, time: {:?}s",
                    report.state, report.time
                );
                if !report.is_approved() {
                    error!(
                        "Safety service error: {}",
                        report.error_msg.as_deref().unwrap_or("Unknown error")
                    );
                }
                ctx.safety_report.store(Some(Arc::new(report)));
            },
            Err(e) => warn!("{}", e),
        },

        MessageType::ScanService => match message.payload::<ScanEvent>() {
            Ok(ScanEvent::Detected(detection)) => {
                info!(
                    "Scan detection: angle {:.1}°, distance {:.0}mm, size {}",
                    detection.angle, detection.distance, detection.size
                );
                spawn_detection_enrichment(ctx.clone(), detection);
                return;
            },
            Ok(ScanEvent::Complete { objects }) => {
                info!("Scan completed: {} objects", objects.len());
                ctx.scan.store(Arc::new(ScanStatus::Complete(objects)));
            },
            Ok(ScanEvent::Error { error_msg }) => {
                error!("Scan service error: {}", error_msg);
                ctx.scan.store(Arc::new(ScanStatus::Failed(error_msg)));
            },
            Err(e) => warn!("{}", e),
        },

        MessageType::PickService | MessageType::PlaceService => {
            match motion_report(&message) {
                Some(report) => {
                    if report.is_completed() {
                        debug!("{} {} completed", message.msg_type, report.joint);
                    } else {
                        error!(
                            "{} {} failed: {}",
                            message.msg_type,
                            report.joint,
                            report.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    ctx.set_movement(report.joint, JointMovementStatus::from_report(report));
                },
                None => warn!("Unparseable motion report: {}", message.data),
            }
        },

        MessageType::CurrentAngles => match message.payload::<CurrentAngles>() {
            Ok(angles) => {
                debug!("current_angles: {:?}", angles);
                ctx.current_angles.store(Some(Arc::new(angles)));
            },
            Err(e) => warn!("{}", e),
        },

        MessageType::Error => match message.payload::<FaultReport>() {
            Ok(fault) => {
                error!(
                    "Arm fault ({}): {}",
                    fault.service.as_deref().unwrap_or("runtime"),
                    fault.msg
                );
                if fault.service.as_deref() == Some("scan") {
                    ctx.scan.store(Arc::new(ScanStatus::Failed(fault.msg)));
                }
            },
            Err(e) => warn!("{}", e),
        },
    }

    ctx.trigger_callback(&message);
}

/// 解析动作报告
///
/// 兼容只带 `{joint, error}`、缺少 `state` 的错误报告。
fn motion_report(message: &Message) -> Option<MotionReport> {
    if let Ok(report) = message.payload::<MotionReport>() {
        return Some(report);
    }

    let joint: Joint = serde_json::from_value(message.data.get("joint")?.clone()).ok()?;
    let error = message.str_field("error").unwrap_or("malformed report");
    Some(MotionReport::failed(joint, error))
}

/// 异步分类并通知回调
///
/// 与 IO 线程解耦：分类耗时不影响后续帧的解码。
fn spawn_detection_enrichment(ctx: Arc<LinkContext>, detection: Detection) {
    let spawned = std::thread::Builder::new()
        .name("sortbot-classify".to_string())
        .spawn(move || {
            let detection = match &ctx.vision {
                None => detection,
                Some(vision) => match vision.enrich(detection) {
                    Ok(Some(enriched)) => enriched,
                    Ok(None) => return,
                    Err(e) => {
                        error!("Object classification failed: {}", e);
                        return;
                    },
                },
            };

            match Message::new(
                MessageType::ScanService.as_str(),
                &ScanEvent::Detected(detection),
            ) {
                Ok(message) => ctx.trigger_callback(&message),
                Err(e) => error!("Failed to encode enriched detection: {}", e),
            }
        });

    if let Err(e) = spawned {
        error!("Failed to spawn classification thread: {}", e);
    }
}
