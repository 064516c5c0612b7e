//! Link API 模块
//!
//! 提供对外的 `ArmLink` 结构体，封装 IO 线程、发送队列和共享状态。

use crate::error::DriverError;
use crate::hooks::MessageCallback;
use crate::pipeline::{LinkConfig, io_loop};
use crate::state::*;
use crate::vision::VisionPipeline;
use crossbeam_channel::{Sender, TrySendError};
use serde::Serialize;
use sortbot_protocol::{
    CurrentAngles, Joint, Message, MessageType, MotionRequest, ObjectRecord, ScanRequest,
    ServiceReport, encode,
};
use sortbot_transport::Transport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join，主线程带超时等待
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 一次连接的运行时资源
struct Session {
    /// 发送队列（容量 10），drop 后 IO 线程退出
    cmd_tx: Sender<Vec<u8>>,
    io_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    endpoint: String,
}

/// 主机侧链路管理器
///
/// # Example
///
/// ```no_run
/// use sortbot_driver::ArmLink;
/// use sortbot_protocol::{Joint, MessageType, MotionRequest};
/// use std::time::Duration;
///
/// let mut link = ArmLink::new(Default::default());
/// link.connect("/dev/ttyACM1", 115_200)?;
/// link.send_motion(MessageType::PickService, &MotionRequest::base(90.0, 30.0))?;
/// assert!(link.wait_for_confirmation(Joint::Base, Duration::from_secs(20)));
/// link.close();
/// # Ok::<(), sortbot_driver::DriverError>(())
/// ```
pub struct ArmLink {
    config: LinkConfig,
    ctx: Arc<LinkContext>,
    session: Option<Session>,
}

impl ArmLink {
    /// 发送队列容量
    pub const COMMAND_QUEUE_CAPACITY: usize = 10;

    pub fn new(config: LinkConfig) -> Self {
        Self::with_vision(config, None)
    }

    /// 带检测分类管线创建
    pub fn with_vision(config: LinkConfig, vision: Option<VisionPipeline>) -> Self {
        Self {
            config,
            ctx: Arc::new(LinkContext::new(vision)),
            session: None,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// 共享状态（只读快照）
    pub fn context(&self) -> &Arc<LinkContext> {
        &self.ctx
    }

    // ========================================================================
    // 连接管理
    // ========================================================================

    /// 打开串口并启动读取线程
    ///
    /// 已连接时直接返回 `Ok(())`。
    #[cfg(feature = "serial")]
    pub fn connect(&mut self, endpoint: &str, baud_rate: u32) -> Result<(), DriverError> {
        if self.is_connected() {
            debug!("Already connected to {}", endpoint);
            return Ok(());
        }
        let transport = sortbot_transport::SerialTransport::open(
            endpoint,
            baud_rate,
            self.config.read_timeout(),
        )?;
        self.start(transport, endpoint)
    }

    /// 使用已打开的传输启动读取线程
    ///
    /// 已连接时直接返回 `Ok(())`，传入的传输被丢弃。
    pub fn connect_with<T>(&mut self, transport: T, endpoint: &str) -> Result<(), DriverError>
    where
        T: Transport + 'static,
    {
        if self.is_connected() {
            debug!("Already connected, ignoring new transport for {}", endpoint);
            return Ok(());
        }
        self.start(transport, endpoint)
    }

    fn start<T>(&mut self, transport: T, endpoint: &str) -> Result<(), DriverError>
    where
        T: Transport + 'static,
    {
        // 清理上一次已失效的会话
        if self.session.is_some() {
            self.close();
        }

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(Self::COMMAND_QUEUE_CAPACITY);
        let is_running = Arc::new(AtomicBool::new(true));

        let ctx = self.ctx.clone();
        let running = is_running.clone();
        let config = self.config.clone();
        let io_thread = std::thread::Builder::new()
            .name("sortbot-link-io".to_string())
            .spawn(move || io_loop(transport, cmd_rx, ctx, running, config))
            .map_err(|e| DriverError::IoThread(e.to_string()))?;

        info!("Link connected: {}", endpoint);
        self.session = Some(Session {
            cmd_tx,
            io_thread: Some(io_thread),
            is_running,
            endpoint: endpoint.to_string(),
        });
        Ok(())
    }

    /// 是否已连接（IO 线程仍在运行）
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.is_running.load(Ordering::Acquire))
    }

    /// 当前连接的端点
    pub fn endpoint(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.endpoint.as_str())
    }

    /// 关闭连接
    ///
    /// 通知 IO 线程退出、关闭发送队列，并在限定时间内等待线程结束。
    /// 传输随 IO 线程一起释放。
    pub fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let Session {
            cmd_tx,
            io_thread,
            is_running,
            endpoint,
        } = session;

        is_running.store(false, Ordering::Release);
        // 必须在 join 之前 drop 掉 Sender，否则 IO 线程收不到 Disconnected
        drop(cmd_tx);

        let join_timeout = self.config.join_timeout();
        if let Some(handle) = io_thread
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "IO thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }
        info!("Link closed: {}", endpoint);
    }

    // ========================================================================
    // 发送
    // ========================================================================

    /// 序列化并发送一条消息
    pub fn send<T: Serialize>(&self, msg_type: &str, data: &T) -> Result<(), DriverError> {
        let message = Message::new(msg_type, data)?;
        self.send_message(&message)
    }

    /// 发送已构造的消息
    pub fn send_message(&self, message: &Message) -> Result<(), DriverError> {
        let session = self.session.as_ref().ok_or(DriverError::NotConnected)?;
        if !session.is_running.load(Ordering::Acquire) {
            return Err(DriverError::NotConnected);
        }

        let bytes = encode(message)?;
        debug!("Sending {}: {}", message.msg_type, message.data);
        session.cmd_tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => DriverError::ChannelFull,
            TrySendError::Disconnected(_) => DriverError::ChannelClosed,
        })
    }

    /// 发送关节动作请求，并将该关节标记为 `Pending`
    pub fn send_motion(
        &self,
        service: MessageType,
        request: &MotionRequest,
    ) -> Result<(), DriverError> {
        if !matches!(service, MessageType::PickService | MessageType::PlaceService) {
            return Err(DriverError::InvalidInput(format!(
                "{} is not a motion service",
                service
            )));
        }
        self.ctx
            .set_movement(request.joint, JointMovementStatus::pending());
        self.send(service.as_str(), request)
    }

    /// 请求自检
    pub fn request_check(&self) -> Result<(), DriverError> {
        self.ctx.check_report.store(None);
        self.send_message(&Message::empty(MessageType::CheckService.as_str()))
    }

    /// 请求安全复位
    pub fn request_safety(&self) -> Result<(), DriverError> {
        self.ctx.safety_report.store(None);
        self.send_message(&Message::empty(MessageType::SafetyService.as_str()))
    }

    /// 请求旋转扫描
    pub fn request_scan(&self, speed: f64) -> Result<(), DriverError> {
        self.ctx.scan.store(Arc::new(ScanStatus::Running));
        self.send(MessageType::ScanService.as_str(), &ScanRequest { speed })
    }

    /// 查询各关节当前角度
    pub fn request_current_angles(&self) -> Result<(), DriverError> {
        self.ctx.current_angles.store(None);
        self.send_message(&Message::empty(MessageType::CurrentAngles.as_str()))
    }

    // ========================================================================
    // 回调
    // ========================================================================

    /// 注册消息回调（同一类型后注册者生效）
    pub fn register_callback<C>(&self, msg_type: &str, callback: C) -> Result<(), DriverError>
    where
        C: MessageCallback + 'static,
    {
        let mut hooks = self.ctx.hooks.write().map_err(|_| DriverError::PoisonedLock)?;
        if hooks.register(msg_type, Arc::new(callback)).is_some() {
            debug!("Replaced callback for {}", msg_type);
        }
        Ok(())
    }

    pub fn unregister_callback(&self, msg_type: &str) -> Result<(), DriverError> {
        let mut hooks = self.ctx.hooks.write().map_err(|_| DriverError::PoisonedLock)?;
        hooks.unregister(msg_type);
        Ok(())
    }

    // ========================================================================
    // 等待
    // ========================================================================

    /// 按固定间隔轮询，直到 `check` 返回 `Some` 或超时
    fn poll_until<T>(&self, timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
        let start = Instant::now();
        let interval = self.config.poll_interval();
        loop {
            if let Some(value) = check() {
                return Some(value);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return None;
            }
            std::thread::sleep(interval.min(timeout - elapsed));
        }
    }

    /// 等待关节动作确认
    ///
    /// # 返回
    /// - `true`: 收到 `completed`
    /// - `false`: 收到 `error`，或超时（记录 warning）
    pub fn wait_for_confirmation(&self, joint: Joint, timeout: Duration) -> bool {
        let outcome = self.poll_until(timeout, || {
            match self.ctx.movement_status(joint).map(|s| s.state) {
                Some(MovementState::Completed) => Some(true),
                Some(MovementState::Error) => Some(false),
                _ => None,
            }
        });

        match outcome {
            Some(true) => true,
            Some(false) => {
                error!("Movement of {} reported an error", joint);
                false
            },
            None => {
                warn!("Timeout waiting for movement of: {}", joint);
                false
            },
        }
    }

    /// 等待 `current_angles` 响应
    pub fn wait_for_angles_response(&self, timeout: Duration) -> Option<CurrentAngles> {
        let angles = self.poll_until(timeout, || {
            self.ctx.current_angles.load_full().map(|a| (*a).clone())
        });
        if angles.is_none() {
            warn!("Timeout waiting for current angles");
        }
        angles
    }

    /// 等待扫描结束并返回物体列表
    pub fn wait_for_scan_complete(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ObjectRecord>, DriverError> {
        let outcome = self.poll_until(timeout, || match &**self.ctx.scan.load() {
            ScanStatus::Complete(objects) => Some(Ok(objects.clone())),
            ScanStatus::Failed(reason) => Some(Err(reason.clone())),
            ScanStatus::Idle | ScanStatus::Running => None,
        });

        match outcome {
            Some(Ok(objects)) => Ok(objects),
            Some(Err(reason)) => Err(DriverError::ServiceFailed {
                service: MessageType::ScanService.to_string(),
                reason,
            }),
            None => {
                warn!("Timeout waiting for scan completion");
                Err(DriverError::Timeout)
            },
        }
    }

    /// 等待自检或安全服务结果
    pub fn wait_for_service(
        &self,
        service: MessageType,
        timeout: Duration,
    ) -> Result<ServiceReport, DriverError> {
        let slot = match service {
            MessageType::CheckService => &self.ctx.check_report,
            MessageType::SafetyService => &self.ctx.safety_report,
            other => {
                return Err(DriverError::InvalidInput(format!(
                    "{} does not produce a service report",
                    other
                )));
            },
        };

        let report = self
            .poll_until(timeout, || slot.load_full())
            .ok_or_else(|| {
                warn!("Timeout waiting for {}", service);
                DriverError::Timeout
            })?;

        if report.is_approved() {
            Ok((*report).clone())
        } else {
            Err(DriverError::ServiceFailed {
                service: service.to_string(),
                reason: report
                    .error_msg
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
        }
    }

    // ========================================================================
    // 状态快照
    // ========================================================================

    pub fn movement_status(&self, joint: Joint) -> Option<JointMovementStatus> {
        self.ctx.movement_status(joint)
    }

    pub fn current_angles(&self) -> Option<CurrentAngles> {
        self.ctx.current_angles.load_full().map(|a| (*a).clone())
    }

    pub fn safety_status(&self) -> Option<ServiceReport> {
        self.ctx.safety_report.load_full().map(|r| (*r).clone())
    }

    pub fn scan_status(&self) -> ScanStatus {
        (**self.ctx.scan.load()).clone()
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.ctx.stats.snapshot()
    }
}

impl Drop for ArmLink {
    fn drop(&mut self) {
        self.close();
    }
}
