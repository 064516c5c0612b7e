//! 链路共享状态
//!
//! `LinkContext` 由 `ArmLink` 持有，通过 `Arc` 与 IO 线程共享。
//! 状态字段使用 `ArcSwap` 整体替换（无锁读取），等待方轮询时每次都重新读取，
//! 不依赖唤醒信号。

use crate::hooks::CallbackRegistry;
use crate::vision::VisionPipeline;
use arc_swap::{ArcSwap, ArcSwapOption};
use sortbot_protocol::{CurrentAngles, Joint, Message, MotionReport, ObjectRecord, ServiceReport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::error;

/// 关节动作状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementState {
    Pending,
    Completed,
    Error,
}

/// 单个关节的最新动作状态
#[derive(Debug, Clone, PartialEq)]
pub struct JointMovementStatus {
    pub state: MovementState,
    /// 机械臂返回的原始报告（`Pending` 时为空）
    pub detail: Option<MotionReport>,
    pub updated_at: Instant,
}

impl JointMovementStatus {
    pub fn pending() -> Self {
        Self {
            state: MovementState::Pending,
            detail: None,
            updated_at: Instant::now(),
        }
    }

    pub fn from_report(report: MotionReport) -> Self {
        let state = if report.is_completed() {
            MovementState::Completed
        } else {
            MovementState::Error
        };
        Self {
            state,
            detail: Some(report),
            updated_at: Instant::now(),
        }
    }
}

/// 扫描进度
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScanStatus {
    #[default]
    Idle,
    Running,
    Complete(Vec<ObjectRecord>),
    Failed(String),
}

/// 链路统计（原子计数器）
#[derive(Debug, Default)]
pub struct LinkStats {
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub callbacks_invoked: AtomicU64,
}

impl LinkStats {
    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            callbacks_invoked: self.callbacks_invoked.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatsSnapshot {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub frames_dropped: u64,
    pub callbacks_invoked: u64,
}

/// 链路上下文
pub struct LinkContext {
    /// 关节动作状态（按关节名）
    pub movement: ArcSwap<HashMap<Joint, JointMovementStatus>>,
    /// 最近一次 `current_angles` 响应
    pub current_angles: ArcSwapOption<CurrentAngles>,
    /// 最近一次自检结果
    pub check_report: ArcSwapOption<ServiceReport>,
    /// 最近一次安全服务结果
    pub safety_report: ArcSwapOption<ServiceReport>,
    /// 扫描进度
    pub scan: ArcSwap<ScanStatus>,
    /// 回调注册表
    pub hooks: RwLock<CallbackRegistry>,
    /// 检测分类管线（可选）
    pub vision: Option<VisionPipeline>,
    pub stats: LinkStats,
}

impl LinkContext {
    pub fn new(vision: Option<VisionPipeline>) -> Self {
        Self {
            movement: ArcSwap::from_pointee(HashMap::new()),
            current_angles: ArcSwapOption::empty(),
            check_report: ArcSwapOption::empty(),
            safety_report: ArcSwapOption::empty(),
            scan: ArcSwap::from_pointee(ScanStatus::Idle),
            hooks: RwLock::new(CallbackRegistry::new()),
            vision,
            stats: LinkStats::default(),
        }
    }

    /// 更新单个关节状态（copy-on-write）
    pub fn set_movement(&self, joint: Joint, status: JointMovementStatus) {
        self.movement.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(joint, status.clone());
            next
        });
    }

    pub fn movement_status(&self, joint: Joint) -> Option<JointMovementStatus> {
        self.movement.load().get(&joint).cloned()
    }

    /// 调用该类型的回调（不持锁调用）
    pub fn trigger_callback(&self, message: &Message) {
        let callback = match self.hooks.read() {
            Ok(hooks) => hooks.get(&message.msg_type),
            Err(_) => {
                error!("Callback registry lock poisoned");
                return;
            },
        };

        if let Some(callback) = callback {
            callback.on_message(message);
            self.stats.callbacks_invoked.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for LinkContext {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::MessageCallback;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_set_movement_keeps_other_joints() {
        let ctx = LinkContext::default();
        ctx.set_movement(Joint::Base, JointMovementStatus::pending());
        ctx.set_movement(
            Joint::Arm,
            JointMovementStatus::from_report(MotionReport::completed(Joint::Arm)),
        );

        assert_eq!(
            ctx.movement_status(Joint::Base).map(|s| s.state),
            Some(MovementState::Pending)
        );
        assert_eq!(
            ctx.movement_status(Joint::Arm).map(|s| s.state),
            Some(MovementState::Completed)
        );
        assert!(ctx.movement_status(Joint::Gripper).is_none());
    }

    #[test]
    fn test_error_report_maps_to_error_state() {
        let status =
            JointMovementStatus::from_report(MotionReport::failed(Joint::Gripper, "stalled"));
        assert_eq!(status.state, MovementState::Error);
    }

    #[test]
    fn test_trigger_callback_counts() {
        let ctx = LinkContext::default();
        let hit = Arc::new(AtomicBool::new(false));
        let h = hit.clone();
        let cb: Arc<dyn MessageCallback> = Arc::new(move |_: &Message| {
            h.store(true, Ordering::Relaxed);
        });
        ctx.hooks.write().unwrap().register("check_service", cb);

        ctx.trigger_callback(&Message::empty("safety_service"));
        assert!(!hit.load(Ordering::Relaxed));

        ctx.trigger_callback(&Message::empty("check_service"));
        assert!(hit.load(Ordering::Relaxed));
        assert_eq!(ctx.stats.snapshot().callbacks_invoked, 1);
    }
}
