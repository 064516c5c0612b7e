//! 运行模式
//!
//! 支持两种模式：
//! - One-shot 模式：每次命令独立连接
//! - REPL 模式：交互式 Shell，会话内保持连接和扫描结果

pub mod oneshot;
pub mod repl;

use anyhow::Result;
use sortbot_sdk::ArmController;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Ctrl+C 标志
///
/// 动作序列执行中无法打断，流程在阶段之间检查该标志。
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// 安装 Ctrl+C 处理（进程内只能调用一次）
    pub fn install() -> Result<Self> {
        let interrupt = Self::default();
        let flag = interrupt.flag.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
            eprintln!("\n🛑 收到 Ctrl+C，当前步骤结束后回到安全位姿...");
        })?;
        Ok(interrupt)
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// 已中断时回到安全位姿并返回错误
    pub fn bail_if_set(&self, controller: &ArmController) -> Result<()> {
        if !self.is_set() {
            return Ok(());
        }
        self.clear();
        if let Err(e) = controller.recover() {
            eprintln!("❌ 回到安全位姿失败: {}", e);
        }
        anyhow::bail!("interrupted by user")
    }
}
