//! One-shot 模式
//!
//! 每个命令独立执行：
//! 1. 读取配置
//! 2. 连接机械臂（串口或仿真）
//! 3. 执行操作
//! 4. 断开连接

use super::Interrupt;
use crate::commands::{PickCommand, RunCommand, ScanCommand, status};
use crate::config::CliConfig;
use crate::session::{ConnectOptions, Session};
use anyhow::Result;

/// One-shot 模式
pub struct OneShotMode {
    session: Session,
    interrupt: Interrupt,
}

impl OneShotMode {
    pub fn new(options: &ConnectOptions, config: &CliConfig, interrupt: Interrupt) -> Result<Self> {
        let session = Session::connect(options, config)?;
        Ok(Self { session, interrupt })
    }

    pub fn check(&self) -> Result<()> {
        status::check(self.session.controller())
    }

    pub fn safety(&self) -> Result<()> {
        status::safety(self.session.controller())
    }

    pub fn scan(&self, args: &ScanCommand) -> Result<()> {
        args.execute(self.session.controller())?;
        Ok(())
    }

    pub fn pick(&self, args: &PickCommand) -> Result<()> {
        let controller = self.session.controller();
        let entries = ScanCommand::default().execute(controller)?;
        self.interrupt.bail_if_set(controller)?;
        args.pick_from(controller, &entries)
    }

    pub fn run(&self, args: &RunCommand) -> Result<()> {
        args.execute(self.session.controller(), &self.interrupt)
    }

    pub fn angles(&self, json: bool) -> Result<()> {
        status::angles(self.session.controller(), json)
    }
}
