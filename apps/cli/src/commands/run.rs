//! 完整分拣流程：自检 -> 安全复位 -> 扫描 -> 选择 -> 抓取并放置

use super::pick::PickCommand;
use super::scan::ScanCommand;
use super::status;
use crate::modes::Interrupt;
use anyhow::Result;
use clap::Args;
use sortbot_sdk::ArmController;
use tracing::warn;

/// 流程命令参数
#[derive(Args, Debug, Default)]
pub struct RunCommand {
    #[command(flatten)]
    pub scan: ScanCommand,

    #[command(flatten)]
    pub pick: PickCommand,

    /// 跳过自检
    #[arg(long)]
    pub skip_check: bool,
}

impl RunCommand {
    pub fn execute(&self, controller: &ArmController, interrupt: &Interrupt) -> Result<()> {
        if !self.skip_check {
            status::check(controller)?;
        }
        interrupt.bail_if_set(controller)?;

        status::safety(controller)?;
        interrupt.bail_if_set(controller)?;

        let entries = self.scan.execute(controller)?;
        if entries.is_empty() {
            warn!("Nothing to sort");
            return Ok(());
        }
        interrupt.bail_if_set(controller)?;

        self.pick.pick_from(controller, &entries)
    }
}
