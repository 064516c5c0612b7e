//! 扫描命令

use crate::validation::parse_speed;
use anyhow::Result;
use clap::Args;
use sortbot_sdk::{ArmController, ScanEntry};
use std::time::Duration;

/// 扫描命令参数
#[derive(Args, Debug, Default)]
pub struct ScanCommand {
    /// 底座转速（RPM，默认取配置）
    #[arg(short, long, value_parser = parse_speed)]
    pub speed: Option<f64>,

    /// 以 JSON 输出登记表
    #[arg(long)]
    pub json: bool,
}

impl ScanCommand {
    pub fn execute(&self, controller: &ArmController) -> Result<Vec<ScanEntry>> {
        let config = controller.config();
        let speed = self.speed.unwrap_or(config.scan_speed);
        // 转一圈所需时间加上配置的余量
        let timeout = config.scan_timeout().max(Duration::from_secs_f64(60.0 / speed + 5.0));

        println!("⏳ 扫描中（{} RPM）...", speed);
        let entries = controller.scan(speed, timeout)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else {
            print_entries(&entries);
        }
        Ok(entries)
    }
}

/// 打印登记表
pub fn print_entries(entries: &[ScanEntry]) {
    if entries.is_empty() {
        println!("⚠️  未检测到物体");
        return;
    }
    println!("=== {} objects scanned ===", entries.len());
    for entry in entries {
        println!("  {}", describe(entry));
    }
}

pub fn describe(entry: &ScanEntry) -> String {
    format!(
        "[{}] angle={:.1}° dist={:.0}mm class={} conf={:.2} -> zone {:.0}°/{:.0}mm",
        entry.index,
        entry.position.angle,
        entry.position.distance,
        entry.class(),
        entry.detection.confidence,
        entry.placement_zone.angle,
        entry.placement_zone.distance,
    )
}
