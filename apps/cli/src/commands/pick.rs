//! 抓取并放置命令
//!
//! 未指定序号时用 `inquire::Select` 从登记表中选择，动作前需要确认。

use super::scan::describe;
use crate::validation::validate_index;
use anyhow::{Context, Result};
use clap::Args;
use inquire::{Confirm, Select};
use sortbot_sdk::{ArmController, ScanEntry};
use std::fmt;

/// 抓取命令参数
#[derive(Args, Debug, Default)]
pub struct PickCommand {
    /// 物体序号（从 1 开始，省略时交互选择）
    #[arg(short, long)]
    pub index: Option<usize>,

    /// 跳过动作确认
    #[arg(short, long)]
    pub yes: bool,
}

impl PickCommand {
    /// 从已有登记表中抓取
    pub fn pick_from(&self, controller: &ArmController, entries: &[ScanEntry]) -> Result<()> {
        let Some(entry) = select_object(entries, self.index)? else {
            println!("❌ 操作已取消");
            return Ok(());
        };
        if !self.yes && !confirm_motion(&entry)? {
            println!("❌ 操作已取消");
            return Ok(());
        }

        println!("⏳ 抓取物体 {}...", entry.index);
        controller.pick_and_place(entry.index)?;
        println!(
            "✅ 物体 {} 已放到 {:.0}°/{:.0}mm",
            entry.index, entry.placement_zone.angle, entry.placement_zone.distance
        );
        Ok(())
    }
}

struct Choice<'a>(&'a ScanEntry);

impl fmt::Display for Choice<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe(self.0))
    }
}

/// 选择要抓取的物体，取消时返回 `None`
pub fn select_object(entries: &[ScanEntry], index: Option<usize>) -> Result<Option<ScanEntry>> {
    if let Some(index) = index {
        validate_index(index, entries.len())?;
        return Ok(entries.iter().find(|e| e.index == index).cloned());
    }
    if entries.is_empty() {
        anyhow::bail!("没有可抓取的物体，请先扫描");
    }

    let choices: Vec<Choice<'_>> = entries.iter().map(Choice).collect();
    let selected = Select::new("选择要抓取的物体:", choices)
        .prompt_skippable()
        .context("用户交互失败")?;
    Ok(selected.map(|choice| choice.0.clone()))
}

fn confirm_motion(entry: &ScanEntry) -> Result<bool> {
    println!("⚠️  即将执行抓取与放置:");
    println!("  {}", describe(entry));
    Confirm::new("确定要继续吗？")
        .with_default(false)
        .prompt()
        .context("用户交互失败")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortbot_sdk::PlacementZone;
    use sortbot_sdk::control::{DetectionInfo, ObjectPosition, UNCLASSIFIED};

    fn entries() -> Vec<ScanEntry> {
        (1..=2)
            .map(|index| ScanEntry {
                index,
                position: ObjectPosition {
                    angle: 90.0 * index as f64,
                    distance: 150.0,
                },
                detection: DetectionInfo {
                    class: UNCLASSIFIED.to_string(),
                    confidence: 0.0,
                    image: String::new(),
                },
                placement_zone: PlacementZone::new(270.0, 200.0),
            })
            .collect()
    }

    #[test]
    fn test_select_by_index() {
        let selected = select_object(&entries(), Some(2)).unwrap().unwrap();
        assert_eq!(selected.position.angle, 180.0);
    }

    #[test]
    fn test_select_out_of_range() {
        let err = select_object(&entries(), Some(3)).unwrap_err();
        assert!(err.to_string().contains("object 3 not found"), "{}", err);
    }

    #[test]
    fn test_select_without_entries() {
        assert!(select_object(&[], None).is_err());
    }
}
