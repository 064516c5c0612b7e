//! 配置管理命令

use crate::config::CliConfig;
use crate::validation::{parse_speed, parse_zone};
use anyhow::Result;
use clap::Subcommand;
use sortbot_sdk::PlacementZone;
use std::path::Path;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 串口设备（如 /dev/ttyACM1）
        #[arg(long)]
        port: Option<String>,

        /// 波特率
        #[arg(long)]
        baud: Option<u32>,

        /// 默认扫描转速（RPM）
        #[arg(long, value_parser = parse_speed)]
        scan_speed: Option<f64>,

        /// 单步动作确认超时（毫秒）
        #[arg(long)]
        step_timeout_ms: Option<u64>,

        /// 放置区，格式 <class>=<angle>,<distance>（可重复）
        #[arg(long, value_parser = parse_zone)]
        zone: Vec<(String, PlacementZone)>,

        /// 删除放置区（可重复）
        #[arg(long)]
        remove_zone: Vec<String>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称（port / baud / scan_speed / step_timeout_ms / zones）
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                port,
                baud,
                scan_speed,
                step_timeout_ms,
                zone,
                remove_zone,
            } => {
                let mut config = CliConfig::load(path)?;

                if let Some(port) = port {
                    println!("✅ 设置串口: {}", port);
                    config.port = Some(port);
                }
                if let Some(baud) = baud {
                    println!("✅ 设置波特率: {}", baud);
                    config.baud_rate = Some(baud);
                }
                if let Some(speed) = scan_speed {
                    println!("✅ 设置扫描转速: {} RPM", speed);
                    config.scan_speed = speed;
                }
                if let Some(ms) = step_timeout_ms {
                    println!("✅ 设置单步超时: {} ms", ms);
                    config.step_timeout_ms = ms;
                }
                for (class, z) in zone {
                    println!("✅ 设置放置区 {}: {:.0}° / {:.0}mm", class, z.angle, z.distance);
                    config.zones.set(&class, z);
                }
                for class in remove_zone {
                    if config.zones.remove(&class).is_some() {
                        println!("✅ 删除放置区 {}", class);
                    } else {
                        println!("⚠️  放置区 {} 不存在", class);
                    }
                }

                config.save(path)
            },

            ConfigCommand::Get { key } => {
                let config = CliConfig::load(path)?;
                print_key(&config, &key);
                Ok(())
            },

            ConfigCommand::Check => {
                let config = CliConfig::load(path)?;
                println!("配置文件: {}", path.display());
                if !path.exists() {
                    println!("  (不存在，使用默认值)");
                }
                print_key(&config, "all");
                if !config.zones.contains(sortbot_sdk::control::DEFAULT_ZONE) {
                    println!("⚠️  缺少 default 放置区，未分类物体将放到 270°");
                }
                Ok(())
            },
        }
    }
}

fn print_key(config: &CliConfig, key: &str) {
    let unset = || "(未设置)".to_string();
    match key {
        "port" => println!("{}", config.port.clone().unwrap_or_else(unset)),
        "baud" | "baud_rate" => println!(
            "{}",
            config.baud_rate.map(|b| b.to_string()).unwrap_or_else(unset)
        ),
        "scan_speed" => println!("{}", config.scan_speed),
        "step_timeout_ms" => println!("{}", config.step_timeout_ms),
        "zones" => print_zones(config),
        _ => {
            println!("Sortbot CLI 配置:");
            println!("  串口: {}", config.port.clone().unwrap_or_else(unset));
            println!(
                "  波特率: {}",
                config.baud_rate.map(|b| b.to_string()).unwrap_or_else(unset)
            );
            println!("  扫描转速: {} RPM", config.scan_speed);
            println!("  单步超时: {} ms", config.step_timeout_ms);
            println!("  放置区:");
            print_zones(config);
        },
    }
}

fn print_zones(config: &CliConfig) {
    for (class, zone) in config.zones.iter() {
        println!("    {:<10} {:>5.0}° {:>5.0}mm", class, zone.angle, zone.distance);
    }
}
