//! CLI 配置
//!
//! 存放在 `<config_dir>/sortbot/config.toml`：
//!
//! ```toml
//! port = "/dev/ttyACM1"
//! baud_rate = 115200
//! scan_speed = 20.0
//! step_timeout_ms = 30000
//!
//! [zones.apple]
//! angle = 90.0
//! distance = 200.0
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sortbot_sdk::ControllerConfig;
use sortbot_sdk::control::PlacementZones;
use sortbot_sdk::driver::LinkConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub fn default_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("sortbot");
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// 串口设备
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// 波特率
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,

    /// 默认扫描转速（RPM）
    pub scan_speed: f64,

    /// 单步动作确认超时（毫秒）
    pub step_timeout_ms: u64,

    /// 放置区（类别 -> 角度/距离）
    pub zones: PlacementZones,
}

impl Default for CliConfig {
    fn default() -> Self {
        let controller = ControllerConfig::default();
        Self {
            port: None,
            baud_rate: None,
            scan_speed: controller.scan_speed,
            step_timeout_ms: controller.step_timeout_ms,
            zones: PlacementZones::default(),
        }
    }
}

impl CliConfig {
    /// 加载配置，文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;

        // 类别名统一小写
        let zones: Vec<_> = config.zones.iter().map(|(k, z)| (k.to_lowercase(), *z)).collect();
        config.zones = PlacementZones::empty();
        for (class, zone) in zones {
            config.zones.set(&class, zone);
        }
        Ok(config)
    }

    /// 保存配置（自动创建目录）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, format!("# Sortbot CLI Configuration\n\n{}", content))
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 合并命令行参数后的链路配置
    pub fn link_config(&self, port: Option<&str>, baud_rate: Option<u32>) -> LinkConfig {
        let mut link = LinkConfig::default();
        if let Some(port) = port.or(self.port.as_deref()) {
            link.port = port.to_string();
        }
        if let Some(baud_rate) = baud_rate.or(self.baud_rate) {
            link.baud_rate = baud_rate;
        }
        link
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            scan_speed: self.scan_speed,
            step_timeout_ms: self.step_timeout_ms,
            ..ControllerConfig::default()
        }
    }
}
