//! 连接会话
//!
//! 真实串口或进程内仿真机械臂，对上层都表现为一个 `ArmController`。

use crate::config::CliConfig;
use anyhow::{Context, Result};
use sortbot_sdk::onboard::OnboardConfig;
use sortbot_sdk::simulation::{SimulatedArm, demo_scene};
use sortbot_sdk::{ArmController, LinkBuilder};
use tracing::info;

/// 仿真链路的端点名
const SIM_ENDPOINT: &str = "sim";

/// 连接参数（命令行优先于配置文件）
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub simulate: bool,
}

/// 已连接的会话
pub struct Session {
    controller: ArmController,
    // 在控制器之后析构：先关链路，再停仿真
    _sim: Option<SimulatedArm>,
}

impl Session {
    pub fn connect(options: &ConnectOptions, config: &CliConfig) -> Result<Self> {
        let mut link_config = config.link_config(options.port.as_deref(), options.baud_rate);

        let (link, sim) = if options.simulate {
            println!("🧪 使用仿真机械臂");
            link_config.port = SIM_ENDPOINT.to_string();
            let builder = LinkBuilder::new().link_config(link_config);
            let (sim, link) = SimulatedArm::connect(demo_scene(), OnboardConfig::default(), builder)
                .context("启动仿真机械臂失败")?;
            (link, Some(sim))
        } else {
            println!("⏳ 连接到 {} @ {} baud...", link_config.port, link_config.baud_rate);
            let link = LinkBuilder::new()
                .link_config(link_config.clone())
                .connect()
                .with_context(|| format!("无法打开串口 {}", link_config.port))?;
            (link, None)
        };
        info!("Connected to {}", link.endpoint().unwrap_or("?"));
        println!("✅ 已连接");

        let controller =
            ArmController::with_config(link, config.zones.clone(), config.controller_config());
        Ok(Self {
            controller,
            _sim: sim,
        })
    }

    pub fn controller(&self) -> &ArmController {
        &self.controller
    }
}
