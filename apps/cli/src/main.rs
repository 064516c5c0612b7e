//! # Sortbot CLI
//!
//! Command-line interface for the sortbot sorting arm.
//!
//! ## 双模式架构
//!
//! ### One-shot 模式（推荐用于脚本）
//!
//! ```bash
//! # 配置默认串口
//! sortbot-cli config set --port /dev/ttyACM1
//!
//! # 执行操作（内部：连接 -> 执行 -> 断开）
//! sortbot-cli check
//! sortbot-cli run --yes --index 1
//! ```
//!
//! ### REPL 模式（推荐用于调试）
//!
//! ```bash
//! $ sortbot-cli --simulate shell
//! sortbot> connect
//! sortbot> scan
//! sortbot> pick 1
//! sortbot> exit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod modes;
mod session;
mod validation;

use commands::{ConfigCommand, PickCommand, RunCommand, ScanCommand};
use config::CliConfig;
use modes::Interrupt;
use modes::oneshot::OneShotMode;
use modes::repl::run_repl;
use session::ConnectOptions;

/// Sortbot CLI - 分拣机械臂命令行工具
#[derive(Parser, Debug)]
#[command(name = "sortbot-cli")]
#[command(about = "Command-line interface for the sortbot sorting arm", long_about = None)]
#[command(version)]
struct Cli {
    /// 串口设备（覆盖配置）
    #[arg(long, global = true)]
    port: Option<String>,

    /// 波特率（覆盖配置）
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// 使用进程内仿真机械臂
    #[arg(long, global = true)]
    simulate: bool,

    /// 配置文件路径（默认 <config_dir>/sortbot/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 自检（传感器与电机是否在线）
    Check,

    /// 安全服务（复位到初始位姿）
    Safety,

    /// 旋转扫描并列出物体
    Scan {
        #[command(flatten)]
        args: ScanCommand,
    },

    /// 扫描后抓取一个物体并放到其放置区
    Pick {
        #[command(flatten)]
        args: PickCommand,
    },

    /// 完整流程：自检、安全复位、扫描、选择、抓取并放置
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 查询关节角度
    Angles {
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },

    /// 启动交互式 Shell（REPL 模式）
    Shell,
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sortbot_cli=info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => config::default_path()?,
    };
    let options = ConnectOptions {
        port: cli.port,
        baud_rate: cli.baud,
        simulate: cli.simulate,
    };

    if let Commands::Config(cmd) = cli.command {
        // 配置管理不需要连接
        return cmd.execute(&config_path);
    }

    let config = CliConfig::load(&config_path)?;
    let interrupt = Interrupt::install()?;

    if let Commands::Shell = cli.command {
        return run_repl(options, config, interrupt);
    }

    let mode = OneShotMode::new(&options, &config, interrupt)?;
    match cli.command {
        Commands::Check => mode.check(),
        Commands::Safety => mode.safety(),
        Commands::Scan { args } => mode.scan(&args),
        Commands::Pick { args } => mode.pick(&args),
        Commands::Run { args } => mode.run(&args),
        Commands::Angles { json } => mode.angles(json),
        Commands::Config(_) | Commands::Shell => Ok(()),
    }
}
