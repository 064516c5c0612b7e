//! REPL 模式（交互式 Shell）
//!
//! 专用输入线程 + crossbeam 通道，保留历史记录。
//! 输入线程在主线程处理完一条命令（收到 ack）后才读取下一行，
//! 命令执行期间的 `inquire` 提示不会与 readline 抢终端。

use super::Interrupt;
use crate::commands::{PickCommand, ScanCommand, status};
use crate::config::CliConfig;
use crate::session::{ConnectOptions, Session};
use crate::validation::parse_speed;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use sortbot_sdk::{ArmController, ScanEntry};
use std::panic;
use std::thread;

const HISTORY_FILE: &str = ".sortbot_history";

/// 输入线程发来的事件
#[derive(Debug, Clone, PartialEq)]
enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
}

/// REPL 会话（保持连接和最近一次扫描结果）
pub struct ReplSession {
    options: ConnectOptions,
    config: CliConfig,
    session: Option<Session>,
    entries: Vec<ScanEntry>,
    interrupt: Interrupt,
}

impl ReplSession {
    pub fn new(options: ConnectOptions, config: CliConfig, interrupt: Interrupt) -> Self {
        Self {
            options,
            config,
            session: None,
            entries: Vec::new(),
            interrupt,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn connect(&mut self, port: Option<&str>) -> Result<()> {
        if self.is_connected() {
            println!("⚠️  已经连接");
            return Ok(());
        }
        if let Some(port) = port {
            self.options.port = Some(port.to_string());
        }
        self.session = Some(Session::connect(&self.options, &self.config)?);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.session.take().is_some() {
            self.entries.clear();
            println!("✅ 已断开");
        } else {
            println!("⚠️  未连接");
        }
    }

    fn controller(&self) -> Result<&ArmController> {
        self.session
            .as_ref()
            .map(Session::controller)
            .ok_or_else(|| anyhow::anyhow!("未连接，请先使用 connect 命令"))
    }

    fn status(&self) -> String {
        match &self.session {
            Some(session) => {
                let link = session.controller().link();
                let stats = link.stats();
                format!(
                    "已连接 {} | 物体 {} | 收 {} 发 {} 丢帧 {}",
                    link.endpoint().unwrap_or("?"),
                    self.entries.len(),
                    stats.messages_received,
                    stats.messages_sent,
                    stats.frames_dropped
                )
            },
            None => "未连接".to_string(),
        }
    }

    /// 命令执行期间按过 Ctrl+C 时回到安全位姿
    fn handle_interrupt(&self) {
        if let Ok(controller) = self.controller()
            && let Err(e) = self.interrupt.bail_if_set(controller)
        {
            eprintln!("🛑 {}", e);
        }
        self.interrupt.clear();
    }

    /// 处理一条命令
    fn handle_command(&mut self, line: &str) -> Result<()> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            return Ok(());
        };

        match command {
            "connect" => self.connect(parts.get(1).copied())?,
            "disconnect" => self.disconnect(),
            "check" | "c" => status::check(self.controller()?)?,
            "safety" | "s" => status::safety(self.controller()?)?,
            "scan" | "n" => {
                let speed = parts.get(1).map(|s| parse_speed(s)).transpose()?;
                let args = ScanCommand { speed, json: false };
                self.entries = args.execute(self.controller()?)?;
            },
            "list" | "l" => crate::commands::scan::print_entries(&self.entries),
            "pick" | "p" => {
                let index = parts.get(1).map(|s| s.parse::<usize>()).transpose()?;
                let args = PickCommand { index, yes: false };
                args.pick_from(self.controller()?, &self.entries)?;
            },
            "recover" => {
                self.controller()?.recover()?;
                println!("✅ 已回到安全位姿");
            },
            "angles" | "a" => status::angles(self.controller()?, false)?,
            "zones" => {
                for (class, zone) in self.config.zones.iter() {
                    println!("  {:<10} {:>5.0}° {:>5.0}mm", class, zone.angle, zone.distance);
                }
            },
            _ => anyhow::bail!("未知命令: {}", command),
        }
        Ok(())
    }
}

/// REPL 输入（专用输入线程）
struct ReplInput {
    event_rx: Receiver<InputEvent>,
    ack_tx: Sender<()>,
    _input_thread: thread::JoinHandle<()>,
}

impl ReplInput {
    fn new() -> Result<Self> {
        let (event_tx, event_rx) = bounded::<InputEvent>(10);
        let (ack_tx, ack_rx) = bounded::<()>(1);

        let input_thread = thread::Builder::new()
            .name("sortbot-repl-input".to_string())
            .spawn(move || {
                // Editor 在输入线程内创建，生命周期 = REPL 会话
                let mut rl = match DefaultEditor::new() {
                    Ok(rl) => rl,
                    Err(e) => {
                        eprintln!("Failed to initialize readline: {}", e);
                        let _ = event_tx.send(InputEvent::Eof);
                        return;
                    },
                };
                let _ = rl.load_history(HISTORY_FILE);

                loop {
                    let event = match rl.readline("sortbot> ") {
                        Ok(line) => {
                            let line = line.trim().to_string();
                            if line.is_empty() {
                                continue;
                            }
                            let _ = rl.add_history_entry(line.as_str());
                            InputEvent::Line(line)
                        },
                        Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                        Err(ReadlineError::Eof) => InputEvent::Eof,
                        Err(err) => {
                            eprintln!("Error: {:?}", err);
                            InputEvent::Eof
                        },
                    };

                    let last = event == InputEvent::Eof
                        || matches!(&event, InputEvent::Line(l) if l == "exit" || l == "quit");
                    if event_tx.send(event).is_err() || last {
                        break;
                    }
                    // 等主线程处理完再读下一行
                    if ack_rx.recv().is_err() {
                        break;
                    }
                }
                let _ = rl.save_history(HISTORY_FILE);
            })?;

        Ok(Self {
            event_rx,
            ack_tx,
            _input_thread: input_thread,
        })
    }

    fn recv(&self) -> Option<InputEvent> {
        self.event_rx.recv().ok()
    }

    fn ack(&self) {
        let _ = self.ack_tx.send(());
    }
}

/// 运行 REPL 模式
pub fn run_repl(options: ConnectOptions, config: CliConfig, interrupt: Interrupt) -> Result<()> {
    let mut session = ReplSession::new(options, config, interrupt);
    let input = ReplInput::new()?;

    println!("Sortbot CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
    println!("输入 'help' 查看帮助，'exit' 退出");
    println!();

    while let Some(event) = input.recv() {
        match event {
            InputEvent::Eof => break,
            InputEvent::Interrupted => {
                println!("^C（输入 'exit' 退出）");
            },
            InputEvent::Line(line) => match line.as_str() {
                "exit" | "quit" => break,
                "help" => print_help(),
                "status" => println!("📊 状态: {}", session.status()),
                _ => {
                    // 错误隔离：命令 panic 不结束 REPL
                    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
                        session.handle_command(&line)
                    }));
                    match result {
                        Ok(Ok(())) => {},
                        Ok(Err(err)) => {
                            eprintln!("❌ Error: {:#}", err);
                            print_help_hint(&line);
                        },
                        Err(panic_err) => eprintln!("❌ Command panicked: {:?}", panic_err),
                    }
                    session.handle_interrupt();
                },
            },
        }
        input.ack();
    }

    println!("👋 再见！");
    Ok(())
}

fn print_help() {
    println!("可用命令:");
    println!("  connect [port]                连接到机械臂（可选串口）");
    println!("  disconnect                    断开连接");
    println!("  check | c                     自检");
    println!("  safety | s                    安全服务（复位到初始位姿）");
    println!("  scan | n [speed]              旋转扫描");
    println!("  list | l                      列出扫描结果");
    println!("  pick | p [index]              抓取并放置（省略序号时交互选择）");
    println!("  recover                       抬臂、张开夹爪、底座回零");
    println!("  angles | a                    查询关节角度");
    println!("  zones                         显示放置区");
    println!("  status                        显示连接状态");
    println!("  help                          显示帮助");
    println!("  exit / quit                   退出");
    println!();
}

fn print_help_hint(command: &str) {
    if command.starts_with("scan") || command.starts_with('n') {
        eprintln!("💡 提示: 使用 'scan' 或 'scan 20' 扫描");
    } else if command.starts_with("pick") || command.starts_with('p') {
        eprintln!("💡 提示: 先 'scan'，再 'pick' 或 'pick 1'");
    } else if command.starts_with("connect") {
        eprintln!("💡 提示: 使用 'connect' 或 'connect /dev/ttyACM0' 连接");
    } else {
        eprintln!("💡 提示: 输入 'help' 查看所有命令");
    }
}
