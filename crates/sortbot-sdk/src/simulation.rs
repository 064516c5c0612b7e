//! 进程内仿真机械臂
//!
//! 在后台线程上运行 `OnboardRuntime`（仿真硬件 + 虚拟时钟），
//! 主机侧通过内存管道连接，行为与串口一致。

use sortbot_driver::{ArmLink, DriverError, LinkBuilder};
use sortbot_onboard::sim::{SimArm, SimObject};
use sortbot_onboard::{OnboardConfig, OnboardError, OnboardRuntime};
use sortbot_transport::MemoryTransport;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// 内存管道读超时
const SIM_READ_TIMEOUT: Duration = Duration::from_millis(5);

/// 演示场景：三个物体分布在一圈上
pub fn demo_scene() -> SimArm {
    SimArm::new()
        .with_object(SimObject::new(90.0, 15.0, 120.0, 5))
        .with_object(SimObject::new(200.0, 10.0, 180.0, 3))
        .with_object(SimObject::new(300.0, 12.0, 250.0, 4))
}

/// 运行中的仿真机械臂
///
/// Drop 时停止运行时线程并等待其退出。
pub struct SimulatedArm {
    sim: SimArm,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), OnboardError>>>,
}

impl SimulatedArm {
    /// 启动运行时线程，返回主机侧传输端点
    pub fn spawn(sim: SimArm, config: OnboardConfig) -> Result<(Self, MemoryTransport), DriverError> {
        let (host, arm) = MemoryTransport::pair(SIM_READ_TIMEOUT);
        let mut runtime = OnboardRuntime::new(arm, sim.hardware(), Arc::new(sim.clock()), config);
        let stop = runtime.stop_handle();

        let thread = thread::Builder::new()
            .name("sortbot-sim".to_string())
            .spawn(move || runtime.run())
            .map_err(|e| DriverError::IoThread(e.to_string()))?;
        info!("Simulated arm started");

        Ok((
            Self {
                sim,
                stop,
                thread: Some(thread),
            },
            host,
        ))
    }

    /// 启动并用 `builder` 的配置连上
    pub fn connect(
        sim: SimArm,
        config: OnboardConfig,
        builder: LinkBuilder,
    ) -> Result<(Self, ArmLink), DriverError> {
        let (arm, host) = Self::spawn(sim, config)?;
        let link = builder.connect_with(host)?;
        Ok((arm, link))
    }

    /// 仿真世界（观察状态用）
    pub fn sim(&self) -> &SimArm {
        &self.sim
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// 停止运行时并取回其退出结果
    pub fn shutdown(mut self) -> Result<(), OnboardError> {
        self.stop_and_join().unwrap_or(Ok(()))
    }

    fn stop_and_join(&mut self) -> Option<Result<(), OnboardError>> {
        self.stop.store(false, Ordering::Release);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(result) => Some(result),
            Err(_) => {
                warn!("Simulated arm thread panicked");
                None
            },
        }
    }
}

impl Drop for SimulatedArm {
    fn drop(&mut self) {
        if let Some(Err(e)) = self.stop_and_join() {
            // 主机先断开时运行时以传输错误退出
            info!("Simulated arm stopped: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_stops_thread() {
        let (arm, _host) = SimulatedArm::spawn(SimArm::new(), OnboardConfig::default()).unwrap();
        assert!(arm.is_running());
        assert!(arm.shutdown().is_ok());
    }

    #[test]
    fn test_host_drop_ends_runtime() {
        let (arm, host) = SimulatedArm::spawn(demo_scene(), OnboardConfig::default()).unwrap();
        drop(host);

        // 运行时自行退出，不依赖停止标志
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while arm.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!arm.is_running());
        assert!(matches!(
            arm.shutdown(),
            Err(OnboardError::Transport(sortbot_transport::TransportError::Closed))
        ));
    }
}
