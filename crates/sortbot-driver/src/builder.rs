//! Builder 模式实现
//!
//! 提供链式构造 `ArmLink` 实例的便捷方式。

use crate::error::DriverError;
use crate::link::ArmLink;
use crate::pipeline::LinkConfig;
use crate::vision::VisionPipeline;
use sortbot_transport::Transport;

/// ArmLink Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use sortbot_driver::LinkBuilder;
///
/// let link = LinkBuilder::new()
///     .port("/dev/ttyUSB0")
///     .baud_rate(115_200)
///     .connect()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct LinkBuilder {
    config: LinkConfig,
    vision: Option<VisionPipeline>,
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置串口设备（默认 `/dev/ttyACM1`）
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.config.port = port.into();
        self
    }

    /// 设置波特率（默认 115200）
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// 设置等待方轮询间隔（毫秒）
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// 设置单次读超时（毫秒）
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// 整体替换链路配置
    pub fn link_config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// 启用检测分类
    pub fn vision(mut self, vision: VisionPipeline) -> Self {
        self.vision = Some(vision);
        self
    }

    /// 构建未连接的实例
    pub fn build(self) -> ArmLink {
        ArmLink::with_vision(self.config, self.vision)
    }

    /// 构建并打开配置中的串口
    #[cfg(feature = "serial")]
    pub fn connect(self) -> Result<ArmLink, DriverError> {
        let port = self.config.port.clone();
        let baud_rate = self.config.baud_rate;
        let mut link = self.build();
        link.connect(&port, baud_rate)?;
        Ok(link)
    }

    /// 构建并使用给定传输连接
    pub fn connect_with<T>(self, transport: T) -> Result<ArmLink, DriverError>
    where
        T: Transport + 'static,
    {
        let endpoint = self.config.port.clone();
        let mut link = self.build();
        link.connect_with(transport, &endpoint)?;
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sortbot_transport::MemoryTransport;
    use std::time::Duration;

    #[test]
    fn test_builder_overrides() {
        let link = LinkBuilder::new()
            .port("/dev/ttyUSB7")
            .baud_rate(57_600)
            .poll_interval_ms(3)
            .read_timeout_ms(4)
            .build();
        assert_eq!(link.config().port, "/dev/ttyUSB7");
        assert_eq!(link.config().baud_rate, 57_600);
        assert_eq!(link.config().poll_interval(), Duration::from_millis(3));
        assert_eq!(link.config().read_timeout(), Duration::from_millis(4));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_connect_with_memory_transport() {
        let (host, _arm) = MemoryTransport::pair(Duration::from_millis(2));
        let link = LinkBuilder::new().port("sim").connect_with(host).unwrap();
        assert!(link.is_connected());
        assert_eq!(link.endpoint(), Some("sim"));
    }
}
