//! # Sortbot Transport
//!
//! 字节流传输抽象层，提供统一的读写接口。
//!
//! - `SerialTransport`: UART 串口（`serial` feature）
//! - `MemoryTransport`: 进程内双工管道，用于测试和仿真

use thiserror::Error;

pub mod memory;
#[cfg(feature = "serial")]
pub mod serial;

pub use memory::MemoryTransport;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// 对端已关闭
    #[error("Transport closed")]
    Closed,

    #[error("Transport not open: {0}")]
    NotOpen(String),
}

impl TransportError {
    /// 是否为不可恢复错误（需要重新建立连接）
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Closed | TransportError::NotOpen(_) => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ),
            #[cfg(feature = "serial")]
            TransportError::Serial(e) => matches!(e.kind(), serialport::ErrorKind::NoDevice),
        }
    }
}

/// 字节流传输 trait
///
/// 实现方必须保证同一连接内的字节按写入顺序送达。
pub trait Transport: Send {
    /// 读取数据到缓冲区，返回读取的字节数
    ///
    /// 读超时返回 `Ok(0)`，不视为错误。
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError>;

    /// 写入全部数据
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// 刷新待发送数据（阻塞直到完成）
    fn flush(&mut self) -> Result<(), TransportError>;

    /// 可立即读取的字节数（无法得知时返回 0）
    fn available(&mut self) -> Result<usize, TransportError> {
        Ok(0)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buffer)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(data)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush()
    }

    fn available(&mut self) -> Result<usize, TransportError> {
        (**self).available()
    }
}
