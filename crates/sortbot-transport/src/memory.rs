//! 进程内双工传输
//!
//! 两个端点通过一对 crossbeam 通道相连，行为与串口一致：
//! 读超时返回 `Ok(0)`，对端 drop 后返回 `TransportError::Closed`。

use crate::{Transport, TransportError};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::trace;

/// 内存传输端点
pub struct MemoryTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    read_timeout: Duration,
}

impl MemoryTransport {
    /// 创建一对互联端点
    ///
    /// # Example
    ///
    /// ```
    /// use sortbot_transport::{MemoryTransport, Transport};
    /// use std::time::Duration;
    ///
    /// let (mut host, mut arm) = MemoryTransport::pair(Duration::from_millis(5));
    /// host.write_all(b"ping\n").unwrap();
    ///
    /// let mut buf = [0u8; 16];
    /// let n = arm.read(&mut buf).unwrap();
    /// assert_eq!(&buf[..n], b"ping\n");
    /// ```
    pub fn pair(read_timeout: Duration) -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            Self {
                tx: a_tx,
                rx: a_rx,
                pending: VecDeque::new(),
                read_timeout,
            },
            Self {
                tx: b_tx,
                rx: b_rx,
                pending: VecDeque::new(),
                read_timeout,
            },
        )
    }

    fn drain_into(&mut self, buffer: &mut [u8]) -> usize {
        let n = buffer.len().min(self.pending.len());
        for (slot, byte) in buffer.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        if buffer.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            match self.rx.recv_timeout(self.read_timeout) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => return Ok(0),
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            }
        }

        // 顺带取走已到达的其它块，减少读调用次数
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let n = self.drain_into(buffer);
        trace!("MemoryTransport read {} bytes", n);
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if data.is_empty() {
            return Ok(());
        }
        self.tx.send(data.to_vec()).map_err(|_| TransportError::Closed)
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize, TransportError> {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.pending.is_empty() {
                        return Err(TransportError::Closed);
                    }
                    break;
                },
            }
        }
        Ok(self.pending.len())
    }
}
