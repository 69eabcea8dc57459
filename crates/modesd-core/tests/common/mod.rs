//! Scripted transport used by the protocol tests.

use std::io::{self, Read, Write};
use std::time::Duration;

use modesd_core::transport::Transport;

/// In-memory transport: reads come from a pre-loaded script, writes are
/// captured, DTR transitions are recorded.
pub struct MockTransport {
    rx: Vec<u8>,
    rx_pos: usize,
    pub tx: Vec<u8>,
    pub dtr_events: Vec<bool>,
    pub timeouts: Vec<Duration>,
}

impl MockTransport {
    pub fn with_script(rx: impl Into<Vec<u8>>) -> Self {
        Self {
            rx: rx.into(),
            rx_pos: 0,
            tx: Vec::new(),
            dtr_events: Vec::new(),
            timeouts: Vec::new(),
        }
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx_pos >= self.rx.len() {
            return Ok(0); // end of stream
        }
        let n = buf.len().min(self.rx.len() - self.rx_pos);
        buf[..n].copy_from_slice(&self.rx[self.rx_pos..self.rx_pos + n]);
        self.rx_pos += n;
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeouts.push(timeout);
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        self.dtr_events.push(level);
        Ok(())
    }
}
