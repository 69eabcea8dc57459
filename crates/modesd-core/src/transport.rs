//! Byte transport abstraction
//!
//! The decode layer is handed an already-opened, byte-oriented duplex
//! channel and never configures line speed or discipline beyond the basic
//! 8N1 setup done at open time. Read timeouts are an explicit deadline on
//! the channel, not a process-wide alarm.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::DeviceError;

/// Baud rate both supported receiver families run at.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Abstraction over the opened duplex channel a device session owns.
pub trait Transport: Read + Write + Send {
    /// Set the deadline honored by subsequent blocking reads.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard any pending input bytes.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Drive the DTR control line (used for hardware reset pulses).
    fn set_dtr(&mut self, level: bool) -> io::Result<()>;
}

/// Serial port transport used for real devices.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `path` at 115200 8N1 with no flow control.
    pub fn open(path: &str) -> Result<Self, DeviceError> {
        let mut port = serialport::new(path, DEFAULT_BAUD_RATE)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| DeviceError::Serial(format!("unable to open {path}: {e}")))?;

        port.set_data_bits(serialport::DataBits::Eight)
            .map_err(|e| DeviceError::Serial(e.to_string()))?;
        port.set_parity(serialport::Parity::None)
            .map_err(|e| DeviceError::Serial(e.to_string()))?;
        port.set_stop_bits(serialport::StopBits::One)
            .map_err(|e| DeviceError::Serial(e.to_string()))?;
        port.set_flow_control(serialport::FlowControl::None)
            .map_err(|e| DeviceError::Serial(e.to_string()))?;

        Ok(Self { port })
    }
}

impl Read for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Transport for SerialTransport {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// Fill `buf` exactly, mapping the three read outcomes the callers must
/// tell apart: timeout, end of stream, transport failure.
pub fn readn<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<(), DeviceError> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => return Err(DeviceError::Eof),
            Ok(n) => filled += n,
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                return Err(DeviceError::Timeout);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Read one `\n`-terminated line, stripping the terminator and any trailing
/// `\r`. Bounded at `max` bytes; an overlong line is returned truncated so
/// the caller's dialog can reject it rather than buffer without limit.
pub fn read_line<R: Read + ?Sized>(r: &mut R, max: usize) -> Result<String, DeviceError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while line.len() < max {
        readn(r, &mut byte)?;
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    while line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(String::from_utf8_lossy(&line).into_owned())
}
