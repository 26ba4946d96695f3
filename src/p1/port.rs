use crate::prelude::*;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{BufRead, BufReader, ErrorKind};
use std::time::Duration;

/// Fixed by DSMR 5: 115200 baud, 8-N-1, no flow control.
pub const BAUD_RATE: u32 = 115_200;
pub const READ_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("could not open serial port {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("no telegram line received within {0:?}")]
    Timeout(Duration),

    #[error("serial port reached end of stream")]
    Disconnected,

    #[error("serial port is not open")]
    NotOpen,

    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not close serial port {path}: {reason}")]
    Close { path: String, reason: String },
}

/// A line-oriented byte source, normally the meter's serial port.
///
/// Transport failures are reported as a [`PortError`] wrapped in the
/// returned `anyhow::Error`; the reader treats any other error type as
/// unclassified.
pub trait LinePort: Send {
    fn open(&mut self) -> Result<()>;

    /// Next `\n`-terminated line, terminator included.
    fn read_line(&mut self) -> Result<Vec<u8>>;

    /// Closing a port that is not open is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortSettings {
    pub path: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl PortSettings {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: BAUD_RATE,
            timeout: READ_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct SerialLinePort {
    settings: PortSettings,
    reader: Option<BufReader<Box<dyn SerialPort>>>,
}

impl SerialLinePort {
    pub fn new(settings: PortSettings) -> Self {
        Self {
            settings,
            reader: None,
        }
    }

    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }
}

impl LinePort for SerialLinePort {
    fn open(&mut self) -> Result<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        debug!(
            "opening {} at {} baud, timeout {:?}",
            self.settings.path, self.settings.baud_rate, self.settings.timeout
        );

        let port = serialport::new(&self.settings.path, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.settings.timeout)
            .open()
            .map_err(|err| PortError::Open {
                path: self.settings.path.clone(),
                reason: err.to_string(),
            })?;

        self.reader = Some(BufReader::new(port));
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        let reader = self.reader.as_mut().ok_or(PortError::NotOpen)?;

        let mut line = Vec::with_capacity(64);
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => Err(PortError::Disconnected.into()),
            Ok(_) => {
                trace!("rx {:?}", String::from_utf8_lossy(&line));
                Ok(line)
            }
            Err(err) if err.kind() == ErrorKind::TimedOut => {
                Err(PortError::Timeout(self.settings.timeout).into())
            }
            Err(err) => Err(PortError::Io(err).into()),
        }
    }

    fn close(&mut self) -> Result<()> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };

        // the device handle is released when `port` drops, whatever clear() returns
        let port = reader.into_inner();
        if let Err(err) = port.clear(ClearBuffer::All) {
            debug!("could not clear buffers of {}: {}", self.settings.path, err);
        }

        debug!("closed {}", self.settings.path);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }
}

impl Drop for SerialLinePort {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("{}", err);
        }
    }
}
