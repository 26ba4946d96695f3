use crate::prelude::*;
use crate::p1::port::{LinePort, PortError};
use crate::p1::scanner::{ScanError, TelegramScanner};
use crate::p1::validator::{self, ConversionError};

use serde::Serialize;

/// Instantaneous power in watts. Delivered is never negative, returned never
/// positive, and the meter only ever reports one of them as non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PowerReading {
    pub delivered_watts: i64,
    pub returned_watts: i64,
}

impl PowerReading {
    /// Stand-in for a reading that could not be taken.
    pub const ZERO: Self = Self {
        delivered_watts: 0,
        returned_watts: 0,
    };

    pub fn from_kilowatts(delivered: f64, returned: f64) -> Self {
        Self {
            delivered_watts: (delivered * 1000.0).round() as i64,
            returned_watts: (returned * -1000.0).round() as i64,
        }
    }

    /// The value that is shown and stored: delivered power when there is
    /// any, otherwise the (negative) returned power, otherwise zero.
    pub fn selected(&self) -> i64 {
        if self.delivered_watts > 0 {
            self.delivered_watts
        } else if self.returned_watts < 0 {
            self.returned_watts
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialStage {
    Open,
    Read,
    Close,
}

impl std::fmt::Display for SerialStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SerialStage::Open => "open",
            SerialStage::Read => "read",
            SerialStage::Close => "close",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("serial port failure on {stage}: {source}")]
    Serial {
        stage: SerialStage,
        #[source]
        source: PortError,
    },

    #[error(transparent)]
    MatchNotFound(#[from] ScanError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("unexpected error while reading meter: {0:#}")]
    Unclassified(anyhow::Error),
}

impl ReadError {
    /// Serial, match and conversion failures can be ridden out by the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ReadError::Unclassified(_))
    }

    fn from_port(stage: SerialStage, err: anyhow::Error) -> Self {
        match err.downcast::<PortError>() {
            Ok(source) => ReadError::Serial { stage, source },
            Err(err) => ReadError::Unclassified(err),
        }
    }

    fn from_scan(err: anyhow::Error) -> Self {
        match err.downcast::<ScanError>() {
            Ok(err) => ReadError::MatchNotFound(err),
            Err(err) => Self::from_port(SerialStage::Read, err),
        }
    }
}

pub struct MeterReader<P: LinePort> {
    port: P,
    scanner: TelegramScanner,
}

impl<P: LinePort> MeterReader<P> {
    pub fn new(port: P) -> Self {
        Self {
            port,
            scanner: TelegramScanner::new(),
        }
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    /// Reads one telegram and returns the current power.
    ///
    /// The port is opened on demand and closed again before returning, on
    /// every path. If closing fails that failure is returned, even when the
    /// read itself had already failed.
    pub fn read_power(&mut self) -> Result<PowerReading, ReadError> {
        let result = self.acquire();

        match (result, self.port.close()) {
            (result, Ok(())) => result,
            (Ok(_), Err(err)) => Err(ReadError::from_port(SerialStage::Close, err)),
            (Err(earlier), Err(err)) => {
                warn!("dropping earlier failure, port close failed too: {}", earlier);
                Err(ReadError::from_port(SerialStage::Close, err))
            }
        }
    }

    fn acquire(&mut self) -> Result<PowerReading, ReadError> {
        if !self.port.is_open() {
            self.port
                .open()
                .map_err(|err| ReadError::from_port(SerialStage::Open, err))?;
        }

        let tokens = self
            .scanner
            .scan(&mut self.port)
            .map_err(ReadError::from_scan)?;

        let delivered = validator::validate(Some(tokens.delivered.as_str()))?;
        let returned = validator::validate(Some(tokens.returned.as_str()))?;

        let reading = PowerReading::from_kilowatts(delivered, returned);
        debug!(
            "telegram {}/{} kW -> {:?}",
            tokens.delivered, tokens.returned, reading
        );

        Ok(reading)
    }
}
