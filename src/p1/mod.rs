//! Acquisition of instantaneous power values from a DSMR smart meter's P1 port.
//!
//! The meter pushes a multi-line telegram every second. Only two registers are
//! of interest here:
//!
//! ```text
//! 1-0:1.7.0(01.193*kW)   active power delivered to the premises
//! 1-0:2.7.0(00.000*kW)   active power returned to the grid
//! ```
//!
//! [`MeterReader::read_power`] opens the port, scans one telegram for both
//! lines, validates the values and closes the port again.

pub mod port;
pub mod reader;
pub mod scanner;
pub mod validator;

pub use port::{LinePort, PortError, PortSettings, SerialLinePort};
pub use reader::{MeterReader, PowerReading, ReadError, SerialStage};
pub use scanner::{ScanError, TelegramScanner, Tokens};
pub use validator::ConversionError;
