pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::str::FromStr;
pub use tokio::sync::broadcast;

pub use crate::channels::Channels;
pub use crate::config::{self, Config};
pub use crate::database::{self, Database};
pub use crate::event_log::EventLog;
pub use crate::p1::{self, MeterReader, PowerReading, ReadError};
pub use crate::poller::{LoopState, Poller};
