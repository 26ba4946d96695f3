use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Channels {
    pub to_database: broadcast::Sender<database::ChannelData>,
    pub latest_reading: broadcast::Sender<PowerReading>,
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

impl Channels {
    pub fn new() -> Self {
        Self {
            to_database: Self::channel(),
            latest_reading: Self::channel(),
        }
    }

    fn channel<T: Clone>() -> broadcast::Sender<T> {
        broadcast::channel(2048).0
    }
}
