use crate::prelude::*;
use crate::p1::LinePort;

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    /// The last reading failed and was replaced by zero.
    Degraded,
    Terminated,
}

/// Number of serial failures tolerated before the poller gives up. Never reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    count: u32,
    max: u32,
}

impl ErrorBudget {
    pub fn new(max: u32) -> Self {
        Self { count: 0, max }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Spends one error; false once the budget is used up.
    pub fn try_consume(&mut self) -> bool {
        if self.count < self.max {
            self.count += 1;
            true
        } else {
            false
        }
    }
}

/// Collects readings and hands back their mean once `size` have been pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AverageBlock {
    values: Vec<i64>,
    size: usize,
}

impl AverageBlock {
    pub fn new(size: usize) -> Self {
        Self {
            values: Vec::new(),
            size,
        }
    }

    /// Returns the truncated mean and empties the block when it is full. A
    /// size of 0 returns every value straight away.
    pub fn push(&mut self, value: i64) -> Option<i64> {
        self.values.push(value);

        if self.values.len() < self.size.max(1) {
            return None;
        }

        let mean = self.values.iter().sum::<i64>() / self.values.len() as i64;
        self.values.clear();
        Some(mean)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub struct Poller<P: LinePort> {
    reader: MeterReader<P>,
    budget: ErrorBudget,
    block: AverageBlock,
    state: LoopState,
    channels: Channels,
    event_log: EventLog,
}

impl<P: LinePort> Poller<P> {
    pub fn new(
        reader: MeterReader<P>,
        max_serial_errors: u32,
        block_size: usize,
        channels: Channels,
        event_log: EventLog,
    ) -> Self {
        Self {
            reader,
            budget: ErrorBudget::new(max_serial_errors),
            block: AverageBlock::new(block_size),
            state: LoopState::Running,
            channels,
            event_log,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn budget(&self) -> &ErrorBudget {
        &self.budget
    }

    pub fn block(&self) -> &AverageBlock {
        &self.block
    }

    pub fn reader(&self) -> &MeterReader<P> {
        &self.reader
    }

    /// Takes one reading and feeds it to the display and the averaging block.
    ///
    /// Failed readings count as zero unless the serial error budget is spent
    /// or the failure is not one of the known kinds, in which case the poller
    /// terminates. Errors returned from here come from the event log only.
    pub fn tick(&mut self) -> Result<LoopState> {
        if self.state == LoopState::Terminated {
            return Ok(self.state);
        }

        let reading = match self.reader.read_power() {
            Ok(reading) => {
                self.state = LoopState::Running;
                reading
            }
            Err(err) => match self.recover(err)? {
                Some(reading) => reading,
                None => return Ok(self.state),
            },
        };

        self.accept(reading);

        Ok(self.state)
    }

    fn recover(&mut self, err: ReadError) -> Result<Option<PowerReading>> {
        self.record(&err)?;

        match err {
            ReadError::Serial { .. } => {
                if self.budget.try_consume() {
                    warn!(
                        "{} (serial error {}/{})",
                        err,
                        self.budget.count(),
                        self.budget.max()
                    );
                    self.state = LoopState::Degraded;
                    Ok(Some(PowerReading::ZERO))
                } else {
                    error!("{}", err);
                    let message = format!(
                        "more than {} serial port errors, stopping",
                        self.budget.max()
                    );
                    error!("{}", message);
                    self.event_log.append(&message, None)?;
                    self.state = LoopState::Terminated;
                    Ok(None)
                }
            }
            ReadError::MatchNotFound(_) | ReadError::Conversion(_) => {
                warn!("{}", err);
                self.state = LoopState::Degraded;
                Ok(Some(PowerReading::ZERO))
            }
            ReadError::Unclassified(_) => {
                error!("{}, stopping", err);
                self.state = LoopState::Terminated;
                Ok(None)
            }
        }
    }

    fn record(&self, err: &ReadError) -> Result<()> {
        let mut cause: Option<&dyn std::error::Error> = std::error::Error::source(err);
        let mut trace = None;
        while let Some(inner) = cause {
            trace = Some(inner.to_string());
            cause = inner.source();
        }

        self.event_log.append(&err.to_string(), trace.as_deref())
    }

    fn accept(&mut self, reading: PowerReading) {
        let value = reading.selected();
        debug!("{} W ({:?})", value, self.state);

        let _ = self.channels.latest_reading.send(reading);

        if let Some(mean) = self.block.push(value) {
            debug!("block full, storing average {} W", mean);
            if self
                .channels
                .to_database
                .send(database::ChannelData::Reading(mean))
                .is_err()
            {
                warn!("no database listening, block average {} W dropped", mean);
            }
        }
    }

    /// Ticks every `interval` until terminated, shut down, or `runtime` has
    /// elapsed.
    ///
    /// Needs a multi-threaded runtime: each read blocks on the serial port
    /// inside `block_in_place`.
    pub async fn run(
        &mut self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
        runtime: Option<Duration>,
    ) -> Result<LoopState> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = runtime.map(|runtime| Instant::now() + runtime);

        info!("poller starting, interval {:?}", interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => {
                    info!("poller received shutdown signal");
                    break;
                }
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                info!("runtime limit reached");
                break;
            }

            if tokio::task::block_in_place(|| self.tick())? == LoopState::Terminated {
                break;
            }
        }

        info!("poller exiting in state {:?}", self.state);

        Ok(self.state)
    }
}
