use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::cache::{CacheEntry, CacheFunction, CachedData, Snapshot};
use crate::client::engine::RequestEngine;
use crate::error::RequestError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Command {
    Pause,
    Resume,
    Stop,
}

/// Outcome of waiting between two sweeps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Next {
    Sweep,
    Paused,
    Stop,
}

pub(crate) struct PollTask {
    engine: Arc<RequestEngine>,
    entries: Arc<Vec<CacheEntry>>,
    poll_interval: Duration,
    rx: mpsc::Receiver<Command>,
    paused: bool,
}

impl PollTask {
    pub(crate) fn new(
        engine: Arc<RequestEngine>,
        entries: Arc<Vec<CacheEntry>>,
        poll_interval: Duration,
        rx: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            engine,
            entries,
            poll_interval,
            rx,
            paused: false,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!("polling {} block(s)", self.entries.len());
        loop {
            let next = if self.paused {
                self.wait_for_resume().await
            } else {
                self.sweep().await;
                self.sleep().await
            };

            if next == Next::Stop {
                tracing::info!("polling stopped");
                return;
            }
        }
    }

    async fn sweep(&self) {
        for entry in self.entries.iter() {
            match self.poll(entry).await {
                Ok(data) => {
                    entry
                        .publish(Snapshot {
                            data,
                            updated: Instant::now(),
                        })
                        .await;
                }
                Err(err) => {
                    tracing::warn!(
                        "unable to poll {} {}: {}",
                        entry.block.function,
                        entry.block.range,
                        err
                    );
                }
            }
        }
    }

    async fn poll(&self, entry: &CacheEntry) -> Result<CachedData, RequestError> {
        let range = entry.block.range;
        let data = match entry.block.function {
            CacheFunction::ReadHoldingRegisters => CachedData::Registers(
                self.engine
                    .read_holding_registers(range.start, range.count)
                    .await?,
            ),
            CacheFunction::ReadInputRegisters => CachedData::Registers(
                self.engine
                    .read_input_registers(range.start, range.count)
                    .await?,
            ),
            CacheFunction::ReadInputStatus => CachedData::Bits(
                self.engine
                    .read_input_status(range.start, range.count)
                    .await?,
            ),
            CacheFunction::ReadMultipleCoils => CachedData::Bits(
                self.engine
                    .read_multiple_coils_status(range.start, range.count)
                    .await?,
            ),
        };
        Ok(data)
    }

    async fn sleep(&mut self) -> Next {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            tokio::select! {
                command = self.rx.recv() => match self.apply(command) {
                    // already running, keep the schedule
                    Next::Sweep => continue,
                    next => return next,
                },
                _ = tokio::time::sleep_until(deadline) => return Next::Sweep,
            }
        }
    }

    async fn wait_for_resume(&mut self) -> Next {
        let command = self.rx.recv().await;
        self.apply(command)
    }

    fn apply(&mut self, command: Option<Command>) -> Next {
        match command {
            Some(Command::Pause) => {
                tracing::info!("polling paused");
                self.paused = true;
                Next::Paused
            }
            Some(Command::Resume) => {
                if self.paused {
                    tracing::info!("polling resumed");
                }
                self.paused = false;
                Next::Sweep
            }
            // manager dropped
            Some(Command::Stop) | None => Next::Stop,
        }
    }
}
