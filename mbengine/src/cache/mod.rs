use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::Instrument;

use crate::client::engine::RequestEngine;
use crate::error::{ConfigError, RequestError};
use crate::types::AddressRange;

pub(crate) mod task;

use task::{Command, PollTask};

/// Read operations whose results can be served from the cache
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum CacheFunction {
    /// Holding registers (FC 3)
    ReadHoldingRegisters,
    /// Input registers (FC 4)
    ReadInputRegisters,
    /// Discrete inputs (FC 2)
    ReadInputStatus,
    /// Coils (FC 1)
    ReadMultipleCoils,
}

impl CacheFunction {
    fn is_bits(self) -> bool {
        matches!(
            self,
            CacheFunction::ReadInputStatus | CacheFunction::ReadMultipleCoils
        )
    }
}

impl std::fmt::Display for CacheFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CacheFunction::ReadHoldingRegisters => "ReadHoldingRegisters",
            CacheFunction::ReadInputRegisters => "ReadInputRegisters",
            CacheFunction::ReadInputStatus => "ReadInputStatus",
            CacheFunction::ReadMultipleCoils => "ReadMultipleCoils",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for CacheFunction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ReadHoldingRegisters" => Ok(CacheFunction::ReadHoldingRegisters),
            "ReadInputRegisters" => Ok(CacheFunction::ReadInputRegisters),
            "ReadInputStatus" => Ok(CacheFunction::ReadInputStatus),
            "ReadMultipleCoils" => Ok(CacheFunction::ReadMultipleCoils),
            _ => Err(ConfigError::BadCacheBlock(
                s.to_string(),
                "unknown function name",
            )),
        }
    }
}

/// Range of one function kind polled in the background
///
/// Parsed from descriptors of the form `"FunctionName,startAddress,count"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheDataBlock {
    /// Function used to poll the block
    pub function: CacheFunction,
    /// Addresses covered by the block
    pub range: AddressRange,
}

impl CacheDataBlock {
    /// Create a block, checking the count against the per-function limit
    pub fn new(function: CacheFunction, start: u16, count: u16) -> Result<Self, ConfigError> {
        let describe = || format!("{function},{start},{count}");
        let range = AddressRange::try_from(start, count)
            .map_err(|_| ConfigError::BadCacheBlock(describe(), "invalid address range"))?;
        let limited = if function.is_bits() {
            range.of_read_bits()
        } else {
            range.of_read_registers()
        };
        let range = limited
            .map_err(|_| ConfigError::BadCacheBlock(describe(), "count exceeds one frame"))?;
        Ok(Self { function, range })
    }

    fn covers(&self, function: CacheFunction, range: &AddressRange) -> bool {
        self.function == function && self.range.contains(range)
    }
}

impl std::str::FromStr for CacheDataBlock {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |reason| ConfigError::BadCacheBlock(s.to_string(), reason);
        let fields: Vec<&str> = s.split(',').map(str::trim).collect();
        let [function, start, count] = fields.as_slice() else {
            return Err(bad("expected FunctionName,startAddress,count"));
        };
        let function: CacheFunction = function
            .parse()
            .map_err(|_| bad("unknown function name"))?;
        let start: u16 = start.parse().map_err(|_| bad("invalid start address"))?;
        let count: u16 = count.parse().map_err(|_| bad("invalid count"))?;
        Self::new(function, start, count).map_err(|err| match err {
            ConfigError::BadCacheBlock(_, reason) => bad(reason),
            other => other,
        })
    }
}

/// Blocks to poll and how often
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Blocks polled in order on every sweep
    pub blocks: Vec<CacheDataBlock>,
    /// Delay between two sweeps
    pub poll_interval: Duration,
    /// Age after which an entry is no longer served, three poll intervals if `None`
    pub max_allowed_delta: Option<Duration>,
}

impl CacheConfig {
    /// Create a configuration with the default staleness limit
    pub fn new(blocks: Vec<CacheDataBlock>, poll_interval: Duration) -> Self {
        Self {
            blocks,
            poll_interval,
            max_allowed_delta: None,
        }
    }

    /// Staleness limit in effect
    pub fn max_delta(&self) -> Duration {
        self.max_allowed_delta
            .unwrap_or(self.poll_interval.saturating_mul(3))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum CachedData {
    Registers(Vec<u16>),
    Bits(Vec<bool>),
}

#[derive(Debug)]
pub(crate) struct Snapshot {
    pub(crate) data: CachedData,
    pub(crate) updated: Instant,
}

/// Last values read for one block
#[derive(Debug)]
pub(crate) struct CacheEntry {
    pub(crate) block: CacheDataBlock,
    snapshot: RwLock<Option<Snapshot>>,
}

impl CacheEntry {
    fn new(block: CacheDataBlock) -> Self {
        Self {
            block,
            snapshot: RwLock::new(None),
        }
    }

    /// replace the snapshot, built by the caller outside the lock
    pub(crate) async fn publish(&self, snapshot: Snapshot) {
        *self.snapshot.write().await = Some(snapshot);
    }

    /// values for `range` if the entry is no older than `max_delta`
    async fn lookup(&self, range: &AddressRange, max_delta: Duration) -> Option<CachedData> {
        let guard = self.snapshot.read().await;
        let snapshot = guard.as_ref()?;
        if snapshot.updated.elapsed() > max_delta {
            return None;
        }
        let offset = (range.start - self.block.range.start) as usize;
        let slice = offset..offset + range.count as usize;
        match &snapshot.data {
            CachedData::Registers(values) => {
                values.get(slice).map(|x| CachedData::Registers(x.to_vec()))
            }
            CachedData::Bits(values) => values.get(slice).map(|x| CachedData::Bits(x.to_vec())),
        }
    }
}

/// Serves reads from periodically polled blocks, falling back to live reads
///
/// A background task polls every configured block through the shared engine. Reads that
/// fall entirely inside a block with a fresh snapshot are answered from memory, any
/// other read goes to the equipment. The task ends on [`stop`](Self::stop) or when the
/// manager is dropped.
#[derive(Debug)]
pub struct CacheManager {
    engine: Arc<RequestEngine>,
    entries: Arc<Vec<CacheEntry>>,
    max_delta: Duration,
    tx: mpsc::Sender<Command>,
}

impl CacheManager {
    /// Spawn the polling task onto the current runtime
    pub fn spawn(engine: Arc<RequestEngine>, config: CacheConfig) -> Self {
        let (manager, task) = Self::create(engine, config);
        tokio::spawn(task);
        manager
    }

    /// Create the manager and its polling task without spawning it
    ///
    /// Most users will prefer [`spawn`](Self::spawn).
    pub fn create(
        engine: Arc<RequestEngine>,
        config: CacheConfig,
    ) -> (Self, impl std::future::Future<Output = ()>) {
        let (tx, rx) = mpsc::channel(8);
        let max_delta = config.max_delta();
        let entries: Arc<Vec<CacheEntry>> =
            Arc::new(config.blocks.iter().copied().map(CacheEntry::new).collect());
        let node = engine.unit();
        let task = PollTask::new(engine.clone(), entries.clone(), config.poll_interval, rx);
        let manager = Self {
            engine,
            entries,
            max_delta,
            tx,
        };
        let task = task
            .run()
            .instrument(tracing::info_span!("Modbus-Cache", node = %node));
        (manager, task)
    }

    /// Suspend polling after the current sweep
    pub async fn pause(&self) -> Result<(), RequestError> {
        self.command(Command::Pause).await
    }

    /// Resume polling
    pub async fn resume(&self) -> Result<(), RequestError> {
        self.command(Command::Resume).await
    }

    /// End the polling task after the current sweep
    ///
    /// Cached values are no longer refreshed, reads keep working through the engine.
    pub async fn stop(&self) -> Result<(), RequestError> {
        self.command(Command::Stop).await
    }

    async fn command(&self, command: Command) -> Result<(), RequestError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| RequestError::Shutdown)
    }

    /// Number of configured blocks
    pub fn block_count(&self) -> usize {
        self.entries.len()
    }

    /// True if a fresh snapshot currently covers the request
    pub async fn is_cached(&self, function: CacheFunction, start: u16, count: u16) -> bool {
        match AddressRange::try_from(start, count) {
            Ok(range) => self.cached(function, &range).await.is_some(),
            Err(_) => false,
        }
    }

    /// Holding registers, from the cache when possible
    pub async fn read_holding_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RequestError> {
        match self.cached_range(CacheFunction::ReadHoldingRegisters, start, count).await {
            Some(CachedData::Registers(values)) => Ok(values),
            _ => self.engine.read_holding_registers(start, count).await,
        }
    }

    /// Input registers, from the cache when possible
    pub async fn read_input_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RequestError> {
        match self.cached_range(CacheFunction::ReadInputRegisters, start, count).await {
            Some(CachedData::Registers(values)) => Ok(values),
            _ => self.engine.read_input_registers(start, count).await,
        }
    }

    /// Discrete inputs, from the cache when possible
    pub async fn read_input_status(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, RequestError> {
        match self.cached_range(CacheFunction::ReadInputStatus, start, count).await {
            Some(CachedData::Bits(values)) => Ok(values),
            _ => self.engine.read_input_status(start, count).await,
        }
    }

    /// Coils, from the cache when possible
    pub async fn read_multiple_coils_status(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, RequestError> {
        match self.cached_range(CacheFunction::ReadMultipleCoils, start, count).await {
            Some(CachedData::Bits(values)) => Ok(values),
            _ => self.engine.read_multiple_coils_status(start, count).await,
        }
    }

    async fn cached_range(
        &self,
        function: CacheFunction,
        start: u16,
        count: u16,
    ) -> Option<CachedData> {
        // invalid ranges go to the engine which reports the error
        let range = AddressRange::try_from(start, count).ok()?;
        self.cached(function, &range).await
    }

    async fn cached(&self, function: CacheFunction, range: &AddressRange) -> Option<CachedData> {
        for entry in self.entries.iter().filter(|e| e.block.covers(function, range)) {
            if let Some(data) = entry.lookup(range, self.max_delta).await {
                tracing::debug!("{} {} served from cache", function, range);
                return Some(data);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::client::{SerialOptions, SerialTransport};
    use crate::serial::frame::crc16;
    use crate::serial::mock::{mock, Event, Handle};
    use crate::serial::SerialBus;
    use crate::types::UnitId;

    fn rtu(bytes: &[u8]) -> Vec<u8> {
        let mut frame = bytes.to_vec();
        frame.extend(crc16(bytes).to_le_bytes());
        frame
    }

    fn engine() -> (Arc<RequestEngine>, Handle) {
        let (line, handle) = mock();
        let transport =
            SerialTransport::new(Box::new(line), SerialBus::new(), SerialOptions::default());
        (Arc::new(RequestEngine::new(UnitId::new(0x01), transport)), handle)
    }

    fn holding_block() -> CacheConfig {
        CacheConfig::new(
            vec!["ReadHoldingRegisters,100,4".parse().unwrap()],
            Duration::from_secs(1),
        )
    }

    fn script_block_read(io: &mut Handle) {
        io.write(&rtu(&[0x01, 0x03, 0x00, 0x64, 0x00, 0x04]));
        io.read(&rtu(&[
            0x01, 0x03, 0x08, 0x00, 0x0A, 0x00, 0x0B, 0x00, 0x0C, 0x00, 0x0D,
        ]));
    }

    fn writes(io: &mut Handle) -> usize {
        std::iter::from_fn(|| io.next_event())
            .filter(|event| matches!(event, Event::Write(_)))
            .count()
    }

    #[test]
    fn parses_block_descriptors() {
        let block: CacheDataBlock = " ReadInputStatus , 16, 32 ".parse().unwrap();
        assert_eq!(block.function, CacheFunction::ReadInputStatus);
        assert_eq!(block.range, AddressRange::try_from(16, 32).unwrap());

        assert_eq!(
            "ReadCoils,1,2".parse::<CacheDataBlock>(),
            Err(ConfigError::BadCacheBlock(
                "ReadCoils,1,2".to_string(),
                "unknown function name"
            ))
        );
        assert!("ReadInputRegisters,1".parse::<CacheDataBlock>().is_err());
        assert!("ReadInputRegisters,-1,2".parse::<CacheDataBlock>().is_err());
        assert!("ReadInputRegisters,0,0".parse::<CacheDataBlock>().is_err());
        assert_eq!(
            "ReadHoldingRegisters,0,121".parse::<CacheDataBlock>(),
            Err(ConfigError::BadCacheBlock(
                "ReadHoldingRegisters,0,121".to_string(),
                "count exceeds one frame"
            ))
        );
        assert!("ReadMultipleCoils,0,2000".parse::<CacheDataBlock>().is_ok());
    }

    #[test]
    fn staleness_defaults_to_three_poll_intervals() {
        let mut config = holding_block();
        assert_eq!(config.max_delta(), Duration::from_secs(3));
        config.max_allowed_delta = Some(Duration::from_millis(500));
        assert_eq!(config.max_delta(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn fresh_snapshot_is_served_without_io() {
        let (engine, mut io) = engine();
        let (manager, _task) = CacheManager::create(engine, holding_block());
        manager.entries[0]
            .publish(Snapshot {
                data: CachedData::Registers(vec![10, 11, 12, 13]),
                updated: Instant::now(),
            })
            .await;

        assert_eq!(
            manager.read_holding_registers(101, 2).await.unwrap(),
            [11, 12]
        );
        assert!(manager.is_cached(CacheFunction::ReadHoldingRegisters, 100, 4).await);
        assert!(!manager.is_cached(CacheFunction::ReadInputRegisters, 100, 4).await);
        assert_eq!(io.next_event(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_falls_through_to_a_live_read() {
        let (engine, mut io) = engine();
        let (manager, _task) = CacheManager::create(engine, holding_block());
        manager.entries[0]
            .publish(Snapshot {
                data: CachedData::Registers(vec![1, 2, 3, 4]),
                updated: Instant::now(),
            })
            .await;
        tokio::time::advance(Duration::from_secs(4)).await;

        script_block_read(&mut io);
        assert_eq!(
            manager.read_holding_registers(100, 4).await.unwrap(),
            [10, 11, 12, 13]
        );
    }

    #[tokio::test]
    async fn uncovered_range_falls_through_to_a_live_read() {
        let (engine, mut io) = engine();
        let (manager, _task) = CacheManager::create(engine, holding_block());
        manager.entries[0]
            .publish(Snapshot {
                data: CachedData::Registers(vec![1, 2, 3, 4]),
                updated: Instant::now(),
            })
            .await;

        io.write(&rtu(&[0x01, 0x03, 0x00, 0x66, 0x00, 0x03]));
        io.read(&rtu(&[0x01, 0x03, 0x06, 0x00, 0x03, 0x00, 0x04, 0x00, 0x05]));
        assert_eq!(
            manager.read_holding_registers(102, 3).await.unwrap(),
            [3, 4, 5]
        );
    }

    #[tokio::test]
    async fn empty_cache_falls_through_to_a_live_read() {
        let (engine, mut io) = engine();
        let (manager, _task) = CacheManager::create(engine, holding_block());

        script_block_read(&mut io);
        assert_eq!(
            manager.read_holding_registers(100, 4).await.unwrap(),
            [10, 11, 12, 13]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_fills_the_cache() {
        let (engine, mut io) = engine();
        script_block_read(&mut io);
        let (manager, task) = CacheManager::create(engine, holding_block());
        let task = tokio::spawn(task);

        while !manager.is_cached(CacheFunction::ReadHoldingRegisters, 100, 4).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        manager.stop().await.unwrap();
        task.await.unwrap();

        assert_eq!(
            manager.read_holding_registers(100, 4).await.unwrap(),
            [10, 11, 12, 13]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sweeps_are_swallowed() {
        let (engine, mut io) = engine();
        // requests are written but never answered
        for _ in 0..10 {
            io.write(&rtu(&[0x01, 0x03, 0x00, 0x64, 0x00, 0x04]));
        }
        let (manager, task) = CacheManager::create(engine, holding_block());
        let task = tokio::spawn(task);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!task.is_finished());
        assert!(!manager.is_cached(CacheFunction::ReadHoldingRegisters, 100, 4).await);

        manager.pause().await.unwrap();
        manager.stop().await.unwrap();
        task.await.unwrap();
        assert_eq!(manager.resume().await, Err(RequestError::Shutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_resume_and_stop_control_polling() {
        let (engine, mut io) = engine();
        script_block_read(&mut io);
        let (manager, task) = CacheManager::create(engine, holding_block());
        let task = tokio::spawn(task);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(writes(&mut io), 1);

        // nothing is scripted, a sweep while paused would fail the mock line
        manager.pause().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(writes(&mut io), 0);
        assert!(!task.is_finished());

        script_block_read(&mut io);
        manager.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(writes(&mut io), 1);

        // resuming a running task does not cut the interval short
        script_block_read(&mut io);
        manager.resume().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(writes(&mut io), 0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(writes(&mut io), 1);

        manager.stop().await.unwrap();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(writes(&mut io), 0);
        assert_eq!(manager.pause().await, Err(RequestError::Shutdown));
    }
}
