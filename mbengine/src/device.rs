use std::sync::Arc;

use crate::cache::{CacheConfig, CacheManager};
use crate::client::engine::RequestEngine;
use crate::config::EngineConfig;
use crate::decode::DecodeLevel;
use crate::error::{AduParseError, ConfigError, RequestError};
use crate::retry::RetryPolicy;
use crate::tcp::client::{ConnectionState, TcpTransport};
use crate::transport::Transport;
use crate::types::{CommEventCounter, Protocol, TransportState};

/// One piece of equipment as seen by the upper layers
///
/// Combines a shared [`RequestEngine`], an optional [`CacheManager`] serving the cacheable
/// reads, and the [`RetryPolicy`] applied to every operation.
#[derive(Debug)]
pub struct Device {
    engine: Arc<RequestEngine>,
    cache: Option<CacheManager>,
    retry: RetryPolicy,
}

impl Device {
    /// Device without a cache
    pub fn new(engine: Arc<RequestEngine>, retry: RetryPolicy) -> Self {
        Self {
            engine,
            cache: None,
            retry,
        }
    }

    /// Device whose cacheable reads go through a polling cache
    ///
    /// Spawns the polling task, so this must be called from within a tokio runtime.
    pub fn with_cache(
        engine: Arc<RequestEngine>,
        cache: CacheConfig,
        retry: RetryPolicy,
    ) -> Self {
        let cache = CacheManager::spawn(engine.clone(), cache);
        Self {
            engine,
            cache: Some(cache),
            retry,
        }
    }

    /// Build the transport, engine, and cache described by `config`
    ///
    /// RTU devices share [`SerialBus::global`](crate::SerialBus::global). Must be called
    /// from within a tokio runtime.
    pub fn from_config(config: &EngineConfig, decode: DecodeLevel) -> Result<Self, ConfigError> {
        config.validate()?;
        let unit = config.unit()?;
        let transport: Transport = match config.protocol {
            Protocol::Tcp => {
                let mut settings = config.tcp_settings()?;
                settings.decode = decode;
                TcpTransport::new(settings)?.into()
            }
            Protocol::Rtu => open_serial(config, decode)?,
        };
        let engine = Arc::new(RequestEngine::new(unit, transport));
        let retry = config.retry_policy();
        tracing::info!(
            "node {} over {} with {} cache block(s)",
            unit.value,
            config.protocol,
            config.cache_blocks.len()
        );
        Ok(match config.cache_config()? {
            Some(cache) => Self::with_cache(engine, cache, retry),
            None => Self::new(engine, retry),
        })
    }

    /// The underlying engine
    pub fn engine(&self) -> &Arc<RequestEngine> {
        &self.engine
    }

    /// The polling cache, if configured
    pub fn cache(&self) -> Option<&CacheManager> {
        self.cache.as_ref()
    }

    /// Retry policy in effect
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Coarse state after the last operation
    pub async fn state(&self) -> TransportState {
        self.engine.state().await
    }

    /// Human readable status, see [`RequestEngine::status`]
    pub async fn status(&self) -> String {
        self.engine.status().await
    }

    /// TCP connection state, `None` for serial lines
    pub async fn connection_state(&self) -> Option<ConnectionState> {
        self.engine.connection_state().await
    }

    /// Read a single coil, from the cache when a coil block covers it
    pub async fn read_coil_status(&self, address: u16) -> Result<bool, RequestError> {
        self.retry.run(move || self.read_coil_once(address)).await
    }

    async fn read_coil_once(&self, address: u16) -> Result<bool, RequestError> {
        let Some(cache) = &self.cache else {
            return self.engine.read_coil_status(address).await;
        };
        let values = cache.read_multiple_coils_status(address, 1).await?;
        match values.first() {
            Some(value) => Ok(*value),
            None => Err(AduParseError::ByteCountMismatch(0, 1).into()),
        }
    }

    /// Read discrete inputs, through the cache if configured
    pub async fn read_input_status(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, RequestError> {
        self.retry
            .run(move || async move {
                match &self.cache {
                    Some(cache) => cache.read_input_status(start, count).await,
                    None => self.engine.read_input_status(start, count).await,
                }
            })
            .await
    }

    /// Read coils, through the cache if configured
    pub async fn read_multiple_coils_status(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, RequestError> {
        self.retry
            .run(move || async move {
                match &self.cache {
                    Some(cache) => cache.read_multiple_coils_status(start, count).await,
                    None => self.engine.read_multiple_coils_status(start, count).await,
                }
            })
            .await
    }

    /// Read holding registers, through the cache if configured
    pub async fn read_holding_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RequestError> {
        self.retry
            .run(move || async move {
                match &self.cache {
                    Some(cache) => cache.read_holding_registers(start, count).await,
                    None => self.engine.read_holding_registers(start, count).await,
                }
            })
            .await
    }

    /// Read input registers, through the cache if configured
    pub async fn read_input_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RequestError> {
        self.retry
            .run(move || async move {
                match &self.cache {
                    Some(cache) => cache.read_input_registers(start, count).await,
                    None => self.engine.read_input_registers(start, count).await,
                }
            })
            .await
    }

    /// Write a single coil
    pub async fn force_single_coil(&self, address: u16, value: bool) -> Result<(), RequestError> {
        self.retry
            .run(move || self.engine.force_single_coil(address, value))
            .await
    }

    /// Write consecutive coils
    pub async fn force_multiple_coils(
        &self,
        start: u16,
        values: &[bool],
    ) -> Result<(), RequestError> {
        self.retry
            .run(move || self.engine.force_multiple_coils(start, values))
            .await
    }

    /// Write a single holding register
    pub async fn preset_single_register(
        &self,
        address: u16,
        value: u16,
    ) -> Result<(), RequestError> {
        self.retry
            .run(move || self.engine.preset_single_register(address, value))
            .await
    }

    /// Write consecutive holding registers
    pub async fn preset_multiple_registers(
        &self,
        start: u16,
        values: &[u16],
    ) -> Result<(), RequestError> {
        self.retry
            .run(move || self.engine.preset_multiple_registers(start, values))
            .await
    }

    /// Modify a holding register through AND and OR masks
    pub async fn mask_write_register(
        &self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<(), RequestError> {
        self.retry
            .run(move || self.engine.mask_write_register(address, and_mask, or_mask))
            .await
    }

    /// Write then read holding registers in one exchange
    pub async fn read_write_registers(
        &self,
        read_start: u16,
        read_count: u16,
        write_start: u16,
        values: &[u16],
    ) -> Result<Vec<u16>, RequestError> {
        self.retry
            .run(move || {
                self.engine
                    .read_write_registers(read_start, read_count, write_start, values)
            })
            .await
    }

    /// Write a holding register on every node, without waiting for a response
    pub async fn preset_single_register_broadcast(
        &self,
        address: u16,
        value: u16,
    ) -> Result<(), RequestError> {
        self.retry
            .run(move || self.engine.preset_single_register_broadcast(address, value))
            .await
    }

    /// Read the exception status outputs
    pub async fn read_exception_status(&self) -> Result<u8, RequestError> {
        self.retry
            .run(move || self.engine.read_exception_status())
            .await
    }

    /// Fetch the communication event counter
    pub async fn fetch_comm_event_counter(&self) -> Result<CommEventCounter, RequestError> {
        self.retry
            .run(move || self.engine.fetch_comm_event_counter())
            .await
    }
}

#[cfg(feature = "serial")]
fn open_serial(config: &EngineConfig, decode: DecodeLevel) -> Result<Transport, ConfigError> {
    use crate::serial::client::SerialTransport;
    use crate::serial::{SerialBus, SerialPortLine};

    let line = SerialPortLine::open(config.serial_device.trim(), config.serial_settings()?)?;
    let options = config.serial_options(decode);
    Ok(SerialTransport::new(Box::new(line), SerialBus::global(), options).into())
}

#[cfg(not(feature = "serial"))]
fn open_serial(_: &EngineConfig, _: DecodeLevel) -> Result<Transport, ConfigError> {
    Err(ConfigError::Missing("serial support"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::CacheFunction;
    use crate::exception::ExceptionCode;
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
        (Arc::new(RequestEngine::new(UnitId::new(0x11), transport)), handle)
    }

    #[tokio::test]
    async fn retries_a_timeout() {
        let (engine, mut io) = engine();
        let device = Device::new(engine, RetryPolicy::new(1, Duration::ZERO));
        io.write(&rtu(&[0x11, 0x07]));
        io.write(&rtu(&[0x11, 0x07]));
        io.read(&rtu(&[0x11, 0x07, 0x6D]));

        assert_eq!(device.read_exception_status().await, Ok(0x6D));
        assert_eq!(device.state().await, TransportState::On);
    }

    #[tokio::test]
    async fn never_retries_an_exception() {
        let (engine, mut io) = engine();
        let device = Device::new(engine, RetryPolicy::new(3, Duration::ZERO));
        io.write(&rtu(&[0x11, 0x06, 0x00, 0x01, 0x00, 0x03]));
        io.read(&rtu(&[0x11, 0x86, 0x06]));

        assert_eq!(
            device.preset_single_register(0x01, 0x03).await,
            Err(RequestError::Exception(ExceptionCode::ServerDeviceBusy))
        );
        assert_eq!(io.next_event(), Some(Event::Flush));
        assert_eq!(io.next_event(), Some(Event::Write(8)));
        assert_eq!(io.next_event(), Some(Event::Read(2)));
        assert_eq!(io.next_event(), Some(Event::Read(3)));
        assert_eq!(io.next_event(), None);
        assert!(device
            .status()
            .await
            .starts_with("Modbus node address 17 protocol RTU\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn single_coil_is_served_from_a_coil_block() {
        let (engine, mut io) = engine();
        io.write(&rtu(&[0x11, 0x01, 0x00, 0x00, 0x00, 0x10]));
        io.read(&rtu(&[0x11, 0x01, 0x02, 0x00, 0x80]));

        let cache = CacheConfig::new(
            vec!["ReadMultipleCoils,0,16".parse().unwrap()],
            Duration::from_secs(1),
        );
        let device = Device::with_cache(engine, cache, RetryPolicy::none());
        let manager = device.cache().unwrap();
        while !manager.is_cached(CacheFunction::ReadMultipleCoils, 0, 16).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        manager.stop().await.unwrap();

        assert_eq!(device.read_coil_status(15).await, Ok(true));
        assert_eq!(device.read_coil_status(14).await, Ok(false));
        assert_eq!(
            device.read_multiple_coils_status(8, 8).await.unwrap(),
            [false, false, false, false, false, false, false, true]
        );
    }

    #[test]
    fn unresolvable_host_fails_at_construction() {
        let config = EngineConfig {
            protocol: Protocol::Tcp,
            tcp_host: "no-such-host.invalid".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Device::from_config(&config, DecodeLevel::nothing()),
            Err(ConfigError::UnknownHost(_))
        ));
    }
}
