use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{CacheConfig, CacheDataBlock};
use crate::decode::DecodeLevel;
use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::serial::client::SerialOptions;
use crate::serial::SerialSettings;
use crate::tcp::client::TcpSettings;
use crate::types::{CrcCheck, Protocol, UnitId};

/// Everything needed to build a [`Device`](crate::Device)
///
/// Durations are kept as plain numbers so the record can be loaded from any property
/// store. [`validate`](Self::validate) or the typed accessors turn them into checked
/// values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialization", serde(default))]
pub struct EngineConfig {
    /// Framing on the medium
    pub protocol: Protocol,
    /// Node address of the equipment
    pub node: u8,
    /// Serial device, e.g. `/dev/ttyUSB0`
    pub serial_device: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Serial line timeout in seconds
    pub serial_timeout: f64,
    /// Diagnostic log file for serial failures, empty disables it
    pub log_file: String,
    /// CRC strictness for RTU responses
    pub crc_check: CrcCheck,
    /// TCP host name or address
    pub tcp_host: String,
    /// TCP port, 0 selects 502
    pub tcp_port: u16,
    /// TCP connect timeout in seconds
    pub tcp_connect_timeout: f64,
    /// TCP read and write timeout in seconds
    pub tcp_timeout: f64,
    /// Set TCP_NODELAY
    pub tcp_no_delay: bool,
    /// Set TCP_QUICKACK before every read
    pub tcp_quick_ack: bool,
    /// Set SO_KEEPALIVE
    pub tcp_keep_alive: bool,
    /// Cache block descriptors, `"FunctionName,startAddress,count"`
    pub cache_blocks: Vec<String>,
    /// Delay between two cache sweeps in milliseconds
    pub cache_poll_ms: u64,
    /// Age in milliseconds after which cached values are not served
    pub cache_max_delta_ms: Option<u64>,
    /// Additional attempts after a transport or protocol failure
    pub retry_count: u16,
    /// Delay between attempts in milliseconds
    pub retry_sleep_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Rtu,
            node: UnitId::default().value,
            serial_device: String::new(),
            baud_rate: SerialSettings::default().baud_rate,
            serial_timeout: 1.0,
            log_file: String::new(),
            crc_check: CrcCheck::default(),
            tcp_host: String::new(),
            tcp_port: 0,
            tcp_connect_timeout: 1.0,
            tcp_timeout: 1.0,
            tcp_no_delay: false,
            tcp_quick_ack: false,
            tcp_keep_alive: false,
            cache_blocks: Vec::new(),
            cache_poll_ms: 500,
            cache_max_delta_ms: None,
            retry_count: 0,
            retry_sleep_ms: 0,
        }
    }
}

fn seconds(value: f64, name: &'static str) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(ConfigError::InvalidDuration(name)),
    }
}

impl EngineConfig {
    /// Check every field without opening anything
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.unit()?;
        self.cache_config()?;
        match self.protocol {
            Protocol::Rtu => {
                self.serial_settings()?;
            }
            Protocol::Tcp => {
                self.tcp_settings()?;
            }
        }
        Ok(())
    }

    /// Node address, rejecting broadcast and the RTU reserved range
    pub fn unit(&self) -> Result<UnitId, ConfigError> {
        let unit = UnitId::new(self.node);
        if unit == UnitId::broadcast()
            || (self.protocol == Protocol::Rtu && unit.is_rtu_reserved())
        {
            return Err(ConfigError::ReservedNode(self.node));
        }
        Ok(unit)
    }

    /// Serial port settings
    pub fn serial_settings(&self) -> Result<SerialSettings, ConfigError> {
        if self.serial_device.trim().is_empty() {
            return Err(ConfigError::Missing("serial device"));
        }
        Ok(SerialSettings {
            baud_rate: self.baud_rate,
            timeout: seconds(self.serial_timeout, "serial timeout")?,
        })
    }

    /// Options of the RTU transport
    pub fn serial_options(&self, decode: DecodeLevel) -> SerialOptions {
        let log_file = match self.log_file.trim() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };
        SerialOptions {
            log_file,
            crc_check: self.crc_check,
            decode,
        }
    }

    /// Settings of the TCP transport
    pub fn tcp_settings(&self) -> Result<TcpSettings, ConfigError> {
        if self.tcp_host.trim().is_empty() {
            return Err(ConfigError::Missing("TCP host"));
        }
        let mut settings = TcpSettings::new(self.tcp_host.trim(), self.tcp_port);
        settings.connect_timeout = seconds(self.tcp_connect_timeout, "TCP connect timeout")?;
        settings.timeout = seconds(self.tcp_timeout, "TCP timeout")?;
        settings.no_delay = self.tcp_no_delay;
        settings.quick_ack = self.tcp_quick_ack;
        settings.keep_alive = self.tcp_keep_alive;
        Ok(settings)
    }

    /// Cache configuration, `None` when no block is configured
    pub fn cache_config(&self) -> Result<Option<CacheConfig>, ConfigError> {
        if self.cache_blocks.is_empty() {
            return Ok(None);
        }
        let blocks = self
            .cache_blocks
            .iter()
            .map(|x| x.parse::<CacheDataBlock>())
            .collect::<Result<Vec<_>, _>>()?;
        if self.cache_poll_ms == 0 {
            return Err(ConfigError::InvalidDuration("cache poll interval"));
        }
        let mut config = CacheConfig::new(blocks, Duration::from_millis(self.cache_poll_ms));
        if let Some(ms) = self.cache_max_delta_ms {
            if ms == 0 {
                return Err(ConfigError::InvalidDuration("cache max delta"));
            }
            config.max_allowed_delta = Some(Duration::from_millis(ms));
        }
        Ok(Some(config))
    }

    /// Retry policy applied by the device facade
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, Duration::from_millis(self.retry_sleep_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheFunction;

    fn tcp() -> EngineConfig {
        EngineConfig {
            protocol: Protocol::Tcp,
            tcp_host: "127.0.0.1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_validate_once_a_device_is_named() {
        assert_eq!(
            EngineConfig::default().validate(),
            Err(ConfigError::Missing("serial device"))
        );
        let config = EngineConfig {
            serial_device: "/dev/ttyS0".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(tcp().validate(), Ok(()));
    }

    #[test]
    fn rejects_reserved_nodes() {
        let mut config = tcp();
        config.node = 0;
        assert_eq!(config.unit(), Err(ConfigError::ReservedNode(0)));
        config.node = 250;
        assert_eq!(config.unit(), Ok(UnitId::new(250)));
        config.protocol = Protocol::Rtu;
        assert_eq!(config.unit(), Err(ConfigError::ReservedNode(250)));
    }

    #[test]
    fn converts_fractional_timeouts() {
        let mut config = tcp();
        config.tcp_connect_timeout = 0.25;
        config.tcp_timeout = 1.5;
        let settings = config.tcp_settings().unwrap();
        assert_eq!(settings.connect_timeout, Duration::from_millis(250));
        assert_eq!(settings.timeout, Duration::from_millis(1500));

        config.tcp_timeout = -1.0;
        assert_eq!(
            config.tcp_settings().err(),
            Some(ConfigError::InvalidDuration("TCP timeout"))
        );
        config.tcp_timeout = f64::NAN;
        assert!(config.tcp_settings().is_err());
    }

    #[test]
    fn empty_log_file_disables_the_log() {
        let mut config = tcp();
        assert_eq!(config.serial_options(DecodeLevel::nothing()).log_file, None);
        config.log_file = "/tmp/modbus.log".to_string();
        assert_eq!(
            config.serial_options(DecodeLevel::nothing()).log_file,
            Some(PathBuf::from("/tmp/modbus.log"))
        );
    }

    #[test]
    fn parses_cache_blocks() {
        let mut config = tcp();
        assert_eq!(config.cache_config(), Ok(None));

        config.cache_blocks = vec![
            "ReadHoldingRegisters,0,10".to_string(),
            "ReadMultipleCoils,100,16".to_string(),
        ];
        config.cache_poll_ms = 200;
        let cache = config.cache_config().unwrap().unwrap();
        assert_eq!(cache.blocks.len(), 2);
        assert_eq!(cache.blocks[1].function, CacheFunction::ReadMultipleCoils);
        assert_eq!(cache.max_delta(), Duration::from_millis(600));

        config.cache_blocks.push("ReadHoldingRegisters,0".to_string());
        assert!(matches!(
            config.cache_config(),
            Err(ConfigError::BadCacheBlock(_, _))
        ));
    }
}
