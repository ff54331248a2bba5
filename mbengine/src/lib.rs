//! An async Modbus master engine for field equipment reached over a serial line (RTU) or
//! TCP, built on [Tokio](https://docs.rs/tokio).
//!
//! # Features
//!
//! * RTU framing with CRC-16 over any [`SerialLine`], serialized per medium by a
//!   [`SerialBus`]
//! * Length-prefixed TCP framing with transparent reconnect and a reconnect rate limit
//! * Typed operations that validate counts and addresses before any I/O
//! * A background [`CacheManager`] that polls configured blocks and serves fresh values
//!   from memory, falling back to live reads
//! * Caller-side [`RetryPolicy`] that never repeats equipment exceptions
//! * Diagnostic hex dump of failed serial exchanges
//!
//! # Supported Functions
//!
//! * Read Coils / Read Discrete Inputs
//! * Read Holding Registers / Read Input Registers
//! * Write Single Coil / Write Single Register (including broadcast)
//! * Write Multiple Coils / Write Multiple Registers
//! * Mask Write Register
//! * Read/Write Multiple Registers
//! * Read Exception Status
//! * Fetch Communication Event Counter
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use mbengine::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig {
//!         protocol: Protocol::Tcp,
//!         tcp_host: "127.0.0.1".to_string(),
//!         node: 0x02,
//!         cache_blocks: vec!["ReadHoldingRegisters,0,10".to_string()],
//!         retry_count: 2,
//!         retry_sleep_ms: 100,
//!         ..Default::default()
//!     };
//!
//!     let device = Device::from_config(&config, DecodeLevel::nothing())?;
//!
//!     loop {
//!         match device.read_holding_registers(0, 5).await {
//!             Ok(values) => println!("{values:?}"),
//!             Err(err) => println!("error: {err}"),
//!         }
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!     }
//! }
//! ```

/// Protocol constants and limits
pub mod constants;

mod cache;
mod client;
mod common;
mod config;
mod decode;
mod device;
mod error;
mod exception;
mod retry;
mod serial;
mod tcp;
mod transport;
mod types;
mod util {
    pub(crate) mod bits;
}

pub use crate::cache::*;
pub use crate::client::engine::RequestEngine;
pub use crate::common::frame::{decode_response, encode_request};
pub use crate::config::EngineConfig;
pub use crate::decode::*;
pub use crate::device::Device;
pub use crate::error::*;
pub use crate::exception::ExceptionCode;
pub use crate::retry::RetryPolicy;
pub use crate::serial::client::{SerialOptions, SerialTransport};
pub use crate::serial::frame::crc16;
pub use crate::serial::{SerialBus, SerialLine, SerialSettings, StreamLine};
#[cfg(feature = "serial")]
pub use crate::serial::SerialPortLine;
pub use crate::tcp::client::{ConnectionState, TcpSettings, TcpTransport, DEFAULT_PORT};
pub use crate::transport::Transport;
pub use crate::types::*;
