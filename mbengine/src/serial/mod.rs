use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub(crate) mod client;
pub(crate) mod frame;
pub(crate) mod log;
#[cfg(test)]
pub(crate) mod mock;

/// Byte-oriented access to a serial line
///
/// The engine only needs three primitives from the serial driver. Implementations exist for
/// any tokio byte stream ([`StreamLine`]) and for a real port (`SerialPortLine`, behind the
/// `serial` feature).
#[async_trait]
pub trait SerialLine: Send {
    /// Discard any pending input and output
    async fn flush(&mut self) -> std::io::Result<()>;

    /// Write the whole buffer
    async fn write(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// Read up to `count` bytes
    ///
    /// Returns fewer bytes if the line timeout elapses first.
    async fn read(&mut self, count: usize) -> std::io::Result<Vec<u8>>;
}

/// Shared handle that serializes access to one physical medium
///
/// Every transport holding a clone of the same bus waits for the others to finish their
/// exchange before touching the line. Multi-drop RS-485 requires this.
#[derive(Clone, Debug, Default)]
pub struct SerialBus {
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl SerialBus {
    /// Create a new, independent bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide default bus
    pub fn global() -> Self {
        static GLOBAL: OnceLock<SerialBus> = OnceLock::new();
        GLOBAL.get_or_init(SerialBus::new).clone()
    }

    pub(crate) async fn acquire(&self) -> tokio::sync::OwnedMutexGuard<()> {
        self.lock.clone().lock_owned().await
    }

    /// True if both handles refer to the same medium
    pub fn same_bus(&self, other: &SerialBus) -> bool {
        Arc::ptr_eq(&self.lock, &other.lock)
    }
}

/// Serial port settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate of the port
    pub baud_rate: u32,
    /// How long a read waits for the requested bytes
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_secs(1),
        }
    }
}

/// [`SerialLine`] over any tokio byte stream
///
/// Used with pipes, pseudo-terminals or `tokio::io::duplex` in tests.
pub struct StreamLine<S> {
    stream: S,
    timeout: Duration,
}

impl<S> StreamLine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream, reads give up after `timeout`
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self { stream, timeout }
    }

    /// Access the wrapped stream
    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

#[async_trait]
impl<S> SerialLine for StreamLine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn flush(&mut self) -> std::io::Result<()> {
        // drain whatever is already buffered without waiting for more
        let mut buffer = [0u8; 64];
        while let Ok(Ok(count)) =
            tokio::time::timeout(Duration::ZERO, self.stream.read(&mut buffer)).await
        {
            if count == 0 {
                break;
            }
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    async fn read(&mut self, count: usize) -> std::io::Result<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut data = vec![0u8; count];
        let mut filled = 0;
        while filled < count {
            match tokio::time::timeout_at(deadline, self.stream.read(&mut data[filled..])).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => filled += n,
                Ok(Err(err)) => return Err(err),
            }
        }
        data.truncate(filled);
        Ok(data)
    }
}

#[cfg(feature = "serial")]
pub use port::SerialPortLine;

#[cfg(feature = "serial")]
mod port {
    use super::*;
    use crate::error::ConfigError;
    use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

    /// [`SerialLine`] over a local serial port
    pub struct SerialPortLine {
        inner: StreamLine<SerialStream>,
    }

    impl SerialPortLine {
        /// Open the port at `path`, e.g. `/dev/ttyUSB0` or `COM3`
        pub fn open(path: &str, settings: SerialSettings) -> Result<Self, ConfigError> {
            let stream = tokio_serial::new(path, settings.baud_rate)
                .timeout(settings.timeout)
                .open_native_async()
                .map_err(|err| ConfigError::SerialOpen(path.to_string(), err.to_string()))?;
            tracing::info!("serial port {} open at {} baud", path, settings.baud_rate);
            Ok(Self {
                inner: StreamLine::new(stream, settings.timeout),
            })
        }
    }

    #[async_trait]
    impl SerialLine for SerialPortLine {
        async fn flush(&mut self) -> std::io::Result<()> {
            self.inner
                .get_ref()
                .clear(ClearBuffer::All)
                .map_err(std::io::Error::from)
        }

        async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
            self.inner.write(data).await
        }

        async fn read(&mut self, count: usize) -> std::io::Result<Vec<u8>> {
            self.inner.read(count).await
        }
    }
}
