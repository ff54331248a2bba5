use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::Instant;

use crate::common::phys::{log_rx, log_tx};
use crate::constants::frame::MAX_FRAME_SIZE;
use crate::decode::DecodeLevel;
use crate::error::{ConfigError, RequestError};
use crate::tcp::frame::{format_tcp_frame, parse_tcp_response, TcpDisplay};
use crate::types::{TransportState, UnitId};

/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 502;

/// Settings of a [`TcpTransport`]
#[derive(Clone, Debug)]
pub struct TcpSettings {
    /// Host name or address of the equipment
    pub host: String,
    /// TCP port, 0 selects [`DEFAULT_PORT`]
    pub port: u16,
    /// Upper bound on establishing the connection
    pub connect_timeout: Duration,
    /// Upper bound on each write and each read
    pub timeout: Duration,
    /// Set TCP_NODELAY on the socket
    pub no_delay: bool,
    /// Set TCP_QUICKACK before every read (Linux only)
    pub quick_ack: bool,
    /// Set SO_KEEPALIVE on the socket
    pub keep_alive: bool,
    /// Minimum delay between two connection attempts
    pub reconnect_interval: Duration,
    /// Tracing of frames and bytes
    pub decode: DecodeLevel,
}

impl TcpSettings {
    /// Settings with default timeouts for `host:port`
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            no_delay: false,
            quick_ack: false,
            keep_alive: false,
            reconnect_interval: Duration::from_secs(2),
            decode: DecodeLevel::default(),
        }
    }
}

/// State of the TCP connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket exists
    Disconnected,
    /// A connection attempt is in progress
    Connecting,
    /// The socket is connected
    Connected,
}

/// Transport over TCP using the length-prefixed framing
///
/// The connection is opened on demand and dropped on any I/O failure; the next operation
/// reconnects transparently.
#[derive(Debug)]
pub struct TcpTransport {
    settings: TcpSettings,
    addr: SocketAddr,
    stream: Option<TcpStream>,
    connection: ConnectionState,
    last_attempt: Option<Instant>,
    connect_attempts: u64,
    state: TransportState,
    last_error: Option<String>,
}

impl TcpTransport {
    /// Resolve the host and create a disconnected transport
    pub fn new(mut settings: TcpSettings) -> Result<Self, ConfigError> {
        if settings.port == 0 {
            settings.port = DEFAULT_PORT;
        }
        if settings.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidDuration("tcp connect timeout"));
        }
        if settings.timeout.is_zero() {
            return Err(ConfigError::InvalidDuration("tcp timeout"));
        }

        let addr = (settings.host.as_str(), settings.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::UnknownHost(settings.host.clone()))?;

        Ok(Self {
            settings,
            addr,
            stream: None,
            connection: ConnectionState::Disconnected,
            last_attempt: None,
            connect_attempts: 0,
            state: TransportState::Unknown,
            last_error: None,
        })
    }

    /// Host and port as configured
    pub fn peer(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    /// Number of sockets created so far
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts
    }

    /// Coarse state after the last operation
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Error message of the last operation, if it failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Connect if not already connected
    pub async fn connect(&mut self) -> Result<(), RequestError> {
        if self.stream.is_some() {
            return Ok(());
        }

        if let Some(last) = self.last_attempt {
            if last.elapsed() < self.settings.reconnect_interval {
                tracing::debug!("connection attempt to {} refused by rate limit", self.addr);
                return Err(RequestError::NoConnection);
            }
        }

        self.last_attempt = Some(Instant::now());
        self.connect_attempts += 1;
        self.connection = ConnectionState::Connecting;

        match self.open().await {
            Ok(stream) => {
                tracing::info!("connected to: {}", self.addr);
                self.stream = Some(stream);
                self.connection = ConnectionState::Connected;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("error connecting to {}: {}", self.addr, err);
                self.connection = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Close the connection, the next operation reconnects
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("disconnected from: {}", self.addr);
        }
        self.connection = ConnectionState::Disconnected;
    }

    /// Write a request without waiting for any response
    pub async fn send(
        &mut self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
    ) -> Result<(), RequestError> {
        let result = self.send_inner(unit, function, payload).await;
        self.record(result)
    }

    /// Write a request and return `response_len` bytes starting at the function echo
    ///
    /// A connection closed by the peer is re-opened and the exchange repeated once, after
    /// waiting out whatever remains of the reconnect interval.
    pub async fn send_and_receive(
        &mut self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, RequestError> {
        let result = self
            .send_and_receive_inner(unit, function, payload, response_len)
            .await;
        self.record(result)
    }

    async fn send_inner(
        &mut self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
    ) -> Result<(), RequestError> {
        let frame = format_tcp_frame(unit, function, payload)?;
        self.connect().await?;
        self.write(&frame).await
    }

    async fn send_and_receive_inner(
        &mut self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, RequestError> {
        let frame = format_tcp_frame(unit, function, payload)?;

        let mut closed_by_peer = false;
        loop {
            self.connect().await?;
            self.write(&frame).await?;
            let raw = self.read().await?;

            if raw.is_empty() {
                self.disconnect();
                if closed_by_peer {
                    return Err(RequestError::Io(std::io::ErrorKind::UnexpectedEof));
                }
                tracing::warn!("connection closed by peer, retrying once");
                closed_by_peer = true;
                if let Some(last) = self.last_attempt {
                    tokio::time::sleep_until(last + self.settings.reconnect_interval).await;
                }
                continue;
            }

            return match parse_tcp_response(&raw, response_len) {
                Ok(pdu) => {
                    if self.settings.decode.frame.enabled() {
                        tracing::info!("TCP RX - {}", TcpDisplay::new(self.settings.decode.frame, &raw));
                    }
                    Ok(pdu.to_vec())
                }
                Err(err @ RequestError::BadFrame(_)) => {
                    // the stream may hold the rest of a frame, start over
                    self.disconnect();
                    Err(err)
                }
                Err(err) => Err(err),
            };
        }
    }

    async fn open(&self) -> Result<TcpStream, RequestError> {
        let socket = if self.addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        if self.settings.keep_alive {
            if let Err(err) = socket.set_keepalive(true) {
                tracing::warn!("unable to set SO_KEEPALIVE: {}", err);
            }
        }

        let stream = tokio::time::timeout(self.settings.connect_timeout, socket.connect(self.addr))
            .await
            .map_err(|_| RequestError::Io(std::io::ErrorKind::TimedOut))??;

        if self.settings.no_delay {
            if let Err(err) = stream.set_nodelay(true) {
                tracing::warn!("unable to set TCP_NODELAY: {}", err);
            }
        }
        self.apply_quick_ack(&stream);

        Ok(stream)
    }

    #[cfg(target_os = "linux")]
    fn apply_quick_ack(&self, stream: &TcpStream) {
        if self.settings.quick_ack {
            if let Err(err) = socket2::SockRef::from(stream).set_quickack(true) {
                tracing::warn!("unable to set TCP_QUICKACK: {}", err);
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn apply_quick_ack(&self, _stream: &TcpStream) {}

    async fn write(&mut self, frame: &[u8]) -> Result<(), RequestError> {
        let decode = self.settings.decode;
        let timeout = self.settings.timeout;
        let stream = self.stream.as_mut().ok_or(RequestError::NoConnection)?;

        if decode.frame.enabled() {
            tracing::info!("TCP TX - {}", TcpDisplay::new(decode.frame, frame));
        }
        log_tx(decode.physical, frame);

        let result = match tokio::time::timeout(timeout, stream.write_all(frame)).await {
            Ok(result) => result.map_err(RequestError::from),
            Err(_) => Err(RequestError::ResponseTimeout),
        };

        if result.is_err() {
            self.disconnect();
        }
        result
    }

    // a single read as the response always arrives in one segment; empty means closed
    async fn read(&mut self) -> Result<Vec<u8>, RequestError> {
        let timeout = self.settings.timeout;
        let physical = self.settings.decode.physical;
        let stream = match self.stream.as_ref() {
            Some(stream) => stream,
            None => return Err(RequestError::NoConnection),
        };
        // quick-ack is not sticky
        self.apply_quick_ack(stream);

        let mut buffer = vec![0u8; MAX_FRAME_SIZE];
        let stream = self.stream.as_mut().ok_or(RequestError::NoConnection)?;
        let result = match tokio::time::timeout(timeout, stream.read(&mut buffer)).await {
            Ok(Ok(count)) => {
                buffer.truncate(count);
                log_rx(physical, &buffer);
                Ok(buffer)
            }
            Ok(Err(err)) => Err(RequestError::from(err)),
            Err(_) => Err(RequestError::ResponseTimeout),
        };

        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn record<T>(&mut self, result: Result<T, RequestError>) -> Result<T, RequestError> {
        match &result {
            Ok(_) => {
                self.state = TransportState::On;
                self.last_error = None;
            }
            Err(err) => {
                self.state = TransportState::Unknown;
                self.last_error = Some(format!("ModbusTCP {}: {}", self.peer(), err));
            }
        }
        result
    }
}
