use crate::error::RequestError;
use crate::serial::client::SerialTransport;
use crate::tcp::client::{ConnectionState, TcpTransport};
use crate::types::{Protocol, TransportState, UnitId};

/// The two interchangeable ways of reaching the equipment
#[derive(Debug)]
pub enum Transport {
    /// Serial line with RTU framing
    Rtu(SerialTransport),
    /// TCP with length-prefixed framing
    Tcp(TcpTransport),
}

impl From<SerialTransport> for Transport {
    fn from(transport: SerialTransport) -> Self {
        Transport::Rtu(transport)
    }
}

impl From<TcpTransport> for Transport {
    fn from(transport: TcpTransport) -> Self {
        Transport::Tcp(transport)
    }
}

impl Transport {
    /// Framing used by this transport
    pub fn protocol(&self) -> Protocol {
        match self {
            Transport::Rtu(_) => Protocol::Rtu,
            Transport::Tcp(_) => Protocol::Tcp,
        }
    }

    /// Establish the connection ahead of the first request
    ///
    /// Serial lines are always ready.
    pub async fn connect(&mut self) -> Result<(), RequestError> {
        match self {
            Transport::Rtu(_) => Ok(()),
            Transport::Tcp(x) => x.connect().await,
        }
    }

    /// Write a request without waiting for a response
    pub async fn send(
        &mut self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
    ) -> Result<(), RequestError> {
        match self {
            Transport::Rtu(x) => x.send(unit, function, payload).await,
            Transport::Tcp(x) => x.send(unit, function, payload).await,
        }
    }

    /// Write a request and return `response_len` bytes starting at the function echo
    pub async fn send_and_receive(
        &mut self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, RequestError> {
        match self {
            Transport::Rtu(x) => x.send_and_receive(unit, function, payload, response_len).await,
            Transport::Tcp(x) => {
                x.send_and_receive(unit, function, payload, response_len)
                    .await
            }
        }
    }

    /// Coarse state after the last operation
    pub fn state(&self) -> TransportState {
        match self {
            Transport::Rtu(x) => x.state(),
            Transport::Tcp(x) => x.state(),
        }
    }

    /// Error message of the last operation, if it failed
    pub fn last_error(&self) -> Option<&str> {
        match self {
            Transport::Rtu(x) => x.last_error(),
            Transport::Tcp(x) => x.last_error(),
        }
    }

    /// TCP connection state, `None` for serial lines
    pub fn connection_state(&self) -> Option<ConnectionState> {
        match self {
            Transport::Rtu(_) => None,
            Transport::Tcp(x) => Some(x.connection_state()),
        }
    }

    /// Second line of the status text: the last error, or the connected peer
    pub(crate) fn status_detail(&self) -> Option<String> {
        match self {
            Transport::Rtu(x) => x.last_error().map(str::to_string),
            Transport::Tcp(x) => match x.connection_state() {
                ConnectionState::Connected => Some(format!("Connected to {}", x.peer())),
                _ => x.last_error().map(str::to_string),
            },
        }
    }
}
