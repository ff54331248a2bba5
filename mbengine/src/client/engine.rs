use tokio::sync::Mutex;

use crate::client::requests::RequestDetails;
use crate::error::{AduParseError, RequestError};
use crate::tcp::client::ConnectionState;
use crate::transport::Transport;
use crate::types::{Protocol, TransportState, UnitId};

/// Owns one [`Transport`] and serializes every exchange made through it
///
/// Share it between tasks with an `Arc`. Operations on one engine never overlap on the
/// medium; operations on different engines are only serialized if they share a
/// [`SerialBus`](crate::SerialBus).
#[derive(Debug)]
pub struct RequestEngine {
    unit: UnitId,
    protocol: Protocol,
    transport: Mutex<Transport>,
}

impl RequestEngine {
    /// Create an engine addressing `unit` through `transport`
    pub fn new(unit: UnitId, transport: impl Into<Transport>) -> Self {
        let transport = transport.into();
        Self {
            unit,
            protocol: transport.protocol(),
            transport: Mutex::new(transport),
        }
    }

    /// Node address of the equipment
    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Framing of the underlying transport
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Connect the transport ahead of the first request
    pub async fn connect(&self) -> Result<(), RequestError> {
        self.transport.lock().await.connect().await
    }

    /// Write `function` + `payload` and return `response_len` bytes starting at the function echo
    pub async fn send_and_receive(
        &self,
        function: u8,
        payload: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, RequestError> {
        self.transport
            .lock()
            .await
            .send_and_receive(self.unit, function, payload, response_len)
            .await
    }

    /// Write `function` + `payload` to the configured node without waiting for a response
    pub async fn send(&self, function: u8, payload: &[u8]) -> Result<(), RequestError> {
        self.send_to(self.unit, function, payload).await
    }

    /// Write `function` + `payload` to an explicit node, e.g. the broadcast address
    pub async fn send_to(
        &self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
    ) -> Result<(), RequestError> {
        self.transport
            .lock()
            .await
            .send(unit, function, payload)
            .await
    }

    /// Coarse state after the last operation
    pub async fn state(&self) -> TransportState {
        self.transport.lock().await.state()
    }

    /// Error message of the last operation, if it failed
    pub async fn last_error(&self) -> Option<String> {
        self.transport.lock().await.last_error().map(str::to_string)
    }

    /// TCP connection state, `None` for serial lines
    pub async fn connection_state(&self) -> Option<ConnectionState> {
        self.transport.lock().await.connection_state()
    }

    /// Human readable status
    ///
    /// The first line names the node and protocol, the second holds the last error or, on
    /// TCP, the connected peer.
    pub async fn status(&self) -> String {
        let detail = self.transport.lock().await.status_detail();
        let header = format!(
            "Modbus node address {} protocol {}",
            self.unit.value, self.protocol
        );
        match detail {
            Some(detail) => format!("{header}\n{detail}"),
            None => header,
        }
    }

    pub(crate) async fn execute<R>(&self, request: R) -> Result<R::Output, RequestError>
    where
        R: RequestDetails,
    {
        let function = request.function().get_value();
        let payload = request.payload()?;
        let response = self
            .send_and_receive(function, &payload, request.response_len())
            .await?;

        match response.split_first() {
            Some((echo, body)) if *echo == function => request.parse(body),
            Some((echo, _)) => Err(AduParseError::UnexpectedFunction(*echo, function).into()),
            None => Err(AduParseError::ByteCountMismatch(0, request.response_len()).into()),
        }
    }
}
