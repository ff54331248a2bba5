use std::path::PathBuf;

use crate::common::phys::{log_rx, log_tx};
use crate::constants::EXCEPTION_FLAG;
use crate::decode::DecodeLevel;
use crate::error::RequestError;
use crate::serial::frame::{constants, format_rtu_frame, parse_rtu_response, RtuDisplay};
use crate::serial::log::DiagnosticLog;
use crate::serial::{SerialBus, SerialLine};
use crate::types::{CrcCheck, TransportState, UnitId};

/// Options of a [`SerialTransport`]
#[derive(Clone, Debug, Default)]
pub struct SerialOptions {
    /// Append a hex dump of every failed exchange to this file
    pub log_file: Option<PathBuf>,
    /// CRC strictness applied to responses
    pub crc_check: CrcCheck,
    /// Tracing of frames and bytes
    pub decode: DecodeLevel,
}

/// Transport over a serial line using RTU framing
///
/// Every exchange holds the [`SerialBus`] lock from the first byte written to the last
/// byte read, so transports sharing a bus never interleave on the medium.
pub struct SerialTransport {
    line: Box<dyn SerialLine>,
    bus: SerialBus,
    log: DiagnosticLog,
    crc_check: CrcCheck,
    decode: DecodeLevel,
    state: TransportState,
    last_error: Option<String>,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("state", &self.state)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl SerialTransport {
    /// Create a transport over `line` sharing the medium through `bus`
    pub fn new(line: Box<dyn SerialLine>, bus: SerialBus, options: SerialOptions) -> Self {
        Self {
            line,
            bus,
            log: DiagnosticLog::new(options.log_file),
            crc_check: options.crc_check,
            decode: options.decode,
            state: TransportState::Unknown,
            last_error: None,
        }
    }

    /// Coarse state after the last operation
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Error message of the last operation, if it failed
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
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

    /// Write a request and read back `response_len` bytes starting at the function echo
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
        let frame = format_rtu_frame(unit, function, payload)?;
        let guard = self.bus.acquire().await;
        let result = self.write_frame(&frame).await;
        drop(guard);

        if let Err(err) = &result {
            self.log.record(&err.to_string(), &frame, &[]).await;
        }
        result
    }

    async fn send_and_receive_inner(
        &mut self,
        unit: UnitId,
        function: u8,
        payload: &[u8],
        response_len: usize,
    ) -> Result<Vec<u8>, RequestError> {
        let frame = format_rtu_frame(unit, function, payload)?;

        let mut received = Vec::new();
        let guard = self.bus.acquire().await;
        let result = self
            .exchange(&frame, response_len, &mut received)
            .await;
        drop(guard);

        if let Err(err) = &result {
            self.log.record(&err.to_string(), &frame, &received).await;
        }
        result
    }

    async fn exchange(
        &mut self,
        frame: &[u8],
        response_len: usize,
        received: &mut Vec<u8>,
    ) -> Result<Vec<u8>, RequestError> {
        self.write_frame(frame).await?;

        received.extend(self.line.read(constants::ECHO_LENGTH).await?);
        if received.len() < constants::ECHO_LENGTH {
            log_rx(self.decode.physical, received);
            return Err(RequestError::ResponseTimeout);
        }

        // exception: code + CRC, otherwise the rest of the body + CRC
        let remaining = if received[1] & EXCEPTION_FLAG != 0 {
            1 + constants::CRC_LENGTH
        } else {
            response_len + 1
        };

        let rest = self.line.read(remaining).await?;
        if rest.len() < remaining {
            tracing::warn!(
                "missing characters: expected {} received {}",
                remaining,
                rest.len()
            );
        }
        received.extend(rest);
        log_rx(self.decode.physical, received);

        let pdu = parse_rtu_response(received, response_len, self.crc_check)?;
        if self.decode.frame.enabled() {
            tracing::info!("RTU RX - {}", RtuDisplay::new(self.decode.frame, received));
        }
        Ok(pdu.to_vec())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), RequestError> {
        self.line.flush().await?;
        if self.decode.frame.enabled() {
            tracing::info!("RTU TX - {}", RtuDisplay::new(self.decode.frame, frame));
        }
        log_tx(self.decode.physical, frame);
        self.line.write(frame).await?;
        Ok(())
    }

    fn record<T>(&mut self, result: Result<T, RequestError>) -> Result<T, RequestError> {
        match &result {
            Ok(_) => {
                self.state = TransportState::On;
                self.last_error = None;
            }
            Err(err) => {
                self.state = TransportState::Unknown;
                self.last_error = Some(err.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::FrameParseError;
    use crate::exception::ExceptionCode;
    use crate::serial::mock::{mock, Event, Handle};

    fn transport() -> (SerialTransport, Handle) {
        let (line, handle) = mock();
        let transport = SerialTransport::new(Box::new(line), SerialBus::new(), SerialOptions::default());
        (transport, handle)
    }

    #[tokio::test]
    async fn reads_holding_registers() {
        let (mut transport, mut io) = transport();
        io.write(&[0x2A, 0x03, 0x00, 0x10, 0x00, 0x03, 0x02, 0x15]);
        io.read(&[
            0x2A, 0x03, 0x06, 0x12, 0x34, 0x56, 0x78, 0x23, 0x45, 0x30, 0x60,
        ]);

        let pdu = transport
            .send_and_receive(UnitId::new(0x2A), 0x03, &[0x00, 0x10, 0x00, 0x03], 8)
            .await
            .unwrap();

        assert_eq!(pdu, [0x03, 0x06, 0x12, 0x34, 0x56, 0x78, 0x23, 0x45]);
        assert_eq!(transport.state(), TransportState::On);
        assert_eq!(transport.last_error(), None);
        assert_eq!(io.next_event(), Some(Event::Flush));
        assert_eq!(io.next_event(), Some(Event::Write(8)));
        assert_eq!(io.next_event(), Some(Event::Read(2)));
        assert_eq!(io.next_event(), Some(Event::Read(9)));
    }

    #[tokio::test]
    async fn exception_reads_code_and_crc() {
        let (mut transport, mut io) = transport();
        io.write(&[0x2A, 0x03, 0x00, 0x10, 0x00, 0x03, 0x02, 0x15]);
        let mut response = vec![0x2A, 0x83, 0x02];
        response.extend(crate::serial::frame::crc16(&response).to_le_bytes());
        io.read(&response);

        let err = transport
            .send_and_receive(UnitId::new(0x2A), 0x03, &[0x00, 0x10, 0x00, 0x03], 8)
            .await
            .unwrap_err();

        assert_eq!(err, RequestError::Exception(ExceptionCode::IllegalDataAddress));
        assert_eq!(transport.state(), TransportState::Unknown);
        assert_eq!(
            transport.last_error(),
            Some("modbus exception: Register address not allowed")
        );
    }

    #[tokio::test]
    async fn silence_is_a_timeout() {
        let (mut transport, mut io) = transport();
        io.write(&[0x2A, 0x07, 0x5F, 0x12]);

        let err = transport
            .send_and_receive(UnitId::new(0x2A), 0x07, &[], 2)
            .await
            .unwrap_err();

        assert_eq!(err, RequestError::ResponseTimeout);
        assert_eq!(transport.state(), TransportState::Unknown);
    }

    #[tokio::test]
    async fn missing_characters_are_a_protocol_error() {
        let (mut transport, mut io) = transport();
        io.write(&[0x2A, 0x03, 0x00, 0x10, 0x00, 0x03, 0x02, 0x15]);
        io.read(&[0x2A, 0x03, 0x06, 0x12, 0x34]);

        let err = transport
            .send_and_receive(UnitId::new(0x2A), 0x03, &[0x00, 0x10, 0x00, 0x03], 8)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RequestError::BadFrame(FrameParseError::TooShort {
                expected: 11,
                actual: 5
            })
        );
    }

    #[tokio::test]
    async fn success_clears_the_previous_error() {
        let (mut transport, mut io) = transport();
        io.write_error(std::io::ErrorKind::BrokenPipe);
        assert!(transport
            .send(UnitId::new(1), 0x06, &[0x00, 0x01, 0x00, 0x02])
            .await
            .is_err());
        assert!(transport.last_error().is_some());

        let frame = format_rtu_frame(UnitId::new(1), 0x06, &[0x00, 0x01, 0x00, 0x02]).unwrap();
        io.write(&frame);
        transport
            .send(UnitId::new(1), 0x06, &[0x00, 0x01, 0x00, 0x02])
            .await
            .unwrap();
        assert_eq!(transport.state(), TransportState::On);
        assert_eq!(transport.last_error(), None);
    }

    #[tokio::test]
    async fn failures_are_written_to_the_diagnostic_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rtu.log");
        let (line, mut io) = mock();
        let mut transport = SerialTransport::new(
            Box::new(line),
            SerialBus::new(),
            SerialOptions {
                log_file: Some(path.clone()),
                ..Default::default()
            },
        );

        io.write(&[0x2A, 0x07, 0x5F, 0x12]);
        let _ = transport
            .send_and_receive(UnitId::new(0x2A), 0x07, &[], 2)
            .await;

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Send: 0000 2A 07 5F 12"));
        assert!(content.contains("Recv: No response"));
    }

    // Answers every request with a fixed response and counts exchanges that overlap
    struct SharedMedium {
        response: Vec<u8>,
        pending: Vec<u8>,
        active: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl SerialLine for SharedMedium {
        async fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        async fn write(&mut self, _data: &[u8]) -> std::io::Result<()> {
            if self.active.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            self.pending = self.response.clone();
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }

        async fn read(&mut self, count: usize) -> std::io::Result<Vec<u8>> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let taken = count.min(self.pending.len());
            let data: Vec<u8> = self.pending.drain(..taken).collect();
            if self.pending.is_empty() {
                self.active.store(false, Ordering::SeqCst);
            }
            Ok(data)
        }
    }

    async fn read_status(transport: &mut SerialTransport) {
        for _ in 0..5 {
            let pdu = transport
                .send_and_receive(UnitId::new(0x2A), 0x07, &[], 2)
                .await
                .unwrap();
            assert_eq!(pdu, [0x07, 0x6D]);
        }
    }

    async fn run_pair(first: SerialBus, second: SerialBus) -> usize {
        let active = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let mut response = vec![0x2A, 0x07, 0x6D];
        response.extend(crate::serial::frame::crc16(&response).to_le_bytes());

        let line = || SharedMedium {
            response: response.clone(),
            pending: Vec::new(),
            active: active.clone(),
            overlaps: overlaps.clone(),
        };
        let mut a = SerialTransport::new(Box::new(line()), first, SerialOptions::default());
        let mut b = SerialTransport::new(Box::new(line()), second, SerialOptions::default());

        tokio::join!(read_status(&mut a), read_status(&mut b));

        overlaps.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn transports_on_one_bus_never_interleave() {
        let bus = SerialBus::new();
        assert_eq!(run_pair(bus.clone(), bus).await, 0);
    }

    #[tokio::test]
    async fn transports_on_separate_buses_do_interleave() {
        assert!(run_pair(SerialBus::new(), SerialBus::new()).await > 0);
    }
}
