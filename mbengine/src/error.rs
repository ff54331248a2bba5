use crate::exception::ExceptionCode;

/// Top-level error type returned by every engine operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// An I/O error occurred on the physical medium
    #[error("i/o error: {0}")]
    Io(std::io::ErrorKind),
    /// The equipment answered with an exception response
    #[error("modbus exception: {0}")]
    Exception(ExceptionCode),
    /// The request was rejected before any I/O took place
    #[error("invalid request: {0}")]
    BadRequest(InvalidRequest),
    /// The response frame could not be parsed at the framing layer
    #[error("bad frame: {0}")]
    BadFrame(FrameParseError),
    /// The response frame was well-formed but its content did not match the request
    #[error("bad response: {0}")]
    BadResponse(AduParseError),
    /// No response arrived before the configured timeout elapsed
    #[error("timeout occurred before receiving a response from the equipment")]
    ResponseTimeout,
    /// No connection exists to the equipment and none could be established
    #[error("no connection exists to the equipment")]
    NoConnection,
    /// The task servicing the request has shut down
    #[error("the task processing requests has shut down")]
    Shutdown,
}

/// Coarse classification of a [`RequestError`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connect, read, write, or timeout failure on the medium
    Transport,
    /// CRC mismatch, truncated frame, unexpected length or byte count
    Protocol,
    /// Exception response from the equipment
    Exception,
    /// Request rejected before any I/O
    Request,
    /// Background task no longer running
    Shutdown,
}

impl RequestError {
    /// Classify the error
    pub fn class(&self) -> ErrorClass {
        match self {
            RequestError::Io(_) | RequestError::ResponseTimeout | RequestError::NoConnection => {
                ErrorClass::Transport
            }
            RequestError::BadFrame(_) | RequestError::BadResponse(_) => ErrorClass::Protocol,
            RequestError::Exception(_) => ErrorClass::Exception,
            RequestError::BadRequest(_) => ErrorClass::Request,
            RequestError::Shutdown => ErrorClass::Shutdown,
        }
    }

    /// Remediation hint for equipment exceptions
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            RequestError::Exception(ex) => Some(ex.hint()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => RequestError::ResponseTimeout,
            kind => RequestError::Io(kind),
        }
    }
}

impl From<ExceptionCode> for RequestError {
    fn from(ex: ExceptionCode) -> Self {
        RequestError::Exception(ex)
    }
}

impl From<InvalidRequest> for RequestError {
    fn from(err: InvalidRequest) -> Self {
        RequestError::BadRequest(err)
    }
}

impl From<InvalidRange> for RequestError {
    fn from(err: InvalidRange) -> Self {
        RequestError::BadRequest(InvalidRequest::BadRange(err))
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadResponse(err)
    }
}

/// Errors that can be produced when validating start/count
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRange {
    /// Count of zero not allowed
    #[error("range contains count == 0")]
    CountOfZero,
    /// Address in range overflows u16
    #[error("start == {0} and count = {1} would overflow u16 representation")]
    AddressOverflow(u16, u16),
    /// Count too large for type
    #[error("count of {0} is too large for the specified type (max == {1})")]
    CountTooLargeForType(u16, u16),
}

/// Errors that result because of bad request parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidRequest {
    /// Request contained an invalid range
    #[error("{0}")]
    BadRange(InvalidRange),
    /// Count is too big to fit in a u16
    #[error("count of {0} is too big to fit in a u16")]
    CountTooBigForU16(usize),
    /// The encoded frame would exceed the maximum frame size
    #[error("frame length of {0} exceeds the maximum allowed length of {1}")]
    FrameTooBig(usize, usize),
    /// A length or byte count field cannot represent the encoded length
    #[error("length of {0} does not fit in a single length byte")]
    LengthByteOverflow(usize),
}

/// Errors that occur while parsing a frame off the medium
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FrameParseError {
    /// Received CRC doesn't match the computed CRC
    #[error("received crc {received:#06X} does not match calculated crc {expected:#06X}")]
    CrcMismatch {
        /// value read from the frame
        received: u16,
        /// value computed over the frame
        expected: u16,
    },
    /// Fewer bytes were received than required
    #[error("received {actual} bytes, expected at least {expected}")]
    TooShort {
        /// minimum number of bytes
        expected: usize,
        /// number of bytes received
        actual: usize,
    },
    /// Frame exceeds the maximum size
    #[error("frame length of {0} exceeds the maximum allowed length of {1}")]
    FrameTooBig(usize, usize),
}

/// Errors that occur while parsing the content of a response
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AduParseError {
    /// Response does not echo the request function code
    #[error("response function code {0:#04X} does not match request {1:#04X}")]
    UnexpectedFunction(u8, u8),
    /// Byte count in the response does not match the request
    #[error("byte count {0} does not match the expected count of {1}")]
    ByteCountMismatch(usize, usize),
    /// Echoed value of a write request does not match
    #[error("reply does not contain the same value that was written")]
    ReplyEchoMismatch,
    /// Coil state was neither 0xFF00 nor 0x0000
    #[error("received coil state with unspecified value: {0:#06X}")]
    UnknownCoilState(u16),
}

/// Errors detected while building an engine from configuration
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Host name could not be resolved to an address
    #[error("cannot resolve host {0}")]
    UnknownHost(String),
    /// A cache block descriptor is malformed
    #[error("bad cache block descriptor \"{0}\": {1}")]
    BadCacheBlock(String, &'static str),
    /// A timeout or interval is zero, negative, or not finite
    #[error("invalid value for {0}")]
    InvalidDuration(&'static str),
    /// The node address is outside what the protocol can address
    #[error("node address {0} is reserved")]
    ReservedNode(u8),
    /// A required field is missing for the selected protocol
    #[error("missing {0} for the selected protocol")]
    Missing(&'static str),
    /// The serial device could not be opened
    #[error("cannot open serial line {0}: {1}")]
    SerialOpen(String, String),
    /// Unknown protocol name
    #[error("unknown protocol {0}, expected RTU or TCP")]
    UnknownProtocol(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert_eq!(
            RequestError::Io(std::io::ErrorKind::BrokenPipe).class(),
            ErrorClass::Transport
        );
        assert_eq!(RequestError::ResponseTimeout.class(), ErrorClass::Transport);
        assert_eq!(
            RequestError::BadFrame(FrameParseError::TooShort {
                expected: 9,
                actual: 3
            })
            .class(),
            ErrorClass::Protocol
        );
        assert_eq!(
            RequestError::Exception(ExceptionCode::ServerDeviceBusy).class(),
            ErrorClass::Exception
        );
        assert_eq!(
            RequestError::from(InvalidRange::CountOfZero).class(),
            ErrorClass::Request
        );
    }

    #[test]
    fn timed_out_io_maps_to_response_timeout() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "late");
        assert_eq!(RequestError::from(err), RequestError::ResponseTimeout);
    }

    #[test]
    fn only_exceptions_carry_a_hint() {
        assert!(RequestError::Exception(ExceptionCode::IllegalDataAddress)
            .hint()
            .is_some());
        assert!(RequestError::NoConnection.hint().is_none());
    }
}
