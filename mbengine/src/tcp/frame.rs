use crate::common::function::FunctionDisplay;
use crate::constants::frame::{MAX_FRAME_SIZE, TCP_HEADER_LENGTH, TCP_MIN_RESPONSE_LENGTH};
use crate::constants::EXCEPTION_FLAG;
use crate::decode::FrameDecodeLevel;
use crate::error::{FrameParseError, InvalidRequest, RequestError};
use crate::exception::ExceptionCode;
use crate::types::UnitId;

/// offset of the function echo in a response
const FUNCTION_OFFSET: usize = TCP_HEADER_LENGTH;

// Header layout: node, 0, 0, 0, 0, length, node
//
// The length byte counts the function code, the payload and the repeated node address.
pub(crate) fn format_tcp_frame(
    unit: UnitId,
    function: u8,
    payload: &[u8],
) -> Result<Vec<u8>, InvalidRequest> {
    let pdu_length = payload.len() + 1;
    let length_field =
        u8::try_from(pdu_length + 1).map_err(|_| InvalidRequest::LengthByteOverflow(pdu_length))?;

    let length = TCP_HEADER_LENGTH + pdu_length;
    if length > MAX_FRAME_SIZE {
        return Err(InvalidRequest::FrameTooBig(length, MAX_FRAME_SIZE));
    }

    let mut frame = Vec::with_capacity(length);
    frame.extend_from_slice(&[unit.value, 0, 0, 0, 0, length_field, unit.value, function]);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Validate a TCP response and return `response_len` bytes starting at the function echo
pub(crate) fn parse_tcp_response(raw: &[u8], response_len: usize) -> Result<&[u8], RequestError> {
    if raw.len() < TCP_MIN_RESPONSE_LENGTH {
        return Err(FrameParseError::TooShort {
            expected: TCP_MIN_RESPONSE_LENGTH,
            actual: raw.len(),
        }
        .into());
    }

    if raw[FUNCTION_OFFSET] & EXCEPTION_FLAG != 0 {
        return Err(RequestError::Exception(ExceptionCode::from(
            raw[FUNCTION_OFFSET + 1],
        )));
    }

    let expected = FUNCTION_OFFSET + response_len;
    if raw.len() < expected {
        return Err(FrameParseError::TooShort {
            expected,
            actual: raw.len(),
        }
        .into());
    }

    Ok(&raw[FUNCTION_OFFSET..expected])
}

pub(crate) struct TcpDisplay<'a> {
    level: FrameDecodeLevel,
    frame: &'a [u8],
}

impl<'a> TcpDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, frame: &'a [u8]) -> Self {
        TcpDisplay { level, frame }
    }
}

impl std::fmt::Display for TcpDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match (self.frame.get(5), self.frame.get(6), self.frame.get(7)) {
            (Some(length), Some(node), Some(function)) => write!(
                f,
                "dest: {} len: {} fc: {}",
                UnitId::new(*node),
                length,
                FunctionDisplay(*function)
            )?,
            _ => write!(f, "(len = {})", self.frame.len())?,
        }
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.frame)?;
        }
        Ok(())
    }
}
