use crate::error::RequestError;
use crate::serial::frame::{format_rtu_frame, parse_rtu_response};
use crate::tcp::frame::{format_tcp_frame, parse_tcp_response};
use crate::types::{CrcCheck, Protocol, UnitId};

/// Build a complete request frame for the given framing
///
/// Frames that would exceed [`MAX_FRAME_SIZE`](crate::constants::frame::MAX_FRAME_SIZE) are
/// rejected, never truncated.
pub fn encode_request(
    protocol: Protocol,
    unit: UnitId,
    function: u8,
    payload: &[u8],
) -> Result<Vec<u8>, RequestError> {
    let frame = match protocol {
        Protocol::Rtu => format_rtu_frame(unit, function, payload)?,
        Protocol::Tcp => format_tcp_frame(unit, function, payload)?,
    };
    Ok(frame)
}

/// Validate a complete response frame
///
/// Returns `response_len` bytes starting at the function code echo. The CRC check
/// only applies to RTU framing.
pub fn decode_response(
    protocol: Protocol,
    raw: &[u8],
    response_len: usize,
    crc_check: CrcCheck,
) -> Result<Vec<u8>, RequestError> {
    let pdu = match protocol {
        Protocol::Rtu => parse_rtu_response(raw, response_len, crc_check)?,
        Protocol::Tcp => parse_tcp_response(raw, response_len)?,
    };
    Ok(pdu.to_vec())
}
