use crate::common::function::FunctionDisplay;
use crate::constants::frame::{MAX_FRAME_SIZE, RTU_OVERHEAD};
use crate::constants::EXCEPTION_FLAG;
use crate::decode::FrameDecodeLevel;
use crate::error::{FrameParseError, InvalidRequest, RequestError};
use crate::exception::ExceptionCode;
use crate::types::{CrcCheck, UnitId};

pub(crate) mod constants {
    pub(crate) const CRC_LENGTH: usize = 2;
    /// node address + function echo, read before deciding how much more to read
    pub(crate) const ECHO_LENGTH: usize = 2;
}

/// precomputes the CRC table as a constant!
const CRC: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);

/// CRC-16/MODBUS of `data`, the value is transmitted low byte first
pub fn crc16(data: &[u8]) -> u16 {
    CRC.checksum(data)
}

pub(crate) fn format_rtu_frame(
    unit: UnitId,
    function: u8,
    payload: &[u8],
) -> Result<Vec<u8>, InvalidRequest> {
    let length = payload.len() + 1 + RTU_OVERHEAD;
    if length > MAX_FRAME_SIZE {
        return Err(InvalidRequest::FrameTooBig(length, MAX_FRAME_SIZE));
    }

    let mut frame = Vec::with_capacity(length);
    frame.push(unit.value);
    frame.push(function);
    frame.extend_from_slice(payload);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Validate a complete RTU response and return `response_len` bytes starting at the function echo
pub(crate) fn parse_rtu_response(
    raw: &[u8],
    response_len: usize,
    check: CrcCheck,
) -> Result<&[u8], RequestError> {
    if raw.len() < constants::ECHO_LENGTH {
        return Err(FrameParseError::TooShort {
            expected: constants::ECHO_LENGTH,
            actual: raw.len(),
        }
        .into());
    }

    if raw[1] & EXCEPTION_FLAG != 0 {
        return match raw.get(2) {
            Some(code) => Err(RequestError::Exception(ExceptionCode::from(*code))),
            None => Err(FrameParseError::TooShort {
                expected: constants::ECHO_LENGTH + 1,
                actual: raw.len(),
            }
            .into()),
        };
    }

    let body_end = response_len + 1;
    let expected = body_end + constants::CRC_LENGTH;
    if expected > MAX_FRAME_SIZE {
        return Err(FrameParseError::FrameTooBig(expected, MAX_FRAME_SIZE).into());
    }
    if raw.len() < expected {
        return Err(FrameParseError::TooShort {
            expected,
            actual: raw.len(),
        }
        .into());
    }

    let computed = crc16(&raw[..body_end]).to_le_bytes();
    let received = [raw[body_end], raw[body_end + 1]];
    let mismatch = match check {
        CrcCheck::Strict => computed != received,
        CrcCheck::Legacy => computed[0] != received[0] && computed[1] != received[1],
    };
    if mismatch {
        return Err(FrameParseError::CrcMismatch {
            received: u16::from_le_bytes(received),
            expected: u16::from_le_bytes(computed),
        }
        .into());
    }

    Ok(&raw[1..body_end])
}

pub(crate) struct RtuDisplay<'a> {
    level: FrameDecodeLevel,
    frame: &'a [u8],
}

impl<'a> RtuDisplay<'a> {
    pub(crate) fn new(level: FrameDecodeLevel, frame: &'a [u8]) -> Self {
        RtuDisplay { level, frame }
    }
}

impl std::fmt::Display for RtuDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.frame {
            [node, function, ..] => write!(
                f,
                "dest: {} fc: {} (len = {})",
                UnitId::new(*node),
                FunctionDisplay(*function),
                self.frame.len()
            )?,
            _ => write!(f, "(len = {})", self.frame.len())?,
        }
        if self.level.payload_enabled() {
            crate::common::phys::format_bytes(f, self.frame)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT_ID: u8 = 0x2A;

    const READ_COILS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x01,    // function code
        0x00, 0x10, // starting address
        0x00, 0x13, // qty of outputs
        0x7A, 0x19, // crc
    ];

    const READ_HOLDING_REGISTERS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x03,    // function code
        0x00, 0x10, // starting address
        0x00, 0x03, // qty of registers
        0x02, 0x15, // crc
    ];

    const READ_HOLDING_REGISTERS_RESPONSE: &[u8] = &[
        UNIT_ID, // unit id
        0x03,    // function code
        0x06,    // byte count
        0x12, 0x34, 0x56, 0x78, 0x23, 0x45, // register values
        0x30, 0x60, // crc
    ];

    const WRITE_SINGLE_COIL_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x05,    // function code
        0x00, 0x10, // output address
        0xFF, 0x00, // output value
        0x8B, 0xE4, // crc
    ];

    const WRITE_MULTIPLE_REGISTERS_REQUEST: &[u8] = &[
        UNIT_ID, // unit id
        0x10,    // function code
        0x00, 0x10, // starting address
        0x00, 0x02, // qty of outputs
        0x04, // byte count
        0x12, 0x34, 0x56, 0x78, // output values
        0x07, 0x73, // crc
    ];

    const ALL_REQUESTS: &[&[u8]] = &[
        READ_COILS_REQUEST,
        READ_HOLDING_REGISTERS_REQUEST,
        WRITE_SINGLE_COIL_REQUEST,
        WRITE_MULTIPLE_REGISTERS_REQUEST,
    ];

    #[test]
    fn crc_of_reference_vector() {
        let frame = format_rtu_frame(UnitId::new(1), 0x03, &[0x00, 0x00, 0x00, 0x01]).unwrap();
        assert_eq!(frame, [0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]);
    }

    #[test]
    fn formats_known_request_frames() {
        for request in ALL_REQUESTS {
            let body = &request[..request.len() - constants::CRC_LENGTH];
            let frame = format_rtu_frame(UnitId::new(body[0]), body[1], &body[2..]).unwrap();
            assert_eq!(&frame, request);
        }
    }

    #[test]
    fn parses_known_response() {
        let pdu = parse_rtu_response(READ_HOLDING_REGISTERS_RESPONSE, 8, CrcCheck::Strict).unwrap();
        assert_eq!(pdu, &READ_HOLDING_REGISTERS_RESPONSE[1..9]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let payload: Vec<u8> = (0..=250).collect();
        for len in [0, 1, 2, 17, 251] {
            let frame = format_rtu_frame(UnitId::new(7), 0x04, &payload[..len]).unwrap();
            let pdu = parse_rtu_response(&frame, len + 1, CrcCheck::Strict).unwrap();
            assert_eq!(pdu[0], 0x04);
            assert_eq!(&pdu[1..], &payload[..len]);
        }
    }

    #[test]
    fn any_single_bit_flip_in_the_crc_is_rejected() {
        let max_payload = MAX_FRAME_SIZE - RTU_OVERHEAD - 1;
        let payload: Vec<u8> = (0..max_payload).map(|x| (x * 31 % 251) as u8).collect();
        for len in 1..=max_payload {
            let frame = format_rtu_frame(UnitId::new(0x11), 0x03, &payload[..len]).unwrap();
            for crc_byte in [frame.len() - 2, frame.len() - 1] {
                for bit in 0..8 {
                    let mut corrupt = frame.clone();
                    corrupt[crc_byte] ^= 1 << bit;
                    let err = parse_rtu_response(&corrupt, len + 1, CrcCheck::Strict).unwrap_err();
                    assert!(matches!(
                        err,
                        RequestError::BadFrame(FrameParseError::CrcMismatch { .. })
                    ));
                }
            }
        }
    }

    #[test]
    fn legacy_check_tolerates_one_bad_crc_byte() {
        let mut frame = READ_HOLDING_REGISTERS_RESPONSE.to_vec();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(parse_rtu_response(&frame, 8, CrcCheck::Legacy).is_ok());
        assert!(parse_rtu_response(&frame, 8, CrcCheck::Strict).is_err());

        frame[last - 1] ^= 0x01;
        assert!(parse_rtu_response(&frame, 8, CrcCheck::Legacy).is_err());
    }

    #[test]
    fn maps_exception_response() {
        let err = parse_rtu_response(&[UNIT_ID, 0x83, 0x02], 8, CrcCheck::Strict).unwrap_err();
        assert_eq!(
            err,
            RequestError::Exception(ExceptionCode::IllegalDataAddress)
        );
        let err = parse_rtu_response(&[UNIT_ID, 0x83, 0x0C], 8, CrcCheck::Strict).unwrap_err();
        assert_eq!(err, RequestError::Exception(ExceptionCode::Unknown(12)));
    }

    #[test]
    fn rejects_truncated_response() {
        let err = parse_rtu_response(
            &READ_HOLDING_REGISTERS_RESPONSE[..8],
            8,
            CrcCheck::Strict,
        )
        .unwrap_err();
        assert_eq!(
            err,
            RequestError::BadFrame(FrameParseError::TooShort {
                expected: 11,
                actual: 8
            })
        );
    }

    #[test]
    fn refuses_to_build_oversized_frame() {
        let payload = vec![0u8; MAX_FRAME_SIZE];
        assert_eq!(
            format_rtu_frame(UnitId::new(1), 0x10, &payload),
            Err(InvalidRequest::FrameTooBig(MAX_FRAME_SIZE + 4, MAX_FRAME_SIZE))
        );
    }
}
