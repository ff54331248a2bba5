use crate::common::function::FunctionCode;
use crate::error::{AduParseError, InvalidRequest, RequestError};

pub(crate) mod diagnostics;
pub(crate) mod mask_write;
pub(crate) mod read_bits;
pub(crate) mod read_registers;
pub(crate) mod read_write_multiple;
pub(crate) mod write_multiple;
pub(crate) mod write_single;

/// Everything the engine needs to run one typed request
pub(crate) trait RequestDetails {
    type Output;

    fn function(&self) -> FunctionCode;

    /// request body following the function code
    fn payload(&self) -> Result<Vec<u8>, RequestError>;

    /// bytes expected starting at the function echo
    fn response_len(&self) -> usize;

    /// parse the response body following the function echo
    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError>;
}

pub(crate) fn count_of(len: usize) -> Result<u16, InvalidRequest> {
    u16::try_from(len).map_err(|_| InvalidRequest::CountTooBigForU16(len))
}

pub(crate) fn read_u16(body: &[u8], offset: usize) -> Result<u16, AduParseError> {
    match body.get(offset..offset + 2) {
        Some([high, low]) => Ok(u16::from_be_bytes([*high, *low])),
        _ => Err(AduParseError::ByteCountMismatch(body.len(), offset + 2)),
    }
}

pub(crate) fn registers_from(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// check the leading byte count of a read response and return the data that follows
pub(crate) fn counted_data(body: &[u8], expected: usize) -> Result<&[u8], AduParseError> {
    match body.split_first() {
        Some((count, data)) if *count as usize == expected && data.len() >= expected => {
            Ok(&data[..expected])
        }
        Some((count, _)) => Err(AduParseError::ByteCountMismatch(*count as usize, expected)),
        None => Err(AduParseError::ByteCountMismatch(0, expected)),
    }
}
