use crate::client::requests::{read_u16, RequestDetails};
use crate::common::function::FunctionCode;
use crate::error::{AduParseError, RequestError};

/// Mask write register (FC 22)
///
/// The equipment computes `(current & and_mask) | (or_mask & !and_mask)` and echoes the
/// request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct MaskWrite {
    pub(crate) address: u16,
    pub(crate) and_mask: u16,
    pub(crate) or_mask: u16,
}

impl MaskWrite {
    pub(crate) fn new(address: u16, and_mask: u16, or_mask: u16) -> Self {
        Self {
            address,
            and_mask,
            or_mask,
        }
    }
}

impl RequestDetails for MaskWrite {
    type Output = ();

    fn function(&self) -> FunctionCode {
        FunctionCode::MaskWriteRegister
    }

    fn payload(&self) -> Result<Vec<u8>, RequestError> {
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&self.address.to_be_bytes());
        payload.extend_from_slice(&self.and_mask.to_be_bytes());
        payload.extend_from_slice(&self.or_mask.to_be_bytes());
        Ok(payload)
    }

    fn response_len(&self) -> usize {
        7
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        let echo = MaskWrite::new(read_u16(body, 0)?, read_u16(body, 2)?, read_u16(body, 4)?);
        if echo != *self {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(())
    }
}
