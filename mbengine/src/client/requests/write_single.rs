use crate::client::requests::{read_u16, RequestDetails};
use crate::common::function::FunctionCode;
use crate::error::{AduParseError, RequestError};
use crate::types::{coil_from_u16, coil_to_u16, Indexed};

pub(crate) trait SingleWriteOperation: Sized + PartialEq + Copy {
    const FUNCTION: FunctionCode;
    fn serialize(&self) -> [u8; 4];
    fn parse(body: &[u8]) -> Result<Self, RequestError>;
}

/// Force single coil (FC 5) or preset single register (FC 6)
///
/// The equipment echoes the request, anything else is an error.
pub(crate) struct SingleWrite<T>
where
    T: SingleWriteOperation,
{
    request: T,
}

impl<T> SingleWrite<T>
where
    T: SingleWriteOperation,
{
    pub(crate) fn new(request: T) -> Self {
        Self { request }
    }
}

impl<T> RequestDetails for SingleWrite<T>
where
    T: SingleWriteOperation,
{
    type Output = T;

    fn function(&self) -> FunctionCode {
        T::FUNCTION
    }

    fn payload(&self) -> Result<Vec<u8>, RequestError> {
        Ok(self.request.serialize().to_vec())
    }

    fn response_len(&self) -> usize {
        5
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        let response = T::parse(body)?;
        if self.request != response {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(response)
    }
}

impl SingleWriteOperation for Indexed<bool> {
    const FUNCTION: FunctionCode = FunctionCode::WriteSingleCoil;

    fn serialize(&self) -> [u8; 4] {
        let [a, b] = self.index.to_be_bytes();
        let [c, d] = coil_to_u16(self.value).to_be_bytes();
        [a, b, c, d]
    }

    fn parse(body: &[u8]) -> Result<Self, RequestError> {
        Ok(Indexed::new(
            read_u16(body, 0)?,
            coil_from_u16(read_u16(body, 2)?)?,
        ))
    }
}

impl SingleWriteOperation for Indexed<u16> {
    const FUNCTION: FunctionCode = FunctionCode::WriteSingleRegister;

    fn serialize(&self) -> [u8; 4] {
        let [a, b] = self.index.to_be_bytes();
        let [c, d] = self.value.to_be_bytes();
        [a, b, c, d]
    }

    fn parse(body: &[u8]) -> Result<Self, RequestError> {
        Ok(Indexed::new(read_u16(body, 0)?, read_u16(body, 2)?))
    }
}
