use crate::client::requests::{count_of, read_u16, RequestDetails};
use crate::common::function::FunctionCode;
use crate::error::{AduParseError, InvalidRequest, RequestError};
use crate::types::AddressRange;
use crate::util::bits::pack_bits;

/// Values to write starting at an address
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct WriteMultiple<T> {
    pub(crate) range: AddressRange,
    pub(crate) values: Vec<T>,
}

pub(crate) trait MultipleWriteOperation: Sized {
    const FUNCTION: FunctionCode;
    fn limit(range: AddressRange) -> Result<AddressRange, RequestError>;
    fn serialize(values: &[Self]) -> Vec<u8>;
}

impl<T> WriteMultiple<T>
where
    T: MultipleWriteOperation,
{
    pub(crate) fn new(start: u16, values: Vec<T>) -> Result<Self, RequestError> {
        let count = count_of(values.len())?;
        let range = T::limit(AddressRange::try_from(start, count)?)?;
        Ok(Self { range, values })
    }

    /// start, count, byte count and packed values
    pub(crate) fn serialize_into(&self, payload: &mut Vec<u8>) -> Result<(), RequestError> {
        let data = T::serialize(&self.values);
        let byte_count =
            u8::try_from(data.len()).map_err(|_| InvalidRequest::LengthByteOverflow(data.len()))?;
        payload.extend_from_slice(&self.range.start.to_be_bytes());
        payload.extend_from_slice(&self.range.count.to_be_bytes());
        payload.push(byte_count);
        payload.extend_from_slice(&data);
        Ok(())
    }
}

impl MultipleWriteOperation for bool {
    const FUNCTION: FunctionCode = FunctionCode::WriteMultipleCoils;

    fn limit(range: AddressRange) -> Result<AddressRange, RequestError> {
        Ok(range.of_write_coils()?)
    }

    fn serialize(values: &[Self]) -> Vec<u8> {
        pack_bits(values)
    }
}

impl MultipleWriteOperation for u16 {
    const FUNCTION: FunctionCode = FunctionCode::WriteMultipleRegisters;

    fn limit(range: AddressRange) -> Result<AddressRange, RequestError> {
        Ok(range.of_write_registers()?)
    }

    fn serialize(values: &[Self]) -> Vec<u8> {
        values.iter().flat_map(|x| x.to_be_bytes()).collect()
    }
}

impl<T> RequestDetails for WriteMultiple<T>
where
    T: MultipleWriteOperation,
{
    type Output = AddressRange;

    fn function(&self) -> FunctionCode {
        T::FUNCTION
    }

    fn payload(&self) -> Result<Vec<u8>, RequestError> {
        let mut payload = Vec::new();
        self.serialize_into(&mut payload)?;
        Ok(payload)
    }

    fn response_len(&self) -> usize {
        5
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        let start = read_u16(body, 0)?;
        let count = read_u16(body, 2)?;
        if start != self.range.start || count != self.range.count {
            return Err(AduParseError::ReplyEchoMismatch.into());
        }
        Ok(self.range)
    }
}
