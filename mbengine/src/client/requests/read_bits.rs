use crate::client::requests::{counted_data, RequestDetails};
use crate::common::function::FunctionCode;
use crate::error::{AduParseError, RequestError};
use crate::types::AddressRange;
use crate::util::bits::{num_bytes_for_bits, unpack_bits};

/// Read coils (FC 1) or discrete inputs (FC 2)
pub(crate) struct ReadBits {
    function: FunctionCode,
    range: AddressRange,
}

impl ReadBits {
    pub(crate) fn coils(range: AddressRange) -> Result<Self, RequestError> {
        Ok(Self {
            function: FunctionCode::ReadCoils,
            range: range.of_read_bits()?,
        })
    }

    pub(crate) fn discrete_inputs(range: AddressRange) -> Result<Self, RequestError> {
        Ok(Self {
            function: FunctionCode::ReadDiscreteInputs,
            range: range.of_read_bits()?,
        })
    }
}

impl RequestDetails for ReadBits {
    type Output = Vec<bool>;

    fn function(&self) -> FunctionCode {
        self.function
    }

    fn payload(&self) -> Result<Vec<u8>, RequestError> {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&self.range.start.to_be_bytes());
        payload.extend_from_slice(&self.range.count.to_be_bytes());
        Ok(payload)
    }

    fn response_len(&self) -> usize {
        2 + num_bytes_for_bits(self.range.count)
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        let expected = num_bytes_for_bits(self.range.count);
        let data = counted_data(body, expected)?;
        unpack_bits(data, self.range.count)
            .ok_or_else(|| AduParseError::ByteCountMismatch(data.len(), expected).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_the_response_from_the_count() {
        let request = ReadBits::coils(AddressRange::try_from(0x13, 19).unwrap()).unwrap();
        assert_eq!(request.payload().unwrap(), [0x00, 0x13, 0x00, 0x13]);
        assert_eq!(request.response_len(), 5);
    }

    #[test]
    fn unpacks_bits_in_order() {
        let request =
            ReadBits::discrete_inputs(AddressRange::try_from(0, 10).unwrap()).unwrap();
        let values = request.parse(&[0x02, 0x05, 0x02]).unwrap();
        assert_eq!(
            values,
            [true, false, true, false, false, false, false, false, false, true]
        );
    }

    #[test]
    fn rejects_wrong_byte_count() {
        let request = ReadBits::coils(AddressRange::try_from(0, 10).unwrap()).unwrap();
        assert_eq!(
            request.parse(&[0x01, 0x05, 0x02]),
            Err(AduParseError::ByteCountMismatch(1, 2).into())
        );
    }

    #[test]
    fn rejects_counts_above_the_limit() {
        assert!(ReadBits::coils(AddressRange::try_from(0, 2001).unwrap()).is_err());
    }
}
