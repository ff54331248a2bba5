use crate::client::requests::{counted_data, registers_from, RequestDetails};
use crate::common::function::FunctionCode;
use crate::error::RequestError;
use crate::types::AddressRange;

/// Read holding (FC 3) or input (FC 4) registers
pub(crate) struct ReadRegisters {
    function: FunctionCode,
    range: AddressRange,
}

impl ReadRegisters {
    pub(crate) fn holding(range: AddressRange) -> Result<Self, RequestError> {
        Ok(Self {
            function: FunctionCode::ReadHoldingRegisters,
            range: range.of_read_registers()?,
        })
    }

    pub(crate) fn input(range: AddressRange) -> Result<Self, RequestError> {
        Ok(Self {
            function: FunctionCode::ReadInputRegisters,
            range: range.of_read_registers()?,
        })
    }
}

impl RequestDetails for ReadRegisters {
    type Output = Vec<u16>;

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
        2 + 2 * self.range.count as usize
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        let data = counted_data(body, 2 * self.range.count as usize)?;
        Ok(registers_from(data))
    }
}
