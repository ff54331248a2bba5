use crate::client::requests::write_multiple::WriteMultiple;
use crate::client::requests::{counted_data, registers_from, RequestDetails};
use crate::common::function::FunctionCode;
use crate::error::RequestError;
use crate::types::AddressRange;

/// Read/write multiple registers (FC 23)
///
/// The write is performed before the read.
pub(crate) struct ReadWriteMultiple {
    read: AddressRange,
    write: WriteMultiple<u16>,
}

impl ReadWriteMultiple {
    pub(crate) fn new(
        read: AddressRange,
        write_start: u16,
        values: Vec<u16>,
    ) -> Result<Self, RequestError> {
        Ok(Self {
            read: read.of_read_registers()?,
            write: WriteMultiple::new(write_start, values)?,
        })
    }
}

impl RequestDetails for ReadWriteMultiple {
    type Output = Vec<u16>;

    fn function(&self) -> FunctionCode {
        FunctionCode::ReadWriteMultipleRegisters
    }

    fn payload(&self) -> Result<Vec<u8>, RequestError> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.read.start.to_be_bytes());
        payload.extend_from_slice(&self.read.count.to_be_bytes());
        self.write.serialize_into(&mut payload)?;
        Ok(payload)
    }

    fn response_len(&self) -> usize {
        2 + 2 * self.read.count as usize
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        let data = counted_data(body, 2 * self.read.count as usize)?;
        Ok(registers_from(data))
    }
}
