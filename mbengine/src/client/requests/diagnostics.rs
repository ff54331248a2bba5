use crate::client::requests::{read_u16, RequestDetails};
use crate::common::function::FunctionCode;
use crate::error::{AduParseError, RequestError};
use crate::types::CommEventCounter;

/// Read exception status (FC 7), an eight bit status vector
pub(crate) struct ReadExceptionStatus;

impl RequestDetails for ReadExceptionStatus {
    type Output = u8;

    fn function(&self) -> FunctionCode {
        FunctionCode::ReadExceptionStatus
    }

    fn payload(&self) -> Result<Vec<u8>, RequestError> {
        Ok(Vec::new())
    }

    fn response_len(&self) -> usize {
        2
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        match body.first() {
            Some(status) => Ok(*status),
            None => Err(AduParseError::ByteCountMismatch(0, 1).into()),
        }
    }
}

/// Fetch communication event counter (FC 11)
pub(crate) struct FetchCommEventCounter;

impl RequestDetails for FetchCommEventCounter {
    type Output = CommEventCounter;

    fn function(&self) -> FunctionCode {
        FunctionCode::FetchCommEventCounter
    }

    fn payload(&self) -> Result<Vec<u8>, RequestError> {
        Ok(Vec::new())
    }

    fn response_len(&self) -> usize {
        5
    }

    fn parse(&self, body: &[u8]) -> Result<Self::Output, RequestError> {
        Ok(CommEventCounter {
            status: read_u16(body, 0)?,
            event_count: read_u16(body, 2)?,
        })
    }
}
