use crate::constants::exceptions;

/// Exception codes reported by field equipment in an exception response
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum ExceptionCode {
    /// The function code received in the query is not an allowable action for the server
    IllegalFunction,
    /// The data address received in the query is not an allowable address for the server
    IllegalDataAddress,
    /// A value contained in the request is not an allowable value for server
    IllegalDataValue,
    /// An unrecoverable error occurred while the server was attempting to perform the requested
    /// action
    ServerDeviceFailure,
    /// Specialized use in conjunction with programming commands
    ///
    /// The server has accepted the request and is processing it
    Acknowledge,
    /// Specialized use in conjunction with programming commands
    ///
    /// The server is engaged in processing a long-duration program command, try again later
    ServerDeviceBusy,
    /// The server cannot perform the program function received in the query
    NegativeAcknowledge,
    /// Specialized use in conjunction with function codes 20 and 21 and reference type 6, to
    /// indicate that the extended file area failed to pass a consistency check.
    MemoryParityError,
    /// Specialized use in conjunction with gateways.
    ///
    /// Indicates that the gateway was unable to allocate an internal communication path from
    /// the input port to the output port for processing the request.
    GatewayPathUnavailable,
    /// Specialized use in conjunction with gateways.
    ///
    /// Indicates that no response was obtained from the target device.
    GatewayTargetDeviceFailedToRespond,
    /// The exception code received is not defined in the standard
    Unknown(u8),
}

impl ExceptionCode {
    /// Suggested remediation for an operator reading the error
    pub fn hint(self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => {
                "check that the equipment supports this function code"
            }
            ExceptionCode::IllegalDataAddress => {
                "check the start address and count against the equipment register map"
            }
            ExceptionCode::IllegalDataValue => "check the written values and the requested count",
            ExceptionCode::ServerDeviceFailure => "inspect the equipment, it reported an internal fault",
            ExceptionCode::Acknowledge => "poll the equipment again later for completion",
            ExceptionCode::ServerDeviceBusy => "retry the request later",
            ExceptionCode::NegativeAcknowledge => {
                "the equipment cannot perform this request in its current mode"
            }
            ExceptionCode::MemoryParityError => "the equipment memory may need servicing",
            ExceptionCode::GatewayPathUnavailable => "check the gateway configuration and load",
            ExceptionCode::GatewayTargetDeviceFailedToRespond => {
                "check that the target node is present behind the gateway"
            }
            ExceptionCode::Unknown(_) => "consult the equipment documentation for this code",
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(value: u8) -> Self {
        match value {
            exceptions::ILLEGAL_FUNCTION => ExceptionCode::IllegalFunction,
            exceptions::ILLEGAL_DATA_ADDRESS => ExceptionCode::IllegalDataAddress,
            exceptions::ILLEGAL_DATA_VALUE => ExceptionCode::IllegalDataValue,
            exceptions::SERVER_DEVICE_FAILURE => ExceptionCode::ServerDeviceFailure,
            exceptions::ACKNOWLEDGE => ExceptionCode::Acknowledge,
            exceptions::SERVER_DEVICE_BUSY => ExceptionCode::ServerDeviceBusy,
            exceptions::NEGATIVE_ACKNOWLEDGE => ExceptionCode::NegativeAcknowledge,
            exceptions::MEMORY_PARITY_ERROR => ExceptionCode::MemoryParityError,
            exceptions::GATEWAY_PATH_UNAVAILABLE => ExceptionCode::GatewayPathUnavailable,
            exceptions::GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND => {
                ExceptionCode::GatewayTargetDeviceFailedToRespond
            }
            _ => ExceptionCode::Unknown(value),
        }
    }
}

impl From<ExceptionCode> for u8 {
    fn from(ex: ExceptionCode) -> Self {
        match ex {
            ExceptionCode::IllegalFunction => exceptions::ILLEGAL_FUNCTION,
            ExceptionCode::IllegalDataAddress => exceptions::ILLEGAL_DATA_ADDRESS,
            ExceptionCode::IllegalDataValue => exceptions::ILLEGAL_DATA_VALUE,
            ExceptionCode::ServerDeviceFailure => exceptions::SERVER_DEVICE_FAILURE,
            ExceptionCode::Acknowledge => exceptions::ACKNOWLEDGE,
            ExceptionCode::ServerDeviceBusy => exceptions::SERVER_DEVICE_BUSY,
            ExceptionCode::NegativeAcknowledge => exceptions::NEGATIVE_ACKNOWLEDGE,
            ExceptionCode::MemoryParityError => exceptions::MEMORY_PARITY_ERROR,
            ExceptionCode::GatewayPathUnavailable => exceptions::GATEWAY_PATH_UNAVAILABLE,
            ExceptionCode::GatewayTargetDeviceFailedToRespond => {
                exceptions::GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND
            }
            ExceptionCode::Unknown(value) => value,
        }
    }
}

impl std::error::Error for ExceptionCode {}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
        match self {
            ExceptionCode::IllegalFunction => f.write_str("Function code not allowed"),
            ExceptionCode::IllegalDataAddress => f.write_str("Register address not allowed"),
            ExceptionCode::IllegalDataValue => f.write_str("Register value not allowed"),
            ExceptionCode::ServerDeviceFailure => f.write_str("Unrecoverable error occurred"),
            ExceptionCode::Acknowledge => {
                f.write_str("Request has been accepted but processing may be long")
            }
            ExceptionCode::ServerDeviceBusy => f.write_str("Device is busy"),
            ExceptionCode::NegativeAcknowledge => {
                f.write_str("Requested function cannot be performed")
            }
            ExceptionCode::MemoryParityError => f.write_str("Parity error in the memory"),
            ExceptionCode::GatewayPathUnavailable => f.write_str("Gateway Path Unavailable"),
            ExceptionCode::GatewayTargetDeviceFailedToRespond => {
                f.write_str("No response from gateway")
            }
            ExceptionCode::Unknown(code) => write!(f, "Unknown modbus error code [{code}]"),
        }
    }
}
