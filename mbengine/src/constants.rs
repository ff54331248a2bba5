pub(crate) mod coil {
    /// u16 representation of COIL == ON when performing force single coil
    pub(crate) const ON: u16 = 0xFF00;
    /// u16 representation of COIL == OFF when performing force single coil
    pub(crate) const OFF: u16 = 0x0000;
}

/// Limits enforced before any I/O takes place
pub mod limits {
    /// Maximum count allowed in a read coils / read input status request
    pub const MAX_READ_COILS_COUNT: u16 = 0x07D0;
    /// Maximum count allowed in a read holding/input registers request
    ///
    /// Kept below the protocol maximum of 125 so that a response always fits in one frame
    pub const MAX_READ_REGISTERS_COUNT: u16 = 120;
    /// Maximum count allowed in a force multiple coils request
    pub const MAX_WRITE_COILS_COUNT: u16 = 0x07B0;
    /// Maximum count allowed in a preset multiple registers / read-write request
    pub const MAX_WRITE_REGISTERS_COUNT: u16 = 120;
}

/// Frame size bookkeeping
pub mod frame {
    /// Maximum size of any frame, request or response, on either transport
    pub const MAX_FRAME_SIZE: usize = 512;
    /// Node address + CRC
    pub(crate) const RTU_OVERHEAD: usize = 3;
    /// node, 4 zero bytes, length, node
    pub(crate) const TCP_HEADER_LENGTH: usize = 7;
    /// header + function echo + at least one byte of data
    pub(crate) const TCP_MIN_RESPONSE_LENGTH: usize = 9;
}

pub(crate) mod exceptions {
    pub(crate) const ILLEGAL_FUNCTION: u8 = 0x01;
    pub(crate) const ILLEGAL_DATA_ADDRESS: u8 = 0x02;
    pub(crate) const ILLEGAL_DATA_VALUE: u8 = 0x03;
    pub(crate) const SERVER_DEVICE_FAILURE: u8 = 0x04;
    pub(crate) const ACKNOWLEDGE: u8 = 0x05;
    pub(crate) const SERVER_DEVICE_BUSY: u8 = 0x06;
    pub(crate) const NEGATIVE_ACKNOWLEDGE: u8 = 0x07;
    pub(crate) const MEMORY_PARITY_ERROR: u8 = 0x08;
    pub(crate) const GATEWAY_PATH_UNAVAILABLE: u8 = 0x0A;
    pub(crate) const GATEWAY_TARGET_DEVICE_FAILED_TO_RESPOND: u8 = 0x0B;
}

/// bit set in the echoed function code of an exception response
pub(crate) const EXCEPTION_FLAG: u8 = 0x80;
