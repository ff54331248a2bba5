use crate::constants::limits;
use crate::error::{AduParseError, ConfigError, InvalidRange};

/// Modbus unit identifier, just a type-safe wrapper around `u8`
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Ord, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId {
    /// underlying raw value
    pub value: u8,
}

/// Start and count tuple used when making various requests
/// Cannot be constructed with invalid start/count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    /// Starting address of the range
    pub start: u16,
    /// Count of elements in the range
    pub count: u16,
}

/// Value and its address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Indexed<T> {
    /// Address of the value
    pub index: u16,
    /// Associated value
    pub value: T,
}

/// Status word and event count returned by the equipment's communication event counter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct CommEventCounter {
    /// 0xFFFF while a previous program command is still being processed
    pub status: u16,
    /// Number of successful message completions
    pub event_count: u16,
}

/// Framing used on the medium
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum Protocol {
    /// Serial line with address + CRC framing
    Rtu,
    /// TCP with the length-prefixed header (not MBAP)
    Tcp,
}

/// How strictly the CRC of a received RTU frame is checked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum CrcCheck {
    /// Reject the frame if either CRC byte differs
    #[default]
    Strict,
    /// Reject the frame only when both CRC bytes differ
    ///
    /// Some legacy installations depend on this tolerance.
    Legacy,
}

/// Coarse state of a transport after its last operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportState {
    /// The last operation failed, or nothing has been attempted yet
    #[default]
    Unknown,
    /// The last operation succeeded
    On,
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.value)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Rtu => f.write_str("RTU"),
            Protocol::Tcp => f.write_str("TCP"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RTU" => Ok(Protocol::Rtu),
            "TCP" => Ok(Protocol::Tcp),
            _ => Err(ConfigError::UnknownProtocol(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Unknown => f.write_str("UNKNOWN"),
            TransportState::On => f.write_str("ON"),
        }
    }
}

pub(crate) fn coil_from_u16(value: u16) -> Result<bool, AduParseError> {
    match value {
        crate::constants::coil::ON => Ok(true),
        crate::constants::coil::OFF => Ok(false),
        _ => Err(AduParseError::UnknownCoilState(value)),
    }
}

pub(crate) fn coil_to_u16(value: bool) -> u16 {
    if value {
        crate::constants::coil::ON
    } else {
        crate::constants::coil::OFF
    }
}

impl AddressRange {
    /// Create a new address range
    pub fn try_from(start: u16, count: u16) -> Result<Self, InvalidRange> {
        if count == 0 {
            return Err(InvalidRange::CountOfZero);
        }

        let max_start = u16::MAX - (count - 1);

        if start > max_start {
            return Err(InvalidRange::AddressOverflow(start, count));
        }

        Ok(Self { start, count })
    }

    /// Converts to std::ops::Range
    pub fn to_std_range(self) -> std::ops::Range<usize> {
        let start = self.start as usize;
        let end = start + (self.count as usize);
        start..end
    }

    /// True if `other` lies entirely inside this range
    pub fn contains(&self, other: &AddressRange) -> bool {
        let outer = self.to_std_range();
        let inner = other.to_std_range();
        inner.start >= outer.start && inner.end <= outer.end
    }

    pub(crate) fn of_read_bits(self) -> Result<Self, InvalidRange> {
        self.limited_count(limits::MAX_READ_COILS_COUNT)
    }

    pub(crate) fn of_read_registers(self) -> Result<Self, InvalidRange> {
        self.limited_count(limits::MAX_READ_REGISTERS_COUNT)
    }

    pub(crate) fn of_write_coils(self) -> Result<Self, InvalidRange> {
        self.limited_count(limits::MAX_WRITE_COILS_COUNT)
    }

    pub(crate) fn of_write_registers(self) -> Result<Self, InvalidRange> {
        self.limited_count(limits::MAX_WRITE_REGISTERS_COUNT)
    }

    fn limited_count(self, limit: u16) -> Result<Self, InvalidRange> {
        if self.count > limit {
            return Err(InvalidRange::CountTooLargeForType(self.count, limit));
        }
        Ok(self)
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "start: {:#06X} qty: {}", self.start, self.count)
    }
}

impl<T> Indexed<T> {
    /// Create a new indexed value
    pub fn new(index: u16, value: T) -> Self {
        Indexed { index, value }
    }
}

impl UnitId {
    /// Create a new UnitId
    pub fn new(value: u8) -> Self {
        Self { value }
    }

    /// Broadcast address
    pub fn broadcast() -> Self {
        Self { value: 0x00 }
    }

    /// Returns true if the address is reserved in RTU mode
    ///
    /// Users should *not* use reserved addresses in RTU mode.
    pub fn is_rtu_reserved(&self) -> bool {
        self.value >= 248
    }
}

/// Create the default UnitId of `0x01`
impl Default for UnitId {
    fn default() -> Self {
        Self { value: 0x01 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_start_max_count_of_one_is_allowed() {
        AddressRange::try_from(u16::MAX, 1).unwrap();
    }

    #[test]
    fn address_maximum_range_is_ok() {
        AddressRange::try_from(0, 0xFFFF).unwrap();
    }

    #[test]
    fn address_count_zero_fails_validation() {
        assert_eq!(AddressRange::try_from(0, 0), Err(InvalidRange::CountOfZero));
    }

    #[test]
    fn start_max_count_of_two_overflows() {
        assert_eq!(
            AddressRange::try_from(u16::MAX, 2),
            Err(InvalidRange::AddressOverflow(u16::MAX, 2))
        );
    }

    #[test]
    fn enforces_per_type_limits() {
        let range = AddressRange::try_from(0, 121).unwrap();
        assert_eq!(
            range.of_read_registers(),
            Err(InvalidRange::CountTooLargeForType(121, 120))
        );
        assert!(AddressRange::try_from(0, 2000)
            .unwrap()
            .of_read_bits()
            .is_ok());
        assert!(AddressRange::try_from(0, 1969)
            .unwrap()
            .of_write_coils()
            .is_err());
    }

    #[test]
    fn containment_requires_the_whole_range() {
        let block = AddressRange::try_from(100, 10).unwrap();
        assert!(block.contains(&AddressRange::try_from(100, 10).unwrap()));
        assert!(block.contains(&AddressRange::try_from(105, 5).unwrap()));
        assert!(!block.contains(&AddressRange::try_from(105, 6).unwrap()));
        assert!(!block.contains(&AddressRange::try_from(99, 2).unwrap()));
    }

    #[test]
    fn parses_protocol_names() {
        assert_eq!("rtu".parse::<Protocol>(), Ok(Protocol::Rtu));
        assert_eq!(" TCP ".parse::<Protocol>(), Ok(Protocol::Tcp));
        assert!("ascii".parse::<Protocol>().is_err());
    }

    #[test]
    fn broadcast_address() {
        assert_eq!(UnitId::broadcast(), UnitId::new(0x00));
    }

    #[test]
    fn rtu_reserved_address() {
        assert!(UnitId::new(248).is_rtu_reserved());
        assert!(UnitId::new(255).is_rtu_reserved());
        assert!(!UnitId::new(41).is_rtu_reserved());
    }
}
