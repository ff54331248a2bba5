use crate::client::engine::RequestEngine;
use crate::client::requests::diagnostics::{FetchCommEventCounter, ReadExceptionStatus};
use crate::client::requests::mask_write::MaskWrite;
use crate::client::requests::read_bits::ReadBits;
use crate::client::requests::read_registers::ReadRegisters;
use crate::client::requests::read_write_multiple::ReadWriteMultiple;
use crate::client::requests::write_multiple::WriteMultiple;
use crate::client::requests::write_single::{SingleWrite, SingleWriteOperation};
use crate::error::{AduParseError, RequestError};
use crate::types::{AddressRange, CommEventCounter, Indexed, UnitId};

/// Typed operations
///
/// Counts and addresses are validated before any I/O takes place.
impl RequestEngine {
    /// Read the state of a single coil (FC 1)
    pub async fn read_coil_status(&self, address: u16) -> Result<bool, RequestError> {
        let range = AddressRange::try_from(address, 1)?;
        let values = self.execute(ReadBits::coils(range)?).await?;
        values
            .first()
            .copied()
            .ok_or_else(|| AduParseError::ByteCountMismatch(0, 1).into())
    }

    /// Read `count` discrete inputs (FC 2)
    pub async fn read_input_status(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, RequestError> {
        let range = AddressRange::try_from(start, count)?;
        self.execute(ReadBits::discrete_inputs(range)?).await
    }

    /// Read `count` coils (FC 1)
    pub async fn read_multiple_coils_status(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<bool>, RequestError> {
        let range = AddressRange::try_from(start, count)?;
        self.execute(ReadBits::coils(range)?).await
    }

    /// Read `count` holding registers (FC 3)
    pub async fn read_holding_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RequestError> {
        let range = AddressRange::try_from(start, count)?;
        self.execute(ReadRegisters::holding(range)?).await
    }

    /// Read `count` input registers (FC 4)
    pub async fn read_input_registers(
        &self,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, RequestError> {
        let range = AddressRange::try_from(start, count)?;
        self.execute(ReadRegisters::input(range)?).await
    }

    /// Write a single coil (FC 5)
    pub async fn force_single_coil(&self, address: u16, value: bool) -> Result<(), RequestError> {
        self.execute(SingleWrite::new(Indexed::new(address, value)))
            .await?;
        Ok(())
    }

    /// Write consecutive coils starting at `start` (FC 15)
    pub async fn force_multiple_coils(
        &self,
        start: u16,
        values: &[bool],
    ) -> Result<(), RequestError> {
        self.execute(WriteMultiple::new(start, values.to_vec())?)
            .await?;
        Ok(())
    }

    /// Write a single holding register (FC 6)
    pub async fn preset_single_register(
        &self,
        address: u16,
        value: u16,
    ) -> Result<(), RequestError> {
        self.execute(SingleWrite::new(Indexed::new(address, value)))
            .await?;
        Ok(())
    }

    /// Write consecutive holding registers starting at `start` (FC 16)
    pub async fn preset_multiple_registers(
        &self,
        start: u16,
        values: &[u16],
    ) -> Result<(), RequestError> {
        self.execute(WriteMultiple::new(start, values.to_vec())?)
            .await?;
        Ok(())
    }

    /// Modify a holding register through AND and OR masks (FC 22)
    pub async fn mask_write_register(
        &self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<(), RequestError> {
        self.execute(MaskWrite::new(address, and_mask, or_mask))
            .await
    }

    /// Write `values` at `write_start`, then read `read_count` registers at `read_start` (FC 23)
    pub async fn read_write_registers(
        &self,
        read_start: u16,
        read_count: u16,
        write_start: u16,
        values: &[u16],
    ) -> Result<Vec<u16>, RequestError> {
        let read = AddressRange::try_from(read_start, read_count)?;
        self.execute(ReadWriteMultiple::new(read, write_start, values.to_vec())?)
            .await
    }

    /// Write a holding register on every node of the line (FC 6 to the broadcast address)
    ///
    /// Nodes never answer a broadcast, so this returns as soon as the frame is written.
    pub async fn preset_single_register_broadcast(
        &self,
        address: u16,
        value: u16,
    ) -> Result<(), RequestError> {
        let request = Indexed::new(address, value);
        self.send_to(
            UnitId::broadcast(),
            <Indexed<u16> as SingleWriteOperation>::FUNCTION.get_value(),
            &request.serialize(),
        )
        .await
    }

    /// Read the eight exception status outputs (FC 7)
    pub async fn read_exception_status(&self) -> Result<u8, RequestError> {
        self.execute(ReadExceptionStatus).await
    }

    /// Fetch the status word and event count of the communication event counter (FC 11)
    pub async fn fetch_comm_event_counter(&self) -> Result<CommEventCounter, RequestError> {
        self.execute(FetchCommEventCounter).await
    }
}
