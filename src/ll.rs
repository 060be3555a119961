//! Single-register bus transactions.
//!
//! Every transaction is one command byte (register address, bit 7 set for
//! reads) followed by the payload. Failed transactions are counted before
//! the error is surfaced.

use embedded_hal::spi::SpiDevice;

use crate::registers::{Reg, DIR_READ};
use crate::{Error, Ism330Dlc};

impl<SPI, D> Ism330Dlc<'_, SPI, D>
where
    SPI: SpiDevice,
{
    pub(crate) fn transfer(&mut self, buffer: &mut [u8]) -> Result<(), Error<SPI::Error>> {
        if let Err(error) = self.spi.transfer_in_place(buffer) {
            self.counters.bad_transfer += 1;
            return Err(Error::Transport(error));
        }
        Ok(())
    }

    pub(crate) fn register_read(&mut self, reg: Reg) -> Result<u8, Error<SPI::Error>> {
        let mut buffer = [reg as u8 | DIR_READ, 0];
        self.transfer(&mut buffer)?;
        Ok(buffer[1])
    }

    pub(crate) fn register_write(&mut self, reg: Reg, value: u8) -> Result<(), Error<SPI::Error>> {
        if let Err(error) = self.spi.write(&[reg as u8, value]) {
            self.counters.bad_transfer += 1;
            return Err(Error::Transport(error));
        }
        Ok(())
    }

    /// Read-modify-write; the register is only written when the value
    /// actually changes.
    pub(crate) fn register_set_and_clear_bits(
        &mut self,
        reg: Reg,
        set_bits: u8,
        clear_bits: u8,
    ) -> Result<(), Error<SPI::Error>> {
        let value = self.register_read(reg)?;
        let updated = (value | set_bits) & !clear_bits;
        if updated != value {
            self.register_write(reg, updated)?;
        }
        Ok(())
    }
}
