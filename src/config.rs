//! Intended register state: write, verify, self-heal.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use crate::registers::{
    ctrl1_xl, ctrl2_g, ctrl3_c, ctrl4_c, ctrl6_c, fifo_ctrl2, fifo_ctrl3, fifo_ctrl5, int1_ctrl,
    Reg, WHOAMI,
};
use crate::{Config, Error, Ism330Dlc};

/// One register of the intended device state: bits that must be set and bits
/// that must be clear. The two masks never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterConfig {
    pub reg: Reg,
    pub set_bits: u8,
    pub clear_bits: u8,
}

pub(crate) const CONFIG_REGISTER_COUNT: usize = 11;

/// Attempts to observe the reset-complete bit before giving up.
pub(crate) const RESET_POLL_ATTEMPTS: u32 = 25;
const RESET_POLL_INTERVAL_US: u32 = 100;

/// Builds the ordered intended state. Insertion order is write order; the
/// FIFO mode register comes last so the FIFO only starts filling once the
/// timing-sensitive registers are in place.
pub(crate) fn register_cfg(
    config: &Config,
    watermark_words: u16,
    data_ready: bool,
) -> [RegisterConfig; CONFIG_REGISTER_COUNT] {
    let accel_cfg = config.odr.bits() | config.accel_range.bits();
    let gyro_cfg = config.odr.bits() | config.gyro_range.bits();
    let filter_cfg = config.gyro_bandwidth.bits();
    let decimation = fifo_ctrl3::DEC_FIFO_GYRO_NONE | fifo_ctrl3::DEC_FIFO_XL_NONE;
    let fifo_mode = config.odr.fifo_bits() | fifo_ctrl5::FIFO_MODE_CONTINUOUS;
    let watermark_low = (watermark_words & 0xFF) as u8;
    let watermark_high = (watermark_words >> 8) as u8 & fifo_ctrl2::FTH_MASK;
    let interrupts = if data_ready { int1_ctrl::INT1_FTH } else { 0 };

    [
        // Block data update and address auto-increment for burst transfers
        RegisterConfig {
            reg: Reg::Ctrl3C,
            set_bits: ctrl3_c::BDU | ctrl3_c::IF_INC,
            clear_bits: 0,
        },
        RegisterConfig {
            reg: Reg::Ctrl1Xl,
            set_bits: accel_cfg,
            clear_bits: (ctrl1_xl::ODR_XL_MASK | ctrl1_xl::FS_XL_MASK | ctrl1_xl::LPF1_BW_SEL)
                & !accel_cfg,
        },
        // No additional accel filtering (LPF2, HP)
        RegisterConfig {
            reg: Reg::Ctrl8Xl,
            set_bits: 0,
            clear_bits: 0xFF,
        },
        // Gyro LPF1 enabled; disabling it adds too much noise
        RegisterConfig {
            reg: Reg::Ctrl4C,
            set_bits: ctrl4_c::LPF1_SEL_G,
            clear_bits: 0,
        },
        RegisterConfig {
            reg: Reg::Ctrl2G,
            set_bits: gyro_cfg,
            clear_bits: (ctrl2_g::ODR_G_MASK | ctrl2_g::FS_G_MASK | ctrl2_g::FS_125) & !gyro_cfg,
        },
        RegisterConfig {
            reg: Reg::Ctrl6C,
            set_bits: filter_cfg,
            clear_bits: ctrl6_c::FTYPE_MASK & !filter_cfg,
        },
        RegisterConfig {
            reg: Reg::FifoCtrl1,
            set_bits: watermark_low,
            clear_bits: !watermark_low,
        },
        RegisterConfig {
            reg: Reg::FifoCtrl2,
            set_bits: watermark_high,
            clear_bits: fifo_ctrl2::FTH_MASK & !watermark_high,
        },
        RegisterConfig {
            reg: Reg::FifoCtrl3,
            set_bits: decimation,
            clear_bits: fifo_ctrl3::DEC_MASK & !decimation,
        },
        RegisterConfig {
            reg: Reg::Int1Ctrl,
            set_bits: interrupts,
            clear_bits: !interrupts,
        },
        RegisterConfig {
            reg: Reg::FifoCtrl5,
            set_bits: fifo_mode,
            clear_bits: (fifo_ctrl5::ODR_FIFO_MASK | fifo_ctrl5::FIFO_MODE_MASK) & !fifo_mode,
        },
    ]
}

impl<SPI, D> Ism330Dlc<'_, SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    /// Check the WHO_AM_I identity.
    pub fn probe(&mut self) -> Result<(), Error<SPI::Error>> {
        let id = self.register_read(Reg::WhoAmI)?;
        if id != WHOAMI {
            return Err(Error::BadDevice(id));
        }
        Ok(())
    }

    /// Apply the intended state, register by register in insertion order.
    ///
    /// Each register is read back first and only written when it differs.
    /// A failed transaction is counted and skipped; configuration continues
    /// with the next register. Returns whether every register was applied.
    pub fn write_all(&mut self) -> bool {
        let mut success = true;
        for index in 0..CONFIG_REGISTER_COUNT {
            let cfg = self.register_cfg[index];
            if self
                .register_set_and_clear_bits(cfg.reg, cfg.set_bits, cfg.clear_bits)
                .is_err()
            {
                success = false;
            }
        }
        success
    }

    /// Verify a single register of the intended state and advance the
    /// round-robin cursor.
    ///
    /// One register per tick bounds the verification bus load; a full sweep
    /// takes `CONFIG_REGISTER_COUNT` ticks, trading detection latency for
    /// bandwidth. A drifted register is counted and re-written once.
    pub fn verify_one(&mut self) -> Result<bool, Error<SPI::Error>> {
        let index = self.checked_register;
        self.checked_register = (self.checked_register + 1) % CONFIG_REGISTER_COUNT;

        let cfg = self.register_cfg[index];
        if self.check_register(&cfg)? {
            return Ok(true);
        }

        self.counters.bad_register += 1;
        self.register_set_and_clear_bits(cfg.reg, cfg.set_bits, cfg.clear_bits)?;
        Ok(false)
    }

    fn check_register(&mut self, cfg: &RegisterConfig) -> Result<bool, Error<SPI::Error>> {
        let value = self.register_read(cfg.reg)?;
        Ok(value & cfg.set_bits == cfg.set_bits && value & cfg.clear_bits == 0)
    }

    /// Soft-reset the chip and re-apply the intended state.
    ///
    /// Polls the reset-complete bit with a bounded budget; if it never
    /// clears, [`Error::ResetTimeout`] is returned after exactly
    /// `RESET_POLL_ATTEMPTS` reads and the caller decides when to retry.
    pub fn reset(&mut self) -> Result<(), Error<SPI::Error>> {
        self.register_write(Reg::Ctrl3C, ctrl3_c::SW_RESET)?;

        for _ in 0..RESET_POLL_ATTEMPTS {
            self.delay.delay_us(RESET_POLL_INTERVAL_US);
            if self.register_read(Reg::Ctrl3C)? & ctrl3_c::SW_RESET == 0 {
                self.write_all();
                return Ok(());
            }
        }
        Err(Error::ResetTimeout)
    }

    /// Probe, apply the intended state and verify every register.
    pub(crate) fn configure(&mut self) -> Result<bool, Error<SPI::Error>> {
        self.probe()?;

        let mut success = self.write_all();
        for index in 0..CONFIG_REGISTER_COUNT {
            let cfg = self.register_cfg[index];
            if !self.check_register(&cfg)? {
                success = false;
            }
        }
        Ok(success)
    }
}

#[cfg(test)]
mod test {
    extern crate alloc;
    use alloc::vec;
    use alloc::vec::Vec;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::spi::{Mock as SpiMock, Transaction as SpiTransaction};

    use super::*;
    use crate::registers::DIR_READ;

    fn imu(expectations: &[SpiTransaction<u8>]) -> Ism330Dlc<'static, SpiMock<u8>, NoopDelay> {
        Ism330Dlc::new(SpiMock::new(expectations), NoopDelay, Config::default())
    }

    fn read_tx(reg: Reg, value: u8) -> Vec<SpiTransaction<u8>> {
        vec![
            SpiTransaction::transaction_start(),
            SpiTransaction::transfer_in_place(vec![reg as u8 | DIR_READ, 0], vec![0, value]),
            SpiTransaction::transaction_end(),
        ]
    }

    fn write_tx(reg: Reg, value: u8) -> Vec<SpiTransaction<u8>> {
        vec![
            SpiTransaction::transaction_start(),
            SpiTransaction::write_vec(vec![reg as u8, value]),
            SpiTransaction::transaction_end(),
        ]
    }

    #[test]
    fn register_table_masks_are_disjoint() {
        let imu = imu(&[]);
        for cfg in &imu.register_cfg {
            assert_eq!(cfg.set_bits & cfg.clear_bits, 0, "{:?}", cfg.reg);
        }
        imu.release().done();
    }

    #[test]
    fn fifo_mode_register_is_written_last() {
        let imu = imu(&[]);
        assert_eq!(imu.register_cfg[CONFIG_REGISTER_COUNT - 1].reg, Reg::FifoCtrl5);
        imu.release().done();
    }

    #[test]
    fn write_all_skips_registers_already_in_state() {
        let mut expectations = Vec::new();
        let table = register_cfg(&Config::default(), 36, false);
        for cfg in &table {
            expectations.extend(read_tx(cfg.reg, cfg.set_bits));
        }
        let mut imu = imu(&expectations);

        assert!(imu.write_all());
        assert_eq!(imu.counters().bad_transfer, 0);

        imu.release().done();
    }

    #[test]
    fn write_all_only_touches_drifted_bits() {
        // CTRL1_XL reads back with a stray filter bit; the rewrite keeps the
        // untouched bit 0 alone.
        let mut expectations = Vec::new();
        let table = register_cfg(&Config::default(), 36, false);
        for cfg in &table {
            if cfg.reg == Reg::Ctrl1Xl {
                expectations.extend(read_tx(cfg.reg, cfg.set_bits | 0x02 | 0x01));
                expectations.extend(write_tx(cfg.reg, cfg.set_bits | 0x01));
            } else {
                expectations.extend(read_tx(cfg.reg, cfg.set_bits));
            }
        }
        let mut imu = imu(&expectations);

        assert!(imu.write_all());

        imu.release().done();
    }

    #[test]
    fn verify_one_heals_a_drifted_register_and_advances() {
        // Entry 0 is CTRL3_C expecting BDU | IF_INC; IF_INC has dropped out.
        let mut expectations = Vec::new();
        expectations.extend(read_tx(Reg::Ctrl3C, 0x40));
        expectations.extend(read_tx(Reg::Ctrl3C, 0x40));
        expectations.extend(write_tx(Reg::Ctrl3C, 0x44));
        // Entry 1 (CTRL1_XL) matches on the next tick.
        expectations.extend(read_tx(Reg::Ctrl1Xl, 0xA4));
        let mut imu = imu(&expectations);

        assert_eq!(imu.verify_one(), Ok(false));
        assert_eq!(imu.counters().bad_register, 1);
        assert_eq!(imu.checked_register, 1);

        assert_eq!(imu.verify_one(), Ok(true));
        assert_eq!(imu.counters().bad_register, 1);
        assert_eq!(imu.checked_register, 2);

        imu.release().done();
    }

    #[test]
    fn verify_cursor_wraps_around() {
        let mut expectations = Vec::new();
        let table = register_cfg(&Config::default(), 36, false);
        for cfg in &table {
            expectations.extend(read_tx(cfg.reg, cfg.set_bits));
        }
        let mut imu = imu(&expectations);

        for _ in 0..CONFIG_REGISTER_COUNT {
            assert_eq!(imu.verify_one(), Ok(true));
        }
        assert_eq!(imu.checked_register, 0);

        imu.release().done();
    }

    #[test]
    fn reset_fails_after_exactly_the_poll_budget() {
        let mut expectations = Vec::new();
        expectations.extend(write_tx(Reg::Ctrl3C, 0x01));
        for _ in 0..RESET_POLL_ATTEMPTS {
            expectations.extend(read_tx(Reg::Ctrl3C, 0x05)); // SW_RESET stuck
        }
        let mut imu = imu(&expectations);

        assert_eq!(imu.reset(), Err(Error::ResetTimeout));

        // done() would fail on leftover expectations if fewer polls ran
        imu.release().done();
    }

    #[test]
    fn reset_rewrites_the_intended_state_once_complete() {
        let mut expectations = Vec::new();
        expectations.extend(write_tx(Reg::Ctrl3C, 0x01));
        expectations.extend(read_tx(Reg::Ctrl3C, 0x04)); // reset done, IF_INC default
        let table = register_cfg(&Config::default(), 36, false);
        for cfg in &table {
            let current = if cfg.reg == Reg::Ctrl3C { 0x04 } else { 0x00 };
            expectations.extend(read_tx(cfg.reg, current));
            let updated = (current | cfg.set_bits) & !cfg.clear_bits;
            if updated != current {
                expectations.extend(write_tx(cfg.reg, updated));
            }
        }
        let mut imu = imu(&expectations);

        assert_eq!(imu.reset(), Ok(()));

        imu.release().done();
    }

    #[test]
    fn probe_rejects_the_wrong_identity() {
        let expectations = read_tx(Reg::WhoAmI, 0x69);
        let mut imu = imu(&expectations);

        assert_eq!(imu.probe(), Err(Error::BadDevice(0x69)));

        imu.release().done();
    }
}
