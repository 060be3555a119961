use bilge::prelude::*;
use bytemuck::{AnyBitPattern, NoUninit};
use embedded_hal::spi::SpiDevice;

use crate::registers::{fifo_ctrl5, Reg, DIR_READ};
use crate::{Error, Ism330Dlc};

/// On-chip FIFO capacity in bytes.
pub const FIFO_SIZE_BYTES: usize = 4096;

/// Batch capacity accepted by downstream consumers.
const MAX_BATCH_SAMPLES: usize = 32;

const FIFO_CAPACITY_SAMPLES: usize = FIFO_SIZE_BYTES / core::mem::size_of::<FifoData>() + 1;

/// Upper bound on the number of records moved by one drain, sized to the
/// smaller of the FIFO capacity and the downstream batch capacity.
pub const FIFO_MAX_SAMPLES: usize = if FIFO_CAPACITY_SAMPLES < MAX_BATCH_SAMPLES {
    FIFO_CAPACITY_SAMPLES
} else {
    MAX_BATCH_SAMPLES
};

/// The FIFO fill level is reported in 16-bit words; one record is a gyro
/// triplet followed by an accel triplet.
pub(crate) const WORDS_PER_RECORD: u16 = (core::mem::size_of::<FifoData>() / 2) as u16;

/// FIFO_STATUS1..FIFO_STATUS4, prepended to every drain transfer.
const FIFO_STATUS_LEN: usize = 4;

const FIFO_TRANSFER_LEN: usize = 1 + FIFO_STATUS_LEN + FIFO_MAX_SAMPLES * core::mem::size_of::<FifoData>();

#[bitsize(8)]
#[derive(DebugBits, FromBits, PartialEq)]
pub struct FifoStatus2 {
    pub(crate) diff_fifo_10_8: u3,
    reserved: u1,
    pub(crate) fifo_empty: u1,
    pub(crate) fifo_full_smart: u1,
    pub(crate) over_run: u1,
    pub(crate) waterm: u1,
}

/// One raw FIFO record as stored by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, NoUninit, AnyBitPattern, Default)]
#[repr(C)]
pub struct FifoData {
    pub out_x_l_g: u8,
    pub out_x_h_g: u8,
    pub out_y_l_g: u8,
    pub out_y_h_g: u8,
    pub out_z_l_g: u8,
    pub out_z_h_g: u8,
    pub out_x_l_xl: u8,
    pub out_x_h_xl: u8,
    pub out_y_l_xl: u8,
    pub out_y_h_xl: u8,
    pub out_z_l_xl: u8,
    pub out_z_h_xl: u8,
}

impl FifoData {
    pub fn gyro_x(&self) -> i16 {
        i16::from_le_bytes([self.out_x_l_g, self.out_x_h_g])
    }

    pub fn gyro_y(&self) -> i16 {
        i16::from_le_bytes([self.out_y_l_g, self.out_y_h_g])
    }

    pub fn gyro_z(&self) -> i16 {
        i16::from_le_bytes([self.out_z_l_g, self.out_z_h_g])
    }

    pub fn accel_x(&self) -> i16 {
        i16::from_le_bytes([self.out_x_l_xl, self.out_x_h_xl])
    }

    pub fn accel_y(&self) -> i16 {
        i16::from_le_bytes([self.out_y_l_xl, self.out_y_h_xl])
    }

    pub fn accel_z(&self) -> i16 {
        i16::from_le_bytes([self.out_z_l_xl, self.out_z_h_xl])
    }
}

// One record must cover exactly six FIFO words.
const _SIZE_CHECK: usize = (core::mem::size_of::<FifoData>() == 12) as usize - 1;

/// FIFO fill level reported by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FifoCount {
    /// Complete records currently stored.
    pub samples: u16,
    /// Set when the FIFO overflowed and samples were lost.
    pub overrun: bool,
}

/// One timestamped gyro + accel reading.
///
/// Raw counts; scaling to SI units and the mounting rotation are applied
/// downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleFrame {
    pub timestamp_us: u64,
    pub gyro: [i16; 3],
    pub accel: [i16; 3],
}

/// Ordered samples produced by one FIFO drain.
///
/// Timestamps are strictly increasing, spaced by the configured sample
/// period, and anchored so the last frame matches the drain's reference
/// timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBatch {
    frames: [SampleFrame; FIFO_MAX_SAMPLES],
    length: usize,
}

impl SampleBatch {
    pub(crate) fn new() -> Self {
        SampleBatch {
            frames: [SampleFrame::default(); FIFO_MAX_SAMPLES],
            length: 0,
        }
    }

    pub(crate) fn push(&mut self, frame: SampleFrame) {
        if self.length < FIFO_MAX_SAMPLES {
            self.frames[self.length] = frame;
            self.length += 1;
        }
    }

    pub fn frames(&self) -> &[SampleFrame] {
        &self.frames[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl<SPI, D> Ism330Dlc<'_, SPI, D>
where
    SPI: SpiDevice,
{
    /// Number of complete records pending in the FIFO.
    ///
    /// Called before each drain to size the transfer precisely: over-reading
    /// returns undefined records, under-reading leaves stale data behind.
    pub fn read_fifo_count(&mut self) -> Result<FifoCount, Error<SPI::Error>> {
        let mut buffer = [Reg::FifoStatus1 as u8 | DIR_READ, 0, 0];
        self.transfer(&mut buffer)?;

        let status2 = FifoStatus2::from(buffer[2]);
        let words = u16::from(status2.diff_fifo_10_8().value()) << 8 | u16::from(buffer[1]);

        Ok(FifoCount {
            samples: words / WORDS_PER_RECORD,
            overrun: status2.over_run().value() != 0,
        })
    }

    /// Drain `samples` records from the FIFO in a single transfer.
    ///
    /// `timestamp_sample_us` is taken as the time of the newest record in the
    /// batch; earlier records are back-spaced from it at the configured
    /// sample period. `samples` is clamped to [`FIFO_MAX_SAMPLES`]. A zero
    /// request is an expected transient (e.g. a lost data-ready edge) and
    /// returns `Ok(None)`.
    ///
    /// The status bytes ride along in the same transfer; if the chip reports
    /// an overrun the batch is discarded rather than re-stamped around the
    /// gap, and [`Error::FifoOverflow`] is returned.
    pub fn read_fifo(
        &mut self,
        timestamp_sample_us: u64,
        samples: u16,
    ) -> Result<Option<SampleBatch>, Error<SPI::Error>> {
        if samples == 0 {
            self.counters.fifo_empty += 1;
            return Ok(None);
        }

        let samples = usize::from(samples).min(FIFO_MAX_SAMPLES);
        let length = 1 + FIFO_STATUS_LEN + samples * core::mem::size_of::<FifoData>();

        let mut buffer = [0u8; FIFO_TRANSFER_LEN];
        buffer[0] = Reg::FifoStatus1 as u8 | DIR_READ;
        self.transfer(&mut buffer[..length])?;

        let status2 = FifoStatus2::from(buffer[2]);
        if status2.over_run().value() != 0 {
            self.counters.fifo_overflow += 1;
            return Err(Error::FifoOverflow);
        }

        let records: &[FifoData] = bytemuck::cast_slice(&buffer[1 + FIFO_STATUS_LEN..length]);
        let period = u64::from(self.sample_period_us);

        let mut batch = SampleBatch::new();
        for (index, data) in records.iter().enumerate() {
            let age = (samples - 1 - index) as u64 * period;
            batch.push(SampleFrame {
                timestamp_us: timestamp_sample_us.wrapping_sub(age),
                gyro: [data.gyro_x(), data.gyro_y(), data.gyro_z()],
                accel: [data.accel_x(), data.accel_y(), data.accel_z()],
            });
        }

        Ok(Some(batch))
    }

    /// Flush the FIFO by bouncing it through bypass mode, then rearm
    /// continuous mode. Any stale data-ready edge is dropped with it.
    pub fn reset_fifo(&mut self) -> Result<(), Error<SPI::Error>> {
        self.counters.fifo_reset += 1;

        self.register_write(Reg::FifoCtrl5, fifo_ctrl5::FIFO_MODE_BYPASS)?;
        self.register_write(
            Reg::FifoCtrl5,
            self.config.odr.fifo_bits() | fifo_ctrl5::FIFO_MODE_CONTINUOUS,
        )?;

        if let Some(signal) = self.drdy {
            signal.clear();
        }
        Ok(())
    }

    /// Die temperature in degrees Celsius.
    pub fn read_temperature(&mut self) -> Result<f32, Error<SPI::Error>> {
        let mut buffer = [Reg::OutTempL as u8 | DIR_READ, 0, 0];
        self.transfer(&mut buffer)?;

        let raw = i16::from_le_bytes([buffer[1], buffer[2]]);
        Ok(f32::from(raw) / 256.0 + 25.0)
    }
}
