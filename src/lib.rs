#![no_std]
#![cfg_attr(not(doctest), doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md")))]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod fifo;
mod ll;
pub mod registers;
pub mod scheduler;

pub use config::RegisterConfig;
pub use fifo::{FifoCount, FifoData, SampleBatch, SampleFrame, FIFO_MAX_SAMPLES};
pub use registers::{AccelRange, GyroBandwidth, GyroRange, OutputDataRate};
pub use scheduler::{DataReadySignal, State};

use config::CONFIG_REGISTER_COUNT;
use fifo::WORDS_PER_RECORD;

const DEFAULT_TRANSFER_RATE_HZ: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Bus transaction failed. Recoverable; the current operation is
    /// aborted and the next tick proceeds normally.
    Transport(E),
    /// WHO_AM_I returned an unexpected identity.
    BadDevice(u8),
    /// The on-chip FIFO overflowed before it was drained; samples were lost
    /// and the batch was discarded.
    FifoOverflow,
    /// The reset-complete bit never cleared within the polling budget.
    ResetTimeout,
}

impl<E> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::Transport(error)
    }
}

/// Sensor configuration, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Output data rate for both sub-sensors.
    pub odr: OutputDataRate,
    pub accel_range: AccelRange,
    pub gyro_range: GyroRange,
    pub gyro_bandwidth: GyroBandwidth,
    /// Target rate of FIFO drains; sizes the watermark and the samples
    /// moved per transfer.
    pub transfer_rate_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            odr: OutputDataRate::Hz6664,
            accel_range: AccelRange::G16,
            gyro_range: GyroRange::Dps2000,
            gyro_bandwidth: GyroBandwidth::Bw245Hz,
            transfer_rate_hz: DEFAULT_TRANSFER_RATE_HZ,
        }
    }
}

/// Increment-only diagnostic counters.
///
/// Purely observability; only the overflow and transport failures they
/// record also gate the reset transition.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counters {
    pub bad_transfer: u32,
    pub bad_register: u32,
    pub fifo_empty: u32,
    pub fifo_overflow: u32,
    pub fifo_reset: u32,
    pub drdy_count: u32,
    pub drdy_interval_us: u32,
}

/// Consumer of finished sample batches.
pub trait SampleSink {
    /// One drained batch, samples in increasing-timestamp order.
    fn publish(&mut self, batch: &SampleBatch);

    /// Low-rate die temperature update.
    fn publish_temperature(&mut self, timestamp_us: u64, celsius: f32) {
        let _ = (timestamp_us, celsius);
    }
}

/// ISM330DLC driver.
///
/// Owns the SPI device; all bus transactions and state transitions happen
/// on the context calling [`run`](Self::run). The only interrupt-safe entry
/// point is [`DataReadySignal::notify`].
pub struct Ism330Dlc<'d, SPI, D> {
    pub(crate) spi: SPI,
    pub(crate) delay: D,
    pub(crate) drdy: Option<&'d DataReadySignal>,
    pub(crate) config: Config,
    pub(crate) state: State,
    pub(crate) register_cfg: [RegisterConfig; CONFIG_REGISTER_COUNT],
    pub(crate) checked_register: usize,
    pub(crate) needs_reset: bool,
    pub(crate) counters: Counters,
    pub(crate) sample_period_us: u32,
    pub(crate) fifo_empty_interval_us: u32,
    pub(crate) fifo_gyro_samples: u8,
    pub(crate) fifo_accel_samples: u8,
    pub(crate) last_config_check_us: u64,
    pub(crate) last_temperature_update_us: u64,
    pub(crate) last_drdy_timestamp_us: u64,
}

impl<'d, SPI, D> Ism330Dlc<'d, SPI, D> {
    pub fn new(spi: SPI, delay: D, config: Config) -> Self {
        let sample_period_us = config.odr.sample_period_us();
        let transfer_rate_hz = if config.transfer_rate_hz == 0 {
            DEFAULT_TRANSFER_RATE_HZ
        } else {
            config.transfer_rate_hz
        };

        // Whole samples per transfer, then the interval trimmed to match.
        let interval_us = (1_000_000 / transfer_rate_hz).max(sample_period_us);
        let samples_per_transfer =
            (interval_us / sample_period_us).min(FIFO_MAX_SAMPLES as u32) as u8;
        let fifo_empty_interval_us = u32::from(samples_per_transfer) * sample_period_us;
        let watermark_words = u16::from(samples_per_transfer) * WORDS_PER_RECORD;

        Ism330Dlc {
            spi,
            delay,
            drdy: None,
            config,
            state: State::Idle,
            register_cfg: config::register_cfg(&config, watermark_words, false),
            checked_register: 0,
            needs_reset: true,
            counters: Counters::default(),
            sample_period_us,
            fifo_empty_interval_us,
            // the FIFO pattern interleaves gyro and accel 1:1
            fifo_gyro_samples: samples_per_transfer,
            fifo_accel_samples: samples_per_transfer,
            last_config_check_us: 0,
            last_temperature_update_us: 0,
            last_drdy_timestamp_us: 0,
        }
    }

    /// Wire the FIFO watermark interrupt. The signal outlives the driver
    /// and is typically a `static`; the interrupt handler calls
    /// [`DataReadySignal::notify`] on each edge.
    pub fn with_data_ready(mut self, signal: &'d DataReadySignal) -> Self {
        self.drdy = Some(signal);
        let watermark_words = u16::from(self.fifo_gyro_samples) * WORDS_PER_RECORD;
        self.register_cfg = config::register_cfg(&self.config, watermark_words, true);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Interval at which the FIFO reaches the watermark; the recommended
    /// polling-timer period.
    pub fn transfer_interval_us(&self) -> u32 {
        self.fifo_empty_interval_us
    }

    /// Gyro records guaranteed per watermark edge; pass this to
    /// [`DataReadySignal::notify`] from the interrupt handler.
    pub fn gyro_samples_per_transfer(&self) -> u8 {
        self.fifo_gyro_samples
    }

    pub fn accel_samples_per_transfer(&self) -> u8 {
        self.fifo_accel_samples
    }

    /// Release the bus from the driver.
    pub fn release(self) -> SPI {
        self.spi
    }
}
