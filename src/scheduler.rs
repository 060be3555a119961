//! Acquisition state machine.
//!
//! A single worker context owns the bus and all mutable state and drives the
//! machine one tick at a time via [`Ism330Dlc::run`], woken either by a
//! periodic timer or by the FIFO watermark interrupt. The interrupt handler
//! never touches the bus; it only publishes an edge through
//! [`DataReadySignal`].

use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use crate::fifo::FIFO_MAX_SAMPLES;
use crate::{Ism330Dlc, SampleSink};

/// How often one register of the intended state is verified against drift.
pub(crate) const CONFIG_CHECK_INTERVAL_US: u64 = 100_000;
/// How often the die temperature is read.
pub(crate) const TEMPERATURE_INTERVAL_US: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Not started, or shut down. No bus traffic.
    Idle,
    /// Writing and verifying the intended register state.
    Configuring,
    /// Steady state, waiting for a data-ready edge or the polling timer.
    Armed,
    /// Moving samples out of the FIFO; only exists within one tick.
    Draining,
    /// A FIFO overflow or transport error forced a device reset.
    Resetting,
}

/// Interrupt-to-worker handoff for the FIFO watermark edge.
///
/// Single-producer (the interrupt handler), single-consumer (the worker).
/// The sample count is the synchronizing value: the producer publishes it
/// last with Release ordering, the consumer takes it with an Acquire swap
/// and the edge timestamp rides along.
#[derive(Debug)]
pub struct DataReadySignal {
    samples: AtomicU8,
    timestamp_us: AtomicU64,
    edges: AtomicU32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct DataReadyEdge {
    pub(crate) timestamp_us: u64,
    pub(crate) samples: u8,
}

impl DataReadySignal {
    pub const fn new() -> Self {
        DataReadySignal {
            samples: AtomicU8::new(0),
            timestamp_us: AtomicU64::new(0),
            edges: AtomicU32::new(0),
        }
    }

    /// Record a data-ready edge. Safe to call from interrupt context: no
    /// bus I/O, no allocation, bounded time.
    ///
    /// `samples` is the number of records the watermark guarantees; a zero
    /// is promoted to one so an edge is never lost.
    pub fn notify(&self, timestamp_us: u64, samples: u8) {
        self.timestamp_us.store(timestamp_us, Ordering::Relaxed);
        self.edges.fetch_add(1, Ordering::Relaxed);
        self.samples.store(samples.max(1), Ordering::Release);
    }

    /// Total edges seen since construction.
    pub fn edges(&self) -> u32 {
        self.edges.load(Ordering::Relaxed)
    }

    pub(crate) fn take(&self) -> Option<DataReadyEdge> {
        let samples = self.samples.swap(0, Ordering::Acquire);
        if samples == 0 {
            return None;
        }
        Some(DataReadyEdge {
            timestamp_us: self.timestamp_us.load(Ordering::Relaxed),
            samples,
        })
    }

    pub(crate) fn clear(&self) {
        self.samples.store(0, Ordering::Relaxed);
    }
}

impl Default for DataReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl<SPI, D> Ism330Dlc<'_, SPI, D>
where
    SPI: SpiDevice,
    D: DelayNs,
{
    /// Arm the state machine. The first [`run`](Self::run) tick resets and
    /// configures the chip.
    pub fn start(&mut self) {
        if self.state == State::Idle {
            self.needs_reset = true;
            self.state = State::Configuring;
        }
    }

    /// Stop arming further wakes. Idempotent, performs no bus I/O, and may
    /// be called from outside the wake cycle; a pending data-ready edge is
    /// dropped. Dropping the driver afterwards releases the bus handle.
    pub fn shutdown(&mut self) {
        self.state = State::Idle;
        if let Some(signal) = self.drdy {
            signal.clear();
        }
    }

    /// Execute one scheduler tick at `now_us`.
    ///
    /// Every error is absorbed here: it is counted, the state machine moves
    /// to the appropriate recovery state, and the next tick proceeds
    /// normally. Nothing propagates to the caller.
    pub fn run<S: SampleSink>(&mut self, now_us: u64, sink: &mut S) {
        match self.state {
            State::Idle => {}
            State::Configuring => self.run_configuring(now_us),
            State::Armed | State::Draining => self.run_armed(now_us, sink),
            State::Resetting => self.run_resetting(),
        }
    }

    fn run_configuring(&mut self, now_us: u64) {
        if self.needs_reset {
            if self.reset().is_err() {
                // retried on the next tick
                return;
            }
            self.needs_reset = false;
        }

        match self.configure() {
            Ok(true) => {
                if self.reset_fifo().is_err() {
                    return;
                }
                self.last_config_check_us = now_us;
                self.last_temperature_update_us = now_us;
                self.last_drdy_timestamp_us = 0;
                self.state = State::Armed;
            }
            Ok(false) | Err(_) => {}
        }
    }

    fn run_resetting(&mut self) {
        if self.reset().is_ok() {
            self.needs_reset = false;
            self.state = State::Configuring;
        }
    }

    fn run_armed<S: SampleSink>(&mut self, now_us: u64, sink: &mut S) {
        // Drift detection and the temperature update run on their own
        // intervals, decoupled from the drain cadence.
        if now_us.wrapping_sub(self.last_config_check_us) >= CONFIG_CHECK_INTERVAL_US
            && self.verify_one().is_ok()
        {
            self.last_config_check_us = now_us;
        }

        if now_us.wrapping_sub(self.last_temperature_update_us) >= TEMPERATURE_INTERVAL_US {
            if let Ok(celsius) = self.read_temperature() {
                sink.publish_temperature(now_us, celsius);
                self.last_temperature_update_us = now_us;
            }
        }

        // Interrupt path: the edge carries the watermark count and the edge
        // time. Polling path: ask the chip and anchor on the tick time.
        let (mut samples, timestamp_sample_us) = match self.drdy.and_then(|signal| signal.take()) {
            Some(edge) => {
                self.note_data_ready(&edge);
                (u16::from(edge.samples), edge.timestamp_us)
            }
            None => (0, now_us),
        };

        if samples == 0 {
            match self.read_fifo_count() {
                Ok(count) if count.overrun => {
                    self.counters.fifo_overflow += 1;
                    self.state = State::Resetting;
                    return;
                }
                Ok(count) => samples = count.samples.min(FIFO_MAX_SAMPLES as u16),
                Err(_) => return,
            }
        }

        if samples == 0 {
            self.counters.fifo_empty += 1;
            return;
        }

        self.state = State::Draining;
        match self.read_fifo(timestamp_sample_us, samples) {
            Ok(Some(batch)) => {
                sink.publish(&batch);
                self.state = State::Armed;
            }
            Ok(None) => self.state = State::Armed,
            // Overflow or transport failure: timestamps can no longer be
            // trusted, force a reset.
            Err(_) => self.state = State::Resetting,
        }
    }

    fn note_data_ready(&mut self, edge: &DataReadyEdge) {
        self.counters.drdy_count += 1;
        if self.last_drdy_timestamp_us != 0 {
            self.counters.drdy_interval_us =
                edge.timestamp_us.wrapping_sub(self.last_drdy_timestamp_us) as u32;
        }
        self.last_drdy_timestamp_us = edge.timestamp_us;
    }
}
