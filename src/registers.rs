//! ISM330DLC register map
//!
//! Register addresses, named bit positions and the encodings for the
//! configurable sample rates, full-scale ranges and filter bandwidths.
//! Pure data; all bus access lives in the driver.

/// Read flag folded into the command byte of every bus transaction.
pub const DIR_READ: u8 = 0x80;

/// Expected WHO_AM_I identity.
pub const WHOAMI: u8 = 0x6A;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    FifoCtrl1 = 0x06,
    FifoCtrl2 = 0x07,
    FifoCtrl3 = 0x08,
    FifoCtrl4 = 0x09,
    FifoCtrl5 = 0x0A,
    DrdyPulseCfg = 0x0B,
    Int1Ctrl = 0x0D,
    Int2Ctrl = 0x0E,
    WhoAmI = 0x0F,
    Ctrl1Xl = 0x10,
    Ctrl2G = 0x11,
    Ctrl3C = 0x12,
    Ctrl4C = 0x13,
    Ctrl5C = 0x14,
    Ctrl6C = 0x15,
    Ctrl7G = 0x16,
    Ctrl8Xl = 0x17,
    Ctrl9Xl = 0x18,
    Ctrl10C = 0x19,
    StatusReg = 0x1E,
    OutTempL = 0x20,
    OutTempH = 0x21,
    FifoStatus1 = 0x3A,
    FifoStatus2 = 0x3B,
    FifoStatus3 = 0x3C,
    FifoStatus4 = 0x3D,
    FifoDataOutL = 0x3E,
    FifoDataOutH = 0x3F,
}

pub mod ctrl1_xl {
    pub const ODR_XL_MASK: u8 = 0xF0;
    pub const FS_XL_MASK: u8 = 0x0C;
    pub const LPF1_BW_SEL: u8 = 0x02;
}

pub mod ctrl2_g {
    pub const ODR_G_MASK: u8 = 0xF0;
    pub const FS_G_MASK: u8 = 0x0C;
    pub const FS_125: u8 = 0x02;
}

pub mod ctrl3_c {
    pub const BOOT: u8 = 0x80;
    pub const BDU: u8 = 0x40;
    pub const IF_INC: u8 = 0x04;
    pub const SW_RESET: u8 = 0x01;
}

pub mod ctrl4_c {
    pub const LPF1_SEL_G: u8 = 0x02;
}

pub mod ctrl6_c {
    pub const FTYPE_MASK: u8 = 0x03;
}

pub mod fifo_ctrl2 {
    pub const FTH_MASK: u8 = 0x07;
}

pub mod fifo_ctrl3 {
    pub const DEC_MASK: u8 = 0x3F;
    /// Gyro into the FIFO without decimation.
    pub const DEC_FIFO_GYRO_NONE: u8 = 0b001 << 3;
    /// Accel into the FIFO without decimation.
    pub const DEC_FIFO_XL_NONE: u8 = 0b001;
}

pub mod fifo_ctrl5 {
    pub const ODR_FIFO_MASK: u8 = 0x78;
    pub const FIFO_MODE_MASK: u8 = 0x07;
    pub const FIFO_MODE_CONTINUOUS: u8 = 0b110;
    pub const FIFO_MODE_BYPASS: u8 = 0b000;
}

pub mod int1_ctrl {
    /// FIFO watermark interrupt on INT1.
    pub const INT1_FTH: u8 = 0x08;
}

/// Output data rate shared by the accelerometer and the gyroscope.
///
/// The FIFO interleaves one gyro record and one accel record per internal
/// tick, so both sensors run at the same rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputDataRate {
    Hz104,
    Hz208,
    Hz416,
    Hz833,
    Hz1666,
    Hz3332,
    Hz6664,
}

impl OutputDataRate {
    const fn code(self) -> u8 {
        match self {
            OutputDataRate::Hz104 => 0b0100,
            OutputDataRate::Hz208 => 0b0101,
            OutputDataRate::Hz416 => 0b0110,
            OutputDataRate::Hz833 => 0b0111,
            OutputDataRate::Hz1666 => 0b1000,
            OutputDataRate::Hz3332 => 0b1001,
            OutputDataRate::Hz6664 => 0b1010,
        }
    }

    pub const fn hz(self) -> u32 {
        match self {
            OutputDataRate::Hz104 => 104,
            OutputDataRate::Hz208 => 208,
            OutputDataRate::Hz416 => 416,
            OutputDataRate::Hz833 => 833,
            OutputDataRate::Hz1666 => 1666,
            OutputDataRate::Hz3332 => 3332,
            OutputDataRate::Hz6664 => 6664,
        }
    }

    /// ODR field for CTRL1_XL / CTRL2_G.
    pub const fn bits(self) -> u8 {
        self.code() << 4
    }

    /// ODR_FIFO field for FIFO_CTRL5.
    pub const fn fifo_bits(self) -> u8 {
        self.code() << 3
    }

    pub const fn sample_period_us(self) -> u32 {
        1_000_000 / self.hz()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    G2 = 0b00,
    G16 = 0b01,
    G4 = 0b10,
    G8 = 0b11,
}

impl AccelRange {
    /// FS_XL field for CTRL1_XL.
    pub const fn bits(self) -> u8 {
        (self as u8) << 2
    }

    /// m/s^2 per LSB.
    pub fn scale(self) -> f32 {
        let range_g = match self {
            AccelRange::G2 => 2.0,
            AccelRange::G4 => 4.0,
            AccelRange::G8 => 8.0,
            AccelRange::G16 => 16.0,
        };
        range_g * 9.80665 / 32768.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
    Dps250 = 0b00,
    Dps500 = 0b01,
    Dps1000 = 0b10,
    Dps2000 = 0b11,
}

impl GyroRange {
    /// FS_G field for CTRL2_G.
    pub const fn bits(self) -> u8 {
        (self as u8) << 2
    }

    /// rad/s per LSB.
    pub fn scale(self) -> f32 {
        let range_dps = match self {
            GyroRange::Dps250 => 250.0,
            GyroRange::Dps500 => 500.0,
            GyroRange::Dps1000 => 1000.0,
            GyroRange::Dps2000 => 2000.0,
        };
        range_dps / 32768.0 * (core::f32::consts::PI / 180.0)
    }
}

/// Gyroscope LPF1 bandwidth (FTYPE), quoted at the 6.66 kHz ODR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroBandwidth {
    Bw245Hz = 0b00,
    Bw195Hz = 0b01,
    Bw155Hz = 0b10,
    Bw293Hz = 0b11,
}

impl GyroBandwidth {
    /// FTYPE field for CTRL6_C.
    pub const fn bits(self) -> u8 {
        self as u8
    }
}
