//! Two-wire bus seam consumed by the driver.
//!
//! The MLX90614 protocol was defined against a byte-oriented Wire-style
//! interface (begin, write bytes, end with or without releasing the bus,
//! request, read). Hosts expose whole transfers instead, so the seam here is
//! frame-level: a write that does not release the bus is held by the adapter
//! and issued together with the following read as one repeated-start
//! transfer.

use std::time::Duration;

use embedded_hal::blocking::i2c::{Read, Write, WriteRead};

/// Outcome of one bus transfer, mirroring the classic SMBus host status
/// codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transmission {
    Success,
    /// Frame exceeds what the host can transfer.
    DataTooLong,
    /// No acknowledgment of the slave address.
    AddressNack,
    /// A data byte was not acknowledged.
    DataNack,
    /// Any other host-side failure.
    Other,
}

impl Transmission {
    pub fn is_success(self) -> bool {
        self == Transmission::Success
    }
}

/// Frame-level bus transport.
pub trait SmbusBus {
    /// Transmit `bytes` to the device at `addr`. When `release` is false the
    /// caller will follow up with a [`read`](SmbusBus::read) and the two
    /// should form a single repeated-start transfer.
    fn write(&mut self, addr: u8, bytes: &[u8], release: bool) -> Transmission;

    /// Read exactly `buf.len()` bytes from the device at `addr`.
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Transmission;
}

/// Adapter from any `embedded-hal` blocking I²C bus to [`SmbusBus`].
///
/// `embedded-hal` 0.2 error types are opaque, so every failure maps to
/// [`Transmission::Other`]. Use a host-specific adapter (e.g. `RppalBus`)
/// when NACK classification matters.
pub struct HalBus<I2C> {
    i2c: I2C,
    held: Option<Vec<u8>>,
}

impl<I2C> HalBus<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c, held: None }
    }

    pub fn free(self) -> I2C {
        self.i2c
    }
}

impl<I2C> SmbusBus for HalBus<I2C>
where
    I2C: Read + Write + WriteRead,
{
    fn write(&mut self, addr: u8, bytes: &[u8], release: bool) -> Transmission {
        if !release {
            self.held = Some(bytes.to_vec());
            return Transmission::Success;
        }
        match self.i2c.write(addr, bytes) {
            Ok(()) => Transmission::Success,
            Err(_) => Transmission::Other,
        }
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Transmission {
        let result = match self.held.take() {
            Some(held) => self.i2c.write_read(addr, &held, buf).map_err(|_| ()),
            None => self.i2c.read(addr, buf).map_err(|_| ()),
        };
        match result {
            Ok(()) => Transmission::Success,
            Err(_) => Transmission::Other,
        }
    }
}

/// [`SmbusBus`] over the Raspberry Pi's I²C peripheral, with Linux errno
/// classification into the SMBus status codes.
#[cfg(feature = "rppal")]
pub struct RppalBus {
    i2c: rppal::i2c::I2c,
    held: Option<Vec<u8>>,
}

#[cfg(feature = "rppal")]
impl RppalBus {
    pub fn new() -> rppal::i2c::Result<Self> {
        Ok(Self {
            i2c: rppal::i2c::I2c::new()?,
            held: None,
        })
    }

    fn classify(err: rppal::i2c::Error) -> Transmission {
        match err {
            rppal::i2c::Error::Io(io) => match io.raw_os_error() {
                // ENXIO: no device acknowledged the address.
                Some(6) => Transmission::AddressNack,
                // EREMOTEIO: the transfer was NACK'd mid-frame.
                Some(121) => Transmission::DataNack,
                // EMSGSIZE: frame longer than the adapter supports.
                Some(90) => Transmission::DataTooLong,
                _ => Transmission::Other,
            },
            _ => Transmission::Other,
        }
    }

    fn select(&mut self, addr: u8) -> Result<(), rppal::i2c::Error> {
        self.i2c.set_slave_address(addr as u16)
    }
}

#[cfg(feature = "rppal")]
impl SmbusBus for RppalBus {
    fn write(&mut self, addr: u8, bytes: &[u8], release: bool) -> Transmission {
        if !release {
            self.held = Some(bytes.to_vec());
            return Transmission::Success;
        }
        if let Err(err) = self.select(addr) {
            return Self::classify(err);
        }
        match self.i2c.write(bytes) {
            Ok(n) if n == bytes.len() => Transmission::Success,
            Ok(_) => Transmission::DataNack,
            Err(err) => Self::classify(err),
        }
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Transmission {
        if let Err(err) = self.select(addr) {
            return Self::classify(err);
        }
        let result = match self.held.take() {
            Some(held) => self.i2c.write_read(&held, buf).map(|()| buf.len()),
            None => self.i2c.read(buf),
        };
        match result {
            Ok(n) if n == buf.len() => Transmission::Success,
            Ok(_) => Transmission::DataNack,
            Err(err) => Self::classify(err),
        }
    }
}

/// Delay provider backed by `std::thread::sleep`.
pub struct ThreadDelay;

impl embedded_hal::blocking::delay::DelayUs<u32> for ThreadDelay {
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64))
    }
}

impl embedded_hal::blocking::delay::DelayUs<u64> for ThreadDelay {
    fn delay_us(&mut self, us: u64) {
        std::thread::sleep(Duration::from_micros(us))
    }
}

impl embedded_hal::blocking::delay::DelayMs<u32> for ThreadDelay {
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64))
    }
}

impl embedded_hal::blocking::delay::DelayMs<u64> for ThreadDelay {
    fn delay_ms(&mut self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms))
    }
}
