//! Driver for the Melexis MLX90614 family of SMBus infrared thermometers.
//! Based on the MLX90614 family datasheet 3901090614 rev 004.
//!
//! The device speaks a two-wire SMBus dialect: 16 bit registers transferred
//! least-significant-byte first, each transaction sealed with a CRC-8 packet
//! error code, and persistent (EEPROM) registers that must be erased before
//! they can be programmed. This crate covers that protocol layer plus the
//! user-facing accessors (temperatures, emissivity, filter settings, slave
//! address, chip ID). PWM output and sleep modes are not handled.
//!
//! Errors accumulate in a per-operation bitmask ([`RwError`]) instead of
//! aborting: every operation returns a value and the caller decides how much
//! to trust it. See [`Mlx90614::rw_error`] and [`Mlx90614::status`].

pub mod bus;
pub mod crc8;
mod device;
pub mod register;

pub use bus::{HalBus, SmbusBus, ThreadDelay, Transmission};
pub use device::{
    celsius_to_fahrenheit, kelvin_to_celsius, Error, Mlx90614, RwError, TempSource, TempUnit,
};

#[cfg(feature = "rppal")]
pub use bus::RppalBus;
