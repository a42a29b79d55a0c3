//! MLX90614 register map, per the family datasheet (3901090614 rev 004).

/// Published default slave address.
pub const DEFAULT_ADDR: u8 = 0x5A;

/// Broadcast slave address. No device acknowledges transfers sent here.
pub const BROADCAST_ADDR: u8 = 0x00;

/// OR'd into a command byte to target EEPROM instead of RAM.
pub const EEPROM_SELECT: u8 = 0x20;

/// RAM registers (volatile, read-only measurement data).
pub mod ram {
    /// Raw IR channel 1.
    pub const RAW_IR1: u8 = 0x04;
    /// Raw IR channel 2.
    pub const RAW_IR2: u8 = 0x05;
    /// Linearized ambient (die) temperature.
    pub const TA: u8 = 0x06;
    /// Linearized object temperature, source 1.
    pub const TOBJ1: u8 = 0x07;
    /// Linearized object temperature, source 2.
    pub const TOBJ2: u8 = 0x08;
}

/// EEPROM registers (persistent, erase-before-write).
pub mod eeprom {
    /// Object temperature range maximum.
    pub const TO_MAX: u8 = 0x00;
    /// Object temperature range minimum.
    pub const TO_MIN: u8 = 0x01;
    /// PWM output control.
    pub const PWM_CTRL: u8 = 0x02;
    /// Ambient temperature range.
    pub const TA_RANGE: u8 = 0x03;
    /// Object emissivity, stored as round(emissivity * 65535).
    pub const EMISSIVITY: u8 = 0x04;
    /// Configuration register 1 (filter settings among others).
    pub const CONFIG: u8 = 0x05;
    /// SMBus address, low byte of the word.
    pub const ADDRESS: u8 = 0x0E;
    /// Chip ID word 1 (most significant).
    pub const ID1: u8 = 0x1C;
    /// Chip ID word 2.
    pub const ID2: u8 = 0x1D;
    /// Chip ID word 3.
    pub const ID3: u8 = 0x1E;
    /// Chip ID word 4 (least significant).
    pub const ID4: u8 = 0x1F;
}

/// Field layout of [`eeprom::CONFIG`].
pub mod config {
    /// IIR filter setting, bits 2:0.
    pub const IIR_MASK: u16 = 0x0007;
    /// FIR filter setting, bits 10:8.
    pub const FIR_MASK: u16 = 0x0700;
    pub const FIR_SHIFT: u16 = 8;
}
