//! Running CRC-8 used for the SMBus packet error code (PEC).
//!
//! The transport builds each frame's checksum incrementally, folding bytes in
//! as they are assembled or received, so this keeps a running remainder
//! instead of taking a finished slice.

/// Generator polynomial for the SMBus PEC: x^8 + x^2 + x^1 + 1.
pub const SMBUS_POLY: u8 = 0x07;

pub struct Crc8 {
    poly: u8,
    crc: u8,
}

impl Crc8 {
    /// Create an engine for `poly` with the remainder cleared.
    pub fn new(poly: u8) -> Self {
        Self { poly, crc: 0 }
    }

    /// Fold one byte into the remainder and return the new remainder.
    pub fn update(&mut self, byte: u8) -> u8 {
        self.crc ^= byte;
        for _ in 0..8 {
            self.crc = if self.crc & 0x80 != 0 {
                (self.crc << 1) ^ self.poly
            } else {
                self.crc << 1
            };
        }
        self.crc
    }

    /// Current remainder.
    pub fn value(&self) -> u8 {
        self.crc
    }

    /// Clear the remainder for a new frame. The polynomial is kept.
    pub fn reset(&mut self) {
        self.crc = 0;
    }
}
