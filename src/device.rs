//! MLX90614 device driver: register transport with PEC verification, the
//! EEPROM erase-then-write sequence, and the user-facing accessors.

use bitflags::bitflags;
use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use thiserror::Error;
use tracing::{debug, trace};

use crate::bus::{SmbusBus, Transmission};
use crate::crc8::{Crc8, SMBUS_POLY};
use crate::register::{config, eeprom, ram, BROADCAST_ADDR, DEFAULT_ADDR, EEPROM_SELECT};

/// Device turnaround between the command write and the data read. The
/// datasheet does not mention it, but reads fail without it.
const TURNAROUND_US: u32 = 25;

/// T_erase / T_write per the datasheet, 5 ms each.
const ERASE_MS: u32 = 5;
const WRITE_MS: u32 = 5;

/// Smallest stored emissivity the device accepts, round(0.1 * 65535).
const EMISSIVITY_FLOOR: u16 = 6553;

/// Filter settings assumed when the configuration register cannot be read:
/// IIR bypassed, FIR N = 1024.
const DEFAULT_IIR: u8 = 4;
const DEFAULT_FIR: u8 = 7;

bitflags! {
    /// Error flags accumulated over one public operation.
    ///
    /// The mask is cleared when a public operation starts and OR-accumulated
    /// until it finishes; it is never carried across operations. The driver
    /// always returns a value, so callers decide severity by inspecting this
    /// (or [`Mlx90614::status`]) afterwards.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RwError: u8 {
        /// Frame exceeded what the bus transport can transfer.
        const DATA_TOO_LONG = 0x01;
        /// Slave address not acknowledged.
        const TX_ADDR_NACK = 0x02;
        /// A data byte was not acknowledged.
        const TX_DATA_NACK = 0x04;
        /// Unclassified transport failure.
        const TX_OTHER = 0x08;
        /// Received PEC did not match the locally computed CRC.
        const RX_CRC = 0x10;
        /// Caller-supplied value outside the device's accepted range.
        const INVALID_DATA = 0x20;
        /// An EEPROM erase or write half failed; the cell is suspect.
        const EE_CORRUPT = 0x40;

        /// Flags originating from the bus transport itself.
        const TRANSPORT = Self::DATA_TOO_LONG.bits()
            | Self::TX_ADDR_NACK.bits()
            | Self::TX_DATA_NACK.bits()
            | Self::TX_OTHER.bits();
    }
}

impl From<Transmission> for RwError {
    fn from(status: Transmission) -> Self {
        match status {
            Transmission::Success => RwError::empty(),
            Transmission::DataTooLong => RwError::DATA_TOO_LONG,
            Transmission::AddressNack => RwError::TX_ADDR_NACK,
            Transmission::DataNack => RwError::TX_DATA_NACK,
            Transmission::Other => RwError::TX_OTHER,
        }
    }
}

/// Summary of the accumulated flags, for callers that prefer a `Result`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bus transport failure ({0:?})")]
    Transport(RwError),
    #[error("packet error code mismatch (computed {crc:#04x}, received {pec:#04x})")]
    Integrity { crc: u8, pec: u8 },
    #[error("value outside the device's accepted range")]
    InvalidData,
    #[error("eeprom contents are suspect after a failed erase/write")]
    EepromCorrupt(RwError),
}

/// Temperature measurement source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempSource {
    /// Die (ambient) sensor.
    Ambient,
    /// IR source 1.
    Object1,
    /// IR source 2 (dual-zone devices only).
    Object2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempUnit {
    Kelvin,
    Celsius,
    Fahrenheit,
}

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - 273.15
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 1.8 + 32.0
}

/// Driver for one MLX90614 on an SMBus-capable two-wire bus.
///
/// All operations are synchronous and block for the bus transaction plus any
/// mandated EEPROM timing. The driver holds no lock: callers sharing one bus
/// across devices or threads must serialize access themselves.
pub struct Mlx90614<B> {
    bus: B,
    addr: u8,
    rw_error: RwError,
    crc8: u8,
    pec: u8,
}

impl<B: SmbusBus> Mlx90614<B> {
    /// Driver for a device at the published default address (0x5A).
    pub fn new(bus: B) -> Self {
        Self::with_address(bus, DEFAULT_ADDR)
    }

    pub fn with_address(bus: B, addr: u8) -> Self {
        Self {
            bus,
            addr,
            rw_error: RwError::empty(),
            crc8: 0,
            pec: 0,
        }
    }

    /// Release the underlying bus.
    pub fn free(self) -> B {
        self.bus
    }

    /// The slave address the driver currently targets. No bus traffic; see
    /// [`probe_address`](Self::probe_address) to ask the device.
    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Flags accumulated by the most recent public operation.
    pub fn rw_error(&self) -> RwError {
        self.rw_error
    }

    /// CRC computed locally for the last frame.
    pub fn last_crc(&self) -> u8 {
        self.crc8
    }

    /// PEC received (reads) or transmitted (writes) with the last frame.
    pub fn last_pec(&self) -> u8 {
        self.pec
    }

    /// The last operation's outcome as a `Result`, most severe flag first.
    pub fn status(&self) -> Result<(), Error> {
        if self.rw_error.contains(RwError::EE_CORRUPT) {
            Err(Error::EepromCorrupt(self.rw_error))
        } else if self.rw_error.contains(RwError::INVALID_DATA) {
            Err(Error::InvalidData)
        } else if self.rw_error.contains(RwError::RX_CRC) {
            Err(Error::Integrity {
                crc: self.crc8,
                pec: self.pec,
            })
        } else if !self.rw_error.is_empty() {
            Err(Error::Transport(self.rw_error))
        } else {
            Ok(())
        }
    }

    /// Read a temperature and convert it to `unit`.
    ///
    /// RAM holds absolute temperature as a 16 bit count of 0.02 K. The value
    /// is returned even when the operation raised error flags; check
    /// [`rw_error`](Self::rw_error) before trusting it.
    pub fn read_temp<D: DelayUs<u32>>(
        &mut self,
        source: TempSource,
        unit: TempUnit,
        delay: &mut D,
    ) -> f64 {
        self.rw_error = RwError::empty();
        let reg = match source {
            TempSource::Ambient => ram::TA,
            TempSource::Object1 => ram::TOBJ1,
            TempSource::Object2 => ram::TOBJ2,
        };
        let kelvin = f64::from(self.read16(reg, delay).0) * 0.02;
        match unit {
            TempUnit::Kelvin => kelvin,
            TempUnit::Celsius => kelvin_to_celsius(kelvin),
            TempUnit::Fahrenheit => celsius_to_fahrenheit(kelvin_to_celsius(kelvin)),
        }
    }

    /// Object emissivity as a fraction. Returns 1.0 if the read failed.
    pub fn emissivity<D: DelayUs<u32>>(&mut self, delay: &mut D) -> f32 {
        self.rw_error = RwError::empty();
        let (stored, _) = self.read16(eeprom::EMISSIVITY | EEPROM_SELECT, delay);
        if !self.rw_error.is_empty() {
            return 1.0;
        }
        f32::from(stored) / 65535.0
    }

    /// Set the object emissivity. Accepted range is roughly 0.1..=1.0;
    /// anything else raises [`RwError::INVALID_DATA`] without touching the
    /// bus.
    pub fn set_emissivity<D: DelayUs<u32> + DelayMs<u32>>(
        &mut self,
        emissivity: f32,
        delay: &mut D,
    ) {
        self.rw_error = RwError::empty();
        let stored = (emissivity * 65535.0 + 0.5) as u16;
        if emissivity > 1.0 || stored < EMISSIVITY_FLOOR {
            self.rw_error |= RwError::INVALID_DATA;
            return;
        }
        self.eeprom_update(eeprom::EMISSIVITY, stored, delay);
    }

    /// IIR filter setting, configuration register bits 2:0. Returns the
    /// bypass setting (4) if the read failed.
    pub fn iir_coeff<D: DelayUs<u32>>(&mut self, delay: &mut D) -> u8 {
        self.rw_error = RwError::empty();
        let (cfg, _) = self.read16(eeprom::CONFIG | EEPROM_SELECT, delay);
        if !self.rw_error.is_empty() {
            return DEFAULT_IIR;
        }
        (cfg & config::IIR_MASK) as u8
    }

    /// Set the IIR filter (0..=7, masked). Read-modify-write: only bits 2:0
    /// of the configuration register change. Skipped if the read failed.
    pub fn set_iir_coeff<D: DelayUs<u32> + DelayMs<u32>>(&mut self, csb: u8, delay: &mut D) {
        self.rw_error = RwError::empty();
        let field = u16::from(csb & 0x07);
        let (cfg, _) = self.read16(eeprom::CONFIG | EEPROM_SELECT, delay);
        if self.rw_error.is_empty() {
            self.eeprom_update(eeprom::CONFIG, (cfg & !config::IIR_MASK) | field, delay);
        }
    }

    /// FIR filter setting, configuration register bits 10:8. Returns the
    /// manufacturer-recommended setting (7, N = 1024) if the read failed.
    pub fn fir_coeff<D: DelayUs<u32>>(&mut self, delay: &mut D) -> u8 {
        self.rw_error = RwError::empty();
        let (cfg, _) = self.read16(eeprom::CONFIG | EEPROM_SELECT, delay);
        if !self.rw_error.is_empty() {
            return DEFAULT_FIR;
        }
        ((cfg & config::FIR_MASK) >> config::FIR_SHIFT) as u8
    }

    /// Set the FIR filter (0..=7, masked), preserving the rest of the
    /// configuration register.
    pub fn set_fir_coeff<D: DelayUs<u32> + DelayMs<u32>>(&mut self, csb: u8, delay: &mut D) {
        self.rw_error = RwError::empty();
        let field = u16::from(csb & 0x07) << config::FIR_SHIFT;
        let (cfg, _) = self.read16(eeprom::CONFIG | EEPROM_SELECT, delay);
        if self.rw_error.is_empty() {
            self.eeprom_update(eeprom::CONFIG, (cfg & !config::FIR_MASK) | field, delay);
        }
    }

    /// Program a new slave address (1..=0x7F).
    ///
    /// The device's current address may be unknown, so the write goes out on
    /// the broadcast address, which no device acknowledges. The new address
    /// is therefore adopted on faith; power-cycle the device afterwards.
    pub fn set_address<D: DelayUs<u32> + DelayMs<u32>>(&mut self, addr: u8, delay: &mut D) {
        self.rw_error = RwError::empty();
        if addr == BROADCAST_ADDR || addr > 0x7f {
            self.rw_error |= RwError::INVALID_DATA;
            return;
        }
        debug!("programming slave address {addr:#04x} via broadcast");
        self.addr = BROADCAST_ADDR;
        self.eeprom_update(eeprom::ADDRESS, u16::from(addr), delay);
        self.addr = addr;
    }

    /// Ask the device for its programmed address via broadcast and adopt it.
    ///
    /// Requires the device to be alone on the bus. If the readback fails its
    /// checksum the previous address is restored instead of adopting noise.
    pub fn probe_address<D: DelayUs<u32>>(&mut self, delay: &mut D) -> u8 {
        self.rw_error = RwError::empty();
        let previous = self.addr;
        self.addr = BROADCAST_ADDR;
        let (word, flags) = self.read16(eeprom::ADDRESS | EEPROM_SELECT, delay);
        self.addr = if flags.contains(RwError::RX_CRC) {
            previous
        } else {
            (word & 0x00ff) as u8
        };
        self.addr
    }

    /// The chip's 64 bit ID, most significant word first.
    pub fn read_id<D: DelayUs<u32>>(&mut self, delay: &mut D) -> u64 {
        self.rw_error = RwError::empty();
        let mut id: u64 = 0;
        for reg in eeprom::ID1..=eeprom::ID4 {
            id = (id << 16) | u64::from(self.read16(reg | EEPROM_SELECT, delay).0);
        }
        id
    }

    /// Read a RAM register.
    pub fn read_ram<D: DelayUs<u32>>(&mut self, reg: u8, delay: &mut D) -> u16 {
        self.rw_error = RwError::empty();
        self.read16(reg, delay).0
    }

    /// Read an EEPROM register.
    pub fn read_eeprom<D: DelayUs<u32>>(&mut self, reg: u8, delay: &mut D) -> u16 {
        self.rw_error = RwError::empty();
        self.read16(reg | EEPROM_SELECT, delay).0
    }

    /// Write an EEPROM register through the erase-then-write sequence.
    pub fn write_eeprom<D: DelayUs<u32> + DelayMs<u32>>(
        &mut self,
        reg: u8,
        value: u16,
        delay: &mut D,
    ) {
        self.rw_error = RwError::empty();
        self.eeprom_update(reg, value, delay);
    }

    /// Safely mutate a persistent register.
    ///
    /// The cell is read first: a matching value means no write (EEPROM
    /// endurance is finite), and a failed read is not trusted enough to
    /// justify a destructive erase. Otherwise the cell is cleared, T_erase
    /// waited, the value programmed, T_write waited. A failure in either
    /// half raises [`RwError::EE_CORRUPT`]; the write half runs even when
    /// the erase half failed, since the device may still accept it.
    fn eeprom_update<D: DelayUs<u32> + DelayMs<u32>>(&mut self, reg: u8, value: u16, delay: &mut D) {
        let reg = reg | EEPROM_SELECT;
        let (current, _) = self.read16(reg, delay);
        if current == value || !self.rw_error.is_empty() {
            return;
        }
        debug!("eeprom {reg:#04x}: {current:#06x} -> {value:#06x}");

        let erase = self.write16(reg, 0);
        delay.delay_ms(ERASE_MS);
        if !erase.is_empty() {
            self.rw_error |= RwError::EE_CORRUPT;
        }

        let write = self.write16(reg, value);
        delay.delay_ms(WRITE_MS);
        if !write.is_empty() {
            self.rw_error |= RwError::EE_CORRUPT;
        }
    }

    /// One 16 bit register read with PEC verification.
    ///
    /// Returns the value and the flags raised by this call alone; the same
    /// flags are OR'd into the accumulated mask. The value comes back even
    /// on error.
    fn read16<D: DelayUs<u32>>(&mut self, cmd: u8, delay: &mut D) -> (u16, RwError) {
        let mut flags = RwError::from(self.bus.write(self.addr, &[cmd], false));

        // Repeated-start read follows after the device's turnaround time.
        delay.delay_us(TURNAROUND_US);
        let mut buf = [0u8; 3];
        flags |= RwError::from(self.bus.read(self.addr, &mut buf));

        // Nobody acknowledges the broadcast address, so transport failures
        // there are expected and meaningless. Checksum flags still count.
        if self.addr == BROADCAST_ADDR {
            flags -= RwError::TRANSPORT;
        }

        let value = u16::from_le_bytes([buf[0], buf[1]]);
        self.pec = buf[2];

        // The device computes its PEC over both the write phase (address
        // tagged for write, then the command) and the read phase (address
        // tagged for read, then the data), in wire order.
        let mut crc = Crc8::new(SMBUS_POLY);
        crc.update(self.addr << 1);
        crc.update(cmd);
        crc.update((self.addr << 1) + 1);
        crc.update(buf[0]);
        self.crc8 = crc.update(buf[1]);
        if self.crc8 != self.pec {
            flags |= RwError::RX_CRC;
        }

        let (pec, crc8) = (self.pec, self.crc8);
        trace!("read {cmd:#04x} -> {value:#06x} (pec {pec:#04x}, crc {crc8:#04x})");
        self.rw_error |= flags;
        (value, flags)
    }

    /// One 16 bit register write, PEC appended, little-endian data.
    fn write16(&mut self, cmd: u8, value: u16) -> RwError {
        let [lo, hi] = value.to_le_bytes();

        let mut crc = Crc8::new(SMBUS_POLY);
        crc.update(self.addr << 1);
        crc.update(cmd);
        crc.update(lo);
        self.crc8 = crc.update(hi);
        self.pec = self.crc8;

        let mut flags =
            RwError::from(self.bus.write(self.addr, &[cmd, lo, hi, self.pec], true));
        if self.addr == BROADCAST_ADDR {
            flags -= RwError::TRANSPORT;
        }

        let pec = self.pec;
        trace!("write {cmd:#04x} <- {value:#06x} (pec {pec:#04x})");
        self.rw_error |= flags;
        flags
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use embedded_hal::blocking::delay::{DelayMs, DelayUs};

    use super::{Error, Mlx90614, RwError, TempSource, TempUnit};
    use crate::bus::{SmbusBus, Transmission};
    use crate::crc8::{Crc8, SMBUS_POLY};
    use crate::register::{eeprom, ram, BROADCAST_ADDR, EEPROM_SELECT};

    struct NoDelay;

    impl DelayUs<u32> for NoDelay {
        fn delay_us(&mut self, _us: u32) {}
    }

    impl DelayMs<u32> for NoDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    /// Scripted bus: queued read payloads and per-call statuses, all writes
    /// recorded as (addr, frame, release).
    #[derive(Default)]
    struct FakeBus {
        writes: Vec<(u8, Vec<u8>, bool)>,
        reads: VecDeque<Vec<u8>>,
        write_status: VecDeque<Transmission>,
        read_status: VecDeque<Transmission>,
    }

    impl FakeBus {
        fn new() -> Self {
            Self::default()
        }

        fn push_read(&mut self, bytes: Vec<u8>) {
            self.reads.push_back(bytes);
        }

        /// Queue a well-formed register read response for `cmd` at `addr`.
        fn push_register(&mut self, addr: u8, cmd: u8, value: u16) {
            let [lo, hi] = value.to_le_bytes();
            let mut crc = Crc8::new(SMBUS_POLY);
            for b in [addr << 1, cmd, (addr << 1) + 1, lo, hi] {
                crc.update(b);
            }
            self.push_read(vec![lo, hi, crc.value()]);
        }

        fn push_write_status(&mut self, status: Transmission) {
            self.write_status.push_back(status);
        }

        /// Released frames only, i.e. actual register writes.
        fn released(&self) -> Vec<&(u8, Vec<u8>, bool)> {
            self.writes.iter().filter(|w| w.2).collect()
        }
    }

    impl SmbusBus for FakeBus {
        fn write(&mut self, addr: u8, bytes: &[u8], release: bool) -> Transmission {
            self.writes.push((addr, bytes.to_vec(), release));
            self.write_status
                .pop_front()
                .unwrap_or(Transmission::Success)
        }

        fn read(&mut self, _addr: u8, buf: &mut [u8]) -> Transmission {
            if let Some(bytes) = self.reads.pop_front() {
                buf.copy_from_slice(&bytes);
            }
            self.read_status.pop_front().unwrap_or(Transmission::Success)
        }
    }

    fn written_value(frame: &[u8]) -> u16 {
        u16::from_le_bytes([frame[1], frame[2]])
    }

    #[test]
    fn read_accepts_matching_pec() {
        let mut bus = FakeBus::new();
        bus.push_read(vec![0x00, 0x00, 0x06]);
        let mut dev = Mlx90614::new(bus);

        let value = dev.read_ram(ram::TOBJ1, &mut NoDelay);
        assert_eq!(value, 0);
        assert!(dev.rw_error().is_empty());
        assert_eq!(dev.last_crc(), 0x06);
        assert_eq!(dev.last_pec(), 0x06);
    }

    #[test]
    fn read_flags_pec_mismatch_but_returns_value() {
        let mut bus = FakeBus::new();
        bus.push_read(vec![0x00, 0x00, 0x07]);
        let mut dev = Mlx90614::new(bus);

        let value = dev.read_ram(ram::TOBJ1, &mut NoDelay);
        assert_eq!(value, 0);
        assert_eq!(dev.rw_error(), RwError::RX_CRC);
        assert!(matches!(
            dev.status(),
            Err(Error::Integrity { crc: 0x06, pec: 0x07 })
        ));
    }

    #[test]
    fn temperature_scaling_and_conversion() {
        // Raw 20000 counts = 400.00 K.
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, ram::TOBJ1, 20000);
        bus.push_register(0x5a, ram::TOBJ1, 20000);
        bus.push_register(0x5a, ram::TA, 20000);
        let mut dev = Mlx90614::new(bus);

        let k = dev.read_temp(TempSource::Object1, TempUnit::Kelvin, &mut NoDelay);
        assert!((k - 400.0).abs() < 1e-9);
        let c = dev.read_temp(TempSource::Object1, TempUnit::Celsius, &mut NoDelay);
        assert!((c - 126.85).abs() < 1e-9);
        let f = dev.read_temp(TempSource::Ambient, TempUnit::Fahrenheit, &mut NoDelay);
        assert!((f - 260.33).abs() < 1e-6);
        assert!(dev.rw_error().is_empty());
    }

    #[test]
    fn eeprom_write_skipped_when_value_matches() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::EMISSIVITY | EEPROM_SELECT, 0x8000);
        let mut dev = Mlx90614::new(bus);

        dev.write_eeprom(eeprom::EMISSIVITY, 0x8000, &mut NoDelay);
        assert!(dev.rw_error().is_empty());
        // Only the command write for the readback, no erase and no program.
        let bus = dev.free();
        assert!(bus.released().is_empty());
        assert_eq!(bus.writes.len(), 1);
    }

    #[test]
    fn eeprom_write_skipped_when_readback_fails() {
        let mut bus = FakeBus::new();
        bus.push_read(vec![0x12, 0x34, 0x00]); // bad pec
        let mut dev = Mlx90614::new(bus);

        dev.write_eeprom(eeprom::EMISSIVITY, 0x8000, &mut NoDelay);
        assert_eq!(dev.rw_error(), RwError::RX_CRC);
        assert!(dev.free().released().is_empty());
    }

    #[test]
    fn failed_erase_flags_corruption_and_still_programs() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::EMISSIVITY | EEPROM_SELECT, 0x2000);
        bus.push_write_status(Transmission::Success); // readback command
        bus.push_write_status(Transmission::DataNack); // erase
        bus.push_write_status(Transmission::Success); // program
        let mut dev = Mlx90614::new(bus);

        dev.write_eeprom(eeprom::EMISSIVITY, 0x8000, &mut NoDelay);
        assert!(dev.rw_error().contains(RwError::EE_CORRUPT));
        assert!(dev.rw_error().contains(RwError::TX_DATA_NACK));
        assert!(matches!(dev.status(), Err(Error::EepromCorrupt(_))));

        let bus = dev.free();
        let released = bus.released();
        assert_eq!(released.len(), 2);
        assert_eq!(written_value(&released[0].1), 0); // erase frame
        assert_eq!(written_value(&released[1].1), 0x8000); // program frame
    }

    #[test]
    fn emissivity_round_trip() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::EMISSIVITY | EEPROM_SELECT, 0x2000);
        let mut dev = Mlx90614::new(bus);

        dev.set_emissivity(0.5, &mut NoDelay);
        assert!(dev.rw_error().is_empty());
        let stored = {
            let bus = dev.free();
            let released = bus.released();
            assert_eq!(released.len(), 2);
            written_value(&released[1].1)
        };
        assert_eq!(stored, 32768); // round(0.5 * 65535)

        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::EMISSIVITY | EEPROM_SELECT, stored);
        let mut dev = Mlx90614::new(bus);
        let emissivity = dev.emissivity(&mut NoDelay);
        assert!((emissivity - 0.5).abs() <= 1.0 / 65535.0);
    }

    #[test]
    fn emissivity_out_of_range_rejected_without_bus_traffic() {
        let mut dev = Mlx90614::new(FakeBus::new());

        dev.set_emissivity(1.01, &mut NoDelay);
        assert_eq!(dev.rw_error(), RwError::INVALID_DATA);
        assert!(matches!(dev.status(), Err(Error::InvalidData)));

        dev.set_emissivity(0.05, &mut NoDelay);
        assert_eq!(dev.rw_error(), RwError::INVALID_DATA);

        assert!(dev.free().writes.is_empty());
    }

    #[test]
    fn iir_setting_preserves_fir_bits() {
        let mut bus = FakeBus::new();
        // The setter reads the register itself, then the erase-write
        // sequence reads it again for the skip-on-match check.
        bus.push_register(0x5a, eeprom::CONFIG | EEPROM_SELECT, 0x0705);
        bus.push_register(0x5a, eeprom::CONFIG | EEPROM_SELECT, 0x0705);
        let mut dev = Mlx90614::new(bus);

        dev.set_iir_coeff(3, &mut NoDelay);
        assert!(dev.rw_error().is_empty());
        let released = dev.free();
        let released = released.released();
        assert_eq!(written_value(&released[1].1), 0x0703);
    }

    #[test]
    fn fir_setting_preserves_iir_bits() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::CONFIG | EEPROM_SELECT, 0x0705);
        bus.push_register(0x5a, eeprom::CONFIG | EEPROM_SELECT, 0x0705);
        let mut dev = Mlx90614::new(bus);

        dev.set_fir_coeff(2, &mut NoDelay);
        assert!(dev.rw_error().is_empty());
        let released = dev.free();
        let released = released.released();
        assert_eq!(written_value(&released[1].1), 0x0205);
    }

    #[test]
    fn filter_getters_extract_fields() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::CONFIG | EEPROM_SELECT, 0x0705);
        bus.push_register(0x5a, eeprom::CONFIG | EEPROM_SELECT, 0x0705);
        let mut dev = Mlx90614::new(bus);

        assert_eq!(dev.iir_coeff(&mut NoDelay), 5);
        assert_eq!(dev.fir_coeff(&mut NoDelay), 7);
    }

    #[test]
    fn broadcast_suppresses_transport_errors_only() {
        let mut bus = FakeBus::new();
        bus.push_register(BROADCAST_ADDR, ram::TA, 0x1234);
        bus.push_write_status(Transmission::AddressNack);
        let mut dev = Mlx90614::with_address(bus, BROADCAST_ADDR);

        let value = dev.read_ram(ram::TA, &mut NoDelay);
        assert_eq!(value, 0x1234);
        assert!(dev.rw_error().is_empty());
    }

    #[test]
    fn addressed_device_keeps_transport_errors() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, ram::TA, 0x1234);
        bus.push_write_status(Transmission::AddressNack);
        let mut dev = Mlx90614::new(bus);

        dev.read_ram(ram::TA, &mut NoDelay);
        assert!(dev.rw_error().contains(RwError::TX_ADDR_NACK));
    }

    #[test]
    fn set_address_writes_via_broadcast_and_adopts() {
        let mut bus = FakeBus::new();
        bus.push_register(BROADCAST_ADDR, eeprom::ADDRESS | EEPROM_SELECT, 0x005a);
        let mut dev = Mlx90614::new(bus);

        dev.set_address(0x2a, &mut NoDelay);
        assert_eq!(dev.address(), 0x2a);
        assert!(dev.rw_error().is_empty());

        let bus = dev.free();
        for write in &bus.writes {
            assert_eq!(write.0, BROADCAST_ADDR);
        }
        let released = bus.released();
        assert_eq!(written_value(&released[0].1), 0);
        assert_eq!(written_value(&released[1].1), 0x002a);
    }

    #[test]
    fn set_address_rejects_reserved_values() {
        let mut dev = Mlx90614::new(FakeBus::new());

        dev.set_address(0, &mut NoDelay);
        assert_eq!(dev.rw_error(), RwError::INVALID_DATA);
        dev.set_address(0x80, &mut NoDelay);
        assert_eq!(dev.rw_error(), RwError::INVALID_DATA);

        assert_eq!(dev.address(), 0x5a);
        assert!(dev.free().writes.is_empty());
    }

    #[test]
    fn probe_address_adopts_valid_readback() {
        let mut bus = FakeBus::new();
        bus.push_register(BROADCAST_ADDR, eeprom::ADDRESS | EEPROM_SELECT, 0x005a);
        let mut dev = Mlx90614::with_address(bus, 0x10);

        assert_eq!(dev.probe_address(&mut NoDelay), 0x5a);
        assert_eq!(dev.address(), 0x5a);
    }

    #[test]
    fn probe_address_keeps_previous_on_bad_checksum() {
        let mut bus = FakeBus::new();
        bus.push_read(vec![0x5a, 0x00, 0xff]); // bad pec
        let mut dev = Mlx90614::with_address(bus, 0x10);

        assert_eq!(dev.probe_address(&mut NoDelay), 0x10);
        assert_eq!(dev.rw_error(), RwError::RX_CRC);
    }

    #[test]
    fn id_words_assemble_most_significant_first() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::ID1 | EEPROM_SELECT, 0x1111);
        bus.push_register(0x5a, eeprom::ID2 | EEPROM_SELECT, 0x2222);
        bus.push_register(0x5a, eeprom::ID3 | EEPROM_SELECT, 0x3333);
        bus.push_register(0x5a, eeprom::ID4 | EEPROM_SELECT, 0x4444);
        let mut dev = Mlx90614::new(bus);

        assert_eq!(dev.read_id(&mut NoDelay), 0x1111_2222_3333_4444);
        assert!(dev.rw_error().is_empty());
    }

    #[test]
    fn write_frame_layout() {
        let mut bus = FakeBus::new();
        bus.push_register(0x5a, eeprom::EMISSIVITY | EEPROM_SELECT, 0x2000);
        let mut dev = Mlx90614::new(bus);

        dev.write_eeprom(eeprom::EMISSIVITY, 0x8000, &mut NoDelay);
        let bus = dev.free();

        // Readback command goes out without releasing the bus.
        assert_eq!(bus.writes[0], (0x5a, vec![0x24], false));
        // Program frame: command, value little-endian, pec.
        let released = bus.released();
        assert_eq!(*released[1], (0x5a, vec![0x24, 0x00, 0x80, 0xa1], true));
    }
}
