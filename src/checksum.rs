//! Running checksums used for frame integrity.
//!
//! The bus carries a CRC-16/MODBUS footer. A CRC-32 unit backed by `crc32fast`
//! is available for links configured with the wider footer.

/// A running checksum with a fixed footer width.
pub trait Checksum: Default {
    /// Footer bytes on the wire, little-endian.
    const WIDTH: usize;

    /// Restart accumulation.
    fn reset(&mut self);

    /// Accumulate one byte.
    fn update(&mut self, byte: u8);

    /// Accumulate a run of bytes.
    fn update_many(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update(byte);
        }
    }

    /// Current value, widened to `u32`.
    fn value(&self) -> u32;

    /// Checksum of `bytes` from a fresh state.
    #[must_use]
    fn compute(bytes: &[u8]) -> u32 {
        let mut checksum = Self::default();
        checksum.update_many(bytes);
        checksum.value()
    }
}

const CRC16_INIT: u16 = 0xFFFF;
const CRC16_POLY_REFLECTED: u16 = 0xA001;

/// CRC-16/MODBUS: init `0xFFFF`, reflected polynomial `0x8005`, no final xor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crc16 {
    crc: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self { crc: CRC16_INIT }
    }
}

impl Checksum for Crc16 {
    const WIDTH: usize = 2;

    fn reset(&mut self) {
        self.crc = CRC16_INIT;
    }

    fn update(&mut self, byte: u8) {
        let mut crc = self.crc ^ u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 0 {
                crc >> 1
            } else {
                (crc >> 1) ^ CRC16_POLY_REFLECTED
            };
        }
        self.crc = crc;
    }

    fn value(&self) -> u32 {
        u32::from(self.crc)
    }
}

/// CRC-32 (IEEE), as produced by `crc32fast`.
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Checksum for Crc32 {
    const WIDTH: usize = 4;

    fn reset(&mut self) {
        self.hasher.reset();
    }

    fn update(&mut self, byte: u8) {
        self.hasher.update(&[byte]);
    }

    fn update_many(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// Encode `value` as a `C::WIDTH`-byte little-endian footer.
pub(crate) fn footer_bytes<C: Checksum>(value: u32) -> heapless::Vec<u8, 4> {
    value
        .to_le_bytes()
        .iter()
        .take(C::WIDTH)
        .copied()
        .collect()
}

/// Decode a little-endian footer of any width up to four bytes.
pub(crate) fn footer_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .rev()
        .fold(0_u32, |acc, &byte| (acc << 8) | u32::from(byte))
}
