//! Description of a raw sample as it is shifted out of a converter, and the conversion
//! into the representation stored in the capture buffer.
//!
//! Samples are stored little-endian, masked to their real width, and (for two's-complement
//! channels) sign-extended to the full storage width. No scaling is applied.

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sign {
    #[default]
    Unsigned,
    Signed,
}

/// Byte order of a sample word on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanType {
    pub sign: Sign,
    /// Number of significant bits in a sample.
    pub real_bits: u8,
    /// Number of bytes a sample occupies in the capture buffer.
    pub storage_bytes: u8,
    /// Number of padding bits to the right of the sample in the bus word.
    pub shift: u8,
    pub endianness: Endianness,
}

impl Default for ScanType {
    fn default() -> Self {
        ScanType::unsigned(24)
    }
}

impl ScanType {
    /// Create a scan type for a `real_bits` wide sample, stored in the smallest number of
    /// whole bytes that fit it and transferred MSB first with no padding.
    pub const fn new(sign: Sign, real_bits: u8) -> ScanType {
        ScanType {
            sign,
            real_bits,
            storage_bytes: real_bits / 8 + (real_bits % 8 != 0) as u8,
            shift: 0,
            endianness: Endianness::Big,
        }
    }

    pub const fn unsigned(real_bits: u8) -> ScanType {
        ScanType::new(Sign::Unsigned, real_bits)
    }

    pub const fn signed(real_bits: u8) -> ScanType {
        ScanType::new(Sign::Signed, real_bits)
    }

    pub const fn with_storage_bytes(self, storage_bytes: u8) -> ScanType {
        ScanType { storage_bytes, ..self }
    }

    pub const fn with_shift(self, shift: u8) -> ScanType {
        ScanType { shift, ..self }
    }

    pub const fn with_endianness(self, endianness: Endianness) -> ScanType {
        ScanType { endianness, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if self.real_bits == 0 || self.real_bits > 32 {
            return Err(Error::InvalidConfiguration("sample width must be between 1 and 32 bits"))
        }
        if (self.storage_bytes as usize) < (self.real_bits as usize + 7) / 8 {
            return Err(Error::InvalidConfiguration("storage is narrower than the sample"))
        }
        if self.storage_bytes > 4 {
            return Err(Error::InvalidConfiguration("storage is wider than 4 bytes"))
        }
        if self.real_bits as usize + self.shift as usize > 32 {
            return Err(Error::InvalidConfiguration("shifted sample does not fit a 32-bit word"))
        }
        Ok(())
    }

    /// Number of bytes one sample occupies on the bus.
    pub fn bus_bytes(&self) -> usize {
        (self.real_bits as usize + self.shift as usize + 7) / 8
    }

    pub fn storage_bytes(&self) -> usize {
        self.storage_bytes as usize
    }

    fn mask(&self) -> u32 {
        if self.real_bits >= 32 { u32::MAX } else { (1u32 << self.real_bits) - 1 }
    }

    /// Convert one sample as read from the bus into its storage representation.
    ///
    /// `bus` must be `bus_bytes()` long and `storage` must be `storage_bytes()` long.
    pub fn extract(&self, bus: &[u8], storage: &mut [u8]) {
        debug_assert_eq!(bus.len(), self.bus_bytes());
        debug_assert_eq!(storage.len(), self.storage_bytes());
        let mut word = 0u64;
        match self.endianness {
            Endianness::Big =>
                for &byte in bus { word = (word << 8) | byte as u64 },
            Endianness::Little =>
                for &byte in bus.iter().rev() { word = (word << 8) | byte as u64 },
        }
        let raw = (word >> self.shift) as u32 & self.mask();
        let value = match self.sign {
            Sign::Unsigned => raw,
            Sign::Signed => sign_extend(raw, self.real_bits) as u32,
        };
        storage.copy_from_slice(&value.to_le_bytes()[..self.storage_bytes()]);
    }

    /// Interpret a sample in storage representation as an integer.
    pub fn decode(&self, storage: &[u8]) -> i64 {
        let mut bytes = [0u8; 4];
        bytes[..storage.len()].copy_from_slice(storage);
        let raw = u32::from_le_bytes(bytes) & self.mask();
        match self.sign {
            Sign::Unsigned => raw as i64,
            Sign::Signed => sign_extend(raw, self.real_bits) as i64,
        }
    }
}

fn sign_extend(value: u32, bits: u8) -> i32 {
    let unused = 32 - bits as u32;
    ((value << unused) as i32) >> unused
}
