//! A simulated converter, for exercising the acquisition pipeline without hardware.

use crate::channel::ChannelMask;
use crate::config::{AcquisitionConfig, FrameShape};
use crate::scan::{Endianness, ScanType};
use crate::sys::SampleSource;
use crate::BusError;

/// Converter producing a deterministic pattern: the `n`th conversion of channel `c` reads as
/// `(c << 8) | (n & 0xff)`, masked to the channel's width.
#[derive(Debug)]
pub struct SimulatedSource {
    channels: Vec<ScanType>,
    frame_shape: FrameShape,
    enabled: ChannelMask,
    cursor: usize,
    conversions: u64,
    reads: u64,
    fail_at: Option<u64>,
    converting: bool,
    selected: bool,
}

impl SimulatedSource {
    pub fn new(config: &AcquisitionConfig) -> SimulatedSource {
        SimulatedSource {
            channels: config.channels.clone(),
            frame_shape: config.frame_shape,
            enabled: ChannelMask::empty(),
            cursor: 0,
            conversions: 0,
            reads: 0,
            fail_at: None,
            converting: false,
            selected: false,
        }
    }

    /// Make the `read`th bus transaction (counting from 1) fail.
    pub fn fail_at(self, read: u64) -> SimulatedSource {
        SimulatedSource { fail_at: Some(read), ..self }
    }

    pub fn value(channel: usize, conversion: u64) -> u32 {
        ((channel as u32) << 8) | (conversion & 0xff) as u32
    }

    /// Number of bus transactions attempted, including failed ones.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn is_converting(&self) -> bool {
        self.converting
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    fn encode(scan_type: &ScanType, value: u32, bus: &mut [u8]) {
        let mask = if scan_type.real_bits >= 32 { u32::MAX } else { (1 << scan_type.real_bits) - 1 };
        let word = ((value & mask) as u64) << scan_type.shift;
        let len = bus.len();
        for (index, byte) in bus.iter_mut().enumerate() {
            let position = match scan_type.endianness {
                Endianness::Big => len - 1 - index,
                Endianness::Little => index,
            };
            *byte = (word >> (8 * position)) as u8;
        }
    }

    fn sequence(&self) -> Vec<usize> {
        let enabled = if self.enabled.is_empty() {
            ChannelMask::from_bits_retain(((1u64 << self.channels.len()) - 1) as u32)
        } else {
            self.enabled
        };
        enabled.channels().filter(|&index| index < self.channels.len()).collect()
    }
}

impl SampleSource for SimulatedSource {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<(), BusError> {
        self.reads += 1;
        if self.fail_at == Some(self.reads) {
            return Err(BusError::Other("simulated bus fault".into()))
        }
        match self.frame_shape {
            FrameShape::Simultaneous => {
                let expected = self.channels.iter().map(ScanType::bus_bytes).sum();
                if frame.len() != expected {
                    return Err(BusError::ShortTransfer { expected, actual: frame.len() })
                }
                let mut offset = 0;
                for (channel, scan_type) in self.channels.iter().enumerate() {
                    let bus_bytes = scan_type.bus_bytes();
                    let value = Self::value(channel, self.conversions);
                    Self::encode(scan_type, value, &mut frame[offset..offset + bus_bytes]);
                    offset += bus_bytes;
                }
                self.conversions += 1;
            }
            FrameShape::Multiplexed => {
                let sequence = self.sequence();
                if sequence.is_empty() {
                    return Err(BusError::Other("no enabled channel exists".into()))
                }
                let channel = sequence[self.cursor % sequence.len()];
                let scan_type = &self.channels[channel];
                if frame.len() != scan_type.bus_bytes() {
                    return Err(BusError::ShortTransfer {
                        expected: scan_type.bus_bytes(),
                        actual: frame.len()
                    })
                }
                let conversion = self.conversions / sequence.len() as u64;
                Self::encode(scan_type, Self::value(channel, conversion), frame);
                self.cursor = (self.cursor + 1) % sequence.len();
                self.conversions += 1;
            }
        }
        log::trace!("read_frame() = {:02x?}", frame);
        Ok(())
    }

    fn configure_channels(&mut self, mask: ChannelMask) -> Result<(), BusError> {
        self.enabled = mask;
        self.cursor = 0;
        self.conversions = 0;
        Ok(())
    }

    fn start_conversion(&mut self) -> Result<(), BusError> {
        self.converting = true;
        Ok(())
    }

    fn stop_conversion(&mut self) -> Result<(), BusError> {
        self.converting = false;
        Ok(())
    }

    fn select(&mut self) -> Result<(), BusError> {
        self.selected = true;
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), BusError> {
        self.selected = false;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_simultaneous_frame() {
        let config = AcquisitionConfig::burst(vec![ScanType::unsigned(16), ScanType::signed(24)]);
        let mut source = SimulatedSource::new(&config);
        let mut frame = [0; 5];
        source.read_frame(&mut frame).unwrap();
        assert_eq!(frame, [0x00, 0x00, 0x00, 0x01, 0x00]);
        source.read_frame(&mut frame).unwrap();
        assert_eq!(frame, [0x00, 0x01, 0x00, 0x01, 0x01]);
        assert!(source.read_frame(&mut frame[..4]).is_err());
    }

    #[test]
    fn test_multiplexed_sequence() {
        let config = AcquisitionConfig::burst(vec![ScanType::unsigned(16); 4])
            .with_frame_shape(FrameShape::Multiplexed);
        let mut source = SimulatedSource::new(&config);
        source.configure_channels(ChannelMask::CH1 | ChannelMask::CH3).unwrap();
        let mut frame = [0; 2];
        let mut values = Vec::new();
        for _ in 0..4 {
            source.read_frame(&mut frame).unwrap();
            values.push(u16::from_be_bytes(frame));
        }
        assert_eq!(values, [0x0100, 0x0300, 0x0101, 0x0301]);
    }

    #[test]
    fn test_multiplexed_without_existing_channels() {
        let config = AcquisitionConfig::burst(vec![ScanType::unsigned(16); 2])
            .with_frame_shape(FrameShape::Multiplexed);
        let mut source = SimulatedSource::new(&config);
        source.configure_channels(ChannelMask::CH5).unwrap();
        let mut frame = [0; 2];
        assert!(matches!(source.read_frame(&mut frame), Err(BusError::Other(_))));
    }

    #[test]
    fn test_fail_at() {
        let config = AcquisitionConfig::burst(vec![ScanType::unsigned(8)]);
        let mut source = SimulatedSource::new(&config).fail_at(2);
        let mut frame = [0; 1];
        assert!(source.read_frame(&mut frame).is_ok());
        assert!(source.read_frame(&mut frame).is_err());
        assert!(source.read_frame(&mut frame).is_ok());
        assert_eq!(source.reads(), 3);
    }

    #[test]
    fn test_shifted_little_endian_encoding() {
        let mut bus = [0; 2];
        let scan_type = ScanType::unsigned(12).with_shift(4).with_endianness(Endianness::Little);
        SimulatedSource::encode(&scan_type, 0x123, &mut bus);
        assert_eq!(bus, [0x30, 0x12]);
        let mut storage = [0; 2];
        scan_type.extract(&bus, &mut storage);
        assert_eq!(scan_type.decode(&storage), 0x123);
    }
}
