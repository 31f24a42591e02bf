//! Active channel selection and demultiplexing of bus frames into scans.

use bitflags::bitflags;

use crate::scan::ScanType;
use crate::{Error, Result};

pub const MAX_CHANNELS: usize = 32;

bitflags! {
    /// Set of channels participating in a scan; bit N is channel N.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u32 {
        const CH0 = 1<<0;
        const CH1 = 1<<1;
        const CH2 = 1<<2;
        const CH3 = 1<<3;
        const CH4 = 1<<4;
        const CH5 = 1<<5;
        const CH6 = 1<<6;
        const CH7 = 1<<7;

        const _ = !0;
    }
}

impl ChannelMask {
    /// Mask with only channel `index` set.
    ///
    /// # Panics
    ///
    /// If `index` is not below [`MAX_CHANNELS`].
    pub fn channel(index: usize) -> Self {
        assert!(index < MAX_CHANNELS);
        ChannelMask::from_bits_retain(1 << index)
    }

    /// Like [`channel`](Self::channel), and panics in the same way.
    pub fn from_channels(indices: &[usize]) -> Self {
        indices.iter().fold(ChannelMask::empty(), |mask, &index| mask | ChannelMask::channel(index))
    }

    pub fn contains_channel(self, index: usize) -> bool {
        index < MAX_CHANNELS && self.bits() & (1 << index) != 0
    }

    pub fn count(self) -> usize {
        self.bits().count_ones() as usize
    }

    /// Indices of the channels in the mask, in ascending order.
    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..MAX_CHANNELS).filter(move |&index| self.contains_channel(index))
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSelector {
    scan_types: Vec<ScanType>,
    mask: ChannelMask,
}

impl ChannelSelector {
    pub fn new(scan_types: Vec<ScanType>) -> ChannelSelector {
        assert!(scan_types.len() <= MAX_CHANNELS);
        ChannelSelector { scan_types, mask: ChannelMask::empty() }
    }

    pub fn num_channels(&self) -> usize {
        self.scan_types.len()
    }

    pub fn scan_type(&self, channel: usize) -> Option<&ScanType> {
        self.scan_types.get(channel)
    }

    pub fn active_channels(&self) -> ChannelMask {
        self.mask
    }

    /// Select the channels for the next transfer. Only called while no transfer is active.
    pub fn set_active_channels(&mut self, mask: ChannelMask) -> Result<()> {
        if mask.is_empty() {
            return Err(Error::InvalidConfiguration("no channels selected"))
        }
        if mask.channels().any(|index| index >= self.scan_types.len()) {
            return Err(Error::InvalidConfiguration("selected channel does not exist"))
        }
        log::debug!("set_active_channels({:#010x})", mask.bits());
        self.mask = mask;
        Ok(())
    }

    /// Storage width of one sample of `channel`, or 0 if there is no such channel.
    pub fn bytes_per_channel(&self, channel: usize) -> usize {
        self.scan_types.get(channel).map(ScanType::storage_bytes).unwrap_or(0)
    }

    pub fn bytes_per_scan(&self) -> usize {
        self.mask.channels().map(|index| self.bytes_per_channel(index)).sum()
    }

    /// Offset of the sample of `channel` within a frame carrying every channel.
    pub fn frame_offset(&self, channel: usize) -> usize {
        self.scan_types[..channel].iter().map(ScanType::bus_bytes).sum()
    }

    /// Append the storage representation of one bus sample of `channel` to `scan`.
    pub fn extract_sample(&self, channel: usize, bus: &[u8], scan: &mut Vec<u8>) {
        let scan_type = &self.scan_types[channel];
        let start = scan.len();
        scan.resize(start + scan_type.storage_bytes(), 0);
        scan_type.extract(bus, &mut scan[start..]);
    }

    /// Append the active channels of a frame carrying every channel to `scan`.
    pub fn demux_frame(&self, frame: &[u8], scan: &mut Vec<u8>) {
        let mut offset = 0;
        for (index, scan_type) in self.scan_types.iter().enumerate() {
            let bus_bytes = scan_type.bus_bytes();
            if self.mask.contains_channel(index) {
                self.extract_sample(index, &frame[offset..offset + bus_bytes], scan);
            }
            offset += bus_bytes;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn selector() -> ChannelSelector {
        ChannelSelector::new(vec![
            ScanType::unsigned(16),
            ScanType::signed(24),
            ScanType::signed(24).with_storage_bytes(4),
            ScanType::unsigned(17),
        ])
    }

    #[test]
    fn test_mask_channels() {
        let mask = ChannelMask::CH3 | ChannelMask::CH0 | ChannelMask::channel(20);
        assert_eq!(mask.channels().collect::<Vec<_>>(), vec![0, 3, 20]);
        assert_eq!(mask.count(), 3);
        assert!(mask.contains_channel(20));
        assert!(!mask.contains_channel(40));
        assert_eq!(ChannelMask::from_channels(&[0, 3, 20]), mask);
    }

    #[test]
    #[should_panic]
    fn test_channel_out_of_range() {
        ChannelMask::from_channels(&[1, MAX_CHANNELS]);
    }

    #[test]
    fn test_bytes_per_scan_is_sum_over_mask() {
        let mut selector = selector();
        for bits in 1..16u32 {
            let mask = ChannelMask::from_bits_retain(bits);
            selector.set_active_channels(mask).unwrap();
            let expected: usize = mask.channels().map(|ch| selector.bytes_per_channel(ch)).sum();
            assert_eq!(selector.bytes_per_scan(), expected);
        }
        selector.set_active_channels(ChannelMask::CH1 | ChannelMask::CH2).unwrap();
        assert_eq!(selector.bytes_per_scan(), 7);
    }

    #[test]
    fn test_invalid_masks() {
        let mut selector = selector();
        assert!(selector.set_active_channels(ChannelMask::empty()).is_err());
        assert!(selector.set_active_channels(ChannelMask::CH4).is_err());
        assert_eq!(selector.active_channels(), ChannelMask::empty());
        assert_eq!(selector.bytes_per_channel(9), 0);
    }

    #[test]
    fn test_demux_frame() {
        let mut selector = selector();
        selector.set_active_channels(ChannelMask::CH0 | ChannelMask::CH2).unwrap();
        assert_eq!(selector.frame_offset(2), 5);
        let frame = [
            0x12, 0x34,             // ch0
            0xaa, 0xbb, 0xcc,       // ch1
            0xff, 0xff, 0xff,       // ch2
            0x00, 0x00, 0x01,       // ch3
        ];
        let mut scan = Vec::new();
        selector.demux_frame(&frame, &mut scan);
        assert_eq!(scan, [0x34, 0x12, 0xff, 0xff, 0xff, 0xff]);
    }
}
