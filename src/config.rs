//! Configuration of an acquisition session.

use crate::scan::ScanType;
use crate::{Error, Result};

/// Capacity of the capture buffer, in bytes, when none is requested.
pub const DEFAULT_CAPACITY: usize = 32768;

/// Number of polling iterations to wait for a conversion to complete.
///
/// This is an iteration count rather than a duration; the time it covers depends on the speed
/// of the host. It must cover the slowest configured sample rate with some margin.
pub const DEFAULT_READY_TIMEOUT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureKind {
    /// Fixed-count polling loop, run to completion when the transfer is prepared.
    Burst,
    /// One scan per trigger event, until the transfer is ended.
    #[default]
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameShape {
    /// One bus transaction returns a sample for every channel of the device, in channel order.
    #[default]
    Simultaneous,
    /// One bus transaction returns a single sample; the device sequences through the enabled
    /// channels in ascending order.
    Multiplexed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    pub capture: CaptureKind,
    pub frame_shape: FrameShape,
    /// Per physical channel, indexed by channel number.
    pub channels: Vec<ScanType>,
    pub ready_timeout: u32,
    /// In burst mode, wait for the ready signal before reading each scan.
    pub burst_wait_ready: bool,
    pub capacity: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        AcquisitionConfig {
            capture: Default::default(),
            frame_shape: Default::default(),
            channels: vec![ScanType::default()],
            ready_timeout: DEFAULT_READY_TIMEOUT,
            burst_wait_ready: false,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl AcquisitionConfig {
    pub fn burst(channels: Vec<ScanType>) -> Self {
        AcquisitionConfig { capture: CaptureKind::Burst, channels, ..Default::default() }
    }

    pub fn continuous(channels: Vec<ScanType>) -> Self {
        AcquisitionConfig { capture: CaptureKind::Continuous, channels, ..Default::default() }
    }

    pub fn with_frame_shape(self, frame_shape: FrameShape) -> Self {
        AcquisitionConfig { frame_shape, ..self }
    }

    pub fn with_ready_timeout(self, ready_timeout: u32) -> Self {
        AcquisitionConfig { ready_timeout, ..self }
    }

    pub fn with_capacity(self, capacity: usize) -> Self {
        AcquisitionConfig { capacity, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::InvalidConfiguration("device has no channels"))
        }
        if self.channels.len() > crate::channel::MAX_CHANNELS {
            return Err(Error::InvalidConfiguration("device has too many channels"))
        }
        for scan_type in &self.channels {
            scan_type.validate()?;
        }
        if self.ready_timeout == 0 {
            return Err(Error::InvalidConfiguration("ready timeout must be at least one iteration"))
        }
        Ok(())
    }

    /// Length of the longest bus transaction for this device: the whole frame when every
    /// channel is shifted out at once, the widest channel otherwise.
    pub fn frame_len(&self) -> usize {
        match self.frame_shape {
            FrameShape::Simultaneous =>
                self.channels.iter().map(ScanType::bus_bytes).sum(),
            FrameShape::Multiplexed =>
                self.channels.iter().map(ScanType::bus_bytes).max().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.capture, CaptureKind::Continuous);
        assert_eq!(config.capacity, 32768);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(AcquisitionConfig::burst(vec![]).validate().is_err());
        assert!(AcquisitionConfig::burst(vec![ScanType::unsigned(40)]).validate().is_err());
        assert!(AcquisitionConfig::burst(vec![ScanType::unsigned(16); 33]).validate().is_err());
        assert!(AcquisitionConfig::default().with_ready_timeout(0).validate().is_err());
    }

    #[test]
    fn test_frame_len() {
        let config = AcquisitionConfig::burst(vec![ScanType::signed(16), ScanType::signed(24)]);
        assert_eq!(config.frame_len(), 5);
        let config = config.with_frame_shape(FrameShape::Multiplexed);
        assert_eq!(config.frame_len(), 3);
    }
}
