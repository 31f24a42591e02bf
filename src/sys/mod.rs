use crate::BusError;
use crate::channel::ChannelMask;

/// A converter, as seen over its data bus.
///
/// Only `read_frame` is required; the remaining hooks default to doing nothing, for converters
/// that have no chip select under software control or that convert continuously on their own.
pub trait SampleSource {
    /// Perform one bus transaction, filling `frame` with the raw bytes shifted out.
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<(), BusError>;

    /// Enable the channels in `mask` in the converter's sequencer and disable the rest.
    fn configure_channels(&mut self, _mask: ChannelMask) -> Result<(), BusError> {
        Ok(())
    }

    /// Enter continuous conversion mode.
    fn start_conversion(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    /// Leave continuous conversion mode and put the converter in standby.
    fn stop_conversion(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    fn select(&mut self) -> Result<(), BusError> {
        Ok(())
    }

    fn deselect(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<(), BusError> {
        (**self).read_frame(frame)
    }

    fn configure_channels(&mut self, mask: ChannelMask) -> Result<(), BusError> {
        (**self).configure_channels(mask)
    }

    fn start_conversion(&mut self) -> Result<(), BusError> {
        (**self).start_conversion()
    }

    fn stop_conversion(&mut self) -> Result<(), BusError> {
        (**self).stop_conversion()
    }

    fn select(&mut self) -> Result<(), BusError> {
        (**self).select()
    }

    fn deselect(&mut self) -> Result<(), BusError> {
        (**self).deselect()
    }
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
#[path = "linux.rs"]
pub mod imp;
