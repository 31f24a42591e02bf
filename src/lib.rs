mod sys;
mod scan;
mod config;
mod channel;
mod capture;
mod trigger;
mod session;
mod shared;
pub mod sim;

use std::io;

#[derive(Debug)]
pub enum BusError {
    Io(io::Error),
    ShortTransfer { expected: usize, actual: usize },
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(io_error) =>
                write!(f, "bus I/O error: {}", io_error),
            Self::ShortTransfer { expected, actual } =>
                write!(f, "short bus transfer: expected {} bytes, got {}", expected, actual),
            Self::Other(error) =>
                write!(f, "{}", error),
        }
    }
}

impl std::error::Error for BusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::Io(ref io_error) => Some(io_error),
            _ => None
        }
    }
}

impl From<io::Error> for BusError {
    fn from(error: io::Error) -> Self {
        BusError::Io(error)
    }
}

#[derive(Debug)]
pub enum IrqError {
    /// The interrupt line is not registered with the controller.
    Unavailable,
    Controller(Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl std::fmt::Display for IrqError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Unavailable =>
                write!(f, "interrupt line unavailable"),
            Self::Controller(error) =>
                write!(f, "interrupt controller error: {}", error),
        }
    }
}

impl std::error::Error for IrqError {}

#[derive(Debug)]
pub enum Error {
    Bus(BusError),
    Irq(IrqError),
    Timeout,
    BufferFull { needed: usize, available: usize },
    NotActive,
    Busy,
    InvalidConfiguration(&'static str),
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Bus(bus_error) =>
                write!(f, "{}", bus_error),
            Self::Irq(irq_error) =>
                write!(f, "{}", irq_error),
            Self::Timeout =>
                write!(f, "timed out waiting for conversion"),
            Self::BufferFull { needed, available } =>
                write!(f, "buffer full: {} bytes needed, {} available", needed, available),
            Self::NotActive =>
                write!(f, "no transfer in progress"),
            Self::Busy =>
                write!(f, "transfer in progress"),
            Self::InvalidConfiguration(reason) =>
                write!(f, "invalid configuration: {}", reason),
            Self::Io(io_error) =>
                write!(f, "I/O error: {}", io_error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            &Self::Bus(ref bus_error) => Some(bus_error),
            &Self::Irq(ref irq_error) => Some(irq_error),
            &Self::Io(ref io_error) => Some(io_error),
            _ => None
        }
    }
}

impl From<BusError> for Error {
    fn from(error: BusError) -> Self {
        Error::Bus(error)
    }
}

impl From<IrqError> for Error {
    fn from(error: IrqError) -> Self {
        Error::Irq(error)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(io_error) =>
                io_error,
            Error::Bus(BusError::Io(io_error)) =>
                io_error,
            Error::Timeout =>
                Self::new(io::ErrorKind::TimedOut, error),
            Error::BufferFull { .. } | Error::Busy =>
                Self::new(io::ErrorKind::WouldBlock, error),
            Error::InvalidConfiguration(_) =>
                Self::new(io::ErrorKind::InvalidInput, error),
            _ =>
                Self::new(io::ErrorKind::Other, error),
        }
    }
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use sys::SampleSource;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use sys::imp::DeviceFileSource;

pub use scan::{
    Sign,
    Endianness,
    ScanType,
};

pub use config::{
    CaptureKind,
    FrameShape,
    AcquisitionConfig,
    DEFAULT_CAPACITY,
    DEFAULT_READY_TIMEOUT,
};

pub use channel::{
    ChannelMask,
    ChannelSelector,
    MAX_CHANNELS,
};

pub use capture::{
    RingBufferSink,
    RingCursor,
};

pub use trigger::{
    Trigger,
    FreeRunning,
    EdgeLine,
    EdgeTrigger,
    LineCounters,
};

pub use session::{
    State,
    CaptureMode,
    Burst,
    Continuous,
    SessionStats,
    Pipeline,
    AcquisitionSession,
    DataCallback,
};

pub use shared::SharedSession;
