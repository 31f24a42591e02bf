use std::ffi::{CStr, CString};
use std::io;
use libc::{c_int, c_void};

use crate::{BusError, Error, Result};

#[derive(Debug)]
struct Fd(c_int);

impl Fd {
    fn open(path: &CStr) -> io::Result<Fd> {
        unsafe {
            let fd = libc::open(path.as_ptr(), libc::O_RDONLY);
            if fd == -1 {
                Err(io::Error::last_os_error())
            } else {
                Ok(Fd(fd))
            }
        }
    }

    fn read_exact(&self, data: &mut [u8]) -> core::result::Result<(), BusError> {
        // SAFETY: `data` is valid for writes of `data.len()` bytes.
        let bytes_read = unsafe { libc::read(self.0, data.as_mut_ptr() as *mut c_void, data.len()) };
        if bytes_read < 0 {
            Err(io::Error::last_os_error().into())
        } else if bytes_read as usize != data.len() {
            Err(BusError::ShortTransfer { expected: data.len(), actual: bytes_read as usize })
        } else {
            Ok(())
        }
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            if libc::close(self.0) == -1 {
                log::warn!("error closing fd: {}", io::Error::last_os_error())
            }
        }
    }
}

/// A converter behind a character device where every `read()` is one bus transaction,
/// such as a `spidev` node.
#[derive(Debug)]
pub struct DeviceFileSource {
    fd: Fd,
}

impl DeviceFileSource {
    pub fn open(device_path: &str) -> Result<DeviceFileSource> {
        let path = CString::new(device_path)
            .map_err(|_| Error::InvalidConfiguration("device path contains a NUL byte"))?;
        log::debug!("opening {}", device_path);
        Ok(DeviceFileSource { fd: Fd::open(path.as_ref())? })
    }
}

impl super::SampleSource for DeviceFileSource {
    fn read_frame(&mut self, frame: &mut [u8]) -> core::result::Result<(), BusError> {
        self.fd.read_exact(frame)?;
        log::trace!("read_frame() = {:02x?}", frame);
        Ok(())
    }
}
