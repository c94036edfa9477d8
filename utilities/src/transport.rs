use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::info;

/// Byte link a device handler talks over.
pub trait Transport: Read + Write + Send {
    /// Throws away whatever the device sent that nobody has read yet.
    fn clear_input(&mut self) -> io::Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }
}

impl Transport for dyn SerialPort {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

pub fn open_serial(path: &str, baud_rate: u32, timeout: Duration) -> io::Result<Box<dyn Transport>> {
    let port = serialport::new(path, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(io::Error::from)?;

    info!(path, baud_rate, "serial port opened");
    Ok(Box::new(port))
}
