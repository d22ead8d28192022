//! Thin wrapper around the serial transport drivers read/write against.
//! Kept separate from the framing state machines so they can be driven
//! by tests without a real device.

use std::time::Duration;

use serialport::SerialPort;

use crate::driver::DriverError;

/// Opens a serial port for non-blocking reads; `baud_rate` is whatever
/// the configured radio's AT-command or CSMA firmware expects.
pub fn open(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, DriverError> {
    serialport::new(path, baud_rate)
        .timeout(Duration::from_millis(0))
        .open()
        .map_err(|e| DriverError::Io(e.to_string()))
}

/// Reads whatever is immediately available without blocking the main
/// loop; a zero-length read or a would-block error is not a failure.
pub fn read_available(port: &mut dyn SerialPort, buf: &mut [u8]) -> Result<usize, DriverError> {
    match port.read(buf) {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
        Err(e) => Err(DriverError::Io(e.to_string())),
    }
}

pub fn write_all(port: &mut dyn SerialPort, bytes: &[u8]) -> Result<(), DriverError> {
    std::io::Write::write_all(port, bytes).map_err(|e| DriverError::Io(e.to_string()))
}
