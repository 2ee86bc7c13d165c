//! The hardware module contains the byte level transports an ELM327 can be reached over.
//!
//! The engine in [crate::device] only ever talks to a [Transport], so any byte stream
//! (a serial port, a bluetooth RFCOMM socket, an in-memory simulation) can carry it.

#[cfg(feature = "serial")]
pub mod serial;
pub mod simulation;

use std::time::Duration;

use crate::device::DeviceOptions;

/// Byte stream connected to an ELM327
pub trait Transport: Send {
    /// Writes the whole buffer to the device
    fn write(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Reads whatever the device has sent so far into `buf`, returning the number of bytes read.
    /// Implementations should block for at most their read timeout and return
    /// [std::io::ErrorKind::TimedOut] when nothing arrived in that time.
    ///
    /// `Ok(0)` means "nothing yet" and the engine keeps polling, so it must NOT be used
    /// to signal end of stream. Report a closed stream as an error
    /// (EG: [std::io::ErrorKind::UnexpectedEof]) or the engine waits forever.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Discards any bytes pending in either direction
    fn flush(&mut self) -> std::io::Result<()>;

    /// Releases the underlying device. The transport is dropped afterwards
    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        (**self).write(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).read(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}

/// Serial line parameters. The framing (8N1, no flow control) is fixed by the ELM327,
/// only the speed and the read timeout can change
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Maximum time a single read blocks for
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::from(&DeviceOptions::default())
    }
}

impl From<&DeviceOptions> for SerialSettings {
    fn from(opts: &DeviceOptions) -> Self {
        Self {
            baud_rate: opts.baud_rate,
            read_timeout: opts.read_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_elm327_factory_defaults() {
        let s = SerialSettings::default();
        assert_eq!(s.baud_rate, 38400);
        assert_eq!(s.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn settings_follow_device_options() {
        let opts = DeviceOptions {
            baud_rate: 115200,
            read_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(
            SerialSettings::from(&opts),
            SerialSettings {
                baud_rate: 115200,
                read_timeout: Duration::from_millis(500),
            }
        );
        assert_ne!(SerialSettings::from(&opts), SerialSettings::default());
    }
}
