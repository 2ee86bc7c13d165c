//! Serial port transport, backed by the `serialport` crate

use std::io::{Read, Write};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::{SerialSettings, Transport};

/// Opens the serial device at `path` with the ELM327 line settings (8N1, no flow control)
pub fn open_port(path: &str, settings: SerialSettings) -> serialport::Result<Box<dyn SerialPort>> {
    log::debug!(
        "Opening serial port {path} at {} baud, read timeout {:?}",
        settings.baud_rate,
        settings.read_timeout
    );
    serialport::new(path, settings.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(settings.read_timeout)
        .open()
}

impl Transport for dyn SerialPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        Write::write_all(self, buf)?;
        Write::flush(self)
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Read::read(self, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::All).map_err(std::io::Error::from)
    }
}
