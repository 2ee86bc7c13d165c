#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate for talking to ELM327-family OBD-II interpreter chips over a serial line
//!
//! ## How it works
//!
//! The ELM327 speaks a line-oriented AT command protocol. Every command is written as
//! text terminated by `\r\n`, the chip echoes the command back, prints zero or more
//! lines of answer separated by `\r`, and finally prints the `>` prompt once it is
//! ready for the next command.
//!
//! [device::Elm327Device] owns the serial connection, serializes access to it, checks the echo
//! and splits the answer into lines. Each call to [channel::ElmChannel::run_command] produces a
//! [result::RawResult] which carries the raw text lines together with the time spent writing
//! and reading.
//!
//! ## Testing without hardware
//!
//! * [mock::MockDevice] is a stateless lookup table which answers a handful of AT and
//!   service 01 commands with canned responses.
//! * [hardware::simulation::SimulatedElm327] is an in-memory transport which behaves like
//!   an ELM327 on the wire, so the real engine can be driven without a serial port.
//!
//! Both engines implement [channel::ElmChannel], so code decoding the payloads only
//! ever depends on that trait.
//!
//! ## Decoding
//!
//! This crate does NOT interpret payloads. Turning `41 0C 03 00` into an engine speed is
//! the job of the layer sitting on top of [channel::ElmChannel].

use std::sync::Arc;

pub mod channel;
pub mod device;
pub mod hardware;
pub mod mock;
pub mod result;

pub use channel::ElmChannel;
pub use device::{DeviceOptions, Elm327Device, ReliabilityState};
pub use mock::MockDevice;
pub use result::{RawResult, ResultOrigin};

/// ELM327 device result
pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Clone, Debug, thiserror::Error)]
/// Error produced while talking to an ELM327 device
pub enum DeviceError {
    /// The transport could not be opened, or the device did not pass the
    /// reset handshake right after opening it
    #[error("Could not connect to ELM327 device at '{path}': {desc}")]
    ConnectionError {
        /// Path of the serial device
        path: String,
        /// Description of what failed
        desc: String,
        /// Underlying failure, if the transport opened but the handshake did not pass
        #[source]
        cause: Option<Box<DeviceError>>,
    },
    /// The device did not identify itself as an ELM327 after `ATZ`, or the
    /// transport failed during the handshake
    #[error("Device reset failed, device answered {observed:?}")]
    ResetError {
        /// Text observed as the first answer line (empty if nothing was read)
        observed: String,
        /// Transport or framing failure during the handshake
        #[source]
        cause: Option<Box<DeviceError>>,
    },
    /// The first line echoed by the device was not the command written to it
    #[error("Write echo mismatch: sent {expected:?}, device echoed {received:?}")]
    EchoMismatchError {
        /// Command written to the device
        expected: String,
        /// First line the device sent back
        received: String,
    },
    /// The device sent nothing but the echo
    #[error("No payload received")]
    NoPayloadError,
    /// Underlying transport error
    #[error("IO error: {0}")]
    IOError(
        #[from]
        #[source]
        Arc<std::io::Error>,
    ),
    /// The transport could not be released
    #[error("Could not close device: {0}")]
    CloseError(#[source] Arc<std::io::Error>),
    /// The device has been closed
    #[error("Device is closed")]
    DeviceClosed,
    /// The device is in the error state and strict mode is on. Call reset first
    #[error("Device is in the error state, reset it before running commands")]
    DeviceNotReady,
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        Self::IOError(Arc::new(err))
    }
}

impl DeviceError {
    /// Returns true if the error was raised by the transport itself rather
    /// than by a malformed answer
    pub fn is_io_error(&self) -> bool {
        match self {
            DeviceError::IOError(_) | DeviceError::CloseError(_) => true,
            DeviceError::ConnectionError { cause, .. } | DeviceError::ResetError { cause, .. } => {
                cause.as_ref().is_some_and(|c| c.is_io_error())
            }
            _ => false,
        }
    }
}
