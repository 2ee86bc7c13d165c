
//! Module for the command channel exposed by ELM327 engines
//!
//! Currently, the following engines implement [ElmChannel]:
//! * [crate::device::Elm327Device] - Real device over a transport
//! * [crate::mock::MockDevice] - Canned responses, no transport

use std::sync::Arc;

use crate::{DeviceResult, result::RawResult};

/// Base trait for running raw commands on an ELM327.
///
/// This is the entire surface the payload decoding layer depends on.
pub trait ElmChannel: Send + Sync {
    /// Runs a raw AT or OBD command and waits for the answer.
    ///
    /// This function never fails directly, any failure is stored in the
    /// returned [RawResult]. Always check [RawResult::get_error] before using the outputs.
    ///
    /// ## Parameters
    /// * command - Command text, without line terminator. EG: `ATSP0` or `010C`
    fn run_command(&self, command: &str) -> RawResult;

    /// Releases the channel. Calling this more than once is allowed
    fn close(&self) -> DeviceResult<()>;
}

impl<T: ElmChannel + ?Sized> ElmChannel for Arc<T> {
    fn run_command(&self, command: &str) -> RawResult {
        (**self).run_command(command)
    }

    fn close(&self) -> DeviceResult<()> {
        (**self).close()
    }
}

impl<T: ElmChannel + ?Sized> ElmChannel for Box<T> {
    fn run_command(&self, command: &str) -> RawResult {
        (**self).run_command(command)
    }

    fn close(&self) -> DeviceResult<()> {
        (**self).close()
    }
}
