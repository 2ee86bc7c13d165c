//! Result of running one raw command against an ELM327 engine

use std::{
    fmt::{Display, Formatter},
    time::Duration,
};

use crate::{DeviceError, DeviceResult};

const BANNER: &str = "=======================================";

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Which engine produced a [RawResult]
pub enum ResultOrigin {
    /// Real ELM327 device over a transport
    Device,
    /// [crate::mock::MockDevice]
    Mock,
}

#[derive(Debug, Clone)]
/// Raw text output of running a command, together with what was sent,
/// what went wrong (if anything) and how long it took.
///
/// A result is never modified after the engine hands it out. If [RawResult::get_error]
/// returns something, the outputs must be ignored.
pub struct RawResult {
    input: String,
    outputs: Vec<String>,
    error: Option<DeviceError>,
    write_time: Duration,
    read_time: Duration,
    total_time: Duration,
    origin: ResultOrigin,
}

impl RawResult {
    pub(crate) fn new(
        input: String,
        outputs: Vec<String>,
        error: Option<DeviceError>,
        write_time: Duration,
        read_time: Duration,
        total_time: Duration,
        origin: ResultOrigin,
    ) -> Self {
        Self {
            input,
            outputs,
            error,
            write_time,
            read_time,
            total_time,
            origin,
        }
    }

    /// Result of a mocked command. Never failed, takes no time
    pub(crate) fn mocked(input: &str, outputs: Vec<String>) -> Self {
        Self::new(
            input.to_string(),
            outputs,
            None,
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
            ResultOrigin::Mock,
        )
    }

    /// The exact command that was sent
    pub fn get_input(&self) -> &str {
        &self.input
    }

    /// Answer lines, echo and prompt removed. Empty if the command failed
    pub fn get_outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Error of the command, if it failed
    pub fn get_error(&self) -> Option<&DeviceError> {
        self.error.as_ref()
    }

    /// Returns true if the command failed
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    /// Time spent writing the command
    pub fn get_write_time(&self) -> Duration {
        self.write_time
    }

    /// Time spent waiting for and reading the answer
    pub fn get_read_time(&self) -> Duration {
        self.read_time
    }

    /// Total time of the call, including waiting for the device lock
    pub fn get_total_time(&self) -> Duration {
        self.total_time
    }

    /// Engine which produced this result
    pub fn get_origin(&self) -> ResultOrigin {
        self.origin
    }

    /// Converts the result into its output lines, or the error if the command failed
    pub fn into_outputs(self) -> DeviceResult<Vec<String>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.outputs),
        }
    }

    /// Formats an overview of which command was run and how long it took
    pub fn format_overview(&self) -> String {
        match self.origin {
            ResultOrigin::Device => format!(
                "{BANNER}\n Ran command \"{}\" in {:?}\n Spent {:?} writing\n Spent {:?} reading\n{BANNER}",
                self.input, self.total_time, self.write_time, self.read_time
            ),
            ResultOrigin::Mock => format!("{BANNER}\n Mocked command \"{}\"\n{BANNER}", self.input),
        }
    }
}

impl Display for RawResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_overview())
    }
}
