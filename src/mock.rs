//! Mock ELM327 engine, for testing the layers above without hardware
//!
//! [MockDevice] answers a fixed set of commands from static tables. It has no state,
//! no latency and never fails.

use crate::{DeviceResult, channel::ElmChannel, result::RawResult};

/// Answer to anything the mock does not know
pub const NOT_SUPPORTED: &str = "NOT SUPPORTED";
/// Identification returned for `AT@1`
pub const MOCK_IDENTIFICATION: &str = "OBDII by elm329@gmail.com";

const SERVICE_01_PREFIX: &str = "01";

/// Exact AT commands known to the mock
const AT_RESPONSES: &[(&str, &[&str])] = &[("ATSP0", &["OK"]), ("AT@1", &[MOCK_IDENTIFICATION])];

/// Service 01 PIDs known to the mock, keyed by the upper case PID code
const SERVICE_01_RESPONSES: &[(&str, &[&str])] = &[
    // PIDs supported 01-20: 05, 06, 0C
    ("00", &["41 00 0C 10 00 00"]),
    // PIDs supported 21-40, 41-60, 61-80, 81-A0
    ("20", &["41 20 00 00 00 00"]),
    ("40", &["41 40 00 00 00 00"]),
    ("60", &["41 60 00 00 00 00"]),
    ("80", &["41 80 00 00 00 00"]),
    // Monitor status since DTCs cleared
    ("01", &["41 01 FF 00 00 00"]),
    // Calculated engine load
    ("04", &["41 04 50"]),
    // Coolant temperature
    ("05", &["41 05 4F"]),
    // Short term fuel trim, bank 1
    ("06", &["41 06 02"]),
    // Fuel pressure
    ("0A", &["41 0A 50"]),
    // Engine RPM
    ("0C", &["41 0C 03 00"]),
    // Vehicle speed
    ("0D", &["41 0D 0F"]),
    // Intake air temperature
    ("0F", &["41 0F 3C"]),
    // Fuel tank level
    ("2F", &["41 2F 6B"]),
    // Distance since codes cleared
    ("31", &["41 31 02 0C"]),
];

fn lookup(table: &[(&str, &'static [&'static str])], key: &str) -> Option<Vec<String>> {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, lines)| lines.iter().map(|l| l.to_string()).collect())
}

fn not_supported() -> Vec<String> {
    vec![NOT_SUPPORTED.to_string()]
}

fn service_01_outputs(sub_command: &str) -> Vec<String> {
    match sub_command.get(..2) {
        Some(pid) => lookup(SERVICE_01_RESPONSES, &pid.to_ascii_uppercase()).unwrap_or_else(not_supported),
        None => not_supported(),
    }
}

/// Canned outputs for a command
pub fn mock_outputs(command: &str) -> Vec<String> {
    if let Some(outputs) = lookup(AT_RESPONSES, command) {
        return outputs;
    }
    match command.strip_prefix(SERVICE_01_PREFIX) {
        Some(sub_command) => service_01_outputs(sub_command),
        None => not_supported(),
    }
}

/// Mocked ELM327 engine
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockDevice {}

impl MockDevice {
    /// Creates a mock device
    pub fn new() -> Self {
        Self {}
    }
}

impl ElmChannel for MockDevice {
    fn run_command(&self, command: &str) -> RawResult {
        log::debug!("Mocking command {command:?}");
        RawResult::mocked(command, mock_outputs(command))
    }

    fn close(&self) -> DeviceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultOrigin;

    fn run(cmd: &str) -> Vec<String> {
        let res = MockDevice::new().run_command(cmd);
        assert!(res.get_error().is_none());
        assert_eq!(res.get_input(), cmd);
        assert_eq!(res.get_origin(), ResultOrigin::Mock);
        res.get_outputs().to_vec()
    }

    #[test]
    fn at_commands() {
        assert_eq!(run("ATSP0"), vec!["OK"]);
        assert_eq!(run("AT@1"), vec!["OBDII by elm329@gmail.com"]);
        // Exact match only
        assert_eq!(run("atsp0"), vec![NOT_SUPPORTED]);
    }

    #[test]
    fn service_01_pids() {
        assert_eq!(run("010C"), vec!["41 0C 03 00"]);
        assert_eq!(run("0105"), vec!["41 05 4F"]);
        assert_eq!(run("0100"), vec!["41 00 0C 10 00 00"]);
        assert_eq!(run("0180"), vec!["41 80 00 00 00 00"]);
    }

    #[test]
    fn pid_is_case_insensitive() {
        assert_eq!(run("010c"), vec!["41 0C 03 00"]);
        assert_eq!(run("012f"), vec!["41 2F 6B"]);
    }

    #[test]
    fn extra_characters_after_pid_are_ignored() {
        assert_eq!(run("010C1"), vec!["41 0C 03 00"]);
    }

    #[test]
    fn unknown_commands() {
        assert_eq!(run("01FF"), vec![NOT_SUPPORTED]);
        assert_eq!(run("01"), vec![NOT_SUPPORTED]);
        assert_eq!(run("010"), vec![NOT_SUPPORTED]);
        assert_eq!(run("0902"), vec![NOT_SUPPORTED]);
        assert_eq!(run(""), vec![NOT_SUPPORTED]);
    }

    #[test]
    fn no_timings_and_close_succeeds() {
        let dev = MockDevice::new();
        let res = dev.run_command("010C");
        assert!(res.get_total_time().is_zero());
        assert!(dev.close().is_ok());
    }
}
