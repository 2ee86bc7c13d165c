//! ELM327 device engine
//!
//! [Elm327Device] owns the transport behind a single lock, so any number of threads
//! can share one device (EG: via [std::sync::Arc]) while exactly one command is on the
//! wire at any time. Callers queue on the lock, there is no other ordering guarantee.
//!
//! Nothing here can be cancelled. A command runs until the prompt arrives or the
//! transport reports an error, which for a serial port means the read timeout elapsed.
//!
//! WARNING: Do not turn echo off (`ATE0`) through this engine. The echo is how the engine
//! checks that the answer it reads belongs to the command it sent.

pub mod frame;

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use crate::{
    DeviceError, DeviceResult,
    channel::ElmChannel,
    hardware::Transport,
    result::{RawResult, ResultOrigin},
};

/// Command which resets the ELM327 to factory defaults
pub const RESET_COMMAND: &str = "ATZ";
/// Prefix of the identification line printed after a reset
pub const IDENTIFICATION_PREFIX: &str = "ELM327";

/// Reliability of a device, updated by every command.
///
/// [ReliabilityState::Busy] is only ever set while the device lock is held,
/// so it is never observed from outside.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReliabilityState {
    /// Last operation succeeded
    Ready,
    /// Operation in flight
    Busy,
    /// Last operation failed
    Error,
}

/// Options used when connecting to a device
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceOptions {
    /// Serial baud rate. ELM327 factory default is 38400
    pub baud_rate: u32,
    /// Maximum time a single transport read may block for
    pub read_timeout: Duration,
    /// Interval between two reads while waiting for the prompt
    pub poll_interval: Duration,
    /// If true, commands are refused with [DeviceError::DeviceNotReady] while the device is
    /// in [ReliabilityState::Error], until [Elm327Device::reset] succeeds.
    ///
    /// Off by default: a failed command only marks the device, the next command still runs.
    pub strict_state: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            baud_rate: 38400,
            read_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(10),
            strict_state: false,
        }
    }
}

struct DeviceInner {
    transport: Option<Box<dyn Transport>>,
    state: ReliabilityState,
    input: String,
    outputs: Vec<String>,
}

/// One operation on the wire. Holds the device lock for its whole lifetime.
///
/// Dropping it settles the reliability state: Ready if the operation was marked
/// successful, otherwise the transport is flushed and the state becomes Error.
/// This runs on every exit path, including panics.
struct Operation<'a> {
    inner: MutexGuard<'a, DeviceInner>,
    poll_interval: Duration,
    succeeded: bool,
}

impl<'a> Operation<'a> {
    fn begin(mut inner: MutexGuard<'a, DeviceInner>, poll_interval: Duration) -> Self {
        inner.state = ReliabilityState::Busy;
        Self {
            inner,
            poll_interval,
            succeeded: false,
        }
    }

    fn finish<T>(mut self, res: DeviceResult<T>) -> DeviceResult<T> {
        self.succeeded = res.is_ok();
        res
    }

    fn transport(&mut self) -> DeviceResult<&mut Box<dyn Transport>> {
        self.inner
            .transport
            .as_mut()
            .ok_or(DeviceError::DeviceClosed)
    }

    fn flush(&mut self) -> DeviceResult<()> {
        self.transport()?.flush()?;
        Ok(())
    }

    fn write(&mut self, command: &str) -> DeviceResult<()> {
        self.inner.input.clear();
        log::debug!("ELM327 Tx: {command:?}");
        self.transport()?.write(&frame::encode_command(command))?;
        self.inner.input = command.to_string();
        Ok(())
    }

    fn read(&mut self) -> DeviceResult<&[String]> {
        let poll_interval = self.poll_interval;
        let inner = &mut *self.inner;
        inner.outputs.clear();
        let transport = inner.transport.as_mut().ok_or(DeviceError::DeviceClosed)?;
        let raw = frame::read_until_prompt(transport, poll_interval)?;
        inner.outputs = frame::parse_frame(&raw, &inner.input)?;
        log::debug!("ELM327 Rx: {:?}", inner.outputs);
        Ok(&inner.outputs)
    }

    fn handshake(&mut self) -> DeviceResult<()> {
        let failed = |e: DeviceError| DeviceError::ResetError {
            observed: String::new(),
            cause: Some(Box::new(e)),
        };
        self.flush().map_err(failed)?;
        self.write(RESET_COMMAND).map_err(failed)?;
        let ident = match self.read() {
            Ok(lines) => lines.first().cloned().unwrap_or_default(),
            Err(e) => return Err(failed(e)),
        };
        if !ident.starts_with(IDENTIFICATION_PREFIX) {
            return Err(DeviceError::ResetError {
                observed: ident,
                cause: None,
            });
        }
        log::info!("Device identified itself as {ident:?}");
        Ok(())
    }
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        if self.succeeded {
            self.inner.state = ReliabilityState::Ready;
            return;
        }
        self.inner.outputs.clear();
        if let Some(transport) = self.inner.transport.as_mut() {
            if let Err(e) = transport.flush() {
                log::error!("Could not flush transport after failure: {e}");
            }
        }
        self.inner.state = ReliabilityState::Error;
        log::debug!("Device state is now {}", ReliabilityState::Error);
    }
}

/// ELM327 device engine over a [Transport]
pub struct Elm327Device {
    name: String,
    options: DeviceOptions,
    inner: Mutex<DeviceInner>,
}

impl Debug for Elm327Device {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "Elm327Device {}", self.name)
    }
}

impl Elm327Device {
    /// Connects to the ELM327 at the serial device `path`, then resets it.
    ///
    /// The reset blocks for the full `ATZ` round trip, which is at least 800ms on real chips.
    /// It makes sure no custom settings are left on the device that this engine
    /// could not handle.
    #[cfg(feature = "serial")]
    pub fn connect(path: &str, options: DeviceOptions) -> DeviceResult<Self> {
        let port = crate::hardware::serial::open_port(path, (&options).into()).map_err(|e| {
            DeviceError::ConnectionError {
                path: path.to_string(),
                desc: e.to_string(),
                cause: None,
            }
        })?;
        Self::with_transport(path, port, options)
    }

    /// Creates a device over an already opened transport, then resets it.
    ///
    /// ## Parameters
    /// * name - Name of the transport, used in logs and errors
    /// * transport - Byte stream connected to the ELM327
    /// * options - Device options. Baud rate and read timeout are the transport's concern
    pub fn with_transport<T: Transport + 'static>(
        name: &str,
        transport: T,
        options: DeviceOptions,
    ) -> DeviceResult<Self> {
        let dev = Self {
            name: name.to_string(),
            options,
            inner: Mutex::new(DeviceInner {
                transport: Some(Box::new(transport)),
                state: ReliabilityState::Ready,
                input: String::new(),
                outputs: Vec::new(),
            }),
        };
        if let Err(e) = dev.reset() {
            return Err(DeviceError::ConnectionError {
                path: name.to_string(),
                desc: "reset handshake failed".into(),
                cause: Some(Box::new(e)),
            });
        }
        log::info!("Connected to ELM327 at {name}");
        Ok(dev)
    }

    fn lock(&self) -> MutexGuard<'_, DeviceInner> {
        // Every mutation under the lock leaves the handle consistent, so a poisoned lock is still usable
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restarts the device, resets all its settings to factory defaults and makes
    /// sure it actually is an ELM327 we are talking to.
    ///
    /// If this keeps failing, power cycle the device.
    pub fn reset(&self) -> DeviceResult<()> {
        let inner = self.lock();
        if inner.transport.is_none() {
            return Err(DeviceError::ResetError {
                observed: String::new(),
                cause: Some(Box::new(DeviceError::DeviceClosed)),
            });
        }
        let mut op = Operation::begin(inner, self.options.poll_interval);
        let res = op.handshake();
        if let Err(e) = &res {
            log::warn!("Reset of {} failed: {e}", self.name);
        }
        op.finish(res)
    }

    /// Runs the given AT or OBD command by sending it to the device and waiting for the
    /// answer. There are no restrictions on what commands can be run, so be careful.
    ///
    /// This never fails directly, check [RawResult::get_error].
    ///
    /// For more information about AT commands, see:
    /// * <https://en.wikipedia.org/wiki/Hayes_command_set>
    /// * <https://en.wikipedia.org/wiki/OBD-II_PIDs>
    pub fn run_command(&self, command: &str) -> RawResult {
        let start_total = Instant::now();
        let mut write_time = Duration::ZERO;
        let mut read_time = Duration::ZERO;

        let res = self.exchange(command, &mut write_time, &mut read_time);
        let (outputs, error) = match res {
            Ok(outputs) => (outputs, None),
            Err(e) => {
                log::warn!("Command {command:?} on {} failed: {e}", self.name);
                (Vec::new(), Some(e))
            }
        };
        RawResult::new(
            command.to_string(),
            outputs,
            error,
            write_time,
            read_time,
            start_total.elapsed(),
            ResultOrigin::Device,
        )
    }

    fn exchange(
        &self,
        command: &str,
        write_time: &mut Duration,
        read_time: &mut Duration,
    ) -> DeviceResult<Vec<String>> {
        let inner = self.lock();
        if inner.transport.is_none() {
            return Err(DeviceError::DeviceClosed);
        }
        if self.options.strict_state && inner.state == ReliabilityState::Error {
            return Err(DeviceError::DeviceNotReady);
        }
        let mut op = Operation::begin(inner, self.options.poll_interval);

        let start_write = Instant::now();
        let written = op.write(command);
        *write_time = start_write.elapsed();
        if let Err(e) = written {
            return op.finish(Err(e));
        }

        let start_read = Instant::now();
        let res = op.read().map(<[String]>::to_vec);
        *read_time = start_read.elapsed();
        op.finish(res)
    }

    /// Releases the transport. Calling this again after it succeeded does nothing
    pub fn close(&self) -> DeviceResult<()> {
        let mut inner = self.lock();
        match inner.transport.take() {
            Some(mut transport) => {
                let res = transport.close();
                drop(transport);
                match res {
                    Ok(()) => {
                        log::info!("Closed ELM327 at {}", self.name);
                        Ok(())
                    }
                    Err(e) => Err(DeviceError::CloseError(Arc::new(e))),
                }
            }
            None => Ok(()),
        }
    }

    /// Current reliability state
    pub fn state(&self) -> ReliabilityState {
        self.lock().state
    }

    /// Last command successfully written to the device
    pub fn last_input(&self) -> String {
        self.lock().input.clone()
    }

    /// Answer lines of the last successful command
    pub fn last_outputs(&self) -> Vec<String> {
        self.lock().outputs.clone()
    }

    /// Returns true until [Elm327Device::close] is called
    pub fn is_open(&self) -> bool {
        self.lock().transport.is_some()
    }

    /// Options the device was created with
    pub fn get_options(&self) -> &DeviceOptions {
        &self.options
    }
}

impl Drop for Elm327Device {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Could not close {} on drop: {e}", self.name);
        }
    }
}

impl ElmChannel for Elm327Device {
    fn run_command(&self, command: &str) -> RawResult {
        Elm327Device::run_command(self, command)
    }

    fn close(&self) -> DeviceResult<()> {
        Elm327Device::close(self)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::hardware::simulation::{SimulatedElm327, SimulatedFault};

    fn fast_options() -> DeviceOptions {
        DeviceOptions {
            poll_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn open(sim: &SimulatedElm327) -> Elm327Device {
        Elm327Device::with_transport("sim", sim.clone(), fast_options()).unwrap()
    }

    #[test]
    fn state_names() {
        let names: Vec<String> = ReliabilityState::iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["Ready", "Busy", "Error"]);
    }

    #[test]
    fn connect_resets_device() {
        let sim = SimulatedElm327::new();
        let dev = open(&sim);
        assert_eq!(sim.written(), vec!["ATZ".to_string()]);
        assert_eq!(sim.flush_count(), 1);
        assert_eq!(dev.state(), ReliabilityState::Ready);
        assert_eq!(dev.last_outputs(), vec!["ELM327 v1.5".to_string()]);
    }

    #[test]
    fn connect_rejects_non_elm_device() {
        let sim = SimulatedElm327::new();
        sim.set_identification("STN1110 v4.0");
        match Elm327Device::with_transport("sim", sim.clone(), fast_options()) {
            Err(DeviceError::ConnectionError { path, cause: Some(cause), .. }) => {
                assert_eq!(path, "sim");
                match *cause {
                    DeviceError::ResetError { observed, cause: None } => {
                        assert_eq!(observed, "STN1110 v4.0")
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
        // Flushed before ATZ, then again after the failure
        assert_eq!(sim.flush_count(), 2);
    }

    #[test]
    fn reset_failure_on_transport_error() {
        let sim = SimulatedElm327::new();
        let dev = open(&sim);
        sim.inject_fault(SimulatedFault::ReadError);
        match dev.reset() {
            Err(DeviceError::ResetError { cause: Some(cause), .. }) => {
                assert!(matches!(*cause, DeviceError::IOError(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(dev.state(), ReliabilityState::Error);
        dev.reset().unwrap();
        assert_eq!(dev.state(), ReliabilityState::Ready);
    }

    #[test]
    fn write_failure_is_reported_in_result() {
        let sim = SimulatedElm327::new();
        let dev = open(&sim);
        sim.inject_fault(SimulatedFault::WriteError);
        let res = dev.run_command("0100");
        assert!(matches!(res.get_error(), Some(DeviceError::IOError(_))));
        assert!(res.get_outputs().is_empty());
        assert_eq!(res.get_read_time(), Duration::ZERO);
        assert_eq!(dev.state(), ReliabilityState::Error);
        assert_eq!(dev.last_input(), "");
    }

    #[test]
    fn failure_flushes_transport() {
        let sim = SimulatedElm327::new();
        let dev = open(&sim);
        let before = sim.flush_count();
        sim.inject_fault(SimulatedFault::EmptyPayload);
        let res = dev.run_command("ATRV");
        assert!(matches!(res.get_error(), Some(DeviceError::NoPayloadError)));
        assert_eq!(sim.flush_count(), before + 1);
    }

    #[test]
    fn permissive_after_error_by_default() {
        let sim = SimulatedElm327::new();
        sim.add_response("ATRV", &["12.6V"]);
        let dev = open(&sim);
        sim.inject_fault(SimulatedFault::ReadError);
        assert!(dev.run_command("ATRV").failed());
        assert_eq!(dev.state(), ReliabilityState::Error);
        let res = dev.run_command("ATRV");
        assert!(!res.failed());
        assert_eq!(res.get_outputs().to_vec(), vec!["12.6V".to_string()]);
        assert_eq!(dev.state(), ReliabilityState::Ready);
    }

    #[test]
    fn strict_mode_refuses_until_reset() {
        let sim = SimulatedElm327::new();
        sim.add_response("ATRV", &["12.6V"]);
        let opts = DeviceOptions {
            strict_state: true,
            ..fast_options()
        };
        let dev = Elm327Device::with_transport("sim", sim.clone(), opts).unwrap();
        sim.inject_fault(SimulatedFault::WrongEcho("ATR".into()));
        assert!(dev.run_command("ATRV").failed());

        let written = sim.written().len();
        let res = dev.run_command("ATRV");
        assert!(matches!(res.get_error(), Some(DeviceError::DeviceNotReady)));
        // Refused without touching the wire
        assert_eq!(sim.written().len(), written);

        dev.reset().unwrap();
        assert!(!dev.run_command("ATRV").failed());
    }

    #[test]
    fn close_is_idempotent() {
        let sim = SimulatedElm327::new();
        let dev = open(&sim);
        dev.close().unwrap();
        assert!(sim.is_closed());
        assert!(!dev.is_open());
        dev.close().unwrap();
        let res = dev.run_command("ATI");
        assert!(matches!(res.get_error(), Some(DeviceError::DeviceClosed)));
        assert!(matches!(
            dev.reset(),
            Err(DeviceError::ResetError { cause: Some(_), .. })
        ));
    }

    #[test]
    fn drop_releases_transport() {
        let sim = SimulatedElm327::new();
        drop(open(&sim));
        assert!(sim.is_closed());
    }
}
