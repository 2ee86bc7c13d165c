//! Simulation hardware for testing ELM327 engines without a serial port
//!
//! [SimulatedElm327] behaves like an ELM327 on the wire: it echoes every command,
//! answers from a request/response table and terminates every answer with the `>` prompt.
//! Faults can be queued to exercise the error paths of the engine.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use super::Transport;

/// Identification line sent after `ATZ` by default
pub const DEFAULT_IDENTIFICATION: &str = "ELM327 v1.5";

/// Fault injected into the next command handled by a [SimulatedElm327]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedFault {
    /// Echo this text instead of the command
    WrongEcho(String),
    /// Echo the command but send no answer lines
    EmptyPayload,
    /// Fail the write of the next command
    WriteError,
    /// Accept the next command, then fail the read
    ReadError,
}

#[derive(Debug, Default)]
struct SimState {
    responses: HashMap<String, Vec<String>>,
    identification: String,
    faults: VecDeque<SimulatedFault>,
    rx_queue: VecDeque<u8>,
    read_error: bool,
    chunk_size: usize,
    latency: Duration,
    written: Vec<String>,
    flush_count: usize,
    closed: bool,
}

#[derive(Debug, Clone)]
/// In-memory ELM327. Clones share the same state, so a test can keep a clone
/// to inspect traffic and inject faults after handing one to the engine
pub struct SimulatedElm327 {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedElm327 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedElm327 {
    /// Creates a simulated ELM327 which identifies itself as [DEFAULT_IDENTIFICATION]
    pub fn new() -> Self {
        let state = SimState {
            identification: DEFAULT_IDENTIFICATION.into(),
            chunk_size: 128,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the answer lines for a command
    pub fn add_response(&self, req: &str, resp: &[&str]) {
        self.lock()
            .responses
            .insert(req.to_string(), resp.iter().map(|s| s.to_string()).collect());
    }

    /// Clears the response table and any pending faults
    pub fn clear_map(&self) {
        let mut state = self.lock();
        state.responses.clear();
        state.faults.clear();
    }

    /// Sets the line sent after `ATZ`
    pub fn set_identification(&self, ident: &str) {
        self.lock().identification = ident.to_string();
    }

    /// Queues a fault. Faults are consumed one per written command, in order
    pub fn inject_fault(&self, fault: SimulatedFault) {
        self.lock().faults.push_back(fault);
    }

    /// Limits how many bytes a single read returns, to exercise the polling loop
    pub fn set_chunk_size(&self, size: usize) {
        self.lock().chunk_size = size.max(1);
    }

    /// Delay applied to every write, simulating the time the chip takes to answer
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Every command written so far, without line terminator
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Number of times the engine flushed the transport
    pub fn flush_count(&self) -> usize {
        self.lock().flush_count
    }

    /// Returns true once the engine released the transport
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn answer_for(state: &SimState, command: &str) -> Vec<String> {
        if command.eq_ignore_ascii_case("ATZ") {
            // The chip prints a blank line before its banner on reset
            return vec![String::new(), state.identification.clone()];
        }
        state
            .responses
            .get(command)
            .cloned()
            .unwrap_or_else(|| vec!["?".to_string()])
    }
}

fn io_error(kind: std::io::ErrorKind, desc: &str) -> std::io::Error {
    std::io::Error::new(kind, desc.to_string())
}

impl Transport for SimulatedElm327 {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let mut state = self.lock();
        if state.closed {
            return Err(io_error(std::io::ErrorKind::NotConnected, "simulated device closed"));
        }
        let fault = state.faults.pop_front();
        if fault == Some(SimulatedFault::WriteError) {
            return Err(io_error(std::io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        let command = String::from_utf8_lossy(buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        state.written.push(command.clone());

        let (echo, lines) = match fault {
            Some(SimulatedFault::WrongEcho(echo)) => (echo, Self::answer_for(&state, &command)),
            Some(SimulatedFault::EmptyPayload) => (command, Vec::new()),
            Some(SimulatedFault::ReadError) => {
                state.read_error = true;
                return Ok(());
            }
            _ => {
                let lines = Self::answer_for(&state, &command);
                (command, lines)
            }
        };

        let mut frame = echo;
        frame.push('\r');
        for line in lines {
            frame.push_str(&line);
            frame.push('\r');
        }
        frame.push_str("\r>");
        state.rx_queue.extend(frame.into_bytes());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.lock();
        if state.read_error {
            state.read_error = false;
            return Err(io_error(std::io::ErrorKind::Other, "simulated read failure"));
        }
        if state.rx_queue.is_empty() {
            return Err(io_error(std::io::ErrorKind::TimedOut, "simulated read timeout"));
        }
        let n = buf.len().min(state.chunk_size).min(state.rx_queue.len());
        for (dst, src) in buf.iter_mut().zip(state.rx_queue.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut state = self.lock();
        state.rx_queue.clear();
        state.read_error = false;
        state.flush_count += 1;
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}
