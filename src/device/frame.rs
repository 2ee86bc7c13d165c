//! ELM327 wire framing
//!
//! Outgoing: command text followed by `\r\n`.
//! Incoming: the echoed command, zero or more answer lines, all separated by `\r`,
//! terminated by the `>` prompt.

use std::time::Duration;

use crate::{DeviceError, DeviceResult, hardware::Transport};

/// Prompt the ELM327 prints once it is ready for the next command
pub const PROMPT: u8 = b'>';
/// Terminator appended to every command written
pub const LINE_END: &str = "\r\n";

const CHUNK_SIZE: usize = 128;

/// Builds the bytes written for a command
pub(crate) fn encode_command(command: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(command.len() + LINE_END.len());
    buf.extend_from_slice(command.as_bytes());
    buf.extend_from_slice(LINE_END.as_bytes());
    buf
}

/// Polls the transport every `poll_interval` until a chunk ends with the prompt.
///
/// The prompt is dropped from the returned buffer. The loop only ends on the prompt
/// or a transport error, so it is bounded by the read timeout of the transport.
pub(crate) fn read_until_prompt<T: Transport + ?Sized>(
    transport: &mut T,
    poll_interval: Duration,
) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(CHUNK_SIZE);
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        std::thread::sleep(poll_interval);
        let n = transport.read(&mut chunk)?;
        if n == 0 {
            continue;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[n - 1] == PROMPT {
            buffer.pop();
            return Ok(buffer);
        }
    }
}

/// Splits a prompt-terminated answer into its payload lines.
///
/// The first line must be the echo of `sent`. It is dropped, as are lines which
/// are empty once surrounding `\r` and spaces are trimmed.
pub(crate) fn parse_frame(raw: &[u8], sent: &str) -> DeviceResult<Vec<String>> {
    let text = String::from_utf8_lossy(raw);
    let mut parts = text.split('\r');
    let echo = parts.next().unwrap_or_default();
    if echo != sent {
        return Err(DeviceError::EchoMismatchError {
            expected: sent.to_string(),
            received: echo.to_string(),
        });
    }
    let outputs: Vec<String> = parts
        .map(|p| p.trim_matches(['\r', ' ']))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if outputs.is_empty() {
        return Err(DeviceError::NoPayloadError);
    }
    Ok(outputs)
}
