//! Incremental RESP 2 request parser.
//!
//! Each TCP connection owns one [`ConnectionState`]. The ingress loop feeds raw socket chunks
//! in and pops complete commands out; partial frames stay buffered until more bytes arrive.
//! Both multibulk (`*N`) and inline (whitespace-separated line) requests are accepted.

use tred_common::error::{TredError, TredResult};

use crate::protocol::ParsedCommand;

/// Upper bound for one bulk argument payload (512 MiB, Redis-compatible).
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// Upper bound for the argument count of one multibulk request.
const MAX_MULTIBULK_ARGS: i64 = 1024 * 1024;

/// Per-connection parser state used by the ingress read path.
#[derive(Debug, Default)]
pub struct ConnectionState {
    buffer: Vec<u8>,
}

/// Outcome of one frame scan over the buffered bytes.
enum FrameStep {
    /// Not enough buffered bytes to finish the frame.
    Incomplete,
    /// A complete frame with no arguments (empty inline line, `*0`); consume and rescan.
    Empty(usize),
    /// A complete request frame and the byte count it occupies.
    Command(usize, ParsedCommand),
}

impl ConnectionState {
    /// Creates an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw socket bytes to the parse buffer.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet consumed by a complete command.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Pops the next complete command, if the buffer holds one.
    ///
    /// Returns `Ok(None)` when the buffered bytes end mid-frame; the partial frame is kept for
    /// the next `feed_bytes` round.
    ///
    /// # Errors
    ///
    /// Returns `TredError::Protocol` when the buffered bytes violate RESP framing. The buffer is
    /// left as-is; callers are expected to drop the connection.
    pub fn try_pop_command(&mut self) -> TredResult<Option<ParsedCommand>> {
        loop {
            let Some(first) = self.buffer.first().copied() else {
                return Ok(None);
            };

            let step = if first == b'*' {
                scan_multibulk(&self.buffer)?
            } else {
                scan_inline(&self.buffer)
            };

            match step {
                FrameStep::Incomplete => return Ok(None),
                FrameStep::Empty(consumed) => {
                    let _ = self.buffer.drain(..consumed);
                }
                FrameStep::Command(consumed, command) => {
                    let _ = self.buffer.drain(..consumed);
                    return Ok(Some(command));
                }
            }
        }
    }
}

/// Scans one `*N\r\n$len\r\n<payload>\r\n...` frame from the buffer head.
fn scan_multibulk(buffer: &[u8]) -> TredResult<FrameStep> {
    let mut cursor = FrameCursor::new(buffer);
    let Some(header) = cursor.read_line() else {
        return Ok(FrameStep::Incomplete);
    };

    let Some(arg_count) = parse_decimal(&header[1..]) else {
        return Err(frame_error("invalid multibulk length"));
    };
    if arg_count > MAX_MULTIBULK_ARGS {
        return Err(frame_error("multibulk length exceeds limit"));
    }
    if arg_count <= 0 {
        // "*0" and the null array carry no command; skip the frame.
        return Ok(FrameStep::Empty(cursor.consumed()));
    }

    let mut args = Vec::with_capacity(usize::try_from(arg_count).unwrap_or(0));
    for _ in 0..arg_count {
        let Some(length_line) = cursor.read_line() else {
            return Ok(FrameStep::Incomplete);
        };
        if length_line.first() != Some(&b'$') {
            return Err(frame_error("expected bulk length marker"));
        }
        let Some(bulk_len) = parse_decimal(&length_line[1..]) else {
            return Err(frame_error("invalid bulk length"));
        };
        let Ok(bulk_len) = usize::try_from(bulk_len) else {
            return Err(frame_error("invalid bulk length"));
        };
        if bulk_len > MAX_BULK_LEN {
            return Err(frame_error("bulk length exceeds limit"));
        }

        let Some(payload) = cursor.read_bytes(bulk_len) else {
            return Ok(FrameStep::Incomplete);
        };
        let payload = payload.to_vec();
        match cursor.read_bytes(2) {
            None => return Ok(FrameStep::Incomplete),
            Some(b"\r\n") => {}
            Some(_) => return Err(frame_error("bulk payload is missing its terminator")),
        }
        args.push(payload);
    }

    Ok(build_command(cursor.consumed(), args))
}

/// Scans one inline request: a single line of whitespace-separated arguments.
fn scan_inline(buffer: &[u8]) -> FrameStep {
    let Some(newline_index) = buffer.iter().position(|byte| *byte == b'\n') else {
        return FrameStep::Incomplete;
    };

    let mut line = &buffer[..newline_index];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }

    let args = line
        .split(|byte| byte.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
        .map(<[u8]>::to_vec)
        .collect::<Vec<_>>();

    build_command(newline_index + 1, args)
}

fn build_command(consumed: usize, mut args: Vec<Vec<u8>>) -> FrameStep {
    if args.is_empty() {
        return FrameStep::Empty(consumed);
    }
    let name_bytes = args.remove(0);
    let name = String::from_utf8_lossy(&name_bytes).to_ascii_uppercase();
    FrameStep::Command(consumed, ParsedCommand { name, args })
}

fn parse_decimal(payload: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(payload).ok()?;
    text.parse::<i64>().ok()
}

fn frame_error(message: &str) -> TredError {
    TredError::Protocol(message.to_owned())
}

/// Read-only scanner over buffered bytes that tracks how much a frame consumes.
struct FrameCursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> FrameCursor<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    fn consumed(&self) -> usize {
        self.offset
    }

    /// Reads up to and including one CRLF; returns the line without the terminator.
    fn read_line(&mut self) -> Option<&'a [u8]> {
        let remaining = &self.buffer[self.offset..];
        let newline_index = remaining.iter().position(|byte| *byte == b'\n')?;
        if newline_index == 0 || remaining[newline_index - 1] != b'\r' {
            // Telnet-style clients terminate with a bare LF; accept both terminators.
            let line = &remaining[..newline_index];
            self.offset += newline_index + 1;
            return Some(line);
        }
        let line = &remaining[..newline_index - 1];
        self.offset += newline_index + 1;
        Some(line)
    }

    fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let remaining = &self.buffer[self.offset..];
        if remaining.len() < len {
            return None;
        }
        let bytes = &remaining[..len];
        self.offset += len;
        Some(bytes)
    }
}
