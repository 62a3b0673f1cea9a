//! Canonical command frame types.

/// Command payload representation used between the facade and dispatch layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Command name in uppercase canonical form (e.g. `SET`, `GET`).
    pub name: String,
    /// Raw byte arguments preserving wire-level payload.
    pub args: Vec<Vec<u8>>,
}

impl CommandFrame {
    /// Creates a command frame from a command name and argument list.
    #[must_use]
    pub fn new(name: impl Into<String>, args: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Canonical command reply representation.
///
/// The reply enum is kept protocol-neutral; encoding to RESP happens at the server boundary,
/// so handler logic never touches wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// `+OK` style replies.
    SimpleString(String),
    /// `$<len> ...` style binary-safe payload.
    BulkString(Vec<u8>),
    /// RESP null bulk string (`$-1`).
    Null,
    /// RESP integer reply (`:<n>`).
    Integer(i64),
    /// `-ERR ...` style error.
    Error(String),
}

impl CommandReply {
    /// Encodes the reply into RESP bytes for Redis-compatible clients.
    #[must_use]
    pub fn to_resp_bytes(&self) -> Vec<u8> {
        match self {
            Self::SimpleString(value) => {
                let mut output = Vec::with_capacity(value.len() + 3);
                output.extend_from_slice(b"+");
                output.extend_from_slice(value.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::BulkString(value) => {
                let mut output = Vec::new();
                output.extend_from_slice(format!("${}\r\n", value.len()).as_bytes());
                output.extend_from_slice(value);
                output.extend_from_slice(b"\r\n");
                output
            }
            Self::Null => b"$-1\r\n".to_vec(),
            Self::Integer(value) => format!(":{value}\r\n").into_bytes(),
            Self::Error(message) => {
                let mut output = Vec::with_capacity(message.len() + 6);
                output.extend_from_slice(b"-ERR ");
                output.extend_from_slice(message.as_bytes());
                output.extend_from_slice(b"\r\n");
                output
            }
        }
    }
}
