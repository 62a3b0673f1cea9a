//! Protocol-level command containers.

/// Protocol-decoded command representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Command name in canonical uppercase form.
    pub name: String,
    /// Raw argument payload.
    pub args: Vec<Vec<u8>>,
}
