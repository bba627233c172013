//! Error taxonomy for the interpreter and program loader

use thiserror::Error;

use crate::value::Word;

/// Result type used throughout the engine
pub type Result<T> = std::result::Result<T, VmError>;

/// Fatal conditions that end a processor run.
///
/// None of these are retried: the owning interpreter loop stops at the first one
/// and the error becomes the run's terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// The low two digits of the instruction word name no known operation.
    #[error("unknown opcode {opcode} at ip {ip}")]
    UnknownOpcode { opcode: Word, ip: Word },
    /// Immediate mode on a write target, or a mode digit outside 0..=2.
    #[error("invalid addressing mode {mode} at ip {ip}")]
    InvalidAddressingMode { mode: Word, ip: Word },
    /// Input or output executed against an absent or closed channel.
    #[error("channel not connected")]
    ChannelNotConnected,
    /// A computed address (direct, relative or jump target) below zero.
    #[error("negative address {0}")]
    NegativeAddress(Word),
    /// A list-backed input ran out of values.
    #[error("input exhausted")]
    InputExhausted,
    /// Add or multiply left the 64-bit word range.
    #[error("arithmetic overflow at ip {ip}")]
    Overflow { ip: Word },
    #[error("processor {0} panicked")]
    ProcessorPanicked(String),
    #[error("relay {0} panicked")]
    RelayPanicked(String),
}

/// Errors raised while loading a program listing
#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid word {token:?} at index {index}")]
    InvalidWord { index: usize, token: String },
    #[error("program listing is empty")]
    Empty,
}
