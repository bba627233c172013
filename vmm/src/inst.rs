//! Instruction decoding
//!
//! An instruction word packs the opcode into its two least significant decimal
//! digits; every further digit, least significant first, is the addressing mode
//! of parameter 1, 2, 3. Missing digits mean position mode.

use crate::error::VmError;
use crate::value::Word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Add,
    Mul,
    Input,
    Output,
    JumpIfTrue,
    JumpIfFalse,
    LessThan,
    Equals,
    AdjustBase,
    Halt,
}

impl Opcode {
    /// Instruction length in words, opcode word included
    pub fn width(self) -> usize {
        match self {
            Opcode::Add | Opcode::Mul | Opcode::LessThan | Opcode::Equals => 4,
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => 3,
            Opcode::Input | Opcode::Output | Opcode::AdjustBase => 2,
            Opcode::Halt => 1,
        }
    }

    pub fn code(self) -> Word {
        match self {
            Opcode::Add => 1,
            Opcode::Mul => 2,
            Opcode::Input => 3,
            Opcode::Output => 4,
            Opcode::JumpIfTrue => 5,
            Opcode::JumpIfFalse => 6,
            Opcode::LessThan => 7,
            Opcode::Equals => 8,
            Opcode::AdjustBase => 9,
            Opcode::Halt => 99,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::Mul => "MUL",
            Opcode::Input => "IN",
            Opcode::Output => "OUT",
            Opcode::JumpIfTrue => "JNZ",
            Opcode::JumpIfFalse => "JZ",
            Opcode::LessThan => "LT",
            Opcode::Equals => "EQ",
            Opcode::AdjustBase => "ARB",
            Opcode::Halt => "HALT",
        }
    }
}

impl TryFrom<Word> for Opcode {
    type Error = DecodeError;

    fn try_from(code: Word) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Opcode::Add),
            2 => Ok(Opcode::Mul),
            3 => Ok(Opcode::Input),
            4 => Ok(Opcode::Output),
            5 => Ok(Opcode::JumpIfTrue),
            6 => Ok(Opcode::JumpIfFalse),
            7 => Ok(Opcode::LessThan),
            8 => Ok(Opcode::Equals),
            9 => Ok(Opcode::AdjustBase),
            99 => Ok(Opcode::Halt),
            other => Err(DecodeError::UnknownOpcode(other)),
        }
    }
}

/// Parameter addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Parameter is an address
    Position,
    /// Parameter is the value itself; never valid for a write target
    Immediate,
    /// Parameter is an offset from the relative base
    Relative,
}

impl TryFrom<Word> for Mode {
    type Error = DecodeError;

    fn try_from(digit: Word) -> Result<Self, Self::Error> {
        match digit {
            0 => Ok(Mode::Position),
            1 => Ok(Mode::Immediate),
            2 => Ok(Mode::Relative),
            other => Err(DecodeError::InvalidMode(other)),
        }
    }
}

/// Decoding failure, before the instruction pointer is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode(Word),
    InvalidMode(Word),
}

impl DecodeError {
    /// Attach the address of the offending instruction
    pub fn at(self, ip: Word) -> VmError {
        match self {
            DecodeError::UnknownOpcode(opcode) => VmError::UnknownOpcode { opcode, ip },
            DecodeError::InvalidMode(mode) => VmError::InvalidAddressingMode { mode, ip },
        }
    }
}

/// A decoded instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    modes: Word,
}

impl Instruction {
    /// Raw mode digit of parameter `param` (1-based), 0 when absent
    pub fn mode_digit(&self, param: usize) -> Word {
        let mut modes = self.modes;
        for _ in 1..param {
            modes /= 10;
        }
        modes % 10
    }

    pub fn mode(&self, param: usize) -> Result<Mode, DecodeError> {
        Mode::try_from(self.mode_digit(param))
    }

    /// Number of parameter words following the opcode word
    pub fn arity(&self) -> usize {
        self.opcode.width() - 1
    }
}

pub fn decode(word: Word) -> Result<Instruction, DecodeError> {
    if word < 0 {
        return Err(DecodeError::UnknownOpcode(word));
    }
    let opcode = Opcode::try_from(word % 100)?;
    Ok(Instruction {
        opcode,
        modes: word / 100,
    })
}
