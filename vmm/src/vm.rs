//! The interpreter loop
//!
//! [`Machine`] owns one private [`Memory`] plus the instruction pointer and the
//! relative base register. Both registers start at 0 for every machine, so any
//! number of machines may run side by side without sharing state.

use log::debug;

use crate::channel::Channel;
use crate::error::{Result, VmError};
use crate::inst::{Instruction, Mode, Opcode, decode};
use crate::memory::Memory;
use crate::value::Word;

/// Outcome of a single fetch/decode/execute cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More instructions to execute
    Running,
    /// Opcode 99 was executed
    Halted,
}

/// Final state of a run that reached opcode 99
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltState {
    pub memory: Memory,
    /// Address one past the halt instruction
    pub ip: Word,
}

#[derive(Debug, Clone)]
pub struct Machine {
    memory: Memory,
    ip: Word,
    relative_base: Word,
    halted: bool,
    /// Emit one debug record per executed instruction
    debug: bool,
    label: String,
}

impl Machine {
    /// Build a machine over a private copy of `program`
    pub fn new(program: &[Word]) -> Self {
        Machine {
            memory: Memory::from(program),
            ip: 0,
            relative_base: 0,
            halted: false,
            debug: false,
            label: "main".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn ip(&self) -> Word {
        self.ip
    }

    pub fn relative_base(&self) -> Word {
        self.relative_base
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Run until opcode 99 or the first fatal error
    pub fn run(&mut self, input: &mut dyn Channel, output: &mut dyn Channel) -> Result<HaltState> {
        while self.step(input, output)? == Step::Running {}
        Ok(self.halt_state())
    }

    pub fn halt_state(&self) -> HaltState {
        HaltState {
            memory: self.memory.clone(),
            ip: self.ip,
        }
    }

    /// Execute one instruction.
    ///
    /// A failed step leaves memory and registers as they were before the
    /// instruction, so a step that ran out of list-backed input can be retried
    /// after more input is supplied.
    pub fn step(&mut self, input: &mut dyn Channel, output: &mut dyn Channel) -> Result<Step> {
        if self.halted {
            return Ok(Step::Halted);
        }
        let ip = self.ip;
        let inst = decode(self.memory.read(ip)?).map_err(|e| e.at(ip))?;

        match inst.opcode {
            Opcode::Add | Opcode::Mul | Opcode::LessThan | Opcode::Equals => {
                let a = self.load(&inst, 1)?;
                let b = self.load(&inst, 2)?;
                let dst = self.target(&inst, 3)?;
                let value = match inst.opcode {
                    Opcode::Add => a.checked_add(b).ok_or(VmError::Overflow { ip })?,
                    Opcode::Mul => a.checked_mul(b).ok_or(VmError::Overflow { ip })?,
                    Opcode::LessThan => Word::from(a < b),
                    _ => Word::from(a == b),
                };
                self.trace(&inst, format_args!("{} {} -> &{} = {}", a, b, dst, value));
                self.memory.write(dst, value)?;
            }
            Opcode::Input => {
                let dst = self.target(&inst, 1)?;
                let value = input.take()?;
                self.trace(&inst, format_args!("{} -> &{}", value, dst));
                self.memory.write(dst, value)?;
            }
            Opcode::Output => {
                let value = self.load(&inst, 1)?;
                self.trace(&inst, format_args!("{}", value));
                output.put(value)?;
            }
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => {
                let cond = self.load(&inst, 1)?;
                let dest = self.load(&inst, 2)?;
                let taken = (cond != 0) == (inst.opcode == Opcode::JumpIfTrue);
                self.trace(&inst, format_args!("{} {} taken={}", cond, dest, taken));
                if taken {
                    if dest < 0 {
                        return Err(VmError::NegativeAddress(dest));
                    }
                    self.ip = dest;
                    return Ok(Step::Running);
                }
            }
            Opcode::AdjustBase => {
                let delta = self.load(&inst, 1)?;
                let base = self
                    .relative_base
                    .checked_add(delta)
                    .ok_or(VmError::Overflow { ip })?;
                self.trace(&inst, format_args!("{} -> rb={}", delta, base));
                self.relative_base = base;
            }
            Opcode::Halt => {
                self.trace(&inst, format_args!(""));
                self.halted = true;
                self.ip = ip + 1;
                return Ok(Step::Halted);
            }
        }

        self.ip = self.param_addr(inst.opcode.width())?;
        Ok(Step::Running)
    }

    /// Address of the word `offset` places after the current opcode word
    fn param_addr(&self, offset: usize) -> Result<Word> {
        self.ip
            .checked_add(offset as Word)
            .ok_or(VmError::Overflow { ip: self.ip })
    }

    fn raw(&self, param: usize) -> Result<Word> {
        self.memory.read(self.param_addr(param)?)
    }

    fn relative(&self, offset: Word) -> Result<Word> {
        self.relative_base
            .checked_add(offset)
            .ok_or(VmError::Overflow { ip: self.ip })
    }

    /// Resolve a read parameter to its value
    fn load(&self, inst: &Instruction, param: usize) -> Result<Word> {
        let raw = self.raw(param)?;
        match inst.mode(param).map_err(|e| e.at(self.ip))? {
            Mode::Position => self.memory.read(raw),
            Mode::Immediate => Ok(raw),
            Mode::Relative => self.memory.read(self.relative(raw)?),
        }
    }

    /// Resolve a write parameter to its target address
    fn target(&self, inst: &Instruction, param: usize) -> Result<Word> {
        let raw = self.raw(param)?;
        let addr = match inst.mode(param).map_err(|e| e.at(self.ip))? {
            Mode::Position => raw,
            Mode::Relative => self.relative(raw)?,
            Mode::Immediate => {
                return Err(VmError::InvalidAddressingMode {
                    mode: inst.mode_digit(param),
                    ip: self.ip,
                });
            }
        };
        if addr < 0 {
            return Err(VmError::NegativeAddress(addr));
        }
        Ok(addr)
    }

    fn trace(&self, inst: &Instruction, detail: std::fmt::Arguments<'_>) {
        if self.debug {
            debug!(
                "[{}] {:>5}: {:<4} {}",
                self.label,
                self.ip,
                inst.opcode.mnemonic(),
                detail
            );
        }
    }
}
