//! Textual rendering of a memory image
//!
//! Listings mix code and data, so the walk is linear: a word that decodes to a
//! complete instruction is shown with its operands, anything else becomes a
//! `DATA` line and the walk resumes at the next word.

use std::fmt::Write;

use crate::inst::{Instruction, Mode, decode};
use crate::value::Word;

/// Render one operand: `[a]` position, `#v` immediate, `rb+o` relative
pub fn operand_to_text(mode: Mode, raw: Word) -> String {
    match mode {
        Mode::Position => format!("[{}]", raw),
        Mode::Immediate => format!("#{}", raw),
        Mode::Relative if raw < 0 => format!("rb-{}", raw.unsigned_abs()),
        Mode::Relative => format!("rb+{}", raw),
    }
}

/// Render the instruction at `addr`, returning the text and the words it spans
pub fn instruction_to_text(words: &[Word], addr: usize) -> (String, usize) {
    let word = words.get(addr).copied().unwrap_or(0);
    match decode(word) {
        Ok(inst) if addr + inst.opcode.width() <= words.len() => {
            match operands_to_text(&inst, &words[addr + 1..addr + inst.opcode.width()]) {
                Some(operands) if operands.is_empty() => {
                    (inst.opcode.mnemonic().to_string(), inst.opcode.width())
                }
                Some(operands) => (
                    format!("{:<4} {}", inst.opcode.mnemonic(), operands),
                    inst.opcode.width(),
                ),
                None => (format!("DATA {}", word), 1),
            }
        }
        _ => (format!("DATA {}", word), 1),
    }
}

fn operands_to_text(inst: &Instruction, params: &[Word]) -> Option<String> {
    let mut parts = Vec::with_capacity(params.len());
    for (i, raw) in params.iter().enumerate() {
        let mode = inst.mode(i + 1).ok()?;
        parts.push(operand_to_text(mode, *raw));
    }
    Some(parts.join(", "))
}

/// One line per instruction, prefixed with its address
pub fn disassemble(words: &[Word]) -> String {
    let mut out = String::new();
    let mut addr = 0;
    while addr < words.len() {
        let (text, width) = instruction_to_text(words, addr);
        let _ = writeln!(out, "{:>5}: {}", addr, text);
        addr += width;
    }
    out
}
