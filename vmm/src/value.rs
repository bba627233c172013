// Core value types shared by the interpreter and its concurrency wrappers

/// A single memory cell, instruction word or channel value.
///
/// Programs routinely produce values beyond the 32-bit range, so the word is a
/// signed 64-bit integer. Arithmetic on words is checked by the interpreter.
pub type Word = i64;

/// Lifecycle of a [`Processor`](crate::processor::Processor)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorStatus {
    /// Constructed, not yet started
    Ready,
    /// Interpreter loop is executing (or blocked on input)
    Running,
    /// Reached opcode 99
    Halted,
    /// Aborted by a fatal interpreter error
    Failed,
}

impl ProcessorStatus {
    pub fn is_terminated(self) -> bool {
        matches!(self, ProcessorStatus::Halted | ProcessorStatus::Failed)
    }
}

impl std::fmt::Display for ProcessorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorStatus::Ready => write!(f, "ready"),
            ProcessorStatus::Running => write!(f, "running"),
            ProcessorStatus::Halted => write!(f, "halted"),
            ProcessorStatus::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ProcessorStatus::Ready.is_terminated());
        assert!(!ProcessorStatus::Running.is_terminated());
        assert!(ProcessorStatus::Halted.is_terminated());
        assert!(ProcessorStatus::Failed.is_terminated());
        assert_eq!(ProcessorStatus::Failed.to_string(), "failed");
    }
}
