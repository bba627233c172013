pub mod channel;
pub mod config;
pub mod disasm;
pub mod error;
pub mod inst;
mod lockstep;
pub mod memory;
pub mod processor;
pub mod program;
pub mod relay;
pub mod topology;
pub mod value;
pub mod vm;


// Re-export commonly used types
pub use channel::{Channel, Tape, Unplugged, Wire};
pub use config::RuntimeConfig;
pub use error::{ProgramError, Result, VmError};
pub use memory::Memory;
pub use processor::Processor;
pub use program::Program;
pub use relay::{Passthrough, Relay, StopHandle, Transform};
pub use value::{ProcessorStatus, Word};
pub use vm::{HaltState, Machine, Step};

/// Run `program` to completion on the calling thread and collect its output.
///
/// Input is list-backed: running out of `inputs` is [`VmError::InputExhausted`].
pub fn run_program(program: &[Word], inputs: &[Word]) -> Result<Vec<Word>> {
    let mut input = Tape::from(inputs.to_vec());
    let output = Tape::new();
    let mut sink = output.clone();
    Machine::new(program).run(&mut input, &mut sink)?;
    Ok(output.drain())
}
