//! Independently scheduled interpreter instances
//!
//! A [`Processor`] runs one [`Machine`] on its own thread against an input and an
//! output [`Channel`]. When the run ends, normally or not, every registered
//! listener fires exactly once in registration order, and the output channel is
//! closed so readers downstream see the end of the stream. Topologies use the
//! listeners to disconnect relays that would otherwise poll a channel nobody
//! writes to.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use crate::channel::{Channel, lock};
use crate::error::{Result, VmError};
use crate::value::{ProcessorStatus, Word};
use crate::vm::{HaltState, Machine};

type Listener = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Termination {
    done: bool,
    listeners: Vec<Listener>,
}

struct Shared {
    status: Mutex<ProcessorStatus>,
    termination: Mutex<Termination>,
}

impl Shared {
    fn set_status(&self, status: ProcessorStatus) {
        *lock(&self.status) = status;
    }

    /// Fire the listeners; later calls are no-ops
    fn terminate(&self) {
        let listeners = {
            let mut termination = lock(&self.termination);
            if termination.done {
                return;
            }
            termination.done = true;
            std::mem::take(&mut termination.listeners)
        };
        for listener in listeners {
            listener();
        }
    }
}

/// Fires termination even when the interpreter thread unwinds
struct TerminationGuard(Arc<Shared>);

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        {
            let mut status = lock(&self.0.status);
            if !status.is_terminated() {
                *status = ProcessorStatus::Failed;
            }
        }
        self.0.terminate();
    }
}

struct Pending {
    machine: Machine,
    input: Box<dyn Channel>,
    output: Box<dyn Channel>,
}

pub struct Processor {
    id: String,
    pending: Option<Pending>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<Result<HaltState>>>,
    outcome: Option<Result<HaltState>>,
}

impl Processor {
    /// Create a processor over a private copy of `program`.
    ///
    /// With `debug` set, every executed instruction is logged at debug level.
    pub fn new(
        id: impl Into<String>,
        program: &[Word],
        input: impl Channel + 'static,
        output: impl Channel + 'static,
        debug: bool,
    ) -> Self {
        let id = id.into();
        let machine = Machine::new(program)
            .with_label(id.clone())
            .with_debug(debug);
        Processor {
            id,
            pending: Some(Pending {
                machine,
                input: Box::new(input),
                output: Box::new(output),
            }),
            shared: Arc::new(Shared {
                status: Mutex::new(ProcessorStatus::Ready),
                termination: Mutex::new(Termination::default()),
            }),
            handle: None,
            outcome: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> ProcessorStatus {
        *lock(&self.shared.status)
    }

    /// Register a callback for termination.
    ///
    /// Registering on an already terminated processor runs the callback at once.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut termination = lock(&self.shared.termination);
        if termination.done {
            drop(termination);
            listener();
        } else {
            termination.listeners.push(Box::new(listener));
        }
    }

    /// Begin executing on a new thread; returns immediately
    pub fn start(&mut self) {
        let Some(Pending {
            mut machine,
            mut input,
            mut output,
        }) = self.pending.take()
        else {
            warn!("processor {} already started", self.id);
            return;
        };

        self.shared.set_status(ProcessorStatus::Running);
        let shared = self.shared.clone();
        let id = self.id.clone();
        info!("processor {} starting", id);

        self.handle = Some(thread::spawn(move || {
            let guard = TerminationGuard(shared);
            let outcome = machine.run(&mut *input, &mut *output);
            // consumers of this output must not wait for values that will never come
            output.close();
            match &outcome {
                Ok(state) => {
                    debug!("processor {} halted at ip {}", id, state.ip);
                    guard.0.set_status(ProcessorStatus::Halted);
                }
                Err(err) => {
                    error!("processor {} failed: {}", id, err);
                    guard.0.set_status(ProcessorStatus::Failed);
                }
            }
            drop(guard);
            outcome
        }));
    }

    /// Block until the run ends and return its outcome.
    ///
    /// A processor that was never started is started first. Repeated joins return
    /// the same outcome.
    pub fn join(&mut self) -> Result<HaltState> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        if self.pending.is_some() {
            debug!("processor {} joined before start", self.id);
            self.start();
        }
        let outcome = match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(VmError::ProcessorPanicked(self.id.clone()))),
            None => Err(VmError::ProcessorPanicked(self.id.clone())),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Tape, Unplugged, Wire};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_processor_runs_on_its_own_thread() {
        let input = Wire::new();
        let output = Wire::new();
        let mut cpu = Processor::new("echo", &[3, 0, 4, 0, 99], input.clone(), output.clone(), false);
        assert_eq!(cpu.status(), ProcessorStatus::Ready);
        cpu.start();
        input.push(41);
        let state = cpu.join().unwrap();
        assert_eq!(output.drain(), vec![41]);
        assert_eq!(state.memory.read(0), Ok(41));
        assert_eq!(cpu.status(), ProcessorStatus::Halted);
    }

    #[test]
    fn test_listeners_fire_once_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut cpu = Processor::new("halt", &[99], Unplugged, Unplugged, false);
        for n in 0..3 {
            let order = order.clone();
            cpu.add_listener(move || lock(&order).push(n));
        }
        cpu.start();
        cpu.join().unwrap();
        cpu.join().unwrap();
        assert_eq!(*lock(&order), vec![0, 1, 2]);
    }

    #[test]
    fn test_late_listener_runs_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut cpu = Processor::new("halt", &[99], Unplugged, Unplugged, false);
        cpu.join().unwrap();
        let counter = fired.clone();
        cpu.add_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failure_is_reported_and_listeners_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut cpu = Processor::new("bad", &[3, 0, 99], Tape::new(), Unplugged, false);
        let counter = fired.clone();
        cpu.add_listener(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cpu.start();
        assert_eq!(cpu.join(), Err(VmError::InputExhausted));
        assert_eq!(cpu.status(), ProcessorStatus::Failed);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_output_closed_on_termination() {
        let output = Wire::new();
        let mut reader = output.clone();
        let mut cpu = Processor::new("short", &[104, 7, 98], Unplugged, output, false);
        assert_eq!(
            cpu.join(),
            Err(VmError::UnknownOpcode { opcode: 98, ip: 2 })
        );
        assert_eq!(reader.take(), Ok(7));
        assert_eq!(reader.take(), Err(VmError::ChannelNotConnected));
    }

    #[test]
    fn test_start_twice_is_noop() {
        let output = Tape::new();
        let mut cpu = Processor::new("once", &[104, 5, 99], Unplugged, output.clone(), false);
        cpu.start();
        cpu.start();
        cpu.join().unwrap();
        assert_eq!(output.snapshot(), vec![5]);
    }

    #[test]
    fn test_caller_program_is_not_aliased() {
        let program = vec![1101, 2, 3, 0, 99];
        let mut cpu = Processor::new("copy", &program, Unplugged, Unplugged, true);
        let state = cpu.join().unwrap();
        assert_eq!(state.memory.read(0), Ok(5));
        assert_eq!(program[0], 1101);
    }
}
