//! Turn-taking between a processor and the device serving it
//!
//! In a device loop the processor talks through a private wire and listens on a
//! channel the device answers into. A blocking channel orders the conversation by
//! itself, but a device may also answer into a channel that never blocks (a
//! joystick always has *some* position). [`Lockstep`] makes every processor read
//! wait until the device has settled each value the processor emitted so far,
//! either by answering it or by deciding not to.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::channel::{Channel, lock};
use crate::error::Result;
use crate::relay::Transform;
use crate::value::Word;

#[derive(Debug, Default)]
struct Counts {
    emitted: u64,
    settled: u64,
    /// The device side is gone; nobody will settle anything again
    detached: bool,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Lockstep {
    state: Arc<(Mutex<Counts>, Condvar)>,
}

impl Lockstep {
    fn emit(&self) {
        lock(&self.state.0).emitted += 1;
    }

    fn settle(&self) {
        let (counts, turn) = &*self.state;
        lock(counts).settled += 1;
        turn.notify_all();
    }

    fn detach(&self) {
        let (counts, turn) = &*self.state;
        lock(counts).detached = true;
        turn.notify_all();
    }

    /// Block until the device has caught up with the processor
    fn wait_turn(&self) {
        let (counts, turn) = &*self.state;
        let mut counts = lock(counts);
        while !counts.detached && counts.settled < counts.emitted {
            counts = turn.wait(counts).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Processor output: counts what the device will have to settle
    pub(crate) fn spoken<C: Channel>(&self, inner: C) -> Spoken<C> {
        Spoken {
            inner,
            step: self.clone(),
        }
    }

    /// Processor input: reads wait for the device's turn to end
    pub(crate) fn awaited<C: Channel>(&self, inner: C) -> Awaited<C> {
        Awaited {
            inner,
            step: self.clone(),
        }
    }

    /// Device output: each reply settles the value that caused it
    pub(crate) fn answered<C: Channel>(&self, inner: C) -> Answered<C> {
        Answered {
            inner,
            step: self.clone(),
        }
    }

    /// Device transform: a value that gets no reply is settled immediately
    pub(crate) fn settling<T: Transform>(&self, inner: T) -> Settling<T> {
        Settling {
            inner,
            step: self.clone(),
        }
    }
}

pub(crate) struct Spoken<C> {
    inner: C,
    step: Lockstep,
}

impl<C: Channel> Channel for Spoken<C> {
    fn take(&mut self) -> Result<Word> {
        self.inner.take()
    }

    fn put(&mut self, value: Word) -> Result<()> {
        self.inner.put(value)?;
        self.step.emit();
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Word>> {
        self.inner.poll(timeout)
    }

    fn pending(&self) -> usize {
        self.inner.pending()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

pub(crate) struct Awaited<C> {
    inner: C,
    step: Lockstep,
}

impl<C: Channel> Channel for Awaited<C> {
    fn take(&mut self) -> Result<Word> {
        self.step.wait_turn();
        self.inner.take()
    }

    fn put(&mut self, value: Word) -> Result<()> {
        self.inner.put(value)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Word>> {
        self.step.wait_turn();
        self.inner.poll(timeout)
    }

    fn pending(&self) -> usize {
        self.inner.pending()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

pub(crate) struct Answered<C> {
    inner: C,
    step: Lockstep,
}

impl<C: Channel> Channel for Answered<C> {
    fn take(&mut self) -> Result<Word> {
        self.inner.take()
    }

    fn put(&mut self, value: Word) -> Result<()> {
        let outcome = self.inner.put(value);
        self.step.settle();
        outcome
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Word>> {
        self.inner.poll(timeout)
    }

    fn pending(&self) -> usize {
        self.inner.pending()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

pub(crate) struct Settling<T: Transform> {
    inner: T,
    step: Lockstep,
}

impl<T: Transform> Transform for Settling<T> {
    fn apply(&mut self, value: Word) -> Option<Word> {
        let reply = self.inner.apply(value);
        if reply.is_none() {
            self.step.settle();
        }
        reply
    }
}

impl<T: Transform> Drop for Settling<T> {
    fn drop(&mut self) {
        self.step.detach();
    }
}
