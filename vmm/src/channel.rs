//! Unidirectional data paths between processors and relays
//!
//! Every channel is FIFO. Queue-backed [`Wire`]s block on an empty take, list-backed
//! [`Tape`]s fail instead, and [`Unplugged`] stands in for a missing connection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{trace, warn};

use crate::error::{Result, VmError};
use crate::value::Word;

/// Input/output endpoint used by opcodes 3 and 4 and by relays
pub trait Channel: Send {
    /// Take the next value, blocking while a queue-backed channel is empty
    fn take(&mut self) -> Result<Word>;

    /// Append a value; never blocks
    fn put(&mut self, value: Word) -> Result<()>;

    /// Wait at most `timeout` for a value
    fn poll(&mut self, timeout: Duration) -> Result<Option<Word>>;

    /// Values currently queued
    fn pending(&self) -> usize {
        0
    }

    /// Signal that this endpoint will produce no more values
    fn close(&mut self) {}
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn take(&mut self) -> Result<Word> {
        (**self).take()
    }

    fn put(&mut self, value: Word) -> Result<()> {
        (**self).put(value)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Word>> {
        (**self).poll(timeout)
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Blocking, unbounded FIFO queue. Clones share the same queue.
///
/// All clones also share a single sending half. Once any clone calls
/// [`Wire::close`], puts fail and readers receive what is still queued, then
/// [`VmError::ChannelNotConnected`] instead of waiting forever.
#[derive(Debug, Clone)]
pub struct Wire {
    tx: Arc<Mutex<Option<Sender<Word>>>>,
    rx: Receiver<Word>,
}

impl Wire {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Wire {
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    fn send(&self, value: Word) -> Result<()> {
        match lock(&self.tx).as_ref() {
            Some(tx) => tx.send(value).map_err(|_| VmError::ChannelNotConnected),
            None => Err(VmError::ChannelNotConnected),
        }
    }

    /// Enqueue from a shared reference, for priming inputs
    pub fn push(&self, value: Word) {
        if self.send(value).is_err() {
            warn!("dropping {} pushed onto a closed wire", value);
        }
    }

    /// Drop the sending half; idempotent
    pub fn close(&self) {
        if lock(&self.tx).take().is_some() {
            trace!("wire closed with {} values queued", self.len());
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.tx).is_none()
    }

    /// Remove and return everything currently queued
    pub fn drain(&self) -> Vec<Word> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}

impl Channel for Wire {
    fn take(&mut self) -> Result<Word> {
        self.rx.recv().map_err(|_| VmError::ChannelNotConnected)
    }

    fn put(&mut self, value: Word) -> Result<()> {
        self.send(value)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Word>> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(VmError::ChannelNotConnected),
        }
    }

    fn pending(&self) -> usize {
        self.len()
    }

    fn close(&mut self) {
        Wire::close(self);
    }
}

/// List-backed channel: reads pop the front, writes append to the back.
///
/// A take from an empty tape does not wait; it fails with
/// [`VmError::InputExhausted`]. Clones share the same list, so a caller can keep a
/// handle and read the results after the run.
#[derive(Debug, Clone, Default)]
pub struct Tape {
    cells: Arc<Mutex<VecDeque<Word>>>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: Word) {
        lock(&self.cells).push_back(value);
    }

    /// Copy of the current contents, front first
    pub fn snapshot(&self) -> Vec<Word> {
        lock(&self.cells).iter().copied().collect()
    }

    pub fn drain(&self) -> Vec<Word> {
        lock(&self.cells).drain(..).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.cells).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.cells).is_empty()
    }
}

impl FromIterator<Word> for Tape {
    fn from_iter<I: IntoIterator<Item = Word>>(iter: I) -> Self {
        Tape {
            cells: Arc::new(Mutex::new(iter.into_iter().collect())),
        }
    }
}

impl From<Vec<Word>> for Tape {
    fn from(values: Vec<Word>) -> Self {
        values.into_iter().collect()
    }
}

impl Channel for Tape {
    fn take(&mut self) -> Result<Word> {
        lock(&self.cells).pop_front().ok_or(VmError::InputExhausted)
    }

    fn put(&mut self, value: Word) -> Result<()> {
        self.push(value);
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Option<Word>> {
        if let Some(value) = lock(&self.cells).pop_front() {
            return Ok(Some(value));
        }
        thread::sleep(timeout);
        Ok(lock(&self.cells).pop_front())
    }

    fn pending(&self) -> usize {
        self.len()
    }
}

/// A missing connection
#[derive(Debug, Clone, Copy, Default)]
pub struct Unplugged;

impl Channel for Unplugged {
    fn take(&mut self) -> Result<Word> {
        Err(VmError::ChannelNotConnected)
    }

    fn put(&mut self, _value: Word) -> Result<()> {
        Err(VmError::ChannelNotConnected)
    }

    fn poll(&mut self, _timeout: Duration) -> Result<Option<Word>> {
        Err(VmError::ChannelNotConnected)
    }
}

/// Lock a mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_wire_is_fifo_across_clones() {
        let mut producer = Wire::new();
        let mut consumer = producer.clone();
        for v in [3, 1, 4, 1, 5] {
            producer.put(v).unwrap();
        }
        assert_eq!(consumer.pending(), 5);
        let taken: Vec<Word> = (0..5).map(|_| consumer.take().unwrap()).collect();
        assert_eq!(taken, vec![3, 1, 4, 1, 5]);
        assert!(producer.is_empty());
    }

    #[test]
    fn test_wire_take_blocks_until_put() {
        let wire = Wire::new();
        let mut reader = wire.clone();
        let handle = thread::spawn(move || reader.take());
        thread::sleep(Duration::from_millis(20));
        wire.push(99);
        assert_eq!(handle.join().unwrap(), Ok(99));
    }

    #[test]
    fn test_wire_poll_times_out() {
        let mut wire = Wire::new();
        let started = Instant::now();
        assert_eq!(wire.poll(Duration::from_millis(10)), Ok(None));
        assert!(started.elapsed() >= Duration::from_millis(10));
        wire.push(8);
        assert_eq!(wire.poll(Duration::from_millis(10)), Ok(Some(8)));
    }

    #[test]
    fn test_closed_wire_drains_then_disconnects() {
        let wire = Wire::new();
        let mut reader = wire.clone();
        wire.push(1);
        wire.push(2);
        wire.close();
        assert!(reader.is_closed());
        assert_eq!(reader.put(3), Err(VmError::ChannelNotConnected));
        assert_eq!(reader.take(), Ok(1));
        assert_eq!(reader.poll(Duration::from_millis(1)), Ok(Some(2)));
        assert_eq!(reader.take(), Err(VmError::ChannelNotConnected));
        assert_eq!(
            reader.poll(Duration::from_millis(1)),
            Err(VmError::ChannelNotConnected)
        );
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let wire = Wire::new();
        let mut reader = wire.clone();
        let handle = thread::spawn(move || reader.take());
        thread::sleep(Duration::from_millis(20));
        let mut closer: Box<dyn Channel> = Box::new(wire.clone());
        closer.close();
        assert_eq!(handle.join().unwrap(), Err(VmError::ChannelNotConnected));
    }

    #[test]
    fn test_tape_reads_front_and_appends_back() {
        let mut tape: Tape = vec![1, 2].into();
        tape.put(3).unwrap();
        assert_eq!(tape.take(), Ok(1));
        assert_eq!(tape.snapshot(), vec![2, 3]);
        assert_eq!(tape.take(), Ok(2));
        assert_eq!(tape.take(), Ok(3));
        assert_eq!(tape.take(), Err(VmError::InputExhausted));
    }

    #[test]
    fn test_tape_clones_share_contents() {
        let tape = Tape::new();
        let mut writer = tape.clone();
        writer.put(10).unwrap();
        writer.put(20).unwrap();
        assert_eq!(tape.drain(), vec![10, 20]);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_unplugged() {
        let mut port = Unplugged;
        assert_eq!(port.take(), Err(VmError::ChannelNotConnected));
        assert_eq!(port.put(1), Err(VmError::ChannelNotConnected));
        assert_eq!(
            port.poll(Duration::from_millis(1)),
            Err(VmError::ChannelNotConnected)
        );
    }

    #[test]
    fn test_boxed_channel_delegates() {
        let tape = Tape::new();
        let mut boxed: Box<dyn Channel> = Box::new(tape.clone());
        boxed.put(5).unwrap();
        assert_eq!(boxed.pending(), 1);
        assert_eq!(tape.snapshot(), vec![5]);
    }
}
