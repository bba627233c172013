//! Pass-through and transforming units that wire processors together
//!
//! A [`Relay`] drains one channel, runs each value through a [`Transform`] and
//! forwards whatever the transform returns to another channel. It waits on its
//! input with a bounded poll, so a raised [`StopHandle`] is noticed within one
//! poll interval.
//!
//! Stopping does not discard input: values already queued when the stop is
//! observed are still passed through the transform before the loop exits, so a
//! producer that emitted its last value just before terminating is never cut
//! short. A closed input ends the loop the same way. On exit the relay closes
//! its output.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};

use crate::channel::Channel;
use crate::config::DEFAULT_POLL_INTERVAL;
use crate::error::{Result, VmError};
use crate::value::Word;

/// Per-value behavior of a relay.
///
/// Returning `None` forwards nothing; stateful transforms use this to collect a
/// multi-value command before replying.
pub trait Transform: Send {
    fn apply(&mut self, value: Word) -> Option<Word>;
}

impl<F> Transform for F
where
    F: FnMut(Word) -> Option<Word> + Send,
{
    fn apply(&mut self, value: Word) -> Option<Word> {
        self(value)
    }
}

/// Identity transform
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Transform for Passthrough {
    fn apply(&mut self, value: Word) -> Option<Word> {
        Some(value)
    }
}

/// Cancellation token shared between a relay and whoever may stop it
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Pending {
    input: Box<dyn Channel>,
    output: Box<dyn Channel>,
    transform: Box<dyn Transform>,
}

pub struct Relay {
    id: String,
    pending: Option<Pending>,
    stop: StopHandle,
    poll_interval: Duration,
    handle: Option<JoinHandle<Result<()>>>,
    outcome: Option<Result<()>>,
}

impl Relay {
    /// A passthrough relay from `input` to `output`
    pub fn new(
        id: impl Into<String>,
        input: impl Channel + 'static,
        output: impl Channel + 'static,
    ) -> Self {
        Relay {
            id: id.into(),
            pending: Some(Pending {
                input: Box::new(input),
                output: Box::new(output),
                transform: Box::new(Passthrough),
            }),
            stop: StopHandle::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            handle: None,
            outcome: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        if let Some(pending) = self.pending.as_mut() {
            pending.transform = Box::new(transform);
        }
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Raise the stop signal; the loop exits within one poll interval
    pub fn disconnect(&self) {
        debug!("relay {} disconnect requested", self.id);
        self.stop.stop();
    }

    pub fn start(&mut self) {
        let Some(pending) = self.pending.take() else {
            warn!("relay {} already started", self.id);
            return;
        };
        let id = self.id.clone();
        let stop = self.stop.clone();
        let interval = self.poll_interval;
        debug!("relay {} starting", id);
        self.handle = Some(thread::spawn(move || {
            let outcome = pump(&id, pending, &stop, interval);
            if let Err(err) = &outcome {
                warn!("relay {} failed: {}", id, err);
            }
            outcome
        }));
    }

    /// Wait for the loop to exit. Does not raise the stop signal by itself.
    pub fn join(&mut self) -> Result<()> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let outcome = match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(VmError::RelayPanicked(self.id.clone()))),
            // never started: nothing to wait for
            None => Ok(()),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("id", &self.id)
            .field("stopped", &self.stop.is_stopped())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

fn pump(id: &str, pending: Pending, stop: &StopHandle, interval: Duration) -> Result<()> {
    let Pending {
        mut input,
        mut output,
        mut transform,
    } = pending;
    let outcome = forward(id, &mut *input, &mut *output, &mut *transform, stop, interval);
    output.close();
    outcome
}

fn forward(
    id: &str,
    input: &mut dyn Channel,
    output: &mut dyn Channel,
    transform: &mut dyn Transform,
    stop: &StopHandle,
    interval: Duration,
) -> Result<()> {
    let mut forwarded = 0usize;

    loop {
        if stop.is_stopped() {
            let backlog = input.pending();
            for _ in 0..backlog {
                let Some(value) = input.poll(Duration::ZERO)? else {
                    break;
                };
                if let Some(reply) = transform.apply(value) {
                    output.put(reply)?;
                    forwarded += 1;
                }
            }
            debug!("relay {} stopped after forwarding {} values", id, forwarded);
            return Ok(());
        }
        let value = match input.poll(interval) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(VmError::ChannelNotConnected) => {
                debug!("relay {} input closed after forwarding {} values", id, forwarded);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if let Some(reply) = transform.apply(value) {
            trace!("relay {}: {} -> {}", id, value, reply);
            output.put(reply)?;
            forwarded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Tape, Unplugged, Wire};
    use std::time::Instant;

    #[test]
    fn test_passthrough_forwards_in_order() {
        let input = Wire::new();
        let output = Wire::new();
        let mut relay = Relay::new("pass", input.clone(), output.clone())
            .with_poll_interval(Duration::from_millis(5));
        relay.start();
        for v in 1..=5 {
            input.push(v);
        }
        let mut reader = output.clone();
        let got: Vec<Word> = (0..5).map(|_| reader.take().unwrap()).collect();
        relay.disconnect();
        relay.join().unwrap();
        assert_eq!(got, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_transform_may_swallow_values() {
        let input = Wire::new();
        let output = Tape::new();
        // emit the sum of every pair
        let mut held = None;
        let pairwise = move |v: Word| match held.take() {
            Some(first) => Some(first + v),
            None => {
                held = Some(v);
                None
            }
        };
        let mut relay = Relay::new("pairs", input.clone(), output.clone())
            .with_transform(pairwise)
            .with_poll_interval(Duration::from_millis(5));
        for v in [1, 2, 10, 20, 7] {
            input.push(v);
        }
        relay.start();
        relay.disconnect();
        relay.join().unwrap();
        assert_eq!(output.snapshot(), vec![3, 30]);
    }

    #[test]
    fn test_disconnect_is_observed_within_poll_interval() {
        let mut relay = Relay::new("idle", Wire::new(), Wire::new())
            .with_poll_interval(Duration::from_millis(20));
        relay.start();
        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        relay.disconnect();
        relay.join().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_unplugged_output_ends_relay() {
        let input = Wire::new();
        input.push(1);
        let mut relay = Relay::new("dead-end", input, Unplugged)
            .with_poll_interval(Duration::from_millis(5));
        relay.start();
        assert_eq!(relay.join(), Err(VmError::ChannelNotConnected));
        assert_eq!(relay.join(), Err(VmError::ChannelNotConnected));
    }

    #[test]
    fn test_closed_input_ends_relay_and_closes_output() {
        let input = Wire::new();
        let output = Wire::new();
        let mut reader = output.clone();
        input.push(4);
        input.push(5);
        input.close();
        // a closed input ends the loop without waiting out the poll interval
        let mut relay = Relay::new("finite", input, output)
            .with_transform(|v: Word| Some(v * 10))
            .with_poll_interval(Duration::from_secs(60));
        relay.start();
        relay.join().unwrap();
        assert_eq!(reader.take(), Ok(40));
        assert_eq!(reader.take(), Ok(50));
        assert_eq!(reader.take(), Err(VmError::ChannelNotConnected));
    }

    #[test]
    fn test_backlog_is_flushed_after_stop() {
        let input = Wire::new();
        let output = Tape::new();
        for v in 1..=3 {
            input.push(v);
        }
        let mut relay = Relay::new("late", input, output.clone());
        relay.disconnect();
        relay.start();
        relay.join().unwrap();
        assert_eq!(output.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn test_join_without_start() {
        let mut relay = Relay::new("never", Wire::new(), Wire::new());
        assert_eq!(relay.join(), Ok(()));
    }
}
