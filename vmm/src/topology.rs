//! Wiring patterns for groups of processors
//!
//! - chain: each processor's output is the next one's input
//! - feedback loop: a chain whose tail is relayed back into its head
//! - device loop: one processor paired with one relay acting as the device

use std::sync::{Arc, Mutex};

use log::{debug, info};

use crate::channel::{Channel, Wire, lock};
use crate::config::RuntimeConfig;
use crate::error::{Result, VmError};
use crate::lockstep::Lockstep;
use crate::processor::Processor;
use crate::relay::{Relay, Transform};
use crate::value::Word;
use crate::vm::HaltState;

/// Run one processor per phase setting in a linear chain.
///
/// Each processor receives its phase first; the head additionally receives
/// `signal`. Returns the last value the tail emitted.
pub fn run_chain(
    program: &[Word],
    phases: &[Word],
    signal: Word,
    config: &RuntimeConfig,
) -> Result<Option<Word>> {
    let wires: Vec<Wire> = (0..=phases.len()).map(|_| Wire::new()).collect();
    for (wire, phase) in wires.iter().zip(phases) {
        wire.push(*phase);
    }
    wires[0].push(signal);
    // the head gets nothing beyond its phase and the signal
    wires[0].close();

    let mut stages: Vec<Processor> = phases
        .iter()
        .enumerate()
        .map(|(i, _)| {
            Processor::new(
                stage_name(i),
                program,
                wires[i].clone(),
                wires[i + 1].clone(),
                config.debug,
            )
        })
        .collect();

    for stage in &mut stages {
        stage.start();
    }
    join_all(&mut stages)?;

    let tail = wires[phases.len()].drain();
    debug!("chain {:?} -> {:?}", phases, tail);
    Ok(tail.last().copied())
}

/// Run a chain whose tail output is relayed back into its head.
///
/// The feedback relay is disconnected when the head processor terminates. The
/// result is the last value the tail emitted, whether it was still queued or had
/// already been relayed.
pub fn run_feedback_loop(
    program: &[Word],
    phases: &[Word],
    signal: Word,
    config: &RuntimeConfig,
) -> Result<Option<Word>> {
    if phases.is_empty() {
        return Ok(None);
    }
    let inputs: Vec<Wire> = phases.iter().map(|_| Wire::new()).collect();
    let tail = Wire::new();
    for (wire, phase) in inputs.iter().zip(phases) {
        wire.push(*phase);
    }
    inputs[0].push(signal);

    let mut stages: Vec<Processor> = (0..phases.len())
        .map(|i| {
            let output = inputs.get(i + 1).cloned().unwrap_or_else(|| tail.clone());
            Processor::new(stage_name(i), program, inputs[i].clone(), output, config.debug)
        })
        .collect();

    let last_relayed: Arc<Mutex<Option<Word>>> = Arc::new(Mutex::new(None));
    let seen = last_relayed.clone();
    let mut feedback = Relay::new("feedback", tail.clone(), inputs[0].clone())
        .with_transform(move |value: Word| {
            *lock(&seen) = Some(value);
            Some(value)
        })
        .with_poll_interval(config.poll_interval);

    let stop = feedback.stop_handle();
    stages[0].add_listener(move || {
        debug!("head halted, disconnecting feedback relay");
        stop.stop();
    });

    feedback.start();
    for stage in &mut stages {
        stage.start();
    }
    let joined = join_all(&mut stages);
    feedback.disconnect();
    let relayed = feedback.join();
    joined?;
    relayed?;

    let signal = tail.drain().last().copied().or(*lock(&last_relayed));
    info!("feedback loop {:?} -> {:?}", phases, signal);
    Ok(signal)
}

/// Try every ordering of `phases` and keep the one with the largest signal.
///
/// Orderings are visited lexicographically by position; the first maximum wins.
/// Orderings whose task produced no signal are skipped.
pub fn best_phase_sequence<F>(phases: &[Word], mut task: F) -> Result<Option<(Vec<Word>, Word)>>
where
    F: FnMut(&[Word]) -> Result<Option<Word>>,
{
    let mut best: Option<(Vec<Word>, Word)> = None;
    for ordering in permutations(phases) {
        let Some(signal) = task(&ordering)? else {
            continue;
        };
        debug!("phases {:?} -> {}", ordering, signal);
        if best.as_ref().is_none_or(|(_, top)| signal > *top) {
            best = Some((ordering, signal));
        }
    }
    Ok(best)
}

/// Pair one processor with a device relay.
///
/// The processor reads from `input` and writes to a private wire; the relay feeds
/// that wire through `device` and puts each reply back into `input`. A processor
/// read waits until the device has handled everything emitted before it, so the
/// reply is there even when `input` never blocks. The relay is disconnected when
/// the processor terminates. Values the caller wants the processor to see first
/// must already be in `input`.
pub fn run_device<I, T>(
    id: &str,
    program: &[Word],
    input: I,
    device: T,
    config: &RuntimeConfig,
) -> Result<HaltState>
where
    I: Channel + Clone + 'static,
    T: Transform + 'static,
{
    let step = Lockstep::default();
    let output = Wire::new();
    let mut cpu = Processor::new(
        id,
        program,
        step.awaited(input.clone()),
        step.spoken(output.clone()),
        config.debug,
    );
    let mut relay = Relay::new(format!("{}-device", id), output, step.answered(input))
        .with_transform(step.settling(device))
        .with_poll_interval(config.poll_interval);

    let stop = relay.stop_handle();
    cpu.add_listener(move || stop.stop());

    relay.start();
    cpu.start();
    let state = cpu.join();
    let relayed = relay.join();
    let state = state?;
    relayed?;
    Ok(state)
}

fn stage_name(index: usize) -> String {
    match u8::try_from(index) {
        Ok(i) if i < 26 => char::from(b'A' + i).to_string(),
        _ => format!("stage-{}", index),
    }
}

/// Wait for every processor, then report the failure that started it all.
///
/// A stage that fails closes its output, so the stages it fed end with
/// `ChannelNotConnected`; those are reported only when nothing else went wrong.
fn join_all(stages: &mut [Processor]) -> Result<()> {
    let mut cause = None;
    let mut starved = None;
    for stage in stages.iter_mut() {
        match stage.join() {
            Ok(_) => {}
            Err(VmError::ChannelNotConnected) => {
                starved.get_or_insert(VmError::ChannelNotConnected);
            }
            Err(err) => {
                cause.get_or_insert(err);
            }
        }
    }
    match cause.or(starved) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn permutations(items: &[Word]) -> Vec<Vec<Word>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for (i, head) in items.iter().enumerate() {
        let mut rest = items.to_vec();
        rest.remove(i);
        for tail in permutations(&rest) {
            let mut ordering = Vec::with_capacity(items.len());
            ordering.push(*head);
            ordering.extend(tail);
            out.push(ordering);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Phase 1 crashes at once; any other phase reads one more value and halts
    const CRASH_ON_ONE: [Word; 13] = [3, 20, 1008, 20, 1, 21, 1005, 21, 12, 3, 20, 99, 98];

    /// Input that never blocks: reads return the last value written
    #[derive(Clone, Default)]
    struct Dial(Arc<AtomicI64>);

    impl Channel for Dial {
        fn take(&mut self) -> Result<Word> {
            Ok(self.0.load(Ordering::SeqCst))
        }

        fn put(&mut self, value: Word) -> Result<()> {
            self.0.store(value, Ordering::SeqCst);
            Ok(())
        }

        fn poll(&mut self, _timeout: Duration) -> Result<Option<Word>> {
            Ok(Some(self.0.load(Ordering::SeqCst)))
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig::default().with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_permutations_are_lexicographic() {
        assert_eq!(
            permutations(&[1, 2, 3]),
            vec![
                vec![1, 2, 3],
                vec![1, 3, 2],
                vec![2, 1, 3],
                vec![2, 3, 1],
                vec![3, 1, 2],
                vec![3, 2, 1],
            ]
        );
        assert_eq!(permutations(&[]), vec![Vec::<Word>::new()]);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(stage_name(0), "A");
        assert_eq!(stage_name(4), "E");
        assert_eq!(stage_name(30), "stage-30");
    }

    #[test]
    fn test_chain_of_adders() {
        // out = phase + signal
        let program = [3, 11, 3, 12, 1, 11, 12, 13, 4, 13, 99, 0, 0, 0];
        let signal = run_chain(&program, &[1, 2, 3], 10, &config()).unwrap();
        assert_eq!(signal, Some(16));
    }

    #[test]
    fn test_best_phase_sequence_picks_first_maximum() {
        let best = best_phase_sequence(&[0, 1, 2], |p| Ok(Some(p[0] * 10 + p[2]))).unwrap();
        assert_eq!(best, Some((vec![2, 0, 1], 21)));
        let none = best_phase_sequence(&[0, 1], |_| Ok(None)).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn test_chain_reports_failures() {
        let err = run_chain(&[3, 0, 98], &[1], 0, &config()).unwrap_err();
        assert_eq!(err, VmError::UnknownOpcode { opcode: 98, ip: 2 });
    }

    #[test]
    fn test_device_loop_replies_feed_back() {
        // emit 5, read the reply, emit it doubled by the program, halt
        let program = [104, 5, 3, 11, 1002, 11, 2, 11, 4, 11, 99];
        let input = Wire::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let device = move |value: Word| {
            lock(&log).push(value);
            (value == 5).then_some(value + 1)
        };
        let state = run_device("doubler", &program, input, device, &config()).unwrap();
        assert_eq!(*lock(&seen), vec![5, 12]);
        assert_eq!(state.memory.read(11), Ok(12));
    }

    #[test]
    fn test_chain_surfaces_upstream_failure() {
        // B waits on A's output; A crashes before writing anything
        let err = run_chain(&CRASH_ON_ONE, &[1, 2], 0, &config()).unwrap_err();
        assert_eq!(err, VmError::UnknownOpcode { opcode: 98, ip: 12 });
    }

    #[test]
    fn test_feedback_loop_surfaces_upstream_failure() {
        let err = run_feedback_loop(&CRASH_ON_ONE, &[1, 2], 0, &config()).unwrap_err();
        assert_eq!(err, VmError::UnknownOpcode { opcode: 98, ip: 12 });
    }

    #[test]
    fn test_feedback_loop_releases_head_waiting_on_relay() {
        // phase 2 wants a second signal that only the crashed tail could send
        let program = [3, 20, 1008, 20, 1, 21, 1005, 21, 14, 3, 20, 3, 20, 99, 98];
        let err = run_feedback_loop(&program, &[2, 1], 0, &config()).unwrap_err();
        assert_eq!(err, VmError::UnknownOpcode { opcode: 98, ip: 14 });
    }

    #[test]
    fn test_device_reply_reaches_non_blocking_input() {
        // emit 7, read the reply into [20], echo it, halt
        let program = [104, 7, 3, 20, 4, 20, 99];
        for _ in 0..10 {
            let dial = Dial::default();
            let slow_triple = |value: Word| {
                thread::sleep(Duration::from_millis(5));
                Some(value * 3)
            };
            let state = run_device("dial", &program, dial.clone(), slow_triple, &config()).unwrap();
            assert_eq!(state.memory.read(20), Ok(21));
            assert_eq!(dial.0.load(Ordering::SeqCst), 63);
        }
    }
}
