//! Sample-to-command decoder
//!
//! Runs the pulse classifier and chord aggregator over batches of samples
//! inside the capture callback. Per sample work is O(1) and allocation
//! free; the clock is read at most once per batch, and only when a pulse
//! was confirmed in it.

use std::time::Instant;

use crate::chord::ChordAggregator;
use crate::classifier::{ClassifierState, PulseClassifier, PulseDetected, Thresholds};
use crate::events::DecoderEvent;

/// Source of arrival times for sample batches
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Monotonic system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Classifier and chord aggregator wired together
#[derive(Debug)]
pub struct Decoder<C = SystemClock> {
    classifier: PulseClassifier,
    chords: ChordAggregator,
    clock: C,
    /// Index of the next sample to be fed
    next_index: u64,
}

impl Decoder<SystemClock> {
    /// Create a decoder reading the system clock
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_clock(thresholds, SystemClock)
    }
}

impl<C: Clock> Decoder<C> {
    /// Create a decoder with a custom clock
    pub fn with_clock(thresholds: Thresholds, clock: C) -> Self {
        Self {
            classifier: PulseClassifier::new(thresholds),
            chords: ChordAggregator::new(thresholds.chord_len),
            clock,
            next_index: 0,
        }
    }

    /// Current classifier phase
    pub fn state(&self) -> ClassifierState {
        self.classifier.state()
    }

    /// Number of samples processed so far
    pub fn samples_seen(&self) -> u64 {
        self.next_index
    }

    /// Process one batch of samples in order
    ///
    /// The batch is assumed to have just arrived: a pulse is timestamped by
    /// back-dating the arrival time by the samples that follow it.
    pub fn process<I, F>(&mut self, samples: I, mut emit: F)
    where
        I: IntoIterator<Item = u8>,
        I::IntoIter: ExactSizeIterator,
        F: FnMut(DecoderEvent),
    {
        let samples = samples.into_iter();
        let batch_end = self.next_index + samples.len() as u64;
        let mut arrival = None;

        for sample in samples {
            let sample_index = self.next_index;
            self.next_index += 1;

            let before = self.classifier.state();
            let pulse = self.classifier.feed(sample, sample_index);
            let after = self.classifier.state();

            if before != after {
                emit(DecoderEvent::StateChanged {
                    from: before,
                    to: after,
                    sample_index,
                });
            }

            let Some(pulse) = pulse else {
                continue;
            };

            let arrived = *arrival.get_or_insert_with(|| self.clock.now());
            let at = self.pulse_time(arrived, batch_end, pulse);

            emit(DecoderEvent::PulseDetected {
                sample_index: pulse.sample_index,
            });

            if let Some(command) = self.chords.on_pulse(pulse, at) {
                emit(DecoderEvent::CommandEmitted {
                    command,
                    presses: self.chords.presses(),
                });
            }
        }
    }

    /// Process a batch held in a slice
    pub fn process_batch<F>(&mut self, batch: &[u8], emit: F)
    where
        F: FnMut(DecoderEvent),
    {
        self.process(batch.iter().copied(), emit);
    }

    fn pulse_time(&self, arrived: Instant, batch_end: u64, pulse: PulseDetected) -> Instant {
        let lag = self
            .classifier
            .thresholds()
            .samples_to_duration(batch_end.saturating_sub(pulse.sample_index));
        arrived.checked_sub(lag).unwrap_or(arrived)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::*;
    use crate::chord::Command;

    /// Clock that only moves when told to
    struct ManualClock {
        now: Cell<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Cell::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for &ManualClock {
        fn now(&self) -> Instant {
            self.now.get()
        }
    }

    /// Samples for one canonical pulse: arm, high segment, return to low
    fn pulse_samples(t: &Thresholds) -> Vec<u8> {
        let mut samples = vec![0u8; (t.low_len + 1) as usize];
        samples.extend(std::iter::repeat(255u8).take((t.high_len / 8 + 1) as usize));
        samples.extend(std::iter::repeat(0u8).take((t.low_len / 4 + 1) as usize));
        samples
    }

    fn commands(events: &[DecoderEvent]) -> Vec<Command> {
        events
            .iter()
            .filter_map(|event| match event {
                DecoderEvent::CommandEmitted { command, .. } => Some(*command),
                _ => None,
            })
            .collect()
    }

    fn run(decoder: &mut Decoder<&ManualClock>, batch: &[u8]) -> Vec<DecoderEvent> {
        let mut events = Vec::new();
        decoder.process_batch(batch, |event| events.push(event));
        events
    }

    #[test]
    fn test_single_pulse_events() {
        let clock = ManualClock::new();
        let t = Thresholds::default();
        let mut decoder = Decoder::with_clock(t, &clock);

        let events = run(&mut decoder, &pulse_samples(&t));

        let pulse_index = u64::from(t.low_len + 1 + t.high_len / 8 + 1);
        assert_eq!(
            events,
            vec![
                DecoderEvent::StateChanged {
                    from: ClassifierState::Idle,
                    to: ClassifierState::HighHold,
                    sample_index: u64::from(t.low_len),
                },
                DecoderEvent::StateChanged {
                    from: ClassifierState::HighHold,
                    to: ClassifierState::Cooldown,
                    sample_index: pulse_index - 1,
                },
                DecoderEvent::StateChanged {
                    from: ClassifierState::Cooldown,
                    to: ClassifierState::Idle,
                    sample_index: pulse_index + u64::from(t.low_len / 4),
                },
                DecoderEvent::PulseDetected {
                    sample_index: pulse_index
                },
                DecoderEvent::CommandEmitted {
                    command: Command::Play,
                    presses: 1
                },
            ]
        );
        assert_eq!(decoder.state(), ClassifierState::Idle);
    }

    #[test]
    fn test_two_pulses_inside_window() {
        let clock = ManualClock::new();
        let t = Thresholds::default();
        let mut decoder = Decoder::with_clock(t, &clock);

        let mut batch = pulse_samples(&t);
        batch.extend(pulse_samples(&t));
        let events = run(&mut decoder, &batch);

        assert_eq!(commands(&events), vec![Command::Play, Command::Next]);
    }

    #[test]
    fn test_two_pulses_outside_window() {
        let clock = ManualClock::new();
        let t = Thresholds::default();
        let mut decoder = Decoder::with_clock(t, &clock);

        // Half a second of program audio between the pulses
        let mut batch = pulse_samples(&t);
        batch.extend(std::iter::repeat(128u8).take(22_050));
        batch.extend(pulse_samples(&t));
        let events = run(&mut decoder, &batch);

        assert_eq!(commands(&events), vec![Command::Play, Command::Play]);
    }

    #[test]
    fn test_three_pulses_inside_window() {
        let clock = ManualClock::new();
        let t = Thresholds::default();
        let mut decoder = Decoder::with_clock(t, &clock);

        let batch: Vec<u8> = (0..3).flat_map(|_| pulse_samples(&t)).collect();
        let events = run(&mut decoder, &batch);

        assert_eq!(
            commands(&events),
            vec![Command::Play, Command::Next, Command::Previous]
        );
    }

    #[test]
    fn test_pulses_across_batches_use_arrival_time() {
        let clock = ManualClock::new();
        let t = Thresholds::default();
        let mut decoder = Decoder::with_clock(t, &clock);

        let first = run(&mut decoder, &pulse_samples(&t));
        clock.advance(Duration::from_millis(100));
        let second = run(&mut decoder, &pulse_samples(&t));
        clock.advance(Duration::from_secs(1));
        let third = run(&mut decoder, &pulse_samples(&t));

        assert_eq!(commands(&first), vec![Command::Play]);
        assert_eq!(commands(&second), vec![Command::Next]);
        assert_eq!(commands(&third), vec![Command::Play]);
    }

    #[test]
    fn test_pulse_split_across_batches() {
        let clock = ManualClock::new();
        let t = Thresholds::default();
        let mut decoder = Decoder::with_clock(t, &clock);

        let samples = pulse_samples(&t);
        let (head, tail) = samples.split_at(1000);

        assert!(commands(&run(&mut decoder, head)).is_empty());
        assert_eq!(commands(&run(&mut decoder, tail)), vec![Command::Play]);
        assert_eq!(decoder.samples_seen(), samples.len() as u64);
    }

    #[test]
    fn test_steady_audio_emits_nothing() {
        let clock = ManualClock::new();
        let mut decoder = Decoder::with_clock(Thresholds::default(), &clock);

        let batch: Vec<u8> = (0..44_100u32).map(|i| (96 + (i % 64)) as u8).collect();
        assert!(run(&mut decoder, &batch).is_empty());
    }
}
