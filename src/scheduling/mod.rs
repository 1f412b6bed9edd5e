//! This module takes care of scheduling the selection work, encapsulating use
//! of multiple threads and anything else that will come in the future

#[cfg(feature = "multi-threading")]
mod multi_threading;
#[cfg(not(feature = "multi-threading"))]
mod sequential;

use crate::{assign::DRAWS_PER_EVENT, random::RandomGenerator, resacc::ResultsAccumulator};

use std::ops::Range;

/// Size of the event batches
///
/// Events are grouped in batches of a certain size, each of which gets its
/// own copy of the random number generator, positioned where a sequential
/// run would have left it. This makes the random trigger assignment of each
/// event depend only on its index, not on how the work was split.
///
const EVENT_BATCH_SIZE: usize = 10_000;

/// Run the selection kernel over all events of a sample, in the manner that
/// was configured at build time.
///
/// Takes as parameters the number of events, the freshly seeded random
/// number generator of the sample, and a kernel that processes a contiguous
/// range of events given the generator state at the start of that range.
///
pub fn run_selection(
    num_events: usize,
    rng: RandomGenerator,
    kernel: impl Send + Sync + Fn(Range<usize>, &mut RandomGenerator) -> ResultsAccumulator,
) -> ResultsAccumulator {
    run_batched(num_events, EVENT_BATCH_SIZE, rng, kernel)
}

/// Same as run_selection, with a tunable batch size
fn run_batched(
    num_events: usize,
    batch_size: usize,
    rng: RandomGenerator,
    kernel: impl Send + Sync + Fn(Range<usize>, &mut RandomGenerator) -> ResultsAccumulator,
) -> ResultsAccumulator {
    assert!(batch_size > 0, "Batches should not be empty");

    // Empty samples are legitimate and need no scheduling at all
    if num_events == 0 {
        return ResultsAccumulator::default();
    }

    // Process the events...
    let batches = batches(num_events, batch_size);

    // ...in sequential mode
    #[cfg(not(feature = "multi-threading"))]
    {
        sequential::run_selection_impl(num_events, batches, rng, kernel)
    }

    // ...in multi-threaded mode
    #[cfg(feature = "multi-threading")]
    {
        multi_threading::run_selection_impl(batches, rng, kernel)
    }
}

/// Split a range of events into consecutive batches
fn batches(num_events: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    (0..num_events)
        .step_by(batch_size)
        .map(move |start| start..(start + batch_size).min(num_events))
}

/// Advance a random number generator past a batch of events
fn skip_batch(rng: &mut RandomGenerator, batch: &Range<usize>) {
    rng.skip(batch.len() * DRAWS_PER_EVENT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{numeric::Float, pipeline::Stage, weight::EventWeight};
    use proptest::prelude::*;

    /// Kernel which records one random draw per event, and the event index
    /// as the weight so that ordering can be checked
    fn recording_kernel(events: Range<usize>, rng: &mut RandomGenerator) -> ResultsAccumulator {
        let mut acc = ResultsAccumulator::with_capacity(events.len());
        for row in events {
            let weight = EventWeight {
                total: row as Float,
                ..EventWeight::DATA
            };
            acc.integrate(weight, Some((rng.random(), 0)), Stage::Loaded);
        }
        acc
    }

    #[test]
    fn batches_cover_all_events() {
        let b: Vec<_> = batches(25, 10).collect();
        assert_eq!(b, [0..10, 10..20, 20..25]);
        let b: Vec<_> = batches(20, 10).collect();
        assert_eq!(b, [0..10, 10..20]);
    }

    #[test]
    fn empty_sample() {
        let result = run_selection(0, RandomGenerator::new(1), recording_kernel);
        assert_eq!(result.stages.len(), 0);
    }

    #[test]
    fn draws_follow_the_event_index() {
        let result = run_selection(100, RandomGenerator::new(9), recording_kernel);
        let mut rng = RandomGenerator::new(9);
        let expected: Vec<_> = (0..100).map(|_| rng.random()).collect();
        assert_eq!(result.draws, expected);
        let order: Vec<_> = (0..100).map(|i| i as Float).collect();
        assert_eq!(result.total, order);
    }

    proptest! {
        #[test]
        fn batching_does_not_change_results(
            num_events in 0usize..300,
            batch_size in 1usize..64,
            seed in any::<u64>(),
        ) {
            let reference = run_batched(num_events, 1_000, RandomGenerator::new(seed), recording_kernel);
            let batched = run_batched(num_events, batch_size, RandomGenerator::new(seed), recording_kernel);
            prop_assert_eq!(reference, batched);
        }
    }
}
