//! Sequential back-end of the selection

use crate::{random::RandomGenerator, resacc::ResultsAccumulator};

use std::ops::Range;

/// Process events in sequential mode
///
/// We use batched logic even in sequential mode, in order to exercise the
/// same code path as multi-threaded runs.
///
pub fn run_selection_impl(
    num_events: usize,
    batches: impl Iterator<Item = Range<usize>>,
    mut rng: RandomGenerator,
    kernel: impl Fn(Range<usize>, &mut RandomGenerator) -> ResultsAccumulator,
) -> ResultsAccumulator {
    let mut accumulator = ResultsAccumulator::with_capacity(num_events);
    for batch in batches {
        // Each batch starts from a copy of the generator, which is then moved
        // past the batch exactly as the multi-threaded scheduler does
        let mut batch_rng = rng.clone();
        super::skip_batch(&mut rng, &batch);
        accumulator.merge(kernel(batch, &mut batch_rng));
    }
    accumulator
}
