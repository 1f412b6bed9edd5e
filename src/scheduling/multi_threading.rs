//! Multi-threaded back-end of the selection

use crate::{random::RandomGenerator, resacc::ResultsAccumulator};

use std::{ops::Range, sync::Mutex};

/// Process events in multi-threaded mode
///
/// Each batch is processed by a separate task, and the per-batch results are
/// merged in event order at the end. The outcome is thus identical to that of
/// a sequential run.
///
pub fn run_selection_impl(
    batches: impl Iterator<Item = Range<usize>>,
    mut rng: RandomGenerator,
    kernel: impl Send + Sync + Fn(Range<usize>, &mut RandomGenerator) -> ResultsAccumulator,
) -> ResultsAccumulator {
    let batches = batches.collect::<Vec<_>>();

    // The results of parallel tasks will be aggregated in event order
    let accumulator = ReproducibleAccumulator::new(batches.len());

    // This function is a synchronization scope: it will only return
    // once all inner tasks have been executed
    rayon::scope(|scope| {
        // For each batch of events...
        for (batch_id, batch) in batches.into_iter().enumerate() {
            // Spawn a task which is responsible for processing them
            let mut task_rng = rng.clone();
            super::skip_batch(&mut rng, &batch);
            let accumulator_ref = &accumulator;
            let kernel_ref = &kernel;
            scope.spawn(move |_| {
                let result = kernel_ref(batch, &mut task_rng);
                accumulator_ref.set_task_result(batch_id, result);
            });
        }
    });

    // Extract the results from the accumulator
    accumulator.get_merged_result()
}

/// Reproducibility-optimized results accumulation mechanism
struct ReproducibleAccumulator {
    /// Storage for the intermediary results of parallel tasks
    results: Box<[Mutex<Option<ResultsAccumulator>>]>,
}
//
impl ReproducibleAccumulator {
    /// Set up results storage for N parallel tasks
    fn new(num_tasks: usize) -> Self {
        assert!(num_tasks > 0, "There should be at least one task");
        Self {
            results: (0..num_tasks)
                .map(|_| Mutex::new(None))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        }
    }

    /// Integrate the results of the n-th task
    fn set_task_result(&self, task_id: usize, result: ResultsAccumulator) {
        let mut lock = self.results[task_id]
            .lock()
            .expect("Mutex data should be valid");
        assert!(lock.is_none(), "Tasks should not report results twice");
        *lock = Some(result);
    }

    /// Aggregate the results in event order
    fn get_merged_result(self) -> ResultsAccumulator {
        // Start iterating over the task results
        let mut results_iter = self.results.into_vec().into_iter().map(|entry| {
            entry
                .into_inner()
                .expect("Mutex data should be valid")
                .expect("Result should be ready")
        });

        // Initialize results storage with the result of the first task
        let first_result = results_iter
            .next()
            .expect("There should be at least one task");

        // Merge the results of the other tasks
        results_iter.fold(first_result, |mut r1, r2| {
            r1.merge(r2);
            r1
        })
    }
}
