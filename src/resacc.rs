//! This module accumulates the per-event outcome of the selection kernel
//! across batches of consecutive events

use crate::{numeric::Float, pipeline::Stage, weight::EventWeight};

/// Per-event results of the selection kernel, for a contiguous range of
/// events. Batches are merged in event order, so that the merged result is
/// independent of how the events were split into batches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultsAccumulator {
    /// Generator-level weights
    pub generator: Vec<Float>,

    /// Trigger scale factors
    pub sf_value: Vec<Float>,

    /// Trigger scale factor uncertainties
    pub sf_error: Vec<Float>,

    /// Total event weights
    pub total: Vec<Float>,

    /// Random draws used for trigger path assignment (mixture mode only)
    pub draws: Vec<Float>,

    /// Catalog index of the assigned trigger path (mixture mode only)
    pub assigned: Vec<usize>,

    /// Last selection stage that each event passed
    pub stages: Vec<Stage>,
}
//
impl ResultsAccumulator {
    /// Prepare for the integration of a batch of events
    pub fn with_capacity(num_events: usize) -> Self {
        Self {
            generator: Vec::with_capacity(num_events),
            sf_value: Vec::with_capacity(num_events),
            sf_error: Vec::with_capacity(num_events),
            total: Vec::with_capacity(num_events),
            draws: Vec::new(),
            assigned: Vec::new(),
            stages: Vec::with_capacity(num_events),
        }
    }

    /// Integrate the outcome of the next event
    pub fn integrate(
        &mut self,
        weight: EventWeight,
        assignment: Option<(Float, usize)>,
        stage: Stage,
    ) {
        self.generator.push(weight.generator);
        self.sf_value.push(weight.sf_value);
        self.sf_error.push(weight.sf_error);
        self.total.push(weight.total);
        if let Some((draw, path)) = assignment {
            self.draws.push(draw);
            self.assigned.push(path);
        }
        self.stages.push(stage);
    }

    /// Integrate the results of the batch of events that comes right after
    #[allow(clippy::needless_pass_by_value)]
    pub fn merge(&mut self, other: Self) {
        self.generator.extend(other.generator);
        self.sf_value.extend(other.sf_value);
        self.sf_error.extend(other.sf_error);
        self.total.extend(other.total);
        self.draws.extend(other.draws);
        self.assigned.extend(other.assigned);
        self.stages.extend(other.stages);
    }
}
