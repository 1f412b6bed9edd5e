//! Sequential filtering of the events of one sample
//!
//! The per-event work (weights, trigger path assignment, and the chain of
//! shared cuts) is done by a kernel that only looks at one event at a time,
//! so it can be run over batches of events in any order. The outcome for
//! each event is summarized as the last selection stage it passed, from
//! which the event list and yields of every stage can be derived.

use crate::{
    assign::TriggerAssigner,
    error::SampleResult,
    evcut::{BoundEventCut, EventCut},
    numeric::Float,
    random::RandomGenerator,
    resacc::ResultsAccumulator,
    scheduling,
    store::{Column, EventStore},
    trigger::{TriggerCatalog, TriggerDecision, TriggerPolicy},
    weight::{ScaleFactorTable, WeightModel, GENERATOR_WEIGHT},
};

use tracing::debug;

use std::{cell::OnceCell, ops::Range};

/// Checkpoints of the shared selection, in the order in which the cuts are
/// applied. Each stage only looks at events which passed the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// No cut applied
    Loaded,

    /// Triplet quality cut passed
    Triplet,

    /// Trigger decision passed
    Trigger,

    /// Preselection discriminant cut passed
    PreselBdt,

    /// Resonance veto passed
    AntiD0,
}
//
impl Stage {
    /// Number of stages
    pub const COUNT: usize = 5;

    /// All stages, in application order
    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Loaded,
        Stage::Triplet,
        Stage::Trigger,
        Stage::PreselBdt,
        Stage::AntiD0,
    ];

    /// Position of the stage in the selection chain
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Event count and weight sums of a set of events
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tally {
    /// Number of events
    pub events: usize,

    /// Sum of generator-level weights
    pub generator_sum: Float,

    /// Sum of total weights
    pub weight_sum: Float,
}
//
impl Tally {
    /// Sum up a list of events, in the order given
    pub fn over(rows: &[usize], generator: &[Float], total: &[Float]) -> Self {
        rows.iter().fold(Self::default(), |acc, &row| Self {
            events: acc.events + 1,
            generator_sum: acc.generator_sum + generator[row],
            weight_sum: acc.weight_sum + total[row],
        })
    }
}

/// Per-event work of the selection, bound to one sample
pub struct SelectionKernel<'a> {
    /// Event weight computation
    weights: WeightModel<'a>,

    /// Trigger path assigner, in mixture mode on simulation
    assigner: Option<&'a TriggerAssigner>,

    /// Trigger decision
    trigger: TriggerDecision<'a>,

    /// Shared cuts
    cut: BoundEventCut<'a>,
}
//
impl<'a> SelectionKernel<'a> {
    /// Bind the selection to the columns of a sample
    ///
    /// A missing column referenced by any cut, trigger predicate, or the
    /// scale factor binning is reported here, before any event is processed.
    ///
    #[allow(clippy::too_many_arguments)]
    pub fn bind(
        store: &'a EventStore,
        is_data: bool,
        policy: TriggerPolicy,
        catalog: &'a TriggerCatalog,
        assigner: &'a TriggerAssigner,
        scale_factors: &'a ScaleFactorTable,
        event_cut: &'a EventCut,
        progress: &mut Progress,
    ) -> SampleResult<Self> {
        let weights = WeightModel::bind(scale_factors, store, is_data)?;
        progress.advance(SampleState::WeightsDefined);
        let assigner = policy.needs_assignment().then_some(assigner);
        let trigger = TriggerDecision::bind(policy, catalog, store)?;
        progress.advance(SampleState::TriggerDefined);
        Ok(Self {
            weights,
            assigner,
            trigger,
            cut: event_cut.bind(store)?,
        })
    }

    /// Process a contiguous range of events
    ///
    /// `rng` must be positioned at the first event of the range. In mixture
    /// mode, exactly one number is drawn per event, before any cut is applied,
    /// so that the assignment of an event never depends on the cuts.
    ///
    pub fn process(&self, events: Range<usize>, rng: &mut RandomGenerator) -> ResultsAccumulator {
        let mut acc = ResultsAccumulator::with_capacity(events.len());
        for row in events {
            let weight = self.weights.weigh(row);
            let assignment = self.assigner.map(|assigner| {
                let draw = rng.random();
                (draw, assigner.assign(draw))
            });
            let stage = self.last_stage(row, assignment.map(|(_, path)| path));
            acc.integrate(weight, assignment, stage);
        }
        acc
    }

    /// Apply the shared cuts in order, stopping at the first failure
    fn last_stage(&self, row: usize, assigned: Option<usize>) -> Stage {
        if !self.cut.keep_triplet(row) {
            Stage::Loaded
        } else if !self.trigger.passes(row, assigned) {
            Stage::Triplet
        } else if !self.cut.keep_bdt_score(row) {
            Stage::Trigger
        } else if !self.cut.keep_anti_d0(row) {
            Stage::PreselBdt
        } else {
            Stage::AntiD0
        }
    }

    /// Run the kernel over all events of a sample
    pub fn run(&self, num_events: usize, seed: u64) -> SelectedSample {
        let results = scheduling::run_selection(num_events, RandomGenerator::new(seed), |events, rng| {
            self.process(events, rng)
        });
        SelectedSample::new(results, self.assigner.is_some())
    }
}

/// Lazily computed view of one selection stage
#[derive(Default)]
struct StageCache {
    rows: OnceCell<Vec<usize>>,
    tally: OnceCell<Tally>,
}

/// Outcome of the shared selection on one sample
pub struct SelectedSample {
    /// Derived per-event quantities and last passed stage
    results: ResultsAccumulator,

    /// Per-stage event lists and yields, computed on first use
    caches: [StageCache; Stage::COUNT],

    /// Truth that events were randomly assigned to trigger paths
    with_assignment: bool,
}
//
impl SelectedSample {
    /// Wrap the merged kernel output
    pub fn new(results: ResultsAccumulator, with_assignment: bool) -> Self {
        Self {
            results,
            caches: Default::default(),
            with_assignment,
        }
    }

    /// Materialize the shared filter stages in order, logging their yields
    pub fn filter(&self, progress: &mut Progress) {
        for &stage in &Stage::ALL {
            let count = self.stage(stage).count();
            debug!("{}: {count} events after {stage:?}", progress.label);
            if let Some(state) = SampleState::after(stage) {
                progress.advance(state);
            }
        }
    }

    /// Look at the events which passed a given stage
    pub fn stage(&self, stage: Stage) -> StageView<'_> {
        StageView {
            sample: self,
            stage,
        }
    }

    /// Sum up an arbitrary subset of the events
    pub fn tally(&self, rows: &[usize]) -> Tally {
        Tally::over(rows, &self.results.generator, &self.results.total)
    }

    /// Derived columns, as they should be appended to output event stores
    ///
    /// The generator weight is only emitted when it was not read from the
    /// input (or when real data overrides it with 1). Assignment columns are
    /// emitted whenever assignment was on, even for an empty sample.
    ///
    pub fn output_columns(
        &self,
        store: &EventStore,
        is_data: bool,
        catalog: &TriggerCatalog,
    ) -> Vec<(&'static str, Column)> {
        let r = &self.results;
        let mut columns = Vec::with_capacity(6);
        if is_data || !store.has_column(GENERATOR_WEIGHT) {
            columns.push((GENERATOR_WEIGHT, Column::Numeric(r.generator.clone())));
        }
        columns.push(("trigger_sf_value", Column::Numeric(r.sf_value.clone())));
        columns.push(("trigger_sf_error", Column::Numeric(r.sf_error.clone())));
        columns.push(("total_weight", Column::Numeric(r.total.clone())));
        if self.with_assignment {
            let names = r
                .assigned
                .iter()
                .map(|&path| catalog.paths()[path].name.clone())
                .collect();
            columns.push(("rand", Column::Numeric(r.draws.clone())));
            columns.push(("assigned_path", Column::Text(names)));
        }
        columns
    }
}

/// Events which passed a given stage of the shared selection
///
/// Queries are computed on first use and cached, so asking for the count
/// and the weight sums of a stage scans the events only once.
///
#[derive(Clone, Copy)]
pub struct StageView<'a> {
    sample: &'a SelectedSample,
    stage: Stage,
}
//
impl<'a> StageView<'a> {
    fn cache(&self) -> &'a StageCache {
        &self.sample.caches[self.stage.index()]
    }

    /// Indices of the surviving events, in input order
    pub fn rows(&self) -> &'a [usize] {
        let stage = self.stage;
        self.cache().rows.get_or_init(|| {
            self.sample
                .results
                .stages
                .iter()
                .enumerate()
                .filter(|(_, &last)| last >= stage)
                .map(|(row, _)| row)
                .collect()
        })
    }

    /// Count and weight sums of the surviving events
    pub fn tally(&self) -> Tally {
        *self
            .cache()
            .tally
            .get_or_init(|| self.sample.tally(self.rows()))
    }

    /// Number of surviving events
    pub fn count(&self) -> usize {
        self.tally().events
    }
}

/// Progress of one sample through the processing steps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleState {
    /// Events read from disk
    Loaded,
    /// Generator weight, scale factors and total weight known
    WeightsDefined,
    /// Trigger path assignment done (or not needed)
    TriggerDefined,
    /// Triplet cut applied
    TripletFiltered,
    /// Trigger decision applied
    TriggerFiltered,
    /// Preselection discriminant cut applied
    PreselFiltered,
    /// Resonance veto applied
    VetoFiltered,
    /// Region cut applied
    RegionFiltered,
    /// Output event store written
    Written,
}
//
impl SampleState {
    /// State that must come right after this one
    fn successor(self) -> Option<Self> {
        use SampleState::*;
        match self {
            Loaded => Some(WeightsDefined),
            WeightsDefined => Some(TriggerDefined),
            TriggerDefined => Some(TripletFiltered),
            TripletFiltered => Some(TriggerFiltered),
            TriggerFiltered => Some(PreselFiltered),
            PreselFiltered => Some(VetoFiltered),
            VetoFiltered => Some(RegionFiltered),
            RegionFiltered => Some(Written),
            Written => None,
        }
    }

    /// State reached once a given stage has been filtered
    pub fn after(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Loaded => None,
            Stage::Triplet => Some(SampleState::TripletFiltered),
            Stage::Trigger => Some(SampleState::TriggerFiltered),
            Stage::PreselBdt => Some(SampleState::PreselFiltered),
            Stage::AntiD0 => Some(SampleState::VetoFiltered),
        }
    }
}

/// Tracker which makes sure that no processing step is skipped
#[derive(Clone, Debug)]
pub struct Progress {
    label: String,
    state: SampleState,
}
//
impl Progress {
    /// Start tracking a freshly loaded sample (or region of a sample)
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        debug!("{label}: {:?}", SampleState::Loaded);
        Self {
            label,
            state: SampleState::Loaded,
        }
    }

    /// Fork the tracker, e.g. to follow one region
    pub fn fork(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: self.state,
        }
    }

    /// Move to the next state, which must be the expected one
    pub fn advance(&mut self, next: SampleState) {
        assert_eq!(
            self.state.successor(),
            Some(next),
            "{}: processing step skipped",
            self.label
        );
        self.state = next;
        debug!("{}: {:?}", self.label, next);
    }
}
