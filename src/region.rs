//! Branching of a preselected sample into kinematic regions, and the cutflow
//! bookkeeping that goes with it

use crate::{
    error::SampleResult,
    expr::CompiledExpr,
    numeric::Float,
    pipeline::{SelectedSample, Stage, Tally},
    store::{EventStore, STORE_EXTENSION},
    trigger::TriggerMode,
};

use serde::Serialize;

use std::path::{Path, PathBuf};

/// Yields of the shared selection stages, common to all regions of a sample
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Checkpoints {
    /// Yield of each stage, indexed by `Stage::index()`
    tallies: [Tally; Stage::COUNT],
}
//
impl Checkpoints {
    /// Query the yields of every shared stage
    pub fn of(sample: &SelectedSample) -> Self {
        Self {
            tallies: Stage::ALL.map(|stage| sample.stage(stage).tally()),
        }
    }

    /// Yield of a given stage
    pub fn get(&self, stage: Stage) -> Tally {
        self.tallies[stage.index()]
    }
}

/// Events of a sample which fall inside a region
#[derive(Clone, Debug, PartialEq)]
pub struct RegionSelection {
    /// Row indices of the surviving events, in input order
    pub rows: Vec<usize>,

    /// Yield of the region
    pub tally: Tally,
}
//
impl RegionSelection {
    /// Apply a region cut on top of the full shared selection
    pub fn apply(
        cut: &CompiledExpr,
        store: &EventStore,
        sample: &SelectedSample,
    ) -> SampleResult<Self> {
        let cut = cut.bind(store)?;
        let rows = sample
            .stage(Stage::AntiD0)
            .rows()
            .iter()
            .copied()
            .filter(|&row| cut.holds(row))
            .collect::<Vec<_>>();
        let tally = sample.tally(&rows);
        Ok(Self { rows, tally })
    }
}

/// Where the selected events of a region should be written
///
/// The file name carries the trigger mode, so that outputs of different
/// modes can live in the same region directory.
///
pub fn output_path(output_dir: &Path, region: &str, input: &Path, mode: &TriggerMode) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "events".into(), |stem| stem.to_string_lossy());
    output_dir
        .join(region)
        .join(format!("{stem}_skimmed_{}.{STORE_EXTENSION}", mode.tag()))
}

/// One line of the preselection cutflow log
///
/// Fields map one-to-one to the log columns, in order.
///
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CutflowRow {
    #[serde(rename = "Sample Name")]
    pub sample_name: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Trigger_Mode")]
    pub trigger_mode: String,
    #[serde(rename = "Before")]
    pub before: Float,
    #[serde(rename = "After_Triplet")]
    pub after_triplet: Float,
    #[serde(rename = "After_Trigger")]
    pub after_trigger: Float,
    #[serde(rename = "SumWeights_Trigger")]
    pub sum_weights_trigger: Float,
    #[serde(rename = "After_PreselBDT")]
    pub after_presel_bdt: Float,
    #[serde(rename = "After_AntiD0")]
    pub after_anti_d0: Float,
    #[serde(rename = "After_Q2")]
    pub after_q2: Float,
    #[serde(rename = "N_Before")]
    pub n_before: usize,
    #[serde(rename = "N_Triplet")]
    pub n_triplet: usize,
    #[serde(rename = "N_Trigger")]
    pub n_trigger: usize,
    #[serde(rename = "N_PreselBDT")]
    pub n_presel_bdt: usize,
    #[serde(rename = "N_AntiD0")]
    pub n_anti_d0: usize,
    #[serde(rename = "N_Q2")]
    pub n_q2: usize,
}
//
impl CutflowRow {
    /// Assemble the cutflow of one region of a sample
    ///
    /// The first checkpoints are generator-weighted, as the trigger scale
    /// factor is only meaningful once the trigger decision has been applied.
    ///
    pub fn new(
        sample_name: &str,
        region: &str,
        mode: &TriggerMode,
        checkpoints: &Checkpoints,
        region_tally: Tally,
    ) -> Self {
        let at = |stage| checkpoints.get(stage);
        Self {
            sample_name: sample_name.to_owned(),
            region: region.to_owned(),
            trigger_mode: mode.label().to_owned(),
            before: at(Stage::Loaded).generator_sum,
            after_triplet: at(Stage::Triplet).generator_sum,
            after_trigger: at(Stage::Trigger).generator_sum,
            sum_weights_trigger: at(Stage::Trigger).weight_sum,
            after_presel_bdt: at(Stage::PreselBdt).weight_sum,
            after_anti_d0: at(Stage::AntiD0).weight_sum,
            after_q2: region_tally.weight_sum,
            n_before: at(Stage::Loaded).events,
            n_triplet: at(Stage::Triplet).events,
            n_trigger: at(Stage::Trigger).events,
            n_presel_bdt: at(Stage::PreselBdt).events,
            n_anti_d0: at(Stage::AntiD0).events,
            n_q2: region_tally.events,
        }
    }
}
