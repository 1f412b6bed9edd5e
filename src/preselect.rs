//! Stage 1: preselection of every sample of the manifest
//!
//! Each sample is weighted, assigned to trigger paths, run through the
//! shared cuts, then split into its regions. Every region gets an output
//! event store and a cutflow row. A sample which cannot be processed is
//! reported and skipped, the rest of the batch carries on.

use crate::{
    assign::TriggerAssigner,
    config::{PreselectionConfig, SampleInfo, SampleManifest},
    error::{SampleError, SampleResult},
    expr::CompiledExpr,
    output::{self, DEFAULT_LOGS_DIR},
    pipeline::{Progress, SampleState, SelectedSample, SelectionKernel},
    region::{self, Checkpoints, CutflowRow, RegionSelection},
    store::{Column, EventStore},
    trigger::{ModeArgs, TriggerMode, TriggerPolicy},
    weight::GENERATOR_WEIGHT,
    Result,
};

use eyre::WrapErr;
use tracing::{debug, error, info, warn};

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

/// Command line flags of the preselection stage
#[derive(clap::Args, Clone, Debug)]
pub struct PreselectArgs {
    /// Cuts file
    #[arg(long, default_value = "config/cuts.yml")]
    pub config: PathBuf,

    /// Sample manifest
    #[arg(long, default_value = "config/samples.yml")]
    pub samples: PathBuf,

    /// Trigger mode selection
    #[command(flatten)]
    pub mode: ModeArgs,

    /// Base directory of the skimmed event stores
    #[arg(long, default_value = "data/pre_bdt_ntuples")]
    pub output: PathBuf,

    /// Directory of the cutflow logs
    #[arg(long, default_value = DEFAULT_LOGS_DIR)]
    pub logs: PathBuf,
}

/// Run the preselection stage
pub fn run(args: &PreselectArgs) -> Result<()> {
    // ### CONFIGURATION READOUT ###

    let mode = args.mode.resolve()?;
    let config = PreselectionConfig::load(&args.config).wrap_err("Failed to load the configuration")?;
    mode.validate(&config.catalog)?;
    let manifest = SampleManifest::load(&args.samples).wrap_err("Failed to load the sample manifest")?;
    info!("Trigger mode       : {}", mode.label());

    // We start the clock after configuration I/O
    let saved_time = Instant::now();

    // ### SELECTION ###

    let preselection = Preselection::new(&config, mode, &args.output);
    let rows = preselection.run_batch(&manifest.samples);

    // ### CUTFLOW STORAGE ###

    let file_name = output::cutflow_file_name(1, preselection.mode.tag());
    let log_path = output::write_cutflow(&args.logs, &file_name, &rows)
        .wrap_err("Failed to write the cutflow log")?;
    output::report_run(&log_path, rows.len(), saved_time.elapsed())
}

/// Everything needed to preselect a batch of samples
pub struct Preselection<'a> {
    config: &'a PreselectionConfig,
    mode: TriggerMode,
    assigner: TriggerAssigner,
    output_dir: &'a Path,
}
//
impl<'a> Preselection<'a> {
    /// Set up the preselection of a batch
    ///
    /// The trigger mode must have been validated against the catalog.
    ///
    pub fn new(config: &'a PreselectionConfig, mode: TriggerMode, output_dir: &'a Path) -> Self {
        let assigner = TriggerAssigner::new(&config.catalog);
        debug!("Trigger assignment CDF: {:?}", assigner.cdf());
        Self {
            config,
            mode,
            assigner,
            output_dir,
        }
    }

    /// Process every sample, collecting the cutflow rows of those that
    /// could be processed
    pub fn run_batch(&self, samples: &[SampleInfo]) -> Vec<CutflowRow> {
        let mut rows = Vec::new();
        for sample in samples {
            info!("Processing {} ({})", sample.name, sample.path.display());
            match self.process_sample(sample) {
                Ok(sample_rows) => rows.extend(sample_rows),
                Err(SampleError::MissingInput(path)) => {
                    warn!("Skipping {}: {} not found", sample.name, path.display());
                }
                Err(e) => error!("Skipping {}: {e}", sample.name),
            }
        }
        rows
    }

    /// Preselect one sample and write out its regions
    pub fn process_sample(&self, info: &SampleInfo) -> SampleResult<Vec<CutflowRow>> {
        if !info.path.exists() {
            return Err(SampleError::MissingInput(info.path.clone()));
        }
        let store = EventStore::read(&info.path)?;
        debug!(
            "{}: {} events, columns {:?}",
            info.name,
            store.num_rows(),
            store.column_names().collect::<Vec<_>>()
        );
        let mut progress = Progress::new(&info.name);

        // Bind weights and trigger decision before any event is filtered
        let config = self.config;
        if !info.is_data && !store.has_column(GENERATOR_WEIGHT) {
            warn!("{}: no {GENERATOR_WEIGHT} column, using 1", info.name);
        }
        let policy = TriggerPolicy::resolve(&self.mode, &config.catalog, info.is_data)?;
        let kernel = SelectionKernel::bind(
            &store,
            info.is_data,
            policy,
            &config.catalog,
            &self.assigner,
            &config.scale_factors,
            &config.event_cut,
            &mut progress,
        )?;

        // Run the shared selection
        let sample = kernel.run(store.num_rows(), config.random_seed);
        sample.filter(&mut progress);
        let checkpoints = Checkpoints::of(&sample);
        let extra = sample.output_columns(&store, info.is_data, &config.catalog);

        // Branch into regions, a broken region does not affect the others
        let mut rows = Vec::with_capacity(info.regions.len());
        for region in &info.regions {
            let progress = progress.fork(format!("{}/{region}", info.name));
            match self.process_region(info, region, &store, &sample, &extra, progress) {
                Ok(selection) => rows.push(CutflowRow::new(
                    &info.name,
                    region,
                    &self.mode,
                    &checkpoints,
                    selection.tally,
                )),
                Err(e) => error!("{}: region {region} skipped: {e}", info.name),
            }
        }
        Ok(rows)
    }

    /// Apply a region cut and write out the surviving events
    fn process_region(
        &self,
        info: &SampleInfo,
        region: &str,
        store: &EventStore,
        sample: &SelectedSample,
        extra: &[(&str, Column)],
        mut progress: Progress,
    ) -> SampleResult<RegionSelection> {
        let always = CompiledExpr::always_true();
        let cut = self.config.region_cut(region).unwrap_or(&always);
        let selection = RegionSelection::apply(cut, store, sample)?;
        progress.advance(SampleState::RegionFiltered);

        let out_path = region::output_path(self.output_dir, region, &info.path, &self.mode);
        info!("  -> Saving {region} region to {}", out_path.display());
        let extra = extra.iter().map(|(name, column)| (*name, column)).collect::<Vec<_>>();
        store.write_subset(&out_path, &selection.rows, &extra)?;
        progress.advance(SampleState::Written);
        Ok(selection)
    }
}
