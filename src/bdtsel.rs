//! Stage 2: final classifier cut on the scored event stores
//!
//! The `Trigger_Mode` column of the step 2 log holds the same label as the
//! step 1 log, i.e. `Mixture` or the name of the target trigger path, rather
//! than the `mix` tag used in file names.

use crate::{
    config::{FinalSelectionConfig, SampleInfo, SampleManifest},
    discovery::{ScoredFileQuery, DEFAULT_BDT_SUFFIX},
    error::{SampleError, SampleResult},
    numeric::Float,
    output::{self, DEFAULT_LOGS_DIR},
    store::EventStore,
    trigger::{ModeArgs, TriggerMode},
    Result,
};

use eyre::WrapErr;
use serde::Serialize;
use tracing::{error, info, warn};

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

/// Column of total event weights written by the preselection
const TOTAL_WEIGHT: &str = "total_weight";

/// Command line flags of the final selection stage
#[derive(clap::Args, Clone, Debug)]
pub struct BdtSelectArgs {
    /// Cuts file
    #[arg(long, default_value = "config/cuts.yml")]
    pub config: PathBuf,

    /// Sample manifest
    #[arg(long, default_value = "config/samples.yml")]
    pub samples: PathBuf,

    /// Base directory of the scored event stores
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Trigger mode selection
    #[command(flatten)]
    pub mode: ModeArgs,

    /// File name suffix added by the scoring step
    #[arg(long, default_value = DEFAULT_BDT_SUFFIX)]
    pub bdt_suffix: String,

    /// Directory of the cutflow logs
    #[arg(long, default_value = DEFAULT_LOGS_DIR)]
    pub logs: PathBuf,
}

/// Run the final selection stage
pub fn run(args: &BdtSelectArgs) -> Result<()> {
    let mode = args.mode.resolve()?;
    let config = FinalSelectionConfig::load(&args.config).wrap_err("Failed to load the configuration")?;
    let manifest = SampleManifest::load(&args.samples).wrap_err("Failed to load the sample manifest")?;
    let saved_time = Instant::now();

    let selection = FinalSelection {
        config: &config,
        mode: &mode,
        input_dir: &args.input_dir,
        suffix: &args.bdt_suffix,
    };
    let rows = selection.run_batch(&manifest.samples);

    let file_name = output::cutflow_file_name(2, mode.tag());
    let log_path = output::write_cutflow(&args.logs, &file_name, &rows)
        .wrap_err("Failed to write the cutflow log")?;
    output::report_run(&log_path, rows.len(), saved_time.elapsed())
}

/// One line of the final selection log
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FinalRow {
    #[serde(rename = "Sample Name")]
    pub sample_name: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "Trigger_Mode")]
    pub trigger_mode: String,
    #[serde(rename = "BDT_Cut_Value")]
    pub cut_value: Float,
    #[serde(rename = "SoW_Pre_BDT")]
    pub sow_pre: Float,
    #[serde(rename = "SoW_Post_BDT")]
    pub sow_post: Float,
    #[serde(rename = "Efficiency")]
    pub efficiency: Float,
    #[serde(rename = "Weighted")]
    pub weighted: bool,
}

/// Final selection of a batch of samples
pub struct FinalSelection<'a> {
    /// Classifier cut
    pub config: &'a FinalSelectionConfig,

    /// Trigger mode of the scored files
    pub mode: &'a TriggerMode,

    /// Base directory of the scored event stores
    pub input_dir: &'a Path,

    /// File name suffix added by the scoring step
    pub suffix: &'a str,
}
//
impl FinalSelection<'_> {
    /// Process every region of every sample, skipping those that fail
    pub fn run_batch(&self, samples: &[SampleInfo]) -> Vec<FinalRow> {
        let mut rows = Vec::new();
        for sample in samples {
            info!("Processing {}...", sample.name);
            for region in &sample.regions {
                match self.process_region(sample, region) {
                    Ok(row) => rows.push(row),
                    Err(SampleError::MissingInput(core)) => warn!(
                        "Could not find scored file for region '{region}' matching core '{}'",
                        core.display()
                    ),
                    Err(e) => error!("{}: region {region} skipped: {e}", sample.name),
                }
            }
        }
        rows
    }

    /// Locate the scored file of a region and apply the classifier cut
    pub fn process_region(&self, sample: &SampleInfo, region: &str) -> SampleResult<FinalRow> {
        let core_name = sample
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let query = ScoredFileQuery {
            sample: &sample.name,
            region,
            core_name: &core_name,
            suffix: self.suffix,
            trigger_tag: self.mode.tag(),
        };
        let path = query
            .find(self.input_dir)
            .ok_or_else(|| SampleError::MissingInput(PathBuf::from(&core_name)))?;
        let store = EventStore::read(&path)?;

        let scores = store.numeric(&self.config.bdt_branch).ok_or_else(|| {
            SampleError::Config(format!(
                "branch '{}' not found in {}",
                self.config.bdt_branch,
                path.display()
            ))
        })?;
        let weights = store.numeric(TOTAL_WEIGHT);
        if weights.is_none() {
            warn!("'{TOTAL_WEIGHT}' missing in {}. Counts will be raw!", path.display());
        }
        let weight = |row: usize| weights.map_or(1., |w| w[row]);

        let cut = self.config.cut_value;
        let (sow_pre, sow_post) = (0..store.num_rows()).fold((0., 0.), |(pre, post), row| {
            let w = weight(row);
            let kept = if scores[row] > cut { w } else { 0. };
            (pre + w, post + kept)
        });
        let efficiency = output::efficiency(sow_post, sow_pre);
        info!(
            "  -> Region: {region} | Found: {} | Eff: {:.2}%",
            path.file_name().map_or_else(Default::default, |n| n.to_string_lossy()),
            100. * efficiency
        );

        Ok(FinalRow {
            sample_name: sample.name.clone(),
            region: region.to_owned(),
            trigger_mode: self.mode.label().to_owned(),
            cut_value: cut,
            sow_pre,
            sow_post,
            efficiency,
            weighted: weights.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample(regions: &[&str]) -> SampleInfo {
        SampleInfo {
            path: PathBuf::from("/eos/Bu_kaon.csv"),
            name: "Bu_K".to_owned(),
            is_data: false,
            regions: regions.iter().map(|&r| r.to_owned()).collect(),
        }
    }

    fn config() -> FinalSelectionConfig {
        FinalSelectionConfig {
            bdt_branch: "bdt_score".to_owned(),
            cut_value: 0.5,
        }
    }

    #[test]
    fn weighted_yields() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("jpsi")).unwrap();
        fs::write(
            dir.path().join("jpsi/Bu_kaon_skimmed_mix_wScores.csv"),
            "bdt_score,total_weight\n0.9,2\n0.5,1\n0.1,1\n0.7,4\n",
        )
        .unwrap();
        let (config, mode) = (config(), TriggerMode::Mixture);
        let selection = FinalSelection {
            config: &config,
            mode: &mode,
            input_dir: dir.path(),
            suffix: DEFAULT_BDT_SUFFIX,
        };
        let row = selection.process_region(&sample(&["jpsi"]), "jpsi").unwrap();
        assert_eq!(row.sow_pre, 8.);
        // The cut is strict, 0.5 is rejected
        assert_eq!(row.sow_post, 6.);
        assert_eq!(row.efficiency, 0.75);
        assert!(row.weighted);
        assert_eq!(row.trigger_mode, "Mixture");
    }

    #[test]
    fn unweighted_fallback_and_failures() {
        let dir = tempfile::tempdir().unwrap();
        let scored = dir.path().join("Bu_K/psi2s_wScores");
        fs::create_dir_all(&scored).unwrap();
        fs::write(
            scored.join("Bu_kaon_skimmed_L1_8p0_wScores.csv"),
            "bdt_score\n0.9\n0.2\n",
        )
        .unwrap();
        fs::write(
            scored.join("Bu_kaon_skimmed_L1_6p5_wScores.csv"),
            "other\n0.9\n",
        )
        .unwrap();
        let config = config();
        let run = |target: &str, region: &str| {
            let mode = TriggerMode::Single(target.to_owned());
            FinalSelection {
                config: &config,
                mode: &mode,
                input_dir: dir.path(),
                suffix: DEFAULT_BDT_SUFFIX,
            }
            .process_region(&sample(&[region]), region)
        };

        let row = run("L1_8p0", "psi2s").unwrap();
        assert!(!row.weighted);
        assert_eq!((row.sow_pre, row.sow_post), (2., 1.));
        assert_eq!(row.trigger_mode, "L1_8p0");

        assert!(matches!(run("L1_6p5", "psi2s"), Err(SampleError::Config(_))));
        assert!(matches!(run("L1_8p0", "jpsi"), Err(SampleError::MissingInput(_))));
    }

    #[test]
    fn empty_store_has_zero_efficiency() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("none")).unwrap();
        fs::write(
            dir.path().join("none/Bu_kaon_mix_wScores.csv"),
            "bdt_score,total_weight\n",
        )
        .unwrap();
        let (config, mode) = (config(), TriggerMode::Mixture);
        let selection = FinalSelection {
            config: &config,
            mode: &mode,
            input_dir: dir.path(),
            suffix: DEFAULT_BDT_SUFFIX,
        };
        let rows = selection.run_batch(&[sample(&["none", "jpsi"])]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].efficiency, 0.);
    }
}
