//! Mechanism for loading and checking the YAML configuration
//!
//! The cuts file is shared by both selection stages, but each stage only
//! requires the keys that it actually uses. Everything is parsed and checked
//! up front, so that a broken configuration aborts the run before any sample
//! is touched.

use crate::{
    evcut::EventCut,
    expr::CompiledExpr,
    numeric::Float,
    trigger::{TriggerCatalog, TriggerPath},
    weight::{RawBin, ScaleFactorBin, ScaleFactorTable, DEFAULT_SF_VARIABLE},
    Result,
};

use eyre::{eyre, WrapErr};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::info;

use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

/// Parse a YAML file into some serde-compatible type
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).wrap_err_with(|| format!("Could not open {}", path.display()))?;
    serde_yaml::from_reader(file).wrap_err_with(|| format!("Could not parse {}", path.display()))
}

/// Unwrap a configuration key which the current stage needs
fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| eyre!("Missing configuration key {}", key))
}

/// Compile a configuration expression, tagging errors with the key
fn compile(text: &str, key: &str) -> Result<CompiledExpr> {
    CompiledExpr::compile(text).wrap_err_with(|| format!("Could not compile {}", key))
}

// ### RAW FILE CONTENTS ###

/// Cuts file, as written by the user
#[derive(Deserialize)]
struct RawConfig {
    random_seed: Option<u64>,
    trigger: Option<RawTrigger>,
    trigger_sf_params: Option<RawScaleFactors>,
    preselection: Option<RawPreselection>,
    #[serde(default)]
    q2_cuts: BTreeMap<String, String>,
    final_selection: Option<RawFinalSelection>,
}

#[derive(Deserialize)]
struct RawTrigger {
    // Kept as a YAML mapping since key order is meaningful
    fractions: Option<serde_yaml::Mapping>,
}

#[derive(Deserialize)]
struct RawScaleFactors {
    variable: Option<String>,
    bins: Option<Vec<RawBin>>,
}

#[derive(Deserialize)]
struct RawPreselection {
    triplet: Option<String>,
    bdt_score: Option<String>,
    anti_d0: Option<String>,
}

#[derive(Deserialize)]
struct RawFinalSelection {
    bdt_branch: Option<String>,
    cut_value: Option<Float>,
}

// ### STAGE 1 ###

/// Configuration of the preselection stage
pub struct PreselectionConfig {
    /// Seed of the trigger path assignment
    pub random_seed: u64,

    /// Trigger paths, with their data-taking shares
    pub catalog: TriggerCatalog,

    /// Trigger efficiency correction
    pub scale_factors: ScaleFactorTable,

    /// Cuts shared by all regions
    pub event_cut: EventCut,

    /// Region-specific cuts
    pub region_cuts: BTreeMap<String, CompiledExpr>,
}
//
impl PreselectionConfig {
    /// Load the configuration from a file, check it, and log it
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawConfig = read_yaml(path)?;
        let config = Self::from_raw(raw)?;
        config.print();
        Ok(config)
    }

    /// Check the raw configuration and decode it into concrete values
    fn from_raw(raw: RawConfig) -> Result<Self> {
        let random_seed = required(raw.random_seed, "random_seed")?;

        let fractions = required(raw.trigger, "trigger")
            .and_then(|t| required(t.fractions, "trigger.fractions"))?;
        let catalog = TriggerCatalog::new(parse_trigger_paths(fractions)?)
            .wrap_err("Invalid trigger.fractions")?;

        let sf = required(raw.trigger_sf_params, "trigger_sf_params")?;
        let scale_factors = ScaleFactorTable {
            variable: sf.variable.unwrap_or_else(|| DEFAULT_SF_VARIABLE.to_owned()),
            bins: required(sf.bins, "trigger_sf_params.bins")?
                .iter()
                .map(ScaleFactorBin::from_raw)
                .collect::<Result<Vec<_>>>()
                .wrap_err("Invalid trigger_sf_params.bins")?,
        };

        let presel = required(raw.preselection, "preselection")?;
        let presel_expr = |text: Option<String>, key: &str| {
            required(text, key).and_then(|text| compile(&text, key))
        };
        let event_cut = EventCut {
            triplet: presel_expr(presel.triplet, "preselection.triplet")?,
            bdt_score: presel_expr(presel.bdt_score, "preselection.bdt_score")?,
            anti_d0: presel_expr(presel.anti_d0, "preselection.anti_d0")?,
        };

        let region_cuts = raw
            .q2_cuts
            .iter()
            .map(|(region, text)| -> Result<(String, CompiledExpr)> {
                Ok((region.clone(), compile(text, &format!("q2_cuts.{region}"))?))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            random_seed,
            catalog,
            scale_factors,
            event_cut,
            region_cuts,
        })
    }

    /// Cut of a region, if one was configured
    pub fn region_cut(&self, region: &str) -> Option<&CompiledExpr> {
        self.region_cuts.get(region)
    }

    /// Display the configuration
    pub fn print(&self) {
        info!("random_seed        : {}", self.random_seed);
        for path in self.catalog.paths() {
            info!(
                "trigger {:<11}: fraction {} | L1 `{}` | HLT `{}`",
                path.name,
                path.fraction,
                path.l1.text(),
                path.hlt.text()
            );
        }
        info!(
            "trigger SF         : {} bins in {}",
            self.scale_factors.bins.len(),
            self.scale_factors.variable
        );
        info!("triplet cut        : {}", self.event_cut.triplet.text());
        info!("BDT score cut      : {}", self.event_cut.bdt_score.text());
        info!("anti-D0 veto       : {}", self.event_cut.anti_d0.text());
        for (region, cut) in &self.region_cuts {
            info!("q2 cut {:<12}: {}", region, cut.text());
        }
    }
}

/// Decode the ordered `path: [fraction, L1, HLT]` mapping
fn parse_trigger_paths(fractions: serde_yaml::Mapping) -> Result<Vec<TriggerPath>> {
    fractions
        .into_iter()
        .map(|(key, value)| -> Result<TriggerPath> {
            let name = key
                .as_str()
                .ok_or_else(|| eyre!("Trigger path names must be strings, got {:?}", key))?
                .to_owned();
            let (fraction, l1, hlt): (Float, String, String) = serde_yaml::from_value(value)
                .wrap_err_with(|| format!("Trigger path {name} must be [fraction, L1, HLT]"))?;
            Ok(TriggerPath {
                l1: compile(&l1, &format!("trigger.fractions.{name} (L1)"))?,
                hlt: compile(&hlt, &format!("trigger.fractions.{name} (HLT)"))?,
                name,
                fraction,
            })
        })
        .collect()
}

// ### STAGE 2 ###

/// Configuration of the final discriminant selection
#[derive(Clone, Debug, PartialEq)]
pub struct FinalSelectionConfig {
    /// Column holding the classifier score
    pub bdt_branch: String,

    /// Events are kept if their score is strictly above this value
    pub cut_value: Float,
}
//
impl FinalSelectionConfig {
    /// Load the final selection part of the cuts file
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawConfig = read_yaml(path)?;
        let config = Self::from_raw(raw)?;
        info!("BDT branch         : {}", config.bdt_branch);
        info!("BDT cut value      : {}", config.cut_value);
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let raw = required(raw.final_selection, "final_selection")?;
        Ok(Self {
            bdt_branch: required(raw.bdt_branch, "final_selection.bdt_branch")?,
            cut_value: required(raw.cut_value, "final_selection.cut_value")?,
        })
    }
}

// ### SAMPLE MANIFEST ###

/// List of samples to be processed
#[derive(Clone, Debug, Deserialize)]
pub struct SampleManifest {
    /// Samples, processed in this order
    pub samples: Vec<SampleInfo>,
}
//
impl SampleManifest {
    /// Load the sample manifest
    pub fn load(path: &Path) -> Result<Self> {
        read_yaml(path)
    }
}

/// One input sample
#[derive(Clone, Debug, Deserialize)]
pub struct SampleInfo {
    /// Location of the input event store
    pub path: PathBuf,

    /// Name of the sample in the cutflow tables
    pub name: String,

    /// Truth that this is real data rather than simulation
    #[serde(default)]
    pub is_data: bool,

    /// Regions in which the sample should be selected
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
}

fn default_regions() -> Vec<String> {
    vec!["none".to_owned()]
}
