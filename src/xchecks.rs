//! Quick R(K) cross-checks from hand-entered yields and efficiencies
//!
//! Compares muon and electron resonant yields, corrected for luminosity and
//! efficiency, and the ψ(2S)/J/ψ ratios of each channel with the
//! expectation from world-average branching fractions.

use crate::{
    config::read_yaml,
    ufloat::{pull, UFloat},
    Result,
};

use eyre::{bail, eyre, WrapErr};
use serde::Deserialize;

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

/// Width of the label column of the report
const LABEL_WIDTH: usize = 38;

/// Width of the value column of the report
const VALUE_WIDTH: usize = 25;

/// Command line flags of the cross-check calculator
#[derive(clap::Args, Clone, Debug)]
pub struct XchecksArgs {
    /// Inputs of the cross-checks
    #[arg(short, long)]
    pub config: PathBuf,
}

/// Compute and print the cross-checks
pub fn run(args: &XchecksArgs) -> Result<()> {
    let inputs = XcheckInputs::load(&args.config)?;
    let checks = CrossChecks::compute(&inputs)?;
    print!("{checks}");
    Ok(())
}

// ### INPUTS ###

/// A value with its uncertainty, as written in the input file
#[derive(Clone, Copy, Debug, Deserialize)]
struct RawValue {
    value: f64,
    error: f64,
}
//
impl From<RawValue> for UFloat {
    fn from(raw: RawValue) -> Self {
        UFloat::new(raw.value, raw.error)
    }
}

#[derive(Deserialize)]
struct RawInputs {
    pdg: Option<BTreeMap<String, RawValue>>,
    channels: Option<BTreeMap<String, serde_yaml::Mapping>>,
}

#[derive(Deserialize)]
struct RawEra {
    lumi: RawValue,
    #[serde(default)]
    yields: BTreeMap<String, RawValue>,
    #[serde(default)]
    effs: BTreeMap<String, RawValue>,
}

/// Measurements of one channel in one data-taking era
#[derive(Clone, Debug)]
pub struct Era {
    /// Integrated luminosity
    pub lumi: UFloat,

    /// Signal yields, by name
    pub yields: BTreeMap<String, UFloat>,

    /// Selection efficiencies, by name
    pub effs: BTreeMap<String, UFloat>,
}
//
impl Era {
    fn get<'a>(map: &'a BTreeMap<String, UFloat>, kind: &str, key: &str) -> Result<&'a UFloat> {
        map.get(key)
            .ok_or_else(|| eyre!("Missing {kind} {key}"))
    }

    /// Yield of a given resonance
    pub fn yield_of(&self, key: &str) -> Result<&UFloat> {
        Self::get(&self.yields, "yield", key)
    }

    /// Efficiency of a given resonance
    pub fn eff_of(&self, key: &str) -> Result<&UFloat> {
        Self::get(&self.effs, "efficiency", key)
    }
}

/// World averages and per-era measurements
#[derive(Clone, Debug)]
pub struct XcheckInputs {
    /// Branching fractions, by name
    pub pdg: BTreeMap<String, UFloat>,

    /// Eras of each channel, keyed by channel then year
    pub channels: BTreeMap<String, BTreeMap<String, Era>>,
}
//
impl XcheckInputs {
    /// Load the inputs from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw: RawInputs = read_yaml(path)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawInputs) -> Result<Self> {
        let pdg = raw
            .pdg
            .ok_or_else(|| eyre!("'pdg' section missing from configuration file"))?
            .into_iter()
            .map(|(key, value)| (key, value.into()))
            .collect();

        let mut channels = BTreeMap::new();
        for (channel, eras) in raw.channels.ok_or_else(|| eyre!("Missing key: 'channels'"))? {
            let mut parsed = BTreeMap::new();
            for (year, era) in eras {
                // YAML years are usually integers
                let year = match year {
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::String(s) => s,
                    other => bail!("Invalid year {other:?} in channel {channel}"),
                };
                let era: RawEra = serde_yaml::from_value(era)
                    .wrap_err_with(|| format!("Error parsing channel {channel}, year {year}"))?;
                let to_ufloats = |map: BTreeMap<String, RawValue>| {
                    map.into_iter()
                        .map(|(key, value)| (key, value.into()))
                        .collect::<BTreeMap<_, _>>()
                };
                parsed.insert(
                    year,
                    Era {
                        lumi: era.lumi.into(),
                        yields: to_ufloats(era.yields),
                        effs: to_ufloats(era.effs),
                    },
                );
            }
            channels.insert(channel, parsed);
        }
        Ok(Self { pdg, channels })
    }

    /// Look up a world-average branching fraction
    pub fn pdg(&self, key: &str) -> Result<&UFloat> {
        self.pdg.get(key).ok_or_else(|| eyre!("Missing key: 'pdg.{key}'"))
    }

    /// Look up the measurements of a channel in an era
    pub fn era(&self, channel: &str, year: &str) -> Result<&Era> {
        self.channels
            .get(channel)
            .ok_or_else(|| eyre!("Missing key: '{channel}'"))?
            .get(year)
            .ok_or_else(|| eyre!("Missing key: '{channel}.{year}'"))
    }
}

// ### COMPUTATION ###

/// Efficiency-corrected muon/electron ratio of a resonance
fn lepton_ratio(mu: &Era, ee: &Era, resonance: &str) -> Result<UFloat> {
    let yield_key = format!("n_{resonance}");
    let eff_key = format!("eff_{resonance}");
    let mu_rate = mu.yield_of(&yield_key)? / &mu.lumi;
    let ee_rate = ee.yield_of(&yield_key)? / &ee.lumi;
    Ok(mu_rate / ee_rate * (ee.eff_of(&eff_key)? / mu.eff_of(&eff_key)?))
}

/// Efficiency-corrected ψ(2S)/J/ψ ratio within a channel
fn internal_ratio(era: &Era) -> Result<UFloat> {
    Ok((era.yield_of("n_psi2s")? / era.yield_of("n_jpsi")?)
        * (era.eff_of("eff_jpsi")? / era.eff_of("eff_psi2s")?))
}

/// Expected ψ(2S)/J/ψ ratio for a given dilepton final state
fn pdg_ratio(inputs: &XcheckInputs, lepton: &str) -> Result<UFloat> {
    let psi2s = inputs.pdg("br_b_to_psi2sk")? * inputs.pdg(&format!("br_psi2s_to_{lepton}"))?;
    let jpsi = inputs.pdg("br_b_to_jpsik")? * inputs.pdg(&format!("br_jpsi_to_{lepton}"))?;
    Ok(psi2s / jpsi)
}

/// Results of the cross-checks
#[derive(Clone, Debug)]
pub struct CrossChecks {
    /// R(J/ψ), 2022 muons and electrons
    pub rk_jpsi_2022: UFloat,

    /// R(ψ(2S)), 2022 muons and electrons
    pub rk_psi2s_2022: UFloat,

    /// R(ψ(2S)) / R(J/ψ), 2022
    pub double_ratio_2022: UFloat,

    /// R(J/ψ), 2018 muons and 2022 electrons
    pub rk_jpsi_mixed: UFloat,

    /// R(ψ(2S)) / R(J/ψ), 2018 muons and 2022 electrons
    pub double_ratio_mixed: UFloat,

    /// ψ(2S)/J/ψ in 2022 muons
    pub ratio_mumu: UFloat,

    /// ψ(2S)/J/ψ in 2022 electrons
    pub ratio_ee: UFloat,

    /// Expected ψ(2S)/J/ψ for muons
    pub pdg_ratio_mumu: UFloat,

    /// Expected ψ(2S)/J/ψ for electrons
    pub pdg_ratio_ee: UFloat,
}
//
impl CrossChecks {
    /// Run every cross-check
    pub fn compute(inputs: &XcheckInputs) -> Result<Self> {
        let mu18 = inputs.era("mumu", "2018")?;
        let mu22 = inputs.era("mumu", "2022")?;
        let ee22 = inputs.era("ee", "2022")?;

        let rk_jpsi_2022 = lepton_ratio(mu22, ee22, "jpsi")?;
        let rk_psi2s_2022 = lepton_ratio(mu22, ee22, "psi2s")?;
        let rk_jpsi_mixed = lepton_ratio(mu18, ee22, "jpsi")?;
        let rk_psi2s_mixed = lepton_ratio(mu18, ee22, "psi2s")?;
        Ok(Self {
            double_ratio_2022: &rk_psi2s_2022 / &rk_jpsi_2022,
            double_ratio_mixed: rk_psi2s_mixed / &rk_jpsi_mixed,
            rk_jpsi_2022,
            rk_psi2s_2022,
            rk_jpsi_mixed,
            ratio_mumu: internal_ratio(mu22)?,
            ratio_ee: internal_ratio(ee22)?,
            pdg_ratio_mumu: pdg_ratio(inputs, "mumu")?,
            pdg_ratio_ee: pdg_ratio(inputs, "ee")?,
        })
    }
}
//
impl fmt::Display for CrossChecks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        let one = UFloat::exact(1.);
        let vs_one = |f: &mut fmt::Formatter<'_>, label: &str, value: &UFloat| {
            writeln!(
                f,
                "{label:<LABEL_WIDTH$} : {:<VALUE_WIDTH$} (Pull from 1.0: {:.1}σ)",
                value.to_string(),
                pull(&one, value)
            )
        };
        let vs_pdg = |f: &mut fmt::Formatter<'_>, label: &str, value: &UFloat, pdg: &UFloat| {
            writeln!(
                f,
                "{label:<LABEL_WIDTH$} : {:<VALUE_WIDTH$} (PDG: {pdg}, Pull: {:.1}σ)",
                value.to_string(),
                pull(pdg, value)
            )
        };
        let (rk_jpsi, rk_psi2s, double) =
            ("R(J/ψ) [Control]", "R(ψ(2S)) [Signal]", "Double Ratio");

        writeln!(f, "{rule}\nCROSS-CHECK RESULTS\n{rule}")?;

        writeln!(f, "\n--- 2022 Era (Muon + Electron) ---")?;
        vs_one(f, rk_jpsi, &self.rk_jpsi_2022)?;
        vs_one(f, rk_psi2s, &self.rk_psi2s_2022)?;
        vs_one(f, double, &self.double_ratio_2022)?;

        writeln!(f, "\n--- Mixed Era (2018 Muon + 2022 Electron) ---")?;
        vs_one(f, rk_jpsi, &self.rk_jpsi_mixed)?;
        vs_one(f, double, &self.double_ratio_mixed)?;

        writeln!(f, "\n--- Internal Ratios (ψ(2S) / J/ψ) ---")?;
        vs_pdg(f, "Muons (2022)", &self.ratio_mumu, &self.pdg_ratio_mumu)?;
        vs_pdg(f, "Electrons (2022)", &self.ratio_ee, &self.pdg_ratio_ee)?;
        writeln!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUTS: &str = r#"
pdg:
  br_b_to_jpsik:    {value: 1.0e-3, error: 0.02e-3}
  br_b_to_psi2sk:   {value: 6.0e-4, error: 0.2e-4}
  br_jpsi_to_mumu:  {value: 0.06, error: 0.0003}
  br_jpsi_to_ee:    {value: 0.06, error: 0.0003}
  br_psi2s_to_mumu: {value: 0.008, error: 0.0006}
  br_psi2s_to_ee:   {value: 0.008, error: 0.0002}
channels:
  mumu:
    2018:
      lumi: {value: 10, error: 0.2}
      yields: {n_jpsi: {value: 1000, error: 30}, n_psi2s: {value: 80, error: 9}}
      effs: {eff_jpsi: {value: 0.1, error: 0.005}, eff_psi2s: {value: 0.1, error: 0.005}}
    "2022":
      lumi: {value: 20, error: 0.4}
      yields: {n_jpsi: {value: 2000, error: 45}, n_psi2s: {value: 160, error: 13}}
      effs: {eff_jpsi: {value: 0.1, error: 0.005}, eff_psi2s: {value: 0.1, error: 0.005}}
  ee:
    2022:
      lumi: {value: 20, error: 0.4}
      yields: {n_jpsi: {value: 500, error: 22}, n_psi2s: {value: 40, error: 6}}
      effs: {eff_jpsi: {value: 0.025, error: 0.002}, eff_psi2s: {value: 0.025, error: 0.002}}
"#;

    fn inputs(text: &str) -> Result<XcheckInputs> {
        XcheckInputs::from_raw(serde_yaml::from_str(text)?)
    }

    #[test]
    fn consistent_inputs_give_unit_ratios() {
        let checks = CrossChecks::compute(&inputs(INPUTS).unwrap()).unwrap();
        for value in [
            &checks.rk_jpsi_2022,
            &checks.rk_psi2s_2022,
            &checks.double_ratio_2022,
            &checks.rk_jpsi_mixed,
            &checks.double_ratio_mixed,
        ] {
            assert!((value.nominal() - 1.).abs() < 1e-12);
        }
        assert!((checks.ratio_mumu.nominal() - 0.08).abs() < 1e-12);
        assert!((checks.pdg_ratio_ee.nominal() - 0.08).abs() < 1e-12);
        // The 2022 luminosities cancel in the double ratio
        let uncorrelated = checks
            .rk_psi2s_2022
            .std_dev()
            .hypot(checks.rk_jpsi_2022.std_dev());
        assert!(checks.double_ratio_2022.std_dev() < uncorrelated);
    }

    #[test]
    fn report_layout() {
        let checks = CrossChecks::compute(&inputs(INPUTS).unwrap()).unwrap();
        let report = checks.to_string();
        let line = report
            .lines()
            .find(|line| line.starts_with("Double Ratio"))
            .unwrap();
        assert_eq!(line.find(" : "), Some(LABEL_WIDTH));
        assert!(line.contains("(Pull from 1.0: 0.0σ)"));
        assert!(report.contains("--- Internal Ratios (ψ(2S) / J/ψ) ---"));
        assert_eq!(report.lines().filter(|l| l.contains("PDG:")).count(), 2);
        assert!(report.contains("Pull: 0.0σ)"));
    }

    #[test]
    fn missing_inputs_are_reported() {
        assert!(inputs("channels: {}").is_err());
        let no_2018 = INPUTS.replace("    2018:", "    2017:");
        let err = CrossChecks::compute(&inputs(&no_2018).unwrap()).unwrap_err();
        assert!(err.to_string().contains("mumu.2018"));
        let no_eff = INPUTS.replace("eff_psi2s: {value: 0.025", "eff_other: {value: 0.025");
        assert!(CrossChecks::compute(&inputs(&no_eff).unwrap()).is_err());
    }
}
