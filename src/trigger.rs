//! Trigger paths and the per-event trigger decision
//!
//! Each trigger path combines a hardware (L1) and a software (HLT) accept
//! decision, both given as expressions over the event flags. Which paths
//! an event must have fired depends on the run mode and on whether the
//! sample is real data or simulation.

use crate::{
    error::{SampleError, SampleResult},
    expr::{BoundExpr, CompiledExpr},
    numeric::Float,
    store::EventStore,
};

use eyre::{ensure, eyre};

/// One online event-selection route
#[derive(Clone, Debug)]
pub struct TriggerPath {
    /// Name of the path, used in output naming
    pub name: String,

    /// Relative share of the analysed data recorded by this path
    pub fraction: Float,

    /// Hardware-level accept decision
    pub l1: CompiledExpr,

    /// Software-level accept decision
    pub hlt: CompiledExpr,
}

/// Ordered set of trigger paths
///
/// Declaration order matters: it decides how the random assignment breaks
/// ties at the boundaries of the cumulative distribution.
///
#[derive(Clone, Debug)]
pub struct TriggerCatalog {
    paths: Vec<TriggerPath>,
}
//
impl TriggerCatalog {
    /// Check and wrap a list of trigger paths
    pub fn new(paths: Vec<TriggerPath>) -> eyre::Result<Self> {
        ensure!(!paths.is_empty(), "The trigger catalog is empty");
        for (idx, path) in paths.iter().enumerate() {
            ensure!(
                path.fraction.is_finite() && path.fraction >= 0.,
                "Trigger path {} has invalid fraction {}",
                path.name,
                path.fraction
            );
            ensure!(
                paths[..idx].iter().all(|other| other.name != path.name),
                "Trigger path {} is declared twice",
                path.name
            );
        }
        let total: Float = paths.iter().map(|p| p.fraction).sum();
        ensure!(total > 0., "Trigger fractions must not all be zero");
        Ok(Self { paths })
    }

    /// Trigger paths in declaration order
    pub fn paths(&self) -> &[TriggerPath] {
        &self.paths
    }

    /// Find a trigger path by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.paths.iter().position(|p| p.name == name)
    }
}

/// Run mode as selected on the command line
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Randomly assign simulated events to one trigger path each
    Mix,

    /// Study a single trigger path
    Single,
}

/// Command line flags which select the trigger mode
#[derive(clap::Args, Clone, Debug)]
pub struct ModeArgs {
    /// Trigger mode of the run
    #[arg(long, value_enum, default_value_t = RunMode::Mix)]
    pub mode: RunMode,

    /// Trigger path to study in single mode
    #[arg(long)]
    pub target_trigger: Option<String>,
}
//
impl ModeArgs {
    /// Resolve the flags into a trigger mode
    pub fn resolve(&self) -> eyre::Result<TriggerMode> {
        TriggerMode::from_cli(self.mode, self.target_trigger.clone())
    }
}

/// Fully resolved trigger mode of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    /// Blend of all trigger paths
    Mixture,

    /// One designated trigger path
    Single(String),
}
//
impl TriggerMode {
    /// Combine the command line mode and target trigger
    pub fn from_cli(mode: RunMode, target: Option<String>) -> eyre::Result<Self> {
        match (mode, target) {
            (RunMode::Mix, _) => Ok(TriggerMode::Mixture),
            (RunMode::Single, Some(target)) => Ok(TriggerMode::Single(target)),
            (RunMode::Single, None) => Err(eyre!("Single mode requires --target-trigger")),
        }
    }

    /// Check that the designated trigger path exists
    pub fn validate(&self, catalog: &TriggerCatalog) -> eyre::Result<()> {
        if let TriggerMode::Single(target) = self {
            ensure!(
                catalog.position(target).is_some(),
                "Target trigger {} is not in the trigger catalog",
                target
            );
        }
        Ok(())
    }

    /// Label used in the cutflow tables
    pub fn label(&self) -> &str {
        match self {
            TriggerMode::Mixture => "Mixture",
            TriggerMode::Single(target) => target,
        }
    }

    /// Tag used in file names
    pub fn tag(&self) -> &str {
        match self {
            TriggerMode::Mixture => "mix",
            TriggerMode::Single(target) => target,
        }
    }
}

/// How the trigger decision is taken for one sample
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Simulation in mixture mode: the randomly assigned path must fire
    Assigned,

    /// Single mode: the designated path must fire, whatever the others did
    Target(usize),

    /// Data in mixture mode: any path may fire
    AnyPath,
}
//
impl TriggerPolicy {
    /// Pick the policy for a sample
    pub fn resolve(
        mode: &TriggerMode,
        catalog: &TriggerCatalog,
        is_data: bool,
    ) -> SampleResult<Self> {
        match mode {
            TriggerMode::Mixture if is_data => Ok(TriggerPolicy::AnyPath),
            TriggerMode::Mixture => Ok(TriggerPolicy::Assigned),
            TriggerMode::Single(target) => catalog
                .position(target)
                .map(TriggerPolicy::Target)
                .ok_or_else(|| {
                    SampleError::Config(format!("target trigger {target} is not in the catalog"))
                }),
        }
    }

    /// Truth that events must be randomly assigned a path beforehand
    pub fn needs_assignment(self) -> bool {
        self == TriggerPolicy::Assigned
    }
}

/// Trigger decision, bound to the flags of one sample
pub struct TriggerDecision<'store> {
    /// Policy in use
    policy: TriggerPolicy,

    /// Bound (L1, HLT) predicates, for the paths that the policy looks at
    paths: Vec<Option<(BoundExpr<'store>, BoundExpr<'store>)>>,
}
//
impl<'store> TriggerDecision<'store> {
    /// Resolve the predicates which the policy needs against a sample
    ///
    /// In single mode, only the target path's flags must be present.
    ///
    pub fn bind(
        policy: TriggerPolicy,
        catalog: &'store TriggerCatalog,
        store: &'store EventStore,
    ) -> SampleResult<Self> {
        let paths = catalog
            .paths()
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let needed = match policy {
                    TriggerPolicy::Target(target) => idx == target,
                    TriggerPolicy::Assigned | TriggerPolicy::AnyPath => true,
                };
                if needed {
                    Ok(Some((path.l1.bind(store)?, path.hlt.bind(store)?)))
                } else {
                    Ok(None)
                }
            })
            .collect::<SampleResult<Vec<_>>>()?;
        Ok(Self { policy, paths })
    }

    /// Truth that a trigger path accepted an event (L1 and HLT)
    fn path_fires(&self, path: usize, row: usize) -> bool {
        self.paths[path]
            .as_ref()
            .map_or(false, |(l1, hlt)| l1.holds(row) && hlt.holds(row))
    }

    /// Decide whether an event passes the trigger
    ///
    /// `assigned` is the randomly assigned path, which only the mixture
    /// policy for simulation looks at.
    ///
    pub fn passes(&self, row: usize, assigned: Option<usize>) -> bool {
        match self.policy {
            TriggerPolicy::Assigned => {
                debug_assert!(assigned.is_some(), "Mixture simulation needs an assignment");
                assigned.map_or(false, |path| self.path_fires(path, row))
            }
            TriggerPolicy::Target(target) => self.path_fires(target, row),
            TriggerPolicy::AnyPath => (0..self.paths.len()).any(|path| self.path_fires(path, row)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::Column;

    /// Catalog whose path X fires iff columns X_l1 and X_hlt are set
    pub(crate) fn catalog(fractions: &[(&str, Float)]) -> TriggerCatalog {
        TriggerCatalog::new(
            fractions
                .iter()
                .map(|&(name, fraction)| TriggerPath {
                    name: name.to_owned(),
                    fraction,
                    l1: CompiledExpr::compile(&format!("{name}_l1")).unwrap(),
                    hlt: CompiledExpr::compile(&format!("{name}_hlt == 1")).unwrap(),
                })
                .collect(),
        )
        .unwrap()
    }

    /// Store with flags for paths A and B
    fn flags(a: &[(Float, Float)], b: &[(Float, Float)]) -> EventStore {
        let col = |v: Vec<Float>| Column::Numeric(v);
        EventStore::from_columns(vec![
            ("A_l1".to_owned(), col(a.iter().map(|f| f.0).collect())),
            ("A_hlt".to_owned(), col(a.iter().map(|f| f.1).collect())),
            ("B_l1".to_owned(), col(b.iter().map(|f| f.0).collect())),
            ("B_hlt".to_owned(), col(b.iter().map(|f| f.1).collect())),
        ])
        .unwrap()
    }

    #[test]
    fn catalog_validation() {
        assert!(TriggerCatalog::new(Vec::new()).is_err());
        let path = |name: &str, fraction: Float| TriggerPath {
            name: name.to_owned(),
            fraction,
            l1: CompiledExpr::always_true(),
            hlt: CompiledExpr::always_true(),
        };
        assert!(TriggerCatalog::new(vec![path("A", -0.1), path("B", 1.)]).is_err());
        assert!(TriggerCatalog::new(vec![path("A", 0.), path("B", 0.)]).is_err());
        assert!(TriggerCatalog::new(vec![path("A", 1.), path("A", 1.)]).is_err());
        assert!(TriggerCatalog::new(vec![path("A", 0.), path("B", 2.)]).is_ok());
    }

    #[test]
    fn single_mode_requires_a_known_target() {
        assert!(TriggerMode::from_cli(RunMode::Single, None).is_err());
        let cat = catalog(&[("A", 1.)]);
        let mode = TriggerMode::from_cli(RunMode::Single, Some("B".to_owned())).unwrap();
        assert!(mode.validate(&cat).is_err());
        assert!(matches!(
            TriggerPolicy::resolve(&mode, &cat, false),
            Err(SampleError::Config(_))
        ));
        let mix = TriggerMode::from_cli(RunMode::Mix, Some("B".to_owned())).unwrap();
        assert_eq!(mix, TriggerMode::Mixture);
        assert_eq!(mix.label(), "Mixture");
        assert_eq!(mix.tag(), "mix");
    }

    #[test]
    fn policies_per_sample_kind() {
        let cat = catalog(&[("A", 1.), ("B", 1.)]);
        let single = TriggerMode::Single("B".to_owned());
        assert_eq!(
            TriggerPolicy::resolve(&TriggerMode::Mixture, &cat, false).unwrap(),
            TriggerPolicy::Assigned
        );
        assert_eq!(
            TriggerPolicy::resolve(&TriggerMode::Mixture, &cat, true).unwrap(),
            TriggerPolicy::AnyPath
        );
        assert_eq!(
            TriggerPolicy::resolve(&single, &cat, false).unwrap(),
            TriggerPolicy::Target(1)
        );
        assert_eq!(
            TriggerPolicy::resolve(&single, &cat, true).unwrap(),
            TriggerPolicy::Target(1)
        );
    }

    #[test]
    fn single_mode_is_inclusive() {
        // Event fires both A and B: studying A must keep it
        let cat = catalog(&[("A", 1.), ("B", 1.)]);
        let store = flags(&[(1., 1.)], &[(1., 1.)]);
        let decision = TriggerDecision::bind(TriggerPolicy::Target(0), &cat, &store).unwrap();
        assert!(decision.passes(0, None));
    }

    #[test]
    fn single_mode_needs_both_levels() {
        let cat = catalog(&[("A", 1.), ("B", 1.)]);
        let store = flags(&[(1., 0.), (0., 1.), (1., 1.)], &[(1., 1.); 3]);
        let decision = TriggerDecision::bind(TriggerPolicy::Target(0), &cat, &store).unwrap();
        assert!(!decision.passes(0, None));
        assert!(!decision.passes(1, None));
        assert!(decision.passes(2, None));
    }

    #[test]
    fn single_mode_ignores_flags_of_other_paths() {
        let cat = catalog(&[("A", 1.), ("C", 1.)]);
        let store = flags(&[(1., 1.)], &[(0., 0.)]);
        // Path C has no flags in the store, but only A is looked at
        let decision = TriggerDecision::bind(TriggerPolicy::Target(0), &cat, &store).unwrap();
        assert!(decision.passes(0, None));
        assert!(TriggerDecision::bind(TriggerPolicy::AnyPath, &cat, &store).is_err());
    }

    #[test]
    fn mixture_only_looks_at_the_assigned_path() {
        let cat = catalog(&[("A", 1.), ("B", 1.)]);
        let store = flags(&[(1., 1.), (0., 0.)], &[(0., 0.), (1., 1.)]);
        let decision = TriggerDecision::bind(TriggerPolicy::Assigned, &cat, &store).unwrap();
        assert!(decision.passes(0, Some(0)));
        assert!(!decision.passes(0, Some(1)));
        assert!(!decision.passes(1, Some(0)));
        assert!(decision.passes(1, Some(1)));
    }

    #[test]
    fn data_mixture_accepts_any_path() {
        let cat = catalog(&[("A", 1.), ("B", 1.)]);
        let store = flags(&[(1., 1.), (0., 1.), (0., 0.)], &[(0., 0.), (1., 1.), (1., 0.)]);
        let decision = TriggerDecision::bind(TriggerPolicy::AnyPath, &cat, &store).unwrap();
        assert!(decision.passes(0, None));
        assert!(decision.passes(1, None));
        assert!(!decision.passes(2, None));
    }
}
