//! R(K) selection: event selection for a lepton universality test
//!
//!
//! # Introduction (for the physicist)
//!
//! This program prepares the event samples of a measurement of R(K), the
//! ratio of B⁺ → K⁺μ⁺μ⁻ and B⁺ → K⁺e⁺e⁻ decay rates, using the J/ψ and ψ(2S)
//! resonant channels as controls.
//!
//! Data is recorded by several overlapping trigger paths, each of which saw
//! a different share of the integrated luminosity. Simulated events are
//! therefore randomly assigned to one trigger path each, in proportion to
//! these shares, and must have fired the path that they were assigned to.
//!
//!
//! # Introduction (for the computer guy)
//!
//! The work is split in three subcommands:
//!
//! * `preselect` reads each sample, computes event weights, assigns trigger
//!   paths, applies a fixed chain of cuts, then splits the survivors into
//!   kinematic regions which are written to disk along with a cutflow log.
//! * `bdt-select` locates the outputs of an external classifier and applies
//!   the final cut on its score.
//! * `xchecks` computes ratio-of-ratio cross-checks with error propagation.
//!
//! The per-event work of `preselect` is a pure function of the event and of
//! its index, so it can be spread over threads without affecting results.

#![warn(missing_docs)]

mod assign;
mod bdtsel;
mod config;
mod discovery;
mod error;
mod evcut;
mod expr;
mod numeric;
mod output;
mod pipeline;
mod preselect;
mod random;
mod region;
mod resacc;
mod scheduling;
mod store;
mod trigger;
mod ufloat;
mod weight;
mod xchecks;

use clap::{Parser, Subcommand};

/// We'll use eyre's type-erased result type throughout the application
type Result<T> = eyre::Result<T>;

/// Event selection for the R(K) analysis
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available processing steps
#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the preselection and trigger assignment (step 1)
    Preselect(preselect::PreselectArgs),

    /// Apply the final classifier cut (step 2)
    BdtSelect(bdtsel::BdtSelectArgs),

    /// Compute ratio-of-ratio cross-checks
    Xchecks(xchecks::XchecksArgs),
}

/// This will act as our main function, with suitable error handling
fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    // Configuration errors propagate up to here and abort the run
    match &cli.command {
        Command::Preselect(args) => preselect::run(args),
        Command::BdtSelect(args) => bdtsel::run(args),
        Command::Xchecks(args) => xchecks::run(args),
    }
}
