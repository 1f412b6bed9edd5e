//! Shared preselection cuts applied to every sample

use crate::{error::SampleResult, expr::BoundExpr, expr::CompiledExpr, store::EventStore};

/// Cuts applied to every event before region branching
///
/// The trigger decision is applied between the triplet cut and the
/// preselection discriminant cut, see the `pipeline` module.
///
#[derive(Clone, Debug)]
pub struct EventCut {
    /// Quality of the lepton-lepton-kaon triplet
    pub triplet: CompiledExpr,

    /// Loose threshold on the preselection discriminant
    pub bdt_score: CompiledExpr,

    /// Veto of the D⁰ → Kπ resonance window
    pub anti_d0: CompiledExpr,
}
//
impl EventCut {
    /// Resolve the cuts against the columns of a sample
    pub fn bind<'store>(&'store self, store: &'store EventStore) -> SampleResult<BoundEventCut<'store>> {
        Ok(BoundEventCut {
            triplet: self.triplet.bind(store)?,
            bdt_score: self.bdt_score.bind(store)?,
            anti_d0: self.anti_d0.bind(store)?,
        })
    }
}

/// Cuts bound to one sample
pub struct BoundEventCut<'store> {
    triplet: BoundExpr<'store>,
    bdt_score: BoundExpr<'store>,
    anti_d0: BoundExpr<'store>,
}
//
impl BoundEventCut<'_> {
    /// Decide whether an event has a good triplet
    pub fn keep_triplet(&self, row: usize) -> bool {
        self.triplet.holds(row)
    }

    /// Decide whether an event passes the preselection discriminant
    pub fn keep_bdt_score(&self, row: usize) -> bool {
        self.bdt_score.holds(row)
    }

    /// Decide whether an event survives the resonance veto
    pub fn keep_anti_d0(&self, row: usize) -> bool {
        self.anti_d0.holds(row)
    }
}
