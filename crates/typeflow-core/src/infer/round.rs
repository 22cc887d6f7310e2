//! The round driver

use serde::Serialize;
use tracing::{debug, info};

use super::{Pass, PropagationObserver, PropagationStats, NOT_SETTLING};
use crate::config::InferConfig;
use crate::ir::Funcdata;
use crate::types::TypeFactory;

/// Where a function is in type recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    #[default]
    Idle,
    Running,
    Converged,
    Capped,
}

/// Per-function round bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeRecoveryState {
    rounds: u32,
    phase: RoundPhase,
    last_stats: PropagationStats,
}

impl TypeRecoveryState {
    /// Number of rounds that changed a committed type
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Propagation counters of the most recent round
    pub fn last_stats(&self) -> PropagationStats {
        self.last_stats
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, RoundPhase::Converged | RoundPhase::Capped)
    }
}

/// Result of one call to the pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundOutcome {
    /// Type recovery has not started for this function
    NotStarted,
    /// Some committed type changed; this was the given round
    Changed { round: u32 },
    /// Nothing changed; later calls do nothing
    Converged,
    /// The round cap was reached and the advisory emitted
    Capped,
    /// The function had already converged or been capped
    NoOp,
}

pub(super) fn run_round<O: PropagationObserver + ?Sized>(
    config: &InferConfig,
    types: &mut TypeFactory,
    fd: &mut Funcdata,
    observer: &mut O,
) -> RoundOutcome {
    if !fd.has_type_recovery_started() {
        return RoundOutcome::NotStarted;
    }
    if fd.recovery.is_finished() {
        return RoundOutcome::NoOp;
    }
    if fd.recovery.rounds >= config.max_rounds {
        fd.warning_header(NOT_SETTLING);
        fd.set_type_recovery_exceeded();
        fd.recovery.phase = RoundPhase::Capped;
        return RoundOutcome::Capped;
    }

    let suppress_merges = config.require_heritage_for_merges && fd.heritage_pass(fd.stack_space()) == 0;
    let recommended = fd.apply_type_recommendations(types);
    let round = fd.recovery.rounds + 1;
    debug!(function = fd.name(), round, recommended, suppress_merges, "type recovery round");

    let mut pass = Pass::new(types, fd, observer, suppress_merges);
    pass.build_local_types();
    for vn in pass.fd.observable_values() {
        pass.propagate_one_type(vn);
    }
    if config.propagate_across_returns {
        pass.propagate_across_returns();
    }
    if config.propagate_spacebase {
        if let Some(spcvn) = pass.fd.spacebase_input() {
            pass.propagate_spacebase_ref(spcvn);
        }
    }
    let changed = pass.write_back();
    let stats = pass.stats;

    fd.recovery.last_stats = stats;
    debug!(
        tried = stats.edges_tried,
        accepted = stats.edges_accepted,
        entered = stats.values_entered,
        changed,
        "round finished"
    );
    if changed {
        fd.recovery.rounds = round;
        fd.recovery.phase = RoundPhase::Running;
        RoundOutcome::Changed { round }
    } else {
        info!(function = fd.name(), rounds = fd.recovery.rounds, "types converged");
        fd.recovery.phase = RoundPhase::Converged;
        RoundOutcome::Converged
    }
}
