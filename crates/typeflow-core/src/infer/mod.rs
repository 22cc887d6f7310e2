//! Type inference and propagation
//!
//! [`InferTypes`] runs one round of type recovery over a function each time
//! it is applied:
//!
//! 1. Seed every observable varnode's temporary type from how it is
//!    defined and read.
//! 2. Push each varnode's type outward across the graph, one depth-first
//!    traversal per root, accepting a type on an edge only when it is strictly
//!    more specific than what the destination already holds.
//! 3. Give every return value the function's most specific return type.
//! 4. Copy pointer-derived types onto stack locations addressed directly.
//! 5. Commit the temporary types.
//!
//! Rounds are repeated by the caller until the function converges. A known
//! feedback loop with local-variable structuring can keep sharpening types
//! forever, so the number of rounds is capped.

mod edge;
mod propagate;
mod returns;
mod round;
mod seed;
mod spacebase;

use tracing::debug;

use crate::config::InferConfig;
use crate::ir::{Funcdata, OpId, Slot, VarnodeId};
use crate::types::{TypeFactory, TypeId};

pub use propagate::PropagationStats;
pub use round::{RoundOutcome, RoundPhase, TypeRecoveryState};
pub use seed::local_type;

/// Warning attached to a function whose types never settled
pub const NOT_SETTLING: &str = "Type propagation algorithm not settling";

/// What caused a temporary type to change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    /// Initial guess at the start of a round
    Seed,
    /// Accepted across an edge of `op`
    Edge { op: OpId, inslot: Slot, outslot: Slot },
    /// Unified with the function's canonical return type
    Return,
    /// Copied from a pointer into the stack frame
    StackAlias,
}

/// Hooks into propagation, used for tracing and testing
pub trait PropagationObserver {
    /// The temporary type of `vn` was replaced by `new`
    fn temp_type_changed(&mut self, _vn: VarnodeId, _old: TypeId, _new: TypeId, _cause: ChangeCause) {}

    /// A traversal rooted at `root` entered `vn`
    fn value_entered(&mut self, _root: VarnodeId, _vn: VarnodeId) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PropagationObserver for NoopObserver {}

/// The type inference pass. Holds configuration only; every piece of round
/// state lives in the [`Funcdata`] being processed.
#[derive(Debug, Clone, Default)]
pub struct InferTypes {
    config: InferConfig,
}

impl InferTypes {
    pub fn new(config: InferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InferConfig {
        &self.config
    }

    /// Run one round of type recovery on `fd`
    pub fn apply(&self, types: &mut TypeFactory, fd: &mut Funcdata) -> RoundOutcome {
        self.apply_with_observer(types, fd, &mut NoopObserver)
    }

    pub fn apply_with_observer<O: PropagationObserver + ?Sized>(
        &self,
        types: &mut TypeFactory,
        fd: &mut Funcdata,
        observer: &mut O,
    ) -> RoundOutcome {
        round::run_round(&self.config, types, fd, observer)
    }

    /// Forget all round state, as when a function is decompiled afresh
    pub fn reset(&self, fd: &mut Funcdata) {
        debug!(function = fd.name(), "resetting type recovery");
        fd.recovery = TypeRecoveryState::default();
    }
}

/// Working state of one round
pub(crate) struct Pass<'a, O: PropagationObserver + ?Sized> {
    pub(crate) types: &'a mut TypeFactory,
    pub(crate) fd: &'a mut Funcdata,
    pub(crate) observer: &'a mut O,
    /// Merge points are skipped until the stack has been through heritage
    pub(crate) suppress_merges: bool,
    pub(crate) stats: PropagationStats,
}

impl<'a, O: PropagationObserver + ?Sized> Pass<'a, O> {
    pub(crate) fn new(
        types: &'a mut TypeFactory,
        fd: &'a mut Funcdata,
        observer: &'a mut O,
        suppress_merges: bool,
    ) -> Self {
        Self {
            types,
            fd,
            observer,
            suppress_merges,
            stats: PropagationStats::default(),
        }
    }

    /// Replace a temporary type and notify the observer
    pub(crate) fn set_temp_type(&mut self, vn: VarnodeId, ty: TypeId, cause: ChangeCause) {
        let old = self.fd.varnode(vn).temp_type();
        if old == ty {
            return;
        }
        self.fd.varnode_mut(vn).set_temp_type(ty);
        self.observer.temp_type_changed(vn, old, ty, cause);
    }

    /// Commit temporary types. Returns true if any committed type changed.
    pub(crate) fn write_back(&mut self) -> bool {
        let mut changed = false;
        for vn in self.fd.observable_values() {
            let temp = self.fd.varnode(vn).temp_type();
            if self.fd.varnode_mut(vn).update_type(temp) {
                changed = true;
            }
        }
        changed
    }
}
