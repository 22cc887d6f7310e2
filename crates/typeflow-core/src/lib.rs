//! Data-type recovery for decompiled functions
//!
//! `typeflow-core` infers a data-type for every value of a function in SSA
//! form. Local hints from how each value is defined and read are pushed
//! across the data-flow graph until no more specific type can flow.
//!
//! ```no_run
//! use typeflow_core::{GraphSpec, InferTypes, RoundOutcome};
//!
//! # fn main() -> typeflow_core::Result<()> {
//! let mut loaded = GraphSpec::from_file("graph.json".as_ref())?.build()?;
//! let pass = InferTypes::default();
//! while let RoundOutcome::Changed { .. } = pass.apply(&mut loaded.types, &mut loaded.fd) {}
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod infer;
pub mod ir;
pub mod loader;
pub mod typeop;
pub mod types;

pub use config::InferConfig;
pub use error::{Result, TypeflowError};
pub use infer::{
    ChangeCause, InferTypes, NoopObserver, PropagationObserver, PropagationStats, RoundOutcome, RoundPhase,
    TypeRecoveryState,
};
pub use ir::{Funcdata, OpCode, Slot, VarnodeId};
pub use loader::{GraphSpec, LoadedFunction};
pub use types::{Metatype, TypeFactory, TypeId};
