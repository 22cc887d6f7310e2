//! # Typeflow Analysis
//!
//! Reports and checks over functions that have been through type recovery.
//!
//! ## Modules
//!
//! - **[`metrics`]** - Type coverage, metatype distribution and feedback cycles
//! - **[`verify`]** - Consistency checks on committed types
//!
//! ## Quick Start
//!
//! ```no_run
//! use typeflow_analysis::prelude::*;
//! use typeflow_core::{GraphSpec, InferTypes, RoundOutcome};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut loaded = GraphSpec::from_file("graph.json".as_ref())?.build()?;
//! let locked = LockedTypes::capture(&loaded.fd);
//! let pass = InferTypes::default();
//! let mut outcome = pass.apply(&mut loaded.types, &mut loaded.fd);
//! while let RoundOutcome::Changed { .. } = outcome {
//!     outcome = pass.apply(&mut loaded.types, &mut loaded.fd);
//! }
//!
//! let report = Analyzer::new().analyze(&loaded, Some(outcome));
//! println!("{}", report.to_json()?);
//! assert!(verify_function(&loaded.types, &loaded.fd, &locked).is_clean());
//! # Ok(())
//! # }
//! ```

pub mod metrics;
pub mod verify;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::type_flow::{feedback_cycles, value_graph};
    pub use crate::metrics::{Analyzer, FunctionReport, MetatypeDistribution, TypeCoverage, ValueReport};
    pub use crate::verify::{verify_function, LockedTypes, VerifyReport, Violation};
}

pub use metrics::{Analyzer, FunctionReport, MetatypeDistribution, TypeCoverage, ValueReport};
pub use verify::{verify_function, LockedTypes, VerifyReport, Violation};
