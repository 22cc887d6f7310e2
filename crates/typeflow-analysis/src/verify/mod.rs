//! Consistency checks on the committed types of a function

use serde::Serialize;
use tracing::warn;
use typeflow_core::{Funcdata, Metatype, TypeFactory, TypeId, VarnodeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// The scratch type of a value disagrees with its committed type
    TempDiffers { value: VarnodeId },
    /// A boolean type sits on a value that may hold more than 0 or 1
    WideBoolean { value: VarnodeId, nz_mask: u64 },
    /// The committed type is a different size from the value
    SizeMismatch { value: VarnodeId, value_size: u32, type_size: u32 },
    /// A value whose type was locked before the run now has another type
    LockedChanged { value: VarnodeId, before: String, after: String },
}

/// Committed types of the type-locked values, taken before type recovery
#[derive(Debug, Clone, Default)]
pub struct LockedTypes {
    values: Vec<(VarnodeId, TypeId)>,
}

impl LockedTypes {
    pub fn capture(fd: &Funcdata) -> Self {
        let values = fd
            .varnodes()
            .filter(|vn| vn.is_type_locked())
            .map(|vn| (vn.id(), vn.ty()))
            .collect();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every observable value of `fd`, and that the values in `locked`
/// kept their types. Meant to be run once type recovery has finished a round.
pub fn verify_function(types: &TypeFactory, fd: &Funcdata, locked: &LockedTypes) -> VerifyReport {
    let mut report = VerifyReport::default();
    for vn in fd.varnodes().filter(|vn| vn.is_observable()) {
        report.checked += 1;
        let value = vn.id();
        let ty = vn.ty();
        if vn.temp_type() != ty {
            report.violations.push(Violation::TempDiffers { value });
        }
        if types.metatype(ty) == Metatype::Bool && vn.nz_mask() > 1 {
            report.violations.push(Violation::WideBoolean { value, nz_mask: vn.nz_mask() });
        }
        let type_size = types.size(ty);
        if type_size != vn.size() {
            report.violations.push(Violation::SizeMismatch {
                value,
                value_size: vn.size(),
                type_size,
            });
        }
    }
    for &(value, before) in &locked.values {
        let after = fd.varnode(value).ty();
        if after != before {
            report.violations.push(Violation::LockedChanged {
                value,
                before: types.name(before).to_string(),
                after: types.name(after).to_string(),
            });
        }
    }
    if !report.is_clean() {
        warn!(function = fd.name(), violations = report.violations.len(), "type check failed");
    }
    report
}
