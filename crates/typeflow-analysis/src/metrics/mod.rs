//! Type recovery metrics
//!
//! How much of a function ended up typed, which kinds of types it got, and
//! where its data flow loops back on itself.

pub mod type_flow;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use typeflow_core::{Funcdata, LoadedFunction, Metatype, PropagationStats, RoundOutcome, RoundPhase, TypeFactory};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeCoverage {
    pub observable_values: usize,
    /// Observable values whose committed type is not `undefined`
    pub typed_values: usize,
    pub locked_values: usize,
    pub coverage_percentage: f64,
}

impl TypeCoverage {
    pub fn calculate(types: &TypeFactory, fd: &Funcdata) -> Self {
        let mut coverage = Self::default();
        for vn in fd.varnodes().filter(|vn| vn.is_observable()) {
            coverage.observable_values += 1;
            if types.metatype(vn.ty()) != Metatype::Unknown {
                coverage.typed_values += 1;
            }
            if vn.is_type_locked() {
                coverage.locked_values += 1;
            }
        }
        coverage.coverage_percentage = if coverage.observable_values > 0 {
            coverage.typed_values as f64 / coverage.observable_values as f64 * 100.0
        } else {
            0.0
        };
        coverage
    }
}

/// Committed types of observable values grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetatypeDistribution {
    pub unknown: usize,
    pub integer: usize,
    pub boolean: usize,
    pub float: usize,
    pub pointer: usize,
    pub aggregate: usize,
    pub other: usize,
}

impl MetatypeDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calculate(types: &TypeFactory, fd: &Funcdata) -> Self {
        let mut dist = Self::new();
        for vn in fd.varnodes().filter(|vn| vn.is_observable()) {
            dist.add(types.metatype(vn.ty()));
        }
        dist
    }

    pub fn add(&mut self, metatype: Metatype) {
        match metatype {
            Metatype::Unknown => self.unknown += 1,
            Metatype::Int | Metatype::Uint => self.integer += 1,
            Metatype::Bool => self.boolean += 1,
            Metatype::Float => self.float += 1,
            Metatype::Ptr => self.pointer += 1,
            Metatype::Struct | Metatype::Union | Metatype::Array => self.aggregate += 1,
            Metatype::Code | Metatype::Spacebase | Metatype::Void => self.other += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unknown + self.integer + self.boolean + self.float + self.pointer + self.aggregate + self.other
    }
}

/// One observable value and its committed type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueReport {
    pub name: String,
    pub space: String,
    pub offset: u64,
    pub size: u32,
    #[serde(rename = "type")]
    pub ty: String,
    pub metatype: Metatype,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionReport {
    pub name: String,
    /// Outcome of the last round run, if the caller ran any
    pub outcome: Option<RoundOutcome>,
    pub rounds: u32,
    pub phase: RoundPhase,
    pub exceeded: bool,
    pub warnings: Vec<String>,
    pub last_stats: PropagationStats,
    pub coverage: TypeCoverage,
    pub distribution: MetatypeDistribution,
    /// Values on data-flow cycles, one list per cycle
    pub cycles: Vec<Vec<String>>,
    pub values: Vec<ValueReport>,
}

impl FunctionReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| format!("serializing report for '{}'", self.name))
    }
}

/// Builds reports for loaded functions
#[derive(Debug, Clone)]
pub struct Analyzer {
    include_unnamed: bool,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self { include_unnamed: true }
    }

    /// Leave values without a name in the graph file out of the value list
    pub fn named_only(mut self) -> Self {
        self.include_unnamed = false;
        self
    }

    pub fn analyze(&self, loaded: &LoadedFunction, outcome: Option<RoundOutcome>) -> FunctionReport {
        let (types, fd) = (&loaded.types, &loaded.fd);
        let label = |vn| {
            loaded
                .name_of(vn)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", vn.0))
        };

        let values: Vec<ValueReport> = fd
            .varnodes_by_location()
            .map(|vn| fd.varnode(vn))
            .filter(|vn| vn.is_observable())
            .filter(|vn| self.include_unnamed || loaded.name_of(vn.id()).is_some())
            .map(|vn| ValueReport {
                name: label(vn.id()),
                space: fd.spaces().get(vn.addr().space).name.clone(),
                offset: vn.offset(),
                size: vn.size(),
                ty: types.name(vn.ty()).to_string(),
                metatype: types.metatype(vn.ty()),
                locked: vn.is_type_locked(),
            })
            .collect();
        let cycles: Vec<Vec<String>> = type_flow::feedback_cycles(fd)
            .into_iter()
            .map(|cycle| cycle.into_iter().map(label).collect())
            .collect();

        let state = fd.type_recovery();
        let report = FunctionReport {
            name: fd.name().to_string(),
            outcome,
            rounds: state.rounds(),
            phase: state.phase(),
            exceeded: fd.is_type_recovery_exceeded(),
            warnings: fd.warnings().to_vec(),
            last_stats: state.last_stats(),
            coverage: TypeCoverage::calculate(types, fd),
            distribution: MetatypeDistribution::calculate(types, fd),
            cycles,
            values,
        };
        debug!(
            function = %report.name,
            coverage = report.coverage.coverage_percentage,
            cycles = report.cycles.len(),
            "report built"
        );
        report
    }
}
