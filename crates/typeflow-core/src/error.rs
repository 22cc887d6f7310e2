//! Error types for graph construction and configuration
//!
//! The propagation engine itself never fails: edges that cannot carry a type
//! are declined silently. Only building a function graph (by hand or from a
//! serialized description) and loading configuration can report errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypeflowError {
    #[error("unknown address space '{0}'")]
    UnknownSpace(String),

    #[error("unknown varnode '{0}'")]
    UnknownVarnode(String),

    #[error("unknown data-type '{0}'")]
    UnknownType(String),

    #[error("slot {slot} is out of range for op at {addr:#x} with {inputs} inputs")]
    SlotOutOfRange { addr: u64, slot: usize, inputs: usize },

    #[error("varnode '{0}' already has a defining op")]
    DuplicateOutput(String),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("invalid data-type definition '{name}': {reason}")]
    InvalidType { name: String, reason: String },

    #[error("failed to parse graph description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TypeflowError>;
