//! valgraph: value models for recorded executions, and the assertions
//! that check a later run against them.
//!
//! The pipeline runs in four stages:
//!
//! - `trace`: execution records as they come off disk (instructions,
//!   value descriptors, result candidates).
//! - `convert`: records become `Execution`s, arenas of `ValueModel`s
//!   rewritten by the cleanup passes.
//! - `equiv`: structural equivalence assertions between an expected
//!   model and an actual variable, as a statement tree.
//! - `eval`: a concrete checker that runs such a tree against values.
//!
//! `batch` drives conversion over many records in parallel; `graph`
//! exposes model graphs for inspection.

pub mod batch;
pub mod config;
pub mod convert;
pub mod equiv;
pub mod error;
pub mod eval;
pub mod graph;
pub mod model;
pub mod trace;

pub use batch::{convert_batch, BatchOutcome};
pub use config::EngineConfig;
pub use convert::{convert_execution, Execution};
pub use error::{ConversionExhausted, ConvertError, EvalError, InvariantViolation};
