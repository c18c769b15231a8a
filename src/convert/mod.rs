//! Trace-to-model conversion.
//!
//! Turns a `RawExecution` into an `Execution`: a model arena plus the
//! environment before and after the call, the outcome, and the
//! instrumentation the test needs.
//!
//! Conversion happens in three layers:
//!
//! 1. **Instructions** (`InstConverter`): the trace is replayed once,
//!    every expression memoized by its id. Calls and field sets build
//!    assemble models and their modification chains; global mocks are
//!    collected as instrumentation.
//!
//! 2. **Descriptors** (`DescriptorConverter`): snapshots are converted per
//!    phase, memoized by descriptor identity, registered before their
//!    children so that reference cycles close on the registered model.
//!
//! 3. **Passes** (`passes`): rewrites over the finished arena, run in a
//!    fixed order: cyclic-placeholder resolution, constructor
//!    simplification, sparse-array compaction, assemble demotion.
//!
//! `ExecutionConverter` drives the three over the ordered result
//! candidates and keeps the first that converts.

mod descriptor;
mod execution;
mod inst;
pub mod passes;
#[cfg(test)]
mod tests;

pub use descriptor::*;
pub use execution::*;
pub use inst::*;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{as_pairs, ClassId, ExecutableId, FieldId, ModelArena, ModelRef};

// ─── Outputs ───────────────────────────────────────────────────────

/// A stub the generated test installs before calling the method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instrumentation {
    /// Calls of `method` answer `values`, in order.
    StaticMethod {
        method: ExecutableId,
        values: Vec<ModelRef>,
    },
    /// Instances of `class_id` constructed during the call are replaced
    /// by `instances`, in order.
    NewInstance {
        class_id: ClassId,
        instances: Vec<ModelRef>,
    },
}

impl Instrumentation {
    fn refs_mut(&mut self) -> impl Iterator<Item = &mut ModelRef> {
        match self {
            Instrumentation::StaticMethod { values, .. } => values.iter_mut(),
            Instrumentation::NewInstance { instances, .. } => instances.iter_mut(),
        }
    }
}

/// Receiver, arguments and statics at one point of the execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentModels {
    /// Absent for static methods and constructors.
    pub this: Option<ModelRef>,
    pub params: Vec<ModelRef>,
    #[serde(with = "as_pairs", default)]
    pub statics: BTreeMap<FieldId, ModelRef>,
}

impl EnvironmentModels {
    fn refs_mut(&mut self) -> impl Iterator<Item = &mut ModelRef> {
        self.this
            .iter_mut()
            .chain(self.params.iter_mut())
            .chain(self.statics.values_mut())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// Normal return; a `Void` model for void methods.
    Success { model: ModelRef },
    Failure {
        exception: ModelRef,
        /// Thrown by the code under test, as opposed to by the runtime.
        explicit: bool,
    },
    Timeout,
}

/// One converted execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub method: ExecutableId,
    pub arena: ModelArena,
    pub state_before: EnvironmentModels,
    /// Only concrete runs observe the final state.
    pub state_after: Option<EnvironmentModels>,
    pub result: ExecutionResult,
    pub instrumentation: Vec<Instrumentation>,
    /// Kind of the result candidate this was converted from.
    pub source: String,
}

impl Execution {
    /// The model the call returned, if it returned one.
    pub fn result_model(&self) -> Option<ModelRef> {
        match self.result {
            ExecutionResult::Success { model } => Some(model),
            _ => None,
        }
    }

    /// Every model handle held outside the arena.
    pub fn roots(&self) -> Vec<ModelRef> {
        let mut out = Vec::new();
        let states = std::iter::once(&self.state_before).chain(self.state_after.as_ref());
        for state in states {
            out.extend(state.this);
            out.extend(state.params.iter().copied());
            out.extend(state.statics.values().copied());
        }
        match self.result {
            ExecutionResult::Success { model } => out.push(model),
            ExecutionResult::Failure { exception, .. } => out.push(exception),
            ExecutionResult::Timeout => {}
        }
        for inst in &self.instrumentation {
            match inst {
                Instrumentation::StaticMethod { values, .. } => out.extend(values.iter().copied()),
                Instrumentation::NewInstance { instances, .. } => {
                    out.extend(instances.iter().copied())
                }
            }
        }
        out
    }

    /// Apply an edge redirection to the arena and to the roots.
    pub(crate) fn redirect(&mut self, map: &HashMap<ModelRef, ModelRef>) {
        if map.is_empty() {
            return;
        }
        self.arena.redirect(map);
        let remap = |r: &mut ModelRef| {
            if let Some(target) = map.get(r) {
                *r = *target;
            }
        };
        self.state_before.refs_mut().for_each(remap);
        if let Some(after) = self.state_after.as_mut() {
            after.refs_mut().for_each(remap);
        }
        match &mut self.result {
            ExecutionResult::Success { model } => remap(model),
            ExecutionResult::Failure { exception, .. } => remap(exception),
            ExecutionResult::Timeout => {}
        }
        for inst in &mut self.instrumentation {
            inst.refs_mut().for_each(remap);
        }
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        let outcome = match &self.result {
            ExecutionResult::Success { model } => {
                format!("returns {}", self.arena.display(*model))
            }
            ExecutionResult::Failure {
                exception,
                explicit,
            } => format!(
                "throws {}{}",
                self.arena.get(*exception).class_id(),
                if *explicit { "" } else { " (implicit)" }
            ),
            ExecutionResult::Timeout => "times out".to_string(),
        };
        format!("{} [{}] {}", self.method, self.source, outcome)
    }
}
