//! Parallel conversion of many executions.
//!
//! Every execution converts independently: it owns its arena, its caches
//! and its id counter, so units share nothing but the read-only
//! configuration. An execution whose candidates all fail is dropped and
//! reported; its siblings are unaffected.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::convert::{convert_execution, Execution};
use crate::equiv::FieldSamples;
use crate::error::ConversionExhausted;
use crate::model::ExecutableId;
use crate::trace::RawExecution;

#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Converted executions, in input order.
    pub executions: Vec<Execution>,
    /// Executions none of whose candidates converted, in input order.
    pub dropped: Vec<ConversionExhausted>,
}

impl BatchOutcome {
    /// Executions grouped by the method they ran, in input order within
    /// each group.
    pub fn by_method(&self) -> BTreeMap<&ExecutableId, Vec<&Execution>> {
        let mut groups: BTreeMap<&ExecutableId, Vec<&Execution>> = BTreeMap::new();
        for execution in &self.executions {
            groups.entry(&execution.method).or_default().push(execution);
        }
        groups
    }

    /// Field samples over the results of each method's executions, for
    /// parameterized assertions.
    pub fn samples_by_method(&self, max_depth: usize) -> BTreeMap<&ExecutableId, FieldSamples> {
        self.by_method()
            .into_iter()
            .map(|(method, group)| {
                let results = group
                    .iter()
                    .filter_map(|e| e.result_model().map(|r| (&e.arena, r)));
                (method, FieldSamples::collect(results, max_depth))
            })
            .collect()
    }
}

/// Convert `raws` in parallel.
pub fn convert_batch(raws: &[RawExecution], config: &EngineConfig) -> BatchOutcome {
    let results: Vec<Result<Execution, ConversionExhausted>> = raws
        .par_iter()
        .map(|raw| convert_execution(raw, &config.passes, &config.types))
        .collect();

    let mut outcome = BatchOutcome::default();
    for result in results {
        match result {
            Ok(execution) => outcome.executions.push(execution),
            Err(exhausted) => {
                error!(method = %exhausted.method, "dropping execution: {}", exhausted);
                outcome.dropped.push(exhausted);
            }
        }
    }
    info!(
        converted = outcome.executions.len(),
        dropped = outcome.dropped.len(),
        "batch converted"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::parse_executions;

    const COUNTER_NEXT: &str = r#"{"kind": "method", "class_id": "com.acme.Counter", "name": "next",
        "params": [], "return_type": "int", "is_static": true}"#;

    /// The second record's result points past its descriptor table.
    fn two_executions() -> String {
        let record = |descriptors: &str, result: u32| {
            format!(
                r#"{{
                  "method": {m},
                  "trace": {{"exprs": [{{"op": "static_method_call", "method": {m}}}], "call": 0}},
                  "descriptors": [{d}],
                  "candidates": [{{
                    "kind": "concrete_success",
                    "initial": {{}},
                    "final": {{}},
                    "result": {r}
                  }}]
                }}"#,
                m = COUNTER_NEXT,
                d = descriptors,
                r = result
            )
        };
        format!(
            "[{}, {}]",
            record(r#"{"kind": "constant", "value": {"type": "int", "value": 1}}"#, 0),
            record("", 7)
        )
    }

    #[test]
    fn test_exhausted_execution_does_not_abort_batch() {
        let raws = parse_executions(&two_executions()).unwrap();
        let outcome = convert_batch(&raws, &EngineConfig::default());
        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.dropped.len(), 1);
        assert!(outcome.dropped[0].causes[0].contains("d7"));
        assert_eq!(outcome.by_method().len(), 1);
    }

    #[test]
    fn test_samples_grouped_by_method() {
        let raws = parse_executions(&two_executions()).unwrap();
        let outcome = convert_batch(&raws, &EngineConfig::default());
        let samples = outcome.samples_by_method(5);
        assert_eq!(samples.len(), 1);
        // An int result has no fields to sample.
        assert!(samples.values().all(FieldSamples::is_empty));
    }

    #[test]
    fn test_empty_batch() {
        let outcome = convert_batch(&[], &EngineConfig::default());
        assert!(outcome.executions.is_empty());
        assert!(outcome.dropped.is_empty());
    }
}
