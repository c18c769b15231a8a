use std::collections::BTreeMap;

use super::{capitalize, EquivalenceEngine, FieldSamples, Statement, Variable};
use crate::config::EquivalenceConfig;
use crate::convert::{Execution, ExecutionResult};
use crate::error::InvariantViolation;
use crate::model::*;

// ─── Per-Execution Assertions ──────────────────────────────────────

/// Variables a test binds to what the call produced and left behind.
#[derive(Clone, Debug, Default)]
pub struct ActualVariables {
    pub result: Option<Variable>,
    pub this: Option<Variable>,
    pub params: Vec<Option<Variable>>,
    pub statics: BTreeMap<FieldId, Variable>,
}

impl ActualVariables {
    /// `actual` for the result, `actualInstance` for the receiver,
    /// `actualArgN` for arguments and `actualField` for statics.
    pub fn conventional(execution: &Execution) -> Self {
        let result = execution.result_model().and_then(|r| {
            let model = execution.arena.get(r);
            (!matches!(model, ValueModel::Void)).then(|| Variable::new("actual", model.class_id()))
        });
        let Some(after) = &execution.state_after else {
            return Self {
                result,
                ..Self::default()
            };
        };
        let arena = &execution.arena;
        Self {
            result,
            this: after
                .this
                .map(|r| Variable::new("actualInstance", arena.get(r).class_id())),
            params: after
                .params
                .iter()
                .enumerate()
                .map(|(i, r)| {
                    Some(Variable::new(
                        format!("actualArg{}", i),
                        arena.get(*r).class_id(),
                    ))
                })
                .collect(),
            statics: after
                .statics
                .keys()
                .map(|field| {
                    let name = format!("actual{}", capitalize(&field.name));
                    (field.clone(), Variable::new(name, field.ty.clone()))
                })
                .collect(),
        }
    }

    fn all(&self) -> impl Iterator<Item = &Variable> {
        self.result
            .iter()
            .chain(self.this.iter())
            .chain(self.params.iter().flatten())
            .chain(self.statics.values())
    }
}

/// `expectedInstance` for `actualInstance`, `expectedFoo` for `foo`.
fn expected_name(actual: &Variable) -> String {
    match actual.name.strip_prefix("actual") {
        Some(rest) if !rest.is_empty() => format!("expected{}", rest),
        _ => format!("expected{}", capitalize(&actual.name)),
    }
}

/// Assertions for one converted execution: the result, then the final
/// state of the receiver, the arguments and the statics.
///
/// Field-state assertions are only produced for plain tests; a
/// parameterized body cannot know the final state of every execution.
pub fn assert_execution(
    execution: &Execution,
    actual: &ActualVariables,
    oracle: &dyn TypeOracle,
    config: &EquivalenceConfig,
    samples: Option<&FieldSamples>,
) -> Result<Vec<Statement>, InvariantViolation> {
    let mut engine = EquivalenceEngine::new(&execution.arena, oracle, config);
    if let Some(samples) = samples {
        engine = engine.with_samples(samples);
    }
    for var in actual.all() {
        engine.names_mut().reserve(&var.name);
    }

    match &execution.result {
        ExecutionResult::Success { model } => {
            let returns_value = execution.method.return_type() != ClassId::Void
                && !matches!(execution.arena.get(*model), ValueModel::Void);
            if returns_value {
                let var = actual.result.as_ref().ok_or_else(|| {
                    InvariantViolation::new(format!(
                        "{} returns a value but no result variable is bound",
                        execution.method
                    ))
                })?;
                engine.assert_equality(*model, var, "expected")?;
            }
        }
        ExecutionResult::Failure {
            exception,
            explicit,
        } => {
            let class_id = execution.arena.get(*exception).class_id();
            engine.emit(Statement::Comment(if *explicit {
                format!("{} is expected to be thrown", class_id)
            } else {
                format!("{} is thrown by the runtime", class_id)
            }));
        }
        ExecutionResult::Timeout => {
            engine.emit(Statement::Comment(
                "execution exceeded the time limit".to_string(),
            ));
        }
    }

    if config.is_parameterized() {
        return Ok(engine.finish());
    }
    let Some(after) = &execution.state_after else {
        return Ok(engine.finish());
    };
    if let (Some(model), Some(var)) = (after.this, &actual.this) {
        engine.assert_equality(model, var, &expected_name(var))?;
    }
    for (model, var) in after.params.iter().zip(&actual.params) {
        if let Some(var) = var {
            engine.assert_equality(*model, var, &expected_name(var))?;
        }
    }
    for (field, model) in &after.statics {
        if let Some(var) = actual.statics.get(field) {
            engine.assert_equality(*model, var, &expected_name(var))?;
        }
    }
    Ok(engine.finish())
}
