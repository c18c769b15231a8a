use std::collections::BTreeMap;

use tracing::{debug, error, warn};

use super::{
    passes, DescriptorConverter, EnvironmentModels, Execution, ExecutionResult, InstConverter,
};
use crate::config::PassConfig;
use crate::error::{ConversionExhausted, ConvertError};
use crate::model::*;
use crate::trace::{DescriptorId, ExecutionState, RawExecution, ResultCandidate, ValueDescriptor};

// ─── Conversion State ──────────────────────────────────────────────

/// Everything one conversion attempt mutates. Forked per candidate so a
/// failed attempt leaves nothing behind.
#[derive(Clone)]
struct State<'a> {
    arena: ModelArena,
    insts: InstConverter<'a>,
    descriptors: DescriptorConverter<'a>,
}

impl State<'_> {
    fn descriptor(&mut self, id: DescriptorId, phase: Phase) -> Result<ModelRef, ConvertError> {
        self.descriptors
            .convert(&mut self.arena, &mut self.insts, id, phase)
    }
}

/// Initial state, final state (absent when never observed) and result.
type Outcome = (EnvironmentModels, Option<EnvironmentModels>, ExecutionResult);

// ─── Execution Converter ───────────────────────────────────────────

/// Converts one `RawExecution`, trying its result candidates in order.
pub struct ExecutionConverter<'a> {
    raw: &'a RawExecution,
    passes: &'a PassConfig,
    oracle: &'a dyn TypeOracle,
}

impl<'a> ExecutionConverter<'a> {
    pub fn new(raw: &'a RawExecution, passes: &'a PassConfig, oracle: &'a dyn TypeOracle) -> Self {
        Self {
            raw,
            passes,
            oracle,
        }
    }

    /// The first candidate that converts, post-processed.
    ///
    /// A candidate that fails, or that carries no usable outcome
    /// (init-failed, runner failure), is logged and skipped.
    pub fn convert(&self) -> Result<Execution, ConversionExhausted> {
        let exhausted = |causes: Vec<String>| ConversionExhausted {
            method: self.raw.method.to_string(),
            causes,
        };

        let mut base = State {
            arena: ModelArena::new(),
            insts: InstConverter::new(&self.raw.trace),
            descriptors: DescriptorConverter::new(self.raw),
        };
        if let Err(e) = base.insts.process_trace(&mut base.arena) {
            error!(method = %self.raw.method, "trace replay failed: {}", e);
            return Err(exhausted(vec![format!("trace: {}", e)]));
        }

        let mut causes = Vec::new();
        for candidate in &self.raw.candidates {
            let kind = candidate.kind_name();
            match self.attempt(base.clone(), candidate) {
                Ok(Some(execution)) => {
                    debug!(method = %self.raw.method, candidate = kind, "converted");
                    return Ok(execution);
                }
                Ok(None) => causes.push(format!("{}: no usable outcome", kind)),
                Err(e) => {
                    warn!(
                        method = %self.raw.method,
                        candidate = kind,
                        "recoverable: candidate failed to convert: {}",
                        e
                    );
                    causes.push(format!("{}: {}", kind, e));
                }
            }
        }
        Err(exhausted(causes))
    }

    fn attempt(
        &self,
        mut state: State<'_>,
        candidate: &ResultCandidate,
    ) -> Result<Option<Execution>, ConvertError> {
        let Some((state_before, state_after, result)) = self.outcome(&mut state, candidate)?
        else {
            return Ok(None);
        };
        let mut execution = Execution {
            method: self.raw.method.clone(),
            instrumentation: state.insts.instrumentation().to_vec(),
            arena: state.arena,
            state_before,
            state_after,
            result,
            source: candidate.kind_name().to_string(),
        };
        self.post_process(&mut execution, &state.descriptors)?;
        Ok(Some(execution))
    }

    /// States and result a candidate describes, or `None` when it
    /// describes no outcome a test could be generated for.
    fn outcome(
        &self,
        state: &mut State<'_>,
        candidate: &ResultCandidate,
    ) -> Result<Option<Outcome>, ConvertError> {
        let outcome = match candidate {
            ResultCandidate::ConcreteSuccess {
                initial,
                final_state,
                result,
            } => {
                let before = self.state_from_descriptors(state, initial, Phase::Initial)?;
                let after = self.state_from_descriptors(state, final_state, Phase::Final)?;
                let model = match result {
                    Some(id) => state.descriptor(*id, Phase::Final)?,
                    None => state.arena.alloc(ValueModel::Void),
                };
                (before, Some(after), ExecutionResult::Success { model })
            }
            ResultCandidate::ConcreteException {
                initial,
                final_state,
                exception,
            } => {
                let before = self.state_from_descriptors(state, initial, Phase::Initial)?;
                let after = self.state_from_descriptors(state, final_state, Phase::Final)?;
                let explicit = match self.raw.descriptor(*exception)? {
                    ValueDescriptor::Exception {
                        raised_by_user_code,
                        ..
                    } => *raised_by_user_code,
                    other => {
                        return Err(ConvertError::MalformedTrace(format!(
                            "{} is thrown but describes a {}",
                            exception,
                            other.class_id()
                        )))
                    }
                };
                let exception = state.descriptor(*exception, Phase::Final)?;
                (before, Some(after), ExecutionResult::Failure { exception, explicit })
            }
            ResultCandidate::ConcreteInitFailed { cause } => {
                warn!(
                    method = %self.raw.method,
                    cause = %self.raw.descriptor(*cause)?.class_id(),
                    "execution failed before the method under test was called"
                );
                return Ok(None);
            }
            ResultCandidate::ConcreteFailed { cause } => {
                error!(
                    method = %self.raw.method,
                    cause = %self.raw.descriptor(*cause)?.class_id(),
                    "concrete execution failed"
                );
                return Ok(None);
            }
            ResultCandidate::ConcreteTimeout => {
                warn!(method = %self.raw.method, "timeout");
                let before = self.state_from_trace(state)?;
                (before, None, ExecutionResult::Timeout)
            }
            ResultCandidate::SymbolicSuccess { init, result } => {
                for inst in init {
                    state.insts.process_inst(&mut state.arena, inst)?;
                }
                state.insts.process_expr(&mut state.arena, *result)?;
                let model = state.insts.find_model(&mut state.arena, *result)?;
                let before = self.state_from_trace(state)?;
                (before, None, ExecutionResult::Success { model })
            }
            ResultCandidate::SymbolicException { class_id } => {
                let before = self.state_from_trace(state)?;
                let message = state.arena.alloc(ValueModel::string(""));
                let id = state.arena.fresh_id();
                let mut exception = CompositeModel::new(id, class_id.clone());
                exception.fields.insert(FieldId::exception_message(), message);
                let exception = state.arena.alloc(ValueModel::Composite(exception));
                (
                    before,
                    None,
                    ExecutionResult::Failure {
                        exception,
                        explicit: true,
                    },
                )
            }
        };
        Ok(Some(outcome))
    }

    fn has_receiver(&self) -> bool {
        !(self.raw.method.is_static() || self.raw.method.is_constructor())
    }

    /// Environment as the trace set it up.
    fn state_from_trace(&self, state: &mut State<'_>) -> Result<EnvironmentModels, ConvertError> {
        let trace = state.insts.trace();
        let (instance, args) = trace.call_operands()?;
        let this = match (self.has_receiver(), instance) {
            (false, _) => None,
            (true, Some(expr)) => Some(state.insts.find_model(&mut state.arena, expr)?),
            (true, None) => {
                return Err(ConvertError::MalformedTrace(
                    "instance method called without a receiver".to_string(),
                ))
            }
        };
        let params = args
            .iter()
            .map(|a| state.insts.find_model(&mut state.arena, *a))
            .collect::<Result<Vec<_>, _>>()?;
        let mut statics = BTreeMap::new();
        for (field, value) in trace.static_assignments() {
            statics.insert(field.clone(), state.insts.find_model(&mut state.arena, value)?);
        }
        Ok(EnvironmentModels {
            this,
            params,
            statics,
        })
    }

    /// Environment as a concrete run observed it.
    fn state_from_descriptors(
        &self,
        state: &mut State<'_>,
        observed: &ExecutionState,
        phase: Phase,
    ) -> Result<EnvironmentModels, ConvertError> {
        let this = if self.has_receiver() {
            let instance = observed.instance.ok_or_else(|| {
                ConvertError::MalformedTrace(format!("{} state has no receiver", phase))
            })?;
            Some(state.descriptor(instance, phase)?)
        } else {
            None
        };
        let params = observed
            .args
            .iter()
            .map(|a| state.descriptor(*a, phase))
            .collect::<Result<Vec<_>, _>>()?;
        let mut statics = BTreeMap::new();
        for binding in &observed.statics {
            statics.insert(binding.field.clone(), state.descriptor(binding.value, phase)?);
        }
        Ok(EnvironmentModels {
            this,
            params,
            statics,
        })
    }

    fn post_process(
        &self,
        execution: &mut Execution,
        descriptors: &DescriptorConverter<'_>,
    ) -> Result<(), ConvertError> {
        let resolved = passes::resolve_cyclic_placeholders(&mut execution.arena, |ref_id, phase| {
            descriptors.lookup(ref_id, phase)
        })?;
        execution.redirect(&resolved);
        if self.passes.simplify_constructors {
            passes::simplify_constructors(&mut execution.arena, self.oracle);
        }
        if self.passes.compact_arrays {
            passes::compact_arrays(&mut execution.arena);
        }
        if self.passes.demote_assembles {
            passes::demote_assembles(&mut execution.arena, self.passes.demotion);
        }
        Ok(())
    }
}

/// Convert one execution with the given passes and type knowledge.
pub fn convert_execution(
    raw: &RawExecution,
    passes: &PassConfig,
    oracle: &dyn TypeOracle,
) -> Result<Execution, ConversionExhausted> {
    ExecutionConverter::new(raw, passes, oracle).convert()
}
