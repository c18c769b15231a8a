use std::collections::{HashMap, HashSet};

use tracing::trace;

use super::Instrumentation;
use crate::error::ConvertError;
use crate::model::*;
use crate::trace::{Expr, ExprId, Inst, Trace};

// ─── Instruction Replay ────────────────────────────────────────────

/// Replays a trace into assemble models, one model per expression.
///
/// Cheap to clone: the memo table and the instrumentation list are the
/// only state, so a converter can be forked together with its arena.
#[derive(Clone, Debug)]
pub struct InstConverter<'t> {
    trace: &'t Trace,
    cache: HashMap<ExprId, ModelRef>,
    in_progress: HashSet<ExprId>,
    instrumentation: Vec<Instrumentation>,
}

impl<'t> InstConverter<'t> {
    pub fn new(trace: &'t Trace) -> Self {
        Self {
            trace,
            cache: HashMap::new(),
            in_progress: HashSet::new(),
            instrumentation: Vec::new(),
        }
    }

    pub fn trace(&self) -> &'t Trace {
        self.trace
    }

    pub fn instrumentation(&self) -> &[Instrumentation] {
        &self.instrumentation
    }

    /// Replay the init instructions and the call under test.
    pub fn process_trace(&mut self, arena: &mut ModelArena) -> Result<(), ConvertError> {
        let trace = self.trace;
        for inst in &trace.init {
            self.process_inst(arena, inst)?;
        }
        let call = self.process_expr(arena, trace.call)?;
        detach_from_receiver(arena, call);
        Ok(())
    }

    /// The model an already replayed expression produced.
    ///
    /// A method-call result is instantiated by the call itself, so that
    /// call no longer belongs on its receiver's modification chain.
    pub fn find_model(
        &mut self,
        arena: &mut ModelArena,
        expr: ExprId,
    ) -> Result<ModelRef, ConvertError> {
        let model = match self.cache.get(&expr) {
            Some(model) => *model,
            None => {
                return Err(ConvertError::MalformedTrace(format!(
                    "{} is referenced but never evaluated",
                    expr
                )))
            }
        };
        detach_from_receiver(arena, model);
        Ok(model)
    }

    pub fn process_inst(
        &mut self,
        arena: &mut ModelArena,
        inst: &Inst,
    ) -> Result<(), ConvertError> {
        match inst {
            Inst::Eval { expr } => {
                self.process_expr(arena, *expr)?;
            }
            Inst::ArraySet {
                array,
                index,
                value,
            } => {
                let array_model = self.process_expr(arena, *array)?;
                let index = self.const_index(*index)?;
                let value = self.process_expr(arena, *value)?;
                match arena.get_mut(array_model) {
                    ValueModel::Array(m) => {
                        if index >= m.length {
                            return Err(ConvertError::MalformedTrace(format!(
                                "store at index {} of an array of length {}",
                                index, m.length
                            )));
                        }
                        m.stores.insert(index, value);
                    }
                    other => return Err(not_a("array", *array, other)),
                }
            }
            Inst::SetField {
                instance,
                field,
                value,
            } => {
                let receiver = self.process_expr(arena, *instance)?;
                let value = self.process_expr(arena, *value)?;
                match arena.get_mut(receiver) {
                    ValueModel::Assemble(m) => m.modifications.push(StatementModel::SetField {
                        instance: receiver,
                        field: field.clone(),
                        value,
                    }),
                    other => return Err(not_a("assembled object", *instance, other)),
                }
            }
            Inst::SetStaticField { value, .. } => {
                self.process_expr(arena, *value)?;
            }
            Inst::BinaryCondition { .. } => {
                return Err(ConvertError::UnsupportedDescriptor(
                    "binary-condition instruction".to_string(),
                ))
            }
        }
        Ok(())
    }

    pub fn process_expr(
        &mut self,
        arena: &mut ModelArena,
        id: ExprId,
    ) -> Result<ModelRef, ConvertError> {
        if let Some(model) = self.cache.get(&id) {
            return Ok(*model);
        }
        if !self.in_progress.insert(id) {
            return Err(ConvertError::MalformedTrace(format!(
                "{} depends on itself",
                id
            )));
        }
        let model = self.build_expr(arena, id);
        self.in_progress.remove(&id);
        let model = model?;
        trace!(expr = %id, model = %model, "replayed");
        self.cache.insert(id, model);
        Ok(model)
    }

    fn build_expr(&mut self, arena: &mut ModelArena, id: ExprId) -> Result<ModelRef, ConvertError> {
        let trace = self.trace;
        let model = match trace.expr(id)? {
            Expr::AllocateMemory { class_id } => {
                let name = arena.alloc(ValueModel::string(class_id.to_string()));
                let call = CallModel {
                    instance: None,
                    executable: ExecutableId::util(UtilMethod::CreateInstance),
                    params: vec![name],
                };
                assemble(arena, class_id.clone(), call)
            }
            Expr::ConstructorCall { constructor, args } => {
                let params = self.process_all(arena, args)?;
                let class_id = constructor.return_type();
                let call = CallModel {
                    instance: None,
                    executable: constructor.clone(),
                    params,
                };
                assemble(arena, class_id, call)
            }
            Expr::MethodCall {
                method,
                instance,
                args,
            } => {
                let receiver = self.process_expr(arena, *instance)?;
                let params = self.process_all(arena, args)?;
                let call = CallModel {
                    instance: Some(receiver),
                    executable: method.clone(),
                    params,
                };
                match arena.get_mut(receiver) {
                    ValueModel::Assemble(m) => {
                        m.modifications.push(StatementModel::Call(call.clone()))
                    }
                    other => return Err(not_a("assembled object", *instance, other)),
                }
                assemble(arena, method.return_type(), call)
            }
            Expr::StaticMethodCall { method, args } => {
                let params = self.process_all(arena, args)?;
                let call = CallModel {
                    instance: None,
                    executable: method.clone(),
                    params,
                };
                assemble(arena, method.return_type(), call)
            }
            Expr::GetField { instance, field } => {
                let receiver = self.process_expr(arena, *instance)?;
                let declaring = arena.alloc(ValueModel::string(field.declaring_class.to_string()));
                let name = arena.alloc(ValueModel::string(field.name.clone()));
                let call = CallModel {
                    instance: None,
                    executable: ExecutableId::util(UtilMethod::GetFieldValue),
                    params: vec![receiver, declaring, name],
                };
                assemble(arena, field.ty.clone(), call)
            }
            Expr::GetStaticField { field } => {
                let declaring = arena.alloc(ValueModel::string(field.declaring_class.to_string()));
                let name = arena.alloc(ValueModel::string(field.name.clone()));
                let call = CallModel {
                    instance: None,
                    executable: ExecutableId::util(UtilMethod::GetStaticFieldValue),
                    params: vec![declaring, name],
                };
                assemble(arena, field.ty.clone(), call)
            }
            Expr::CreateArray { class_id, size } => {
                let length = self.const_index(*size)?;
                let element = class_id.element().ok_or_else(|| {
                    ConvertError::MalformedTrace(format!("array of non-array type {}", class_id))
                })?;
                let default_fill = arena.alloc(zero_value(element));
                let id = arena.fresh_id();
                arena.alloc(ValueModel::Array(ArrayModel {
                    id,
                    class_id: class_id.clone(),
                    length,
                    default_fill,
                    stores: Default::default(),
                }))
            }
            Expr::Const { value } => arena.alloc(ValueModel::primitive(value.clone())),
            Expr::Null { class_id } => arena.alloc(ValueModel::null(class_id.clone())),
            Expr::ClassLiteral { class_id } => {
                let id = arena.fresh_id();
                arena.alloc(ValueModel::ClassRef(ClassRefModel {
                    id,
                    referenced: class_id.clone(),
                }))
            }
            Expr::MockObject {
                class_id,
                fields,
                methods,
            } => {
                let mock_id = arena.fresh_id();
                let mock = arena.alloc(ValueModel::Composite(CompositeModel::mock(
                    mock_id,
                    class_id.clone(),
                )));
                // Registered first: mocked answers may refer back to the mock.
                self.cache.insert(id, mock);
                for binding in fields.iter().filter(|b| !b.field.is_static) {
                    let value = self.process_expr(arena, binding.value)?;
                    if let ValueModel::Composite(m) = arena.get_mut(mock) {
                        m.fields.insert(binding.field.clone(), value);
                    }
                }
                for mocked in methods {
                    let answers = self.process_all(arena, &mocked.values)?;
                    if let ValueModel::Composite(m) = arena.get_mut(mock) {
                        m.mocks.insert(mocked.method.clone(), answers);
                    }
                }
                mock
            }
            Expr::GlobalMock { class_id, methods } => {
                let (constructors, others): (Vec<_>, Vec<_>) =
                    methods.iter().partition(|m| m.method.is_constructor());
                for mocked in others {
                    let values = self.process_all(arena, &mocked.values)?;
                    self.instrumentation.push(Instrumentation::StaticMethod {
                        method: mocked.method.clone(),
                        values,
                    });
                }
                for mocked in constructors {
                    let instances = self.process_all(arena, &mocked.values)?;
                    let class_id = mocked.method.class_id().unwrap_or(class_id).clone();
                    self.instrumentation.push(Instrumentation::NewInstance {
                        class_id,
                        instances,
                    });
                }
                // A global mock evaluates to the class it intercepts.
                let id = arena.fresh_id();
                arena.alloc(ValueModel::ClassRef(ClassRefModel {
                    id,
                    referenced: class_id.clone(),
                }))
            }
            unsupported @ (Expr::Arithmetic { .. }
            | Expr::Cast { .. }
            | Expr::ArrayGet { .. }
            | Expr::ArrayLength { .. }
            | Expr::BinaryCondition { .. }) => {
                return Err(ConvertError::UnsupportedDescriptor(
                    unsupported.kind_name().to_string(),
                ))
            }
        };
        Ok(model)
    }

    fn process_all(
        &mut self,
        arena: &mut ModelArena,
        exprs: &[ExprId],
    ) -> Result<Vec<ModelRef>, ConvertError> {
        exprs.iter().map(|e| self.process_expr(arena, *e)).collect()
    }

    /// Array sizes and indices must be integral constants within `int`
    /// range.
    fn const_index(&self, id: ExprId) -> Result<usize, ConvertError> {
        match self.trace.expr(id)? {
            Expr::Const { value } => value
                .as_i64()
                .and_then(|v| usize::try_from(v).ok())
                .filter(|v| *v <= MAX_ARRAY_LENGTH)
                .ok_or_else(|| {
                    ConvertError::MalformedTrace(format!("{} is not a valid index: {}", id, value))
                }),
            other => Err(ConvertError::UnsupportedDescriptor(format!(
                "non-constant array index ({})",
                other.kind_name()
            ))),
        }
    }
}

fn assemble(arena: &mut ModelArena, class_id: ClassId, call: CallModel) -> ModelRef {
    let id = arena.fresh_id();
    arena.alloc(ValueModel::Assemble(AssembleModel::new(id, class_id, call)))
}

/// Default content of a fresh array slot.
pub(crate) fn zero_value(element: &ClassId) -> ValueModel {
    match element.primitive_kind().and_then(|k| k.zero()) {
        Some(zero) => ValueModel::primitive(zero),
        None => ValueModel::null(element.clone()),
    }
}

/// Drop `model`'s instantiating call from its receiver's chain.
fn detach_from_receiver(arena: &mut ModelArena, model: ModelRef) {
    let (receiver, call) = match arena.get(model) {
        ValueModel::Assemble(AssembleModel {
            instantiation:
                call @ CallModel {
                    instance: Some(receiver),
                    ..
                },
            ..
        }) => (*receiver, StatementModel::Call(call.clone())),
        _ => return,
    };
    if let ValueModel::Assemble(m) = arena.get_mut(receiver) {
        if let Some(pos) = m.modifications.iter().position(|step| *step == call) {
            m.modifications.remove(pos);
        }
    }
}

fn not_a(expected: &str, expr: ExprId, found: &ValueModel) -> ConvertError {
    ConvertError::MalformedTrace(format!(
        "{} should be an {} but is a {} model",
        expr,
        expected,
        found.variant_name()
    ))
}
