use std::collections::HashMap;

use tracing::trace;

use super::inst::zero_value;
use super::InstConverter;
use crate::error::ConvertError;
use crate::model::*;
use crate::trace::{DescriptorId, Expr, RawExecution, ValueDescriptor};

// ─── Descriptor Conversion ─────────────────────────────────────────

/// Converts value descriptors into models, once per `(descriptor, phase)`.
#[derive(Clone, Debug)]
pub struct DescriptorConverter<'a> {
    execution: &'a RawExecution,
    cache: HashMap<(DescriptorId, Phase), ModelRef>,
    by_ref: HashMap<(u32, Phase), DescriptorId>,
}

impl<'a> DescriptorConverter<'a> {
    pub fn new(execution: &'a RawExecution) -> Self {
        Self {
            execution,
            cache: HashMap::new(),
            by_ref: HashMap::new(),
        }
    }

    /// Model of `id` as observed in `phase`.
    ///
    /// Initial-state descriptors (and descriptors of mocks) that name the
    /// trace expression which built them resolve to that expression's
    /// model. An assemble model found this way gets the structural
    /// snapshot attached as its `origin`.
    ///
    /// A final-state object keeps the `ObjectId` of its initial-state
    /// snapshot.
    pub fn convert(
        &mut self,
        arena: &mut ModelArena,
        insts: &mut InstConverter<'_>,
        id: DescriptorId,
        phase: Phase,
    ) -> Result<ModelRef, ConvertError> {
        if let Some(model) = self.cache.get(&(id, phase)) {
            return Ok(*model);
        }
        let execution = self.execution;
        let descriptor = execution.descriptor(id)?;

        if let Some(origin) = descriptor.origin() {
            let is_mock = matches!(insts.trace().expr(origin)?, Expr::MockObject { .. });
            if phase == Phase::Initial || is_mock {
                let model = insts.find_model(arena, origin)?;
                if let Some(ref_id) = descriptor.ref_id() {
                    self.by_ref.insert((ref_id, phase), id);
                }
                self.cache.insert((id, phase), model);
                if let ValueModel::Assemble(m) = arena.get(model) {
                    if m.origin.is_none() {
                        let object_id = m.id;
                        let snapshot = self.convert_structural(arena, insts, id, phase, object_id)?;
                        if matches!(arena.get(snapshot), ValueModel::Composite(_)) {
                            if let ValueModel::Assemble(m) = arena.get_mut(model) {
                                m.origin = Some(snapshot);
                            }
                        }
                        self.cache.insert((id, phase), model);
                    }
                }
                return Ok(model);
            }
        }

        let previous = match (phase, descriptor.ref_id()) {
            (Phase::Final, Some(ref_id)) => self
                .lookup(ref_id, Phase::Initial)
                .and_then(|m| arena.get(m).id()),
            _ => None,
        };
        let object_id = previous.unwrap_or_else(|| arena.fresh_id());
        self.convert_structural(arena, insts, id, phase, object_id)
    }

    /// Model registered for heap object `ref_id` in `phase`, if any.
    pub fn lookup(&self, ref_id: u32, phase: Phase) -> Option<ModelRef> {
        let descriptor = self.by_ref.get(&(ref_id, phase))?;
        self.cache.get(&(*descriptor, phase)).copied()
    }

    /// Field-by-field conversion, ignoring any origin expression.
    fn convert_structural(
        &mut self,
        arena: &mut ModelArena,
        insts: &mut InstConverter<'_>,
        id: DescriptorId,
        phase: Phase,
        object_id: ObjectId,
    ) -> Result<ModelRef, ConvertError> {
        let execution = self.execution;
        let descriptor = execution.descriptor(id)?;
        if let Some(ref_id) = descriptor.ref_id() {
            self.by_ref.insert((ref_id, phase), id);
        }

        let model = match descriptor {
            ValueDescriptor::Object {
                class_id, fields, ..
            } => {
                let model = arena.alloc(ValueModel::Composite(CompositeModel::new(
                    object_id,
                    class_id.clone(),
                )));
                self.cache.insert((id, phase), model);
                for binding in fields.iter().filter(|b| !b.field.is_static) {
                    let value = self.convert(arena, insts, binding.value, phase)?;
                    if let ValueModel::Composite(m) = arena.get_mut(model) {
                        m.fields.insert(binding.field.clone(), value);
                    }
                }
                model
            }
            ValueDescriptor::Array {
                class_id,
                length,
                elements,
                ..
            } => {
                let element = class_id.element().ok_or_else(|| {
                    ConvertError::MalformedTrace(format!(
                        "{}: array of non-array type {}",
                        id, class_id
                    ))
                })?;
                if *length > MAX_ARRAY_LENGTH {
                    return Err(ConvertError::MalformedTrace(format!(
                        "{}: array length {} exceeds {}",
                        id, length, MAX_ARRAY_LENGTH
                    )));
                }
                if elements.len() > *length {
                    return Err(ConvertError::MalformedTrace(format!(
                        "{}: {} elements in an array of length {}",
                        id,
                        elements.len(),
                        length
                    )));
                }
                let default_fill = arena.alloc(zero_value(element));
                let model = arena.alloc(ValueModel::Array(ArrayModel {
                    id: object_id,
                    class_id: class_id.clone(),
                    length: *length,
                    default_fill,
                    stores: Default::default(),
                }));
                self.cache.insert((id, phase), model);
                for (index, element) in elements.iter().enumerate() {
                    let value = self.convert(arena, insts, *element, phase)?;
                    if let ValueModel::Array(m) = arena.get_mut(model) {
                        m.stores.insert(index, value);
                    }
                }
                model
            }
            ValueDescriptor::Class { class_id } => arena.alloc(ValueModel::ClassRef(ClassRefModel {
                id: object_id,
                referenced: class_id.clone(),
            })),
            ValueDescriptor::Constant { value } => {
                arena.alloc(ValueModel::primitive(value.clone()))
            }
            ValueDescriptor::Null { class_id } => arena.alloc(ValueModel::null(class_id.clone())),
            ValueDescriptor::CyclicRef { ref_id, class_id } => match self.lookup(*ref_id, phase) {
                Some(target) => target,
                None => {
                    trace!(ref_id, %phase, "cyclic reference deferred");
                    arena.alloc(ValueModel::Custom(CustomModel {
                        id: None,
                        class_id: class_id.clone(),
                        kind: CustomKind::CyclicReference {
                            ref_id: *ref_id,
                            phase,
                        },
                        origin: None,
                    }))
                }
            },
            ValueDescriptor::Enum { class_id, name } => {
                arena.alloc(ValueModel::EnumConstant(EnumConstantModel {
                    id: object_id,
                    class_id: class_id.clone(),
                    name: name.clone(),
                }))
            }
            ValueDescriptor::Exception {
                class_id, message, ..
            } => {
                let message = match message {
                    Some(text) => ValueModel::string(text.clone()),
                    None => ValueModel::null(ClassId::string()),
                };
                let message = arena.alloc(message);
                let mut exception = CompositeModel::new(object_id, class_id.clone());
                exception.fields.insert(FieldId::exception_message(), message);
                arena.alloc(ValueModel::Composite(exception))
            }
        };
        self.cache.insert((id, phase), model);
        Ok(model)
    }
}
