use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{EvalError, InvariantViolation};
use crate::model::*;

// ─── Runtime Values ────────────────────────────────────────────────

/// Handle to an object allocated in a `Heap`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapRef(pub u32);

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RtValue {
    Null,
    Prim(PrimitiveValue),
    Ref(HeapRef),
    /// A class literal.
    Class(ClassId),
    Enum { class_id: ClassId, name: String },
}

impl RtValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RtValue::Null)
    }

    pub fn as_prim(&self) -> Option<&PrimitiveValue> {
        match self {
            RtValue::Prim(v) => Some(v),
            _ => None,
        }
    }

    /// Default content of a fresh field or array slot of type `ty`.
    pub fn default_of(ty: &ClassId) -> Self {
        match ty.primitive_kind().and_then(PrimitiveKind::zero) {
            Some(zero) => RtValue::Prim(zero),
            None => RtValue::Null,
        }
    }
}

impl fmt::Display for RtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtValue::Null => write!(f, "null"),
            RtValue::Prim(v) => write!(f, "{}", v),
            RtValue::Ref(r) => write!(f, "{}", r),
            RtValue::Class(c) => write!(f, "{}.class", c),
            RtValue::Enum { class_id, name } => write!(f, "{}.{}", class_id.simple_name(), name),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HeapObject {
    Object {
        class_id: ClassId,
        fields: BTreeMap<FieldId, RtValue>,
        is_mock: bool,
    },
    Array {
        class_id: ClassId,
        elements: Vec<RtValue>,
    },
}

impl HeapObject {
    pub fn class_id(&self) -> &ClassId {
        match self {
            HeapObject::Object { class_id, .. } | HeapObject::Array { class_id, .. } => class_id,
        }
    }

    /// Current value of `field`; fields never written hold their default.
    pub fn field(&self, field: &FieldId) -> Option<RtValue> {
        match self {
            HeapObject::Object { fields, .. } => Some(
                fields
                    .get(field)
                    .cloned()
                    .unwrap_or_else(|| RtValue::default_of(&field.ty)),
            ),
            HeapObject::Array { .. } => None,
        }
    }
}

// ─── Heap ──────────────────────────────────────────────────────────

/// Objects and arrays the concrete checker evaluates against.
#[derive(Clone, Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

/// Runtime values already built for models of one arena.
pub type Materialized = HashMap<ModelRef, RtValue>;

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn alloc(&mut self, object: HeapObject) -> HeapRef {
        let r = HeapRef(self.objects.len() as u32);
        self.objects.push(object);
        r
    }

    pub fn get(&self, r: HeapRef) -> Option<&HeapObject> {
        self.objects.get(r.0 as usize)
    }

    pub fn get_mut(&mut self, r: HeapRef) -> Option<&mut HeapObject> {
        self.objects.get_mut(r.0 as usize)
    }

    /// Write a field of an object. Writing into an array is a type error.
    pub fn set_field(
        &mut self,
        r: HeapRef,
        field: FieldId,
        value: RtValue,
    ) -> Result<(), EvalError> {
        match self.get_mut(r) {
            Some(HeapObject::Object { fields, .. }) => {
                fields.insert(field, value);
                Ok(())
            }
            Some(HeapObject::Array { class_id, .. }) => Err(EvalError::TypeMismatch(format!(
                "cannot set field {} on array {}",
                field, class_id
            ))),
            None => Err(InvariantViolation::new(format!("dangling heap reference {}", r)).into()),
        }
    }

    /// Build the runtime value the model at `r` denotes.
    pub fn materialize(&mut self, arena: &ModelArena, r: ModelRef) -> Result<RtValue, EvalError> {
        self.materialize_with(arena, r, &mut Materialized::new())
    }

    /// Like `materialize`, sharing already-built values through `memo` so
    /// that one model always yields the same object.
    pub fn materialize_with(
        &mut self,
        arena: &ModelArena,
        r: ModelRef,
        memo: &mut Materialized,
    ) -> Result<RtValue, EvalError> {
        Materializer {
            heap: self,
            arena,
            memo,
        }
        .value(r)
    }
}

// ─── Materialization ───────────────────────────────────────────────

struct Materializer<'a> {
    heap: &'a mut Heap,
    arena: &'a ModelArena,
    memo: &'a mut Materialized,
}

impl<'a> Materializer<'a> {
    fn value(&mut self, r: ModelRef) -> Result<RtValue, EvalError> {
        if let Some(v) = self.memo.get(&r) {
            return Ok(v.clone());
        }
        let arena: &'a ModelArena = self.arena;
        let value = match arena.get(r) {
            ValueModel::Null { .. } => RtValue::Null,
            ValueModel::Primitive { value } => RtValue::Prim(value.clone()),
            ValueModel::ClassRef(m) => RtValue::Class(m.referenced.clone()),
            ValueModel::EnumConstant(m) => RtValue::Enum {
                class_id: m.class_id.clone(),
                name: m.name.clone(),
            },
            ValueModel::Composite(m) => self.object(&[r], m)?,
            ValueModel::Array(m) => self.array(r, m)?,
            ValueModel::Assemble(m) => self.assemble(r, m)?,
            // Never compared; an empty stand-in keeps identity.
            ValueModel::Lambda(m) => {
                let h = self.heap.alloc(HeapObject::Object {
                    class_id: m.class_id.clone(),
                    fields: BTreeMap::new(),
                    is_mock: false,
                });
                RtValue::Ref(h)
            }
            ValueModel::Custom(m) => match m.origin.map(|o| (o, arena.get(o))) {
                Some((o, ValueModel::Composite(origin))) => self.object(&[r, o], origin)?,
                _ => {
                    return Err(EvalError::NotMaterializable(
                        r.to_string(),
                        format!("custom model of {} has no structural origin", m.class_id),
                    ))
                }
            },
            ValueModel::Void => {
                let message = format!("void model {} has no runtime value", r);
                return Err(InvariantViolation::new(message).into());
            }
        };
        self.memo.insert(r, value.clone());
        Ok(value)
    }

    /// Allocate the object before filling it so cycles resolve to it.
    fn object(&mut self, aliases: &[ModelRef], m: &CompositeModel) -> Result<RtValue, EvalError> {
        let h = self.heap.alloc(HeapObject::Object {
            class_id: m.class_id.clone(),
            fields: BTreeMap::new(),
            is_mock: m.is_mock,
        });
        for alias in aliases {
            self.memo.insert(*alias, RtValue::Ref(h));
        }
        for (field, value) in &m.fields {
            let v = self.value(*value)?;
            self.heap.set_field(h, field.clone(), v)?;
        }
        Ok(RtValue::Ref(h))
    }

    fn array(&mut self, r: ModelRef, m: &ArrayModel) -> Result<RtValue, EvalError> {
        if m.length > MAX_ARRAY_LENGTH {
            return Err(EvalError::NotMaterializable(
                r.to_string(),
                format!("array length {} exceeds {}", m.length, MAX_ARRAY_LENGTH),
            ));
        }
        let element = m.class_id.element().cloned().unwrap_or(ClassId::Void);
        let h = self.heap.alloc(HeapObject::Array {
            class_id: m.class_id.clone(),
            elements: vec![RtValue::default_of(&element); m.length],
        });
        self.memo.insert(r, RtValue::Ref(h));
        let fill = self.value(m.default_fill)?;
        let mut elements = vec![fill; m.length];
        for (index, value) in &m.stores {
            let v = self.value(*value)?;
            match elements.get_mut(*index) {
                Some(slot) => *slot = v,
                None => {
                    return Err(InvariantViolation::new(format!(
                        "store at {} past the length {} of {}",
                        index, m.length, r
                    ))
                    .into())
                }
            }
        }
        if let Some(HeapObject::Array { elements: slots, .. }) = self.heap.get_mut(h) {
            *slots = elements;
        }
        Ok(RtValue::Ref(h))
    }

    /// Only allocation followed by direct field writes can be replayed
    /// here; anything that calls into the program cannot.
    fn assemble(&mut self, r: ModelRef, m: &AssembleModel) -> Result<RtValue, EvalError> {
        let arena: &'a ModelArena = self.arena;
        if let Some(origin) = m.origin {
            if let Some(v) = self.memo.get(&origin) {
                return Ok(v.clone());
            }
            if let ValueModel::Composite(snapshot) = arena.get(origin) {
                return self.object(&[r, origin], snapshot);
            }
            return self.value(origin);
        }
        let not_materializable = |reason: &str| {
            Err(EvalError::NotMaterializable(
                r.to_string(),
                format!("{} {}", m.class_id, reason),
            ))
        };
        let inst = &m.instantiation;
        let allocates = inst.executable.is_util(UtilMethod::CreateInstance)
            || (inst.executable.is_constructor() && inst.params.is_empty());
        if !allocates {
            return not_materializable(&format!("is built by {}", inst.executable));
        }
        let h = self.heap.alloc(HeapObject::Object {
            class_id: m.class_id.clone(),
            fields: BTreeMap::new(),
            is_mock: false,
        });
        self.memo.insert(r, RtValue::Ref(h));
        for step in &m.modifications {
            match step {
                StatementModel::SetField {
                    instance,
                    field,
                    value,
                } if *instance == r => {
                    let v = self.value(*value)?;
                    self.heap.set_field(h, field.clone(), v)?;
                }
                StatementModel::SetField { field, .. } => {
                    return not_materializable(&format!("writes {} of another object", field));
                }
                StatementModel::Call(call) => {
                    return not_materializable(&format!("calls {}", call.executable));
                }
            }
        }
        Ok(RtValue::Ref(h))
    }
}
