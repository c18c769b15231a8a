use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::*;

// ─── Handles ───────────────────────────────────────────────────────

/// Handle to one model instance inside a `ModelArena`.
///
/// Two handles are equal exactly when they name the same instance, which
/// is the identity memoization and the equivalence visited set rely on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRef(pub u32);

impl ModelRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

// ─── Arena ─────────────────────────────────────────────────────────

/// Owner of every model produced for one execution.
///
/// Models are appended and never removed; rewrite passes replace a
/// slot's content in place so existing handles stay valid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelArena {
    models: Vec<ValueModel>,
    next_object_id: u32,
}

impl ModelArena {
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            next_object_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn alloc(&mut self, model: ValueModel) -> ModelRef {
        if let Some(ObjectId(id)) = model.id() {
            self.next_object_id = self.next_object_id.max(id + 1);
        }
        let r = ModelRef(self.models.len() as u32);
        self.models.push(model);
        r
    }

    /// A fresh logical-object identity, never handed out before.
    pub fn fresh_id(&mut self) -> ObjectId {
        let id = self.next_object_id.max(1);
        self.next_object_id = id + 1;
        ObjectId(id)
    }

    /// Make sure `fresh_id` never returns `id` or anything below it.
    pub fn reserve_id(&mut self, id: ObjectId) {
        self.next_object_id = self.next_object_id.max(id.0 + 1);
    }

    pub fn get(&self, r: ModelRef) -> &ValueModel {
        &self.models[r.index()]
    }

    pub fn try_get(&self, r: ModelRef) -> Option<&ValueModel> {
        self.models.get(r.index())
    }

    pub fn get_mut(&mut self, r: ModelRef) -> &mut ValueModel {
        &mut self.models[r.index()]
    }

    /// Overwrite the content of slot `r`, returning the previous model.
    pub fn replace(&mut self, r: ModelRef, model: ValueModel) -> ValueModel {
        if let Some(ObjectId(id)) = model.id() {
            self.next_object_id = self.next_object_id.max(id + 1);
        }
        std::mem::replace(&mut self.models[r.index()], model)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelRef, &ValueModel)> {
        self.models
            .iter()
            .enumerate()
            .map(|(i, m)| (ModelRef(i as u32), m))
    }

    pub fn refs(&self) -> impl Iterator<Item = ModelRef> {
        (0..self.models.len() as u32).map(ModelRef)
    }

    /// Memoization key of the model at `r`.
    pub fn wrap(&self, r: ModelRef) -> ModelKey {
        match self.get(r) {
            ValueModel::Primitive { value } => ModelKey::Value(value.key()),
            ValueModel::Null { class_id } => ModelKey::Null(class_id.clone()),
            ValueModel::Void => ModelKey::Void,
            _ => ModelKey::Ref(r),
        }
    }

    /// Direct successors of `r`, in a stable order.
    pub fn children(&self, r: ModelRef) -> Vec<ModelRef> {
        let mut out = Vec::new();
        self.get(r).for_each_ref(|c| out.push(c));
        out
    }

    /// Every model reachable from `roots`, breadth first, roots included.
    pub fn reachable(&self, roots: &[ModelRef]) -> Vec<ModelRef> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<ModelRef> = roots.iter().copied().collect();
        while let Some(r) = queue.pop_front() {
            if !seen.insert(r) {
                continue;
            }
            order.push(r);
            queue.extend(self.children(r));
        }
        order
    }

    /// Rewrite every edge pointing at a key of `map` to point at its value.
    pub fn redirect(&mut self, map: &HashMap<ModelRef, ModelRef>) {
        if map.is_empty() {
            return;
        }
        for model in &mut self.models {
            model.for_each_ref_mut(|slot| {
                if let Some(target) = map.get(slot) {
                    *slot = *target;
                }
            });
        }
    }

    /// Deep-copy the subgraph of `other` rooted at `root` into this arena.
    ///
    /// Object identities are kept as they are in `other`.
    pub fn import(&mut self, other: &ModelArena, root: ModelRef) -> ModelRef {
        let mapping = self.import_reachable(other, root);
        mapping[&root]
    }

    /// Like `import`, returning where every copied handle of `other` landed.
    pub fn import_reachable(
        &mut self,
        other: &ModelArena,
        root: ModelRef,
    ) -> HashMap<ModelRef, ModelRef> {
        let mut mapping: HashMap<ModelRef, ModelRef> = HashMap::new();
        let order = other.reachable(&[root]);
        for r in &order {
            let slot = self.alloc(ValueModel::Void);
            mapping.insert(*r, slot);
        }
        for r in &order {
            let mut copy = other.get(*r).clone();
            copy.for_each_ref_mut(|slot| {
                if let Some(target) = mapping.get(slot) {
                    *slot = *target;
                }
            });
            self.replace(mapping[r], copy);
        }
        mapping
    }
}

// ─── Edge Enumeration ──────────────────────────────────────────────

impl CallModel {
    fn for_each_ref(&self, f: &mut impl FnMut(ModelRef)) {
        if let Some(instance) = self.instance {
            f(instance);
        }
        self.params.iter().for_each(|p| f(*p));
    }

    fn for_each_ref_mut(&mut self, f: &mut impl FnMut(&mut ModelRef)) {
        if let Some(instance) = self.instance.as_mut() {
            f(instance);
        }
        self.params.iter_mut().for_each(|p| f(p));
    }
}

impl ValueModel {
    /// Visit every outgoing edge.
    pub fn for_each_ref(&self, mut f: impl FnMut(ModelRef)) {
        match self {
            ValueModel::Null { .. }
            | ValueModel::Primitive { .. }
            | ValueModel::ClassRef(_)
            | ValueModel::EnumConstant(_)
            | ValueModel::Void => {}
            ValueModel::Composite(m) => {
                m.fields.values().for_each(|v| f(*v));
                m.mocks.values().flatten().for_each(|v| f(*v));
            }
            ValueModel::Array(m) => {
                f(m.default_fill);
                m.stores.values().for_each(|v| f(*v));
            }
            ValueModel::Assemble(m) => {
                m.instantiation.for_each_ref(&mut f);
                for step in &m.modifications {
                    match step {
                        StatementModel::Call(call) => call.for_each_ref(&mut f),
                        StatementModel::SetField {
                            instance, value, ..
                        } => {
                            f(*instance);
                            f(*value);
                        }
                    }
                }
                if let Some(origin) = m.origin {
                    f(origin);
                }
            }
            ValueModel::Lambda(m) => m.captured.iter().for_each(|v| f(*v)),
            ValueModel::Custom(m) => {
                if let Some(origin) = m.origin {
                    f(origin);
                }
            }
        }
    }

    /// Visit every outgoing edge mutably.
    pub fn for_each_ref_mut(&mut self, mut f: impl FnMut(&mut ModelRef)) {
        match self {
            ValueModel::Null { .. }
            | ValueModel::Primitive { .. }
            | ValueModel::ClassRef(_)
            | ValueModel::EnumConstant(_)
            | ValueModel::Void => {}
            ValueModel::Composite(m) => {
                m.fields.values_mut().for_each(|v| f(v));
                m.mocks.values_mut().flatten().for_each(|v| f(v));
            }
            ValueModel::Array(m) => {
                f(&mut m.default_fill);
                m.stores.values_mut().for_each(|v| f(v));
            }
            ValueModel::Assemble(m) => {
                m.instantiation.for_each_ref_mut(&mut f);
                for step in &mut m.modifications {
                    match step {
                        StatementModel::Call(call) => call.for_each_ref_mut(&mut f),
                        StatementModel::SetField {
                            instance, value, ..
                        } => {
                            f(instance);
                            f(value);
                        }
                    }
                }
                if let Some(origin) = m.origin.as_mut() {
                    f(origin);
                }
            }
            ValueModel::Lambda(m) => m.captured.iter_mut().for_each(|v| f(v)),
            ValueModel::Custom(m) => {
                if let Some(origin) = m.origin.as_mut() {
                    f(origin);
                }
            }
        }
    }
}
