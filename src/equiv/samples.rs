use std::collections::HashMap;

use crate::model::*;

// ─── Field Samples ─────────────────────────────────────────────────

/// Field models seen across the result models of sibling executions,
/// grouped by `(field, depth)`.
///
/// A parameterized test body serves every execution of a method, so a
/// field that is null in one execution and an object in another needs a
/// null branch and a structural branch. The samples tell the engine which
/// fields need both, and give it a non-null model to shape the structural
/// branch after.
#[derive(Clone, Debug, Default)]
pub struct FieldSamples {
    arena: ModelArena,
    by_field: HashMap<(FieldId, usize), Vec<ModelRef>>,
}

impl FieldSamples {
    /// Walk every result model down to `max_depth`.
    pub fn collect<'a>(
        results: impl IntoIterator<Item = (&'a ModelArena, ModelRef)>,
        max_depth: usize,
    ) -> Self {
        let mut samples = Self::default();
        for (arena, root) in results {
            let Some(fields) = fields_of(arena, root) else {
                continue;
            };
            // One copy per result; samples are handles into it.
            let imported = samples.arena.import_reachable(arena, root);
            for (field, value) in fields {
                samples.record(arena, &imported, field, *value, 0, max_depth);
            }
        }
        samples
    }

    fn record(
        &mut self,
        arena: &ModelArena,
        imported: &HashMap<ModelRef, ModelRef>,
        field: &FieldId,
        model: ModelRef,
        depth: usize,
        max_depth: usize,
    ) {
        if depth >= max_depth {
            return;
        }
        let Some(local) = imported.get(&model) else {
            return;
        };
        self.by_field
            .entry((field.clone(), depth))
            .or_default()
            .push(*local);
        if let Some(fields) = fields_of(arena, model) {
            for (child, value) in fields {
                self.record(arena, imported, child, *value, depth + 1, max_depth);
            }
        }
    }

    /// Arena the sampled models live in.
    pub fn arena(&self) -> &ModelArena {
        &self.arena
    }

    pub fn has_null(&self, field: &FieldId, depth: usize) -> bool {
        self.models(field, depth)
            .any(|r| self.arena.get(r).is_null())
    }

    /// First sampled model of `field` at `depth` that is not null.
    pub fn non_null(&self, field: &FieldId, depth: usize) -> Option<ModelRef> {
        self.models(field, depth)
            .find(|r| !self.arena.get(*r).is_null())
    }

    fn models(&self, field: &FieldId, depth: usize) -> impl Iterator<Item = ModelRef> + '_ {
        self.by_field
            .get(&(field.clone(), depth))
            .into_iter()
            .flatten()
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }
}

/// Fields of a composite, or of the composite origin of an assemble or
/// custom model.
fn fields_of(
    arena: &ModelArena,
    model: ModelRef,
) -> Option<&std::collections::BTreeMap<FieldId, ModelRef>> {
    match arena.get(model) {
        ValueModel::Composite(m) => Some(&m.fields),
        ValueModel::Assemble(AssembleModel {
            origin: Some(origin),
            ..
        })
        | ValueModel::Custom(CustomModel {
            origin: Some(origin),
            ..
        }) => match arena.get(*origin) {
            ValueModel::Composite(m) => Some(&m.fields),
            _ => None,
        },
        _ => None,
    }
}
