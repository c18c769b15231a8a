//! Rewrites over a finished model arena.
//!
//! Each pass visits every slot of the arena and rewrites it in place, so
//! handles held elsewhere stay valid and object identities survive. The
//! converter runs them in declaration order; constructor simplification
//! must precede demotion because both look at raw-allocation assembles.

use std::collections::HashMap;

use tracing::debug;

use crate::config::DemotionPolicy;
use crate::error::ConvertError;
use crate::model::*;

// ─── Pass 1: Cyclic Placeholders ───────────────────────────────────

/// Resolve every cyclic-reference placeholder through `lookup`.
///
/// Returns the placeholder-to-target map; the caller applies it to any
/// handle it keeps outside the arena. The placeholder slots themselves
/// are left behind, unreachable.
pub fn resolve_cyclic_placeholders(
    arena: &mut ModelArena,
    lookup: impl Fn(u32, Phase) -> Option<ModelRef>,
) -> Result<HashMap<ModelRef, ModelRef>, ConvertError> {
    let mut map = HashMap::new();
    for (r, model) in arena.iter() {
        if let ValueModel::Custom(CustomModel {
            kind: CustomKind::CyclicReference { ref_id, phase },
            ..
        }) = model
        {
            let target = lookup(*ref_id, *phase)
                .filter(|t| !is_placeholder(arena.get(*t)))
                .ok_or(ConvertError::DanglingReference {
                    ref_id: *ref_id,
                    phase: *phase,
                })?;
            map.insert(r, target);
        }
    }
    arena.redirect(&map);
    debug!(resolved = map.len(), "cyclic placeholders");
    Ok(map)
}

fn is_placeholder(model: &ValueModel) -> bool {
    matches!(
        model,
        ValueModel::Custom(CustomModel {
            kind: CustomKind::CyclicReference { .. },
            ..
        })
    )
}

// ─── Pass 2: Constructor Simplification ────────────────────────────

fn is_raw_allocation(call: &CallModel) -> bool {
    call.executable.is_util(UtilMethod::CreateInstance)
}

/// Replace raw allocation by the public no-argument constructor where
/// nothing else happens to the object.
pub fn simplify_constructors(arena: &mut ModelArena, oracle: &dyn TypeOracle) -> usize {
    let mut rewritten = 0;
    let targets: Vec<ModelRef> = arena
        .iter()
        .filter_map(|(r, model)| match model {
            ValueModel::Assemble(m)
                if is_raw_allocation(&m.instantiation)
                    && m.modifications.is_empty()
                    && oracle.has_trivial_constructor(&m.class_id) =>
            {
                Some(r)
            }
            _ => None,
        })
        .collect();
    for r in targets {
        if let ValueModel::Assemble(m) = arena.get_mut(r) {
            m.instantiation = CallModel {
                instance: None,
                executable: ExecutableId::constructor(m.class_id.clone(), Vec::new()),
                params: Vec::new(),
            };
            rewritten += 1;
        }
    }
    debug!(rewritten, "constructor simplification");
    rewritten
}

// ─── Pass 3: Sparse-Array Compaction ───────────────────────────────

/// Promote the most frequent stored value of each array to its default
/// fill and drop the stores it makes redundant.
///
/// Indices covered by the old default count as occurrences of it. A
/// value is promoted only if it occurs more than once and more often than
/// the current default; the indices the old default covered implicitly
/// then become explicit stores. Stores equal to the default are always
/// dropped. The result is a fixed point: compacting it again changes
/// nothing.
pub fn compact_arrays(arena: &mut ModelArena) -> usize {
    let mut compacted = 0;
    let arrays: Vec<ModelRef> = arena
        .iter()
        .filter(|(_, m)| matches!(m, ValueModel::Array(_)))
        .map(|(r, _)| r)
        .collect();
    for r in arrays {
        if let Some(array) = compact_array(arena, r) {
            arena.replace(r, ValueModel::Array(array));
            compacted += 1;
        }
    }
    debug!(compacted, "array compaction");
    compacted
}

fn compact_array(arena: &ModelArena, r: ModelRef) -> Option<ArrayModel> {
    let ValueModel::Array(array) = arena.get(r) else {
        return None;
    };
    let default_key = arena.wrap(array.default_fill);
    let implicit = array.length.saturating_sub(array.stores.len());

    // First occurrence of each key, in index order, with its count.
    let mut groups: Vec<(ModelKey, ModelRef, usize)> = Vec::new();
    for value in array.stores.values() {
        let key = arena.wrap(*value);
        match groups.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, count)) => *count += 1,
            None => groups.push((key, *value, 1)),
        }
    }

    let default_count = implicit
        + groups
            .iter()
            .find(|(key, _, _)| *key == default_key)
            .map_or(0, |(_, _, count)| *count);

    let mut result = array.clone();

    let best = groups
        .iter()
        .filter(|(key, _, _)| *key != default_key)
        .fold(None::<&(ModelKey, ModelRef, usize)>, |best, g| match best {
            Some(b) if b.2 >= g.2 => Some(b),
            _ => Some(g),
        });
    if let Some((key, representative, count)) = best {
        if *count > 1 && *count > default_count {
            if implicit > 0 {
                for index in 0..array.length {
                    result.stores.entry(index).or_insert(array.default_fill);
                }
            }
            result.default_fill = *representative;
            let new_default = key.clone();
            result.stores.retain(|_, v| arena.wrap(*v) != new_default);
            return Some(result);
        }
    }

    let before = result.stores.len();
    result.stores.retain(|_, v| arena.wrap(*v) != default_key);
    (result.stores.len() != before).then_some(result)
}

// ─── Pass 4: Assemble Demotion ─────────────────────────────────────

/// Rewrite raw-allocation assembles whose chain only sets fields into
/// composites with the same identity.
pub fn demote_assembles(arena: &mut ModelArena, policy: DemotionPolicy) -> usize {
    let mut demoted = 0;
    let candidates: Vec<ModelRef> = arena
        .iter()
        .filter_map(|(r, model)| match model {
            ValueModel::Assemble(m)
                if is_raw_allocation(&m.instantiation)
                    && m.modifications.iter().all(StatementModel::is_field_set) =>
            {
                Some(r)
            }
            _ => None,
        })
        .collect();
    for r in candidates {
        if let Some(composite) = demote(arena, r, policy) {
            arena.replace(r, ValueModel::Composite(composite));
            demoted += 1;
        }
    }
    debug!(demoted, "assemble demotion");
    demoted
}

/// The composite an assemble model demotes to, if it qualifies.
pub fn demote(arena: &ModelArena, r: ModelRef, policy: DemotionPolicy) -> Option<CompositeModel> {
    let ValueModel::Assemble(m) = arena.get(r) else {
        return None;
    };
    if !is_raw_allocation(&m.instantiation) {
        return None;
    }
    let snapshot = m.origin.and_then(|o| match arena.get(o) {
        ValueModel::Composite(c) => Some(c),
        _ => None,
    });
    let mut composite = CompositeModel::new(m.id, m.class_id.clone());
    for step in &m.modifications {
        let StatementModel::SetField { field, value, .. } = step else {
            return None;
        };
        if field.is_static {
            continue;
        }
        let observed = snapshot.and_then(|s| s.fields.get(field)).copied();
        let chosen = match policy {
            DemotionPolicy::PreferInitialSnapshot => observed.unwrap_or(*value),
            DemotionPolicy::PreferReplayedArgument => *value,
        };
        composite.fields.insert(field.clone(), chosen);
    }
    Some(composite)
}
