use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::*;

// ─── Type Knowledge ────────────────────────────────────────────────

/// How generated code can read a field of an object it holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "getter", rename_all = "snake_case")]
pub enum FieldAccess {
    /// `obj.field`
    Direct,
    /// `obj.getField()`
    Getter(String),
    /// Through the reflective `getFieldValue` helper.
    Reflection,
}

/// Questions about the program's types that the converter and the
/// equivalence engine cannot answer from the models alone.
pub trait TypeOracle: Sync {
    /// The type has a public constructor taking no arguments.
    fn has_trivial_constructor(&self, class_id: &ClassId) -> bool;

    /// The type is a standard container (iterable or map).
    fn is_container(&self, class_id: &ClassId) -> bool;

    /// The type overrides equality in a way that does not depend on
    /// anything but its own state.
    fn has_reliable_equals(&self, class_id: &ClassId) -> bool;

    /// The type boxes a primitive or string.
    fn is_primitive_wrapper(&self, class_id: &ClassId) -> bool;

    fn field_access(&self, field: &FieldId) -> FieldAccess {
        let _ = field;
        FieldAccess::Direct
    }
}

const DEFAULT_CONTAINERS: &[&str] = &[
    "java.lang.Iterable",
    "java.util.Collection",
    "java.util.List",
    "java.util.ArrayList",
    "java.util.LinkedList",
    "java.util.Set",
    "java.util.HashSet",
    "java.util.LinkedHashSet",
    "java.util.TreeSet",
    "java.util.Map",
    "java.util.HashMap",
    "java.util.LinkedHashMap",
    "java.util.TreeMap",
];

const DEFAULT_WRAPPERS: &[&str] = &[
    "java.lang.Boolean",
    "java.lang.Byte",
    "java.lang.Short",
    "java.lang.Character",
    "java.lang.Integer",
    "java.lang.Long",
    "java.lang.Float",
    "java.lang.Double",
    "java.lang.String",
];

/// Table-driven `TypeOracle`, filled from configuration.
///
/// Type names use the `ClassId` text form. Field keys are
/// `DeclaringType.field`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeTable {
    pub trivial_constructors: BTreeSet<String>,
    pub containers: BTreeSet<String>,
    pub reliable_equals: BTreeSet<String>,
    pub wrappers: BTreeSet<String>,
    pub getters: BTreeMap<String, String>,
    pub reflective_fields: BTreeSet<String>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self {
            trivial_constructors: BTreeSet::new(),
            containers: DEFAULT_CONTAINERS.iter().map(|s| s.to_string()).collect(),
            reliable_equals: BTreeSet::new(),
            wrappers: DEFAULT_WRAPPERS.iter().map(|s| s.to_string()).collect(),
            getters: BTreeMap::new(),
            reflective_fields: BTreeSet::new(),
        }
    }
}

impl TypeTable {
    /// A table that knows nothing beyond the built-in containers and
    /// wrappers.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trivial_constructor(mut self, class_id: &ClassId) -> Self {
        self.trivial_constructors.insert(class_id.to_string());
        self
    }

    pub fn with_container(mut self, class_id: &ClassId) -> Self {
        self.containers.insert(class_id.to_string());
        self
    }

    pub fn with_reliable_equals(mut self, class_id: &ClassId) -> Self {
        self.reliable_equals.insert(class_id.to_string());
        self
    }

    pub fn with_getter(mut self, field: &FieldId, getter: impl Into<String>) -> Self {
        self.getters.insert(field_key(field), getter.into());
        self
    }

    pub fn with_reflective_field(mut self, field: &FieldId) -> Self {
        self.reflective_fields.insert(field_key(field));
        self
    }
}

fn field_key(field: &FieldId) -> String {
    format!("{}.{}", field.declaring_class, field.name)
}

impl TypeOracle for TypeTable {
    fn has_trivial_constructor(&self, class_id: &ClassId) -> bool {
        self.trivial_constructors.contains(&class_id.to_string())
    }

    fn is_container(&self, class_id: &ClassId) -> bool {
        self.containers.contains(&class_id.to_string())
    }

    fn has_reliable_equals(&self, class_id: &ClassId) -> bool {
        self.reliable_equals.contains(&class_id.to_string())
    }

    fn is_primitive_wrapper(&self, class_id: &ClassId) -> bool {
        self.wrappers.contains(&class_id.to_string())
    }

    fn field_access(&self, field: &FieldId) -> FieldAccess {
        let key = field_key(field);
        if let Some(getter) = self.getters.get(&key) {
            FieldAccess::Getter(getter.clone())
        } else if self.reflective_fields.contains(&key) {
            FieldAccess::Reflection
        } else {
            FieldAccess::Direct
        }
    }
}
