use std::collections::HashMap;

use serde::Serialize;

use crate::model::{ClassId, FieldAccess, FieldId, ModelRef, PrimitiveValue};

// ─── Statement Tree ────────────────────────────────────────────────

/// A typed program variable.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub ty: ClassId,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: ClassId) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn expr(&self) -> Expr {
        Expr::Var(self.name.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum Expr {
    Var(String),
    Literal(PrimitiveValue),
    Null,
    ClassLiteral(ClassId),
    Field {
        target: Box<Expr>,
        field: FieldId,
        access: FieldAccess,
    },
    Length(Box<Expr>),
    Element {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    /// The value an expected model denotes, built by the test.
    Model(ModelRef),
    IsNull(Box<Expr>),
}

impl Expr {
    pub fn field(target: Expr, field: &FieldId, access: FieldAccess) -> Self {
        Expr::Field {
            target: Box::new(target),
            field: field.clone(),
            access,
        }
    }

    pub fn length(array: Expr) -> Self {
        Expr::Length(Box::new(array))
    }

    pub fn element(array: Expr, index: Expr) -> Self {
        Expr::Element {
            array: Box::new(array),
            index: Box::new(index),
        }
    }

    pub fn is_null(value: Expr) -> Self {
        Expr::IsNull(Box::new(value))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "assert", rename_all = "snake_case")]
pub enum Assertion {
    Equals { expected: Expr, actual: Expr },
    ApproxEquals { expected: Expr, actual: Expr, delta: f64 },
    True(Expr),
    False(Expr),
    Null(Expr),
    NotNull(Expr),
    /// Reference identity.
    Same { expected: Expr, actual: Expr },
    ArrayEquals { expected: Expr, actual: Expr },
    ApproxArrayEquals { expected: Expr, actual: Expr, delta: f64 },
    /// Generic recursive structural comparison.
    DeepEquals { expected: Expr, actual: Expr },
}

impl Assertion {
    pub fn is_deep_equals(&self) -> bool {
        matches!(self, Assertion::DeepEquals { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Statement {
    Declare { var: Variable, init: Expr },
    Assert(Assertion),
    Comment(String),
    If {
        condition: Expr,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    },
    /// `for index in 0..bound`
    For {
        index: Variable,
        bound: Expr,
        body: Vec<Statement>,
    },
}

/// Every assertion of a block, nested blocks included, in order.
pub fn assertions(block: &[Statement]) -> Vec<&Assertion> {
    let mut out = Vec::new();
    collect_assertions(block, &mut out);
    out
}

fn collect_assertions<'a>(block: &'a [Statement], out: &mut Vec<&'a Assertion>) {
    for stmt in block {
        match stmt {
            Statement::Assert(a) => out.push(a),
            Statement::If {
                then, otherwise, ..
            } => {
                collect_assertions(then, out);
                collect_assertions(otherwise, out);
            }
            Statement::For { body, .. } => collect_assertions(body, out),
            Statement::Declare { .. } | Statement::Comment(_) => {}
        }
    }
}

// ─── Names ─────────────────────────────────────────────────────────

/// Hands out variable names unique within one block.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    taken: HashMap<String, usize>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a name as used without generating it.
    pub fn reserve(&mut self, name: &str) {
        self.taken.entry(name.to_string()).or_insert(1);
    }

    /// `base`, or `base2`, `base3`, ... when `base` is taken.
    pub fn variable_name(&mut self, base: &str) -> String {
        let count = self.taken.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            return base.to_string();
        }
        let candidate = format!("{}{}", base, count);
        if self.taken.contains_key(&candidate) {
            return self.variable_name(&candidate);
        }
        self.taken.insert(candidate.clone(), 1);
        candidate
    }
}

/// `name` with its first character upper-cased.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
