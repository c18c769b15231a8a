//! Concrete checker for assertion blocks.
//!
//! Materializes expected models into a `Heap` and runs a statement tree
//! produced by the equivalence engine against actual values living in
//! the same heap. A block whose assertions all hold establishes that the
//! actual values are equivalent to the expected models.
//!
//! Assertion failures are soft: every assertion of the block is tried
//! and each failure is recorded. Dereferencing null while reading a
//! field or an element is a hard failure that ends the block, the way
//! a generated test would die on the spot.

mod heap;
#[cfg(test)]
mod tests;

pub use heap::*;

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::debug;

use crate::convert::Execution;
use crate::equiv::{ActualVariables, Assertion, Expr, Statement};
use crate::error::{EvalError, InvariantViolation};
use crate::model::*;

// ─── Result Types ──────────────────────────────────────────────────

/// Values bound to the free variables of a block.
pub type Bindings = HashMap<String, RtValue>;

/// Verdict of a concrete check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EquivalenceVerdict {
    Equivalent,
    NotEquivalent,
}

impl fmt::Display for EquivalenceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquivalenceVerdict::Equivalent => write!(f, "EQUIVALENT"),
            EquivalenceVerdict::NotEquivalent => write!(f, "NOT EQUIVALENT"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CheckReport {
    pub verdict: EquivalenceVerdict,
    /// Assertions evaluated.
    pub assertions: usize,
    /// One message per failed assertion or aborted block.
    pub failures: Vec<String>,
}

impl CheckReport {
    pub fn is_equivalent(&self) -> bool {
        self.verdict == EquivalenceVerdict::Equivalent
    }

    /// Format a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        report.push_str(&format!("  Verdict: {}\n", self.verdict));
        report.push_str(&format!("  Assertions: {}\n", self.assertions));
        if !self.failures.is_empty() {
            report.push_str("  Failures:\n");
            for failure in &self.failures {
                report.push_str(&format!("    {}\n", failure));
            }
        }
        report
    }
}

// ─── Entry Points ──────────────────────────────────────────────────

/// Execute `statements` with `bindings` in scope.
///
/// `Expr::Model` nodes are materialized from `arena`; all values meet in
/// `heap`.
pub fn check(
    statements: &[Statement],
    bindings: &Bindings,
    heap: &mut Heap,
    arena: &ModelArena,
    oracle: &dyn TypeOracle,
) -> Result<CheckReport, EvalError> {
    let mut checker = Checker {
        heap,
        arena,
        oracle,
        env: bindings.clone(),
        memo: Materialized::new(),
        assertions: 0,
        failures: Vec::new(),
    };
    match checker.block(statements) {
        Ok(()) => {}
        Err(Halt::Failed(msg)) => checker.failures.push(msg),
        Err(Halt::Error(err)) => return Err(err),
    }
    let verdict = if checker.failures.is_empty() {
        EquivalenceVerdict::Equivalent
    } else {
        EquivalenceVerdict::NotEquivalent
    };
    debug!(
        assertions = checker.assertions,
        failures = checker.failures.len(),
        %verdict,
        "checked block"
    );
    Ok(CheckReport {
        verdict,
        assertions: checker.assertions,
        failures: checker.failures,
    })
}

/// Bind `actual` to what `execution` produced: its result and its final
/// receiver, argument and static state, materialized into `heap`.
pub fn bind_actuals(
    heap: &mut Heap,
    execution: &Execution,
    actual: &ActualVariables,
) -> Result<Bindings, EvalError> {
    let mut memo = Materialized::new();
    let mut bindings = Bindings::new();
    let arena = &execution.arena;
    if let (Some(var), Some(model)) = (&actual.result, execution.result_model()) {
        bindings.insert(var.name.clone(), heap.materialize_with(arena, model, &mut memo)?);
    }
    if let Some(after) = &execution.state_after {
        if let (Some(var), Some(model)) = (&actual.this, after.this) {
            bindings.insert(var.name.clone(), heap.materialize_with(arena, model, &mut memo)?);
        }
        for (var, model) in actual.params.iter().zip(&after.params) {
            if let Some(var) = var {
                bindings.insert(var.name.clone(), heap.materialize_with(arena, *model, &mut memo)?);
            }
        }
        for (field, model) in &after.statics {
            if let Some(var) = actual.statics.get(field) {
                bindings.insert(var.name.clone(), heap.materialize_with(arena, *model, &mut memo)?);
            }
        }
    }
    Ok(bindings)
}

// ─── Checker ───────────────────────────────────────────────────────

/// Why a block stopped early.
enum Halt {
    /// The generated test would have died here.
    Failed(String),
    Error(EvalError),
}

impl From<EvalError> for Halt {
    fn from(err: EvalError) -> Self {
        Halt::Error(err)
    }
}

impl From<InvariantViolation> for Halt {
    fn from(err: InvariantViolation) -> Self {
        Halt::Error(err.into())
    }
}

struct Checker<'a> {
    heap: &'a mut Heap,
    arena: &'a ModelArena,
    oracle: &'a dyn TypeOracle,
    env: Bindings,
    /// Expected models already materialized by this block.
    memo: Materialized,
    assertions: usize,
    failures: Vec<String>,
}

impl Checker<'_> {
    fn block(&mut self, statements: &[Statement]) -> Result<(), Halt> {
        for stmt in statements {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), Halt> {
        match stmt {
            Statement::Declare { var, init } => {
                let value = self.eval(init)?;
                self.env.insert(var.name.clone(), value);
            }
            Statement::Assert(assertion) => {
                self.assertions += 1;
                if let Some(reason) = self.assertion(assertion)? {
                    self.failures.push(format!("{}: {}", assertion, reason));
                }
            }
            Statement::Comment(_) => {}
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                let taken = self.eval(condition)?;
                match taken.as_prim().and_then(PrimitiveValue::as_bool) {
                    Some(true) => self.block(then)?,
                    Some(false) => self.block(otherwise)?,
                    None => {
                        return Err(EvalError::TypeMismatch(format!(
                            "condition `{}` evaluated to {}",
                            condition, taken
                        ))
                        .into())
                    }
                }
            }
            Statement::For { index, bound, body } => {
                let n = self.int(bound)?;
                for i in 0..n {
                    let i = i32::try_from(i).map_err(|_| {
                        EvalError::TypeMismatch(format!("loop index {} out of int range", i))
                    })?;
                    self.env
                        .insert(index.name.clone(), RtValue::Prim(PrimitiveValue::Int(i)));
                    self.block(body)?;
                }
            }
        }
        Ok(())
    }

    // ─── Expressions ───────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> Result<RtValue, Halt> {
        Ok(match expr {
            Expr::Var(name) => self
                .env
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone()))?,
            Expr::Literal(value) => RtValue::Prim(value.clone()),
            Expr::Null => RtValue::Null,
            Expr::ClassLiteral(class_id) => RtValue::Class(class_id.clone()),
            Expr::Field { target, field, .. } => {
                let h = self.deref(target)?;
                self.object(h)?.field(field).ok_or_else(|| {
                    EvalError::TypeMismatch(format!("`{}` is an array, not an object", target))
                })?
            }
            Expr::Length(array) => {
                let h = self.deref(array)?;
                let len = self.elements(h, array)?.len();
                let len = i32::try_from(len).map_err(|_| {
                    EvalError::TypeMismatch(format!("length {} out of int range", len))
                })?;
                RtValue::Prim(PrimitiveValue::Int(len))
            }
            Expr::Element { array, index } => {
                let h = self.deref(array)?;
                let i = self.int(index)?;
                let elements = self.elements(h, array)?;
                match elements.get(i) {
                    Some(v) => v.clone(),
                    None => {
                        return Err(Halt::Failed(format!(
                            "index {} out of bounds for `{}` of length {}",
                            i,
                            array,
                            elements.len()
                        )))
                    }
                }
            }
            Expr::Model(r) => self
                .heap
                .materialize_with(self.arena, *r, &mut self.memo)?,
            Expr::IsNull(value) => RtValue::Prim(PrimitiveValue::Bool(self.eval(value)?.is_null())),
        })
    }

    /// Evaluate `expr` to an object handle; null aborts the block.
    fn deref(&mut self, expr: &Expr) -> Result<HeapRef, Halt> {
        match self.eval(expr)? {
            RtValue::Ref(h) => Ok(h),
            RtValue::Null => Err(Halt::Failed(format!("`{}` is null", expr))),
            other => {
                Err(EvalError::TypeMismatch(format!("`{}` evaluated to {}", expr, other)).into())
            }
        }
    }

    fn int(&mut self, expr: &Expr) -> Result<usize, Halt> {
        let value = self.eval(expr)?;
        value
            .as_prim()
            .and_then(PrimitiveValue::as_i64)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| {
                let message = format!("`{}` evaluated to {}, not an index", expr, value);
                EvalError::TypeMismatch(message).into()
            })
    }

    fn object(&self, h: HeapRef) -> Result<&HeapObject, Halt> {
        self.heap
            .get(h)
            .ok_or_else(|| InvariantViolation::new(format!("dangling heap reference {}", h)).into())
    }

    fn elements(&self, h: HeapRef, expr: &Expr) -> Result<&[RtValue], Halt> {
        match self.object(h)? {
            HeapObject::Array { elements, .. } => Ok(elements.as_slice()),
            HeapObject::Object { class_id, .. } => Err(EvalError::TypeMismatch(format!(
                "`{}` is a {}, not an array",
                expr, class_id
            ))
            .into()),
        }
    }

    // ─── Assertions ────────────────────────────────────────────────

    /// `None` when the assertion holds, else why it does not.
    fn assertion(&mut self, assertion: &Assertion) -> Result<Option<String>, Halt> {
        let mismatch = |expected: &RtValue, actual: &RtValue| {
            Some(format!("expected {} but was {}", expected, actual))
        };
        Ok(match assertion {
            Assertion::Equals { expected, actual } => {
                let (e, a) = (self.eval(expected)?, self.eval(actual)?);
                if self.equals(&e, &a) {
                    None
                } else {
                    mismatch(&e, &a)
                }
            }
            Assertion::ApproxEquals {
                expected,
                actual,
                delta,
            } => {
                let (e, a) = (self.eval(expected)?, self.eval(actual)?);
                if approx_equals(&e, &a, *delta) {
                    None
                } else {
                    mismatch(&e, &a)
                }
            }
            Assertion::True(actual) | Assertion::False(actual) => {
                let want = matches!(assertion, Assertion::True(_));
                let a = self.eval(actual)?;
                match a.as_prim().and_then(PrimitiveValue::as_bool) {
                    Some(b) if b == want => None,
                    _ => Some(format!("expected {} but was {}", want, a)),
                }
            }
            Assertion::Null(actual) => {
                let a = self.eval(actual)?;
                (!a.is_null()).then(|| format!("expected null but was {}", a))
            }
            Assertion::NotNull(actual) => {
                let a = self.eval(actual)?;
                a.is_null().then(|| "expected a value but was null".to_string())
            }
            Assertion::Same { expected, actual } => {
                let (e, a) = (self.eval(expected)?, self.eval(actual)?);
                let same = match (&e, &a) {
                    (RtValue::Prim(x), RtValue::Prim(y)) => primitives_equal(x, y),
                    _ => e == a,
                };
                (!same).then(|| format!("expected same object {} but was {}", e, a))
            }
            Assertion::ArrayEquals { expected, actual } => {
                let (e, a) = (self.eval(expected)?, self.eval(actual)?);
                self.arrays(&e, &a, |checker, x, y| checker.equals(x, y))?
            }
            Assertion::ApproxArrayEquals {
                expected,
                actual,
                delta,
            } => {
                let (e, a) = (self.eval(expected)?, self.eval(actual)?);
                self.arrays(&e, &a, |_, x, y| approx_equals(x, y, *delta))?
            }
            Assertion::DeepEquals { expected, actual } => {
                let (e, a) = (self.eval(expected)?, self.eval(actual)?);
                let mut visited = HashSet::new();
                if self.deep_equals(&e, &a, &mut visited) {
                    None
                } else {
                    Some(format!("{} and {} differ structurally", e, a))
                }
            }
        })
    }

    fn arrays(
        &self,
        expected: &RtValue,
        actual: &RtValue,
        element_equals: impl Fn(&Self, &RtValue, &RtValue) -> bool,
    ) -> Result<Option<String>, Halt> {
        let (e, a) = match (expected, actual) {
            (RtValue::Null, RtValue::Null) => return Ok(None),
            (RtValue::Ref(e), RtValue::Ref(a)) => (*e, *a),
            _ => return Ok(Some(format!("expected {} but was {}", expected, actual))),
        };
        let (
            Some(HeapObject::Array { elements: xs, .. }),
            Some(HeapObject::Array { elements: ys, .. }),
        ) = (self.heap.get(e), self.heap.get(a))
        else {
            return Err(EvalError::TypeMismatch(format!("{} or {} is not an array", e, a)).into());
        };
        if xs.len() != ys.len() {
            return Ok(Some(format!(
                "array lengths differ: expected {} but was {}",
                xs.len(),
                ys.len()
            )));
        }
        Ok(xs
            .iter()
            .zip(ys)
            .position(|(x, y)| !element_equals(self, x, y))
            .map(|i| {
                format!(
                    "arrays first differ at index {}: expected {} but was {}",
                    i, xs[i], ys[i]
                )
            }))
    }

    /// `equals` semantics: value types and types with a trusted equality
    /// compare by content, everything else by identity.
    fn equals(&self, expected: &RtValue, actual: &RtValue) -> bool {
        match (expected, actual) {
            (RtValue::Prim(x), RtValue::Prim(y)) => primitives_equal(x, y),
            (RtValue::Ref(x), RtValue::Ref(y)) if x == y => true,
            (RtValue::Ref(x), RtValue::Ref(_)) => {
                let by_content = self.heap.get(*x).is_some_and(|o| {
                    let class_id = o.class_id();
                    self.oracle.has_reliable_equals(class_id)
                        || self.oracle.is_primitive_wrapper(class_id)
                });
                by_content && self.deep_equals(expected, actual, &mut HashSet::new())
            }
            _ => expected == actual,
        }
    }

    /// Structural comparison; a pair already under comparison is assumed
    /// equal, which cuts cycles.
    fn deep_equals(
        &self,
        expected: &RtValue,
        actual: &RtValue,
        visited: &mut HashSet<(HeapRef, HeapRef)>,
    ) -> bool {
        let (x, y) = match (expected, actual) {
            (RtValue::Prim(a), RtValue::Prim(b)) => return primitives_equal(a, b),
            (RtValue::Ref(x), RtValue::Ref(y)) => (*x, *y),
            _ => return expected == actual,
        };
        if x == y || !visited.insert((x, y)) {
            return true;
        }
        match (self.heap.get(x), self.heap.get(y)) {
            (
                Some(HeapObject::Object {
                    class_id: cx,
                    fields: fx,
                    is_mock: mx,
                }),
                Some(HeapObject::Object {
                    class_id: cy,
                    fields: fy,
                    is_mock: my,
                }),
            ) => {
                if cx != cy || *mx || *my {
                    return false;
                }
                let (ox, oy) = (self.heap.get(x), self.heap.get(y));
                fx.keys().chain(fy.keys()).all(|field| {
                    let vx = ox.and_then(|o| o.field(field));
                    let vy = oy.and_then(|o| o.field(field));
                    match (vx, vy) {
                        (Some(vx), Some(vy)) => self.deep_equals(&vx, &vy, visited),
                        _ => false,
                    }
                })
            }
            (
                Some(HeapObject::Array { elements: ex, .. }),
                Some(HeapObject::Array { elements: ey, .. }),
            ) => {
                ex.len() == ey.len()
                    && ex
                        .iter()
                        .zip(ey)
                        .all(|(a, b)| self.deep_equals(a, b, visited))
            }
            _ => false,
        }
    }
}

/// Numeric primitives compare by value across widths; NaN equals NaN.
pub fn primitives_equal(x: &PrimitiveValue, y: &PrimitiveValue) -> bool {
    match (x, y) {
        (PrimitiveValue::String(a), PrimitiveValue::String(b)) => a == b,
        (PrimitiveValue::Bool(a), PrimitiveValue::Bool(b)) => a == b,
        (PrimitiveValue::String(_) | PrimitiveValue::Bool(_), _)
        | (_, PrimitiveValue::String(_) | PrimitiveValue::Bool(_)) => false,
        _ if x.kind().is_floating() || y.kind().is_floating() => match (x.as_f64(), y.as_f64()) {
            (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => false,
        },
        _ => x.as_i64().is_some() && x.as_i64() == y.as_i64(),
    }
}

/// `|expected - actual| <= delta`; NaN equals NaN.
fn approx_equals(expected: &RtValue, actual: &RtValue, delta: f64) -> bool {
    let as_f64 = |v: &RtValue| v.as_prim().and_then(PrimitiveValue::as_f64);
    match (as_f64(expected), as_f64(actual)) {
        (Some(e), Some(a)) if e.is_nan() || a.is_nan() => e.is_nan() && a.is_nan(),
        (Some(e), Some(a)) => (e - a).abs() <= delta,
        _ => expected.is_null() && actual.is_null(),
    }
}
