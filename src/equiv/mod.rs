//! Structural equivalence engine.
//!
//! Given an expected `ValueModel` and a program variable holding the
//! actual value, emits the statements that establish the two denote
//! equivalent values. The output is an abstract statement tree; turning
//! it into source text for a test framework is someone else's job.
//!
//! Dispatch is by expected-model variant, in precedence order:
//! mocks compare by identity, then depth bound, then nulls, primitives
//! (floating point with an absolute tolerance), enum constants and class
//! literals, arrays, assemble models, composites. Recursion goes through
//! fields; each step increments the depth, and once the bound is reached
//! a single generic deep-equals assertion stands in for the subtree.
//!
//! Cycles are cut with a visited set of `(model, originating field)`
//! pairs, private to one top-level comparison.

mod execution;
mod render;
mod samples;
mod tree;

pub use execution::*;
pub use render::*;
pub use samples::*;
pub use tree::*;

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::config::EquivalenceConfig;
use crate::error::InvariantViolation;
use crate::model::*;

/// Pairs already compared in the current top-level call.
pub type Visited = HashSet<(ModelKey, Option<FieldId>)>;

/// An expected model statically known to be null or a boolean is
/// asserted against directly; anything else first gets its own variable.
pub fn needs_expected_declaration(model: &ValueModel) -> bool {
    !matches!(
        model,
        ValueModel::Null { .. }
            | ValueModel::Primitive {
                value: PrimitiveValue::Bool(_)
            }
    )
}

// ─── Engine ────────────────────────────────────────────────────────

/// Emits equivalence assertions into one statement block.
///
/// Variable names are unique across everything one engine emits.
pub struct EquivalenceEngine<'a> {
    arena: Cow<'a, ModelArena>,
    oracle: &'a dyn TypeOracle,
    config: &'a EquivalenceConfig,
    samples: Option<&'a FieldSamples>,
    /// Sample models already copied into `arena`.
    imported: HashMap<ModelRef, ModelRef>,
    names: NameGenerator,
    block: Vec<Statement>,
}

impl<'a> EquivalenceEngine<'a> {
    pub fn new(
        arena: &'a ModelArena,
        oracle: &'a dyn TypeOracle,
        config: &'a EquivalenceConfig,
    ) -> Self {
        Self {
            arena: Cow::Borrowed(arena),
            oracle,
            config,
            samples: None,
            imported: HashMap::new(),
            names: NameGenerator::new(),
            block: Vec::new(),
        }
    }

    /// Field models of sibling executions, consulted in parameterized mode.
    pub fn with_samples(mut self, samples: &'a FieldSamples) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn names_mut(&mut self) -> &mut NameGenerator {
        &mut self.names
    }

    /// The statements emitted so far.
    pub fn finish(self) -> Vec<Statement> {
        self.block
    }

    pub fn emit(&mut self, stmt: Statement) {
        self.block.push(stmt);
    }

    fn emit_assert(&mut self, assertion: Assertion) {
        self.block.push(Statement::Assert(assertion));
    }

    fn comment(&mut self, text: impl Into<String>) {
        self.block.push(Statement::Comment(text.into()));
    }

    /// Declare a fresh variable named after `base`.
    pub fn declare(&mut self, base: &str, ty: ClassId, init: Expr) -> Variable {
        let var = Variable::new(self.names.variable_name(base), ty);
        self.emit(Statement::Declare {
            var: var.clone(),
            init,
        });
        var
    }

    /// Run `f` against an empty block and return what it emitted.
    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), InvariantViolation>,
    ) -> Result<Vec<Statement>, InvariantViolation> {
        let outer = std::mem::take(&mut self.block);
        let result = f(self);
        let inner = std::mem::replace(&mut self.block, outer);
        result.map(|()| inner)
    }

    // ─── Entry Points ──────────────────────────────────────────────

    /// Compare a whole value: literals directly, everything else through
    /// an expected variable named `expected_name`.
    pub fn assert_equality(
        &mut self,
        expected: ModelRef,
        actual: &Variable,
        expected_name: &str,
    ) -> Result<(), InvariantViolation> {
        let model = self.arena.get(expected).clone();
        match &model {
            ValueModel::Void => {
                return Err(InvariantViolation::new(format!(
                    "void model compared to `{}`",
                    actual.name
                )))
            }
            ValueModel::Null { .. } => {
                self.emit_assert(Assertion::Null(actual.expr()));
                return Ok(());
            }
            ValueModel::Primitive { value } => {
                let literal = Expr::Literal(value.clone());
                self.primitive(value, literal, actual);
                return Ok(());
            }
            _ => {}
        }

        let var = self.declare(expected_name, model.class_id(), Expr::Model(expected));
        if let ValueModel::Array(m) = &model {
            if m.class_id.dimensions() == 1 && m.class_id.innermost_element().is_primitive() {
                let assertion = match self.delta(m.class_id.innermost_element()) {
                    Some(delta) => Assertion::ApproxArrayEquals {
                        expected: var.expr(),
                        actual: actual.expr(),
                        delta,
                    },
                    None => Assertion::ArrayEquals {
                        expected: var.expr(),
                        actual: actual.expr(),
                    },
                };
                self.emit_assert(assertion);
                return Ok(());
            }
        }

        let mut visited = Visited::new();
        if self.config.is_parameterized() {
            let otherwise = self.nested(|engine| {
                engine.emit_assert(Assertion::NotNull(actual.expr()));
                engine.assert_equivalent(expected, Some(&var), actual, 0, &mut visited)
            })?;
            self.emit(Statement::If {
                condition: Expr::is_null(var.expr()),
                then: vec![Statement::Assert(Assertion::Null(actual.expr()))],
                otherwise,
            });
            Ok(())
        } else {
            self.assert_equivalent(expected, Some(&var), actual, 0, &mut visited)
        }
    }

    /// Emit assertions that `actual` is equivalent to `expected_model`.
    ///
    /// `expected` may be omitted only when `needs_expected_declaration`
    /// is false for the model.
    pub fn assert_equivalent(
        &mut self,
        expected_model: ModelRef,
        expected: Option<&Variable>,
        actual: &Variable,
        depth: usize,
        visited: &mut Visited,
    ) -> Result<(), InvariantViolation> {
        self.deep_equals(expected_model, expected, actual, depth, visited, None)
    }

    // ─── Dispatch ──────────────────────────────────────────────────

    fn deep_equals(
        &mut self,
        model_ref: ModelRef,
        expected: Option<&Variable>,
        actual: &Variable,
        depth: usize,
        visited: &mut Visited,
        field: Option<&FieldId>,
    ) -> Result<(), InvariantViolation> {
        let key = (self.arena.wrap(model_ref), field.cloned());
        if visited.contains(&key) {
            return Ok(());
        }
        let model = self.arena.get(model_ref).clone();
        let declared = expected.is_some();
        let expected = match expected {
            Some(var) => var.clone(),
            None if !needs_expected_declaration(&model) => actual.clone(),
            None => {
                return Err(InvariantViolation::new(format!(
                    "{} model compared to `{}` without an expected variable",
                    model.variant_name(),
                    actual.name
                )))
            }
        };
        visited.insert(key);
        trace!(model = %model_ref, actual = %actual.name, depth, "deep equals");

        if matches!(model, ValueModel::Composite(CompositeModel { is_mock: true, .. })) {
            self.emit_assert(Assertion::Same {
                expected: expected.expr(),
                actual: actual.expr(),
            });
            return Ok(());
        }

        // Null and boolean leaves have no expected variable to compare
        // against; they stay direct assertions below the bound too.
        if depth >= self.config.max_depth && declared {
            self.comment(format!(
                "Current deep equals depth exceeds max depth {}",
                self.config.max_depth
            ));
            self.deep_equals_fallback(&expected, actual);
            return Ok(());
        }

        match model {
            ValueModel::Primitive { value } => {
                self.primitive(&value, expected.expr(), actual);
            }
            ValueModel::EnumConstant(_) => self.emit_assert(Assertion::Equals {
                expected: expected.expr(),
                actual: actual.expr(),
            }),
            ValueModel::ClassRef(m) => self.emit_assert(Assertion::Equals {
                expected: Expr::ClassLiteral(m.referenced),
                actual: actual.expr(),
            }),
            ValueModel::Null { .. } => self.emit_assert(Assertion::Null(actual.expr())),
            ValueModel::Array(m) => self.array(&m, &expected, actual)?,
            ValueModel::Assemble(m) => self.assemble(&m, &expected, actual, depth, visited)?,
            ValueModel::Composite(m) => self.composite(&m, &expected, actual, depth, visited)?,
            ValueModel::Custom(m) => {
                let origin = match m.origin.map(|o| self.arena.get(o)) {
                    Some(ValueModel::Composite(origin)) => origin.clone(),
                    _ => {
                        return Err(InvariantViolation::new(format!(
                            "custom model of {} has no structural origin",
                            m.class_id
                        )))
                    }
                };
                self.composite(&origin, &expected, actual, depth, visited)?;
            }
            // Lambdas are never compared.
            ValueModel::Lambda(_) => {}
            ValueModel::Void => {
                return Err(InvariantViolation::new(format!(
                    "void model inside a compared value (`{}`)",
                    actual.name
                )))
            }
        }
        Ok(())
    }

    fn deep_equals_fallback(&mut self, expected: &Variable, actual: &Variable) {
        self.emit_assert(Assertion::DeepEquals {
            expected: expected.expr(),
            actual: actual.expr(),
        });
    }

    fn delta(&self, ty: &ClassId) -> Option<f64> {
        match ty.primitive_kind()? {
            PrimitiveKind::Float => Some(self.config.float_delta),
            PrimitiveKind::Double => Some(self.config.double_delta),
            _ => None,
        }
    }

    fn primitive(&mut self, value: &PrimitiveValue, expected: Expr, actual: &Variable) {
        let assertion = match value {
            PrimitiveValue::Float(_) | PrimitiveValue::Double(_) => Assertion::ApproxEquals {
                expected,
                actual: actual.expr(),
                delta: self.delta(&value.class_id()).unwrap_or(self.config.double_delta),
            },
            PrimitiveValue::Bool(b) if self.config.is_parameterized() => Assertion::Equals {
                expected: Expr::Literal(PrimitiveValue::Bool(*b)),
                actual: actual.expr(),
            },
            PrimitiveValue::Bool(true) => Assertion::True(actual.expr()),
            PrimitiveValue::Bool(false) => Assertion::False(actual.expr()),
            _ => Assertion::Equals {
                expected,
                actual: actual.expr(),
            },
        };
        self.emit_assert(assertion);
    }

    // ─── Arrays ────────────────────────────────────────────────────

    /// `expectedSize = expected.length; assertEquals(expectedSize, actual.length)`
    fn length_assertion(&mut self, expected: &Variable, actual: &Variable) -> Variable {
        let size = self.declare(
            &format!("{}Size", expected.name),
            ClassId::Primitive(PrimitiveKind::Int),
            Expr::length(expected.expr()),
        );
        self.emit_assert(Assertion::Equals {
            expected: size.expr(),
            actual: Expr::length(actual.expr()),
        });
        size
    }

    fn array(
        &mut self,
        m: &ArrayModel,
        expected: &Variable,
        actual: &Variable,
    ) -> Result<(), InvariantViolation> {
        let innermost = m.class_id.innermost_element();
        if !innermost.is_primitive() {
            // Slots of an object array may hold values of unrelated
            // runtime types; only a generic walk handles all of them.
            self.length_assertion(expected, actual);
            self.deep_equals_fallback(expected, actual);
            return Ok(());
        }
        if innermost.is_floating() {
            return self.floating_point_arrays(&m.class_id, expected, actual);
        }
        self.length_assertion(expected, actual);
        self.emit_assert(Assertion::ArrayEquals {
            expected: expected.expr(),
            actual: actual.expr(),
        });
        Ok(())
    }

    /// Tolerance comparison of a float or double array of any dimension,
    /// one dimension per loop.
    fn floating_point_arrays(
        &mut self,
        class_id: &ClassId,
        expected: &Variable,
        actual: &Variable,
    ) -> Result<(), InvariantViolation> {
        let size = self.length_assertion(expected, actual);
        let element = class_id
            .element()
            .ok_or_else(|| InvariantViolation::new(format!("{} is not an array type", class_id)))?
            .clone();

        if class_id.dimensions() == 1 {
            let delta = self.delta(&element).ok_or_else(|| {
                InvariantViolation::new(format!("{} is not a floating-point array", class_id))
            })?;
            self.emit_assert(Assertion::ApproxArrayEquals {
                expected: expected.expr(),
                actual: actual.expr(),
                delta,
            });
            return Ok(());
        }

        let index = Variable::new(
            self.names.variable_name("i"),
            ClassId::Primitive(PrimitiveKind::Int),
        );
        let body = self.nested(|engine| {
            let expected_nested = engine.declare(
                &format!("{}NestedElement", expected.name),
                element.clone(),
                Expr::element(expected.expr(), index.expr()),
            );
            let actual_nested = engine.declare(
                &format!("{}NestedElement", actual.name),
                element.clone(),
                Expr::element(actual.expr(), index.expr()),
            );
            let otherwise = engine.nested(|engine| {
                engine.floating_point_arrays(&element, &expected_nested, &actual_nested)
            })?;
            engine.emit(Statement::If {
                condition: Expr::is_null(expected_nested.expr()),
                then: vec![Statement::Assert(Assertion::Null(actual_nested.expr()))],
                otherwise,
            });
            Ok(())
        })?;
        self.emit(Statement::For {
            index,
            bound: size.expr(),
            body,
        });
        Ok(())
    }

    // ─── Objects ───────────────────────────────────────────────────

    fn assemble(
        &mut self,
        m: &AssembleModel,
        expected: &Variable,
        actual: &Variable,
        depth: usize,
        visited: &mut Visited,
    ) -> Result<(), InvariantViolation> {
        let equals = Assertion::Equals {
            expected: expected.expr(),
            actual: actual.expr(),
        };
        if self.oracle.is_primitive_wrapper(&m.class_id) {
            self.emit_assert(equals);
            return Ok(());
        }
        // A field snapshot is easier to compare than a call sequence.
        if let Some(origin) = m.origin {
            return self.deep_equals(origin, Some(expected), actual, depth, visited, None);
        }
        if m.class_id == ClassId::string() {
            self.emit_assert(equals);
            return Ok(());
        }
        // Only direct field sets say which fields to compare.
        if m.modifications.is_empty() || !m.modifications.iter().all(StatementModel::is_field_set) {
            self.deep_equals_fallback(expected, actual);
            return Ok(());
        }
        for step in &m.modifications {
            if let StatementModel::SetField { field, value, .. } = step {
                if field.is_enclosing_instance_reference() {
                    continue;
                }
                self.traverse_field(field, *value, expected, actual, depth, visited)?;
            }
        }
        Ok(())
    }

    fn composite(
        &mut self,
        m: &CompositeModel,
        expected: &Variable,
        actual: &Variable,
        depth: usize,
        visited: &mut Visited,
    ) -> Result<(), InvariantViolation> {
        if self.oracle.is_container(&m.class_id) {
            self.comment(format!(
                "{} is iterable or Map, use outer deep equals to iterate over",
                m.class_id
            ));
            self.deep_equals_fallback(expected, actual);
            return Ok(());
        }
        if self.oracle.has_reliable_equals(&m.class_id) && !m.is_mock {
            self.comment(format!("{} has overridden equals method", m.class_id));
            self.emit_assert(Assertion::Equals {
                expected: expected.expr(),
                actual: actual.expr(),
            });
            return Ok(());
        }
        for (field, value) in &m.fields {
            if field.is_enclosing_instance_reference() {
                continue;
            }
            self.traverse_field(field, *value, expected, actual, depth, visited)?;
        }
        Ok(())
    }

    // ─── Fields ────────────────────────────────────────────────────

    fn traverse_field(
        &mut self,
        field: &FieldId,
        field_model: ModelRef,
        expected: &Variable,
        actual: &Variable,
        depth: usize,
        visited: &mut Visited,
    ) -> Result<(), InvariantViolation> {
        // A static field is the same before and after.
        if field.is_static {
            return Ok(());
        }
        if visited.contains(&(self.arena.wrap(field_model), Some(field.clone()))) {
            self.deep_equals_fallback(expected, actual);
            return Ok(());
        }

        let (model, null_branch) = if self.config.is_parameterized() {
            self.sampled_field(field, field_model, depth)
        } else {
            (field_model, false)
        };

        let expected_field = if needs_expected_declaration(self.arena.get(model)) {
            let init = self.field_access(expected, field);
            Some(self.declare(
                &format!("{}{}", expected.name, capitalize(&field.name)),
                field.ty.clone(),
                init,
            ))
        } else {
            None
        };
        let init = self.field_access(actual, field);
        let actual_field = self.declare(
            &format!("{}{}", actual.name, capitalize(&field.name)),
            field.ty.clone(),
            init,
        );

        match expected_field {
            Some(expected_field) if null_branch => {
                let otherwise = self.nested(|engine| {
                    engine.deep_equals(
                        model,
                        Some(&expected_field),
                        &actual_field,
                        depth + 1,
                        visited,
                        Some(field),
                    )
                })?;
                self.emit(Statement::If {
                    condition: Expr::is_null(expected_field.expr()),
                    then: vec![Statement::Assert(Assertion::Null(actual_field.expr()))],
                    otherwise,
                });
                Ok(())
            }
            expected_field => self.deep_equals(
                model,
                expected_field.as_ref(),
                &actual_field,
                depth + 1,
                visited,
                Some(field),
            ),
        }
    }

    /// The model to shape a parameterized field comparison after, and
    /// whether some execution saw the field null.
    fn sampled_field(
        &mut self,
        field: &FieldId,
        field_model: ModelRef,
        depth: usize,
    ) -> (ModelRef, bool) {
        let Some(samples) = self.samples else {
            return (field_model, false);
        };
        let has_null = samples.has_null(field, depth);
        if !self.arena.get(field_model).is_null() {
            return (field_model, has_null);
        }
        match samples.non_null(field, depth) {
            Some(sample) => (self.import_sample(samples, sample), has_null),
            None => (field_model, has_null),
        }
    }

    fn import_sample(&mut self, samples: &FieldSamples, sample: ModelRef) -> ModelRef {
        if let Some(local) = self.imported.get(&sample) {
            return *local;
        }
        let local = self.arena.to_mut().import(samples.arena(), sample);
        self.imported.insert(sample, local);
        local
    }

    fn field_access(&self, target: &Variable, field: &FieldId) -> Expr {
        Expr::field(target.expr(), field, self.oracle.field_access(field))
    }
}
