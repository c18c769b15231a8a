//! Execution records as the executor hands them over.
//!
//! A `RawExecution` bundles three things:
//! - the `Trace`: the instructions that build the inputs and call the
//!   method under test, as a table of expressions plus ordered init
//!   instructions;
//! - a descriptor table: snapshots of observed runtime values, each a
//!   stable identity that state records point into;
//! - the ordered result candidates: alternative representations of the
//!   execution outcome (concrete first, symbolic as fallback).
//!
//! Every record is plain serde data, read from JSON.

#[cfg(test)]
mod tests;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, InputError};
use crate::model::{ClassId, ExecutableId, FieldId, PrimitiveValue};

// ─── Trace ─────────────────────────────────────────────────────────

/// Index into `Trace::exprs`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprId(pub u32);

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A `(field, value)` pair; fields and statics travel as lists of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldBinding<T> {
    pub field: FieldId,
    pub value: T,
}

/// Answers a mock gives for one method, in call order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MockedMethod {
    pub method: ExecutableId,
    pub values: Vec<ExprId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    /// Allocation without running a constructor.
    AllocateMemory { class_id: ClassId },
    ConstructorCall {
        constructor: ExecutableId,
        #[serde(default)]
        args: Vec<ExprId>,
    },
    MethodCall {
        method: ExecutableId,
        instance: ExprId,
        #[serde(default)]
        args: Vec<ExprId>,
    },
    StaticMethodCall {
        method: ExecutableId,
        #[serde(default)]
        args: Vec<ExprId>,
    },
    GetField { instance: ExprId, field: FieldId },
    GetStaticField { field: FieldId },
    /// `class_id` is the array type; `size` must be an int constant.
    CreateArray { class_id: ClassId, size: ExprId },
    Const { value: PrimitiveValue },
    Null { class_id: ClassId },
    ClassLiteral { class_id: ClassId },
    MockObject {
        class_id: ClassId,
        #[serde(default)]
        fields: Vec<FieldBinding<ExprId>>,
        #[serde(default)]
        methods: Vec<MockedMethod>,
    },
    /// Intercepts every instance of a type (constructors) or a static
    /// surface (other methods).
    GlobalMock {
        class_id: ClassId,
        #[serde(default)]
        methods: Vec<MockedMethod>,
    },
    Arithmetic {
        operator: String,
        lhs: ExprId,
        rhs: ExprId,
    },
    Cast { class_id: ClassId, expr: ExprId },
    ArrayGet { array: ExprId, index: ExprId },
    ArrayLength { array: ExprId },
    BinaryCondition { lhs: ExprId, rhs: ExprId },
}

impl Expr {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::AllocateMemory { .. } => "allocate-memory",
            Expr::ConstructorCall { .. } => "constructor-call",
            Expr::MethodCall { .. } => "method-call",
            Expr::StaticMethodCall { .. } => "static-method-call",
            Expr::GetField { .. } => "get-field",
            Expr::GetStaticField { .. } => "get-static-field",
            Expr::CreateArray { .. } => "create-array",
            Expr::Const { .. } => "constant",
            Expr::Null { .. } => "null",
            Expr::ClassLiteral { .. } => "class-literal",
            Expr::MockObject { .. } => "mock-object",
            Expr::GlobalMock { .. } => "global-mock",
            Expr::Arithmetic { .. } => "arithmetic expression",
            Expr::Cast { .. } => "cast expression",
            Expr::ArrayGet { .. } => "array-get expression",
            Expr::ArrayLength { .. } => "array-length expression",
            Expr::BinaryCondition { .. } => "binary-condition expression",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "inst", rename_all = "snake_case")]
pub enum Inst {
    /// Evaluate an expression for its effect on the modeled objects.
    Eval { expr: ExprId },
    SetField {
        instance: ExprId,
        field: FieldId,
        value: ExprId,
    },
    SetStaticField { field: FieldId, value: ExprId },
    ArraySet {
        array: ExprId,
        index: ExprId,
        value: ExprId,
    },
    BinaryCondition { lhs: ExprId, rhs: ExprId },
}

/// The instruction sequence that sets up and performs one call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub exprs: Vec<Expr>,
    #[serde(default)]
    pub init: Vec<Inst>,
    /// The call of the method under test.
    pub call: ExprId,
}

impl Trace {
    pub fn expr(&self, id: ExprId) -> Result<&Expr, ConvertError> {
        self.exprs
            .get(id.0 as usize)
            .ok_or(ConvertError::UnknownExpr(id.0))
    }

    /// Receiver and arguments of the call under test.
    pub fn call_operands(&self) -> Result<(Option<ExprId>, &[ExprId]), ConvertError> {
        match self.expr(self.call)? {
            Expr::MethodCall { instance, args, .. } => Ok((Some(*instance), args)),
            Expr::StaticMethodCall { args, .. } | Expr::ConstructorCall { args, .. } => {
                Ok((None, args))
            }
            other => Err(ConvertError::MalformedTrace(format!(
                "call under test is a {}, not a call",
                other.kind_name()
            ))),
        }
    }

    /// Static fields the init sequence assigns, with their value expressions.
    pub fn static_assignments(&self) -> impl Iterator<Item = (&FieldId, ExprId)> {
        self.init.iter().filter_map(|inst| match inst {
            Inst::SetStaticField { field, value } => Some((field, *value)),
            _ => None,
        })
    }
}

// ─── Descriptors ───────────────────────────────────────────────────

/// Index into the descriptor table; the stable identity of a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorId(pub u32);

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Snapshot of one runtime value.
///
/// Object, array and exception descriptors carry the `ref_id` of the
/// heap object they describe, and optionally the trace expression that
/// produced it (`origin`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueDescriptor {
    Object {
        ref_id: u32,
        class_id: ClassId,
        #[serde(default)]
        fields: Vec<FieldBinding<DescriptorId>>,
        #[serde(default)]
        origin: Option<ExprId>,
    },
    Array {
        ref_id: u32,
        class_id: ClassId,
        length: usize,
        #[serde(default)]
        elements: Vec<DescriptorId>,
        #[serde(default)]
        origin: Option<ExprId>,
    },
    Class { class_id: ClassId },
    Constant { value: PrimitiveValue },
    Null { class_id: ClassId },
    /// "Same object as the one with `ref_id` in the current phase."
    CyclicRef { ref_id: u32, class_id: ClassId },
    Enum { class_id: ClassId, name: String },
    Exception {
        ref_id: u32,
        class_id: ClassId,
        #[serde(default)]
        message: Option<String>,
        /// Thrown by the code under test rather than by the runtime.
        #[serde(default)]
        raised_by_user_code: bool,
        #[serde(default)]
        origin: Option<ExprId>,
    },
}

impl ValueDescriptor {
    pub fn ref_id(&self) -> Option<u32> {
        match self {
            ValueDescriptor::Object { ref_id, .. }
            | ValueDescriptor::Array { ref_id, .. }
            | ValueDescriptor::Exception { ref_id, .. } => Some(*ref_id),
            _ => None,
        }
    }

    pub fn origin(&self) -> Option<ExprId> {
        match self {
            ValueDescriptor::Object { origin, .. }
            | ValueDescriptor::Array { origin, .. }
            | ValueDescriptor::Exception { origin, .. } => *origin,
            _ => None,
        }
    }

    pub fn class_id(&self) -> ClassId {
        match self {
            ValueDescriptor::Object { class_id, .. }
            | ValueDescriptor::Array { class_id, .. }
            | ValueDescriptor::Null { class_id }
            | ValueDescriptor::CyclicRef { class_id, .. }
            | ValueDescriptor::Enum { class_id, .. }
            | ValueDescriptor::Exception { class_id, .. } => class_id.clone(),
            ValueDescriptor::Class { .. } => ClassId::class_literal(),
            ValueDescriptor::Constant { value } => value.class_id(),
        }
    }
}

/// The environment as observed at one point: receiver, arguments and
/// static fields, each pointing into the descriptor table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default)]
    pub instance: Option<DescriptorId>,
    #[serde(default)]
    pub args: Vec<DescriptorId>,
    #[serde(default)]
    pub statics: Vec<FieldBinding<DescriptorId>>,
}

/// One representation of the execution outcome.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultCandidate {
    ConcreteSuccess {
        initial: ExecutionState,
        #[serde(rename = "final")]
        final_state: ExecutionState,
        /// `None` for void methods.
        #[serde(default)]
        result: Option<DescriptorId>,
    },
    ConcreteException {
        initial: ExecutionState,
        #[serde(rename = "final")]
        final_state: ExecutionState,
        exception: DescriptorId,
    },
    /// The setup code failed before the method under test was called.
    ConcreteInitFailed { cause: DescriptorId },
    /// The concrete runner itself failed.
    ConcreteFailed { cause: DescriptorId },
    ConcreteTimeout,
    SymbolicSuccess {
        #[serde(default)]
        init: Vec<Inst>,
        result: ExprId,
    },
    SymbolicException { class_id: ClassId },
}

impl ResultCandidate {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResultCandidate::ConcreteSuccess { .. } => "concrete-success",
            ResultCandidate::ConcreteException { .. } => "concrete-exception",
            ResultCandidate::ConcreteInitFailed { .. } => "concrete-init-failed",
            ResultCandidate::ConcreteFailed { .. } => "concrete-failed",
            ResultCandidate::ConcreteTimeout => "concrete-timeout",
            ResultCandidate::SymbolicSuccess { .. } => "symbolic-success",
            ResultCandidate::SymbolicException { .. } => "symbolic-exception",
        }
    }
}

// ─── Execution Records ─────────────────────────────────────────────

/// Everything the executor reports for one execution of one method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawExecution {
    pub method: ExecutableId,
    pub trace: Trace,
    #[serde(default)]
    pub descriptors: Vec<ValueDescriptor>,
    /// Tried in order; the first that converts wins.
    pub candidates: Vec<ResultCandidate>,
}

impl RawExecution {
    pub fn descriptor(&self, id: DescriptorId) -> Result<&ValueDescriptor, ConvertError> {
        self.descriptors
            .get(id.0 as usize)
            .ok_or(ConvertError::UnknownDescriptor(id.0))
    }
}

/// Read a JSON file holding either one execution record or an array of them.
pub fn load_executions(path: &Path) -> Result<Vec<RawExecution>, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_executions(&text)
}

pub fn parse_executions(text: &str) -> Result<Vec<RawExecution>, InputError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    if value.is_array() {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(vec![serde_json::from_value(value)?])
    }
}
