//! Value models: the portable snapshot of a runtime value.
//!
//! A value observed (or solved for) during an execution is captured as a
//! graph of `ValueModel` nodes living in a per-execution `ModelArena`.
//! Nodes refer to each other through `ModelRef` handles, so reference
//! cycles in the observed heap become cycles of handles rather than
//! infinitely nested data.
//!
//! Two notions of identity coexist:
//! - `ModelRef` is the identity of one model *instance* in the arena.
//! - `ObjectId` is the identity of the *logical object* a reference model
//!   describes. The INITIAL and FINAL snapshots of one object are two
//!   instances sharing a single `ObjectId`.

mod arena;
mod display;
mod types;

pub use arena::*;
pub use display::*;
pub use types::*;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─── Type Identifiers ──────────────────────────────────────────────

/// Built-in value kinds that a `Primitive` model can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Bool,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    String,
}

impl PrimitiveKind {
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::String => "string",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" | "bool" => PrimitiveKind::Bool,
            "byte" => PrimitiveKind::Byte,
            "short" => PrimitiveKind::Short,
            "char" => PrimitiveKind::Char,
            "int" => PrimitiveKind::Int,
            "long" => PrimitiveKind::Long,
            "float" => PrimitiveKind::Float,
            "double" => PrimitiveKind::Double,
            "string" => PrimitiveKind::String,
            _ => return None,
        })
    }

    /// 32- or 64-bit floating point.
    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveKind::Float | PrimitiveKind::Double)
    }

    /// The zero value a freshly allocated array slot of this kind holds.
    /// Strings have none: a new string slot is null.
    pub fn zero(self) -> Option<PrimitiveValue> {
        Some(match self {
            PrimitiveKind::Bool => PrimitiveValue::Bool(false),
            PrimitiveKind::Byte => PrimitiveValue::Byte(0),
            PrimitiveKind::Short => PrimitiveValue::Short(0),
            PrimitiveKind::Char => PrimitiveValue::Char('\0'),
            PrimitiveKind::Int => PrimitiveValue::Int(0),
            PrimitiveKind::Long => PrimitiveValue::Long(0),
            PrimitiveKind::Float => PrimitiveValue::Float(0.0),
            PrimitiveKind::Double => PrimitiveValue::Double(0.0),
            PrimitiveKind::String => return None,
        })
    }
}

/// A type as the program under test sees it.
///
/// Textual form: primitive names (`int`, `double`, `string`, ...), `void`,
/// `T[]` for arrays, anything else is a named object type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ClassId {
    Primitive(PrimitiveKind),
    Array(Box<ClassId>),
    Object(String),
    Void,
}

impl ClassId {
    pub fn object(name: impl Into<String>) -> Self {
        ClassId::Object(name.into())
    }

    pub fn array_of(element: ClassId) -> Self {
        ClassId::Array(Box::new(element))
    }

    pub fn string() -> Self {
        ClassId::Primitive(PrimitiveKind::String)
    }

    /// The type of class-literal values.
    pub fn class_literal() -> Self {
        ClassId::object("Class")
    }

    /// Declaring type of the synthetic message field of exception models.
    pub fn throwable() -> Self {
        ClassId::object("Throwable")
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ClassId::Array(_))
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            ClassId::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Value types: every primitive kind except string.
    pub fn is_primitive(&self) -> bool {
        matches!(self, ClassId::Primitive(kind) if *kind != PrimitiveKind::String)
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, ClassId::Primitive(kind) if kind.is_floating())
    }

    pub fn element(&self) -> Option<&ClassId> {
        match self {
            ClassId::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Number of array dimensions (0 for non-arrays).
    pub fn dimensions(&self) -> usize {
        let mut dims = 0;
        let mut cur = self;
        while let ClassId::Array(elem) = cur {
            dims += 1;
            cur = elem;
        }
        dims
    }

    /// The element type once every array dimension is peeled off.
    pub fn innermost_element(&self) -> &ClassId {
        let mut cur = self;
        while let ClassId::Array(elem) = cur {
            cur = elem;
        }
        cur
    }

    /// Last segment of a dotted object name.
    pub fn simple_name(&self) -> String {
        match self {
            ClassId::Object(name) => name.rsplit('.').next().unwrap_or(name).to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassId::Primitive(kind) => write!(f, "{}", kind.name()),
            ClassId::Array(elem) => write!(f, "{}[]", elem),
            ClassId::Object(name) => write!(f, "{}", name),
            ClassId::Void => write!(f, "void"),
        }
    }
}

impl FromStr for ClassId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty type name".to_string());
        }
        if let Some(elem) = s.strip_suffix("[]") {
            return Ok(ClassId::array_of(elem.parse()?));
        }
        if s == "void" {
            return Ok(ClassId::Void);
        }
        if let Some(kind) = PrimitiveKind::from_name(s) {
            return Ok(ClassId::Primitive(kind));
        }
        if s.contains(['[', ']', ' ']) {
            return Err(format!("malformed type name '{}'", s));
        }
        Ok(ClassId::Object(s.to_string()))
    }
}

impl TryFrom<String> for ClassId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ClassId> for String {
    fn from(id: ClassId) -> Self {
        id.to_string()
    }
}

// ─── Members ───────────────────────────────────────────────────────

/// A field of some declaring type.
///
/// Identity is `(declaring_class, name)`: the declared type and the
/// static flag are carried along but never distinguish two fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldId {
    pub declaring_class: ClassId,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ClassId,
    #[serde(default)]
    pub is_static: bool,
}

impl FieldId {
    pub fn new(declaring_class: ClassId, name: impl Into<String>, ty: ClassId) -> Self {
        Self {
            declaring_class,
            name: name.into(),
            ty,
            is_static: false,
        }
    }

    pub fn new_static(declaring_class: ClassId, name: impl Into<String>, ty: ClassId) -> Self {
        Self {
            is_static: true,
            ..Self::new(declaring_class, name, ty)
        }
    }

    /// Synthetic field of an inner-class instance pointing at its
    /// enclosing instance (`this$0`, `this$1`, ...).
    pub fn is_enclosing_instance_reference(&self) -> bool {
        self.name
            .strip_prefix("this$")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    }

    /// The synthetic message field exception models carry.
    pub fn exception_message() -> Self {
        Self::new(ClassId::throwable(), "detailMessage", ClassId::string())
    }
}

impl PartialEq for FieldId {
    fn eq(&self, other: &Self) -> bool {
        self.declaring_class == other.declaring_class && self.name == other.name
    }
}

impl Eq for FieldId {}

impl Hash for FieldId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.declaring_class.hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for FieldId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldId {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.declaring_class, &self.name).cmp(&(&other.declaring_class, &other.name))
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_class.simple_name(), self.name)
    }
}

/// Reflective helpers that generated tests call through a utility class
/// when direct access is not legal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilMethod {
    /// Allocate an instance without running any constructor.
    CreateInstance,
    GetFieldValue,
    GetStaticFieldValue,
}

impl UtilMethod {
    pub fn name(self) -> &'static str {
        match self {
            UtilMethod::CreateInstance => "createInstance",
            UtilMethod::GetFieldValue => "getFieldValue",
            UtilMethod::GetStaticFieldValue => "getStaticFieldValue",
        }
    }
}

/// Something callable: a constructor, a method, or a reflective helper.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutableId {
    Constructor {
        class_id: ClassId,
        #[serde(default)]
        params: Vec<ClassId>,
    },
    Method {
        class_id: ClassId,
        name: String,
        #[serde(default)]
        params: Vec<ClassId>,
        return_type: ClassId,
        #[serde(default)]
        is_static: bool,
    },
    Util {
        method: UtilMethod,
    },
}

impl ExecutableId {
    pub fn constructor(class_id: ClassId, params: Vec<ClassId>) -> Self {
        ExecutableId::Constructor { class_id, params }
    }

    pub fn method(
        class_id: ClassId,
        name: impl Into<String>,
        params: Vec<ClassId>,
        return_type: ClassId,
    ) -> Self {
        ExecutableId::Method {
            class_id,
            name: name.into(),
            params,
            return_type,
            is_static: false,
        }
    }

    pub fn util(method: UtilMethod) -> Self {
        ExecutableId::Util { method }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, ExecutableId::Constructor { .. })
    }

    pub fn is_static(&self) -> bool {
        match self {
            ExecutableId::Method { is_static, .. } => *is_static,
            ExecutableId::Constructor { .. } => false,
            ExecutableId::Util { .. } => true,
        }
    }

    pub fn is_util(&self, util: UtilMethod) -> bool {
        matches!(self, ExecutableId::Util { method } if *method == util)
    }

    /// Declaring type; reflective helpers have none.
    pub fn class_id(&self) -> Option<&ClassId> {
        match self {
            ExecutableId::Constructor { class_id, .. } | ExecutableId::Method { class_id, .. } => {
                Some(class_id)
            }
            ExecutableId::Util { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ExecutableId::Constructor { .. } => "<init>",
            ExecutableId::Method { name, .. } => name,
            ExecutableId::Util { method } => method.name(),
        }
    }

    /// Type of the value a call produces.
    pub fn return_type(&self) -> ClassId {
        match self {
            ExecutableId::Constructor { class_id, .. } => class_id.clone(),
            ExecutableId::Method { return_type, .. } => return_type.clone(),
            ExecutableId::Util { .. } => ClassId::object("Object"),
        }
    }
}

impl fmt::Display for ExecutableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutableId::Constructor { class_id, params } => {
                write!(f, "{}(", class_id.simple_name())?;
                write_params(f, params)?;
                write!(f, ")")
            }
            ExecutableId::Method {
                class_id,
                name,
                params,
                ..
            } => {
                write!(f, "{}.{}(", class_id.simple_name(), name)?;
                write_params(f, params)?;
                write!(f, ")")
            }
            ExecutableId::Util { method } => write!(f, "Utils.{}", method.name()),
        }
    }
}

fn write_params(f: &mut fmt::Formatter<'_>, params: &[ClassId]) -> fmt::Result {
    for (i, p) in params.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", p)?;
    }
    Ok(())
}

// ─── Primitive Values ──────────────────────────────────────────────

/// A concrete primitive or string value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PrimitiveValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl PrimitiveValue {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveValue::Bool(_) => PrimitiveKind::Bool,
            PrimitiveValue::Byte(_) => PrimitiveKind::Byte,
            PrimitiveValue::Short(_) => PrimitiveKind::Short,
            PrimitiveValue::Char(_) => PrimitiveKind::Char,
            PrimitiveValue::Int(_) => PrimitiveKind::Int,
            PrimitiveValue::Long(_) => PrimitiveKind::Long,
            PrimitiveValue::Float(_) => PrimitiveKind::Float,
            PrimitiveValue::Double(_) => PrimitiveKind::Double,
            PrimitiveValue::String(_) => PrimitiveKind::String,
        }
    }

    pub fn class_id(&self) -> ClassId {
        ClassId::Primitive(self.kind())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrimitiveValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral view used for array indices and sizes.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Byte(v) => Some(*v as i64),
            PrimitiveValue::Short(v) => Some(*v as i64),
            PrimitiveValue::Int(v) => Some(*v as i64),
            PrimitiveValue::Long(v) => Some(*v),
            PrimitiveValue::Char(c) => Some(*c as i64),
            _ => None,
        }
    }

    /// Numeric view used by tolerance comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PrimitiveValue::Float(v) => Some(*v as f64),
            PrimitiveValue::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Hashable identity of the value; floats compare by bit pattern.
    pub fn key(&self) -> PrimitiveKey {
        match self {
            PrimitiveValue::Bool(v) => PrimitiveKey::Bits(PrimitiveKind::Bool, *v as u64),
            PrimitiveValue::Byte(v) => PrimitiveKey::Bits(PrimitiveKind::Byte, *v as u8 as u64),
            PrimitiveValue::Short(v) => PrimitiveKey::Bits(PrimitiveKind::Short, *v as u16 as u64),
            PrimitiveValue::Char(v) => PrimitiveKey::Bits(PrimitiveKind::Char, *v as u64),
            PrimitiveValue::Int(v) => PrimitiveKey::Bits(PrimitiveKind::Int, *v as u32 as u64),
            PrimitiveValue::Long(v) => PrimitiveKey::Bits(PrimitiveKind::Long, *v as u64),
            PrimitiveValue::Float(v) => {
                PrimitiveKey::Bits(PrimitiveKind::Float, v.to_bits() as u64)
            }
            PrimitiveValue::Double(v) => PrimitiveKey::Bits(PrimitiveKind::Double, v.to_bits()),
            PrimitiveValue::String(s) => PrimitiveKey::Str(s.clone()),
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Bool(v) => write!(f, "{}", v),
            PrimitiveValue::Byte(v) => write!(f, "{}", v),
            PrimitiveValue::Short(v) => write!(f, "{}", v),
            PrimitiveValue::Char(v) => write!(f, "'{}'", v.escape_default()),
            PrimitiveValue::Int(v) => write!(f, "{}", v),
            PrimitiveValue::Long(v) => write!(f, "{}L", v),
            PrimitiveValue::Float(v) => write!(f, "{:?}f", v),
            PrimitiveValue::Double(v) => write!(f, "{:?}", v),
            PrimitiveValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// See `PrimitiveValue::key`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKey {
    Bits(PrimitiveKind, u64),
    Str(String),
}

// ─── Identity ──────────────────────────────────────────────────────

/// Stable identity of a logical object across its snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which snapshot of the environment a model was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Before the method under test ran.
    Initial,
    /// After the method under test ran.
    Final,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Initial => write!(f, "initial"),
            Phase::Final => write!(f, "final"),
        }
    }
}

/// Memoization key produced by `ModelArena::wrap`.
///
/// Reference models compare by arena identity, primitives by value and
/// nulls by their declared type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelKey {
    Ref(ModelRef),
    Value(PrimitiveKey),
    Null(ClassId),
    Void,
}

/// Maps with structured keys travel as `[key, value]` pairs.
pub(crate) mod as_pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, K, V>(map: &BTreeMap<K, V>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        K: Serialize,
        V: Serialize,
    {
        s.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D, K, V>(d: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(d)?;
        Ok(pairs.into_iter().collect())
    }
}

// ─── Value Models ──────────────────────────────────────────────────

/// One node of the value-model graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ValueModel {
    Null {
        class_id: ClassId,
    },
    Primitive {
        value: PrimitiveValue,
    },
    ClassRef(ClassRefModel),
    EnumConstant(EnumConstantModel),
    Composite(CompositeModel),
    Array(ArrayModel),
    Assemble(AssembleModel),
    Lambda(LambdaModel),
    Custom(CustomModel),
    Void,
}

/// A class literal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassRefModel {
    pub id: ObjectId,
    pub referenced: ClassId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumConstantModel {
    pub id: ObjectId,
    pub class_id: ClassId,
    pub name: String,
}

/// Field-by-field snapshot of an object (or a mock of one).
///
/// Static fields never appear here; callers track them separately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositeModel {
    pub id: ObjectId,
    pub class_id: ClassId,
    pub is_mock: bool,
    #[serde(with = "as_pairs")]
    pub fields: BTreeMap<FieldId, ModelRef>,
    /// Values a mock answers with, per mocked method, in call order.
    #[serde(with = "as_pairs", default)]
    pub mocks: BTreeMap<ExecutableId, Vec<ModelRef>>,
}

impl CompositeModel {
    pub fn new(id: ObjectId, class_id: ClassId) -> Self {
        Self {
            id,
            class_id,
            is_mock: false,
            fields: BTreeMap::new(),
            mocks: BTreeMap::new(),
        }
    }

    pub fn mock(id: ObjectId, class_id: ClassId) -> Self {
        Self {
            is_mock: true,
            ..Self::new(id, class_id)
        }
    }
}

/// Longest array a model may describe: lengths are JVM `int`s.
pub const MAX_ARRAY_LENGTH: usize = i32::MAX as usize;

/// Sparse array: every index without a store holds `default_fill`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayModel {
    pub id: ObjectId,
    pub class_id: ClassId,
    pub length: usize,
    pub default_fill: ModelRef,
    pub stores: BTreeMap<usize, ModelRef>,
}

impl ArrayModel {
    /// Model at `index`, resolving the default fill.
    pub fn element(&self, index: usize) -> Option<ModelRef> {
        if index >= self.length {
            return None;
        }
        Some(self.stores.get(&index).copied().unwrap_or(self.default_fill))
    }
}

/// A call in an instantiation or modification chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallModel {
    /// Receiver; `None` for constructors, static methods and helpers.
    pub instance: Option<ModelRef>,
    pub executable: ExecutableId,
    pub params: Vec<ModelRef>,
}

/// One step of an assemble model's modification chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StatementModel {
    Call(CallModel),
    SetField {
        instance: ModelRef,
        field: FieldId,
        value: ModelRef,
    },
}

impl StatementModel {
    pub fn is_field_set(&self) -> bool {
        matches!(self, StatementModel::SetField { .. })
    }
}

/// An object defined operationally: instantiate, then apply the chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssembleModel {
    pub id: ObjectId,
    pub class_id: ClassId,
    pub instantiation: CallModel,
    /// Order-significant; only ever appended to.
    pub modifications: Vec<StatementModel>,
    /// Field snapshot of the same object, when one was observed.
    pub origin: Option<ModelRef>,
}

impl AssembleModel {
    pub fn new(id: ObjectId, class_id: ClassId, instantiation: CallModel) -> Self {
        Self {
            id,
            class_id,
            instantiation,
            modifications: Vec::new(),
            origin: None,
        }
    }
}

/// A functional value. Lambdas are never compared structurally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LambdaModel {
    pub id: ObjectId,
    pub class_id: ClassId,
    pub method_name: String,
    pub captured: Vec<ModelRef>,
}

/// What a custom model stands for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustomKind {
    /// Placeholder for an object not yet registered when it was
    /// referenced; resolved by the cyclic-reference pass.
    CyclicReference { ref_id: u32, phase: Phase },
    /// A domain-specific object (framework context, bean, ...).
    Named { name: String },
}

/// A model with specialized meaning and an optional structural fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    pub id: Option<ObjectId>,
    pub class_id: ClassId,
    pub kind: CustomKind,
    pub origin: Option<ModelRef>,
}

impl ValueModel {
    pub fn null(class_id: ClassId) -> Self {
        ValueModel::Null { class_id }
    }

    pub fn primitive(value: PrimitiveValue) -> Self {
        ValueModel::Primitive { value }
    }

    pub fn int(v: i32) -> Self {
        Self::primitive(PrimitiveValue::Int(v))
    }

    pub fn double(v: f64) -> Self {
        Self::primitive(PrimitiveValue::Double(v))
    }

    pub fn boolean(v: bool) -> Self {
        Self::primitive(PrimitiveValue::Bool(v))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::primitive(PrimitiveValue::String(s.into()))
    }

    /// Stable object identity; `None` for value-like variants.
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            ValueModel::ClassRef(m) => Some(m.id),
            ValueModel::EnumConstant(m) => Some(m.id),
            ValueModel::Composite(m) => Some(m.id),
            ValueModel::Array(m) => Some(m.id),
            ValueModel::Assemble(m) => Some(m.id),
            ValueModel::Lambda(m) => Some(m.id),
            ValueModel::Custom(m) => m.id,
            ValueModel::Null { .. } | ValueModel::Primitive { .. } | ValueModel::Void => None,
        }
    }

    pub fn class_id(&self) -> ClassId {
        match self {
            ValueModel::Null { class_id } => class_id.clone(),
            ValueModel::Primitive { value } => value.class_id(),
            ValueModel::ClassRef(_) => ClassId::class_literal(),
            ValueModel::EnumConstant(m) => m.class_id.clone(),
            ValueModel::Composite(m) => m.class_id.clone(),
            ValueModel::Array(m) => m.class_id.clone(),
            ValueModel::Assemble(m) => m.class_id.clone(),
            ValueModel::Lambda(m) => m.class_id.clone(),
            ValueModel::Custom(m) => m.class_id.clone(),
            ValueModel::Void => ClassId::Void,
        }
    }

    /// `Composite`, `Array` and `Assemble`: the variants with mutable state.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            ValueModel::Composite(_) | ValueModel::Array(_) | ValueModel::Assemble(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ValueModel::Null { .. })
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            ValueModel::Null { .. } => "null",
            ValueModel::Primitive { .. } => "primitive",
            ValueModel::ClassRef(_) => "class-ref",
            ValueModel::EnumConstant(_) => "enum-constant",
            ValueModel::Composite(_) => "composite",
            ValueModel::Array(_) => "array",
            ValueModel::Assemble(_) => "assemble",
            ValueModel::Lambda(_) => "lambda",
            ValueModel::Custom(_) => "custom",
            ValueModel::Void => "void",
        }
    }
}
