use super::*;
use crate::config::EquivalenceConfig;
use crate::convert::{EnvironmentModels, ExecutionResult};
use crate::equiv::{assert_execution, EquivalenceEngine, FieldSamples, Variable};

// ─── Fixtures ──────────────────────────────────────────────────────

fn int() -> ClassId {
    ClassId::Primitive(PrimitiveKind::Int)
}

fn double() -> ClassId {
    ClassId::Primitive(PrimitiveKind::Double)
}

fn point() -> ClassId {
    ClassId::object("com.acme.Point")
}

fn node() -> ClassId {
    ClassId::object("com.acme.Node")
}

fn px() -> FieldId {
    FieldId::new(point(), "x", int())
}

fn py() -> FieldId {
    FieldId::new(point(), "y", int())
}

fn next() -> FieldId {
    FieldId::new(node(), "next", node())
}

fn composite(
    arena: &mut ModelArena,
    class_id: ClassId,
    fields: Vec<(FieldId, ModelRef)>,
) -> ModelRef {
    let id = arena.fresh_id();
    let mut m = CompositeModel::new(id, class_id);
    m.fields = fields.into_iter().collect();
    arena.alloc(ValueModel::Composite(m))
}

fn point_model(arena: &mut ModelArena, x: i32, y: i32) -> ModelRef {
    let x = arena.alloc(ValueModel::int(x));
    let y = arena.alloc(ValueModel::int(y));
    composite(arena, point(), vec![(px(), x), (py(), y)])
}

/// Node whose `next` points back at itself.
fn self_loop(arena: &mut ModelArena) -> ModelRef {
    let root = composite(arena, node(), vec![]);
    if let ValueModel::Composite(m) = arena.get_mut(root) {
        m.fields.insert(next(), root);
    }
    root
}

fn assertions_for(
    arena: &ModelArena,
    types: &TypeTable,
    config: &EquivalenceConfig,
    expected: ModelRef,
) -> Vec<Statement> {
    let ty = arena.get(expected).class_id();
    let mut engine = EquivalenceEngine::new(arena, types, config);
    engine
        .assert_equality(expected, &Variable::new("actual", ty), "expected")
        .unwrap();
    engine.finish()
}

/// Emit assertions for `expected`, bind `actual` and run them.
fn verdict(
    expected_arena: &ModelArena,
    expected: ModelRef,
    actual_arena: &ModelArena,
    actual: ModelRef,
) -> CheckReport {
    let types = TypeTable::new();
    let block = assertions_for(expected_arena, &types, &EquivalenceConfig::default(), expected);
    let mut heap = Heap::new();
    let value = heap.materialize(actual_arena, actual).unwrap();
    let bindings = Bindings::from([("actual".to_string(), value)]);
    check(&block, &bindings, &mut heap, expected_arena, &types).unwrap()
}

// ─── Materialization ───────────────────────────────────────────────

#[test]
fn test_materialize_composite_and_primitives() {
    let mut arena = ModelArena::new();
    let root = point_model(&mut arena, 3, 9);
    let mut heap = Heap::new();
    let RtValue::Ref(h) = heap.materialize(&arena, root).unwrap() else {
        panic!("expected an object");
    };
    let object = heap.get(h).unwrap();
    assert_eq!(object.class_id(), &point());
    assert_eq!(object.field(&px()), Some(RtValue::Prim(PrimitiveValue::Int(3))));
    assert_eq!(object.field(&py()), Some(RtValue::Prim(PrimitiveValue::Int(9))));
}

#[test]
fn test_materialize_cycle_shares_identity() {
    let mut arena = ModelArena::new();
    let root = self_loop(&mut arena);
    let mut heap = Heap::new();
    let value = heap.materialize(&arena, root).unwrap();
    let RtValue::Ref(h) = value.clone() else {
        panic!("expected an object");
    };
    assert_eq!(heap.get(h).unwrap().field(&next()), Some(value));
    assert_eq!(heap.len(), 1);
}

#[test]
fn test_materialize_array_fill_and_stores() {
    let mut arena = ModelArena::new();
    let zero = arena.alloc(ValueModel::int(0));
    let seven = arena.alloc(ValueModel::int(7));
    let id = arena.fresh_id();
    let root = arena.alloc(ValueModel::Array(ArrayModel {
        id,
        class_id: ClassId::array_of(int()),
        length: 3,
        default_fill: zero,
        stores: [(1, seven)].into_iter().collect(),
    }));
    let mut heap = Heap::new();
    let RtValue::Ref(h) = heap.materialize(&arena, root).unwrap() else {
        panic!("expected an array");
    };
    let Some(HeapObject::Array { elements, .. }) = heap.get(h) else {
        panic!("expected an array");
    };
    let ints: Vec<_> = elements
        .iter()
        .map(|v| v.as_prim().and_then(PrimitiveValue::as_i64))
        .collect();
    assert_eq!(ints, vec![Some(0), Some(7), Some(0)]);
}

#[test]
fn test_materialize_field_set_assemble() {
    let mut arena = ModelArena::new();
    let x = arena.alloc(ValueModel::int(5));
    let id = arena.fresh_id();
    let me = ModelRef(arena.len() as u32);
    let mut m = AssembleModel::new(
        id,
        point(),
        CallModel {
            instance: None,
            executable: ExecutableId::util(UtilMethod::CreateInstance),
            params: vec![],
        },
    );
    m.modifications.push(StatementModel::SetField {
        instance: me,
        field: px(),
        value: x,
    });
    let root = arena.alloc(ValueModel::Assemble(m));
    assert_eq!(root, me);

    let mut heap = Heap::new();
    let RtValue::Ref(h) = heap.materialize(&arena, root).unwrap() else {
        panic!("expected an object");
    };
    let object = heap.get(h).unwrap();
    assert_eq!(object.field(&px()), Some(RtValue::Prim(PrimitiveValue::Int(5))));
    // Never written: default value.
    assert_eq!(object.field(&py()), Some(RtValue::Prim(PrimitiveValue::Int(0))));
}

#[test]
fn test_behavioral_assemble_not_materializable() {
    let mut arena = ModelArena::new();
    let id = arena.fresh_id();
    let three = arena.alloc(ValueModel::int(3));
    let root = arena.alloc(ValueModel::Assemble(AssembleModel::new(
        id,
        point(),
        CallModel {
            instance: None,
            executable: ExecutableId::constructor(point(), vec![int()]),
            params: vec![three],
        },
    )));
    let err = Heap::new().materialize(&arena, root).unwrap_err();
    assert!(matches!(err, EvalError::NotMaterializable(..)), "{}", err);
}

#[test]
fn test_oversized_array_not_materializable() {
    let mut arena = ModelArena::new();
    let fill = arena.alloc(ValueModel::int(0));
    let id = arena.fresh_id();
    let array = arena.alloc(ValueModel::Array(ArrayModel {
        id,
        class_id: ClassId::array_of(int()),
        length: usize::MAX / 2,
        default_fill: fill,
        stores: Default::default(),
    }));
    let err = Heap::new().materialize(&arena, array).unwrap_err();
    assert!(matches!(err, EvalError::NotMaterializable(..)), "{:?}", err);
}

#[test]
fn test_void_not_materializable() {
    let mut arena = ModelArena::new();
    let void = arena.alloc(ValueModel::Void);
    let err = Heap::new().materialize(&arena, void).unwrap_err();
    assert!(matches!(err, EvalError::Invariant(_)));
}

// ─── Checking ──────────────────────────────────────────────────────

#[test]
fn test_point_equivalent() {
    let mut expected = ModelArena::new();
    let e = point_model(&mut expected, 3, 9);
    let mut actual = ModelArena::new();
    let a = point_model(&mut actual, 3, 9);
    let report = verdict(&expected, e, &actual, a);
    assert!(report.is_equivalent(), "{}", report.format_report());
    assert_eq!(report.assertions, 2);
}

#[test]
fn test_point_not_equivalent() {
    let mut expected = ModelArena::new();
    let e = point_model(&mut expected, 3, 9);
    let mut actual = ModelArena::new();
    let a = point_model(&mut actual, 3, 4);
    let report = verdict(&expected, e, &actual, a);
    assert_eq!(report.verdict, EquivalenceVerdict::NotEquivalent);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].contains("expected 9 but was 4"), "{:?}", report.failures);
    assert!(report.format_report().contains("Verdict: NOT EQUIVALENT"));
}

/// Four `next` hops down to a node carrying `flag`; the flag sits right
/// at the default depth bound.
fn flagged_chain(arena: &mut ModelArena, value: bool) -> ModelRef {
    let flag = FieldId::new(node(), "flag", ClassId::Primitive(PrimitiveKind::Bool));
    let leaf = arena.alloc(ValueModel::boolean(value));
    let mut tail = composite(arena, node(), vec![(flag, leaf)]);
    for _ in 0..4 {
        tail = composite(arena, node(), vec![(next(), tail)]);
    }
    tail
}

#[test]
fn test_boolean_mismatch_at_depth_bound() {
    let mut expected = ModelArena::new();
    let e = flagged_chain(&mut expected, true);
    let mut actual = ModelArena::new();
    let a = flagged_chain(&mut actual, false);
    let report = verdict(&expected, e, &actual, a);
    assert!(!report.is_equivalent(), "{}", report.format_report());
    assert_eq!(report.failures.len(), 1);
    assert!(
        report.failures[0].contains("expected true but was false"),
        "{:?}",
        report.failures
    );

    let mut same = ModelArena::new();
    let s = flagged_chain(&mut same, true);
    assert!(verdict(&expected, e, &same, s).is_equivalent());
}

#[test]
fn test_float_tolerance() {
    let mut expected = ModelArena::new();
    let e = expected.alloc(ValueModel::double(0.3));
    let mut actual = ModelArena::new();
    let close = actual.alloc(ValueModel::double(0.1 + 0.2));
    let far = actual.alloc(ValueModel::double(0.3001));
    assert!(verdict(&expected, e, &actual, close).is_equivalent());
    assert!(!verdict(&expected, e, &actual, far).is_equivalent());

    let mut expected = ModelArena::new();
    let one = expected.alloc(ValueModel::double(1.0));
    let mut actual = ModelArena::new();
    let off = actual.alloc(ValueModel::double(1.0001));
    assert!(!verdict(&expected, one, &actual, off).is_equivalent());
}

#[test]
fn test_nan_equals_nan() {
    let mut expected = ModelArena::new();
    let e = expected.alloc(ValueModel::double(f64::NAN));
    let mut actual = ModelArena::new();
    let a = actual.alloc(ValueModel::double(f64::NAN));
    assert!(verdict(&expected, e, &actual, a).is_equivalent());
}

#[test]
fn test_cyclic_values_equivalent() {
    let mut expected = ModelArena::new();
    let e = self_loop(&mut expected);
    let mut actual = ModelArena::new();
    let a = self_loop(&mut actual);
    let report = verdict(&expected, e, &actual, a);
    assert!(report.is_equivalent(), "{}", report.format_report());
}

#[test]
fn test_null_dereference_aborts_block() {
    let mut expected = ModelArena::new();
    let e = point_model(&mut expected, 3, 9);
    let mut actual = ModelArena::new();
    let a = actual.alloc(ValueModel::null(point()));
    let report = verdict(&expected, e, &actual, a);
    assert_eq!(report.assertions, 0);
    assert_eq!(report.failures, vec!["`actual` is null".to_string()]);
}

#[test]
fn test_double_matrix_rows() {
    let row_type = ClassId::array_of(double());
    let matrix = |arena: &mut ModelArena, second_row: Option<f64>| {
        let null_row = arena.alloc(ValueModel::null(row_type.clone()));
        let mut stores = std::collections::BTreeMap::new();
        if let Some(v) = second_row {
            let value = arena.alloc(ValueModel::double(v));
            let id = arena.fresh_id();
            let row = arena.alloc(ValueModel::Array(ArrayModel {
                id,
                class_id: row_type.clone(),
                length: 1,
                default_fill: value,
                stores: Default::default(),
            }));
            stores.insert(1, row);
        }
        let id = arena.fresh_id();
        arena.alloc(ValueModel::Array(ArrayModel {
            id,
            class_id: ClassId::array_of(row_type.clone()),
            length: 2,
            default_fill: null_row,
            stores,
        }))
    };
    let mut expected = ModelArena::new();
    let e = matrix(&mut expected, Some(2.5));
    let mut actual = ModelArena::new();
    let same = matrix(&mut actual, Some(2.5 + 1e-9));
    let missing = matrix(&mut actual, None);
    let differs = matrix(&mut actual, Some(3.0));

    assert!(verdict(&expected, e, &actual, same).is_equivalent());
    let report = verdict(&expected, e, &actual, missing);
    assert_eq!(report.failures, vec!["`actualNestedElement` is null".to_string()]);
    let report = verdict(&expected, e, &actual, differs);
    assert!(report.failures[0].contains("arrays first differ at index 0"), "{:?}", report.failures);
}

#[test]
fn test_equals_identity_unless_reliable() {
    let mut arena = ModelArena::new();
    let a = point_model(&mut arena, 1, 2);
    let b = point_model(&mut arena, 1, 2);
    let mut heap = Heap::new();
    let bindings = Bindings::from([
        ("left".to_string(), heap.materialize(&arena, a).unwrap()),
        ("right".to_string(), heap.materialize(&arena, b).unwrap()),
    ]);
    let block = vec![Statement::Assert(Assertion::Equals {
        expected: Expr::Var("left".to_string()),
        actual: Expr::Var("right".to_string()),
    })];

    let plain = TypeTable::new();
    let report = check(&block, &bindings, &mut heap, &arena, &plain).unwrap();
    assert!(!report.is_equivalent());

    let reliable = TypeTable::new().with_reliable_equals(&point());
    let report = check(&block, &bindings, &mut heap, &arena, &reliable).unwrap();
    assert!(report.is_equivalent());
}

#[test]
fn test_mock_compared_by_identity() {
    let mut arena = ModelArena::new();
    let id = arena.fresh_id();
    let mock = arena.alloc(ValueModel::Composite(CompositeModel::mock(id, point())));
    let mut heap = Heap::new();
    let installed = heap.materialize(&arena, mock).unwrap();
    let lookalike = heap.materialize(&arena, mock).unwrap();
    assert_ne!(installed, lookalike);

    let same = |expected: &str| {
        vec![Statement::Assert(Assertion::Same {
            expected: Expr::Var(expected.to_string()),
            actual: Expr::Var("actual".to_string()),
        })]
    };
    let bindings = Bindings::from([
        ("actual".to_string(), installed.clone()),
        ("installed".to_string(), installed),
        ("lookalike".to_string(), lookalike),
    ]);
    let types = TypeTable::new();
    assert!(check(&same("installed"), &bindings, &mut heap, &arena, &types)
        .unwrap()
        .is_equivalent());
    assert!(!check(&same("lookalike"), &bindings, &mut heap, &arena, &types)
        .unwrap()
        .is_equivalent());
}

#[test]
fn test_unbound_variable_is_error() {
    let arena = ModelArena::new();
    let block = vec![Statement::Assert(Assertion::Null(Expr::Var("ghost".to_string())))];
    let err = check(&block, &Bindings::new(), &mut Heap::new(), &arena, &TypeTable::new())
        .unwrap_err();
    assert_eq!(err, EvalError::UnboundVariable("ghost".to_string()));
}

#[test]
fn test_parameterized_branch_follows_live_value() {
    let mut first = ModelArena::new();
    let null = first.alloc(ValueModel::null(node()));
    let first_root = composite(&mut first, node(), vec![(next(), null)]);
    let mut second = ModelArena::new();
    let null = second.alloc(ValueModel::null(node()));
    let inner = composite(&mut second, node(), vec![(next(), null)]);
    let second_root = composite(&mut second, node(), vec![(next(), inner)]);

    let config = EquivalenceConfig::parameterized();
    let types = TypeTable::new();
    let samples = FieldSamples::collect(
        [(&first, first_root), (&second, second_root)],
        config.max_depth,
    );
    let mut engine = EquivalenceEngine::new(&first, &types, &config).with_samples(&samples);
    engine
        .assert_equality(first_root, &Variable::new("actual", node()), "expected")
        .unwrap();
    let block = engine.finish();

    let run = |arena: &ModelArena, root| {
        let mut heap = Heap::new();
        let value = heap.materialize(arena, root).unwrap();
        let bindings = Bindings::from([("actual".to_string(), value)]);
        check(&block, &bindings, &mut heap, &first, &types).unwrap()
    };
    assert!(run(&first, first_root).is_equivalent());
    assert!(!run(&second, second_root).is_equivalent());
}

// ─── Executions ────────────────────────────────────────────────────

#[test]
fn test_execution_checks_against_itself() {
    let mut arena = ModelArena::new();
    let after = point_model(&mut arena, 3, 9);
    let five = arena.alloc(ValueModel::int(5));
    let execution = Execution {
        method: ExecutableId::method(point(), "norm", vec![], int()),
        arena,
        state_before: EnvironmentModels::default(),
        state_after: Some(EnvironmentModels {
            this: Some(after),
            ..EnvironmentModels::default()
        }),
        result: ExecutionResult::Success { model: five },
        instrumentation: vec![],
        source: "concrete_success".to_string(),
    };
    let types = TypeTable::new();
    let actual = ActualVariables::conventional(&execution);
    let block =
        assert_execution(&execution, &actual, &types, &EquivalenceConfig::default(), None)
            .unwrap();

    let mut heap = Heap::new();
    let bindings = bind_actuals(&mut heap, &execution, &actual).unwrap();
    assert_eq!(bindings.len(), 2);
    let report = check(&block, &bindings, &mut heap, &execution.arena, &types).unwrap();
    assert!(report.is_equivalent(), "{}", report.format_report());
    assert_eq!(report.assertions, 3);
}

#[test]
fn test_primitives_equal_across_widths() {
    assert!(primitives_equal(&PrimitiveValue::Int(3), &PrimitiveValue::Long(3)));
    assert!(primitives_equal(&PrimitiveValue::Float(0.5), &PrimitiveValue::Double(0.5)));
    assert!(!primitives_equal(&PrimitiveValue::Int(1), &PrimitiveValue::Bool(true)));
    assert!(!primitives_equal(
        &PrimitiveValue::String("1".to_string()),
        &PrimitiveValue::Int(1)
    ));
}
