use super::*;
use crate::config::{DemotionPolicy, PassConfig};
use crate::error::ConvertError;
use crate::model::*;
use crate::trace::*;

// ─── Fixtures ──────────────────────────────────────────────────────

fn int() -> ClassId {
    ClassId::Primitive(PrimitiveKind::Int)
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

fn norm() -> ExecutableId {
    ExecutableId::method(point(), "norm", vec![], int())
}

fn int_const(v: i32) -> Expr {
    Expr::Const {
        value: PrimitiveValue::Int(v),
    }
}

fn constant(v: i32) -> ValueDescriptor {
    ValueDescriptor::Constant {
        value: PrimitiveValue::Int(v),
    }
}

fn bind<T>(field: FieldId, value: T) -> FieldBinding<T> {
    FieldBinding { field, value }
}

fn d(i: u32) -> DescriptorId {
    DescriptorId(i)
}

fn e(i: u32) -> ExprId {
    ExprId(i)
}

/// `p = allocate Point; p.x = 3; p.y = 4; p.norm()`
fn point_trace() -> Trace {
    Trace {
        exprs: vec![
            Expr::AllocateMemory { class_id: point() },
            int_const(3),
            int_const(4),
            Expr::MethodCall {
                method: norm(),
                instance: e(0),
                args: vec![],
            },
        ],
        init: vec![
            Inst::SetField {
                instance: e(0),
                field: px(),
                value: e(1),
            },
            Inst::SetField {
                instance: e(0),
                field: py(),
                value: e(2),
            },
        ],
        call: e(3),
    }
}

/// Point(3, 4) before the call, Point(3, 9) after, returning 5.
fn point_execution() -> RawExecution {
    RawExecution {
        method: norm(),
        trace: point_trace(),
        descriptors: vec![
            ValueDescriptor::Object {
                ref_id: 1,
                class_id: point(),
                fields: vec![bind(px(), d(1)), bind(py(), d(2))],
                origin: Some(e(0)),
            },
            constant(3),
            constant(4),
            ValueDescriptor::Object {
                ref_id: 1,
                class_id: point(),
                fields: vec![bind(px(), d(4)), bind(py(), d(5))],
                origin: Some(e(0)),
            },
            constant(3),
            constant(9),
            constant(5),
        ],
        candidates: vec![ResultCandidate::ConcreteSuccess {
            initial: ExecutionState {
                instance: Some(d(0)),
                ..Default::default()
            },
            final_state: ExecutionState {
                instance: Some(d(3)),
                ..Default::default()
            },
            result: Some(d(6)),
        }],
    }
}

/// A static no-arg method with an empty trace around the call.
fn static_execution(
    descriptors: Vec<ValueDescriptor>,
    candidates: Vec<ResultCandidate>,
) -> RawExecution {
    let method = ExecutableId::Method {
        class_id: node(),
        name: "make".to_string(),
        params: vec![],
        return_type: node(),
        is_static: true,
    };
    RawExecution {
        method: method.clone(),
        trace: Trace {
            exprs: vec![Expr::StaticMethodCall {
                method,
                args: vec![],
            }],
            init: vec![],
            call: e(0),
        },
        descriptors,
        candidates,
    }
}

fn success(result: DescriptorId) -> ResultCandidate {
    ResultCandidate::ConcreteSuccess {
        initial: ExecutionState::default(),
        final_state: ExecutionState::default(),
        result: Some(result),
    }
}

fn convert(raw: &RawExecution) -> Execution {
    convert_execution(raw, &PassConfig::default(), &TypeTable::new()).unwrap()
}

fn composite(arena: &ModelArena, r: ModelRef) -> &CompositeModel {
    match arena.get(r) {
        ValueModel::Composite(m) => m,
        other => panic!("expected a composite, got {:?}", other),
    }
}

fn int_of(arena: &ModelArena, r: ModelRef) -> i32 {
    match arena.get(r) {
        ValueModel::Primitive {
            value: PrimitiveValue::Int(v),
        } => *v,
        other => panic!("expected an int, got {:?}", other),
    }
}

// ─── Instruction Replay ────────────────────────────────────────────

#[test]
fn test_replay_builds_assemble_chain() {
    let trace = point_trace();
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&trace);
    insts.process_trace(&mut arena).unwrap();

    let p = insts.find_model(&mut arena, e(0)).unwrap();
    let ValueModel::Assemble(m) = arena.get(p) else {
        panic!("expected an assemble model");
    };
    assert!(m.instantiation.executable.is_util(UtilMethod::CreateInstance));
    // The call under test is not part of the receiver's setup.
    assert_eq!(m.modifications.len(), 2);
    assert!(m.modifications.iter().all(StatementModel::is_field_set));
}

#[test]
fn test_method_call_result_detaches_from_receiver() {
    let mut trace = point_trace();
    // q = p.norm() evaluated during setup, then p.norm() again as the call.
    trace.exprs.push(Expr::MethodCall {
        method: norm(),
        instance: e(0),
        args: vec![],
    });
    trace.init.push(Inst::Eval { expr: e(4) });
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&trace);
    insts.process_trace(&mut arena).unwrap();

    let p = insts.find_model(&mut arena, e(0)).unwrap();
    let chain_len = |arena: &ModelArena| match arena.get(p) {
        ValueModel::Assemble(m) => m.modifications.len(),
        _ => 0,
    };
    assert_eq!(chain_len(&arena), 3);
    insts.find_model(&mut arena, e(4)).unwrap();
    assert_eq!(chain_len(&arena), 2);
}

#[test]
fn test_replay_memoizes_expressions() {
    let trace = point_trace();
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&trace);
    let a = insts.process_expr(&mut arena, e(0)).unwrap();
    let b = insts.process_expr(&mut arena, e(0)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_array_stores_and_bounds() {
    let array_type = ClassId::array_of(int());
    let trace = Trace {
        exprs: vec![
            int_const(3),
            Expr::CreateArray {
                class_id: array_type,
                size: e(0),
            },
            int_const(1),
            int_const(7),
        ],
        init: vec![Inst::ArraySet {
            array: e(1),
            index: e(2),
            value: e(3),
        }],
        call: e(1),
    };
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&trace);
    for inst in &trace.init {
        insts.process_inst(&mut arena, inst).unwrap();
    }
    let array = insts.process_expr(&mut arena, e(1)).unwrap();
    let ValueModel::Array(m) = arena.get(array) else {
        panic!("expected an array");
    };
    assert_eq!(m.length, 3);
    assert_eq!(int_of(&arena, m.default_fill), 0);
    assert_eq!(int_of(&arena, m.stores[&1]), 7);

    let out_of_bounds = Inst::ArraySet {
        array: e(1),
        index: e(0),
        value: e(3),
    };
    let err = insts.process_inst(&mut arena, &out_of_bounds).unwrap_err();
    assert!(matches!(err, ConvertError::MalformedTrace(_)));
}

#[test]
fn test_array_size_beyond_int_range_is_rejected() {
    let trace = Trace {
        exprs: vec![
            Expr::Const {
                value: PrimitiveValue::Long(i64::from(i32::MAX) + 1),
            },
            Expr::CreateArray {
                class_id: ClassId::array_of(int()),
                size: e(0),
            },
        ],
        init: vec![],
        call: e(1),
    };
    let mut arena = ModelArena::new();
    let err = InstConverter::new(&trace)
        .process_expr(&mut arena, e(1))
        .unwrap_err();
    assert!(matches!(err, ConvertError::MalformedTrace(_)), "{:?}", err);
}

#[test]
fn test_unsupported_expression() {
    let trace = Trace {
        exprs: vec![
            int_const(1),
            Expr::Arithmetic {
                operator: "+".to_string(),
                lhs: e(0),
                rhs: e(0),
            },
        ],
        init: vec![],
        call: e(1),
    };
    let mut arena = ModelArena::new();
    let err = InstConverter::new(&trace)
        .process_trace(&mut arena)
        .unwrap_err();
    assert_eq!(
        err,
        ConvertError::UnsupportedDescriptor("arithmetic expression".to_string())
    );
}

#[test]
fn test_self_dependent_expression_is_rejected() {
    let trace = Trace {
        exprs: vec![Expr::GetField {
            instance: e(0),
            field: next(),
        }],
        init: vec![],
        call: e(0),
    };
    let mut arena = ModelArena::new();
    let err = InstConverter::new(&trace)
        .process_trace(&mut arena)
        .unwrap_err();
    assert!(matches!(err, ConvertError::MalformedTrace(_)));
}

#[test]
fn test_global_mock_becomes_instrumentation() {
    let clock = ClassId::object("java.time.Clock");
    let now = ExecutableId::Method {
        class_id: clock.clone(),
        name: "now".to_string(),
        params: vec![],
        return_type: int(),
        is_static: true,
    };
    let ctor = ExecutableId::constructor(clock.clone(), vec![]);
    let trace = Trace {
        exprs: vec![
            int_const(42),
            Expr::Null {
                class_id: clock.clone(),
            },
            Expr::GlobalMock {
                class_id: clock.clone(),
                methods: vec![
                    MockedMethod {
                        method: ctor,
                        values: vec![e(1)],
                    },
                    MockedMethod {
                        method: now.clone(),
                        values: vec![e(0), e(0)],
                    },
                ],
            },
        ],
        init: vec![Inst::Eval { expr: e(2) }],
        call: e(2),
    };
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&trace);
    insts.process_trace(&mut arena).unwrap();

    let mock = insts.find_model(&mut arena, e(2)).unwrap();
    assert!(matches!(arena.get(mock), ValueModel::ClassRef(c) if c.referenced == clock));
    match insts.instrumentation() {
        [
            Instrumentation::StaticMethod { method, values },
            Instrumentation::NewInstance { class_id, instances },
        ] => {
            assert_eq!(*method, now);
            assert_eq!(values.len(), 2);
            assert_eq!(*class_id, clock);
            assert_eq!(instances.len(), 1);
        }
        other => panic!("unexpected instrumentation {:?}", other),
    }
}

#[test]
fn test_mock_object_may_answer_itself() {
    let service = ClassId::object("com.acme.Service");
    let get_self = ExecutableId::method(service.clone(), "self", vec![], service.clone());
    let trace = Trace {
        exprs: vec![Expr::MockObject {
            class_id: service,
            fields: vec![],
            methods: vec![MockedMethod {
                method: get_self.clone(),
                values: vec![e(0)],
            }],
        }],
        init: vec![],
        call: e(0),
    };
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&trace);
    let mock = insts.process_expr(&mut arena, e(0)).unwrap();
    let m = composite(&arena, mock);
    assert!(m.is_mock);
    assert_eq!(m.mocks[&get_self], vec![mock]);
}

// ─── Descriptor Conversion ─────────────────────────────────────────

#[test]
fn test_descriptor_memoization_identity() {
    let raw = point_execution();
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&raw.trace);
    insts.process_trace(&mut arena).unwrap();
    let mut descriptors = DescriptorConverter::new(&raw);
    let a = descriptors
        .convert(&mut arena, &mut insts, d(3), Phase::Final)
        .unwrap();
    let b = descriptors
        .convert(&mut arena, &mut insts, d(3), Phase::Final)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_descriptor_array_length_beyond_int_range_is_rejected() {
    let raw = static_execution(
        vec![ValueDescriptor::Array {
            ref_id: 1,
            class_id: ClassId::array_of(int()),
            length: MAX_ARRAY_LENGTH + 1,
            elements: vec![],
            origin: None,
        }],
        vec![success(d(0))],
    );
    let mut arena = ModelArena::new();
    let mut insts = InstConverter::new(&raw.trace);
    insts.process_trace(&mut arena).unwrap();
    let err = DescriptorConverter::new(&raw)
        .convert(&mut arena, &mut insts, d(0), Phase::Final)
        .unwrap_err();
    assert!(matches!(err, ConvertError::MalformedTrace(_)), "{:?}", err);

    // The candidate fails and the execution is dropped, nothing panics.
    assert!(convert_execution(&raw, &PassConfig::default(), &TypeTable::new()).is_err());
}

#[test]
fn test_self_reference_closes_on_registered_model() {
    let raw = static_execution(
        vec![
            ValueDescriptor::Object {
                ref_id: 7,
                class_id: node(),
                fields: vec![bind(next(), d(1))],
                origin: None,
            },
            ValueDescriptor::CyclicRef {
                ref_id: 7,
                class_id: node(),
            },
        ],
        vec![success(d(0))],
    );
    let execution = convert(&raw);
    let result = execution.result_model().unwrap();
    assert_eq!(composite(&execution.arena, result).fields[&next()], result);
}

#[test]
fn test_forward_cycle_placeholder_is_resolved() {
    // FIRST is converted before the result, and points at it.
    let raw = static_execution(
        vec![
            ValueDescriptor::Object {
                ref_id: 7,
                class_id: node(),
                fields: vec![bind(next(), d(1))],
                origin: None,
            },
            ValueDescriptor::CyclicRef {
                ref_id: 8,
                class_id: node(),
            },
            ValueDescriptor::Object {
                ref_id: 8,
                class_id: node(),
                fields: vec![],
                origin: None,
            },
        ],
        vec![ResultCandidate::ConcreteSuccess {
            initial: ExecutionState::default(),
            final_state: ExecutionState {
                statics: vec![bind(FieldId::new_static(node(), "FIRST", node()), d(0))],
                ..Default::default()
            },
            result: Some(d(2)),
        }],
    );
    let execution = convert(&raw);
    let first = execution.state_after.as_ref().unwrap().statics.values().next().copied().unwrap();
    let target = composite(&execution.arena, first).fields[&next()];
    assert_eq!(Some(target), execution.result_model());
    assert!(matches!(execution.arena.get(target), ValueModel::Composite(_)));
}

#[test]
fn test_dangling_cyclic_reference_fails_the_candidate() {
    let raw = static_execution(
        vec![
            ValueDescriptor::Object {
                ref_id: 7,
                class_id: node(),
                fields: vec![bind(next(), d(1))],
                origin: None,
            },
            ValueDescriptor::CyclicRef {
                ref_id: 99,
                class_id: node(),
            },
        ],
        vec![success(d(0))],
    );
    let err = convert_execution(&raw, &PassConfig::default(), &TypeTable::new()).unwrap_err();
    assert_eq!(err.causes.len(), 1);
    assert!(err.causes[0].contains("ref id 99"), "{}", err.causes[0]);
}

#[test]
fn test_static_fields_never_enter_composites() {
    let raw = static_execution(
        vec![
            ValueDescriptor::Object {
                ref_id: 1,
                class_id: node(),
                fields: vec![
                    bind(FieldId::new_static(node(), "COUNT", int()), d(1)),
                    bind(FieldId::new(node(), "size", int()), d(1)),
                ],
                origin: None,
            },
            constant(2),
        ],
        vec![success(d(0))],
    );
    let execution = convert(&raw);
    let fields = &composite(&execution.arena, execution.result_model().unwrap()).fields;
    assert_eq!(fields.len(), 1);
    assert!(fields.keys().all(|f| f.name == "size"));
}

#[test]
fn test_final_snapshot_shares_initial_identity() {
    let execution = convert(&point_execution());
    let before = execution.state_before.this.unwrap();
    let after = execution.state_after.as_ref().unwrap().this.unwrap();
    assert_ne!(before, after);
    assert_eq!(
        execution.arena.get(before).id(),
        execution.arena.get(after).id()
    );
    let after = composite(&execution.arena, after);
    assert_eq!(int_of(&execution.arena, after.fields[&px()]), 3);
    assert_eq!(int_of(&execution.arena, after.fields[&py()]), 9);
}

#[test]
fn test_initial_snapshot_attaches_to_trace_model() {
    let raw = point_execution();
    let passes = PassConfig {
        demote_assembles: false,
        ..PassConfig::default()
    };
    let execution = convert_execution(&raw, &passes, &TypeTable::new()).unwrap();
    let this = execution.state_before.this.unwrap();
    let ValueModel::Assemble(m) = execution.arena.get(this) else {
        panic!("expected the trace's assemble model");
    };
    let origin = composite(&execution.arena, m.origin.unwrap());
    assert_eq!(origin.id, m.id);
    assert_eq!(int_of(&execution.arena, origin.fields[&py()]), 4);
}

#[test]
fn test_exception_descriptor_has_message_field() {
    let raw = static_execution(
        vec![ValueDescriptor::Exception {
            ref_id: 3,
            class_id: ClassId::object("java.lang.IllegalStateException"),
            message: Some("boom".to_string()),
            raised_by_user_code: true,
            origin: None,
        }],
        vec![ResultCandidate::ConcreteException {
            initial: ExecutionState::default(),
            final_state: ExecutionState::default(),
            exception: d(0),
        }],
    );
    let execution = convert(&raw);
    let ExecutionResult::Failure { exception, explicit } = execution.result else {
        panic!("expected a failure");
    };
    assert!(explicit);
    let fields = &composite(&execution.arena, exception).fields;
    assert_eq!(
        execution.arena.get(fields[&FieldId::exception_message()]),
        &ValueModel::string("boom")
    );
}

// ─── Candidates ────────────────────────────────────────────────────

fn receiver_success(result: DescriptorId) -> ResultCandidate {
    ResultCandidate::ConcreteSuccess {
        initial: ExecutionState {
            instance: Some(d(0)),
            ..Default::default()
        },
        final_state: ExecutionState {
            instance: Some(d(3)),
            ..Default::default()
        },
        result: Some(result),
    }
}

#[test]
fn test_falls_back_to_next_candidate() {
    let mut raw = point_execution();
    raw.trace.exprs.push(int_const(12));
    raw.candidates = vec![
        receiver_success(d(42)),
        ResultCandidate::SymbolicSuccess {
            init: vec![],
            result: e(4),
        },
    ];

    let execution = convert(&raw);
    assert_eq!(execution.source, "symbolic-success");
    assert!(execution.state_after.is_none());
    assert_eq!(int_of(&execution.arena, execution.result_model().unwrap()), 12);
    // The failed attempt attached no snapshot to the receiver.
    let this = execution.state_before.this.unwrap();
    assert_eq!(composite(&execution.arena, this).fields.len(), 2);
}

#[test]
fn test_init_failure_is_skipped() {
    let mut raw = point_execution();
    raw.descriptors.push(ValueDescriptor::Exception {
        ref_id: 50,
        class_id: ClassId::object("java.lang.ExceptionInInitializerError"),
        message: None,
        raised_by_user_code: false,
        origin: None,
    });
    raw.candidates.insert(0, ResultCandidate::ConcreteInitFailed { cause: d(7) });
    let execution = convert(&raw);
    assert_eq!(execution.source, "concrete-success");
}

#[test]
fn test_timeout_keeps_trace_state() {
    let mut raw = point_execution();
    raw.candidates = vec![ResultCandidate::ConcreteTimeout];
    let execution = convert(&raw);
    assert_eq!(execution.result, ExecutionResult::Timeout);
    assert!(execution.state_before.this.is_some());
    assert!(execution.state_after.is_none());
}

#[test]
fn test_exhausted_when_every_candidate_fails() {
    let mut raw = point_execution();
    raw.candidates = vec![
        ResultCandidate::ConcreteFailed { cause: d(6) },
        receiver_success(d(99)),
    ];
    let err = convert_execution(&raw, &PassConfig::default(), &TypeTable::new()).unwrap_err();
    assert_eq!(err.causes.len(), 2);
    assert!(err.causes[1].contains("d99"));
    assert!(err.to_string().contains("Point.norm()"));
}

#[test]
fn test_symbolic_exception() {
    let mut raw = point_execution();
    let npe = ClassId::object("java.lang.NullPointerException");
    raw.candidates = vec![ResultCandidate::SymbolicException {
        class_id: npe.clone(),
    }];
    let execution = convert(&raw);
    let ExecutionResult::Failure { exception, explicit } = execution.result else {
        panic!("expected a failure");
    };
    assert!(explicit);
    assert_eq!(execution.arena.get(exception).class_id(), npe);
}

// ─── Passes ────────────────────────────────────────────────────────

fn int_array(arena: &mut ModelArena, length: usize, stores: &[(usize, i32)]) -> ModelRef {
    let zero = arena.alloc(ValueModel::int(0));
    let stores = stores
        .iter()
        .map(|(i, v)| (*i, arena.alloc(ValueModel::int(*v))))
        .collect();
    let id = arena.fresh_id();
    arena.alloc(ValueModel::Array(ArrayModel {
        id,
        class_id: ClassId::array_of(int()),
        length,
        default_fill: zero,
        stores,
    }))
}

fn array(arena: &ModelArena, r: ModelRef) -> &ArrayModel {
    match arena.get(r) {
        ValueModel::Array(m) => m,
        other => panic!("expected an array, got {:?}", other),
    }
}

#[test]
fn test_compaction_promotes_majority_value() {
    let mut arena = ModelArena::new();
    let r = int_array(&mut arena, 4, &[(0, 8), (1, 8), (2, 8), (3, 5)]);
    assert_eq!(passes::compact_arrays(&mut arena), 1);
    let m = array(&arena, r);
    assert_eq!(int_of(&arena, m.default_fill), 8);
    assert_eq!(m.stores.len(), 1);
    assert_eq!(int_of(&arena, m.stores[&3]), 5);

    let snapshot = arena.clone();
    assert_eq!(passes::compact_arrays(&mut arena), 0);
    assert_eq!(arena, snapshot);
}

#[test]
fn test_compaction_keeps_elements() {
    let mut arena = ModelArena::new();
    let r = int_array(&mut arena, 6, &[(0, 0), (1, 0), (2, 0), (3, 0), (4, 7), (5, 7)]);
    let before: Vec<i32> = (0..6)
        .map(|i| int_of(&arena, array(&arena, r).element(i).unwrap()))
        .collect();
    passes::compact_arrays(&mut arena);
    let after: Vec<i32> = (0..6)
        .map(|i| int_of(&arena, array(&arena, r).element(i).unwrap()))
        .collect();
    assert_eq!(before, after);
    assert_eq!(int_of(&arena, array(&arena, r).default_fill), 0);
    assert_eq!(array(&arena, r).stores.len(), 2);
    assert_eq!(passes::compact_arrays(&mut arena), 0);
}

#[test]
fn test_compaction_ignores_singletons_and_weak_majorities() {
    let mut arena = ModelArena::new();
    let singles = int_array(&mut arena, 3, &[(0, 1), (1, 2), (2, 3)]);
    // 9 occurs twice, the default covers three slots.
    let weak = int_array(&mut arena, 5, &[(0, 9), (1, 9)]);
    assert_eq!(passes::compact_arrays(&mut arena), 0);
    assert_eq!(array(&arena, singles).stores.len(), 3);
    assert_eq!(array(&arena, weak).stores.len(), 2);
}

fn raw_point(arena: &mut ModelArena, x: i32, y: i32) -> ModelRef {
    let name = arena.alloc(ValueModel::string("com.acme.Point"));
    let id = arena.fresh_id();
    let r = arena.alloc(ValueModel::Void);
    let xv = arena.alloc(ValueModel::int(x));
    let yv = arena.alloc(ValueModel::int(y));
    let mut m = AssembleModel::new(
        id,
        point(),
        CallModel {
            instance: None,
            executable: ExecutableId::util(UtilMethod::CreateInstance),
            params: vec![name],
        },
    );
    m.modifications = vec![
        StatementModel::SetField {
            instance: r,
            field: px(),
            value: xv,
        },
        StatementModel::SetField {
            instance: r,
            field: py(),
            value: yv,
        },
    ];
    arena.replace(r, ValueModel::Assemble(m));
    r
}

#[test]
fn test_demotion_is_union_of_field_sets() {
    let mut arena = ModelArena::new();
    let r = raw_point(&mut arena, 1, 2);
    let id = arena.get(r).id();
    assert_eq!(passes::demote_assembles(&mut arena, DemotionPolicy::default()), 1);
    let m = composite(&arena, r).clone();
    assert_eq!(Some(m.id), id);
    assert_eq!(m.fields.len(), 2);
    assert_eq!(int_of(&arena, m.fields[&px()]), 1);
    assert_eq!(int_of(&arena, m.fields[&py()]), 2);

    assert_eq!(passes::demote_assembles(&mut arena, DemotionPolicy::default()), 0);
    assert_eq!(composite(&arena, r), &m);
}

#[test]
fn test_demotion_policy_knob() {
    let mut arena = ModelArena::new();
    let r = raw_point(&mut arena, 1, 2);
    let observed = arena.alloc(ValueModel::int(10));
    let ValueModel::Assemble(m) = arena.get(r).clone() else {
        unreachable!()
    };
    let mut snapshot = CompositeModel::new(m.id, point());
    snapshot.fields.insert(px(), observed);
    let snapshot = arena.alloc(ValueModel::Composite(snapshot));
    if let ValueModel::Assemble(m) = arena.get_mut(r) {
        m.origin = Some(snapshot);
    }

    let preferred = passes::demote(&arena, r, DemotionPolicy::PreferInitialSnapshot).unwrap();
    assert_eq!(int_of(&arena, preferred.fields[&px()]), 10);
    // No snapshot of y: the replayed argument fills in.
    assert_eq!(int_of(&arena, preferred.fields[&py()]), 2);

    let replayed = passes::demote(&arena, r, DemotionPolicy::PreferReplayedArgument).unwrap();
    assert_eq!(int_of(&arena, replayed.fields[&px()]), 1);
}

#[test]
fn test_behavioral_chain_is_not_demoted() {
    let mut arena = ModelArena::new();
    let r = raw_point(&mut arena, 1, 2);
    if let ValueModel::Assemble(m) = arena.get_mut(r) {
        m.modifications.push(StatementModel::Call(CallModel {
            instance: Some(r),
            executable: norm(),
            params: vec![],
        }));
    }
    assert_eq!(passes::demote_assembles(&mut arena, DemotionPolicy::default()), 0);
}

#[test]
fn test_constructor_simplification_needs_trivial_constructor() {
    let mut arena = ModelArena::new();
    let name = arena.alloc(ValueModel::string("com.acme.Point"));
    let id = arena.fresh_id();
    let r = arena.alloc(ValueModel::Assemble(AssembleModel::new(
        id,
        point(),
        CallModel {
            instance: None,
            executable: ExecutableId::util(UtilMethod::CreateInstance),
            params: vec![name],
        },
    )));

    assert_eq!(passes::simplify_constructors(&mut arena, &TypeTable::new()), 0);
    let oracle = TypeTable::new().with_trivial_constructor(&point());
    assert_eq!(passes::simplify_constructors(&mut arena, &oracle), 1);
    let ValueModel::Assemble(m) = arena.get(r) else {
        panic!("expected an assemble model");
    };
    assert_eq!(m.id, id);
    assert_eq!(m.instantiation.executable, ExecutableId::constructor(point(), vec![]));
    assert!(m.instantiation.params.is_empty());
    // Simplified models are no longer raw allocations, so demotion skips them.
    assert_eq!(passes::demote_assembles(&mut arena, DemotionPolicy::default()), 0);
}

#[test]
fn test_resolution_pass_reports_dangling() {
    let mut arena = ModelArena::new();
    arena.alloc(ValueModel::Custom(CustomModel {
        id: None,
        class_id: node(),
        kind: CustomKind::CyclicReference {
            ref_id: 4,
            phase: Phase::Final,
        },
        origin: None,
    }));
    let err = passes::resolve_cyclic_placeholders(&mut arena, |_, _| None).unwrap_err();
    assert_eq!(
        err,
        ConvertError::DanglingReference {
            ref_id: 4,
            phase: Phase::Final
        }
    );
}
