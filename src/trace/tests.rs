use super::*;
use crate::model::PrimitiveKind;

const POINT_RECORD: &str = r#"{
  "method": {
    "kind": "method",
    "class_id": "com.acme.Point",
    "name": "norm",
    "params": [],
    "return_type": "int",
    "is_static": false
  },
  "trace": {
    "exprs": [
      { "op": "allocate_memory", "class_id": "com.acme.Point" },
      { "op": "const", "value": { "type": "int", "value": 3 } },
      { "op": "method_call", "instance": 0, "method": {
          "kind": "method", "class_id": "com.acme.Point", "name": "norm",
          "params": [], "return_type": "int", "is_static": false } }
    ],
    "init": [
      { "inst": "set_field", "instance": 0, "value": 1,
        "field": {
          "declaring_class": "com.acme.Point",
          "name": "x",
          "type": "int",
          "is_static": false
        } }
    ],
    "call": 2
  },
  "descriptors": [
    { "kind": "constant", "value": { "type": "int", "value": 5 } }
  ],
  "candidates": [
    { "kind": "concrete_success", "initial": {}, "final": {}, "result": 0 },
    { "kind": "concrete_timeout" }
  ]
}"#;

#[test]
fn test_parse_single_record() {
    let records = parse_executions(POINT_RECORD).unwrap();
    assert_eq!(records.len(), 1);
    let raw = &records[0];
    assert_eq!(raw.method.to_string(), "Point.norm()");
    assert_eq!(raw.trace.exprs.len(), 3);
    assert_eq!(raw.trace.call, ExprId(2));
    assert_eq!(raw.candidates.len(), 2);
    assert_eq!(raw.candidates[0].kind_name(), "concrete-success");
    assert_eq!(raw.candidates[1], ResultCandidate::ConcreteTimeout);
}

#[test]
fn test_parse_record_array() {
    let text = format!("[{}, {}]", POINT_RECORD, POINT_RECORD);
    assert_eq!(parse_executions(&text).unwrap().len(), 2);
    assert!(parse_executions("[]").unwrap().is_empty());
}

#[test]
fn test_parse_rejects_unknown_op() {
    let text = POINT_RECORD.replace("allocate_memory", "teleport");
    assert!(matches!(parse_executions(&text), Err(InputError::Json(_))));
}

#[test]
fn test_call_operands() {
    let raw = &parse_executions(POINT_RECORD).unwrap()[0];
    let (instance, args) = raw.trace.call_operands().unwrap();
    assert_eq!(instance, Some(ExprId(0)));
    assert!(args.is_empty());

    let mut trace = raw.trace.clone();
    trace.call = ExprId(1);
    assert!(matches!(
        trace.call_operands(),
        Err(ConvertError::MalformedTrace(_))
    ));
}

#[test]
fn test_unknown_ids() {
    let raw = &parse_executions(POINT_RECORD).unwrap()[0];
    assert_eq!(
        raw.trace.expr(ExprId(9)).unwrap_err(),
        ConvertError::UnknownExpr(9)
    );
    assert_eq!(
        raw.descriptor(DescriptorId(4)).unwrap_err(),
        ConvertError::UnknownDescriptor(4)
    );
}

#[test]
fn test_static_assignments() {
    let counter = FieldId::new_static(
        ClassId::object("com.acme.Counter"),
        "COUNT",
        ClassId::Primitive(PrimitiveKind::Int),
    );
    let trace = Trace {
        exprs: vec![Expr::Const {
            value: PrimitiveValue::Int(4),
        }],
        init: vec![
            Inst::Eval { expr: ExprId(0) },
            Inst::SetStaticField {
                field: counter.clone(),
                value: ExprId(0),
            },
        ],
        call: ExprId(0),
    };
    let statics: Vec<_> = trace.static_assignments().collect();
    assert_eq!(statics, vec![(&counter, ExprId(0))]);
}

#[test]
fn test_descriptor_accessors() {
    let point = ClassId::object("com.acme.Point");
    let object = ValueDescriptor::Object {
        ref_id: 11,
        class_id: point.clone(),
        fields: vec![],
        origin: Some(ExprId(0)),
    };
    assert_eq!(object.ref_id(), Some(11));
    assert_eq!(object.origin(), Some(ExprId(0)));
    assert_eq!(object.class_id(), point);

    let class = ValueDescriptor::Class { class_id: point };
    assert_eq!(class.ref_id(), None);
    assert_eq!(class.class_id(), ClassId::class_literal());
}

#[test]
fn test_load_missing_file() {
    let err = load_executions(Path::new("/nonexistent/executions.json")).unwrap_err();
    assert!(matches!(err, InputError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/executions.json"));
}
