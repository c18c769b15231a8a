//! Model graphs as `petgraph` graphs, and their Graphviz rendering.
//!
//! Nodes are the models reachable from an execution's roots; edges carry
//! the role of the reference (field name, array index, call argument,
//! origin). The roots themselves appear as box-shaped entry nodes.

use std::collections::HashMap;

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::convert::{EnvironmentModels, Execution, ExecutionResult, Instrumentation};
use crate::model::*;

#[derive(Clone, Debug, PartialEq)]
pub enum GraphNode {
    /// A named handle held outside the arena (`result`, `this@final`, ...).
    Root(String),
    Model { model: ModelRef, label: String },
}

impl GraphNode {
    fn label(&self) -> &str {
        match self {
            GraphNode::Root(name) => name,
            GraphNode::Model { label, .. } => label,
        }
    }
}

pub type ModelGraph = DiGraph<GraphNode, String>;

/// Labeled outgoing references of a model, in a stable order.
pub fn labeled_edges(model: &ValueModel) -> Vec<(String, ModelRef)> {
    let mut out = Vec::new();
    let call = |out: &mut Vec<(String, ModelRef)>, prefix: &str, c: &CallModel| {
        if let Some(instance) = c.instance {
            out.push((format!("{}this", prefix), instance));
        }
        for (i, p) in c.params.iter().enumerate() {
            out.push((format!("{}arg{}", prefix, i), *p));
        }
    };
    match model {
        ValueModel::Composite(m) => {
            for (field, value) in &m.fields {
                out.push((field.name.clone(), *value));
            }
            for (method, answers) in &m.mocks {
                for (i, answer) in answers.iter().enumerate() {
                    out.push((format!("{}#{}", method.name(), i), *answer));
                }
            }
        }
        ValueModel::Array(m) => {
            out.push(("fill".to_string(), m.default_fill));
            for (index, value) in &m.stores {
                out.push((format!("[{}]", index), *value));
            }
        }
        ValueModel::Assemble(m) => {
            call(&mut out, "new.", &m.instantiation);
            for (step, modification) in m.modifications.iter().enumerate() {
                match modification {
                    StatementModel::Call(c) => {
                        call(&mut out, &format!("{}:{}.", step, c.executable.name()), c)
                    }
                    StatementModel::SetField { field, value, .. } => {
                        out.push((format!("{}:{}", step, field.name), *value))
                    }
                }
            }
            if let Some(origin) = m.origin {
                out.push(("origin".to_string(), origin));
            }
        }
        ValueModel::Lambda(m) => {
            for (i, captured) in m.captured.iter().enumerate() {
                out.push((format!("captured{}", i), *captured));
            }
        }
        ValueModel::Custom(m) => {
            if let Some(origin) = m.origin {
                out.push(("origin".to_string(), origin));
            }
        }
        ValueModel::Null { .. }
        | ValueModel::Primitive { .. }
        | ValueModel::ClassRef(_)
        | ValueModel::EnumConstant(_)
        | ValueModel::Void => {}
    }
    out
}

fn node_label(arena: &ModelArena, r: ModelRef) -> String {
    let model = arena.get(r);
    match model {
        ValueModel::Null { .. } => format!("{} null", r),
        ValueModel::Primitive { value } => format!("{} {}", r, value),
        ValueModel::EnumConstant(m) => format!("{} {}.{}", r, m.class_id.simple_name(), m.name),
        ValueModel::ClassRef(m) => format!("{} {}.class", r, m.referenced),
        ValueModel::Void => format!("{} void", r),
        other => {
            let id = other.id().map(|id| format!(" {}", id)).unwrap_or_default();
            format!("{} {} {}{}", r, other.variant_name(), other.class_id().simple_name(), id)
        }
    }
}

/// The models reachable from `roots`, with the named roots as entries.
pub fn model_graph(arena: &ModelArena, roots: &[(String, ModelRef)]) -> ModelGraph {
    let mut graph = ModelGraph::new();
    let start: Vec<ModelRef> = roots.iter().map(|(_, r)| *r).collect();
    let order = arena.reachable(&start);
    let mut index: HashMap<ModelRef, NodeIndex> = HashMap::new();
    for r in &order {
        let r = *r;
        let node = graph.add_node(GraphNode::Model {
            model: r,
            label: node_label(arena, r),
        });
        index.insert(r, node);
    }
    for r in &order {
        let from = index[r];
        for (label, to) in labeled_edges(arena.get(*r)) {
            if let Some(to) = index.get(&to) {
                graph.add_edge(from, *to, label);
            }
        }
    }
    for (name, r) in roots {
        let root = graph.add_node(GraphNode::Root(name.clone()));
        if let Some(target) = index.get(r) {
            graph.add_edge(root, *target, String::new());
        }
    }
    graph
}

fn environment_roots(out: &mut Vec<(String, ModelRef)>, env: &EnvironmentModels, phase: Phase) {
    if let Some(this) = env.this {
        out.push((format!("this@{}", phase), this));
    }
    for (i, p) in env.params.iter().enumerate() {
        out.push((format!("arg{}@{}", i, phase), *p));
    }
    for (field, value) in &env.statics {
        out.push((format!("{}@{}", field, phase), *value));
    }
}

/// Named roots of an execution: states, outcome and instrumentation.
pub fn execution_roots(execution: &Execution) -> Vec<(String, ModelRef)> {
    let mut out = Vec::new();
    environment_roots(&mut out, &execution.state_before, Phase::Initial);
    if let Some(after) = &execution.state_after {
        environment_roots(&mut out, after, Phase::Final);
    }
    match execution.result {
        ExecutionResult::Success { model } => out.push(("result".to_string(), model)),
        ExecutionResult::Failure { exception, .. } => out.push(("thrown".to_string(), exception)),
        ExecutionResult::Timeout => {}
    }
    for inst in &execution.instrumentation {
        match inst {
            Instrumentation::StaticMethod { method, values } => {
                for (i, v) in values.iter().enumerate() {
                    out.push((format!("mock {}#{}", method.name(), i), *v));
                }
            }
            Instrumentation::NewInstance { class_id, instances } => {
                for (i, v) in instances.iter().enumerate() {
                    out.push((format!("new {}#{}", class_id.simple_name(), i), *v));
                }
            }
        }
    }
    out
}

pub fn execution_graph(execution: &Execution) -> ModelGraph {
    model_graph(&execution.arena, &execution_roots(execution))
}

/// Graphviz source for a model graph.
pub fn to_dot(graph: &ModelGraph) -> String {
    let dot = Dot::with_attr_getters(
        graph,
        &[Config::EdgeNoLabel, Config::NodeNoLabel],
        &|_, edge| format!("label = {:?} ", edge.weight()),
        &|_, (_, node)| match node {
            GraphNode::Root(_) => format!("label = {:?}, shape = box ", node.label()),
            GraphNode::Model { .. } => format!("label = {:?} ", node.label()),
        },
    );
    format!("{:?}", dot)
}
