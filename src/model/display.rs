use std::collections::HashSet;
use std::fmt::{self, Write};

use super::*;

// ─── Pretty Printing ───────────────────────────────────────────────

/// `Display` adapter for the subgraph rooted at one model.
///
/// A model that was already printed is shown as a back-reference
/// (`@Point#1`), so cyclic graphs print in finite space.
pub struct ModelDisplay<'a> {
    arena: &'a ModelArena,
    root: ModelRef,
}

impl ModelArena {
    pub fn display(&self, root: ModelRef) -> ModelDisplay<'_> {
        ModelDisplay { arena: self, root }
    }
}

impl fmt::Display for ModelDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        let mut printed = HashSet::new();
        write_model(self.arena, self.root, &mut printed, &mut out)?;
        f.write_str(&out)
    }
}

fn label(model: &ValueModel) -> String {
    match model.id() {
        Some(id) => format!("{}{}", model.class_id().simple_name(), id),
        None => model.class_id().simple_name(),
    }
}

fn write_model(
    arena: &ModelArena,
    r: ModelRef,
    printed: &mut HashSet<ModelRef>,
    out: &mut String,
) -> fmt::Result {
    let model = arena.get(r);
    if model.id().is_some() && !printed.insert(r) {
        return write!(out, "@{}", label(model));
    }
    match model {
        ValueModel::Null { .. } => write!(out, "null"),
        ValueModel::Primitive { value } => write!(out, "{}", value),
        ValueModel::ClassRef(m) => write!(out, "{}.class", m.referenced),
        ValueModel::EnumConstant(m) => write!(out, "{}.{}", m.class_id.simple_name(), m.name),
        ValueModel::Void => write!(out, "void"),
        ValueModel::Composite(m) => {
            if m.is_mock {
                write!(out, "mock ")?;
            }
            write!(out, "{} {{", label(model))?;
            for (i, (field, value)) in m.fields.iter().enumerate() {
                write!(out, "{}{}: ", if i == 0 { " " } else { ", " }, field.name)?;
                write_model(arena, *value, printed, out)?;
            }
            for (method, answers) in &m.mocks {
                write!(out, "; {} -> [", method)?;
                for (i, a) in answers.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write_model(arena, *a, printed, out)?;
                }
                write!(out, "]")?;
            }
            write!(out, " }}")
        }
        ValueModel::Array(m) => {
            write!(out, "{}(len {}, fill ", label(model), m.length)?;
            write_model(arena, m.default_fill, printed, out)?;
            write!(out, ") {{")?;
            for (i, (index, value)) in m.stores.iter().enumerate() {
                write!(out, "{}{}: ", if i == 0 { " " } else { ", " }, index)?;
                write_model(arena, *value, printed, out)?;
            }
            write!(out, " }}")
        }
        ValueModel::Assemble(m) => {
            write!(out, "{} = ", label(model))?;
            write_call(arena, &m.instantiation, printed, out)?;
            for step in &m.modifications {
                write!(out, "; ")?;
                match step {
                    StatementModel::Call(call) => write_call(arena, call, printed, out)?,
                    StatementModel::SetField { field, value, .. } => {
                        write!(out, ".{} = ", field.name)?;
                        write_model(arena, *value, printed, out)?;
                    }
                }
            }
            if let Some(origin) = m.origin {
                write!(out, " ~ ")?;
                write_model(arena, origin, printed, out)?;
            }
            Ok(())
        }
        ValueModel::Lambda(m) => write!(out, "lambda {}::{}", label(model), m.method_name),
        ValueModel::Custom(m) => {
            match &m.kind {
                CustomKind::CyclicReference { ref_id, phase } => {
                    write!(out, "<cyclic ref {} {}>", ref_id, phase)?
                }
                CustomKind::Named { name } => write!(out, "<{}>", name)?,
            }
            if let Some(origin) = m.origin {
                write!(out, " ~ ")?;
                write_model(arena, origin, printed, out)?;
            }
            Ok(())
        }
    }
}

fn write_call(
    arena: &ModelArena,
    call: &CallModel,
    printed: &mut HashSet<ModelRef>,
    out: &mut String,
) -> fmt::Result {
    match &call.executable {
        ExecutableId::Constructor { class_id, .. } => {
            write!(out, "new {}(", class_id.simple_name())?
        }
        ExecutableId::Method { name, .. } if call.instance.is_some() => write!(out, ".{}(", name)?,
        other => write!(out, "{}(", other.name())?,
    }
    for (i, p) in call.params.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        write_model(arena, *p, printed, out)?;
    }
    write!(out, ")")
}
