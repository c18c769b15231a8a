use std::fmt::{self, Write};

use super::{Assertion, Expr, Statement};
use crate::model::FieldAccess;

// ─── Text Rendering ────────────────────────────────────────────────

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Null => write!(f, "null"),
            Expr::ClassLiteral(class_id) => write!(f, "{}.class", class_id),
            Expr::Field {
                target,
                field,
                access,
            } => match access {
                FieldAccess::Direct => write!(f, "{}.{}", target, field.name),
                FieldAccess::Getter(getter) => write!(f, "{}.{}()", target, getter),
                FieldAccess::Reflection => write!(
                    f,
                    "getFieldValue({}, \"{}\", \"{}\")",
                    target, field.declaring_class, field.name
                ),
            },
            Expr::Length(array) => write!(f, "{}.length", array),
            Expr::Element { array, index } => write!(f, "{}[{}]", array, index),
            Expr::Model(r) => write!(f, "model({})", r),
            Expr::IsNull(value) => write!(f, "{} == null", value),
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Equals { expected, actual } => {
                write!(f, "assertEquals({}, {})", expected, actual)
            }
            Assertion::ApproxEquals {
                expected,
                actual,
                delta,
            } => write!(f, "assertEquals({}, {}, {:e})", expected, actual, delta),
            Assertion::True(actual) => write!(f, "assertTrue({})", actual),
            Assertion::False(actual) => write!(f, "assertFalse({})", actual),
            Assertion::Null(actual) => write!(f, "assertNull({})", actual),
            Assertion::NotNull(actual) => write!(f, "assertNotNull({})", actual),
            Assertion::Same { expected, actual } => {
                write!(f, "assertSame({}, {})", expected, actual)
            }
            Assertion::ArrayEquals { expected, actual } => {
                write!(f, "assertArrayEquals({}, {})", expected, actual)
            }
            Assertion::ApproxArrayEquals {
                expected,
                actual,
                delta,
            } => write!(f, "assertArrayEquals({}, {}, {:e})", expected, actual, delta),
            Assertion::DeepEquals { expected, actual } => {
                write!(f, "deepEquals({}, {})", expected, actual)
            }
        }
    }
}

/// Render a statement block as indented pseudo-code.
pub fn render(block: &[Statement]) -> String {
    let mut out = String::new();
    render_block(block, 0, &mut out);
    out
}

fn render_block(block: &[Statement], indent: usize, out: &mut String) {
    let pad = "    ".repeat(indent);
    for stmt in block {
        // Writing to a String cannot fail.
        let _ = match stmt {
            Statement::Declare { var, init } => {
                writeln!(out, "{}let {}: {} = {};", pad, var.name, var.ty, init)
            }
            Statement::Assert(assertion) => writeln!(out, "{}{};", pad, assertion),
            Statement::Comment(text) => writeln!(out, "{}// {}", pad, text),
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                let _ = writeln!(out, "{}if {} {{", pad, condition);
                render_block(then, indent + 1, out);
                if !otherwise.is_empty() {
                    let _ = writeln!(out, "{}}} else {{", pad);
                    render_block(otherwise, indent + 1, out);
                }
                writeln!(out, "{}}}", pad)
            }
            Statement::For { index, bound, body } => {
                let _ = writeln!(out, "{}for {} in 0..{} {{", pad, index.name, bound);
                render_block(body, indent + 1, out);
                writeln!(out, "{}}}", pad)
            }
        };
    }
}
