//! Textual circuit emission
//!
//! The printed form is deterministic: module, port, and body order follow
//! construction order, and value names are arena indices. Two circuits
//! with identical structure print byte-identically, which the test suites
//! rely on.

use std::fmt;

use crate::circuit::{Circuit, Direction, Module, Op, ValueId};
use crate::ops::{NameKind, OpKind};

/// Render a circuit to its canonical text form.
pub fn print_circuit(circuit: &Circuit) -> String {
    CircuitPrinter(circuit).to_string()
}

struct CircuitPrinter<'a>(&'a Circuit);

fn value_ref(v: ValueId) -> String {
    format!("%{}", v.index)
}

fn name_suffix(kind: NameKind) -> &'static str {
    match kind {
        NameKind::Droppable => "",
        NameKind::Interesting => "!",
    }
}

fn write_op(f: &mut fmt::Formatter<'_>, circuit: &Circuit, module: &Module, op: &Op) -> fmt::Result {
    let results: Vec<String> = op.results.iter().map(|&r| value_ref(r)).collect();
    let operands: Vec<String> = op.operands.iter().map(|&o| value_ref(o)).collect();

    write!(f, "    ")?;
    if !results.is_empty() {
        write!(f, "{} = ", results.join(", "))?;
    }
    match &op.kind {
        OpKind::Constant(attr) => {
            let value = if attr.ty().is_signed() {
                attr.as_i128().to_string()
            } else {
                attr.as_u128().to_string()
            };
            write!(f, "constant {value}")?;
        }
        OpKind::Invalid => write!(f, "invalid")?,
        OpKind::Wire { name, name_kind } => write!(f, "wire @{name}{}", name_suffix(*name_kind))?,
        OpKind::Reg { name, name_kind } => {
            write!(f, "reg @{name}{} {}", name_suffix(*name_kind), operands.join(", "))?
        }
        OpKind::RegReset { name, name_kind } => write!(
            f,
            "regreset @{name}{} {}",
            name_suffix(*name_kind),
            operands.join(", ")
        )?,
        OpKind::Node { name, name_kind } => {
            write!(f, "node @{name}{} {}", name_suffix(*name_kind), operands.join(", "))?
        }
        OpKind::Instance { name, target, .. } => {
            write!(f, "instance @{name} of {}", circuit.module(*target).name)?
        }
        OpKind::Mem { name } => write!(f, "mem @{name}")?,
        OpKind::Connect => write!(f, "connect {}", operands.join(", "))?,
        OpKind::Subfield { index } => write!(f, "subfield {}[{index}]", operands[0])?,
        OpKind::Subindex { index } => write!(f, "subindex {}[{index}]", operands[0])?,
        OpKind::Prim(prim) => write!(f, "{} {}", prim.name(), operands.join(", "))?,
    }
    if let Some(&result) = op.results.first() {
        write!(f, " : {}", module.value_type(result))?;
    }
    writeln!(f)
}

impl fmt::Display for CircuitPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let circuit = self.0;
        writeln!(f, "circuit {}:", circuit.name)?;
        for module in circuit.modules() {
            let visibility = if module.is_public() { "public " } else { "" };
            let kind = match module.kind {
                crate::circuit::ModuleKind::Concrete => "module",
                crate::circuit::ModuleKind::External => "extmodule",
            };
            writeln!(f, "  {visibility}{kind} {}:", module.name)?;
            for port in module.ports() {
                let dir = match port.direction {
                    Direction::In => "input",
                    Direction::Out => "output",
                };
                let protection = if module.is_protected(port.value) {
                    " {protected}"
                } else {
                    ""
                };
                writeln!(
                    f,
                    "    {dir} {} : {}{protection}  ; {}",
                    port.name,
                    port.ty,
                    value_ref(port.value)
                )?;
            }
            for op in module.body() {
                write_op(f, circuit, module, module.op(op))?;
            }
        }
        Ok(())
    }
}
