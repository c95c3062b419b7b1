//! Operation kinds
//!
//! A closed set of operation categories: declarations (wires, registers,
//! nodes), structure (instances, memories, connects), literals, aggregate
//! accessors, and primitive combinational operators. Primitive result
//! types are inferred from operand types at construction time.

use thiserror::Error;

use crate::attr::{Attr, IntAttr};
use crate::circuit::ModuleId;
use crate::types::Type;

/// Whether a declaration's name must survive optimization.
///
/// Droppable names are compiler-generated temporaries; interesting names
/// came from the source text and removing their declaration would change
/// what a user can observe in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Droppable,
    Interesting,
}

/// Primitive combinational operators.
///
/// Shift amounts, pad widths, and bit ranges are static parameters of the
/// operator rather than operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Not,
    Neg,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
    Cat,
    Mux,
    Pad(u32),
    Shl(u32),
    Shr(u32),
    Bits(u32, u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("operand count mismatch: {op:?} expects {expected}, got {got}")]
    OperandCount {
        op: PrimOp,
        expected: usize,
        got: usize,
    },
    #[error("operand types {0} and {1} are incompatible")]
    Incompatible(Type, Type),
    #[error("expected an integer type, got {0}")]
    NotInteger(Type),
    #[error("bit range {hi}:{lo} out of bounds for {ty}")]
    BitRange { hi: u32, lo: u32, ty: Type },
    #[error("no field {index} on {ty}")]
    NoField { ty: Type, index: usize },
    #[error("expected a vector type, got {0}")]
    NotVector(Type),
}

fn int_width(ty: &Type) -> Result<Option<u32>, TypeError> {
    match ty {
        Type::UInt(w) | Type::SInt(w) => Ok(*w),
        other => Err(TypeError::NotInteger(other.clone())),
    }
}

fn same_class(a: &Type, b: &Type) -> Result<bool, TypeError> {
    match (a, b) {
        (Type::UInt(_), Type::UInt(_)) => Ok(false),
        (Type::SInt(_), Type::SInt(_)) => Ok(true),
        _ => Err(TypeError::Incompatible(a.clone(), b.clone())),
    }
}

fn int_ty(signed: bool, width: Option<u32>) -> Type {
    if signed {
        Type::SInt(width)
    } else {
        Type::UInt(width)
    }
}

impl PrimOp {
    pub fn num_operands(&self) -> usize {
        match self {
            PrimOp::Not | PrimOp::Neg | PrimOp::Pad(_) | PrimOp::Shl(_) | PrimOp::Shr(_) | PrimOp::Bits(..) => 1,
            PrimOp::Mux => 3,
            _ => 2,
        }
    }

    /// Infer the result type from operand types, per the widening rules of
    /// the surface language: arithmetic grows enough bits to never
    /// overflow, comparisons yield one bit, bitwise ops take the max width.
    pub fn result_type(&self, operands: &[Type]) -> Result<Type, TypeError> {
        if operands.len() != self.num_operands() {
            return Err(TypeError::OperandCount {
                op: *self,
                expected: self.num_operands(),
                got: operands.len(),
            });
        }

        let max = |a: Option<u32>, b: Option<u32>| a.zip(b).map(|(x, y)| x.max(y));
        let add = |a: Option<u32>, b: Option<u32>| a.zip(b).map(|(x, y)| x + y);

        match self {
            PrimOp::Add | PrimOp::Sub => {
                let signed = same_class(&operands[0], &operands[1])?;
                let (wa, wb) = (int_width(&operands[0])?, int_width(&operands[1])?);
                Ok(int_ty(signed, max(wa, wb).map(|w| w + 1)))
            }
            PrimOp::Mul => {
                let signed = same_class(&operands[0], &operands[1])?;
                let (wa, wb) = (int_width(&operands[0])?, int_width(&operands[1])?);
                Ok(int_ty(signed, add(wa, wb)))
            }
            PrimOp::Div => {
                let signed = same_class(&operands[0], &operands[1])?;
                let wa = int_width(&operands[0])?;
                int_width(&operands[1])?;
                Ok(int_ty(signed, if signed { wa.map(|w| w + 1) } else { wa }))
            }
            PrimOp::And | PrimOp::Or | PrimOp::Xor => {
                same_class(&operands[0], &operands[1])?;
                let (wa, wb) = (int_width(&operands[0])?, int_width(&operands[1])?);
                Ok(Type::UInt(max(wa, wb)))
            }
            PrimOp::Not => Ok(Type::UInt(int_width(&operands[0])?)),
            PrimOp::Neg => {
                let w = int_width(&operands[0])?;
                Ok(Type::SInt(w.map(|w| w + 1)))
            }
            PrimOp::Eq | PrimOp::Neq | PrimOp::Lt | PrimOp::Leq | PrimOp::Gt | PrimOp::Geq => {
                same_class(&operands[0], &operands[1])?;
                Ok(Type::UInt(Some(1)))
            }
            PrimOp::Cat => {
                let (wa, wb) = (int_width(&operands[0])?, int_width(&operands[1])?);
                Ok(Type::UInt(add(wa, wb)))
            }
            PrimOp::Mux => {
                int_width(&operands[0])?;
                let signed = same_class(&operands[1], &operands[2])?;
                let (wt, wf) = (int_width(&operands[1])?, int_width(&operands[2])?);
                Ok(int_ty(signed, max(wt, wf)))
            }
            PrimOp::Pad(amount) => {
                let signed = operands[0].is_signed();
                let w = int_width(&operands[0])?;
                Ok(int_ty(signed, w.map(|w| w.max(*amount))))
            }
            PrimOp::Shl(amount) => {
                let signed = operands[0].is_signed();
                let w = int_width(&operands[0])?;
                Ok(int_ty(signed, w.map(|w| w + *amount)))
            }
            PrimOp::Shr(amount) => {
                let signed = operands[0].is_signed();
                let w = int_width(&operands[0])?;
                Ok(int_ty(signed, w.map(|w| w.saturating_sub(*amount).max(1))))
            }
            PrimOp::Bits(hi, lo) => {
                let w = int_width(&operands[0])?;
                if lo > hi || w.is_some_and(|w| *hi >= w) {
                    return Err(TypeError::BitRange {
                        hi: *hi,
                        lo: *lo,
                        ty: operands[0].clone(),
                    });
                }
                Ok(Type::UInt(Some(hi - lo + 1)))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrimOp::Add => "add",
            PrimOp::Sub => "sub",
            PrimOp::Mul => "mul",
            PrimOp::Div => "div",
            PrimOp::And => "and",
            PrimOp::Or => "or",
            PrimOp::Xor => "xor",
            PrimOp::Not => "not",
            PrimOp::Neg => "neg",
            PrimOp::Eq => "eq",
            PrimOp::Neq => "neq",
            PrimOp::Lt => "lt",
            PrimOp::Leq => "leq",
            PrimOp::Gt => "gt",
            PrimOp::Geq => "geq",
            PrimOp::Cat => "cat",
            PrimOp::Mux => "mux",
            PrimOp::Pad(_) => "pad",
            PrimOp::Shl(_) => "shl",
            PrimOp::Shr(_) => "shr",
            PrimOp::Bits(..) => "bits",
        }
    }
}

/// The kind of an operation.
///
/// Operand conventions:
/// - `Reg`: `[clock]`
/// - `RegReset`: `[clock, reset_signal, reset_value]`
/// - `Node`: `[input]`
/// - `Connect`: `[dest, src]`
/// - `Subfield`/`Subindex`: `[aggregate]`
/// - `Prim`: per [`PrimOp::num_operands`]
/// - `Constant`, `Invalid`, `Wire`, `Instance`, `Mem`: none
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// Integer literal producer.
    Constant(IntAttr),
    /// Explicitly undefined value of the result type.
    Invalid,
    Wire {
        name: String,
        name_kind: NameKind,
    },
    Reg {
        name: String,
        name_kind: NameKind,
    },
    /// Register with a reset: when the reset signal is asserted the
    /// register takes the reset value.
    RegReset {
        name: String,
        name_kind: NameKind,
    },
    /// Named pass-through: a renaming of its operand, no transform.
    Node {
        name: String,
        name_kind: NameKind,
    },
    /// Instantiation site embedding another module. One result per port of
    /// the target.
    Instance {
        name: String,
        target: ModuleId,
        params: Vec<(String, Attr)>,
    },
    /// Memory with one bundle-typed result per access port.
    Mem {
        name: String,
    },
    /// Assignment of `src` into the location named by `dest`.
    Connect,
    Subfield {
        index: usize,
    },
    Subindex {
        index: usize,
    },
    Prim(PrimOp),
}

impl OpKind {
    /// Declared name, for declarations that carry one.
    pub fn decl_name(&self) -> Option<&str> {
        match self {
            OpKind::Wire { name, .. }
            | OpKind::Reg { name, .. }
            | OpKind::RegReset { name, .. }
            | OpKind::Node { name, .. }
            | OpKind::Instance { name, .. }
            | OpKind::Mem { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn name_kind(&self) -> Option<NameKind> {
        match self {
            OpKind::Wire { name_kind, .. }
            | OpKind::Reg { name_kind, .. }
            | OpKind::RegReset { name_kind, .. }
            | OpKind::Node { name_kind, .. } => Some(*name_kind),
            _ => None,
        }
    }

    /// Wires and registers accept connects and hold state between them.
    pub fn is_wire_or_reg(&self) -> bool {
        matches!(
            self,
            OpKind::Wire { .. } | OpKind::Reg { .. } | OpKind::RegReset { .. }
        )
    }

    /// Pure expressions: safe to erase once unused.
    pub fn is_trivially_dead_when_unused(&self) -> bool {
        matches!(
            self,
            OpKind::Constant(_)
                | OpKind::Invalid
                | OpKind::Node { .. }
                | OpKind::Subfield { .. }
                | OpKind::Subindex { .. }
                | OpKind::Prim(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(w: u32) -> Type {
        Type::UInt(Some(w))
    }

    fn s(w: u32) -> Type {
        Type::SInt(Some(w))
    }

    #[test]
    fn test_arith_widths() {
        assert_eq!(PrimOp::Add.result_type(&[u(8), u(4)]), Ok(u(9)));
        assert_eq!(PrimOp::Mul.result_type(&[u(8), u(4)]), Ok(u(12)));
        assert_eq!(PrimOp::Div.result_type(&[s(8), s(4)]), Ok(s(9)));
        assert_eq!(PrimOp::Neg.result_type(&[u(8)]), Ok(s(9)));
    }

    #[test]
    fn test_bitwise_and_compare() {
        assert_eq!(PrimOp::And.result_type(&[u(8), u(4)]), Ok(u(8)));
        assert_eq!(PrimOp::Eq.result_type(&[u(8), u(8)]), Ok(u(1)));
        assert_eq!(PrimOp::Not.result_type(&[s(5)]), Ok(u(5)));
    }

    #[test]
    fn test_width_parameterized() {
        assert_eq!(PrimOp::Pad(8).result_type(&[u(4)]), Ok(u(8)));
        assert_eq!(PrimOp::Pad(2).result_type(&[u(4)]), Ok(u(4)));
        assert_eq!(PrimOp::Shl(3).result_type(&[u(4)]), Ok(u(7)));
        assert_eq!(PrimOp::Shr(3).result_type(&[u(4)]), Ok(u(1)));
        assert_eq!(PrimOp::Shr(9).result_type(&[u(4)]), Ok(u(1)));
        assert_eq!(PrimOp::Bits(5, 2).result_type(&[u(8)]), Ok(u(4)));
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(
            PrimOp::Add.result_type(&[u(8), s(8)]),
            Err(TypeError::Incompatible(..))
        ));
        assert!(matches!(
            PrimOp::Bits(8, 0).result_type(&[u(8)]),
            Err(TypeError::BitRange { .. })
        ));
        assert!(matches!(
            PrimOp::Add.result_type(&[u(8)]),
            Err(TypeError::OperandCount { .. })
        ));
    }

    #[test]
    fn test_unknown_width_propagates() {
        assert_eq!(
            PrimOp::Add.result_type(&[Type::UInt(None), u(4)]),
            Ok(Type::UInt(None))
        );
    }
}
