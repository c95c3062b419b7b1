//! Local constant folding
//!
//! Each operation kind carries a fold hook: given the literal attributes
//! of its operands (or `None` where an operand is not statically known),
//! it may produce replacement results. A replacement is either a literal
//! attribute or a reference to one of the operands (value forwarding, as
//! in `mux` with a known selector).
//!
//! Hooks are pure. Returning `None` means the operation does not fold
//! under the given operands; callers treat that conservatively.
//!
//! Explicitly-invalid operands fold as zero in value-producing arithmetic
//! and logic; width-changing operations (`pad`, `bits`, shifts) propagate
//! invalid as invalid.

use smallvec::{smallvec, SmallVec};

use crate::attr::{Attr, IntAttr, MAX_CONST_WIDTH};
use crate::ops::{OpKind, PrimOp};
use crate::types::Type;

/// One replacement result from a fold.
#[derive(Debug, Clone, PartialEq)]
pub enum FoldResult {
    /// A literal attribute (integer constant or explicit invalid).
    Attr(Attr),
    /// The result equals the operand at this index.
    Operand(usize),
}

pub type FoldResults = SmallVec<[FoldResult; 1]>;

/// Interpret an operand attribute as an integer payload. Invalid values
/// read as zero of their carried type.
fn as_int(operand: &Option<Attr>) -> Option<IntAttr> {
    match operand {
        Some(Attr::Int(attr)) => Some(attr.clone()),
        Some(Attr::Invalid(ty)) => {
            ty.bit_width()?;
            Some(IntAttr::with_type(0, ty.clone()))
        }
        _ => None,
    }
}

fn is_invalid(operand: &Option<Attr>) -> bool {
    matches!(operand, Some(Attr::Invalid(_)))
}

/// Attempt to fold an operation. `result_tys` are the types of the
/// operation's results; `operands` holds the known literal per operand or
/// `None` where the operand cannot be statically determined.
pub fn fold_op(kind: &OpKind, result_tys: &[Type], operands: &[Option<Attr>]) -> Option<FoldResults> {
    match kind {
        OpKind::Prim(prim) => {
            let result = fold_prim(*prim, result_tys.first()?, operands)?;
            Some(smallvec![result])
        }
        // Everything else either has dedicated transfer handling or does
        // not fold (aggregate accessors, declarations, structure).
        _ => None,
    }
}

fn fold_prim(prim: PrimOp, result_ty: &Type, operands: &[Option<Attr>]) -> Option<FoldResult> {
    use PrimOp::*;

    let int_result = |bits: u128| -> Option<FoldResult> {
        Some(FoldResult::Attr(Attr::Int(IntAttr::with_type(
            bits,
            result_ty.clone(),
        ))))
    };
    let invalid_result = || Some(FoldResult::Attr(Attr::Invalid(result_ty.clone())));

    // Width-changing ops propagate invalid rather than reading it as zero.
    if matches!(prim, Pad(_) | Shl(_) | Shr(_) | Bits(..)) && is_invalid(&operands[0]) {
        return invalid_result();
    }

    // Constants wider than the representable maximum degrade to "no fold".
    let width = result_ty.bit_width()?;
    if width > MAX_CONST_WIDTH {
        return None;
    }

    match prim {
        Mux => {
            if let Some(sel) = as_int(&operands[0]) {
                return Some(if sel.is_zero() {
                    FoldResult::Operand(2)
                } else {
                    FoldResult::Operand(1)
                });
            }
            // Selector unknown but both arms explicitly undefined: the
            // result is undefined either way.
            if is_invalid(&operands[1]) && is_invalid(&operands[2]) {
                return invalid_result();
            }
            None
        }
        And => {
            let a = as_int(&operands[0]);
            let b = as_int(&operands[1]);
            // Zero annihilates regardless of the other side.
            if a.as_ref().is_some_and(IntAttr::is_zero) || b.as_ref().is_some_and(IntAttr::is_zero) {
                return int_result(0);
            }
            let (a, b) = (a?, b?);
            int_result((a.as_i128() as u128) & (b.as_i128() as u128))
        }
        Or => {
            let (a, b) = (as_int(&operands[0])?, as_int(&operands[1])?);
            int_result((a.as_i128() as u128) | (b.as_i128() as u128))
        }
        Xor => {
            let (a, b) = (as_int(&operands[0])?, as_int(&operands[1])?);
            int_result((a.as_i128() as u128) ^ (b.as_i128() as u128))
        }
        Not => {
            let a = as_int(&operands[0])?;
            int_result(!(a.as_i128() as u128))
        }
        Add => {
            let (a, b) = (as_int(&operands[0])?, as_int(&operands[1])?);
            int_result((a.as_i128() as u128).wrapping_add(b.as_i128() as u128))
        }
        Sub => {
            let (a, b) = (as_int(&operands[0])?, as_int(&operands[1])?);
            int_result((a.as_i128() as u128).wrapping_sub(b.as_i128() as u128))
        }
        Mul => {
            // Multiply annihilates on zero without the other operand.
            let a = as_int(&operands[0]);
            let b = as_int(&operands[1]);
            if a.as_ref().is_some_and(IntAttr::is_zero) || b.as_ref().is_some_and(IntAttr::is_zero) {
                return int_result(0);
            }
            let (a, b) = (a?, b?);
            int_result((a.as_i128() as u128).wrapping_mul(b.as_i128() as u128))
        }
        Div => {
            let (a, b) = (as_int(&operands[0])?, as_int(&operands[1])?);
            if b.is_zero() {
                return None;
            }
            if result_ty.is_signed() {
                let q = a.as_i128().checked_div(b.as_i128())?;
                int_result(q as u128)
            } else {
                int_result(a.as_u128() / b.as_u128())
            }
        }
        Neg => {
            let a = as_int(&operands[0])?;
            int_result(0u128.wrapping_sub(a.as_i128() as u128))
        }
        Eq | Neq | Lt | Leq | Gt | Geq => {
            let (a, b) = (as_int(&operands[0])?, as_int(&operands[1])?);
            let signed = a.ty().is_signed();
            let cmp = if signed {
                a.as_i128().cmp(&b.as_i128())
            } else {
                a.as_u128().cmp(&b.as_u128())
            };
            let truth = match prim {
                Eq => cmp.is_eq(),
                Neq => cmp.is_ne(),
                Lt => cmp.is_lt(),
                Leq => cmp.is_le(),
                Gt => cmp.is_gt(),
                Geq => cmp.is_ge(),
                _ => unreachable!(),
            };
            int_result(truth as u128)
        }
        Cat => {
            let (a, b) = (as_int(&operands[0])?, as_int(&operands[1])?);
            int_result((a.as_u128() << b.width()) | b.as_u128())
        }
        Pad(_) => {
            let a = as_int(&operands[0])?;
            if width >= a.width() {
                Some(FoldResult::Attr(Attr::Int(a.extended(width, result_ty.clone()))))
            } else {
                Some(FoldResult::Attr(Attr::Int(a.truncated(width, result_ty.clone()))))
            }
        }
        Shl(n) => {
            let a = as_int(&operands[0])?;
            if n >= 128 {
                return int_result(0);
            }
            int_result(a.as_u128() << n)
        }
        Shr(n) => {
            let a = as_int(&operands[0])?;
            let shifted = if a.ty().is_signed() {
                (a.as_i128() >> n.min(127)) as u128
            } else if n >= 128 {
                0
            } else {
                a.as_u128() >> n
            };
            int_result(shifted)
        }
        Bits(_, lo) => {
            let a = as_int(&operands[0])?;
            if lo >= 128 {
                return int_result(0);
            }
            int_result(a.as_u128() >> lo)
        }
    }
}
