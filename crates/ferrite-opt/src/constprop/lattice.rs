//! Constant-propagation lattice
//!
//! Each tracked value sits in one of four states, ordered by information
//! content:
//!
//! ```text
//! Unknown < InvalidValue < Constant < Overdefined
//! ```
//!
//! `Unknown` means the value has not been reached yet. `InvalidValue` is
//! an explicitly undefined value (a legal state, distinct from "we know
//! nothing"): stateful declarations start here and can still be upgraded
//! to a constant. `Overdefined` is terminal.

use ferrite_ir::attr::IntAttr;
use ferrite_ir::types::Type;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LatticeValue {
    /// Not processed yet; may become anything.
    #[default]
    Unknown,
    /// Explicitly undefined, carrying its type.
    InvalidValue(Type),
    /// Known constant.
    Constant(IntAttr),
    /// Cannot be statically determined. Never leaves this state.
    Overdefined,
}

impl LatticeValue {
    pub fn is_unknown(&self) -> bool {
        matches!(self, LatticeValue::Unknown)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, LatticeValue::InvalidValue(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, LatticeValue::Constant(_))
    }

    pub fn is_overdefined(&self) -> bool {
        matches!(self, LatticeValue::Overdefined)
    }

    pub fn constant(&self) -> Option<&IntAttr> {
        match self {
            LatticeValue::Constant(attr) => Some(attr),
            _ => None,
        }
    }

    /// Position in the information order; used only for assertions and
    /// property tests.
    pub fn rank(&self) -> u8 {
        match self {
            LatticeValue::Unknown => 0,
            LatticeValue::InvalidValue(_) => 1,
            LatticeValue::Constant(_) => 2,
            LatticeValue::Overdefined => 3,
        }
    }

    /// Merge `rhs` into `self`, moving monotonically up the order.
    /// Returns true if `self` changed.
    ///
    /// Used at confluence points (multiply-driven wires, ports). Results
    /// recomputed by folding use replacement instead; see the solver.
    pub fn merge_in(&mut self, rhs: &LatticeValue) -> bool {
        // Already saturated, or nothing to learn.
        if self.is_overdefined() || rhs.is_unknown() {
            return false;
        }

        if self.is_unknown() {
            *self = rhs.clone();
            return true;
        }

        // An invalid on the right contributes nothing: we are already
        // invalid or better.
        if rhs.is_invalid() {
            return false;
        }

        // Invalid upgrades to whatever the right side knows.
        if self.is_invalid() {
            *self = rhs.clone();
            return true;
        }

        // Two constants: equal stays, different saturates. This is where
        // merging distinct per-instance-site drivers goes overdefined.
        if self != rhs {
            *self = LatticeValue::Overdefined;
            return true;
        }
        false
    }
}
