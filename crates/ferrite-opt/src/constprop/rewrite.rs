//! Post-fixpoint rewrite
//!
//! Consumes the converged lattice map and mutates each executable module:
//! known-constant values get a materialized constant operation (one per
//! distinct attribute/type pair per module, inserted at the top of the
//! body), uses are redirected to it, and operations left without users
//! are erased walking the body bottom-up so producer chains collapse in a
//! single pass.
//!
//! Modules are rewritten in parallel: each rewrite reads the shared
//! lattice map and touches only its own module's arenas.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;

use ferrite_ir::attr::{Attr, IntAttr};
use ferrite_ir::circuit::{Circuit, Module, OpId, ValueId};
use ferrite_ir::loc::SourceLoc;
use ferrite_ir::ops::{NameKind, OpKind};
use ferrite_ir::types::Type;

use super::lattice::LatticeValue;
use super::solver::Analysis;

/// Optimization statistics reported by one pass invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConstPropStats {
    /// Operations whose results were replaced by materialized constants.
    pub ops_folded: usize,
    /// Operations and connects erased as dead.
    pub ops_erased: usize,
}

impl ConstPropStats {
    fn merge(self, other: ConstPropStats) -> ConstPropStats {
        ConstPropStats {
            ops_folded: self.ops_folded + other.ops_folded,
            ops_erased: self.ops_erased + other.ops_erased,
        }
    }
}

pub fn rewrite_circuit(circuit: &mut Circuit, analysis: &Analysis) -> ConstPropStats {
    let stats = circuit
        .modules_mut()
        .par_iter_mut()
        .map(|module| rewrite_module(module, analysis))
        .reduce(ConstPropStats::default, ConstPropStats::merge);
    tracing::debug!(
        folded = stats.ops_folded,
        erased = stats.ops_erased,
        "rewrite complete"
    );
    stats
}

/// Wires and registers we are allowed to delete: droppable name, not
/// protected.
fn is_deletable_wire_or_reg(module: &Module, op: OpId) -> bool {
    let op_data = module.op(op);
    if !op_data.kind.is_wire_or_reg() {
        return false;
    }
    if op_data.kind.name_kind() != Some(NameKind::Droppable) {
        return false;
    }
    !module.is_protected(op_data.results[0])
}

fn all_results_unused(module: &Module, op: OpId) -> bool {
    module.op(op).results.iter().all(|&r| !module.has_uses(r))
}

/// Dead-code policy: side-effect-free expressions and deletable
/// wires/registers go once unused, protected results never do.
fn erasable_when_unused(module: &Module, op: OpId) -> bool {
    let op_data = module.op(op);
    if op_data.results.iter().any(|&r| module.is_protected(r)) {
        return false;
    }
    op_data.kind.is_trivially_dead_when_unused() || is_deletable_wire_or_reg(module, op)
}

struct ModuleRewriter<'a> {
    module: &'a mut Module,
    analysis: &'a Analysis,
    /// Materialized constants, unique per (attribute, type) pair.
    pool: HashMap<(Attr, Type), ValueId>,
    stats: ConstPropStats,
}

impl<'a> ModuleRewriter<'a> {
    /// Fetch or materialize the constant op for `attr` at `ty`. Reuse
    /// fuses the requesting location into the existing op.
    fn materialized_const(&mut self, attr: Attr, ty: Type, loc: SourceLoc) -> ValueId {
        let key = (attr, ty);
        if let Some(&existing) = self.pool.get(&key) {
            let def = self
                .module
                .defining_op(existing)
                .expect("pooled constant has a defining op");
            self.module.fuse_loc(def, loc);
            return existing;
        }
        let (attr, ty) = key;
        let kind = match &attr {
            Attr::Int(int_attr) => {
                OpKind::Constant(IntAttr::with_type(int_attr.as_u128(), ty.clone()))
            }
            Attr::Invalid(_) => OpKind::Invalid,
            Attr::String(_) => unreachable!("only integer and invalid states are materialized"),
        };
        let op = self.module.prepend_op(kind, ty.clone(), loc);
        let result = self.module.op(op).results[0];
        self.pool.insert((attr, ty), result);
        result
    }

    /// If the value converged to a constant or an explicit invalid,
    /// redirect its uses to a materialized constant and report true.
    /// Connect destinations are exempt: substituting a location operand
    /// would corrupt assignment flow, and keeping it intact lets the
    /// connect itself be erased later.
    fn replace_value_if_possible(&mut self, value: ValueId) -> bool {
        let attr = match self.analysis.lattice_of(value) {
            LatticeValue::Constant(int_attr) => Attr::Int(int_attr.clone()),
            LatticeValue::InvalidValue(ty) => Attr::Invalid(ty.clone()),
            LatticeValue::Unknown | LatticeValue::Overdefined => return false,
        };
        let ty = self.module.value_type(value).clone();
        let loc = self
            .module
            .defining_op(value)
            .map(|op| self.module.op(op).loc.clone())
            .unwrap_or(SourceLoc::Unknown);
        let constant = self.materialized_const(attr, ty, loc);
        self.module.replace_uses_where(value, constant, |user, slot| {
            !(matches!(user.kind, OpKind::Connect) && slot == 0)
        });
        true
    }

    fn run(mut self) -> ConstPropStats {
        // Ports first: their lattice state was seeded before the walk.
        let ports: Vec<ValueId> = self.module.ports().iter().map(|p| p.value).collect();
        for port in ports {
            self.replace_value_if_possible(port);
        }

        // Bottom-up: erasing a consumer first exposes its producers as
        // dead within the same pass.
        let body: Vec<OpId> = self.module.body().collect();
        for &op in body.iter().rev() {
            match &self.module.op(op).kind {
                OpKind::Connect => {
                    let dest = self.module.op(op).operands[0];
                    let deletable = self
                        .module
                        .defining_op(dest)
                        .is_some_and(|dest_def| is_deletable_wire_or_reg(self.module, dest_def));
                    if deletable && !self.analysis.is_overdefined(dest) {
                        self.module.erase_op(op);
                        self.stats.ops_erased += 1;
                    }
                    continue;
                }
                OpKind::Instance { .. } => {}
                _ if self.module.op(op).results.len() == 1 => {}
                // Only single-result expressions and instances fold.
                _ => continue,
            }

            // Already dead without any folding.
            if all_results_unused(self.module, op) && erasable_when_unused(self.module, op) {
                self.module.erase_op(op);
                self.stats.ops_erased += 1;
                continue;
            }

            // Materialized literals are never re-folded.
            if matches!(self.module.op(op).kind, OpKind::Constant(_) | OpKind::Invalid) {
                continue;
            }

            let results: Vec<ValueId> = self.module.op(op).results.to_vec();
            let mut folded_any = false;
            for result in results {
                folded_any |= self.replace_value_if_possible(result);
            }
            if folded_any {
                self.stats.ops_folded += 1;
            }

            if folded_any
                && all_results_unused(self.module, op)
                && erasable_when_unused(self.module, op)
            {
                self.module.erase_op(op);
                self.stats.ops_erased += 1;
            }
        }

        // Constants materialized during the walk (or for values with no
        // substitutable uses) can themselves end up unused; one reverse
        // sweep over the final body collects them and anything they expose.
        let body: Vec<OpId> = self.module.body().collect();
        for &op in body.iter().rev() {
            if all_results_unused(self.module, op) && erasable_when_unused(self.module, op) {
                self.module.erase_op(op);
                self.stats.ops_erased += 1;
            }
        }

        self.stats
    }
}

fn rewrite_module(module: &mut Module, analysis: &Analysis) -> ConstPropStats {
    // Unreachable modules were never analyzed; leave them untouched.
    if !analysis.is_executable(module.id()) {
        return ConstPropStats::default();
    }
    ModuleRewriter {
        module,
        analysis,
        pool: HashMap::new(),
        stats: ConstPropStats::default(),
    }
    .run()
}
