//! Fixpoint solver
//!
//! Drives the sparse conditional dataflow analysis: an executable-set
//! tracker over module bodies, a worklist of values whose lattice state
//! changed, and per-operation-kind transfer functions. All state lives in
//! the [`Solver`] struct and is dropped when one invocation finishes.

use std::collections::HashMap;

use indexmap::IndexSet;
use smallvec::SmallVec;
use thiserror::Error;

use ferrite_ir::attr::{Attr, MAX_CONST_WIDTH};
use ferrite_ir::circuit::{Circuit, Direction, ModuleId, OpId, ValueDef, ValueId};
use ferrite_ir::fold::{fold_op, FoldResult};
use ferrite_ir::graph::{InstanceGraph, ResolvedModule};
use ferrite_ir::loc::SourceLoc;
use ferrite_ir::ops::OpKind;
use ferrite_ir::types::Type;

use super::lattice::LatticeValue;

#[derive(Debug, Error)]
pub enum ConstPropError {
    /// A connect targets a destination kind the transfer functions do not
    /// recognize. The input is malformed beyond what an optimization pass
    /// tolerates; compilation should abort.
    #[error("connect at {loc} targets an unsupported destination")]
    UnhandledConnect { loc: SourceLoc },
    /// The worklist failed to drain within the step budget. Fold hooks are
    /// replace-not-merge, so termination is empirical rather than a
    /// lattice guarantee; the cap turns a hang into a diagnostic.
    #[error("constant propagation did not converge after {steps} worklist steps")]
    FixpointOverrun { steps: usize },
}

/// The converged result of the analysis phase: a read-only lattice map
/// plus the set of reachable module bodies. The rewrite phase consumes
/// this without further mutation.
#[derive(Debug)]
pub struct Analysis {
    lattice: HashMap<ValueId, LatticeValue>,
    executable: IndexSet<ModuleId>,
}

static UNKNOWN: LatticeValue = LatticeValue::Unknown;

impl Analysis {
    pub fn lattice_of(&self, value: ValueId) -> &LatticeValue {
        self.lattice.get(&value).unwrap_or(&UNKNOWN)
    }

    pub fn is_overdefined(&self, value: ValueId) -> bool {
        self.lattice_of(value).is_overdefined()
    }

    pub fn is_executable(&self, module: ModuleId) -> bool {
        self.executable.contains(&module)
    }
}

pub struct Solver<'a> {
    circuit: &'a Circuit,
    instance_graph: &'a InstanceGraph,
    lattice: HashMap<ValueId, LatticeValue>,
    /// Module bodies proven reachable from the public roots.
    executable: IndexSet<ModuleId>,
    /// Values whose lattice state changed and whose users need revisiting.
    worklist: Vec<ValueId>,
    /// Formal output-port value -> values exposed at each instantiation
    /// site. Append-only for the life of the run.
    port_forwards: HashMap<ValueId, SmallVec<[ValueId; 2]>>,
}

impl<'a> Solver<'a> {
    pub fn new(circuit: &'a Circuit, instance_graph: &'a InstanceGraph) -> Self {
        Solver {
            circuit,
            instance_graph,
            lattice: HashMap::new(),
            executable: IndexSet::new(),
            worklist: Vec::new(),
            port_forwards: HashMap::new(),
        }
    }

    /// Run to a global fixpoint and hand back the converged state.
    pub fn solve(mut self) -> Result<Analysis, ConstPropError> {
        let circuit = self.circuit;

        // Public modules are live by definition, with unknown callers: all
        // of their ports start out overdefined.
        for module in circuit.modules() {
            if module.is_public() {
                self.mark_block_executable(module.id());
                for port in module.ports() {
                    self.mark_overdefined(port.value);
                }
            }
        }

        // Fold hooks replace rather than merge, so the step budget is the
        // termination guarantee of last resort.
        let max_steps = circuit.num_values().saturating_mul(16) + 1024;
        let mut steps = 0usize;

        while let Some(changed) = self.worklist.pop() {
            steps += 1;
            if steps > max_steps {
                return Err(ConstPropError::FixpointOverrun { steps });
            }
            for &user in circuit.users(changed) {
                if self.executable.contains(&user.module) {
                    self.visit_operation(user)?;
                }
            }
        }

        tracing::debug!(
            values = self.lattice.len(),
            executable = self.executable.len(),
            steps,
            "constant propagation converged"
        );

        Ok(Analysis {
            lattice: self.lattice,
            executable: self.executable,
        })
    }

    fn is_overdefined(&self, value: ValueId) -> bool {
        self.lattice
            .get(&value)
            .is_some_and(LatticeValue::is_overdefined)
    }

    fn mark_overdefined(&mut self, value: ValueId) {
        let entry = self.lattice.entry(value).or_default();
        if !entry.is_overdefined() {
            *entry = LatticeValue::Overdefined;
            self.worklist.push(value);
        }
    }

    /// Protected values refuse precise states: anything below overdefined
    /// flowing into them is escalated first. Instance results are exempt
    /// (protection on an instance pins the instance, not its ports).
    fn guard_protected(&self, value: ValueId, source: LatticeValue) -> LatticeValue {
        if source.is_overdefined() || !self.circuit.is_protected(value) {
            return source;
        }
        let is_instance_result = self
            .circuit
            .defining_op(value)
            .map(|op| matches!(self.circuit.op(op).kind, OpKind::Instance { .. }))
            .unwrap_or(false);
        if is_instance_result {
            source
        } else {
            LatticeValue::Overdefined
        }
    }

    /// Accumulating merge for confluence points. Queues users on change.
    fn merge_lattice_value(&mut self, value: ValueId, source: LatticeValue) {
        if source.is_unknown() {
            return;
        }
        let source = self.guard_protected(value, source);
        let entry = self.lattice.entry(value).or_default();
        if entry.merge_in(&source) {
            self.worklist.push(value);
        }
    }

    /// Merge the current state of `from` into `value`.
    fn merge_from_value(&mut self, value: ValueId, from: ValueId) {
        // Nothing computed for `from` yet means unknown: do nothing.
        let Some(source) = self.lattice.get(&from).cloned() else {
            return;
        };
        self.merge_lattice_value(value, source);
    }

    /// Replacement write for single-producer results recomputed by fold
    /// hooks. Successive folds over changing operands are not monotonic,
    /// so the previous state is overwritten, not merged.
    fn set_lattice_value(&mut self, value: ValueId, source: LatticeValue) {
        if source.is_unknown() {
            return;
        }
        let source = self.guard_protected(value, source);
        let entry = self.lattice.entry(value).or_default();
        if *entry != source {
            *entry = source;
            self.worklist.push(value);
        }
    }

    /// The state of `value` viewed at `dest_ty`: constants widen per their
    /// own signedness, invalids retype, narrower destinations without
    /// permission to truncate (and statically unknown widths) saturate.
    fn extended_view(&self, value: ValueId, dest_ty: &Type, allow_truncation: bool) -> LatticeValue {
        let Some(current) = self.lattice.get(&value) else {
            return LatticeValue::Unknown;
        };
        match current {
            LatticeValue::Unknown | LatticeValue::Overdefined => current.clone(),
            LatticeValue::InvalidValue(_) => LatticeValue::InvalidValue(dest_ty.clone()),
            LatticeValue::Constant(attr) => {
                // Clock/reset constants have no width to adjust.
                if matches!(attr.ty(), Type::Clock | Type::Reset) {
                    return current.clone();
                }
                let Some(dest_width) = dest_ty.bit_width() else {
                    return LatticeValue::Overdefined;
                };
                if dest_width > MAX_CONST_WIDTH {
                    return LatticeValue::Overdefined;
                }
                let width = attr.width();
                if dest_width == width {
                    current.clone()
                } else if dest_width > width {
                    LatticeValue::Constant(attr.extended(dest_width, dest_ty.clone()))
                } else if allow_truncation {
                    LatticeValue::Constant(attr.truncated(dest_width, dest_ty.clone()))
                } else {
                    LatticeValue::Overdefined
                }
            }
        }
    }

    /// Mark a module body executable. Idempotent; the first call scans the
    /// body once, seeding nullary producers and hooking up instances.
    fn mark_block_executable(&mut self, module: ModuleId) {
        if !self.executable.insert(module) {
            return;
        }
        let circuit = self.circuit;
        for op in circuit.module(module).body() {
            match &circuit.op(op).kind {
                OpKind::Constant(attr) => {
                    let result = circuit.op(op).results[0];
                    self.merge_lattice_value(result, LatticeValue::Constant(attr.clone()));
                }
                OpKind::Invalid => {
                    let result = circuit.op(op).results[0];
                    let ty = circuit.value_type(result).clone();
                    self.merge_lattice_value(result, LatticeValue::InvalidValue(ty));
                }
                OpKind::Wire { .. } | OpKind::Reg { .. } => self.mark_wire_or_reg(op),
                OpKind::RegReset { .. } => self.mark_reg_reset(op),
                OpKind::Instance { .. } => self.mark_instance(op),
                OpKind::Mem { .. } => {
                    for &result in circuit.op(op).results.iter() {
                        self.mark_overdefined(result);
                    }
                }
                // Everything else has operands and is visited through the
                // worklist once they resolve.
                _ => {}
            }
        }
    }

    /// Wires and resetless registers start explicitly undefined and are
    /// upgraded by connects. Aggregates are beyond this analysis.
    fn mark_wire_or_reg(&mut self, op: OpId) {
        let result = self.circuit.op(op).results[0];
        let ty = self.circuit.value_type(result).clone();
        if ty.is_aggregate() {
            return self.mark_overdefined(result);
        }
        self.merge_lattice_value(result, LatticeValue::InvalidValue(ty));
    }

    /// Re-derive a reset register: the reset value merges in only while
    /// the reset could actually be asserted (overdefined or a nonzero
    /// constant). Revisited whenever either operand changes.
    fn mark_reg_reset(&mut self, op: OpId) {
        let result = self.circuit.op(op).results[0];
        let ty = self.circuit.value_type(result).clone();
        if ty.is_aggregate() {
            return self.mark_overdefined(result);
        }
        let reset_signal = self.circuit.op(op).operands[1];
        let reset_value = self.circuit.op(op).operands[2];

        let src = self.extended_view(reset_value, &ty, true);
        let enable = self.extended_view(reset_signal, &ty, true);
        if enable.is_overdefined() || enable.constant().is_some_and(|c| !c.is_zero()) {
            self.merge_lattice_value(result, src);
        }
    }

    /// Instances have no operands and are scanned exactly once, when their
    /// enclosing body turns executable. This is where the port-forwarding
    /// edges come from.
    fn mark_instance(&mut self, op: OpId) {
        let circuit = self.circuit;
        let target = match self.instance_graph.resolve(circuit, op) {
            ResolvedModule::External(ext) => {
                // Opaque body: every non-input result is anyone's guess.
                for (index, &result) in circuit.op(op).results.iter().enumerate() {
                    if circuit.module(ext).port_direction(index) == Direction::In {
                        continue;
                    }
                    self.mark_overdefined(result);
                }
                return;
            }
            ResolvedModule::Concrete(target) => target,
        };

        self.mark_block_executable(target);

        for (index, &result) in circuit.op(op).results.iter().enumerate() {
            // Input ports are driven by connects at this site; nothing to
            // forward until those are seen.
            if circuit.module(target).port_direction(index) == Direction::In {
                continue;
            }
            if circuit.value_type(result).is_aggregate() {
                self.mark_overdefined(result);
                continue;
            }

            let formal = circuit.module(target).ports()[index].value;
            if circuit.is_protected(formal) {
                self.mark_overdefined(formal);
            }
            self.port_forwards.entry(formal).or_default().push(result);

            // The body may already have driven this port.
            self.merge_from_value(result, formal);
        }
    }

    /// Assignment: merge the source's view into whatever location the
    /// destination names.
    fn visit_connect(&mut self, op: OpId) -> Result<(), ConstPropError> {
        let dest = self.circuit.op(op).operands[0];
        let src = self.circuit.op(op).operands[1];
        let dest_ty = self.circuit.value_type(dest).passive();

        let src_value = self.extended_view(src, &dest_ty, false);
        if src_value.is_unknown() {
            return Ok(());
        }

        let Some(dest_def) = self.circuit.defining_op(dest) else {
            // Module output port: propagate to every instantiation site,
            // and the port itself behaves wire-like for internal readers.
            let forwards: SmallVec<[ValueId; 2]> = self
                .port_forwards
                .get(&dest)
                .map(|f| f.clone())
                .unwrap_or_default();
            for actual in forwards {
                self.merge_lattice_value(actual, src_value.clone());
            }
            self.merge_lattice_value(dest, src_value);
            return Ok(());
        };

        match &self.circuit.op(dest_def).kind {
            OpKind::Wire { .. } | OpKind::Reg { .. } | OpKind::RegReset { .. } => {
                self.merge_lattice_value(dest, src_value);
                Ok(())
            }
            OpKind::Instance { .. } => {
                // The instance-side value is wire-like, and the drive also
                // crosses into the referenced module's input port.
                self.merge_lattice_value(dest, src_value.clone());
                if let ResolvedModule::Concrete(target) =
                    self.instance_graph.resolve(self.circuit, dest_def)
                {
                    let ValueDef::OpResult { index, .. } =
                        self.circuit.module(dest.module).value(dest).def
                    else {
                        unreachable!("instance result is an op result");
                    };
                    let formal = self.circuit.module(target).ports()[index as usize].value;
                    self.merge_lattice_value(formal, src_value);
                }
                Ok(())
            }
            OpKind::Subfield { .. } | OpKind::Subindex { .. } => {
                let root = self.circuit.module(dest.module).aggregate_root(dest);
                let root_is_mem = self
                    .circuit
                    .defining_op(root)
                    .map(|root_op| matches!(self.circuit.op(root_op).kind, OpKind::Mem { .. }))
                    .unwrap_or(false);
                if root_is_mem {
                    // Memories are always overdefined; their drives carry
                    // no information.
                    return Ok(());
                }
                self.mark_overdefined(src);
                self.mark_overdefined(dest);
                Ok(())
            }
            // Diagnose at the destination's declaration.
            _ => Err(ConstPropError::UnhandledConnect {
                loc: self.circuit.op(dest_def).loc.clone(),
            }),
        }
    }

    /// Transfer function dispatch, invoked when an operand of `op` changed
    /// state (and once per op as its block turns executable, for kinds
    /// with dedicated marking).
    fn visit_operation(&mut self, op: OpId) -> Result<(), ConstPropError> {
        match &self.circuit.op(op).kind {
            OpKind::Connect => return self.visit_connect(op),
            OpKind::RegReset { .. } => {
                self.mark_reg_reset(op);
                return Ok(());
            }
            // A clock change does not change the register's value.
            OpKind::Reg { .. } => return Ok(()),
            OpKind::Node { .. } => {
                let result = self.circuit.op(op).results[0];
                let input = self.circuit.op(op).operands[0];
                self.merge_from_value(result, input);
                return Ok(());
            }
            // Nullary kinds were handled when the block went live.
            OpKind::Constant(_) | OpKind::Invalid | OpKind::Wire { .. } | OpKind::Instance { .. }
            | OpKind::Mem { .. } => return Ok(()),
            OpKind::Subfield { .. } | OpKind::Subindex { .. } | OpKind::Prim(_) => {}
        }

        let results: SmallVec<[ValueId; 2]> = SmallVec::from_slice(&self.circuit.op(op).results);

        // Saturation short-circuit: nothing left to refine.
        if results.iter().all(|&r| self.is_overdefined(r)) {
            return Ok(());
        }

        // Gather operand attributes for the fold hook. An unknown operand
        // means this visit is premature; wait for it to resolve.
        let mut operand_attrs: SmallVec<[Option<Attr>; 4]> = SmallVec::new();
        for &operand in self.circuit.op(op).operands.iter() {
            match self.lattice.get(&operand).unwrap_or(&UNKNOWN) {
                LatticeValue::Unknown => return Ok(()),
                LatticeValue::Constant(attr) => operand_attrs.push(Some(Attr::Int(attr.clone()))),
                LatticeValue::InvalidValue(ty) => operand_attrs.push(Some(Attr::Invalid(ty.clone()))),
                LatticeValue::Overdefined => operand_attrs.push(None),
            }
        }

        let result_tys: SmallVec<[Type; 2]> = results
            .iter()
            .map(|&r| self.circuit.value_type(r).clone())
            .collect();

        let Some(folded) = fold_op(&self.circuit.op(op).kind, &result_tys, &operand_attrs) else {
            // No fold under these operands: conservative saturation.
            for &result in &results {
                self.mark_overdefined(result);
            }
            return Ok(());
        };

        debug_assert_eq!(folded.len(), results.len(), "fold result arity mismatch");
        for (&result, fold_result) in results.iter().zip(folded) {
            let new_state = match fold_result {
                FoldResult::Attr(Attr::Int(attr)) => LatticeValue::Constant(attr),
                FoldResult::Attr(Attr::Invalid(ty)) => LatticeValue::InvalidValue(ty),
                // Only scalar integers are tracked precisely.
                FoldResult::Attr(_) => LatticeValue::Overdefined,
                // Folding to an operand yields that operand's current state.
                FoldResult::Operand(index) => {
                    let operand = self.circuit.op(op).operands[index];
                    self.lattice
                        .get(&operand)
                        .cloned()
                        .unwrap_or(LatticeValue::Unknown)
                }
            };
            self.set_lattice_value(result, new_state);
        }
        Ok(())
    }
}
