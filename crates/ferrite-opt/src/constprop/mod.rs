//! Intermodule constant propagation and dead-code elimination
//!
//! A sparse conditional constant propagation over the whole module
//! hierarchy. The analysis crosses instantiation boundaries in both
//! directions: constants driven into an instance's input ports flow into
//! the referenced module, and constants driven onto its output ports flow
//! back out to every instantiation site.
//!
//! # Architecture
//!
//! The pass proceeds in phases:
//! 1. **Instance graph construction**: resolve instantiation sites over
//!    the hierarchy.
//! 2. **Fixpoint analysis**: seed public-module ports as unknowable, mark
//!    bodies executable, and drain a worklist of lattice changes through
//!    per-operation transfer functions until nothing moves.
//! 3. **Rewrite**: per executable module (in parallel), materialize
//!    discovered constants, redirect uses, and erase dead operations
//!    bottom-up.
//!
//! # Example
//!
//! ```rust
//! use ferrite_ir::prelude::*;
//! use ferrite_opt::constprop::ConstProp;
//!
//! let mut circuit = Circuit::new("Top");
//! let top = circuit.add_module(
//!     "Top",
//!     true,
//!     vec![PortDecl::output("out", Type::UInt(Some(8)))],
//! );
//! let out = circuit.module(top).ports()[0].value;
//! let seven = circuit.add_constant(top, IntAttr::uint(8, 7));
//! let w = circuit.add_wire(top, "_t", Type::UInt(Some(8)), NameKind::Droppable);
//! circuit.add_connect(top, w, seven);
//! circuit.add_connect(top, out, w);
//!
//! let stats = ConstProp::new().run(&mut circuit).unwrap();
//! assert!(stats.ops_erased > 0);
//! ```

mod lattice;
mod rewrite;
mod solver;

pub use lattice::LatticeValue;
pub use rewrite::ConstPropStats;
pub use solver::{Analysis, ConstPropError, Solver};

use ferrite_ir::circuit::Circuit;
use ferrite_ir::graph::InstanceGraph;

/// The pass object. Stateless between invocations; all analysis state is
/// created fresh per run and dropped before the rewrite mutates the IR.
#[derive(Debug, Default)]
pub struct ConstProp;

impl ConstProp {
    pub fn new() -> Self {
        ConstProp
    }

    /// Analyze and rewrite the circuit. On error the circuit is
    /// unmodified: the analysis phase never mutates IR, and the rewrite
    /// only starts from a converged, error-free analysis.
    pub fn run(&self, circuit: &mut Circuit) -> Result<ConstPropStats, ConstPropError> {
        let span = tracing::debug_span!("constprop", circuit = %circuit.name);
        let _guard = span.enter();

        let instance_graph = InstanceGraph::build(circuit);
        let analysis = Solver::new(circuit, &instance_graph).solve()?;
        Ok(rewrite::rewrite_circuit(circuit, &analysis))
    }

    /// Run only the analysis phase, leaving the circuit untouched. Useful
    /// for inspecting converged lattice states.
    pub fn analyze(&self, circuit: &Circuit) -> Result<Analysis, ConstPropError> {
        let instance_graph = InstanceGraph::build(circuit);
        Solver::new(circuit, &instance_graph).solve()
    }

    /// Apply the rewrite for an already-converged analysis. Idempotent:
    /// a second application with the same analysis is a no-op on the IR.
    pub fn rewrite(&self, circuit: &mut Circuit, analysis: &Analysis) -> ConstPropStats {
        rewrite::rewrite_circuit(circuit, analysis)
    }
}
