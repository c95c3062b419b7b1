//! Instance graph
//!
//! Directed graph of the module hierarchy: an edge A -> B means module A
//! contains an instantiation of module B. Built once over a circuit and
//! consulted by passes to resolve instantiation sites and walk the
//! hierarchy from its public roots.

use indexmap::IndexMap;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction as PetDirection;

use crate::circuit::{Circuit, ModuleId, OpId};
use crate::ops::OpKind;

/// What an instantiation site refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedModule {
    /// A module whose body is defined in this circuit.
    Concrete(ModuleId),
    /// An opaque definition: only ports are known.
    External(ModuleId),
}

impl ResolvedModule {
    pub fn id(&self) -> ModuleId {
        match *self {
            ResolvedModule::Concrete(id) | ResolvedModule::External(id) => id,
        }
    }
}

#[derive(Debug)]
pub struct InstanceGraph {
    graph: DiGraphMap<ModuleId, ()>,
    /// Instantiation sites per target module, in discovery order.
    sites: IndexMap<ModuleId, Vec<OpId>>,
    roots: Vec<ModuleId>,
}

impl InstanceGraph {
    pub fn build(circuit: &Circuit) -> Self {
        let mut graph = DiGraphMap::new();
        let mut sites: IndexMap<ModuleId, Vec<OpId>> = IndexMap::new();
        let mut roots = Vec::new();

        for module in circuit.modules() {
            graph.add_node(module.id());
            if module.is_public() {
                roots.push(module.id());
            }
            for op in module.body() {
                if let OpKind::Instance { target, .. } = module.op(op).kind {
                    graph.add_edge(module.id(), target, ());
                    sites.entry(target).or_default().push(op);
                }
            }
        }

        InstanceGraph { graph, sites, roots }
    }

    /// Resolve an instantiation site to the module it embeds.
    pub fn resolve(&self, circuit: &Circuit, instance: OpId) -> ResolvedModule {
        let OpKind::Instance { target, .. } = circuit.op(instance).kind else {
            panic!("resolve called on a non-instance op");
        };
        match circuit.module(target).kind {
            crate::circuit::ModuleKind::Concrete => ResolvedModule::Concrete(target),
            crate::circuit::ModuleKind::External => ResolvedModule::External(target),
        }
    }

    /// Public modules: the always-live roots of the hierarchy.
    pub fn roots(&self) -> &[ModuleId] {
        &self.roots
    }

    /// All instantiation sites targeting the given module.
    pub fn instantiations_of(&self, module: ModuleId) -> &[OpId] {
        self.sites.get(&module).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_instantiated(&self, module: ModuleId) -> bool {
        self.graph
            .neighbors_directed(module, PetDirection::Incoming)
            .next()
            .is_some()
    }

    /// Modules reachable from the public roots, in depth-first order.
    pub fn reachable_from_roots(&self) -> Vec<ModuleId> {
        let mut visited = Vec::new();
        let mut stack: Vec<ModuleId> = self.roots.clone();
        while let Some(module) = stack.pop() {
            if visited.contains(&module) {
                continue;
            }
            visited.push(module);
            for next in self.graph.neighbors_directed(module, PetDirection::Outgoing) {
                stack.push(next);
            }
        }
        visited
    }
}
