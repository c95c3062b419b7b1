//! # Ferrite IR
//!
//! A hierarchical hardware intermediate representation: circuits of
//! modules, modules of typed operations, composed through instantiation.
//!
//! ## Modules
//!
//! - **[`types`]** - Ground and aggregate value types
//! - **[`attr`]** - Literal attributes exchanged with fold hooks
//! - **[`circuit`]** - Arena-based circuit/module/op storage and builders
//! - **[`ops`]** - Operation kinds and primitive result-type inference
//! - **[`fold`]** - Per-operation local constant folding
//! - **[`graph`]** - The instance graph over the module hierarchy
//! - **[`annotations`]** - JSON metadata side-table (protection markers)
//! - **[`printer`]** - Deterministic textual emission
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrite_ir::prelude::*;
//!
//! let mut circuit = Circuit::new("Adder");
//! let top = circuit.add_module(
//!     "Adder",
//!     true,
//!     vec![
//!         PortDecl::input("a", Type::UInt(Some(8))),
//!         PortDecl::output("b", Type::UInt(Some(9))),
//!     ],
//! );
//! let a = circuit.module(top).ports()[0].value;
//! let b = circuit.module(top).ports()[1].value;
//! let one = circuit.add_constant(top, IntAttr::uint(8, 1));
//! let sum = circuit.add_prim(top, PrimOp::Add, &[a, one]).unwrap();
//! circuit.add_connect(top, b, sum);
//! ```

pub mod annotations;
pub mod attr;
pub mod circuit;
pub mod fold;
pub mod graph;
pub mod loc;
pub mod ops;
pub mod printer;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::attr::{Attr, IntAttr};
    pub use crate::circuit::{
        Circuit, Direction, Module, ModuleId, ModuleKind, Op, OpId, Port, PortDecl, ValueDef, ValueId,
    };
    pub use crate::fold::{fold_op, FoldResult};
    pub use crate::graph::{InstanceGraph, ResolvedModule};
    pub use crate::loc::SourceLoc;
    pub use crate::ops::{NameKind, OpKind, PrimOp};
    pub use crate::printer::print_circuit;
    pub use crate::types::{BundleField, Type};
}

// Re-export main types at crate root for convenience
pub use attr::{Attr, IntAttr};
pub use circuit::{Circuit, Direction, Module, ModuleId, Op, OpId, PortDecl, ValueDef, ValueId};
pub use graph::{InstanceGraph, ResolvedModule};
pub use loc::SourceLoc;
pub use ops::{NameKind, OpKind, PrimOp};
pub use types::Type;
