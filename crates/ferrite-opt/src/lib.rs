//! # Ferrite Opt
//!
//! Optimization passes over the ferrite hardware IR.
//!
//! ## Modules
//!
//! - **[`constprop`]** - Intermodule constant propagation and DCE

pub mod constprop;

pub use constprop::{ConstProp, ConstPropError, ConstPropStats, LatticeValue};
