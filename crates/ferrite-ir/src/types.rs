//! Hardware value types
//!
//! Ground types carry an optional bit width (`None` = not yet inferred).
//! Aggregates (bundles, vectors) exist so that passes can recognize and
//! conservatively skip them; no pass in this workspace is field-sensitive.

use std::fmt;

/// A field of a bundle type. `flip` reverses the flow direction of the
/// field relative to the bundle as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleField {
    pub name: String,
    pub flip: bool,
    pub ty: Type,
}

/// The type of an IR value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Unsigned integer with optional known width.
    UInt(Option<u32>),
    /// Signed integer with optional known width.
    SInt(Option<u32>),
    /// Clock signal.
    Clock,
    /// Reset signal.
    Reset,
    /// Record of named fields.
    Bundle(Vec<BundleField>),
    /// Homogeneous fixed-length array.
    Vector(Box<Type>, usize),
}

impl Type {
    /// A ground type is a scalar leaf: it carries a single value and can be
    /// tracked precisely by dataflow analyses.
    pub fn is_ground(&self) -> bool {
        matches!(self, Type::UInt(_) | Type::SInt(_) | Type::Clock | Type::Reset)
    }

    pub fn is_aggregate(&self) -> bool {
        !self.is_ground()
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::SInt(_))
    }

    /// Statically known bit width of an integer type. Clock and reset have
    /// no meaningful width; aggregates report the sum of their leaves only
    /// when fully known.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            Type::UInt(w) | Type::SInt(w) => *w,
            Type::Clock | Type::Reset => None,
            Type::Bundle(fields) => fields.iter().map(|f| f.ty.bit_width()).sum(),
            Type::Vector(elem, len) => elem.bit_width().map(|w| w * *len as u32),
        }
    }

    /// The passive view of a type: all flips stripped. Connect semantics
    /// compare source against the passive destination type.
    pub fn passive(&self) -> Type {
        match self {
            Type::Bundle(fields) => Type::Bundle(
                fields
                    .iter()
                    .map(|f| BundleField {
                        name: f.name.clone(),
                        flip: false,
                        ty: f.ty.passive(),
                    })
                    .collect(),
            ),
            Type::Vector(elem, len) => Type::Vector(Box::new(elem.passive()), *len),
            other => other.clone(),
        }
    }

    /// Field lookup for bundle types.
    pub fn field(&self, index: usize) -> Option<&BundleField> {
        match self {
            Type::Bundle(fields) => fields.get(index),
            _ => None,
        }
    }

    /// Element type for vector types.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Vector(elem, _) => Some(elem),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::UInt(Some(w)) => write!(f, "UInt<{w}>"),
            Type::UInt(None) => write!(f, "UInt"),
            Type::SInt(Some(w)) => write!(f, "SInt<{w}>"),
            Type::SInt(None) => write!(f, "SInt"),
            Type::Clock => write!(f, "Clock"),
            Type::Reset => write!(f, "Reset"),
            Type::Bundle(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if field.flip {
                        write!(f, "flip ")?;
                    }
                    write!(f, "{} : {}", field.name, field.ty)?;
                }
                write!(f, "}}")
            }
            Type::Vector(elem, len) => write!(f, "{elem}[{len}]"),
        }
    }
}
