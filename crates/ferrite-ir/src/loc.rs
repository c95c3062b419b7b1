//! Source locations
//!
//! Locations are advisory: they survive rewrites so diagnostics and debug
//! output can point back at the input. Merging two operations (constant
//! deduplication) fuses their locations.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceLoc {
    Unknown,
    FileLineCol {
        file: Arc<str>,
        line: u32,
        col: u32,
    },
    /// Several origins folded into one operation.
    Fused(Vec<SourceLoc>),
}

impl SourceLoc {
    pub fn new(file: impl Into<Arc<str>>, line: u32, col: u32) -> Self {
        SourceLoc::FileLineCol {
            file: file.into(),
            line,
            col,
        }
    }

    /// Combine two locations. Unknown contributes nothing; identical
    /// locations collapse; everything else accumulates into a fused list.
    pub fn fuse(self, other: SourceLoc) -> SourceLoc {
        match (self, other) {
            (SourceLoc::Unknown, loc) | (loc, SourceLoc::Unknown) => loc,
            (a, b) if a == b => a,
            (SourceLoc::Fused(mut locs), SourceLoc::Fused(more)) => {
                for loc in more {
                    if !locs.contains(&loc) {
                        locs.push(loc);
                    }
                }
                SourceLoc::Fused(locs)
            }
            (SourceLoc::Fused(mut locs), b) => {
                if !locs.contains(&b) {
                    locs.push(b);
                }
                SourceLoc::Fused(locs)
            }
            (a, SourceLoc::Fused(mut locs)) => {
                if !locs.contains(&a) {
                    locs.insert(0, a);
                }
                SourceLoc::Fused(locs)
            }
            (a, b) => SourceLoc::Fused(vec![a, b]),
        }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLoc::Unknown => write!(f, "<unknown>"),
            SourceLoc::FileLineCol { file, line, col } => write!(f, "{file}:{line}:{col}"),
            SourceLoc::Fused(locs) => {
                write!(f, "fused[")?;
                for (i, loc) in locs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{loc}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Default for SourceLoc {
    fn default() -> Self {
        SourceLoc::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuse_unknown_is_identity() {
        let loc = SourceLoc::new("top.fir", 3, 1);
        assert_eq!(SourceLoc::Unknown.fuse(loc.clone()), loc.clone());
        assert_eq!(loc.clone().fuse(SourceLoc::Unknown), loc);
    }

    #[test]
    fn test_fuse_identical_collapses() {
        let loc = SourceLoc::new("top.fir", 3, 1);
        assert_eq!(loc.clone().fuse(loc.clone()), loc);
    }

    #[test]
    fn test_fuse_accumulates_without_duplicates() {
        let a = SourceLoc::new("a.fir", 1, 1);
        let b = SourceLoc::new("b.fir", 2, 2);
        let fused = a.clone().fuse(b.clone());
        assert_eq!(fused.clone().fuse(b), fused);
        match fused {
            SourceLoc::Fused(locs) => assert_eq!(locs.len(), 2),
            other => panic!("expected fused location, got {other:?}"),
        }
    }
}
