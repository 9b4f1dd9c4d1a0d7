//! Duplicate detection: direct library hits, translation-linkage graph
//! hits, and companion-server lookups, plus the synthesis of resolution
//! options offered to the operator.

mod detector;
mod options;

pub use detector::{
    DuplicateCheckResult, DuplicateDetector, DuplicateHit, LinkedLibraryHit,
};
pub use options::resolution_options;
