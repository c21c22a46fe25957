//! Testing infrastructure for plan correctness
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use matchplan::testing::prelude::*;
//!
//! // Drive a query through the pipeline, then
//! let violations = check_all_invariants(&query, &default_invariants());
//! assert!(violations.is_empty());
//! ```
//!
//! # Invariants
//!
//! - **UniqueTermIds**: no two term-bearing nodes share an id
//! - **OneSlotPerTermField**: every (term, field) binding has its own slot
//! - **BlueprintFrozen**: freezing reaches every blueprint node
//! - **EstimatesWithinLimit**: no estimate exceeds the doc-id limit

pub mod invariants;

pub use invariants::{
    check_all_invariants, default_invariants, BlueprintFrozen, EstimatesWithinLimit, Invariant,
    OneSlotPerTermField, UniqueTermIds, Violation,
};

/// Prelude for easy imports
pub mod prelude {
    pub use super::invariants::{check_all_invariants, default_invariants, Invariant, Violation};
}
