//! Query planning core of a search engine's matching subsystem
//!
//! A serialized query stack is turned into a typed tree, rewritten, bound to
//! concrete fields and match-data slots, compiled into a cost-annotated
//! [`blueprint::Blueprint`], optimized, frozen and finally instantiated as
//! search iterators. [`Query`] drives the whole pipeline.

pub mod blueprint;
pub mod config;
pub mod error;
pub mod eval;
pub mod match_data;
pub mod matching;
pub mod memory;
pub mod query;
pub mod search;
pub mod testing;

pub use config::{MatchingConfig, UnpackingFlags, UnpackingProfile};
pub use error::{MatchError, Result};
pub use match_data::{MatchData, MatchDataLayout, SlotHandle};
pub use matching::{Query, Stage};
pub use memory::{Document, MemoryIndex, MemorySearchContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
