//! Query tree and the rewriting passes run over it
//!
//! The tree is built from a serialized stack and then rewritten in a fixed
//! order before a blueprint is built from it:
//!
//! 1. [`tree_builder`]: stack to typed tree
//! 2. [`same_element`]: scope fields inside same-element groups
//! 3. [`location`]: inject the geo location term
//! 4. [`unpacking`]: choose unpacking strategies
//! 5. [`resolve_view`]: bind views to concrete fields
//! 6. [`reserve`]: reserve match-data slots

pub mod ast;
pub mod location;
pub mod reserve;
pub mod resolve_view;
pub mod same_element;
pub mod stack;
pub mod term_data;
pub mod tree_builder;
pub mod types;
pub mod unpacking;

pub use ast::{Node, NodeKind, Visit, VisitMut};
pub use location::{inject, Location, LocationSpec};
pub use resolve_view::{FieldInfo, FieldKind, IndexEnvironment, SimpleIndexEnvironment, ViewResolver};
pub use stack::StackDump;
pub use term_data::TermData;
pub use tree_builder::QueryTreeCreator;
pub use types::*;
