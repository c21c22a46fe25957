//! Driving a query through the planning pipeline

pub mod query;

pub use query::{Query, Stage};
