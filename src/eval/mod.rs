pub mod aggr;

pub use aggr::{Aggr, Aggregator};
