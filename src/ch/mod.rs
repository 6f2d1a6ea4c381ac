//! Contraction-hierarchy engine: preprocessing, per-worker scratch, and
//! the query algorithms built on the up/down topology.

pub mod contraction;
pub mod ordering;
pub mod query;
pub mod search;

pub use contraction::{contract, ChTopo, NO_MID};
pub use ordering::{ContractionParams, ImportanceQueue, ImportanceTerms};
pub use query::ChGraph;
pub use search::{QueryScratch, SearchState, NO_NODE};
