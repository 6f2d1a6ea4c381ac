//! netreach: network accessibility metrics over static weighted graphs
//!
//! Pipeline:
//! - Validate an edge list and scale weights to 32-bit fixed-point
//! - Preprocess each weight vector into a contraction hierarchy
//! - Answer point-to-point, range, k-nearest-POI, and decay-weighted
//!   aggregation queries, fanned out across worker threads
//!
//! Key principle: everything queryable is immutable after construction.
//! Graphs, POI buckets, and the range cache are shared across threads
//! without locks; each worker owns its scratch.

pub mod aggregate;
pub mod cache;
pub mod ch;
pub mod error;
pub mod graph;
pub mod network;
pub mod poi;

pub use aggregate::{Aggregation, Decay};
pub use ch::{ChGraph, ChTopo, ContractionParams};
pub use error::{Error, Result};
pub use graph::SCALE;
pub use network::Network;
pub use poi::PoiIndex;
