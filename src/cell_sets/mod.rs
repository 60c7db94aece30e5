//! # Cell Sets
//!
//! - [`store`] - where an experiment's cell set forest comes from
//! - [`resolver`] - symbolic comparison references to concrete cell ids

pub mod resolver;
pub mod store;

pub use resolver::{
    CellSetResolver, ComparisonQuery, ComparisonType, ResolvedComparison,
};
pub use store::{CellSetStore, FileCellSetStore, InMemoryCellSetStore};
