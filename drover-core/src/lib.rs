//! Drover Core
//!
//! Core types and abstractions for the Drover build orchestrator.
//!
//! This crate contains:
//! - Domain types: events, projects, pipelines and the cluster workload model
//! - Resource quantities: parsing of cluster resource amounts ("500m", "1Gi")

pub mod domain;
pub mod quantity;

pub use quantity::{Quantity, QuantityError};
