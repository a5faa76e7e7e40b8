//! VM Consolidation Solver Library
//!
//! A genetic-algorithm solver for VM consolidation: place every virtual
//! machine on a physical server so that no server exceeds its CPU or RAM
//! capacity while using as few servers as possible (2D bin packing).
//!
//! # Features
//!
//! - Capacity ledger with atomic allocate / deallocate primitives
//! - Round-robin population seeding
//! - Crossovers: Consensus Partition (CPC), Dominant Anti-Cancer (DOAC), uniform
//! - Mutations: swap, Robin-Hood consolidation, smart move
//! - Scenario loading from JSON or VMware inventory CSV exports
//! - JSON / CSV reports and multi-seed strategy benchmarks
//!
//! # Example
//!
//! ```no_run
//! use vm_consolidation::genetic::{run, GAConfig, MutationStrategy};
//! use vm_consolidation::scenario::Scenario;
//!
//! let scenario = Scenario::from_json_file("scenario.json").unwrap();
//!
//! let config = GAConfig {
//!     mutation: MutationStrategy::RobinHood,
//!     ..Default::default()
//! };
//! let result = run(&scenario, &config).unwrap();
//!
//! println!("Servers used: {}", result.best_fitness);
//! ```

pub mod benchmark;
pub mod datacenter;
pub mod error;
pub mod genetic;
pub mod report;
pub mod sanity;
pub mod scenario;
pub mod solution;

pub use datacenter::{CapacityLedger, Server, Vm, UNASSIGNED};
pub use error::{Error, Result};
pub use scenario::Scenario;
pub use solution::Solution;
