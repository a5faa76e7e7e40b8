//! Error types for the consolidation solver.
//!
//! Capacity and placement errors are local to the allocation primitives and
//! never escape the genetic operators; scenario, configuration and sanity
//! errors are reported to the caller.

use thiserror::Error;

/// Rejected allocation: the server does not have room for the VM.
/// Raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "server {server} cannot host VM {vm}: cpu {cpu_req} > {cpu_avail} available or ram {ram_req} > {ram_avail} available"
)]
pub struct CapacityError {
    pub server: usize,
    pub vm: usize,
    pub cpu_req: u64,
    pub cpu_avail: u64,
    pub ram_req: u64,
    pub ram_avail: u64,
}

/// Why a chromosome could not be replayed into a capacity ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("VM {vm} is not assigned to any server")]
    Unassigned { vm: usize },

    #[error("VM {vm} references unknown server {server}")]
    UnknownServer { vm: usize, server: usize },

    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("chromosome has {genes} genes but the scenario has {vms} VMs")]
    LengthMismatch { genes: usize, vms: usize },
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid scenario JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid inventory CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("scenario has no servers")]
    Empty,

    #[error("{kind} ids must be contiguous and zero-based: found id {found} at position {position}")]
    NonContiguousIds {
        kind: &'static str,
        position: usize,
        found: usize,
    },

    #[error("VM {vm} has a zero resource demand")]
    ZeroDemand { vm: usize },

    #[error("server {server} has a zero resource capacity")]
    ZeroCapacity { server: usize },

    #[error(
        "VMs do not fit in the datacenter: cpu demand {cpu_demand} vs capacity {cpu_capacity}, ram demand {ram_demand} vs capacity {ram_capacity}"
    )]
    Infeasible {
        cpu_demand: u64,
        cpu_capacity: u64,
        ram_demand: u64,
        ram_capacity: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("population size must be at least 2, got {0}")]
    PopulationTooSmall(usize),

    #[error("elitism size {elitism} exceeds population size {population}")]
    ElitismTooLarge { elitism: usize, population: usize },

    #[error("max stagnant generations must be at least 1")]
    StagnationLimit,

    #[error("mutation probability must lie in [0, 1], got {0}")]
    MutationProbability(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanityError {
    #[error("population should have {expected} individuals but has {actual}")]
    PopulationSize { expected: usize, actual: usize },

    #[error("individual {index} should have {expected} genes but has {actual}")]
    GeneCount {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} id {id} appears more than once")]
    DuplicateId { kind: &'static str, id: usize },

    #[error("VM {vm} is hosted more than once on server {server}")]
    DuplicateHosting { vm: usize, server: usize },

    #[error("VM {vm} is hosted on server {actual} but the chromosome places it on {expected}")]
    StateMismatch {
        vm: usize,
        expected: usize,
        actual: usize,
    },

    #[error("VM {vm} appears in the {report} report on server {first} and on server {second}")]
    ReportDuplicate {
        report: &'static str,
        vm: usize,
        first: usize,
        second: usize,
    },

    #[error("logical and detailed reports disagree on VM {vm}")]
    ReportMismatch { vm: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sanity(#[from] SanityError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
