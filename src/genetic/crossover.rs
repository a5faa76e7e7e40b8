//! Crossover operators for VM placement chromosomes.
//!
//! Recombining two feasible placements gene by gene almost never yields a
//! feasible child, because capacity is a joint constraint over all genes.
//! The consensus-partition and dominant/anti-cancer operators therefore
//! build each child against a private capacity ledger and repair conflicts
//! while recombining. Uniform crossover does not repair and only serves as a
//! diversity source.

use super::fitness::fitness;
use super::Chromosome;
use crate::datacenter::{CapacityLedger, Server, Vm, UNASSIGNED};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Crossover operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossoverStrategy {
    /// Consensus-Partition Crossover (CPC)
    ConsensusPartition,
    /// Dominant-Optimal-Anti-Cancer crossover (DOAC)
    DominantAntiCancer,
    /// Uniform gene-wise crossover, no repair
    Uniform,
}

impl CrossoverStrategy {
    pub const ALL: [CrossoverStrategy; 3] = [
        CrossoverStrategy::ConsensusPartition,
        CrossoverStrategy::DominantAntiCancer,
        CrossoverStrategy::Uniform,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CrossoverStrategy::ConsensusPartition => "cpc",
            CrossoverStrategy::DominantAntiCancer => "doac",
            CrossoverStrategy::Uniform => "uniform",
        }
    }

    /// Produce two children, each the length of the parents.
    pub fn cross<R: Rng + ?Sized>(
        &self,
        parent_a: &[usize],
        parent_b: &[usize],
        vms: &[Vm],
        servers: &[Server],
        rng: &mut R,
    ) -> (Chromosome, Chromosome) {
        match self {
            CrossoverStrategy::ConsensusPartition => (
                consensus_partition_child(parent_a, parent_b, vms, servers, rng),
                consensus_partition_child(parent_b, parent_a, vms, servers, rng),
            ),
            CrossoverStrategy::DominantAntiCancer => (
                dominant_anti_cancer_child(parent_a, parent_b, vms, servers),
                dominant_anti_cancer_child(parent_b, parent_a, vms, servers),
            ),
            CrossoverStrategy::Uniform => uniform_crossover(parent_a, parent_b, rng),
        }
    }
}

impl std::fmt::Display for CrossoverStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Uniform crossover: each gene comes from either parent with equal odds,
/// the second child takes the other one.
pub fn uniform_crossover<R: Rng + ?Sized>(parent_a: &[usize], parent_b: &[usize], rng: &mut R) -> (Chromosome, Chromosome) {
    let mut child_a = Vec::with_capacity(parent_a.len());
    let mut child_b = Vec::with_capacity(parent_b.len());

    for (&a, &b) in parent_a.iter().zip(parent_b) {
        if rng.gen_bool(0.5) {
            child_a.push(a);
            child_b.push(b);
        } else {
            child_a.push(b);
            child_b.push(a);
        }
    }

    (child_a, child_b)
}

/// Consensus-Partition Crossover, one child.
///
/// Genes where both parents agree are inherited first. The remaining
/// (conflict) VMs are placed in random order by worst fit on free RAM then
/// free CPU. A conflict VM that fits nowhere gets a random server id, which
/// leaves the child infeasible for the evaluator to penalise.
pub fn consensus_partition_child<R: Rng + ?Sized>(
    base: &[usize],
    guide: &[usize],
    vms: &[Vm],
    servers: &[Server],
    rng: &mut R,
) -> Chromosome {
    let mut child = vec![UNASSIGNED; vms.len()];
    let mut ledger = CapacityLedger::new(servers);
    let mut conflict = Vec::new();

    for (i, vm) in vms.iter().enumerate() {
        if base[i] == guide[i] && ledger.allocate(base[i], vm).is_ok() {
            child[i] = base[i];
        } else {
            // Disagreement, or an agreed gene that does not fit (infeasible parents).
            conflict.push(i);
        }
    }

    conflict.shuffle(rng);

    let all_servers: Vec<usize> = (0..servers.len()).collect();
    for i in conflict {
        let vm = &vms[i];
        let home = ledger.worst_fit(&all_servers, vm, |s| (s.ram_avail(), s.cpu_avail()));

        match home {
            Some(s) if ledger.allocate(s, vm).is_ok() => child[i] = s,
            _ => {
                log::warn!("CPC: conflict VM {} fits on no server", vm.id);
                if !servers.is_empty() {
                    child[i] = rng.gen_range(0..servers.len());
                }
            }
        }
    }

    child
}

/// Dominant-Optimal-Anti-Cancer crossover, one child.
///
/// 1. The fitter parent's largest active server is inherited with its VMs.
/// 2. Every other VM takes the gene of `primary` (even index) or
///    `secondary` (odd index) when it fits, else the feasible server with
///    the most free RAM.
/// 3. The child's weakest active server is evacuated into its other active
///    servers, all or nothing.
///
/// A child left incomplete or infeasible is discarded in favour of the
/// fitter parent.
pub fn dominant_anti_cancer_child(primary: &[usize], secondary: &[usize], vms: &[Vm], servers: &[Server]) -> Chromosome {
    let fitter = if fitness(primary, vms, servers) <= fitness(secondary, vms, servers) {
        primary
    } else {
        secondary
    };

    let mut child = vec![UNASSIGNED; vms.len()];
    let mut ledger = CapacityLedger::new(servers);

    // Dominant gene
    let fitter_active: BTreeSet<usize> = fitter.iter().copied().filter(|&s| s < servers.len()).collect();
    let dominant = fitter_active
        .iter()
        .copied()
        .max_by_key(|&s| (servers[s].capacity_weight(), Reverse(s)));

    if let Some(dominant) = dominant {
        for (i, vm) in vms.iter().enumerate() {
            if fitter[i] == dominant && ledger.allocate(dominant, vm).is_ok() {
                child[i] = dominant;
            }
        }
    }

    // Alternating fill
    let all_servers: Vec<usize> = (0..servers.len()).collect();
    for (i, vm) in vms.iter().enumerate() {
        if child[i] != UNASSIGNED {
            continue;
        }
        let proposed = if i % 2 == 0 { primary[i] } else { secondary[i] };
        if ledger.allocate(proposed, vm).is_ok() {
            child[i] = proposed;
            continue;
        }
        if let Some(s) = ledger.worst_fit(&all_servers, vm, |s| s.ram_avail()) {
            if ledger.allocate(s, vm).is_ok() {
                child[i] = s;
            }
        }
    }

    if anti_cancer_repair(&mut child, &mut ledger, vms) {
        log::debug!("DOAC: weakest server evacuated");
    }

    if child.contains(&UNASSIGNED) || fitness(&child, vms, servers).is_infinite() {
        return fitter.to_vec();
    }
    child
}

/// Move every VM off the child's weakest active server (smallest cpu + ram
/// capacity) into its other active servers by worst fit on free RAM.
///
/// Works on copies and commits only when every VM found a new home.
fn anti_cancer_repair(child: &mut Chromosome, ledger: &mut CapacityLedger, vms: &[Vm]) -> bool {
    let active = ledger.active_servers();
    if active.len() < 2 {
        return false;
    }

    let Some(weakest) = active
        .iter()
        .copied()
        .min_by_key(|&s| (ledger.slots()[s].capacity_weight(), s))
    else {
        return false;
    };
    let targets: Vec<usize> = active.iter().copied().filter(|&s| s != weakest).collect();
    let evacuees = ledger.slots()[weakest].hosted().to_vec();

    let mut trial_ledger = ledger.clone();
    let mut trial_child = child.clone();

    for vm_id in evacuees {
        let vm = &vms[vm_id];
        let Some(home) = trial_ledger.worst_fit(&targets, vm, |s| s.ram_avail()) else {
            return false;
        };
        if trial_ledger.allocate(home, vm).is_err() {
            return false;
        }
        trial_ledger.deallocate(weakest, vm);
        trial_child[vm_id] = home;
    }

    *ledger = trial_ledger;
    *child = trial_child;
    true
}
