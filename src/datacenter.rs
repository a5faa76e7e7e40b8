//! Datacenter entities and capacity bookkeeping.
//!
//! `Vm` and `Server` are immutable templates loaded once per scenario.
//! Placement state lives in a `CapacityLedger`, a private scratchpad built
//! fresh for every evaluation, crossover build or mutation trial, so no
//! server state is ever shared between unrelated computations.

use crate::error::{CapacityError, PlacementError};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Sentinel gene for a VM that has not been placed yet.
pub const UNASSIGNED: usize = usize::MAX;

/// A virtual machine to place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vm {
    /// Zero-based identifier, equal to the VM's index in the scenario
    pub id: usize,
    /// Virtual CPUs required
    pub cpu_req: u64,
    /// RAM required (GB)
    pub ram_req: u64,
    /// Name from the source inventory, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Vm {
    pub fn new(id: usize, cpu_req: u64, ram_req: u64) -> Self {
        Vm { id, cpu_req, ram_req, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Combined demand, used to order VMs largest-first
    pub fn weight(&self) -> u64 {
        self.cpu_req + self.ram_req
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("VM_{}", self.id))
    }
}

/// A physical server (capacity template only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Zero-based identifier, equal to the server's index in the scenario
    pub id: usize,
    /// Schedulable vCPUs
    pub cpu_total: u64,
    /// Schedulable RAM (GB)
    pub ram_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Server {
    pub fn new(id: usize, cpu_total: u64, ram_total: u64) -> Self {
        Server { id, cpu_total, ram_total, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Combined capacity, used to rank servers as dominant or weak
    pub fn capacity_weight(&self) -> u64 {
        self.cpu_total + self.ram_total
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("Server_{}", self.id))
    }
}

/// Scratch state of one server: which VMs it hosts and how much is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSlot {
    pub id: usize,
    pub cpu_total: u64,
    pub ram_total: u64,
    hosted: Vec<usize>,
    cpu_used: u64,
    ram_used: u64,
}

impl ServerSlot {
    pub fn new(server: &Server) -> Self {
        ServerSlot {
            id: server.id,
            cpu_total: server.cpu_total,
            ram_total: server.ram_total,
            hosted: Vec::new(),
            cpu_used: 0,
            ram_used: 0,
        }
    }

    /// Ids of the hosted VMs, in allocation order
    pub fn hosted(&self) -> &[usize] {
        &self.hosted
    }

    pub fn cpu_used(&self) -> u64 {
        self.cpu_used
    }

    pub fn ram_used(&self) -> u64 {
        self.ram_used
    }

    pub fn cpu_avail(&self) -> u64 {
        self.cpu_total.saturating_sub(self.cpu_used)
    }

    pub fn ram_avail(&self) -> u64 {
        self.ram_total.saturating_sub(self.ram_used)
    }

    /// Combined free capacity (cpu + ram)
    pub fn free_capacity(&self) -> u64 {
        self.cpu_avail() + self.ram_avail()
    }

    pub fn capacity_weight(&self) -> u64 {
        self.cpu_total + self.ram_total
    }

    pub fn is_active(&self) -> bool {
        !self.hosted.is_empty()
    }

    #[inline]
    pub fn can_host(&self, vm: &Vm) -> bool {
        vm.cpu_req <= self.cpu_avail() && vm.ram_req <= self.ram_avail()
    }

    /// Add `vm` to this server. Nothing changes when it does not fit.
    pub fn allocate(&mut self, vm: &Vm) -> Result<(), CapacityError> {
        if !self.can_host(vm) {
            return Err(CapacityError {
                server: self.id,
                vm: vm.id,
                cpu_req: vm.cpu_req,
                cpu_avail: self.cpu_avail(),
                ram_req: vm.ram_req,
                ram_avail: self.ram_avail(),
            });
        }
        self.hosted.push(vm.id);
        self.cpu_used += vm.cpu_req;
        self.ram_used += vm.ram_req;
        Ok(())
    }

    /// Remove `vm` from this server. Returns false (and logs) when it was not hosted here.
    pub fn deallocate(&mut self, vm: &Vm) -> bool {
        match self.hosted.iter().position(|&id| id == vm.id) {
            Some(pos) => {
                self.hosted.remove(pos);
                self.cpu_used -= vm.cpu_req;
                self.ram_used -= vm.ram_req;
                true
            }
            None => {
                log::warn!(
                    "tried to remove VM {} from server {}, but it was not hosted there",
                    vm.id,
                    self.id
                );
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.hosted.clear();
        self.cpu_used = 0;
        self.ram_used = 0;
    }
}

/// Per-call capacity scratchpad covering every server of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityLedger {
    slots: Vec<ServerSlot>,
}

impl CapacityLedger {
    /// Empty ledger: every server idle
    pub fn new(servers: &[Server]) -> Self {
        CapacityLedger {
            slots: servers.iter().map(ServerSlot::new).collect(),
        }
    }

    /// Replay a chromosome in VM order, stopping at the first gene that is
    /// unassigned, out of range or over capacity.
    pub fn from_chromosome(
        chromosome: &[usize],
        vms: &[Vm],
        servers: &[Server],
    ) -> Result<Self, PlacementError> {
        if chromosome.len() != vms.len() {
            return Err(PlacementError::LengthMismatch {
                genes: chromosome.len(),
                vms: vms.len(),
            });
        }

        let mut ledger = CapacityLedger::new(servers);
        for (vm, &server) in vms.iter().zip(chromosome) {
            if server == UNASSIGNED {
                return Err(PlacementError::Unassigned { vm: vm.id });
            }
            ledger.allocate(server, vm)?;
        }
        Ok(ledger)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ServerSlot] {
        &self.slots
    }

    pub fn slot(&self, server: usize) -> Option<&ServerSlot> {
        self.slots.get(server)
    }

    /// False for unknown server ids
    #[inline]
    pub fn can_host(&self, server: usize, vm: &Vm) -> bool {
        self.slots.get(server).map_or(false, |slot| slot.can_host(vm))
    }

    pub fn allocate(&mut self, server: usize, vm: &Vm) -> Result<(), PlacementError> {
        let slot = self
            .slots
            .get_mut(server)
            .ok_or(PlacementError::UnknownServer { vm: vm.id, server })?;
        slot.allocate(vm)?;
        Ok(())
    }

    pub fn deallocate(&mut self, server: usize, vm: &Vm) -> bool {
        match self.slots.get_mut(server) {
            Some(slot) => slot.deallocate(vm),
            None => {
                log::warn!("tried to remove VM {} from unknown server {}", vm.id, server);
                false
            }
        }
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.reset();
        }
    }

    /// Number of servers hosting at least one VM
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_active()).count()
    }

    /// Ids of servers hosting at least one VM, ascending
    pub fn active_servers(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|s| s.is_active())
            .map(|s| s.id)
            .collect()
    }

    /// Order `candidates` by decreasing `key` (most free space first).
    /// Ties keep the candidates' original order.
    pub fn worst_fit_order<K, F>(&self, candidates: &[usize], key: F) -> Vec<usize>
    where
        K: Ord,
        F: Fn(&ServerSlot) -> K,
    {
        let mut ordered: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&s| s < self.slots.len())
            .collect();
        ordered.sort_by_key(|&s| Reverse(key(&self.slots[s])));
        ordered
    }

    /// First server in worst-fit order (by `key`) among `candidates` that can host `vm`
    pub fn worst_fit<K, F>(&self, candidates: &[usize], vm: &Vm, key: F) -> Option<usize>
    where
        K: Ord,
        F: Fn(&ServerSlot) -> K,
    {
        self.worst_fit_order(candidates, key)
            .into_iter()
            .find(|&s| self.slots[s].can_host(vm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_servers() -> Vec<Server> {
        vec![Server::new(0, 4, 8), Server::new(1, 4, 8)]
    }

    #[test]
    fn test_can_host_and_allocate() {
        let server = Server::new(0, 4, 8);
        let mut slot = ServerSlot::new(&server);
        let vm = Vm::new(0, 2, 4);

        assert!(slot.can_host(&vm));
        slot.allocate(&vm).unwrap();
        assert_eq!(slot.cpu_used(), 2);
        assert_eq!(slot.ram_avail(), 4);
        assert!(slot.is_active());
    }

    #[test]
    fn test_allocate_rejects_without_mutation() {
        let mut slot = ServerSlot::new(&Server::new(0, 4, 8));
        slot.allocate(&Vm::new(0, 3, 2)).unwrap();
        let before = slot.clone();

        let err = slot.allocate(&Vm::new(1, 2, 2)).unwrap_err();
        assert_eq!(err.server, 0);
        assert_eq!(err.vm, 1);
        assert_eq!(slot, before);
    }

    #[test]
    fn test_deallocate_absent_is_noop() {
        let mut slot = ServerSlot::new(&Server::new(0, 4, 8));
        let hosted = Vm::new(0, 1, 1);
        slot.allocate(&hosted).unwrap();

        assert!(!slot.deallocate(&Vm::new(5, 1, 1)));
        assert_eq!(slot.hosted(), &[0]);
        assert!(slot.deallocate(&hosted));
        assert!(!slot.is_active());
        assert_eq!(slot.cpu_used(), 0);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut ledger = CapacityLedger::new(&two_servers());
        ledger.allocate(0, &Vm::new(0, 2, 4)).unwrap();
        ledger.allocate(1, &Vm::new(1, 2, 4)).unwrap();

        ledger.reset();
        let once = ledger.clone();
        ledger.reset();
        assert_eq!(ledger, once);
        assert_eq!(ledger, CapacityLedger::new(&two_servers()));
    }

    #[test]
    fn test_ledger_from_chromosome() {
        let servers = two_servers();
        let vms = vec![Vm::new(0, 2, 4), Vm::new(1, 2, 4), Vm::new(2, 2, 4)];

        let ledger = CapacityLedger::from_chromosome(&[0, 1, 0], &vms, &servers).unwrap();
        assert_eq!(ledger.active_count(), 2);
        assert_eq!(ledger.slot(0).unwrap().hosted(), &[0, 2]);

        assert!(matches!(
            CapacityLedger::from_chromosome(&[0, 0, 0], &vms, &servers),
            Err(PlacementError::Capacity(_))
        ));
        assert!(matches!(
            CapacityLedger::from_chromosome(&[0, 2, 0], &vms, &servers),
            Err(PlacementError::UnknownServer { vm: 1, server: 2 })
        ));
        assert!(matches!(
            CapacityLedger::from_chromosome(&[0, UNASSIGNED, 0], &vms, &servers),
            Err(PlacementError::Unassigned { vm: 1 })
        ));
    }

    #[test]
    fn test_worst_fit_order_prefers_free_space() {
        let servers = vec![Server::new(0, 8, 8), Server::new(1, 8, 16), Server::new(2, 8, 16)];
        let mut ledger = CapacityLedger::new(&servers);
        ledger.allocate(2, &Vm::new(0, 1, 4)).unwrap();

        let order = ledger.worst_fit_order(&[0, 1, 2], |s| s.ram_avail());
        assert_eq!(order, vec![1, 2, 0]);

        let big = Vm::new(1, 1, 14);
        assert_eq!(ledger.worst_fit(&[0, 2], &big, |s| s.ram_avail()), None);
        assert_eq!(ledger.worst_fit(&[0, 1, 2], &big, |s| s.ram_avail()), Some(1));
    }
}
