//! Module for loading and validating consolidation scenarios.
//!
//! A scenario is the list of physical servers plus the list of VMs to place.
//! It can be read from a JSON scenario file or imported from a VMware
//! inventory export (one CSV for hosts, one for VMs), in which case host
//! capacities are derived from a hardware catalog and overcommit ratios.

use crate::datacenter::{Server, Vm};
use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A complete consolidation scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Name of the scenario
    #[serde(default)]
    pub name: String,
    /// Physical servers, indexed by id
    pub servers: Vec<Server>,
    /// VMs to place, indexed by id
    pub vms: Vec<Vm>,
}

/// Aggregate demand and capacity of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceTotals {
    pub cpu_demand: u64,
    pub ram_demand: u64,
    pub cpu_capacity: u64,
    pub ram_capacity: u64,
}

impl ResourceTotals {
    pub fn cpu_slack(&self) -> i64 {
        self.cpu_capacity as i64 - self.cpu_demand as i64
    }

    pub fn ram_slack(&self) -> i64 {
        self.ram_capacity as i64 - self.ram_demand as i64
    }
}

impl Scenario {
    pub fn new(name: impl Into<String>, servers: Vec<Server>, vms: Vec<Vm>) -> Self {
        Scenario {
            name: name.into(),
            servers,
            vms,
        }
    }

    /// Parse a scenario from a JSON file and validate its structure
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let file = File::open(&path)?;
        let mut scenario: Scenario = serde_json::from_reader(BufReader::new(file))?;
        if scenario.name.is_empty() {
            scenario.name = path
                .as_ref()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        scenario.validate()?;
        log::info!(
            "Loaded scenario '{}': {} servers, {} VMs",
            scenario.name,
            scenario.servers.len(),
            scenario.vms.len()
        );
        Ok(scenario)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Import a scenario from VMware inventory CSV exports.
    ///
    /// The hosts file needs a `Name` column; the VMs file needs `Name`,
    /// `CPUs` and `Memory Size`. Other columns are ignored.
    pub fn from_vmware_csv<P: AsRef<Path>, Q: AsRef<Path>>(
        hosts_path: P,
        vms_path: Q,
        catalog: &HardwareCatalog,
    ) -> Result<Self, ScenarioError> {
        let mut servers = Vec::new();
        let mut reader = csv::Reader::from_path(hosts_path.as_ref())?;
        for row in reader.deserialize::<HostRow>() {
            let row = row?;
            let hostname = row.name.trim();
            let (cpu_total, ram_total) = catalog.capacity_for(hostname);
            servers.push(Server::new(servers.len(), cpu_total, ram_total).with_name(hostname));
        }
        log::info!("Read {} hosts, capacity derived with overcommit", servers.len());

        let mut vms = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut reader = csv::Reader::from_path(vms_path.as_ref())?;
        for (line, row) in reader.deserialize::<VmRow>().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    log::warn!("Skipping invalid VM row {}: {}", line + 1, e);
                    continue;
                }
            };
            let name = row.name.trim();
            if name.is_empty() {
                continue;
            }
            if !seen.insert(name.to_string()) {
                log::warn!("Skipping duplicate VM name '{}'", name);
                continue;
            }
            let Some(ram_req) = parse_memory_gb(&row.memory) else {
                log::warn!("Skipping VM '{}': unreadable memory size '{}'", name, row.memory);
                continue;
            };
            if row.cpus == 0 || ram_req == 0 {
                log::warn!("Skipping VM '{}': zero CPU or memory demand", name);
                continue;
            }
            vms.push(Vm::new(vms.len(), row.cpus, ram_req).with_name(name));
        }
        log::info!("Read {} unique VMs", vms.len());

        let scenario = Scenario {
            name: vms_path
                .as_ref()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "vmware".to_string()),
            servers,
            vms,
        };
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check ids are contiguous and zero-based and every quantity is positive
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.servers.is_empty() {
            return Err(ScenarioError::Empty);
        }
        for (position, server) in self.servers.iter().enumerate() {
            if server.id != position {
                return Err(ScenarioError::NonContiguousIds {
                    kind: "server",
                    position,
                    found: server.id,
                });
            }
            if server.cpu_total == 0 || server.ram_total == 0 {
                return Err(ScenarioError::ZeroCapacity { server: server.id });
            }
        }
        for (position, vm) in self.vms.iter().enumerate() {
            if vm.id != position {
                return Err(ScenarioError::NonContiguousIds {
                    kind: "VM",
                    position,
                    found: vm.id,
                });
            }
            if vm.cpu_req == 0 || vm.ram_req == 0 {
                return Err(ScenarioError::ZeroDemand { vm: vm.id });
            }
        }
        Ok(())
    }

    pub fn totals(&self) -> ResourceTotals {
        ResourceTotals {
            cpu_demand: self.vms.iter().map(|v| v.cpu_req).sum(),
            ram_demand: self.vms.iter().map(|v| v.ram_req).sum(),
            cpu_capacity: self.servers.iter().map(|s| s.cpu_total).sum(),
            ram_capacity: self.servers.iter().map(|s| s.ram_total).sum(),
        }
    }

    /// Fail when the VMs cannot fit even with perfect packing
    pub fn check_capacity(&self) -> Result<(), ScenarioError> {
        let t = self.totals();
        if t.cpu_demand > t.cpu_capacity || t.ram_demand > t.ram_capacity {
            return Err(ScenarioError::Infeasible {
                cpu_demand: t.cpu_demand,
                cpu_capacity: t.cpu_capacity,
                ram_demand: t.ram_demand,
                ram_capacity: t.ram_capacity,
            });
        }
        Ok(())
    }

    /// Smallest number of servers whose combined capacity covers total demand.
    ///
    /// Servers are taken largest first per dimension, so the bound holds for
    /// any feasible placement. Returns `None` when demand exceeds capacity.
    pub fn lower_bound_servers(&self) -> Option<usize> {
        if self.vms.is_empty() {
            return Some(0);
        }
        let t = self.totals();
        let cpu = Self::servers_to_cover(self.servers.iter().map(|s| s.cpu_total), t.cpu_demand)?;
        let ram = Self::servers_to_cover(self.servers.iter().map(|s| s.ram_total), t.ram_demand)?;
        Some(cpu.max(ram).max(1))
    }

    fn servers_to_cover(capacities: impl Iterator<Item = u64>, demand: u64) -> Option<usize> {
        let mut sorted: Vec<u64> = capacities.collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        let mut covered = 0u64;
        for (i, cap) in sorted.iter().enumerate() {
            if covered >= demand {
                return Some(i);
            }
            covered += cap;
        }
        (covered >= demand).then_some(sorted.len())
    }

    /// VMs that no server could host even when empty
    pub fn unplaceable_vms(&self) -> Vec<usize> {
        self.vms
            .iter()
            .filter(|vm| {
                !self
                    .servers
                    .iter()
                    .any(|s| vm.cpu_req <= s.cpu_total && vm.ram_req <= s.ram_total)
            })
            .map(|vm| vm.id)
            .collect()
    }

    pub fn num_vms(&self) -> usize {
        self.vms.len()
    }

    pub fn num_servers(&self) -> usize {
        self.servers.len()
    }
}

#[derive(Debug, Deserialize)]
struct HostRow {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct VmRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CPUs")]
    cpus: u64,
    #[serde(rename = "Memory Size")]
    memory: String,
}

/// Parse an inventory memory string ("4 GB", "8,192.00 MB", "16") into whole GB.
/// Fractions round up so that small VMs still reserve memory.
pub fn parse_memory_gb(raw: &str) -> Option<u64> {
    let cleaned = raw.to_lowercase().replace(',', "");
    let cleaned = cleaned.trim();

    let (number, divisor) = if let Some(n) = cleaned.strip_suffix("gb") {
        (n.trim(), 1.0)
    } else if let Some(n) = cleaned.strip_suffix("mb") {
        (n.trim(), 1024.0)
    } else {
        (cleaned, 1.0)
    };

    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value / divisor).ceil() as u64)
}

/// Physical hardware profile matched by hostname prefix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub prefix: String,
    /// Physical cores
    pub pcpus: u64,
    pub ram_gb: u64,
}

/// Hardware catalog used to derive host capacity from hostnames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareCatalog {
    pub profiles: Vec<HardwareProfile>,
    /// vCPU:pCPU overcommit ratio
    #[serde(default = "default_vcpu_ratio")]
    pub vcpu_per_pcpu: u64,
    /// RAM overcommit ratio
    #[serde(default = "default_ram_ratio")]
    pub ram_overcommit: f64,
    /// Profile used for hosts that match no prefix
    #[serde(default = "default_fallback")]
    pub fallback: HardwareProfile,
}

fn default_vcpu_ratio() -> u64 {
    8
}

fn default_ram_ratio() -> f64 {
    1.0
}

fn default_fallback() -> HardwareProfile {
    HardwareProfile {
        prefix: String::new(),
        pcpus: 32,
        ram_gb: 128,
    }
}

impl Default for HardwareCatalog {
    fn default() -> Self {
        HardwareCatalog {
            profiles: vec![
                HardwareProfile { prefix: "cs-01-host".into(), pcpus: 24, ram_gb: 382 },
                HardwareProfile { prefix: "cs-02-host".into(), pcpus: 24, ram_gb: 382 },
                HardwareProfile { prefix: "s-hpbl".into(), pcpus: 16, ram_gb: 256 },
            ],
            vcpu_per_pcpu: default_vcpu_ratio(),
            ram_overcommit: default_ram_ratio(),
            fallback: default_fallback(),
        }
    }
}

impl HardwareCatalog {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn profile_for(&self, hostname: &str) -> &HardwareProfile {
        match self.profiles.iter().find(|p| hostname.starts_with(&p.prefix)) {
            Some(profile) => profile,
            None => {
                log::warn!(
                    "Unknown host model '{}', using {} cores / {} GB",
                    hostname,
                    self.fallback.pcpus,
                    self.fallback.ram_gb
                );
                &self.fallback
            }
        }
    }

    /// (vCPU capacity, RAM capacity in GB) for a hostname
    pub fn capacity_for(&self, hostname: &str) -> (u64, u64) {
        let profile = self.profile_for(hostname);
        let cpu = profile.pcpus * self.vcpu_per_pcpu;
        let ram = (profile.ram_gb as f64 * self.ram_overcommit).floor() as u64;
        (cpu, ram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scenario_a() -> Scenario {
        Scenario::new(
            "a",
            vec![Server::new(0, 4, 8), Server::new(1, 4, 8)],
            vec![Vm::new(0, 2, 4), Vm::new(1, 2, 4), Vm::new(2, 2, 4)],
        )
    }

    #[test]
    fn test_parse_json_scenario() {
        let json = r#"{
            "name": "tiny",
            "servers": [{"id": 0, "cpu_total": 10, "ram_total": 10}],
            "vms": [{"id": 0, "cpu_req": 2, "ram_req": 2, "name": "web"}]
        }"#;
        let scenario = Scenario::from_json_str(json).unwrap();
        assert_eq!(scenario.name, "tiny");
        assert_eq!(scenario.num_servers(), 1);
        assert_eq!(scenario.vms[0].display_name(), "web");
    }

    #[test]
    fn test_validate_rejects_gaps_and_zeroes() {
        let mut s = scenario_a();
        s.vms[1].id = 5;
        assert!(matches!(s.validate(), Err(ScenarioError::NonContiguousIds { kind: "VM", .. })));

        let mut s = scenario_a();
        s.servers[0].ram_total = 0;
        assert!(matches!(s.validate(), Err(ScenarioError::ZeroCapacity { server: 0 })));

        let s = Scenario::new("empty", vec![], vec![]);
        assert!(matches!(s.validate(), Err(ScenarioError::Empty)));
    }

    #[test]
    fn test_check_capacity() {
        assert!(scenario_a().check_capacity().is_ok());

        let mut s = scenario_a();
        s.vms.push(Vm::new(3, 4, 1));
        match s.check_capacity() {
            Err(ScenarioError::Infeasible { cpu_demand, cpu_capacity, .. }) => {
                assert_eq!(cpu_demand, 10);
                assert_eq!(cpu_capacity, 8);
            }
            other => panic!("expected infeasible scenario, got {:?}", other),
        }
    }

    #[test]
    fn test_lower_bound() {
        assert_eq!(scenario_a().lower_bound_servers(), Some(2));

        let s = Scenario::new(
            "b",
            vec![Server::new(0, 10, 10), Server::new(1, 10, 10), Server::new(2, 10, 10)],
            vec![Vm::new(0, 2, 2), Vm::new(1, 2, 2)],
        );
        assert_eq!(s.lower_bound_servers(), Some(1));
    }

    #[test]
    fn test_unplaceable_vms() {
        let mut s = scenario_a();
        s.vms.push(Vm::new(3, 1, 9));
        assert_eq!(s.unplaceable_vms(), vec![3]);
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(parse_memory_gb("4 GB"), Some(4));
        assert_eq!(parse_memory_gb("8,192.00 MB"), Some(8));
        assert_eq!(parse_memory_gb("512 MB"), Some(1));
        assert_eq!(parse_memory_gb("16"), Some(16));
        assert_eq!(parse_memory_gb("0.5 GB"), Some(1));
        assert_eq!(parse_memory_gb("0 GB"), Some(0));
        assert_eq!(parse_memory_gb("lots"), None);
    }

    #[test]
    fn test_catalog_capacity() {
        let catalog = HardwareCatalog::default();
        assert_eq!(catalog.capacity_for("cs-01-host-07"), (192, 382));
        assert_eq!(catalog.capacity_for("mystery-box"), (256, 128));

        let generous = HardwareCatalog { ram_overcommit: 1.5, ..HardwareCatalog::default() };
        assert_eq!(generous.capacity_for("s-hpbl-3"), (128, 384));
    }

    #[test]
    fn test_vmware_import() {
        let dir = std::env::temp_dir().join(format!("vmc-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let hosts = dir.join("hosts.csv");
        let vms = dir.join("vms.csv");

        let mut f = File::create(&hosts).unwrap();
        writeln!(f, "Name,State").unwrap();
        writeln!(f, "s-hpbl-01,Connected").unwrap();
        writeln!(f, "cs-02-host-9,Connected").unwrap();

        let mut f = File::create(&vms).unwrap();
        writeln!(f, "Name,CPUs,Memory Size").unwrap();
        writeln!(f, "db01,4,\"8,192.00 MB\"").unwrap();
        writeln!(f, "web01,2,4 GB").unwrap();
        writeln!(f, "web01,2,4 GB").unwrap();
        writeln!(f, "broken,x,4 GB").unwrap();

        let scenario = Scenario::from_vmware_csv(&hosts, &vms, &HardwareCatalog::default()).unwrap();
        assert_eq!(scenario.num_servers(), 2);
        assert_eq!(scenario.servers[0].cpu_total, 128);
        assert_eq!(scenario.servers[1].ram_total, 382);
        assert_eq!(scenario.num_vms(), 2);
        assert_eq!(scenario.vms[0].ram_req, 8);
        assert_eq!(scenario.vms[1].id, 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_vmware_import_skips_zero_demand_rows() {
        let dir = std::env::temp_dir().join(format!("vmc-import-zero-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let hosts = dir.join("hosts.csv");
        let vms = dir.join("vms.csv");

        let mut f = File::create(&hosts).unwrap();
        writeln!(f, "Name").unwrap();
        writeln!(f, "s-hpbl-01").unwrap();

        let mut f = File::create(&vms).unwrap();
        writeln!(f, "Name,CPUs,Memory Size").unwrap();
        writeln!(f, "web01,2,4 GB").unwrap();
        writeln!(f, "tiny,1,0.5 GB").unwrap();
        writeln!(f, "idle,0,2 GB").unwrap();
        writeln!(f, "empty,1,0 MB").unwrap();

        let scenario = Scenario::from_vmware_csv(&hosts, &vms, &HardwareCatalog::default()).unwrap();
        assert_eq!(scenario.num_vms(), 2);
        assert_eq!(scenario.vms[1].display_name(), "tiny");
        assert_eq!(scenario.vms[1].ram_req, 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
