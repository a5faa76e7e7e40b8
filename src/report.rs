//! Solution reports.
//!
//! Two JSON views of the same placement (a logical server -> VMs map and a
//! detailed per-server usage report), a flat allocation CSV meant for
//! spreadsheets and the per-generation fitness history as CSV.

use crate::error::SanityError;
use crate::genetic::engine::EngineState;
use crate::scenario::Scenario;
use crate::solution::Solution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Server id -> sorted ids of the VMs it hosts
pub type LogicalReport = BTreeMap<usize, Vec<usize>>;

/// Build the logical report. Genes that do not name a known server are skipped.
pub fn logical_report(solution: &Solution, scenario: &Scenario) -> LogicalReport {
    let mut report = LogicalReport::new();
    for (vm, &server) in solution.chromosome.iter().enumerate() {
        if server < scenario.num_servers() && vm < scenario.num_vms() {
            report.entry(server).or_default().push(vm);
        }
    }
    for vms in report.values_mut() {
        vms.sort_unstable();
    }
    report
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedVm {
    pub id: usize,
    pub name: String,
    pub cpu_req: u64,
    pub ram_req: u64,
}

/// Resource usage of one active server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerUsage {
    pub id: usize,
    pub name: String,
    pub cpu_used: u64,
    pub cpu_total: u64,
    pub ram_used: u64,
    pub ram_total: u64,
    /// Percent of cpu_total in use
    pub cpu_utilisation: f64,
    /// Percent of ram_total in use
    pub ram_utilisation: f64,
    pub vms: Vec<HostedVm>,
}

/// Full description of a placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedReport {
    /// RFC 3339 creation time
    pub timestamp: String,
    pub scenario: String,
    pub algorithm: String,
    /// None when the placement is infeasible
    pub fitness: Option<f64>,
    pub feasible: bool,
    pub servers_used: usize,
    pub generations: usize,
    pub termination: Option<EngineState>,
    pub computation_time: f64,
    pub servers: Vec<ServerUsage>,
    /// Best fitness per generation, None for generations without a feasible individual
    pub fitness_history: Vec<Option<f64>>,
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

impl DetailedReport {
    pub fn new(solution: &Solution, scenario: &Scenario) -> Self {
        let servers: Vec<ServerUsage> = logical_report(solution, scenario)
            .into_iter()
            .map(|(s, hosted)| {
                let server = &scenario.servers[s];
                let vms: Vec<HostedVm> = hosted
                    .iter()
                    .map(|&v| {
                        let vm = &scenario.vms[v];
                        HostedVm {
                            id: vm.id,
                            name: vm.display_name(),
                            cpu_req: vm.cpu_req,
                            ram_req: vm.ram_req,
                        }
                    })
                    .collect();
                let cpu_used = vms.iter().map(|vm| vm.cpu_req).sum();
                let ram_used = vms.iter().map(|vm| vm.ram_req).sum();

                ServerUsage {
                    id: server.id,
                    name: server.display_name(),
                    cpu_used,
                    cpu_total: server.cpu_total,
                    ram_used,
                    ram_total: server.ram_total,
                    cpu_utilisation: percent(cpu_used, server.cpu_total),
                    ram_utilisation: percent(ram_used, server.ram_total),
                    vms,
                }
            })
            .collect();

        DetailedReport {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario: scenario.name.clone(),
            algorithm: solution.algorithm.clone(),
            fitness: finite(solution.fitness),
            feasible: solution.feasible,
            servers_used: servers.len(),
            generations: solution.generations,
            termination: solution.termination,
            computation_time: solution.computation_time,
            servers,
            fitness_history: solution.fitness_history.iter().map(|&f| finite(f)).collect(),
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Write any serializable report as pretty JSON
pub fn write_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> std::io::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    Ok(())
}

pub fn read_logical_report<P: AsRef<Path>>(path: P) -> std::io::Result<LogicalReport> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
}

#[derive(Debug, Serialize)]
struct AllocationRow<'a> {
    server_id: usize,
    server: &'a str,
    vm_id: usize,
    vm: &'a str,
    cpu_req: u64,
    ram_req: u64,
    server_cpu_utilisation: f64,
    server_ram_utilisation: f64,
}

/// One row per hosted VM
pub fn export_allocation_csv<P: AsRef<Path>>(report: &DetailedReport, path: P) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    for server in &report.servers {
        for vm in &server.vms {
            writer.serialize(AllocationRow {
                server_id: server.id,
                server: &server.name,
                vm_id: vm.id,
                vm: &vm.name,
                cpu_req: vm.cpu_req,
                ram_req: vm.ram_req,
                server_cpu_utilisation: server.cpu_utilisation,
                server_ram_utilisation: server.ram_utilisation,
            })?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// `generation,best_fitness` rows; infeasible generations are written as `inf`
pub fn export_history_csv<P: AsRef<Path>>(history: &[f64], path: P) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(["generation", "best_fitness"])?;
    for (generation, &fitness) in history.iter().enumerate() {
        let value = if fitness.is_finite() {
            fitness.to_string()
        } else {
            "inf".to_string()
        };
        writer.write_record([generation.to_string(), value])?;
    }

    writer.flush()?;
    Ok(())
}

/// Every VM appears exactly once in each report and both place it on the same server.
pub fn verify_reports(logical: &LogicalReport, detailed: &DetailedReport) -> Result<(), SanityError> {
    let mut logical_home: BTreeMap<usize, usize> = BTreeMap::new();
    for (&server, vms) in logical {
        for &vm in vms {
            if let Some(first) = logical_home.insert(vm, server) {
                return Err(SanityError::ReportDuplicate {
                    report: "logical",
                    vm,
                    first,
                    second: server,
                });
            }
        }
    }

    let mut detailed_home: BTreeMap<usize, usize> = BTreeMap::new();
    for server in &detailed.servers {
        for vm in &server.vms {
            if let Some(first) = detailed_home.insert(vm.id, server.id) {
                return Err(SanityError::ReportDuplicate {
                    report: "detailed",
                    vm: vm.id,
                    first,
                    second: server.id,
                });
            }
        }
    }

    for (&vm, &server) in &logical_home {
        if detailed_home.get(&vm) != Some(&server) {
            return Err(SanityError::ReportMismatch { vm });
        }
    }
    if let Some(&vm) = detailed_home.keys().find(|vm| !logical_home.contains_key(vm)) {
        return Err(SanityError::ReportMismatch { vm });
    }
    Ok(())
}

/// Write the four report files into `dir` and check the two JSON views agree.
pub fn write_all<P: AsRef<Path>>(solution: &Solution, scenario: &Scenario, dir: P) -> crate::error::Result<DetailedReport> {
    let dir = dir.as_ref();
    let logical = logical_report(solution, scenario);
    let detailed = DetailedReport::new(solution, scenario);

    std::fs::create_dir_all(dir)?;
    write_json(&logical, dir.join("logical_report.json"))?;
    write_json(&detailed, dir.join("detailed_report.json"))?;
    export_allocation_csv(&detailed, dir.join("allocation.csv"))?;
    export_history_csv(&solution.fitness_history, dir.join("fitness_history.csv"))?;

    verify_reports(&logical, &detailed)?;
    log::info!("Reports written to {}", dir.display());
    Ok(detailed)
}
