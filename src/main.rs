//! VM Consolidation Solver - Command Line Interface
//!
//! Packs virtual machines onto as few physical servers as possible with a
//! genetic algorithm.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use vm_consolidation::benchmark::{Benchmark, BenchmarkConfig};
use vm_consolidation::genetic::{self, CrossoverStrategy, GAConfig, MutationStrategy};
use vm_consolidation::report;
use vm_consolidation::sanity;
use vm_consolidation::scenario::{HardwareCatalog, Scenario};
use vm_consolidation::solution::Solution;

use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "vm-consolidation")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "A genetic-algorithm solver for VM consolidation")]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the genetic algorithm on a scenario
    Solve {
        #[command(flatten)]
        scenario: ScenarioArgs,

        #[command(flatten)]
        ga: GaArgs,

        /// Directory receiving the JSON and CSV reports
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print scenario statistics
    Analyze {
        #[command(flatten)]
        scenario: ScenarioArgs,
    },

    /// Compare every crossover and mutation pair over several seeds
    Benchmark {
        #[command(flatten)]
        scenario: ScenarioArgs,

        #[command(flatten)]
        ga: GaArgs,

        /// Seeds per strategy pair
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct ScenarioArgs {
    /// Scenario JSON file
    #[arg(long, conflicts_with_all = ["servers_csv", "vms_csv"])]
    scenario: Option<PathBuf>,

    /// VMware hosts export (column `Name`)
    #[arg(long, requires = "vms_csv")]
    servers_csv: Option<PathBuf>,

    /// VMware VMs export (columns `Name`, `CPUs`, `Memory Size`)
    #[arg(long, requires = "servers_csv")]
    vms_csv: Option<PathBuf>,

    /// Hardware catalog JSON used to size CSV hosts
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// vCPUs schedulable per physical core
    #[arg(long)]
    vcpu_ratio: Option<u64>,

    /// RAM overcommit ratio
    #[arg(long)]
    ram_ratio: Option<f64>,
}

#[derive(Args)]
struct GaArgs {
    /// Population size
    #[arg(short, long, default_value = "100")]
    population: usize,

    /// Maximum number of generations
    #[arg(short, long, default_value = "1000")]
    generations: usize,

    /// Generations without improvement before stopping
    #[arg(long, default_value = "200")]
    stagnation: usize,

    /// Crossover operator [default: cpc; benchmark: all]
    #[arg(short, long, value_enum)]
    crossover: Option<Crossover>,

    /// Mutation operator [default: swap; benchmark: all]
    #[arg(short, long, value_enum)]
    mutation: Option<Mutation>,

    /// Probability of mutating a child
    #[arg(long, default_value = "0.5")]
    mutation_probability: f64,

    /// Individuals copied unchanged into the next generation
    #[arg(long, default_value = "2")]
    elitism: usize,

    /// Random seed
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Evaluate generations on a single thread
    #[arg(long)]
    sequential: bool,

    /// Skip the per-generation population checks
    #[arg(long)]
    no_sanity_checks: bool,

    /// Progress log interval in generations (0 disables)
    #[arg(long, default_value = "10")]
    log_interval: usize,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Crossover {
    /// Consensus Partition Crossover
    Cpc,
    /// Dominant Anti-Cancer Crossover
    Doac,
    /// Uniform gene exchange
    Uniform,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Mutation {
    /// Exchange the servers of two VMs
    Swap,
    /// Empty the poorest server
    RobinHood,
    /// Move one VM to a server with room
    SmartMove,
}

impl From<Crossover> for CrossoverStrategy {
    fn from(value: Crossover) -> Self {
        match value {
            Crossover::Cpc => CrossoverStrategy::ConsensusPartition,
            Crossover::Doac => CrossoverStrategy::DominantAntiCancer,
            Crossover::Uniform => CrossoverStrategy::Uniform,
        }
    }
}

impl From<Mutation> for MutationStrategy {
    fn from(value: Mutation) -> Self {
        match value {
            Mutation::Swap => MutationStrategy::Swap,
            Mutation::RobinHood => MutationStrategy::RobinHood,
            Mutation::SmartMove => MutationStrategy::SmartMove,
        }
    }
}

impl GaArgs {
    fn to_config(&self) -> GAConfig {
        GAConfig {
            population_size: self.population,
            max_generations: self.generations,
            max_stagnant_generations: self.stagnation,
            crossover: self.crossover.unwrap_or(Crossover::Cpc).into(),
            mutation: self.mutation.unwrap_or(Mutation::Swap).into(),
            mutation_probability: self.mutation_probability,
            elitism_size: self.elitism,
            seed: self.seed,
            parallel_evaluation: !self.sequential,
            sanity_checks: !self.no_sanity_checks,
            log_interval: self.log_interval,
        }
    }
}

impl ScenarioArgs {
    fn load(&self) -> anyhow::Result<Scenario> {
        let scenario = match (&self.scenario, &self.servers_csv, &self.vms_csv) {
            (Some(path), _, _) => Scenario::from_json_file(path)
                .with_context(|| format!("loading scenario {}", path.display()))?,
            (None, Some(hosts), Some(vms)) => {
                let mut catalog = match &self.catalog {
                    Some(path) => HardwareCatalog::from_json_file(path)
                        .with_context(|| format!("loading hardware catalog {}", path.display()))?,
                    None => HardwareCatalog::default(),
                };
                if let Some(ratio) = self.vcpu_ratio {
                    catalog.vcpu_per_pcpu = ratio;
                }
                if let Some(ratio) = self.ram_ratio {
                    catalog.ram_overcommit = ratio;
                }
                Scenario::from_vmware_csv(hosts, vms, &catalog)
                    .with_context(|| format!("importing {} and {}", hosts.display(), vms.display()))?
            }
            _ => bail!("either --scenario or both --servers-csv and --vms-csv are required"),
        };

        sanity::check_scenario(&scenario)?;
        Ok(scenario)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let outcome = match cli.command {
        Commands::Solve { scenario, ga, output } => solve(&scenario, &ga, output.as_deref()),
        Commands::Analyze { scenario } => analyze(&scenario),
        Commands::Benchmark {
            scenario,
            ga,
            runs,
            output,
        } => run_benchmark(&scenario, &ga, runs, &output),
    };

    if let Err(e) = outcome {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn solve(args: &ScenarioArgs, ga: &GaArgs, output: Option<&Path>) -> anyhow::Result<()> {
    let scenario = args.load()?;
    let config = ga.to_config();
    println!(
        "Solving {} ({} VMs, {} servers) with {} + {}...",
        scenario.name,
        scenario.num_vms(),
        scenario.num_servers(),
        config.crossover,
        config.mutation
    );

    let result = genetic::run(&scenario, &config)?;
    let algorithm = format!("GA ({} + {})", config.crossover, config.mutation);
    let solution = Solution::from_result(result, &algorithm);

    println!("\n========== Results ==========");
    print!("{}", solution);
    if let Some(lb) = scenario.lower_bound_servers() {
        println!("  Lower bound: {} servers", lb);
    }

    if let Some(dir) = output {
        report::write_all(&solution, &scenario, dir)
            .with_context(|| format!("writing reports to {}", dir.display()))?;
        println!("\nReports saved to {:?}", dir);
    }
    Ok(())
}

fn analyze(args: &ScenarioArgs) -> anyhow::Result<()> {
    let scenario = args.load()?;
    let totals = scenario.totals();

    println!("========== Scenario Analysis ==========\n");
    println!("Name: {}", scenario.name);
    println!("VMs: {}", scenario.num_vms());
    println!("Servers: {}", scenario.num_servers());

    println!("\nResources:");
    println!(
        "  CPU: demand {} / capacity {} (slack {})",
        totals.cpu_demand,
        totals.cpu_capacity,
        totals.cpu_slack()
    );
    println!(
        "  RAM: demand {} / capacity {} (slack {})",
        totals.ram_demand,
        totals.ram_capacity,
        totals.ram_slack()
    );

    match scenario.lower_bound_servers() {
        Some(lb) => println!("  Lower bound: {} servers", lb),
        None => println!("  Lower bound: none (demand exceeds capacity)"),
    }

    if let Some(largest) = scenario.vms.iter().max_by_key(|vm| vm.weight()) {
        println!(
            "  Largest VM: {} (cpu {}, ram {})",
            largest.display_name(),
            largest.cpu_req,
            largest.ram_req
        );
    }

    let unplaceable = scenario.unplaceable_vms();
    if unplaceable.is_empty() {
        println!("\nEvery VM fits on at least one server.");
    } else {
        println!("\nVMs that fit on no server: {:?}", unplaceable);
    }

    if let Err(e) = scenario.check_capacity() {
        println!("\nWarning: {}", e);
    }
    Ok(())
}

fn run_benchmark(args: &ScenarioArgs, ga: &GaArgs, runs: usize, output: &Path) -> anyhow::Result<()> {
    let scenario = args.load()?;

    std::fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;

    let config = BenchmarkConfig {
        runs,
        base_seed: ga.seed,
        ga: GAConfig {
            parallel_evaluation: false,
            log_interval: 0,
            ..ga.to_config()
        },
        ..Default::default()
    }
    .restricted_to(ga.crossover.map(Into::into), ga.mutation.map(Into::into));

    let mut benchmark = Benchmark::new(config);
    benchmark.run(&scenario)?;

    let results_path = output.join("results.csv");
    benchmark.export_to_csv(&results_path).context("exporting results")?;
    println!("\nResults exported to {:?}", results_path);

    let stats_path = output.join("statistics.csv");
    benchmark.export_statistics_csv(&stats_path).context("exporting statistics")?;
    println!("Statistics exported to {:?}", stats_path);

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    std::fs::write(&report_path, &report).context("saving report")?;
    println!("Report saved to {:?}", report_path);
    Ok(())
}
