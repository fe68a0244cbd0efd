//! Command-line front end for IPGuard.
//!
//! Plans subnets, runs conflict scans against a device inventory, and
//! inspects individual addresses.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::thread;

use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};
use serde_json::json;

use ipguard::alert::{
    check_conflict_alerts, check_utilization, sample_utilization, send_utilization_alert,
    LogAlertSink,
};
use ipguard::config::{Config, DEFAULT_QUARANTINE_BLOCK};
use ipguard::config_loader::load_config;
use ipguard::conflict::{ConflictEngine, ScanCancel, ScanSummary};
use ipguard::ip::{
    divide_equal, AddressSpaceAllocator, AllocationOrder, AllocationPlan, CidrBlock,
    InMemoryRegistry,
};
use ipguard::utils::ip_utils::{count_duplicates, ip_class, is_private, summarize_ip_list};

/// IPv4 subnet planning and IP conflict remediation
#[derive(Parser, Debug)]
#[command(name = "ipguard", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Carve a parent block into subnets sized to host requirements
    Allocate {
        /// Parent block, e.g. 192.168.1.0/24
        #[arg(short, long)]
        parent: CidrBlock,

        /// Comma-separated host counts, e.g. 50,100,10
        #[arg(long, value_delimiter = ',', required = true)]
        hosts: Vec<u32>,

        /// largest-first or as-requested (overrides the configuration)
        #[arg(long)]
        order: Option<AllocationOrder>,

        /// Configuration file; its quarantine block is kept out of the plan
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Split a parent block into equal subnets
    Divide {
        /// Parent block
        #[arg(short, long)]
        parent: CidrBlock,

        /// Number of subnets
        #[arg(short = 'n', long)]
        count: u32,
    },

    /// Run one full conflict scan over a device inventory
    Scan {
        /// Configuration YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Device inventory (YAML or JSON)
        #[arg(short, long)]
        devices: PathBuf,

        /// Write the resulting registry state to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Repeat conflict scans every `scan_interval`
    Watch {
        /// Configuration YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Device inventory (YAML or JSON)
        #[arg(short, long)]
        devices: PathBuf,

        /// Stop after this many scans (runs until killed otherwise)
        #[arg(long)]
        rounds: Option<u32>,
    },

    /// Classify addresses and report duplicates among them
    Inspect {
        /// Addresses to inspect
        #[arg(required = true)]
        ips: Vec<String>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    match cli.command {
        Commands::Allocate {
            parent,
            hosts,
            order,
            config,
        } => run_allocate(parent, &hosts, order, config.as_deref(), cli.json),
        Commands::Divide { parent, count } => run_divide(parent, count, cli.json),
        Commands::Scan {
            config,
            devices,
            output,
        } => run_scan(&config, &devices, output.as_deref(), cli.json),
        Commands::Watch {
            config,
            devices,
            rounds,
        } => run_watch(&config, &devices, rounds, cli.json),
        Commands::Inspect { ips } => run_inspect(&ips, cli.json),
    }
}

fn run_allocate(
    parent: CidrBlock,
    hosts: &[u32],
    order: Option<AllocationOrder>,
    config_path: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = config_path.map(|path| load_config(path)).transpose()?;
    let plan = build_allocator(order, config.as_ref()).allocate(parent, hosts)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{}", render_plan(&plan));
    }

    // incomplete plans exit non-zero after printing what did fit
    plan.into_result()?;
    Ok(())
}

/// Allocator for the CLI. The quarantine block (configured or default) is
/// always held back; `order` overrides the configured order.
fn build_allocator(
    order: Option<AllocationOrder>,
    config: Option<&Config>,
) -> AddressSpaceAllocator {
    let order = order
        .or(config.map(|c| c.allocation_order))
        .unwrap_or_default();
    let quarantine = config.map_or(DEFAULT_QUARANTINE_BLOCK, |c| c.quarantine_block);
    AddressSpaceAllocator::new(order).with_reserved(quarantine)
}

fn render_plan(plan: &AllocationPlan) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("=".repeat(84));
    lines.push(format!("VLSM ALLOCATION FOR {}", plan.parent));
    lines.push("=".repeat(84));
    lines.push(format!(
        "{:<5} {:<10} {:<20} {:<16} {:<16} {:<8}",
        "Rank", "Requested", "Subnet", "First Usable", "Last Usable", "Usable"
    ));
    lines.push("-".repeat(84));
    for subnet in &plan.subnets {
        lines.push(format!(
            "{:<5} {:<10} {:<20} {:<16} {:<16} {:<8}",
            subnet.rank,
            subnet.requested_hosts,
            subnet.block.to_string(),
            subnet.first_usable.to_string(),
            subnet.last_usable.to_string(),
            subnet.usable_hosts
        ));
    }
    lines.push("-".repeat(84));
    lines.push(format!(
        "Allocated {} of {} addresses",
        plan.allocated_addresses(),
        plan.parent.capacity()
    ));
    if !plan.unplaced.is_empty() {
        let unplaced: Vec<String> = plan.unplaced.iter().map(|h| h.to_string()).collect();
        lines.push(format!("Unplaced requirements: {}", unplaced.join(", ")));
    }

    lines.join("\n")
}

fn run_divide(parent: CidrBlock, count: u32, json: bool) -> Result<()> {
    let subnets = divide_equal(parent, count)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&subnets)?);
        return Ok(());
    }

    println!("{} divided into {} subnets:", parent, subnets.len());
    for (i, subnet) in subnets.iter().enumerate() {
        println!(
            "  {:>3}. {:<20} {} usable hosts",
            i + 1,
            subnet.to_string(),
            subnet.usable_hosts()
        );
    }
    Ok(())
}

fn load_engine(
    config_path: &Path,
    devices_path: &Path,
) -> Result<(Config, ConflictEngine<InMemoryRegistry>)> {
    let config = load_config(config_path)?;
    let registry = InMemoryRegistry::from_inventory_file(devices_path)
        .wrap_err_with(|| format!("Failed to load device inventory '{}'", devices_path.display()))?;
    let engine = ConflictEngine::from_config(registry, &config)?;
    Ok((config, engine))
}

fn print_scan(
    summary: &ScanSummary,
    engine: &ConflictEngine<InMemoryRegistry>,
    json: bool,
) -> Result<()> {
    let report = engine.report()?;
    if json {
        let value = json!({ "scan": summary, "report": report });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!(
            "Resolved {} conflicts ({} duplicate, {} unauthorized)",
            summary.total(),
            summary.duplicates_resolved,
            summary.unauthorized_resolved
        );
        println!("{}", report.render_text());
    }
    Ok(())
}

fn run_scan(
    config_path: &Path,
    devices_path: &Path,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let (config, mut engine) = load_engine(config_path, devices_path)?;

    let summary = engine.run_full_scan(&config.authorized_blocks, &ScanCancel::new())?;
    print_scan(&summary, &engine, json)?;
    check_conflict_alerts(engine.registry(), &mut LogAlertSink)?;

    if let Some(path) = output {
        engine
            .registry()
            .export_json(path)
            .wrap_err_with(|| format!("Failed to write registry state to '{}'", path.display()))?;
    }
    Ok(())
}

fn run_watch(
    config_path: &Path,
    devices_path: &Path,
    rounds: Option<u32>,
    json: bool,
) -> Result<()> {
    let (config, mut engine) = load_engine(config_path, devices_path)?;
    let cancel = ScanCancel::new();
    let mut sink = LogAlertSink;

    info!(
        "Watching {} authorized blocks every {:?}",
        config.authorized_blocks.len(),
        config.scan_interval
    );

    let mut round = 0u32;
    loop {
        round += 1;
        info!("Scan round {}", round);

        let summary = engine.run_full_scan(&config.authorized_blocks, &cancel)?;
        print_scan(&summary, &engine, json)?;

        let devices: Vec<_> = engine.registry().devices().cloned().collect();
        let samples = sample_utilization(&config.authorized_blocks, &devices);
        send_utilization_alert(&check_utilization(&samples, &config.thresholds), &mut sink);
        check_conflict_alerts(engine.registry(), &mut sink)?;

        if rounds.is_some_and(|limit| round >= limit) {
            break;
        }
        thread::sleep(config.scan_interval);
    }

    info!("Watch finished after {} rounds", round);
    Ok(())
}

fn run_inspect(values: &[String], json: bool) -> Result<()> {
    let summary = summarize_ip_list(values);
    let valid: Vec<Ipv4Addr> = values.iter().filter_map(|v| v.parse().ok()).collect();
    let duplicates = count_duplicates(&valid);

    if !summary.invalid_ips.is_empty() {
        warn!("Ignoring invalid addresses: {}", summary.invalid_ips.join(", "));
    }

    if json {
        let addresses: Vec<_> = valid
            .iter()
            .map(|ip| json!({ "ip": ip, "class": ip_class(*ip), "private": is_private(*ip) }))
            .collect();
        let duplicates: Vec<_> = duplicates
            .iter()
            .map(|(ip, count)| json!({ "ip": ip, "count": count }))
            .collect();
        let value = json!({ "summary": summary, "addresses": addresses, "duplicates": duplicates });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for ip in &valid {
        let scope = if is_private(*ip) { "private" } else { "public" };
        println!("{:<16} {:<20} {}", ip.to_string(), ip_class(*ip).to_string(), scope);
    }
    println!(
        "{} addresses: {} valid ({} private, {} public), {} invalid",
        summary.total, summary.valid, summary.private, summary.public, summary.invalid
    );
    for (ip, count) in &duplicates {
        println!("DUPLICATE: {} appears {} times", ip, count);
    }
    Ok(())
}
