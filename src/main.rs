use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;
use memfabric::sim::system::{System, SystemConfig};

#[derive(Parser)]
#[command(version, about)]
struct MemFabricArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override simulation timeout in cycles")]
    timeout: Option<u64>,
    #[arg(long, help = "Clock unit groups on separate threads")]
    parallel: Option<bool>,
    #[arg(long, help = "Override traffic generator seed")]
    seed: Option<u64>,
    #[arg(long, help = "Write statistics as JSON to this path instead of stdout")]
    stats_json: Option<PathBuf>,
}

pub fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let argv = MemFabricArgs::parse();
    let text = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read config file {}", argv.config_path.display()))?;
    let mut config = SystemConfig::from_toml(&text)?;

    // override toml configs with argv
    config.sim.timeout = argv.timeout.unwrap_or(config.sim.timeout);
    config.sim.parallel = argv.parallel.unwrap_or(config.sim.parallel);
    config.traffic.seed = argv.seed.unwrap_or(config.traffic.seed);

    let mut system = System::new(&config)?;
    let report = system.run()?;
    info!(
        "{} cycles, l1 hit rate {:.3}, l2 hit rate {:.3}, {} mismatches",
        report.cycles,
        report.l1.hit_rate(),
        report.l2.hit_rate(),
        report.traffic.mismatches
    );

    let json = serde_json::to_string_pretty(&report)?;
    match argv.stats_json {
        Some(path) => fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{}", json),
    }

    if report.traffic.mismatches > 0 {
        anyhow::bail!("{} loads returned unexpected data", report.traffic.mismatches);
    }
    Ok(())
}
