use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use loadroute_controller::{App, DryRunDatapath, Event};
use loadroute_core::{Config, Dpid, Policy};
use loadroute_utils::StateFiles;

#[derive(Parser, Debug)]
struct Args {
    /// Topology file (JSON)
    #[arg(short, long)]
    topology: PathBuf,
    /// Configuration file (JSON). Defaults apply without one
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory for the state file, the readiness marker and the alternate-path cache
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,
    /// Routing policy, overriding the configuration file
    #[arg(short, long)]
    policy: Option<Policy>,
    /// Seed for the order in which evaluators visit host pairs
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => loadroute_utils::read_config(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    config.validate()?;

    log::info!("Loading network {}", args.topology.display());
    let topology = loadroute_utils::read_topology(&args.topology)
        .with_context(|| format!("failed to read topology {}", args.topology.display()))?;
    let files = StateFiles::new(&args.state_dir, &args.topology)?;
    files.prepare().context("failed to prepare state directory")?;
    let cache = loadroute_utils::load_or_compute_alternates(files.alternates(), &topology)
        .context("failed to load alternate paths")?;

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("failed to set interrupt handler")?;

    let app = App::new(topology, Arc::new(cache), config, files, args.seed)
        .context("failed to start evaluation worker")?;
    // No southbound transport is attached, so every switch connects as a dry run
    for sw in app.topology().switches() {
        let dpid = Dpid::new(u64::from(sw.num()));
        let datapath = DryRunDatapath::new(dpid, events_tx.clone());
        events_tx
            .send(Event::Connected(Box::new(datapath)))
            .map_err(|_| anyhow::anyhow!("event channel closed"))?;
    }
    app.run(events_rx, stop_rx)
}
