//! The event loop tying switches, the evaluation worker and the state file together.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use crossbeam_channel::{select, Receiver};
use log::{debug, info, warn};
use loadroute_core::route::shortest_routes;
use loadroute_core::{
    Config, Dpid, Evaluation, PathCache, Policy, Prediction, Route, RouteTable, SimNetwork, Topology,
    UsageStore,
};
use loadroute_utils::{state, StateFiles};

use crate::groups::GroupTable;
use crate::marker::ReadinessMarker;
use crate::southbound::{Datapath, Event, FlowStat};
use crate::switch::{SwitchController, SwitchError};
use crate::worker::{EvalWorker, Job, Outcome};

/// The controller application.
///
/// All switch state lives on the thread calling [`run`](App::run); only network snapshots cross
/// over to the evaluation worker.
#[derive(Debug)]
pub struct App {
    topology: Topology,
    cache: Arc<PathCache>,
    capacity: Arc<UsageStore<f64>>,
    config: Config,
    files: StateFiles,
    marker: ReadinessMarker,
    switches: BTreeMap<Dpid, SwitchController>,
    groups: GroupTable,
    routes: RouteTable,
    carried: Option<Prediction>,
    worker: EvalWorker,
}

impl App {
    /// Creates the application and starts the evaluation worker for the configured policy.
    /// Every host pair starts on its shortest path.
    pub fn new(
        topology: Topology,
        cache: Arc<PathCache>,
        config: Config,
        files: StateFiles,
        seed: Option<u64>,
    ) -> io::Result<Self> {
        let evaluator =
            evaluator_impls::for_policy(config.policy, Arc::clone(&cache), &config, seed);
        let marker = ReadinessMarker::new(files.marker(), config.monitoring.marker_retries);
        Ok(Self {
            capacity: Arc::new(topology.capacities()),
            routes: shortest_routes(&cache),
            topology,
            cache,
            config,
            files,
            marker,
            switches: BTreeMap::new(),
            groups: GroupTable::new(),
            carried: None,
            worker: EvalWorker::spawn(evaluator)?,
        })
    }

    /// Replaces the readiness marker, e.g. to shorten its pauses.
    pub fn with_marker(mut self, marker: ReadinessMarker) -> Self {
        self.marker = marker;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn switch(&self, dpid: Dpid) -> Option<&SwitchController> {
        self.switches.get(&dpid)
    }

    pub fn groups(&self) -> &GroupTable {
        &self.groups
    }

    pub fn carried(&self) -> Option<&Prediction> {
        self.carried.as_ref()
    }

    /// Completed evaluations waiting to be applied.
    pub fn results(&self) -> &Receiver<Outcome> {
        self.worker.results()
    }

    /// Serves events until `shutdown` fires or every event source is gone. Stats are polled and
    /// an evaluation is submitted every monitoring interval.
    pub fn run(mut self, events: Receiver<Event>, shutdown: Receiver<()>) -> anyhow::Result<()> {
        let ticker = crossbeam_channel::tick(self.config.monitoring.interval());
        let results = self.worker.results().clone();
        info!(
            "Monitoring every {:?} with policy {}",
            self.config.monitoring.interval(),
            self.config.policy
        );
        loop {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
                recv(ticker) -> _ => self.tick(),
                recv(results) -> outcome => {
                    if let Ok(outcome) = outcome {
                        self.apply(outcome);
                    }
                }
                recv(shutdown) -> _ => {
                    info!("Shutting down");
                    break;
                }
            }
        }
        self.worker.shutdown();
        Ok(())
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected(datapath) => self.connect(datapath),
            Event::Disconnected(dpid) => {
                if let Some(sw) = self.switches.remove(&dpid) {
                    info!("Switch disconnected: {}", sw.name());
                }
            }
            Event::StatsReply { dpid, stats } => self.on_stats(dpid, &stats),
        }
    }

    fn connect(&mut self, datapath: Box<dyn Datapath>) {
        let dpid = datapath.id();
        if self.switches.contains_key(&dpid) {
            debug!("Datapath {dpid} is already connected");
            return;
        }
        match self.bootstrap(datapath) {
            Ok(sw) => {
                info!("Switch connected: {}", sw.name());
                self.marker.announce(sw.name());
                self.switches.insert(dpid, sw);
            }
            Err(e) => warn!("Failed to bootstrap datapath {dpid}: {e}"),
        }
    }

    fn bootstrap(&mut self, datapath: Box<dyn Datapath>) -> Result<SwitchController, SwitchError> {
        let mut sw = SwitchController::new(datapath, &self.topology)?;
        sw.install_fallback(&self.cache)?;
        if self.config.policy == Policy::Ecmp {
            sw.install_ecmp(&self.cache, &mut self.groups)?;
        }
        if self.config.policy.is_dynamic() {
            for (_, route) in self.routes.iter() {
                sw.install_route(route, &mut self.groups)?;
            }
        }
        sw.request_stats()?;
        Ok(sw)
    }

    fn on_stats(&mut self, dpid: Dpid, stats: &[FlowStat]) {
        let interval = self.config.monitoring.interval();
        // Replies from switches that went away are dropped
        if let Some(sw) = self.switches.get_mut(&dpid) {
            sw.on_stats(stats, &self.groups, interval);
        }
    }

    /// One monitoring round: request stats, persist the state and submit an evaluation.
    pub fn tick(&mut self) {
        let failed = self
            .switches
            .iter_mut()
            .filter_map(|(&dpid, sw)| match sw.request_stats() {
                Ok(()) => None,
                Err(e) => {
                    warn!("Stats request to {} failed: {e}", sw.name());
                    Some(dpid)
                }
            })
            .collect::<Vec<_>>();
        self.drop_switches(failed);
        let snapshot = self.snapshot();
        self.write_state(&snapshot);
        if !self.worker.submit(Job::new(snapshot, self.carried.clone())) {
            debug!("Evaluation still running, skipping this round");
        }
    }

    /// An independent copy of the measured network and the current routes.
    pub fn snapshot(&self) -> SimNetwork {
        SimNetwork::new(
            self.switches.values().map(SwitchController::snapshot).collect::<Vec<_>>(),
            Arc::clone(&self.capacity),
            self.routes.clone(),
        )
    }

    /// Applies a finished evaluation. A failed one leaves routes and carried state untouched.
    pub fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Ok(Evaluation { routes, carried }) => {
                if let Some(carried) = carried {
                    self.carried = Some(carried);
                }
                self.install(routes);
                let snapshot = self.snapshot();
                self.write_state(&snapshot);
            }
            Err(e) => warn!("Evaluation failed, keeping current routes: {e}"),
        }
    }

    fn install(&mut self, updates: RouteTable) {
        let mut failed = Vec::new();
        let mut updated = 0;
        for (pair, route) in updates.iter() {
            if route.is_empty() {
                continue;
            }
            for (&dpid, sw) in self.switches.iter_mut() {
                if let Err(e) = sw.install_route(route, &mut self.groups) {
                    warn!("Failed to install {pair} on {}: {e}", sw.name());
                    failed.push(dpid);
                }
            }
            self.routes.set(pair, Route::clone(route));
            updated += 1;
        }
        self.drop_switches(failed);
        if updated > 0 {
            info!("Routes updated for {updated} host pairs");
        }
    }

    /// Forgets switches whose connection failed. They bootstrap again on reconnect.
    fn drop_switches(&mut self, dpids: Vec<Dpid>) {
        for dpid in dpids {
            if let Some(sw) = self.switches.remove(&dpid) {
                warn!("Dropping switch {}", sw.name());
            }
        }
    }

    fn write_state(&self, network: &SimNetwork) {
        if let Err(e) = state::write_state(self.files.state(), &self.routes, network.link_usage()) {
            warn!("Failed to write {}: {e}", self.files.state().display());
        }
    }
}
