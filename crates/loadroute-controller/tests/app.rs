use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use loadroute_controller::{
    Action, App, DryRunDatapath, DryRunLog, Event, FlowMod, FlowStat, Match, ReadinessMarker,
};
use loadroute_core::config::MonitoringOpts;
use loadroute_core::{
    addr, testing, Bytes, Config, Dpid, EvaluateError, Evaluation, NodeId, PathCache, Policy,
    Port, Route, RouteTable,
};
use loadroute_utils::StateFiles;
use tempfile::TempDir;

fn h(n: u32) -> NodeId {
    NodeId::host(n)
}

fn s(n: u32) -> NodeId {
    NodeId::switch(n)
}

fn ip(n: u32) -> Ipv4Addr {
    addr::host_ip(h(n)).unwrap()
}

struct Harness {
    app: App,
    logs: Vec<Arc<Mutex<DryRunLog>>>,
    files: StateFiles,
    _dir: TempDir,
}

/// The triangle topology with every switch connected through a dry-run datapath.
fn triangle_app(policy: Policy) -> anyhow::Result<Harness> {
    let dir = tempfile::tempdir()?;
    let files = StateFiles::new(dir.path(), "triangle.json")?;
    files.prepare()?;
    let topology = testing::triangle_topology()?;
    let cache = Arc::new(PathCache::compute(&topology));
    let config = Config::builder()
        .policy(policy)
        .monitoring(MonitoringOpts::builder().interval(0.05).build())
        .build();
    let marker = ReadinessMarker::new(files.marker(), 0).with_pause(Duration::ZERO, Duration::ZERO);
    let mut app = App::new(topology, cache, config, files.clone(), Some(3))?.with_marker(marker);
    let (tx, _rx) = crossbeam_channel::unbounded();
    let mut logs = Vec::new();
    for dpid in 1..=3 {
        let datapath = DryRunDatapath::new(Dpid::new(dpid), tx.clone());
        logs.push(datapath.log());
        app.handle_event(Event::Connected(Box::new(datapath)));
    }
    Ok(Harness {
        app,
        logs,
        files,
        _dir: dir,
    })
}

fn rules(log: &Arc<Mutex<DryRunLog>>) -> Vec<FlowMod> {
    log.lock().unwrap().rules()
}

fn stat(src: u32, dst: u32, port: u32, bytes: u64) -> FlowStat {
    FlowStat::new(
        5,
        Match::ipv4(Some(ip(src)), ip(dst)),
        Action::Output(Port::new(port)),
        Bytes::new(bytes),
    )
}

/// Both `h1-h3` and `h2-h4` exchanging 40 Mbps each way over the direct `s1 - s2` link, measured
/// over the 50 ms interval.
fn load_shared_link(app: &mut App) {
    let bytes = 250_000;
    app.handle_event(Event::StatsReply {
        dpid: Dpid::new(1),
        stats: vec![
            stat(1, 3, 5, bytes),
            stat(3, 1, 1, bytes),
            stat(2, 4, 5, bytes),
            stat(4, 2, 2, bytes),
        ],
    });
    app.handle_event(Event::StatsReply {
        dpid: Dpid::new(2),
        stats: vec![
            stat(1, 3, 3, bytes),
            stat(3, 1, 5, bytes),
            stat(2, 4, 4, bytes),
            stat(4, 2, 5, bytes),
        ],
    });
}

fn wait_for_marker(files: &StateFiles, lines: usize) -> anyhow::Result<Vec<String>> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let contents = std::fs::read_to_string(files.marker())?;
        let names = contents.lines().map(str::to_owned).collect::<Vec<_>>();
        if names.len() >= lines || Instant::now() > deadline {
            return Ok(names);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn switches_bootstrap_and_announce_themselves() -> anyhow::Result<()> {
    let harness = triangle_app(Policy::LdrSingle)?;
    for dpid in 1..=3 {
        assert!(harness.app.switch(Dpid::new(dpid)).is_some());
    }
    let mut names = wait_for_marker(&harness.files, 3)?;
    names.sort();
    assert_eq!(names, vec!["s1", "s2", "s3"]);

    // Dynamic policies start from the shortest paths
    let s1_rules = rules(&harness.logs[0]);
    assert!(s1_rules.contains(&FlowMod::new(
        1,
        Match::ipv4(None, ip(3)),
        Action::Output(Port::new(5))
    )));
    assert!(s1_rules.contains(&FlowMod::new(
        5,
        Match::ipv4(Some(ip(1)), ip(3)),
        Action::Output(Port::new(5))
    )));
    assert_eq!(
        harness.app.routes().get((h(1), h(3))),
        Route::SinglePath(vec![h(1), s(1), s(2), h(3)])
    );
    Ok(())
}

#[test]
fn static_policies_install_no_dynamic_rules() -> anyhow::Result<()> {
    let harness = triangle_app(Policy::Ospf)?;
    assert!(harness
        .logs
        .iter()
        .flat_map(rules)
        .all(|rule| rule.priority == 1));
    Ok(())
}

#[test]
fn applied_routes_reach_switches_and_state() -> anyhow::Result<()> {
    let mut harness = triangle_app(Policy::LdrSingle)?;
    let detour = Route::SinglePath(vec![h(1), s(1), s(3), s(2), h(3)]);
    let mut update = RouteTable::default();
    update.set((h(1), h(3)), detour.clone());
    harness.app.apply(Ok(Evaluation::new(update, None)));

    assert_eq!(harness.app.routes().get((h(1), h(3))), detour);
    assert!(rules(&harness.logs[2]).contains(&FlowMod::new(
        5,
        Match::ipv4(Some(ip(1)), ip(3)),
        Action::Output(Port::new(7))
    )));
    let state = std::fs::read_to_string(harness.files.state())?;
    assert!(state.contains("{('h1', 's1', 's3', 's2', 'h3'): 1.0}\n"));
    assert!(state.starts_with("@start.path\n"));
    assert!(state.ends_with("@end.load\n"));
    Ok(())
}

#[test]
fn failed_evaluation_changes_nothing() -> anyhow::Result<()> {
    let mut harness = triangle_app(Policy::Ldr)?;
    let before = harness.app.routes().clone();
    harness
        .app
        .apply(Err(EvaluateError::Panicked("solver crashed".into())));
    assert_eq!(harness.app.routes(), &before);
    assert!(harness.app.carried().is_none());
    Ok(())
}

#[test]
fn stale_events_are_ignored() -> anyhow::Result<()> {
    let mut harness = triangle_app(Policy::Ospf)?;
    harness.app.handle_event(Event::Disconnected(Dpid::new(3)));
    assert!(harness.app.switch(Dpid::new(3)).is_none());
    harness.app.handle_event(Event::StatsReply {
        dpid: Dpid::new(3),
        stats: vec![stat(1, 3, 7, 1_000)],
    });
    assert!(harness.app.snapshot().switch(s(3)).is_none());
    Ok(())
}

#[test]
fn minmax_cycle_moves_one_pair_off_the_shared_link() -> anyhow::Result<()> {
    let mut harness = triangle_app(Policy::MinMaxSingle)?;
    load_shared_link(&mut harness.app);
    let before = harness.app.snapshot();
    assert!((before.link_usage().get((s(1), s(2))) - 1.6).abs() < 1e-9);

    harness.app.tick();
    let outcome = harness.app.results().recv_timeout(Duration::from_secs(30))?;
    harness.app.apply(outcome);

    let via_s3 = [(h(1), h(3)), (h(2), h(4))]
        .into_iter()
        .filter(|&pair| match harness.app.routes().get(pair) {
            Route::SinglePath(path) => path.contains(&s(3)),
            Route::WeightedPaths(_) => false,
        })
        .count();
    assert_eq!(via_s3, 1);
    assert!(harness.files.state().is_file());
    Ok(())
}

#[test]
fn ldr_cycle_carries_its_prediction() -> anyhow::Result<()> {
    let mut harness = triangle_app(Policy::Ldr)?;
    load_shared_link(&mut harness.app);
    harness.app.tick();
    let outcome = harness.app.results().recv_timeout(Duration::from_secs(30))?;
    harness.app.apply(outcome);
    assert!(harness.app.carried().is_some());
    assert!(matches!(
        harness.app.routes().get((h(1), h(3))),
        Route::WeightedPaths(_)
    ));
    Ok(())
}
