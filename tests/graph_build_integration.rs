use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use milepath::config::PathingConfig;
use milepath::pathing::cache::{cache_path, load_graph, map_data_hash, save_graph};
use milepath::pathing::{
    BuildError, CacheError, Error, GamePos, GraphSettings, MapDataSource, MapPathing, MapSpecificData, MilePath,
    MilePathWorker, PathingPlane, PathingTrapezoid, StaticMapSource, Teleport, TeleportDirection,
};

/// Horizontal strip of 10x10 cells; cell `i` sits on plane `layers[i]`.
fn layered_strip(map_id: u32, layers: &[u32]) -> MapSpecificData {
    let plane_count = layers.iter().copied().max().map_or(0, |l| l as usize + 1);
    let mut planes = vec![PathingPlane::default(); plane_count];
    for (i, &layer) in layers.iter().enumerate() {
        let x = i as f32 * 10.0;
        planes[layer as usize].trapezoids.push(PathingTrapezoid::rect(x, 0.0, x + 10.0, 10.0));
    }
    MapSpecificData { map_id, planes, teleports: Vec::new() }
}

fn strip(map_id: u32, cells: usize) -> MapSpecificData {
    layered_strip(map_id, &vec![0; cells])
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("milepath_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Holds `load` until the test lets it through, so cancellation and
/// not-ready states can be observed deterministically.
struct GatedSource {
    gate: Mutex<Receiver<()>>,
    inner: StaticMapSource,
}

impl GatedSource {
    fn new(inner: StaticMapSource) -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self { gate: Mutex::new(rx), inner }), tx)
    }
}

impl MapDataSource for GatedSource {
    fn load(&self, map_id: u32) -> Option<MapSpecificData> {
        let _ = self.gate.lock().unwrap().recv();
        self.inner.load(map_id)
    }
}

#[test]
fn test_worker_builds_graph() {
    let source = Arc::new(StaticMapSource::new().with_map(strip(1, 4)));
    let mut worker = MilePathWorker::spawn(1, source, PathingConfig::default()).expect("spawn worker");

    let mp = worker.wait().expect("build succeeds");
    println!("Built map {}: {} points, {} edges", mp.map_id, mp.points.len(), mp.edge_count());

    assert_eq!(worker.progress(), 100);
    assert!(worker.ready());
    assert!(!worker.is_processing());
    assert!(worker.error().is_none());
    assert!(mp.ready());
    assert_eq!(mp.portals.len(), 3);
    assert!(Arc::ptr_eq(&mp, &worker.graph().expect("graph published")));
}

#[test]
fn test_missing_map_data() {
    let source = Arc::new(StaticMapSource::new());
    let mut worker = MilePathWorker::spawn(42, source.clone(), PathingConfig::default()).expect("spawn worker");

    assert_eq!(worker.wait().err(), Some(BuildError::MissingMapData(42)));
    assert!(!worker.ready());
    assert!(worker.progress() < 100);
    assert!(worker.graph().is_none());

    let mut pathing = MapPathing::new(source, PathingConfig::default());
    pathing.on_map_changed(42).expect("spawn worker");
    let _ = pathing.worker_mut().expect("worker running").wait();
    let result = pathing.search(GamePos::new(1.0, 1.0, 0), GamePos::new(2.0, 2.0, 0));
    assert_eq!(result.err(), Some(Error::FailedToGetPathingMapBlock));
}

#[test]
fn test_cancel_stops_build() {
    let (source, gate) = GatedSource::new(StaticMapSource::new().with_map(strip(5, 6)));
    let mut worker = MilePathWorker::spawn(5, source, PathingConfig::default()).expect("spawn worker");

    assert!(worker.is_processing(), "processing is set before the thread runs");
    worker.stop_processing();
    // The worker may notice the cancel before it ever loads
    let _ = gate.send(());

    assert_eq!(worker.wait().err(), Some(BuildError::Cancelled(5)));
    assert!(!worker.ready());
    assert!(!worker.is_processing());
    assert!(worker.graph().is_none());

    // Shutting down a finished worker is a no-op
    worker.shutdown();
}

#[test]
fn test_search_before_ready() {
    let (source, gate) = GatedSource::new(StaticMapSource::new().with_map(strip(8, 3)));
    let mut pathing = MapPathing::new(source, PathingConfig::default());
    pathing.on_map_changed(8).expect("spawn worker");

    let start = GamePos::new(1.0, 5.0, 0);
    let goal = GamePos::new(29.0, 5.0, 0);
    assert_eq!(pathing.search(start, goal).err(), Some(Error::InvalidMapContext));
    assert!(!pathing.ready());
    assert!(!pathing.is_on_pathing_trapezoid(start), "no graph yet");

    gate.send(()).unwrap();
    pathing.worker_mut().expect("worker running").wait().expect("build succeeds");

    assert!(pathing.ready());
    assert_eq!(pathing.progress(), 100);
    let path = pathing.search(start, goal).expect("strip is connected");
    assert!((path.cost() - 28.0).abs() < 1e-3);
}

#[test]
fn test_map_change_replaces_worker() {
    let source = Arc::new(StaticMapSource::new().with_map(strip(1, 2)).with_map(strip(2, 5)));
    let mut pathing = MapPathing::new(source, PathingConfig::default());

    pathing.on_map_changed(1).expect("spawn worker");
    pathing.on_map_changed(2).expect("spawn worker");
    let mp = pathing.worker_mut().expect("worker running").wait().expect("build succeeds");

    assert_eq!(pathing.map_id(), Some(2));
    assert_eq!(mp.map_id, 2);
    assert_eq!(mp.trapezoids.len(), 5);

    assert!(pathing.is_on_pathing_trapezoid(GamePos::new(45.0, 5.0, 0)));
    assert!(!pathing.is_on_pathing_trapezoid(GamePos::new(45.0, 50.0, 0)));
    let snapped = pathing.get_closest_point(GamePos::new(45.0, 50.0, 0)).expect("graph ready");
    assert!(snapped.distance(GamePos::new(45.0, 10.0, 0)) < 1e-3);
}

#[test]
fn test_blocking_ids_match_crossed_layers() {
    let layers = [0, 1, 1, 0, 2, 2, 1];
    let mp = MilePath::from_map_data(layered_strip(3, &layers), GraphSettings::default());
    assert_eq!(mp.portals.len(), layers.len() - 1, "cells on nearby planes still connect");

    let mut checked = 0;
    for (p, edges) in mp.vis_graph.iter().enumerate() {
        let from = &mp.points[p];
        for e in edges {
            let to = &mp.points[e.point_id as usize];
            let (lo, hi) = (from.pos.x.min(to.pos.x), from.pos.x.max(to.pos.x));

            // Layers of the cells strictly between the two x positions
            let mut expected: Vec<u32> = Vec::new();
            for (i, &layer) in layers.iter().enumerate() {
                let (x0, x1) = (i as f32 * 10.0, i as f32 * 10.0 + 10.0);
                if x0 < hi && x1 > lo && layer != from.layer && !expected.contains(&layer) {
                    expected.push(layer);
                }
            }
            expected.sort_unstable();

            assert_eq!(
                e.blocking_ids.to_vec(),
                expected,
                "edge {:?} -> {:?} (layer {})",
                from.pos,
                to.pos,
                from.layer
            );
            assert!(!e.blocking_ids.contains(&from.layer), "an edge never blocks on its own layer");
            checked += 1;
        }
    }
    println!("Checked {} edges", checked);
    assert!(checked > 0);
}

#[test]
fn test_teleports_survive_build() {
    let mut data = strip(6, 3);
    data.planes[0].trapezoids.push(PathingTrapezoid::rect(100.0, 0.0, 110.0, 10.0));
    data.teleports.push(Teleport {
        enter: GamePos::new(25.0, 5.0, 0),
        exit: GamePos::new(105.0, 5.0, 0),
        direction: TeleportDirection::BothWays,
    });
    // Far off the mesh, dropped with a warning
    data.teleports.push(Teleport {
        enter: GamePos::new(5000.0, 5000.0, 0),
        exit: GamePos::new(5.0, 5.0, 0),
        direction: TeleportDirection::OneWay,
    });
    let mp = MilePath::from_map_data(data, GraphSettings::default());

    assert_eq!(mp.teleports.len(), 2);
    assert_eq!(mp.teleport_jumps.len(), 2, "two-way teleport gives two jumps, the off-mesh one none");
    assert_eq!(mp.teleport_graph.len(), 2);
    assert!(mp.teleport_graph.iter().all(|n| n.distance == 0.0), "both jumps start where the other lands");
    assert_eq!(mp.points.len(), 4 + 4, "portal points plus an enter and exit per jump");
}

#[test]
fn test_graph_cache_round_trip() {
    let dir = temp_dir("cache_round_trip");
    let data = strip(11, 4);
    let hash = map_data_hash(&data).expect("hash map data");
    let mp = MilePath::from_map_data(data, GraphSettings::default());
    let path = cache_path(&dir, 11);

    save_graph(&path, &mp, hash).expect("save graph");
    let loaded = load_graph(&path, 11, &GraphSettings::default(), hash).expect("load graph");
    assert_eq!(loaded.portals, mp.portals);
    assert_eq!(loaded.points, mp.points);
    assert_eq!(loaded.vis_graph, mp.vis_graph);
    assert!(loaded.ready());

    assert!(matches!(
        load_graph(&path, 12, &GraphSettings::default(), hash),
        Err(CacheError::MapMismatch { found: 11, expected: 12 })
    ));
    let other = GraphSettings { max_visibility_range: 100.0, ..GraphSettings::default() };
    assert!(matches!(load_graph(&path, 11, &other, hash), Err(CacheError::StaleSettings)));

    // Same map id, edited geometry
    let edited = map_data_hash(&strip(11, 5)).expect("hash map data");
    assert_ne!(edited, hash);
    assert!(matches!(
        load_graph(&path, 11, &GraphSettings::default(), edited),
        Err(CacheError::StaleMapData)
    ));

    std::fs::write(&path, b"not a graph").unwrap();
    assert!(load_graph(&path, 11, &GraphSettings::default(), hash).is_err());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_worker_uses_graph_cache() {
    let dir = temp_dir("worker_cache");
    let config = PathingConfig {
        use_graph_cache: true,
        cache_dir: dir.clone(),
        ..PathingConfig::default()
    };

    let source = Arc::new(StaticMapSource::new().with_map(strip(21, 3)));
    let mut first = MilePathWorker::spawn(21, source.clone(), config.clone()).expect("spawn worker");
    let built = first.wait().expect("build succeeds");
    let path = cache_path(&dir, 21);
    assert!(path.exists(), "finished graph is written to the cache");

    // Plant a different graph under the same map data: a cache hit returns it
    let planted = MilePath::from_map_data(strip(21, 6), GraphSettings::default());
    let hash = map_data_hash(&strip(21, 3)).expect("hash map data");
    save_graph(&path, &planted, hash).expect("save graph");
    let mut second = MilePathWorker::spawn(21, source, config.clone()).expect("spawn worker");
    let cached = second.wait().expect("graph comes from the cache");
    assert_eq!(cached.points, planted.points);
    assert_ne!(cached.points, built.points);
    assert!(second.ready());

    // Edited geometry under the same id rebuilds instead of trusting the file
    let edited = Arc::new(StaticMapSource::new().with_map(strip(21, 4)));
    let mut third = MilePathWorker::spawn(21, edited, config).expect("spawn worker");
    let rebuilt = third.wait().expect("build succeeds");
    assert_eq!(rebuilt.trapezoids.len(), 4);
    assert_eq!(rebuilt.portals.len(), 3);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_empty_map_is_not_ready() {
    let empty = MapSpecificData { map_id: 30, planes: Vec::new(), teleports: Vec::new() };
    let source = Arc::new(StaticMapSource::new().with_map(empty));
    let mut worker = MilePathWorker::spawn(30, source.clone(), PathingConfig::default()).expect("spawn worker");

    assert_eq!(worker.wait().err(), Some(BuildError::MissingMapData(30)));
    assert!(!worker.ready());
    assert!(worker.progress() < 100);
    assert!(worker.graph().is_none());

    let mut pathing = MapPathing::new(source, PathingConfig::default());
    pathing.on_map_changed(30).expect("spawn worker");
    let _ = pathing.worker_mut().expect("worker running").wait();
    assert!(!pathing.ready());
    let result = pathing.search(GamePos::new(1.0, 1.0, 0), GamePos::new(2.0, 2.0, 0));
    assert_eq!(result.err(), Some(Error::FailedToGetPathingMapBlock));
}

#[test]
fn test_map_formats() {
    let ron_map = r#"(
        map_id: 7,
        planes: [
            (trapezoids: [(xtl: 0.0, xtr: 10.0, yt: 10.0, xbl: 0.0, xbr: 10.0, yb: 0.0)]),
        ],
        teleports: [
            (enter: (x: 2.0, y: 2.0, layer: 0), exit: (x: 8.0, y: 8.0, layer: 0), direction: OneWay),
        ],
    )"#;
    let data = MapSpecificData::from_ron_str(ron_map).expect("valid RON map");
    assert_eq!(data.map_id, 7);
    assert_eq!(data.trapezoid_count(), 1);
    assert_eq!(data.planes[0].height, 0.0, "height defaults when omitted");
    assert_eq!(data.teleports[0].direction, TeleportDirection::OneWay);

    let json = serde_json::to_string(&data).expect("serialize map");
    println!("{}", json);
    assert!(json.contains("\"xtl\":0.0"));
    assert!(json.contains("\"direction\":\"OneWay\""));
}
