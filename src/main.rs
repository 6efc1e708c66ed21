use std::error::Error as StdError;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use milepath::config::PathingConfig;
use milepath::logging::setup_file_logging;
use milepath::pathing::{GamePos, MapPathing, MapSpecificData, StaticMapSource};

const USAGE: &str = "usage: milepath <map.ron> <start_x> <start_y> <goal_x> <goal_y> [config.ron]";

fn parse_coord(args: &[String], index: usize, name: &str) -> Result<f32, Box<dyn StdError>> {
    let raw = args.get(index).ok_or_else(|| format!("missing {name}\n{USAGE}"))?;
    Ok(raw.parse::<f32>().map_err(|e| format!("bad {name} '{raw}': {e}"))?)
}

fn run(args: &[String]) -> Result<(), Box<dyn StdError>> {
    let map_path = args.get(1).ok_or(USAGE)?;
    let start = GamePos::new(parse_coord(args, 2, "start_x")?, parse_coord(args, 3, "start_y")?, 0);
    let goal = GamePos::new(parse_coord(args, 4, "goal_x")?, parse_coord(args, 5, "goal_y")?, 0);
    let config = match args.get(6) {
        Some(path) => PathingConfig::load(path),
        None => PathingConfig::default(),
    };

    let data = MapSpecificData::load_ron(map_path)?;
    let map_id = data.map_id;
    info!("Map {} from {}: {} trapezoids", map_id, map_path, data.trapezoid_count());

    let source = Arc::new(StaticMapSource::new().with_map(data));
    let mut pathing = MapPathing::new(source, config);
    pathing.on_map_changed(map_id)?;

    let mut last_reported = 0;
    while pathing.is_processing() {
        let progress = pathing.progress();
        if progress != last_reported {
            info!("Building graph: {}%", progress);
            last_reported = progress;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    if let Some(e) = pathing.worker_mut().and_then(|w| w.error()) {
        return Err(Box::new(e));
    }

    match pathing.search(start, goal) {
        Ok(path) => {
            println!("Path from ({}, {}) to ({}, {}), cost {:.2}:", start.x, start.y, goal.x, goal.y, path.cost());
            for (i, p) in path.waypoints().enumerate() {
                println!("  {:>3}: ({:.2}, {:.2}) layer {}", i, p.x, p.y, p.layer);
            }
            Ok(())
        }
        Err(e) => Err(format!("search failed: {} (code {})", e, e.code()).into()),
    }
}

fn main() {
    let log_file = match setup_file_logging(Path::new("logs"), 25) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Failed to set up logging: {e}");
            String::from("<none>")
        }
    };

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║  milepath - Logging to file                              ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Log file: {:<45} ║", log_file);
    println!("╚══════════════════════════════════════════════════════════╝");

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        error!("{}", e);
        eprintln!("{e}");
        std::process::exit(1);
    }
}
