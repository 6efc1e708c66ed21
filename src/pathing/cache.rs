//! Per-map on-disk cache of finished graphs.
//!
//! Files are zlib-compressed bincode, tagged with a format version, the map
//! id and a hash of the map data the graph was built from, so a stale or
//! misplaced file is rejected instead of trusted.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::CacheError;
use super::map_data::MapSpecificData;
use super::milepath::{GraphSettings, MilePath};

pub const GRAPH_CACHE_VERSION: u32 = 2;

#[derive(Serialize)]
struct GraphCacheRef<'a> {
    version: u32,
    map_id: u32,
    source_hash: u64,
    graph: &'a MilePath,
}

#[derive(Deserialize)]
struct GraphCacheFile {
    version: u32,
    map_id: u32,
    source_hash: u64,
    graph: MilePath,
}

pub fn cache_path(dir: &Path, map_id: u32) -> PathBuf {
    dir.join(format!("milepath_{map_id}.bin"))
}

/// Fingerprint of the map data a graph is built from. Any change to the
/// trapezoids or teleports changes it.
pub fn map_data_hash(data: &MapSpecificData) -> Result<u64, CacheError> {
    let bytes = bincode::serialize(data)?;
    let mut hasher = FxHasher::default();
    hasher.write(&bytes);
    Ok(hasher.finish())
}

pub fn save_graph(path: &Path, graph: &MilePath, source_hash: u64) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let mut encoder = ZlibEncoder::new(writer, Compression::default());
    let record = GraphCacheRef {
        version: GRAPH_CACHE_VERSION,
        map_id: graph.map_id,
        source_hash,
        graph,
    };
    bincode::serialize_into(&mut encoder, &record)?;
    encoder.finish()?.flush()?;
    Ok(())
}

/// Load a cached graph for `map_id`, rejecting files from another format
/// version, another map, other map data (`source_hash`), or built with other
/// settings.
pub fn load_graph(
    path: &Path,
    map_id: u32,
    settings: &GraphSettings,
    source_hash: u64,
) -> Result<MilePath, CacheError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut decoder = ZlibDecoder::new(reader);
    let record: GraphCacheFile = bincode::deserialize_from(&mut decoder)?;

    if record.version != GRAPH_CACHE_VERSION {
        return Err(CacheError::VersionMismatch { found: record.version, expected: GRAPH_CACHE_VERSION });
    }
    if record.map_id != map_id || record.graph.map_id != map_id {
        return Err(CacheError::MapMismatch { found: record.map_id, expected: map_id });
    }
    if record.source_hash != source_hash {
        return Err(CacheError::StaleMapData);
    }
    if record.graph.settings != *settings || !record.graph.ready() {
        return Err(CacheError::StaleSettings);
    }
    Ok(record.graph)
}
