//! Background graph construction and the per-map pathing manager.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::PathingConfig;
use crate::profiling::profile;
use super::astar::{AStar, Path};
use super::cache;
use super::error::{BuildError, CacheError, Error};
use super::map_data::MapDataSource;
use super::math::GamePos;
use super::milepath::MilePath;

// ============================================================================
// Cancellation & progress
// ============================================================================

/// Cooperative cancellation flag shared between a worker and its owner.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Build percentage (`0..=100`, never decreasing) plus whether the worker
/// thread is still running.
#[derive(Debug, Default)]
pub struct BuildProgress {
    percent: AtomicU8,
    processing: AtomicBool,
}

impl BuildProgress {
    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Acquire)
    }

    pub fn advance(&self, percent: u8) {
        self.percent.fetch_max(percent.min(100), Ordering::AcqRel);
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    fn set_processing(&self, processing: bool) {
        self.processing.store(processing, Ordering::Release);
    }
}

pub type BuildOutcome = Result<Arc<MilePath>, BuildError>;

// ============================================================================
// Worker
// ============================================================================

/// Owns the thread building one map's graph.
///
/// The finished graph is published once, as an `Arc`, so readers never see
/// a partial build. Dropping the worker cancels and joins the thread.
pub struct MilePathWorker {
    map_id: u32,
    cancel: CancelToken,
    progress: Arc<BuildProgress>,
    result: Arc<OnceLock<BuildOutcome>>,
    handle: Option<JoinHandle<()>>,
}

impl MilePathWorker {
    pub fn spawn(map_id: u32, source: Arc<dyn MapDataSource>, config: PathingConfig) -> io::Result<Self> {
        let cancel = CancelToken::new();
        let progress = Arc::new(BuildProgress::default());
        let result: Arc<OnceLock<BuildOutcome>> = Arc::new(OnceLock::new());

        // Set before the thread exists so a caller polling right after spawn
        // never sees an idle worker without a result.
        progress.set_processing(true);

        let handle = {
            let worker_cancel = cancel.clone();
            let worker_progress = Arc::clone(&progress);
            let worker_result = Arc::clone(&result);
            let spawned = thread::Builder::new().name(format!("milepath-{map_id}")).spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_build(map_id, source.as_ref(), &config, &worker_cancel, &worker_progress)
                }))
                .unwrap_or_else(|_| {
                    error!("Graph build thread for map {} panicked", map_id);
                    Err(BuildError::WorkerPanicked(map_id))
                });

                if let Err(e) = &outcome {
                    warn!("Graph build for map {} failed: {}", map_id, e);
                }
                let succeeded = outcome.is_ok();
                let _ = worker_result.set(outcome);
                if succeeded {
                    worker_progress.advance(100);
                }
                worker_progress.set_processing(false);
            });
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    progress.set_processing(false);
                    return Err(e);
                }
            }
        };

        info!("Spawned graph build worker for map {}", map_id);
        Ok(Self {
            map_id,
            cancel,
            progress,
            result,
            handle: Some(handle),
        })
    }

    pub fn map_id(&self) -> u32 {
        self.map_id
    }

    /// Ask the build to stop at the next phase boundary. Does not wait.
    pub fn stop_processing(&self) {
        self.cancel.cancel();
    }

    pub fn is_processing(&self) -> bool {
        self.progress.is_processing()
    }

    pub fn progress(&self) -> u8 {
        self.progress.percent()
    }

    pub fn ready(&self) -> bool {
        self.progress() >= 100
    }

    pub fn outcome(&self) -> Option<&BuildOutcome> {
        self.result.get()
    }

    pub fn graph(&self) -> Option<Arc<MilePath>> {
        match self.result.get() {
            Some(Ok(mp)) => Some(Arc::clone(mp)),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<BuildError> {
        match self.result.get() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Block until the build finishes and return its outcome.
    pub fn wait(&mut self) -> BuildOutcome {
        self.join();
        self.result
            .get()
            .cloned()
            .unwrap_or(Err(BuildError::WorkerPanicked(self.map_id)))
    }

    /// Cancel and join. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.stop_processing();
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Graph build thread for map {} could not be joined", self.map_id);
                let _ = self.result.set(Err(BuildError::WorkerPanicked(self.map_id)));
                self.progress.set_processing(false);
            }
        }
    }
}

impl Drop for MilePathWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[profile(50)]
fn run_build(
    map_id: u32,
    source: &dyn MapDataSource,
    config: &PathingConfig,
    cancel: &CancelToken,
    progress: &BuildProgress,
) -> BuildOutcome {
    let settings = config.graph_settings();

    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled(map_id));
    }
    let data = source.load(map_id).ok_or(BuildError::MissingMapData(map_id))?;
    if data.trapezoid_count() == 0 {
        warn!("Map {} has no pathing trapezoids", map_id);
        return Err(BuildError::MissingMapData(map_id));
    }
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled(map_id));
    }

    let cache_entry = if config.use_graph_cache {
        match cache::map_data_hash(&data) {
            Ok(hash) => Some((cache::cache_path(&config.cache_dir, map_id), hash)),
            Err(e) => {
                warn!("Graph cache disabled for map {}: {}", map_id, e);
                None
            }
        }
    } else {
        None
    };

    if let Some((path, hash)) = &cache_entry {
        match cache::load_graph(path, map_id, &settings, *hash) {
            Ok(mp) => {
                info!("Loaded graph for map {} from cache {}", map_id, path.display());
                return Ok(Arc::new(mp));
            }
            Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No graph cache for map {} at {}", map_id, path.display());
            }
            Err(e) => warn!("Ignoring graph cache {}: {}", path.display(), e),
        }
    }

    let mp = MilePath::build_with(data, settings, |percent| {
        progress.advance(percent);
        !cancel.is_cancelled()
    })?;

    if let Some((path, hash)) = &cache_entry {
        match cache::save_graph(path, &mp, *hash) {
            Ok(()) => info!("Saved graph for map {} to {}", map_id, path.display()),
            Err(e) => warn!("Failed to save graph cache {}: {}", path.display(), e),
        }
    }
    Ok(Arc::new(mp))
}

// ============================================================================
// Manager
// ============================================================================

/// Keeps one worker for the current map, replacing it on map change, and
/// answers queries against whatever graph is ready.
pub struct MapPathing {
    source: Arc<dyn MapDataSource>,
    config: PathingConfig,
    blocked_layers: Vec<u32>,
    worker: Option<MilePathWorker>,
}

impl MapPathing {
    pub fn new(source: Arc<dyn MapDataSource>, config: PathingConfig) -> Self {
        Self {
            source,
            config,
            blocked_layers: Vec::new(),
            worker: None,
        }
    }

    pub fn config(&self) -> &PathingConfig {
        &self.config
    }

    /// Drop the previous map's graph (cancelling its build if still running)
    /// and start building `map_id`.
    pub fn on_map_changed(&mut self, map_id: u32) -> io::Result<()> {
        if let Some(mut old) = self.worker.take() {
            info!("Map changed {} -> {}, stopping previous build", old.map_id(), map_id);
            old.shutdown();
        }
        self.worker = Some(MilePathWorker::spawn(map_id, Arc::clone(&self.source), self.config.clone())?);
        Ok(())
    }

    pub fn map_id(&self) -> Option<u32> {
        self.worker.as_ref().map(MilePathWorker::map_id)
    }

    pub fn progress(&self) -> u8 {
        self.worker.as_ref().map_or(0, MilePathWorker::progress)
    }

    pub fn ready(&self) -> bool {
        self.worker.as_ref().is_some_and(MilePathWorker::ready)
    }

    pub fn is_processing(&self) -> bool {
        self.worker.as_ref().is_some_and(MilePathWorker::is_processing)
    }

    pub fn worker_mut(&mut self) -> Option<&mut MilePathWorker> {
        self.worker.as_mut()
    }

    pub fn graph(&self) -> Option<Arc<MilePath>> {
        self.worker.as_ref().and_then(MilePathWorker::graph)
    }

    pub fn set_blocked_layers(&mut self, layers: impl IntoIterator<Item = u32>) {
        self.blocked_layers = layers.into_iter().collect();
    }

    pub fn is_on_pathing_trapezoid(&self, pos: GamePos) -> bool {
        self.graph().is_some_and(|mp| mp.find_aabb(pos).is_some())
    }

    pub fn get_closest_point(&self, pos: GamePos) -> Option<GamePos> {
        let mp = self.graph()?;
        if mp.trapezoids.is_empty() {
            return None;
        }
        Some(mp.get_closest_point(pos))
    }

    /// Search on the current map's graph. The returned path is owned, so it
    /// stays valid across later map changes.
    pub fn search(&self, start: GamePos, goal: GamePos) -> Result<Path, Error> {
        let mp = match self.worker.as_ref().and_then(MilePathWorker::outcome) {
            None => return Err(Error::InvalidMapContext),
            Some(Err(e)) => return Err(e.as_search_error()),
            Some(Ok(mp)) => Arc::clone(mp),
        };
        let mut astar = AStar::new(&mp).with_snap_tolerance(self.config.snap_tolerance);
        astar.set_blocked_layers(self.blocked_layers.iter().copied());
        let path = astar.search(start, goal)?.clone();
        Ok(path)
    }

    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.shutdown();
        }
    }
}
