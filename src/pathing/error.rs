use serde::{Deserialize, Serialize};

/// Search outcome codes. The numeric values are stable and shared with the
/// host, which reports them verbatim; `Ok` only exists for that mapping and
/// is never returned as an `Err`.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    #[error("ok")]
    Ok = 0,
    #[error("unknown pathing error")]
    Unknown = 1,
    #[error("goal is not on or near any pathing trapezoid")]
    FailedToFindGoalBox = 2,
    #[error("start is not on or near any pathing trapezoid")]
    FailedToFindStartBox = 3,
    #[error("goal is unreachable from start")]
    FailedToFinializePath = 4,
    #[error("pathing graph is not ready")]
    InvalidMapContext = 5,
    #[error("reconstructed path exceeds the graph size")]
    BuildPathLengthExceeded = 6,
    #[error("pathing data for the map could not be loaded")]
    FailedToGetPathingMapBlock = 7,
}

impl Error {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Error::Ok,
            1 => Error::Unknown,
            2 => Error::FailedToFindGoalBox,
            3 => Error::FailedToFindStartBox,
            4 => Error::FailedToFinializePath,
            5 => Error::InvalidMapContext,
            6 => Error::BuildPathLengthExceeded,
            7 => Error::FailedToGetPathingMapBlock,
            _ => return None,
        })
    }

    /// Collapse a search result into its wire code.
    pub fn code_of<T>(result: &Result<T, Error>) -> u32 {
        match result {
            Ok(_) => Error::Ok.code(),
            Err(e) => e.code(),
        }
    }
}

/// Why a background graph build ended without a graph.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("no pathing data for map {0}")]
    MissingMapData(u32),
    #[error("graph build for map {0} was cancelled")]
    Cancelled(u32),
    #[error("graph build for map {0} panicked")]
    WorkerPanicked(u32),
}

impl BuildError {
    /// The search error a caller sees while this build error is current.
    pub fn as_search_error(&self) -> Error {
        match self {
            BuildError::MissingMapData(_) => Error::FailedToGetPathingMapBlock,
            BuildError::Cancelled(_) | BuildError::WorkerPanicked(_) => Error::InvalidMapContext,
        }
    }
}

/// Errors from the on-disk graph cache.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("cache version {found} does not match {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("cache holds map {found}, expected map {expected}")]
    MapMismatch { found: u32, expected: u32 },
    #[error("cache was built with different graph settings")]
    StaleSettings,
    #[error("cache was built from different map data")]
    StaleMapData,
}
