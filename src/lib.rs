pub mod config;
pub mod logging;
pub mod pathing;
pub mod profiling;

// ============================================================================
// Profiling Macros
// ============================================================================

/// Conditionally log messages every 1000 iterations when perf_stats feature is enabled.
///
/// Meant for hot loops (A* expansion, visibility graph generation) where a
/// per-iteration log would drown everything else.
///
/// # Example
/// ```ignore
/// profile_log!(iterations, "expanded {} nodes, open set {}", iterations, open.len());
/// ```
///
/// # Zero-Cost Abstraction
/// When compiled without the `perf_stats` feature, this expands to an empty block.
/// Even the arguments (e.g., `open.len()`) are not evaluated.
#[macro_export]
#[cfg(feature = "perf_stats")]
macro_rules! profile_log {
    ($counter:expr, $($arg:tt)*) => {
        if $counter % 1000 == 0 {
            ::tracing::info!($($arg)*);
        }
    };
}

#[macro_export]
#[cfg(not(feature = "perf_stats"))]
macro_rules! profile_log {
    ($counter:expr, $($arg:tt)*) => {};
}
