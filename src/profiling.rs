//! Performance profiling utilities
//!
//! These are only active when the `perf_stats` feature is enabled.
//! Zero overhead when disabled.

// Re-export the profile macro
pub use milepath_macros::profile;
