//! Graph configuration.

/// Tunables for a [`Graph`](crate::Graph).
///
/// # Example
///
/// ```ignore
/// use prism_graph::{Graph, GraphConfig};
///
/// // Verify every edge but never renumber, for a debugging session
/// let graph = Graph::new(GraphConfig {
///     verify_edges: true,
///     compression_threshold_percent: 0,
///     ..GraphConfig::default()
/// });
/// ```
#[derive(Debug, Clone)]
pub struct GraphConfig {
    // =========================================================================
    // Verification
    // =========================================================================
    /// Run the bidirectional usage/predecessor checks in `verify`.
    ///
    /// These are linear in node degree, so they stay off in release builds.
    ///
    /// Default: enabled in debug builds
    pub verify_edges: bool,

    /// Keep per-node modification counters.
    ///
    /// Default: enabled in debug builds
    pub track_node_mod_counts: bool,

    // =========================================================================
    // Compression
    // =========================================================================
    /// Share of deleted slots, in percent, at which `maybe_compress` renumbers.
    ///
    /// Set to 0 to disable automatic compression.
    ///
    /// Default: 30
    pub compression_threshold_percent: u8,

    /// Minimum number of deleted slots before `maybe_compress` considers renumbering.
    ///
    /// Default: 128
    pub compression_min_deleted: usize,

    // =========================================================================
    // Traversal
    // =========================================================================
    /// Number of items between two polls of the progress signal.
    ///
    /// Default: 1024
    pub progress_poll_interval: usize,

    /// Node slots reserved up front.
    ///
    /// Default: 64
    pub initial_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            verify_edges: cfg!(debug_assertions),
            track_node_mod_counts: cfg!(debug_assertions),

            compression_threshold_percent: 30,
            compression_min_deleted: 128,

            progress_poll_interval: 1024,
            initial_capacity: 64,
        }
    }
}

impl GraphConfig {
    /// Every check on, frequent polling.
    pub fn debug() -> Self {
        Self {
            verify_edges: true,
            track_node_mod_counts: true,
            progress_poll_interval: 64,
            ..Default::default()
        }
    }

    /// No expensive checks, larger up-front allocation.
    pub fn release() -> Self {
        Self {
            verify_edges: false,
            track_node_mod_counts: false,
            initial_capacity: 1024,
            ..Default::default()
        }
    }

    /// Whether `deleted` dead slots out of `total` warrant renumbering.
    pub fn should_compress(&self, deleted: usize, total: usize) -> bool {
        if self.compression_threshold_percent == 0 || deleted < self.compression_min_deleted {
            return false;
        }
        deleted * 100 >= total * self.compression_threshold_percent as usize
    }
}
