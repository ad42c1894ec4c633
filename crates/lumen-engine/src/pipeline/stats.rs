/// Snapshot of engine counters, for tests and run reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Draw render passes begun.
    pub render_pass_begins: u64,
    /// Draw render passes ended.
    pub render_pass_ends: u64,

    pub pipeline_builds: u64,
    pub pipeline_cache_hits: u64,

    pub vertex_uploads: u64,
    /// Vertex uploads dropped after a step that did not draw from them.
    pub vertex_evictions: u64,
    pub index_uploads: u64,

    pub clears: u64,
    pub draws: u64,
    pub probes: u64,
    pub submissions: u64,
}
