//! Pipeline objects keyed by value-equal configuration.

use std::collections::hash_map::{Entry, HashMap};

use super::command::{DrawArraysCommand, PipelineData, Topology};
use super::error::Result;
use super::vertex::VertexLayout;

/// Everything that selects a distinct pipeline object.
///
/// Built from value copies, so logically identical draws issued through
/// separately constructed commands map to the same key.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PipelineKey {
    pub topology: Topology,
    pub vertex_layout: Option<VertexLayout>,
    pub state: PipelineData,
    /// Only meaningful for patch topologies; `None` otherwise.
    pub patch_control_points: Option<u32>,
}

impl PipelineKey {
    pub fn new(
        command: &DrawArraysCommand,
        vertex_layout: Option<&VertexLayout>,
        patch_control_points: u32,
    ) -> Self {
        Self {
            topology: command.topology,
            vertex_layout: vertex_layout.cloned(),
            state: command.pipeline_data.static_state(),
            patch_control_points: command
                .topology
                .is_patch()
                .then_some(patch_control_points),
        }
    }
}

/// Build-once cache of pipeline objects.
///
/// Generic over the stored object so hit/miss behaviour is testable without a
/// device.
pub struct PipelineCache<P = wgpu::RenderPipeline> {
    pipelines: HashMap<PipelineKey, P>,
    hits: u64,
    misses: u64,
}

impl<P> Default for PipelineCache<P> {
    fn default() -> Self {
        Self {
            pipelines: HashMap::new(),
            hits: 0,
            misses: 0,
        }
    }
}

impl<P> PipelineCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached pipeline for `key`, building it with `build` on a miss.
    ///
    /// A failed build leaves the cache unchanged.
    pub fn get_or_try_build<F>(&mut self, key: &PipelineKey, build: F) -> Result<&P>
    where
        F: FnOnce(&PipelineKey) -> Result<P>,
    {
        match self.pipelines.entry(key.clone()) {
            Entry::Occupied(e) => {
                self.hits += 1;
                Ok(e.into_mut())
            }
            Entry::Vacant(e) => {
                let pipeline = build(e.key())?;
                self.misses += 1;
                log::debug!("built pipeline #{} for {:?}", self.misses, e.key().topology);
                Ok(e.insert(pipeline))
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of successful builds.
    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Drops every cached pipeline. Counters are kept.
    pub fn clear(&mut self) {
        self.pipelines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::pipeline::error::PipelineError;

    fn layout() -> VertexLayout {
        VertexLayout::packed(&[wgpu::VertexFormat::Float32x3, wgpu::VertexFormat::Float32x4])
    }

    fn key(command: &DrawArraysCommand) -> PipelineKey {
        PipelineKey::new(command, Some(&layout()), 3)
    }

    /// Builds a fresh id per miss so reuse is observable.
    fn build_counter(next: &mut u32) -> impl FnOnce(&PipelineKey) -> Result<u32> + '_ {
        move |_| {
            *next += 1;
            Ok(*next)
        }
    }

    #[test]
    fn identical_draws_share_one_pipeline() {
        let mut cache = PipelineCache::new();
        let mut next = 0;

        let a = DrawArraysCommand::new(Topology::TriangleList, 0, 3);
        let b = DrawArraysCommand::new(Topology::TriangleList, 3, 6);

        let first = *cache.get_or_try_build(&key(&a), build_counter(&mut next)).unwrap();
        let second = *cache.get_or_try_build(&key(&b), build_counter(&mut next)).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn changing_topology_builds_new_pipeline() {
        let mut cache = PipelineCache::new();
        let mut next = 0;

        let list = DrawArraysCommand::new(Topology::TriangleList, 0, 3);
        let strip = DrawArraysCommand::new(Topology::TriangleStrip, 0, 3);

        let a = *cache.get_or_try_build(&key(&list), build_counter(&mut next)).unwrap();
        let b = *cache.get_or_try_build(&key(&strip), build_counter(&mut next)).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn changing_vertex_layout_builds_new_pipeline() {
        let cmd = DrawArraysCommand::new(Topology::TriangleList, 0, 3);
        let other = VertexLayout::packed(&[wgpu::VertexFormat::Float32x2]);
        assert_ne!(
            PipelineKey::new(&cmd, Some(&layout()), 3),
            PipelineKey::new(&cmd, Some(&other), 3)
        );
        assert_ne!(
            PipelineKey::new(&cmd, Some(&layout()), 3),
            PipelineKey::new(&cmd, None, 3)
        );
    }

    #[test]
    fn changing_blend_or_depth_builds_new_pipeline() {
        let plain = DrawArraysCommand::new(Topology::TriangleList, 0, 3);
        let blended = plain.clone().with_pipeline_data(PipelineData {
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            ..PipelineData::default()
        });
        let depth = plain.clone().with_pipeline_data(PipelineData {
            depth_test: true,
            ..PipelineData::default()
        });

        assert_ne!(key(&plain), key(&blended));
        assert_ne!(key(&plain), key(&depth));
        assert_ne!(key(&blended), key(&depth));
    }

    #[test]
    fn stencil_reference_does_not_split_cache() {
        let a = DrawArraysCommand::new(Topology::TriangleList, 0, 3);
        let b = a.clone().with_pipeline_data(PipelineData {
            stencil_reference: 9,
            ..PipelineData::default()
        });
        assert_eq!(key(&a), key(&b));
    }

    #[test]
    fn patch_control_points_only_key_patch_topologies() {
        let tri = DrawArraysCommand::new(Topology::TriangleList, 0, 3);
        assert_eq!(
            PipelineKey::new(&tri, None, 3),
            PipelineKey::new(&tri, None, 4)
        );

        let patch = DrawArraysCommand::new(Topology::PatchList, 0, 3);
        assert_ne!(
            PipelineKey::new(&patch, None, 3),
            PipelineKey::new(&patch, None, 4)
        );
    }

    #[test]
    fn failed_build_is_not_cached() {
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        let cmd = DrawArraysCommand::new(Topology::TriangleFan, 0, 3);

        let err = cache.get_or_try_build(&key(&cmd), |_| {
            Err(PipelineError::PipelineBuild("no fans".into()))
        });
        assert!(err.is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 0);

        let mut next = 0;
        assert!(cache.get_or_try_build(&key(&cmd), build_counter(&mut next)).is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_drops_pipelines() {
        let mut cache = PipelineCache::new();
        let mut next = 0;
        let cmd = DrawArraysCommand::new(Topology::PointList, 0, 1);
        cache.get_or_try_build(&key(&cmd), build_counter(&mut next)).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
