//! Irradiance cache in the spirit of DDGI.
//!
//! Probes are kept in four cascades that follow the viewer. The cascades
//! never reallocate: when one moves, probes are shifted by whole cells and
//! only the cells scrolled into view need tracing from scratch. A fixed number
//! of probes is retraced per frame, which bounds the GPU cost regardless of
//! how fast the camera moves.

use glam::{IVec3, UVec3};

use crate::gi::cascade::{Cascade, TerrainClamp};
use crate::gi::probe::GridExtent;
use crate::gi::scheduler::{self, ProbeUpdate, UpdateList, UpdateStats};
use crate::gi::textures::{ProbeChannel, ProbeTextureSet, ProbeTextures};
use crate::gi::uniforms::{
    CascadeCopyConstants, ConvolveConstants, GpuCascade, GpuProbeUpdate, TraceConstants,
};
use crate::gi::NUM_CASCADES;
use crate::renderer::backend::{
    Backend, BackendError, BindingSetBuilder, BufferDesc, BufferHandle, ComputeDispatch,
    PipelineCache, PipelineHandle, RayDispatch, RenderGraph, ResourceAllocator, ResourceUsage,
    TextureDesc, TextureHandle,
};
use crate::scene::{SceneView, TraceScene};
use crate::settings::GiSettings;

pub const CASCADE_COPY_SHADER: &str = "gi/cascade_copy.wgsl";
pub const PROBE_TRACE_SHADER: &str = "gi/probe_trace.wgsl";
pub const CONVOLVE_DEPTH_SHADER: &str = "gi/convolve_depth.wgsl";
pub const CONVOLVE_LIGHT_CACHE_SHADER: &str = "gi/convolve_light_cache.wgsl";
pub const CONVOLVE_RADIANCE_SHADER: &str = "gi/convolve_radiance.wgsl";

/// Matches `@workgroup_size` in cascade_copy.wgsl
const COPY_WORKGROUP_SIZE: u32 = 4;

const TRACE_RESULT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Pipelines are resolved once when the cache is built.
struct GiPipelines {
    cascade_copy: PipelineHandle,
    probe_trace: PipelineHandle,
    /// Run in this order after every trace
    convolutions: [(ProbeChannel, PipelineHandle); 3],
}

impl GiPipelines {
    fn resolve<P: PipelineCache + ?Sized>(cache: &mut P) -> Result<Self, BackendError> {
        Ok(Self {
            cascade_copy: cache.compute_pipeline(CASCADE_COPY_SHADER)?,
            probe_trace: cache.ray_pipeline(PROBE_TRACE_SHADER)?,
            convolutions: [
                (
                    ProbeChannel::Depth,
                    cache.compute_pipeline(CONVOLVE_DEPTH_SHADER)?,
                ),
                (
                    ProbeChannel::LightCache,
                    cache.compute_pipeline(CONVOLVE_LIGHT_CACHE_SHADER)?,
                ),
                (
                    ProbeChannel::Radiance,
                    cache.compute_pipeline(CONVOLVE_RADIANCE_SHADER)?,
                ),
            ],
        })
    }
}

pub struct IrradianceCache {
    settings: GiSettings,
    extent: GridExtent,
    terrain: TerrainClamp,
    cascades: [Cascade; NUM_CASCADES],
    textures: ProbeTextures,
    /// One layer of `trace_resolution`² ray results per probe update
    trace_results: TextureHandle,
    cascade_buffer: BufferHandle,
    update_buffer: BufferHandle,
    pipelines: GiPipelines,
    updates: UpdateList,
    last_stats: UpdateStats,
}

impl IrradianceCache {
    pub fn new<B: Backend>(backend: &mut B, settings: GiSettings) -> Result<Self, BackendError> {
        let settings = settings.validate();
        let extent = GridExtent::new(settings.grid_size_xz, settings.grid_size_y);
        let budget = settings.probes_per_frame;

        let textures = ProbeTextures::create(backend, extent)?;

        let trace_side = settings.trace_resolution();
        let trace_results = backend.create_texture(&TextureDesc::array(
            "probe_trace_results",
            TRACE_RESULT_FORMAT,
            trace_side,
            trace_side,
            budget,
        ))?;

        let cascade_buffer = backend.create_buffer(&BufferDesc::storage(
            "probe_cascades",
            (std::mem::size_of::<GpuCascade>() * NUM_CASCADES) as u64,
        ))?;
        let update_buffer = backend.create_buffer(&BufferDesc::storage(
            "probe_updates",
            (std::mem::size_of::<GpuProbeUpdate>() * budget as usize) as u64,
        ))?;

        let pipelines = GiPipelines::resolve(backend)?;

        let cascades = std::array::from_fn(|index| Cascade::new(&settings.cascades[index], extent));
        let terrain = TerrainClamp {
            reference_height: settings.terrain_reference_height,
            margin: settings.terrain_margin,
        };

        log::info!("Created irradiance cache:");
        log::info!(
            "  Grid: {}x{}x{} probes x {} cascades",
            extent.size().x,
            extent.size().y,
            extent.size().z,
            NUM_CASCADES
        );
        log::info!(
            "  Budget: {} probes/frame, {} rays/probe ({}x{} trace results)",
            budget,
            settings.rays_per_probe,
            trace_side,
            trace_side
        );

        Ok(Self {
            settings,
            extent,
            terrain,
            cascades,
            textures,
            trace_results,
            cascade_buffer,
            update_buffer,
            pipelines,
            updates: UpdateList::with_capacity(budget as usize),
            last_stats: UpdateStats::default(),
        })
    }

    /// Records this frame's GI cache work: cascade placement and copy, probe
    /// selection, tracing and convolution.
    ///
    /// Front and back textures swap whenever a cascade moves, so fetch
    /// [`Self::front_textures`] after this returns.
    pub fn update<B, G, S>(
        &mut self,
        backend: &mut B,
        graph: &mut G,
        view: &SceneView,
        scene: &S,
        noise_texture: TextureHandle,
    ) -> Result<UpdateStats, BackendError>
    where
        B: Backend,
        G: RenderGraph + ?Sized,
        S: TraceScene + ?Sized,
    {
        let frame = view.frame_index();

        self.place_probes_from_view(view);
        self.migrate_probes(backend, graph)?;

        let stats = scheduler::schedule_updates(&mut self.cascades, frame, &mut self.updates);
        self.upload_frame_data(backend)?;

        if !self.updates.is_empty() {
            self.dispatch_traces(backend, graph, scene, noise_texture, frame)?;
            self.dispatch_convolutions(backend, graph, frame)?;
        }

        log::debug!(
            "GI cache frame {}: {} probe updates ({} exposed, {} invalid, {} stale)",
            frame,
            stats.total(),
            stats.exposed,
            stats.invalid,
            stats.stale
        );

        self.last_stats = stats;
        Ok(stats)
    }

    fn place_probes_from_view(&mut self, view: &SceneView) {
        let position = view.position();
        let forward = view.forward();
        for cascade in self.cascades.iter_mut() {
            cascade.place(position, forward, self.terrain);
        }
    }

    /// Shifts the probe grids and records the matching texture copy, then
    /// swaps the texture sets.
    fn migrate_probes<B, G>(&mut self, backend: &mut B, graph: &mut G) -> Result<(), BackendError>
    where
        B: Backend,
        G: RenderGraph + ?Sized,
    {
        for cascade in self.cascades.iter_mut() {
            cascade.migrate();
        }

        if self
            .cascades
            .iter()
            .all(|cascade| cascade.movement() == IVec3::ZERO)
        {
            return Ok(());
        }

        let constants = CascadeCopyConstants {
            movement: std::array::from_fn(|index| {
                let movement = self.cascades[index].movement();
                [movement.x, movement.y, movement.z, 0]
            }),
        };

        let front = *self.textures.front();
        let back = *self.textures.back();
        let pipeline = self.pipelines.cascade_copy;

        // Slots 0..5 sample the front set, 5..10 write the back set
        let mut builder = BindingSetBuilder::new(backend, pipeline, 0);
        for &texture in front.handles() {
            builder = builder.bind_sampled_texture(texture);
        }
        for &texture in back.handles() {
            builder = builder.bind_texture(texture);
        }
        let set = builder.build()?;

        let size = self.extent.size();
        let workgroups = UVec3::new(
            size.x.div_ceil(COPY_WORKGROUP_SIZE),
            (size.y * NUM_CASCADES as u32).div_ceil(COPY_WORKGROUP_SIZE),
            size.z.div_ceil(COPY_WORKGROUP_SIZE),
        );

        let usages = front
            .handles()
            .iter()
            .map(|&texture| ResourceUsage::read_texture(texture))
            .chain(
                back.handles()
                    .iter()
                    .map(|&texture| ResourceUsage::write_texture(texture)),
            );

        graph.add_compute_dispatch(
            ComputeDispatch::new("cascade_copy", pipeline, workgroups)
                .with_binding_set(set)
                .with_push_constants(&constants)
                .with_usages(usages),
        );

        self.textures.swap();
        Ok(())
    }

    fn upload_frame_data<B: Backend>(&self, backend: &mut B) -> Result<(), BackendError> {
        let cascades: Vec<GpuCascade> = self.cascades.iter().map(GpuCascade::from_cascade).collect();
        backend.upload_slice(self.cascade_buffer, 0, &cascades)?;

        if !self.updates.is_empty() {
            let updates: Vec<GpuProbeUpdate> = self
                .updates
                .as_slice()
                .iter()
                .map(GpuProbeUpdate::from)
                .collect();
            backend.upload_slice(self.update_buffer, 0, &updates)?;
        }

        Ok(())
    }

    fn dispatch_traces<B, G, S>(
        &self,
        backend: &mut B,
        graph: &mut G,
        scene: &S,
        noise_texture: TextureHandle,
        frame: u32,
    ) -> Result<(), BackendError>
    where
        B: Backend,
        G: RenderGraph + ?Sized,
        S: TraceScene + ?Sized,
    {
        let probe_count = self.updates.len() as u32;
        let trace_side = self.settings.trace_resolution();
        let light_cache = self.textures.front().get(ProbeChannel::LightCache);
        let pipeline = self.pipelines.probe_trace;

        let set = BindingSetBuilder::new(backend, pipeline, 0)
            .bind_buffer(self.cascade_buffer)
            .bind_buffer(self.update_buffer)
            .bind_sampled_texture(light_cache)
            .bind_sampled_texture(noise_texture)
            .bind_texture(self.trace_results)
            .build()?;

        let constants = TraceConstants {
            probe_count,
            rays_per_probe: self.settings.rays_per_probe,
            trace_resolution: trace_side,
            frame_index: frame,
        };

        graph.add_ray_dispatch(
            RayDispatch::new(
                "probe_trace",
                pipeline,
                UVec3::new(trace_side, trace_side, probe_count),
            )
            .with_binding_set(set)
            .with_binding_set(scene.trace_bindings())
            .with_push_constants(&constants)
            .with_usages([
                ResourceUsage::read_buffer(self.cascade_buffer),
                ResourceUsage::read_buffer(self.update_buffer),
                ResourceUsage::read_texture(light_cache),
                ResourceUsage::read_texture(noise_texture),
                ResourceUsage::write_texture(self.trace_results),
            ]),
        );

        Ok(())
    }

    /// One workgroup per traced probe, one pass per channel. Convolved texels
    /// replace the previous contents of the probe's tile.
    fn dispatch_convolutions<B, G>(
        &self,
        backend: &mut B,
        graph: &mut G,
        frame: u32,
    ) -> Result<(), BackendError>
    where
        B: Backend,
        G: RenderGraph + ?Sized,
    {
        let probe_count = self.updates.len() as u32;
        let front = *self.textures.front();

        for &(channel, pipeline) in &self.pipelines.convolutions {
            let target = front.get(channel);
            let mut builder = BindingSetBuilder::new(&mut *backend, pipeline, 0)
                .bind_buffer(self.update_buffer)
                .bind_sampled_texture(self.trace_results)
                .bind_texture(target);

            let mut usages = vec![
                ResourceUsage::read_buffer(self.update_buffer),
                ResourceUsage::read_texture(self.trace_results),
                ResourceUsage::write_texture(target),
            ];

            // The radiance pass also refreshes the per-probe summaries
            if channel == ProbeChannel::Radiance {
                for summary in [ProbeChannel::Average, ProbeChannel::Validity] {
                    builder = builder.bind_texture(front.get(summary));
                    usages.push(ResourceUsage::write_texture(front.get(summary)));
                }
            }
            let set = builder.build()?;

            let constants = ConvolveConstants {
                probe_count,
                rays_per_probe: self.settings.rays_per_probe,
                trace_resolution: self.settings.trace_resolution(),
                frame_index: frame,
                texels_per_probe: channel.texels_per_probe(),
                border: channel.border(),
            };

            graph.add_compute_dispatch(
                ComputeDispatch::new(
                    format!("{}_convolve", channel.label()),
                    pipeline,
                    UVec3::new(probe_count, 1, 1),
                )
                .with_binding_set(set)
                .with_push_constants(&constants)
                .with_usages(usages),
            );
        }

        Ok(())
    }

    /// Releases every GPU resource the cache owns.
    pub fn destroy<A: ResourceAllocator + ?Sized>(self, allocator: &mut A) {
        self.textures.destroy(allocator);
        allocator.destroy_texture(self.trace_results);
        allocator.destroy_buffer(self.cascade_buffer);
        allocator.destroy_buffer(self.update_buffer);
        log::info!("Destroyed irradiance cache");
    }

    /// Textures the lighting pass should sample this frame.
    pub fn front_textures(&self) -> &ProbeTextureSet {
        self.textures.front()
    }

    pub fn texture(&self, channel: ProbeChannel) -> TextureHandle {
        self.textures.front().get(channel)
    }

    pub fn trace_results(&self) -> TextureHandle {
        self.trace_results
    }

    /// `NUM_CASCADES` [`GpuCascade`] entries, refreshed every update.
    pub fn cascade_buffer(&self) -> BufferHandle {
        self.cascade_buffer
    }

    pub fn update_buffer(&self) -> BufferHandle {
        self.update_buffer
    }

    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    pub fn extent(&self) -> GridExtent {
        self.extent
    }

    pub fn settings(&self) -> &GiSettings {
        &self.settings
    }

    /// Probes selected by the most recent update.
    pub fn pending_updates(&self) -> &[ProbeUpdate] {
        self.updates.as_slice()
    }

    pub fn last_stats(&self) -> UpdateStats {
        self.last_stats
    }

    pub fn valid_probe_count(&self) -> usize {
        self.cascades
            .iter()
            .map(|cascade| cascade.grid().valid_count())
            .sum()
    }
}
