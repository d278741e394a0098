use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::{
    BackendError, Binding, BindingAllocator, BindingSetHandle, BufferDesc, BufferHandle,
    ComputeDispatch, PipelineCache, PipelineHandle, RayDispatch, RecordedPass, RenderGraph,
    ResourceAllocator, TextureDesc, TextureHandle, TextureKind, UploadQueue,
};

/// Ray dispatches run as compute passes with one invocation per ray, so the
/// trace shaders are declared with this workgroup size.
const RAY_WORKGROUP_SIZE: u32 = 8;

/// Imported binding sets outlive the frame; their handles carry this bit.
const PERSISTENT_SET_BIT: u32 = 1 << 31;

enum TextureRecord {
    /// Allocated by this backend and destroyed with it.
    Owned {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    /// Owned by someone else, e.g. the blue noise texture.
    External { view: wgpu::TextureView },
}

impl TextureRecord {
    fn view(&self) -> &wgpu::TextureView {
        match self {
            TextureRecord::Owned { view, .. } | TextureRecord::External { view } => view,
        }
    }
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    shader_root: PathBuf,
    textures: Vec<Option<TextureRecord>>,
    buffers: Vec<Option<wgpu::Buffer>>,
    pipeline_lookup: HashMap<String, PipelineHandle>,
    pipelines: Vec<wgpu::ComputePipeline>,
    frame_sets: Vec<wgpu::BindGroup>,
    persistent_sets: Vec<wgpu::BindGroup>,
}

impl WgpuBackend {
    /// Features the GI passes rely on. Ray queries are requested by whoever
    /// owns the acceleration structure.
    ///
    /// Adapter specific format features make the `Rg32Float` depth channel
    /// filterable.
    pub fn required_features() -> wgpu::Features {
        wgpu::Features::PUSH_CONSTANTS | wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES
    }

    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        shader_root: impl AsRef<Path>,
    ) -> Result<Self, BackendError> {
        let missing = Self::required_features().difference(device.features());
        if !missing.is_empty() {
            return Err(BackendError::MissingFeatures(format!("{:?}", missing)));
        }

        log::info!(
            "GI backend ready (shader root: {:?})",
            shader_root.as_ref()
        );

        Ok(Self {
            device,
            queue,
            shader_root: shader_root.as_ref().to_path_buf(),
            textures: Vec::new(),
            buffers: Vec::new(),
            pipeline_lookup: HashMap::new(),
            pipelines: Vec::new(),
            frame_sets: Vec::new(),
            persistent_sets: Vec::new(),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Drops the binding sets built during the previous frame.
    pub fn begin_frame(&mut self) {
        self.frame_sets.clear();
    }

    /// Makes a texture owned elsewhere bindable through a handle.
    pub fn import_texture(&mut self, view: wgpu::TextureView) -> TextureHandle {
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(TextureRecord::External { view }));
        handle
    }

    /// Registers a bind group that stays valid across frames, such as the
    /// scene's acceleration structure.
    pub fn import_bind_group(&mut self, bind_group: wgpu::BindGroup) -> BindingSetHandle {
        let handle = BindingSetHandle(self.persistent_sets.len() as u32 | PERSISTENT_SET_BIT);
        self.persistent_sets.push(bind_group);
        handle
    }

    pub fn texture_view(&self, handle: TextureHandle) -> Result<&wgpu::TextureView, BackendError> {
        self.textures
            .get(handle.index())
            .and_then(Option::as_ref)
            .map(TextureRecord::view)
            .ok_or_else(|| BackendError::unknown_texture(handle))
    }

    pub fn buffer(&self, handle: BufferHandle) -> Result<&wgpu::Buffer, BackendError> {
        self.buffers
            .get(handle.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| BackendError::unknown_buffer(handle))
    }

    fn pipeline(&self, handle: PipelineHandle) -> Result<&wgpu::ComputePipeline, BackendError> {
        self.pipelines
            .get(handle.index())
            .ok_or_else(|| BackendError::unknown_pipeline(handle))
    }

    fn binding_set(&self, handle: BindingSetHandle) -> Result<&wgpu::BindGroup, BackendError> {
        let set = if handle.0 & PERSISTENT_SET_BIT != 0 {
            self.persistent_sets
                .get((handle.0 & !PERSISTENT_SET_BIT) as usize)
        } else {
            self.frame_sets.get(handle.index())
        };
        set.ok_or_else(|| BackendError::unknown_binding_set(handle))
    }

    /// Runs `create` inside a validation error scope so wgpu errors come back
    /// as `BackendError::Device` instead of reaching the uncaptured handler.
    fn validated<T>(
        &self,
        label: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, BackendError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::Device(format!("Failed to create '{}': {}", label, err)));
        }
        Ok(value)
    }

    fn compile(&mut self, shader_path: &str) -> Result<PipelineHandle, BackendError> {
        if let Some(&handle) = self.pipeline_lookup.get(shader_path) {
            return Ok(handle);
        }

        let full_path = self.shader_root.join(shader_path);
        let source =
            std::fs::read_to_string(&full_path).map_err(|err| BackendError::ShaderLoad {
                path: full_path.display().to_string(),
                reason: err.to_string(),
            })?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(shader_path),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
            });

        // Layout is derived from the shader's bindings
        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(shader_path),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCompile {
                path: shader_path.to_string(),
                reason: err.to_string(),
            });
        }

        let handle = PipelineHandle(self.pipelines.len() as u32);
        self.pipelines.push(pipeline);
        self.pipeline_lookup.insert(shader_path.to_string(), handle);
        log::info!("Compiled GI pipeline {} -> {:?}", shader_path, handle);
        Ok(handle)
    }
}

impl ResourceAllocator for WgpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        let (dimension, view_dimension) = match desc.kind {
            TextureKind::Volume => (wgpu::TextureDimension::D3, wgpu::TextureViewDimension::D3),
            TextureKind::Array => (wgpu::TextureDimension::D2, wgpu::TextureViewDimension::D2Array),
        };

        let (texture, view) = self.validated(&desc.label, |device| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&desc.label),
                size: wgpu::Extent3d {
                    width: desc.size.x.max(1),
                    height: desc.size.y.max(1),
                    depth_or_array_layers: desc.size.z.max(1),
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension,
                format: desc.format,
                usage: desc.usage,
                view_formats: &[],
            });

            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&format!("{}View", desc.label)),
                dimension: Some(view_dimension),
                ..Default::default()
            });
            (texture, view)
        })?;

        log::info!(
            "Created {:?} texture '{}' {}x{}x{} ({:?})",
            desc.kind,
            desc.label,
            desc.size.x,
            desc.size.y,
            desc.size.z,
            desc.format
        );

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(TextureRecord::Owned { texture, view }));
        Ok(handle)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        match self.textures.get_mut(handle.index()).and_then(Option::take) {
            Some(TextureRecord::Owned { texture, .. }) => texture.destroy(),
            Some(TextureRecord::External { .. }) => {}
            None => log::warn!("Destroying unknown texture {:?}", handle),
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, BackendError> {
        let buffer = self.validated(&desc.label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&desc.label),
                size: desc.size.max(4),
                usage: desc.usage,
                mapped_at_creation: false,
            })
        })?;

        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(Some(buffer));
        Ok(handle)
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        match self.buffers.get_mut(handle.index()).and_then(Option::take) {
            Some(buffer) => buffer.destroy(),
            None => log::warn!("Destroying unknown buffer {:?}", handle),
        }
    }

    fn write_mapped(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        // wgpu has no persistently mapped storage buffers; the queue write is
        // the closest equivalent.
        let buffer = self.buffer(buffer)?;
        self.queue.write_buffer(buffer, offset, bytes);
        Ok(())
    }
}

impl UploadQueue for WgpuBackend {
    fn upload_to_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        let buffer = self.buffer(buffer)?;
        self.queue.write_buffer(buffer, offset, bytes);
        Ok(())
    }
}

impl PipelineCache for WgpuBackend {
    fn compute_pipeline(&mut self, shader_path: &str) -> Result<PipelineHandle, BackendError> {
        self.compile(shader_path)
    }

    fn ray_pipeline(&mut self, shader_path: &str) -> Result<PipelineHandle, BackendError> {
        self.compile(shader_path)
    }
}

impl BindingAllocator for WgpuBackend {
    fn allocate_binding_set(
        &mut self,
        pipeline: PipelineHandle,
        set_index: u32,
        bindings: &[Binding],
    ) -> Result<BindingSetHandle, BackendError> {
        let layout = self.pipeline(pipeline)?.get_bind_group_layout(set_index);

        let mut entries = Vec::with_capacity(bindings.len());
        for (slot, binding) in bindings.iter().enumerate() {
            let resource = match *binding {
                Binding::StorageTexture(texture) | Binding::SampledTexture(texture) => {
                    wgpu::BindingResource::TextureView(self.texture_view(texture)?)
                }
                Binding::Buffer(buffer) => self.buffer(buffer)?.as_entire_binding(),
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32,
                resource,
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GiBindingSet"),
            layout: &layout,
            entries: &entries,
        });

        let handle = BindingSetHandle(self.frame_sets.len() as u32);
        self.frame_sets.push(bind_group);
        Ok(handle)
    }
}

/// Collects passes for a frame and encodes them in submission order.
/// wgpu tracks resource state itself, so declared usages are only logged.
#[derive(Default)]
pub struct WgpuRenderGraph {
    passes: Vec<RecordedPass>,
}

impl WgpuRenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self, backend: &WgpuBackend) -> Result<wgpu::CommandBuffer, BackendError> {
        let mut encoder = backend
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("GiEncoder"),
            });

        for pass in &self.passes {
            match pass {
                RecordedPass::Compute(dispatch) => {
                    log::trace!(
                        "Encoding compute pass '{}' ({} resource usages)",
                        dispatch.name,
                        dispatch.usages.len()
                    );
                    Self::encode(
                        backend,
                        &mut encoder,
                        &dispatch.name,
                        dispatch.pipeline,
                        &dispatch.binding_sets,
                        &dispatch.push_constants,
                        dispatch.workgroups.to_array(),
                    )?;
                }
                RecordedPass::Ray(dispatch) => {
                    log::trace!(
                        "Encoding ray pass '{}' ({} resource usages)",
                        dispatch.name,
                        dispatch.usages.len()
                    );
                    let workgroups = [
                        dispatch.extent.x.div_ceil(RAY_WORKGROUP_SIZE),
                        dispatch.extent.y.div_ceil(RAY_WORKGROUP_SIZE),
                        dispatch.extent.z,
                    ];
                    Self::encode(
                        backend,
                        &mut encoder,
                        &dispatch.name,
                        dispatch.pipeline,
                        &dispatch.binding_sets,
                        &dispatch.push_constants,
                        workgroups,
                    )?;
                }
            }
        }

        Ok(encoder.finish())
    }

    fn encode(
        backend: &WgpuBackend,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: PipelineHandle,
        binding_sets: &[BindingSetHandle],
        push_constants: &[u8],
        workgroups: [u32; 3],
    ) -> Result<(), BackendError> {
        if workgroups.contains(&0) {
            return Ok(());
        }

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(backend.pipeline(pipeline)?);
        for (index, set) in binding_sets.iter().enumerate() {
            pass.set_bind_group(index as u32, backend.binding_set(*set)?, &[]);
        }
        if !push_constants.is_empty() {
            pass.set_push_constants(0, push_constants);
        }
        pass.dispatch_workgroups(workgroups[0], workgroups[1], workgroups[2]);
        Ok(())
    }
}

impl RenderGraph for WgpuRenderGraph {
    fn add_compute_dispatch(&mut self, dispatch: ComputeDispatch) {
        self.passes.push(RecordedPass::Compute(dispatch));
    }

    fn add_ray_dispatch(&mut self, dispatch: RayDispatch) {
        self.passes.push(RecordedPass::Ray(dispatch));
    }
}
