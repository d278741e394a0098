use std::collections::HashMap;

use bytemuck::Pod;

use super::{
    BackendError, Binding, BindingAllocator, BindingSetHandle, BufferDesc, BufferHandle,
    ComputeDispatch, PipelineCache, PipelineHandle, RayDispatch, RecordedPass, RenderGraph,
    ResourceAllocator, TextureDesc, TextureHandle, UploadQueue,
};

struct RecordedBuffer {
    desc: BufferDesc,
    contents: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBindingSet {
    pub pipeline: PipelineHandle,
    pub set_index: u32,
    pub bindings: Vec<Binding>,
}

/// Headless backend that keeps resource descriptions and buffer contents in
/// host memory. Nothing is ever executed.
#[derive(Default)]
pub struct RecordingBackend {
    textures: Vec<Option<TextureDesc>>,
    buffers: Vec<Option<RecordedBuffer>>,
    pipelines: HashMap<String, PipelineHandle>,
    pipeline_paths: Vec<String>,
    binding_sets: Vec<RecordedBindingSet>,
    imported_sets: u32,
    upload_count: usize,
}

/// Imported binding sets outlive the frame; their handles carry this bit.
const PERSISTENT_SET_BIT: u32 = 1 << 31;

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the binding sets built during the previous frame.
    pub fn begin_frame(&mut self) {
        self.binding_sets.clear();
    }

    /// Registers a texture owned elsewhere, such as a noise texture.
    pub fn import_texture(&mut self, desc: &TextureDesc) -> TextureHandle {
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(desc.clone()));
        handle
    }

    /// Stands in for a binding set built outside the GI cache, such as the
    /// scene's acceleration structure.
    pub fn import_binding_set(&mut self) -> BindingSetHandle {
        let handle = BindingSetHandle(self.imported_sets | PERSISTENT_SET_BIT);
        self.imported_sets += 1;
        handle
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.iter().flatten().count()
    }

    pub fn texture_desc(&self, handle: TextureHandle) -> Option<&TextureDesc> {
        self.textures.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn buffer_desc(&self, handle: BufferHandle) -> Option<&BufferDesc> {
        self.buffers
            .get(handle.index())
            .and_then(Option::as_ref)
            .map(|buffer| &buffer.desc)
    }

    /// Reads back `count` values of `T` written to the buffer so far.
    pub fn read_buffer<T: Pod>(&self, handle: BufferHandle, count: usize) -> Vec<T> {
        let stride = std::mem::size_of::<T>();
        let Some(buffer) = self.buffers.get(handle.index()).and_then(Option::as_ref) else {
            return Vec::new();
        };

        buffer
            .contents
            .chunks_exact(stride)
            .take(count)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    pub fn compiled_pipeline_count(&self) -> usize {
        self.pipeline_paths.len()
    }

    pub fn pipeline_path(&self, handle: PipelineHandle) -> Option<&str> {
        self.pipeline_paths.get(handle.index()).map(String::as_str)
    }

    pub fn binding_set(&self, handle: BindingSetHandle) -> Option<&RecordedBindingSet> {
        if handle.0 & PERSISTENT_SET_BIT != 0 {
            return None;
        }
        self.binding_sets.get(handle.index())
    }

    pub fn upload_count(&self) -> usize {
        self.upload_count
    }

    fn buffer_mut(&mut self, handle: BufferHandle) -> Result<&mut RecordedBuffer, BackendError> {
        self.buffers
            .get_mut(handle.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| BackendError::unknown_buffer(handle))
    }

    fn write(&mut self, handle: BufferHandle, offset: u64, bytes: &[u8]) -> Result<(), BackendError> {
        let buffer = self.buffer_mut(handle)?;
        let start = offset as usize;
        let end = start + bytes.len();
        if end as u64 > buffer.desc.size {
            return Err(BackendError::Device(format!(
                "Write of {} bytes at offset {} overflows buffer '{}' ({} bytes)",
                bytes.len(),
                offset,
                buffer.desc.label,
                buffer.desc.size
            )));
        }
        buffer.contents[start..end].copy_from_slice(bytes);
        Ok(())
    }

    fn intern_pipeline(&mut self, shader_path: &str) -> PipelineHandle {
        if let Some(&handle) = self.pipelines.get(shader_path) {
            return handle;
        }

        let handle = PipelineHandle(self.pipeline_paths.len() as u32);
        self.pipeline_paths.push(shader_path.to_string());
        self.pipelines.insert(shader_path.to_string(), handle);
        handle
    }
}

impl ResourceAllocator for RecordingBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(desc.clone()));
        Ok(handle)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(handle.index()) {
            *slot = None;
        }
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, BackendError> {
        let handle = BufferHandle(self.buffers.len() as u32);
        self.buffers.push(Some(RecordedBuffer {
            desc: desc.clone(),
            contents: vec![0; desc.size as usize],
        }));
        Ok(handle)
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(slot) = self.buffers.get_mut(handle.index()) {
            *slot = None;
        }
    }

    fn write_mapped(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.write(buffer, offset, bytes)
    }
}

impl UploadQueue for RecordingBackend {
    fn upload_to_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        self.upload_count += 1;
        self.write(buffer, offset, bytes)
    }
}

impl PipelineCache for RecordingBackend {
    fn compute_pipeline(&mut self, shader_path: &str) -> Result<PipelineHandle, BackendError> {
        Ok(self.intern_pipeline(shader_path))
    }

    fn ray_pipeline(&mut self, shader_path: &str) -> Result<PipelineHandle, BackendError> {
        Ok(self.intern_pipeline(shader_path))
    }
}

impl BindingAllocator for RecordingBackend {
    fn allocate_binding_set(
        &mut self,
        pipeline: PipelineHandle,
        set_index: u32,
        bindings: &[Binding],
    ) -> Result<BindingSetHandle, BackendError> {
        if pipeline.index() >= self.pipeline_paths.len() {
            return Err(BackendError::unknown_pipeline(pipeline));
        }

        for binding in bindings {
            match *binding {
                Binding::StorageTexture(texture) | Binding::SampledTexture(texture) => {
                    if self.texture_desc(texture).is_none() {
                        return Err(BackendError::unknown_texture(texture));
                    }
                }
                Binding::Buffer(buffer) => {
                    if self.buffer_desc(buffer).is_none() {
                        return Err(BackendError::unknown_buffer(buffer));
                    }
                }
            }
        }

        let handle = BindingSetHandle(self.binding_sets.len() as u32);
        self.binding_sets.push(RecordedBindingSet {
            pipeline,
            set_index,
            bindings: bindings.to_vec(),
        });
        Ok(handle)
    }
}

#[derive(Default)]
pub struct RecordingGraph {
    pub passes: Vec<RecordedPass>,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(RecordedPass::name).collect()
    }

    pub fn find(&self, name: &str) -> Option<&RecordedPass> {
        self.passes.iter().find(|pass| pass.name() == name)
    }
}

impl RenderGraph for RecordingGraph {
    fn add_compute_dispatch(&mut self, dispatch: ComputeDispatch) {
        log::trace!("Recorded compute pass '{}'", dispatch.name);
        self.passes.push(RecordedPass::Compute(dispatch));
    }

    fn add_ray_dispatch(&mut self, dispatch: RayDispatch) {
        log::trace!("Recorded ray pass '{}'", dispatch.name);
        self.passes.push(RecordedPass::Ray(dispatch));
    }
}
