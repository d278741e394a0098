use super::{BackendError, BindingSetHandle, BufferHandle, PipelineHandle, TextureHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    StorageTexture(TextureHandle),
    SampledTexture(TextureHandle),
    Buffer(BufferHandle),
}

pub trait BindingAllocator {
    /// Creates a binding set for group `set_index` of `pipeline`. Binding `n`
    /// of the group receives `bindings[n]`. Sets live until the end of the
    /// frame they were built in.
    fn allocate_binding_set(
        &mut self,
        pipeline: PipelineHandle,
        set_index: u32,
        bindings: &[Binding],
    ) -> Result<BindingSetHandle, BackendError>;
}

/// Fluent builder over [`BindingAllocator`]
///
/// Bindings are numbered in the order they're added, matching the slot
/// numbers declared in the shader.
pub struct BindingSetBuilder<'a, A: BindingAllocator + ?Sized> {
    allocator: &'a mut A,
    pipeline: PipelineHandle,
    set_index: u32,
    bindings: Vec<Binding>,
}

impl<'a, A: BindingAllocator + ?Sized> BindingSetBuilder<'a, A> {
    pub fn new(allocator: &'a mut A, pipeline: PipelineHandle, set_index: u32) -> Self {
        Self {
            allocator,
            pipeline,
            set_index,
            bindings: Vec::new(),
        }
    }

    pub fn bind_texture(mut self, texture: TextureHandle) -> Self {
        self.bindings.push(Binding::StorageTexture(texture));
        self
    }

    pub fn bind_sampled_texture(mut self, texture: TextureHandle) -> Self {
        self.bindings.push(Binding::SampledTexture(texture));
        self
    }

    pub fn bind_buffer(mut self, buffer: BufferHandle) -> Self {
        self.bindings.push(Binding::Buffer(buffer));
        self
    }

    pub fn build(self) -> Result<BindingSetHandle, BackendError> {
        self.allocator
            .allocate_binding_set(self.pipeline, self.set_index, &self.bindings)
    }
}
