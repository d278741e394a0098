//! Contracts between the GI cache and the rest of the renderer.
//!
//! The cache never talks to a GPU API directly. It allocates resources,
//! uploads data, fetches pipelines and records passes through the traits in
//! this module, so it can run against [`WgpuBackend`] in the renderer or
//! against [`RecordingBackend`] in headless tools and tests.

mod binding;
mod graph;
mod recording;
mod wgpu_backend;

pub use binding::{Binding, BindingAllocator, BindingSetBuilder};
pub use graph::{
    Access, ComputeDispatch, RayDispatch, RecordedPass, RenderGraph, ResourceRef, ResourceUsage,
};
pub use recording::{RecordedBindingSet, RecordingBackend, RecordingGraph};
pub use wgpu_backend::{WgpuBackend, WgpuRenderGraph};

use bytemuck::Pod;

macro_rules! handle_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle_type!(TextureHandle);
handle_type!(BufferHandle);
handle_type!(PipelineHandle);
handle_type!(BindingSetHandle);

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("Unknown {kind} handle {index}")]
    UnknownHandle { kind: &'static str, index: u32 },

    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad { path: String, reason: String },

    #[error("Pipeline {path} failed to compile: {reason}")]
    ShaderCompile { path: String, reason: String },

    #[error("Device is missing required features: {0}")]
    MissingFeatures(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub(crate) fn unknown_texture(handle: TextureHandle) -> Self {
        BackendError::UnknownHandle {
            kind: "texture",
            index: handle.0,
        }
    }

    pub(crate) fn unknown_buffer(handle: BufferHandle) -> Self {
        BackendError::UnknownHandle {
            kind: "buffer",
            index: handle.0,
        }
    }

    pub(crate) fn unknown_pipeline(handle: PipelineHandle) -> Self {
        BackendError::UnknownHandle {
            kind: "pipeline",
            index: handle.0,
        }
    }

    pub(crate) fn unknown_binding_set(handle: BindingSetHandle) -> Self {
        BackendError::UnknownHandle {
            kind: "binding set",
            index: handle.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    /// 3D texture, `size.z` is the depth
    Volume,
    /// 2D array texture, `size.z` is the layer count
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub kind: TextureKind,
    pub format: wgpu::TextureFormat,
    pub size: glam::UVec3,
    pub usage: wgpu::TextureUsages,
}

impl TextureDesc {
    pub fn volume(label: impl Into<String>, format: wgpu::TextureFormat, size: glam::UVec3) -> Self {
        Self {
            label: label.into(),
            kind: TextureKind::Volume,
            format,
            size,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        }
    }

    pub fn array(
        label: impl Into<String>,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Self {
        Self {
            label: label.into(),
            kind: TextureKind::Array,
            format,
            size: glam::UVec3::new(width, height, layers.max(1)),
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: wgpu::BufferUsages,
}

impl BufferDesc {
    pub fn storage(label: impl Into<String>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        }
    }
}

pub trait ResourceAllocator {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError>;

    fn destroy_texture(&mut self, handle: TextureHandle);

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferHandle, BackendError>;

    fn destroy_buffer(&mut self, handle: BufferHandle);

    /// Writes straight into the buffer's memory, bypassing the upload queue.
    fn write_mapped(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError>;
}

pub trait UploadQueue {
    /// Enqueues a copy into `buffer`. The copy lands before any pass recorded
    /// after this call reads the buffer.
    fn upload_to_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    fn upload_slice<T: Pod>(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[T],
    ) -> Result<(), BackendError>
    where
        Self: Sized,
    {
        self.upload_to_buffer(buffer, offset, bytemuck::cast_slice(data))
    }
}

pub trait PipelineCache {
    /// Compiles the compute shader at `shader_path`, or returns the pipeline
    /// compiled by an earlier call with the same path.
    fn compute_pipeline(&mut self, shader_path: &str) -> Result<PipelineHandle, BackendError>;

    /// Same as [`PipelineCache::compute_pipeline`] for ray generation shaders.
    fn ray_pipeline(&mut self, shader_path: &str) -> Result<PipelineHandle, BackendError>;
}

/// Everything the GI cache needs from a backend.
pub trait Backend: ResourceAllocator + UploadQueue + PipelineCache + BindingAllocator {}

impl<T> Backend for T where T: ResourceAllocator + UploadQueue + PipelineCache + BindingAllocator {}
