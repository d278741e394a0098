use bitflags::bitflags;
use bytemuck::Pod;
use glam::UVec3;

use super::{BindingSetHandle, BufferHandle, PipelineHandle, TextureHandle};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

/// How a pass touches a resource. The graph turns these into barriers;
/// passes never synchronize on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceUsage {
    pub resource: ResourceRef,
    pub access: Access,
}

impl ResourceUsage {
    pub fn read_texture(texture: TextureHandle) -> Self {
        Self {
            resource: ResourceRef::Texture(texture),
            access: Access::READ,
        }
    }

    pub fn write_texture(texture: TextureHandle) -> Self {
        Self {
            resource: ResourceRef::Texture(texture),
            access: Access::WRITE,
        }
    }

    pub fn read_buffer(buffer: BufferHandle) -> Self {
        Self {
            resource: ResourceRef::Buffer(buffer),
            access: Access::READ,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComputeDispatch {
    pub name: String,
    pub pipeline: PipelineHandle,
    pub binding_sets: Vec<BindingSetHandle>,
    pub push_constants: Vec<u8>,
    pub workgroups: UVec3,
    pub usages: Vec<ResourceUsage>,
}

impl ComputeDispatch {
    pub fn new(name: impl Into<String>, pipeline: PipelineHandle, workgroups: UVec3) -> Self {
        Self {
            name: name.into(),
            pipeline,
            binding_sets: Vec::new(),
            push_constants: Vec::new(),
            workgroups,
            usages: Vec::new(),
        }
    }

    pub fn with_binding_set(mut self, set: BindingSetHandle) -> Self {
        self.binding_sets.push(set);
        self
    }

    pub fn with_push_constants<T: Pod>(mut self, constants: &T) -> Self {
        self.push_constants = bytemuck::bytes_of(constants).to_vec();
        self
    }

    pub fn with_usages(mut self, usages: impl IntoIterator<Item = ResourceUsage>) -> Self {
        self.usages.extend(usages);
        self
    }
}

/// A ray generation dispatch. `extent` is width x height x probe count, one
/// invocation per ray.
#[derive(Debug, Clone, PartialEq)]
pub struct RayDispatch {
    pub name: String,
    pub pipeline: PipelineHandle,
    pub binding_sets: Vec<BindingSetHandle>,
    pub push_constants: Vec<u8>,
    pub extent: UVec3,
    pub usages: Vec<ResourceUsage>,
}

impl RayDispatch {
    pub fn new(name: impl Into<String>, pipeline: PipelineHandle, extent: UVec3) -> Self {
        Self {
            name: name.into(),
            pipeline,
            binding_sets: Vec::new(),
            push_constants: Vec::new(),
            extent,
            usages: Vec::new(),
        }
    }

    pub fn with_binding_set(mut self, set: BindingSetHandle) -> Self {
        self.binding_sets.push(set);
        self
    }

    pub fn with_push_constants<T: Pod>(mut self, constants: &T) -> Self {
        self.push_constants = bytemuck::bytes_of(constants).to_vec();
        self
    }

    pub fn with_usages(mut self, usages: impl IntoIterator<Item = ResourceUsage>) -> Self {
        self.usages.extend(usages);
        self
    }
}

/// A dispatch as held by a graph until it is encoded or inspected.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedPass {
    Compute(ComputeDispatch),
    Ray(RayDispatch),
}

impl RecordedPass {
    pub fn name(&self) -> &str {
        match self {
            RecordedPass::Compute(dispatch) => &dispatch.name,
            RecordedPass::Ray(dispatch) => &dispatch.name,
        }
    }
}

pub trait RenderGraph {
    fn add_compute_dispatch(&mut self, dispatch: ComputeDispatch);

    fn add_ray_dispatch(&mut self, dispatch: RayDispatch);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_pass_reports_dispatch_name() {
        let pipeline = PipelineHandle(0);
        let compute = RecordedPass::Compute(ComputeDispatch::new(
            "cascade_copy",
            pipeline,
            UVec3::ONE,
        ));
        let ray = RecordedPass::Ray(RayDispatch::new("probe_trace", pipeline, UVec3::ONE));

        assert_eq!(compute.name(), "cascade_copy");
        assert_eq!(ray.name(), "probe_trace");
    }
}
