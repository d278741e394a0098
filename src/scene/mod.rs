// scene/mod.rs

pub mod camera;
pub mod view;

pub use camera::Camera;
pub use view::SceneView;

use crate::renderer::backend::BindingSetHandle;

/// The ray traced representation of the scene, as seen by the probe tracer.
pub trait TraceScene {
    /// Binding set holding the acceleration structure plus whatever the hit
    /// shaders sample. Bound at group 1 of the trace pipeline.
    fn trace_bindings(&self) -> BindingSetHandle;
}
