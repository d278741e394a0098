use bytemuck::{Pod, Zeroable};

use crate::gi::cascade::Cascade;
use crate::gi::scheduler::ProbeUpdate;
use crate::gi::NUM_CASCADES;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuCascade {
    pub world_to_cascade: [[f32; 4]; 4],
    pub cascade_to_world: [[f32; 4]; 4],
    /// xyz = min corner, w = probe spacing
    pub location_spacing: [f32; 4],
    /// xyz = movement in probes, w = unused
    pub movement: [i32; 4],
}

impl GpuCascade {
    pub fn from_cascade(cascade: &Cascade) -> Self {
        let location = cascade.location();
        let movement = cascade.movement();
        Self {
            world_to_cascade: cascade.world_to_cascade().to_cols_array_2d(),
            cascade_to_world: cascade.cascade_to_world().to_cols_array_2d(),
            location_spacing: [location.x, location.y, location.z, cascade.probe_spacing],
            movement: [movement.x, movement.y, movement.z, 0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuProbeUpdate {
    pub cell: [i32; 3],
    pub cascade: u32,
}

impl From<&ProbeUpdate> for GpuProbeUpdate {
    fn from(update: &ProbeUpdate) -> Self {
        Self {
            cell: update.coord.to_array(),
            cascade: update.cascade as u32,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct CascadeCopyConstants {
    /// xyz = movement in probes per cascade
    pub movement: [[i32; 4]; NUM_CASCADES],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TraceConstants {
    pub probe_count: u32,
    pub rays_per_probe: u32,
    pub trace_resolution: u32,
    pub frame_index: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ConvolveConstants {
    pub probe_count: u32,
    pub rays_per_probe: u32,
    pub trace_resolution: u32,
    /// Seeds the ray rotation, must match the trace pass
    pub frame_index: u32,
    pub texels_per_probe: u32,
    pub border: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_structs_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<GpuCascade>(), 160);
        assert_eq!(std::mem::size_of::<GpuProbeUpdate>(), 16);
        assert_eq!(std::mem::size_of::<CascadeCopyConstants>(), 64);
        assert_eq!(std::mem::size_of::<TraceConstants>(), 16);
        assert_eq!(std::mem::size_of::<ConvolveConstants>(), 24);
    }
}
