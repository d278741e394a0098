//! Headless replay of a camera flythrough against the recording backend.
//!
//! Useful for checking how the update budget is spent while the viewer moves,
//! without a GPU.

use glam::Vec3;

use crate::gi::IrradianceCache;
use crate::renderer::backend::{
    BackendError, BindingSetHandle, RecordingBackend, RecordingGraph, TextureDesc,
};
use crate::scene::{Camera, SceneView, TraceScene};
use crate::settings::GiSettings;

const NOISE_SIZE: u32 = 64;
const ORBIT_RADIUS: f32 = 40.0;
const EYE_HEIGHT: f32 = 2.0;

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    pub frames: u32,
    /// Camera speed in meters per frame
    pub speed: f32,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            frames: 600,
            speed: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReplaySummary {
    pub frames: u32,
    pub total_updates: u64,
    pub peak_updates: u32,
    pub copy_passes: u32,
    pub valid_probes: usize,
}

struct ReplayScene {
    bindings: BindingSetHandle,
}

impl TraceScene for ReplayScene {
    fn trace_bindings(&self) -> BindingSetHandle {
        self.bindings
    }
}

/// Camera on a circle around the origin, looking along its path.
fn orbit_camera(distance: f32) -> Camera {
    let angle = distance / ORBIT_RADIUS;
    let eye = Vec3::new(
        ORBIT_RADIUS * angle.cos(),
        EYE_HEIGHT,
        ORBIT_RADIUS * angle.sin(),
    );
    let tangent = Vec3::new(-angle.sin(), 0.0, angle.cos());

    Camera {
        eye,
        target: eye + tangent,
        ..Camera::default()
    }
}

pub fn replay(options: ReplayOptions, settings: GiSettings) -> Result<ReplaySummary, BackendError> {
    let mut backend = RecordingBackend::new();
    let noise = backend.import_texture(&TextureDesc::array(
        "blue_noise",
        wgpu::TextureFormat::Rgba8Unorm,
        NOISE_SIZE,
        NOISE_SIZE,
        1,
    ));
    let scene = ReplayScene {
        bindings: backend.import_binding_set(),
    };

    let mut cache = IrradianceCache::new(&mut backend, settings)?;
    let mut view = SceneView::new(orbit_camera(0.0));
    let mut summary = ReplaySummary::default();

    for frame in 0..options.frames {
        view.camera = orbit_camera(frame as f32 * options.speed);

        backend.begin_frame();
        let mut graph = RecordingGraph::new();
        let stats = cache.update(&mut backend, &mut graph, &view, &scene, noise)?;

        summary.frames += 1;
        summary.total_updates += u64::from(stats.total());
        summary.peak_updates = summary.peak_updates.max(stats.total());
        if graph.find("cascade_copy").is_some() {
            summary.copy_passes += 1;
        }

        if frame % 60 == 0 {
            log::info!(
                "Frame {}: {} updates, {} valid probes, {} passes",
                frame,
                stats.total(),
                cache.valid_probe_count(),
                graph.passes.len()
            );
        }

        view.advance_frame();
    }

    summary.valid_probes = cache.valid_probe_count();
    cache.destroy(&mut backend);
    Ok(summary)
}

pub fn run(options: ReplayOptions) -> Result<ReplaySummary, BackendError> {
    crate::init_logging();

    log::info!(
        "Replaying {} frames at {} m/frame",
        options.frames,
        options.speed
    );

    let summary = replay(options, GiSettings::load())?;

    log::info!(
        "Replay complete: {} updates over {} frames (peak {}), {} copy passes, {} valid probes",
        summary.total_updates,
        summary.frames,
        summary.peak_updates,
        summary.copy_passes,
        summary.valid_probes
    );

    Ok(summary)
}
