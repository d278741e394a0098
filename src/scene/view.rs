use glam::Vec3;

use super::Camera;

/// A camera plus the frame counter the GI cache schedules against.
#[derive(Clone, Copy, Debug, Default)]
pub struct SceneView {
    pub camera: Camera,
    frame_index: u32,
}

impl SceneView {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            frame_index: 0,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.camera.position()
    }

    pub fn forward(&self) -> Vec3 {
        self.camera.forward()
    }

    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    pub fn advance_frame(&mut self) {
        self.frame_index = self.frame_index.wrapping_add(1);
    }
}
