use glam::{Mat4, Vec3};

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }
    pub fn position(&self) -> Vec3 {
        self.eye
    }
    /// Unit view direction. Falls back to -Z when eye and target coincide.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).try_normalize().unwrap_or(Vec3::NEG_Z)
    }
    /// Moves eye and target together, keeping the view direction.
    pub fn translate(&mut self, offset: Vec3) {
        self.eye += offset;
        self.target += offset;
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_radians: 60f32.to_radians(),
            near: 0.1,
            far: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn forward_points_at_target() {
        let cam = Camera::default();
        assert!(cam.forward().abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn degenerate_camera_has_finite_forward() {
        let cam = Camera {
            target: Vec3::new(0.0, 0.0, 3.0),
            ..Camera::default()
        };
        assert_eq!(cam.forward(), Vec3::NEG_Z);
    }

    #[test]
    fn translate_keeps_direction() {
        let mut cam = Camera::default();
        let before = cam.forward();
        cam.translate(Vec3::new(5.0, 1.0, -2.0));
        assert!(cam.forward().abs_diff_eq(before, 1e-6));
        assert_eq!(cam.position(), Vec3::new(5.0, 1.0, 1.0));
    }
}
