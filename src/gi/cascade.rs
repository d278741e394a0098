use glam::{IVec3, Mat4, Vec3};

use crate::gi::probe::{GridExtent, ProbeGrid};
use crate::settings::CascadeSettings;

/// Maps cascade-local [-1, 1] to texture space [0, 1].
const BIAS_MATRIX: Mat4 = Mat4::from_cols_array(&[
    0.5, 0.0, 0.0, 0.0, //
    0.0, 0.5, 0.0, 0.0, //
    0.0, 0.0, 0.5, 0.0, //
    0.5, 0.5, 0.5, 1.0,
]);

/// Vertical reference the cascades are clamped against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainClamp {
    pub reference_height: f32,
    /// In probe spacings
    pub margin: f32,
}

impl Default for TerrainClamp {
    fn default() -> Self {
        Self {
            reference_height: 0.0,
            margin: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cascade {
    pub probe_spacing: f32,
    pub forward_alignment: f32,
    pub constrain_to_terrain_min: bool,
    pub constrain_to_terrain_max: bool,
    pub update_priority: f32,
    /// Worldspace min corner, always a multiple of `probe_spacing`
    location: Vec3,
    /// Probes moved since last placement, `(old - new) / spacing`
    movement: IVec3,
    world_to_cascade: Mat4,
    cascade_to_world: Mat4,
    grid: ProbeGrid,
    placed: bool,
}

impl Cascade {
    pub fn new(settings: &CascadeSettings, extent: GridExtent) -> Self {
        Self {
            probe_spacing: settings.probe_spacing,
            forward_alignment: settings.forward_alignment,
            constrain_to_terrain_min: settings.constrain_to_terrain_min,
            constrain_to_terrain_max: settings.constrain_to_terrain_max,
            update_priority: settings.update_priority,
            location: Vec3::ZERO,
            movement: IVec3::ZERO,
            world_to_cascade: Mat4::IDENTITY,
            cascade_to_world: Mat4::IDENTITY,
            grid: ProbeGrid::new(extent),
            placed: false,
        }
    }

    pub fn location(&self) -> Vec3 {
        self.location
    }

    pub fn movement(&self) -> IVec3 {
        self.movement
    }

    pub fn world_to_cascade(&self) -> Mat4 {
        self.world_to_cascade
    }

    pub fn cascade_to_world(&self) -> Mat4 {
        self.cascade_to_world
    }

    pub fn grid(&self) -> &ProbeGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut ProbeGrid {
        &mut self.grid
    }

    pub fn extent(&self) -> GridExtent {
        self.grid.extent()
    }

    /// Size of the cascade in meters.
    pub fn world_size(&self) -> Vec3 {
        self.extent().size().as_vec3() * self.probe_spacing
    }

    pub fn probe_position(&self, coord: IVec3) -> Vec3 {
        self.location + coord.as_vec3() * self.probe_spacing
    }

    /// Re-centers the cascade on the viewer, biased along `forward`, and
    /// snaps it to the probe grid. Returns the movement in probes.
    ///
    /// The first placement reports a movement as large as the grid so every
    /// probe counts as newly exposed.
    pub fn place(&mut self, viewer: Vec3, forward: Vec3, terrain: TerrainClamp) -> IVec3 {
        let size = self.world_size();
        let forward_pos = viewer + forward * size * 0.5;
        let center = viewer.lerp(forward_pos, self.forward_alignment);
        let mut min_pos = center - size * 0.5;

        let terrain_floor = terrain.reference_height - self.probe_spacing * terrain.margin;
        if self.constrain_to_terrain_max {
            min_pos.y = min_pos.y.min(terrain_floor);
        }
        if self.constrain_to_terrain_min {
            min_pos.y = min_pos.y.max(terrain_floor);
        }

        // Snapping keeps probes on the same world points frame to frame
        let min_pos = (min_pos / self.probe_spacing).round() * self.probe_spacing;

        let grid_size = self.extent().size().as_ivec3();
        self.movement = if self.placed {
            ((self.location - min_pos) / self.probe_spacing)
                .round()
                .as_ivec3()
                .clamp(-grid_size, grid_size)
        } else {
            grid_size
        };
        self.location = min_pos;
        self.placed = true;

        self.update_transforms();
        self.movement
    }

    fn update_transforms(&mut self) {
        let half_size = self.world_size() * 0.5;
        let center = self.location + half_size;
        self.world_to_cascade = BIAS_MATRIX
            * Mat4::from_scale(half_size.recip())
            * Mat4::from_translation(-center);
        self.cascade_to_world = self.world_to_cascade.inverse();
    }

    /// Applies this frame's movement to the probe grid.
    pub fn migrate(&mut self) {
        if self.movement != IVec3::ZERO {
            self.grid = self.grid.migrate(self.movement);
        }
    }

    /// Coordinates that had no counterpart in the grid before this frame's
    /// movement, in flat index order.
    pub fn newly_exposed(&self) -> impl Iterator<Item = IVec3> + '_ {
        let extent = self.extent();
        let movement = self.movement;
        let moved = movement != IVec3::ZERO;
        extent
            .coords()
            .filter(move |coord| moved && !extent.contains(coord.saturating_sub(movement)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cascade(spacing: f32, forward_alignment: f32) -> Cascade {
        let mut settings = CascadeSettings::new(spacing, forward_alignment, 0.1);
        settings.constrain_to_terrain_min = false;
        Cascade::new(&settings, GridExtent::new(32, 8))
    }

    #[test]
    fn first_placement_exposes_whole_grid() {
        let mut cascade = cascade(2.0, 0.0);
        let movement = cascade.place(Vec3::new(3.0, 1.0, -7.0), Vec3::NEG_Z, TerrainClamp::default());

        assert_eq!(movement, IVec3::new(32, 8, 32));
        assert_eq!(cascade.newly_exposed().count(), 8192);
    }

    #[test]
    fn placing_twice_at_same_position_does_not_move() {
        let mut cascade = cascade(0.5, 0.4);
        let viewer = Vec3::new(10.3, 2.7, -4.1);
        cascade.place(viewer, Vec3::X, TerrainClamp::default());

        let movement = cascade.place(viewer, Vec3::X, TerrainClamp::default());
        assert_eq!(movement, IVec3::ZERO);
        assert_eq!(cascade.newly_exposed().count(), 0);
    }

    #[test]
    fn location_is_snapped_to_spacing() {
        let positions = [
            Vec3::new(0.1, 0.2, 0.3),
            Vec3::new(-123.456, 78.9, 1001.7),
            Vec3::new(5.0e4, -3.3e3, 17.77),
        ];

        for spacing in [0.5, 2.0, 16.0, 256.0] {
            let mut cascade = cascade(spacing, 0.3);
            for position in positions {
                cascade.place(position, Vec3::new(0.6, 0.0, 0.8), TerrainClamp::default());
                let cells = cascade.location() / spacing;
                assert_eq!(cells, cells.round(), "spacing {} position {:?}", spacing, position);
            }
        }
    }

    #[test]
    fn one_spacing_step_moves_one_probe() {
        let mut cascade = cascade(2.0, 0.0);
        let viewer = Vec3::new(0.0, 4.0, 0.0);
        cascade.place(viewer, Vec3::NEG_Z, TerrainClamp::default());

        let movement = cascade.place(viewer + Vec3::X * 2.0, Vec3::NEG_Z, TerrainClamp::default());

        assert_eq!(movement, IVec3::new(-1, 0, 0));
        assert_eq!(cascade.newly_exposed().count(), 8 * 32);
        assert!(cascade.newly_exposed().all(|coord| coord.x == 31));
    }

    #[test]
    fn forward_alignment_pushes_cascade_ahead() {
        let mut centered = cascade(1.0, 0.0);
        let mut ahead = cascade(1.0, 1.0);
        centered.place(Vec3::ZERO, Vec3::X, TerrainClamp::default());
        ahead.place(Vec3::ZERO, Vec3::X, TerrainClamp::default());

        assert_eq!(centered.location().x, -16.0);
        assert_eq!(ahead.location().x, 0.0);
    }

    #[test]
    fn terrain_min_clamp_keeps_cascade_above_floor() {
        let mut settings = CascadeSettings::new(2.0, 0.0, 0.1);
        settings.constrain_to_terrain_min = true;
        let mut cascade = Cascade::new(&settings, GridExtent::new(32, 8));

        cascade.place(Vec3::new(0.0, -100.0, 0.0), Vec3::X, TerrainClamp::default());
        // Floor sits at -1, snapping may move it by up to half a spacing
        assert!((cascade.location().y + 1.0).abs() <= 1.0);
    }

    #[test]
    fn terrain_max_clamp_keeps_cascade_from_floating() {
        let mut settings = CascadeSettings::new(2.0, 0.0, 0.1);
        settings.constrain_to_terrain_min = false;
        settings.constrain_to_terrain_max = true;
        let mut cascade = Cascade::new(&settings, GridExtent::new(32, 8));

        let terrain = TerrainClamp {
            reference_height: 10.0,
            margin: 0.5,
        };
        cascade.place(Vec3::new(0.0, 500.0, 0.0), Vec3::X, terrain);
        assert!(cascade.location().y <= 10.0);
    }

    #[test]
    fn transforms_map_bounds_to_unit_cube() {
        let mut cascade = cascade(2.0, 0.0);
        cascade.place(Vec3::new(7.0, 3.0, -9.0), Vec3::NEG_Z, TerrainClamp::default());

        let min = cascade.location();
        let max = min + cascade.world_size();

        let mapped_min = cascade.world_to_cascade().transform_point3(min);
        let mapped_max = cascade.world_to_cascade().transform_point3(max);
        assert!(mapped_min.abs_diff_eq(Vec3::ZERO, 1e-5), "{:?}", mapped_min);
        assert!(mapped_max.abs_diff_eq(Vec3::ONE, 1e-5), "{:?}", mapped_max);

        let round_trip = cascade
            .cascade_to_world()
            .transform_point3(Vec3::splat(0.5));
        assert!(round_trip.abs_diff_eq(min + cascade.world_size() * 0.5, 1e-3));
    }

    #[test]
    fn teleport_movement_is_clamped_to_grid() {
        let mut cascade = cascade(0.5, 0.0);
        cascade.place(Vec3::ZERO, Vec3::X, TerrainClamp::default());

        let movement = cascade.place(Vec3::splat(1.0e7), Vec3::X, TerrainClamp::default());
        assert_eq!(movement, IVec3::new(-32, -8, -32));
        assert_eq!(cascade.newly_exposed().count(), 8192);
    }

    #[test]
    fn migrate_follows_placement() {
        let mut cascade = cascade(1.0, 0.0);
        cascade.place(Vec3::ZERO, Vec3::X, TerrainClamp::default());
        cascade.migrate();
        for probe in cascade.grid_mut().probes_mut() {
            probe.is_valid = true;
        }

        cascade.place(Vec3::new(0.0, 0.0, 3.0), Vec3::X, TerrainClamp::default());
        cascade.migrate();

        assert_eq!(cascade.movement(), IVec3::new(0, 0, -3));
        assert_eq!(cascade.grid().valid_count(), 32 * 8 * 29);
        assert!(!cascade.grid().get(IVec3::new(0, 0, 31)).unwrap().is_valid);
        assert!(cascade.grid().get(IVec3::new(0, 0, 28)).unwrap().is_valid);
    }
}
