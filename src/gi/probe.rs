use glam::{IVec3, UVec3};

/// Per-cell bookkeeping. The lighting data itself lives in the probe
/// textures; this only tracks whether it can be trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Probe {
    pub is_valid: bool,
    pub last_update_frame: u32,
}

/// Dimensions of a cascade's probe grid and the one place that maps between
/// integer cell coordinates and flat indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridExtent {
    size: UVec3,
}

impl GridExtent {
    pub fn new(size_xz: u32, size_y: u32) -> Self {
        Self::from_size(UVec3::new(size_xz, size_y, size_xz))
    }

    pub fn from_size(size: UVec3) -> Self {
        Self {
            size: size.max(UVec3::ONE),
        }
    }

    pub fn size(&self) -> UVec3 {
        self.size
    }

    /// Saturates instead of overflowing for absurd sizes.
    pub fn probe_count(&self) -> usize {
        (self.size.x as usize)
            .saturating_mul(self.size.y as usize)
            .saturating_mul(self.size.z as usize)
    }

    pub fn contains(&self, coord: IVec3) -> bool {
        coord.cmpge(IVec3::ZERO).all() && coord.cmplt(self.size.as_ivec3()).all()
    }

    /// `x + y * W + z * W * H`, or `None` outside the grid.
    pub fn index_of(&self, coord: IVec3) -> Option<usize> {
        if !self.contains(coord) {
            return None;
        }
        let coord = coord.as_uvec3();
        Some((coord.x + coord.y * self.size.x + coord.z * self.size.x * self.size.y) as usize)
    }

    pub fn coord_of(&self, index: usize) -> IVec3 {
        let index = index as u32;
        let x = index % self.size.x;
        let y = (index / self.size.x) % self.size.y;
        let z = index / (self.size.x * self.size.y);
        UVec3::new(x, y, z).as_ivec3()
    }

    /// Every coordinate in flat index order.
    pub fn coords(self) -> impl Iterator<Item = IVec3> {
        (0..self.probe_count()).map(move |index| self.coord_of(index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeGrid {
    extent: GridExtent,
    probes: Vec<Probe>,
}

impl ProbeGrid {
    pub fn new(extent: GridExtent) -> Self {
        Self {
            extent,
            probes: vec![Probe::default(); extent.probe_count()],
        }
    }

    pub fn extent(&self) -> GridExtent {
        self.extent
    }

    pub fn get(&self, coord: IVec3) -> Option<&Probe> {
        self.extent.index_of(coord).map(|index| &self.probes[index])
    }

    pub fn get_mut(&mut self, coord: IVec3) -> Option<&mut Probe> {
        self.extent
            .index_of(coord)
            .map(move |index| &mut self.probes[index])
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn probes_mut(&mut self) -> &mut [Probe] {
        &mut self.probes
    }

    pub fn iter(&self) -> impl Iterator<Item = (IVec3, &Probe)> + '_ {
        self.probes
            .iter()
            .enumerate()
            .map(|(index, probe)| (self.extent.coord_of(index), probe))
    }

    pub fn valid_count(&self) -> usize {
        self.probes.iter().filter(|probe| probe.is_valid).count()
    }

    /// Builds the grid as it looks after the cascade moved by `movement`
    /// probes: each valid probe at `i` lands at `i + movement`, anything that
    /// would land outside the grid is dropped and the cells scrolled in start
    /// out invalid.
    ///
    /// Always writes into a fresh grid so overlapping source and destination
    /// ranges can't alias.
    pub fn migrate(&self, movement: IVec3) -> ProbeGrid {
        let mut migrated = ProbeGrid::new(self.extent);
        if movement == IVec3::ZERO {
            migrated.probes.copy_from_slice(&self.probes);
            return migrated;
        }

        for (index, probe) in self.probes.iter().enumerate() {
            if !probe.is_valid {
                continue;
            }

            let destination = self.extent.coord_of(index).saturating_add(movement);
            if let Some(slot) = migrated.get_mut(destination) {
                *slot = *probe;
            }
        }

        migrated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_extent() -> GridExtent {
        GridExtent::from_size(UVec3::new(4, 2, 3))
    }

    #[test]
    fn index_and_coord_are_inverse() {
        let extent = small_extent();
        for index in 0..extent.probe_count() {
            let coord = extent.coord_of(index);
            assert_eq!(extent.index_of(coord), Some(index));
        }
    }

    #[test]
    fn index_layout_is_x_then_y_then_z() {
        let extent = small_extent();
        assert_eq!(extent.index_of(IVec3::new(1, 0, 0)), Some(1));
        assert_eq!(extent.index_of(IVec3::new(0, 1, 0)), Some(4));
        assert_eq!(extent.index_of(IVec3::new(0, 0, 1)), Some(8));
        assert_eq!(extent.index_of(IVec3::new(3, 1, 2)), Some(23));
    }

    #[test]
    fn out_of_bounds_coords_have_no_index() {
        let extent = small_extent();
        assert_eq!(extent.index_of(IVec3::new(-1, 0, 0)), None);
        assert_eq!(extent.index_of(IVec3::new(4, 0, 0)), None);
        assert_eq!(extent.index_of(IVec3::new(0, 2, 0)), None);
        assert_eq!(extent.index_of(IVec3::new(0, 0, 3)), None);
    }

    #[test]
    fn default_extent_has_8192_probes() {
        assert_eq!(GridExtent::new(32, 8).probe_count(), 8192);
    }

    #[test]
    fn huge_extent_count_saturates() {
        let extent = GridExtent::from_size(UVec3::new(u32::MAX, u32::MAX, u32::MAX));
        assert!(extent.probe_count() >= u32::MAX as usize);
    }

    #[test]
    fn coords_outlive_the_extent_they_came_from() {
        let coords = {
            let extent = small_extent();
            extent.coords()
        };
        let coords: Vec<IVec3> = coords.collect();

        assert_eq!(coords.len(), 24);
        assert_eq!(coords[0], IVec3::ZERO);
        assert_eq!(coords[23], IVec3::new(3, 1, 2));
    }

    #[test]
    fn new_grid_is_all_invalid() {
        let grid = ProbeGrid::new(small_extent());
        assert_eq!(grid.valid_count(), 0);
        assert!(grid.probes().iter().all(|probe| probe.last_update_frame == 0));
    }

    #[test]
    fn migrate_shifts_valid_probes_and_drops_overflow() {
        let extent = small_extent();
        let mut grid = ProbeGrid::new(extent);
        for (index, probe) in grid.probes_mut().iter_mut().enumerate() {
            probe.is_valid = true;
            probe.last_update_frame = index as u32;
        }

        let movement = IVec3::new(-1, 0, 1);
        let migrated = grid.migrate(movement);

        for coord in extent.coords() {
            let source = coord - movement;
            let probe = migrated.get(coord).unwrap();
            match grid.get(source) {
                Some(old) => assert_eq!(probe, old, "coord {:?}", coord),
                None => assert!(!probe.is_valid, "coord {:?} should be invalid", coord),
            }
        }
    }

    #[test]
    fn migrate_does_not_resurrect_invalid_probes() {
        let extent = small_extent();
        let mut grid = ProbeGrid::new(extent);
        grid.get_mut(IVec3::new(1, 0, 0)).unwrap().last_update_frame = 99;

        let migrated = grid.migrate(IVec3::new(1, 0, 0));
        assert_eq!(migrated.valid_count(), 0);
        assert_eq!(*migrated.get(IVec3::new(2, 0, 0)).unwrap(), Probe::default());
    }

    #[test]
    fn movement_beyond_grid_invalidates_everything() {
        let extent = small_extent();
        let mut grid = ProbeGrid::new(extent);
        for probe in grid.probes_mut() {
            probe.is_valid = true;
        }

        assert_eq!(grid.migrate(IVec3::new(0, 0, 3)).valid_count(), 0);
        assert_eq!(grid.migrate(IVec3::new(-4, 0, 0)).valid_count(), 0);
        assert_eq!(grid.migrate(extent.size().as_ivec3()).valid_count(), 0);
        assert_eq!(grid.migrate(IVec3::splat(i32::MAX)).valid_count(), 0);
    }

    #[test]
    fn zero_movement_keeps_grid() {
        let extent = small_extent();
        let mut grid = ProbeGrid::new(extent);
        *grid.get_mut(IVec3::new(2, 1, 1)).unwrap() = Probe {
            is_valid: true,
            last_update_frame: 12,
        };

        assert_eq!(grid.migrate(IVec3::ZERO), grid);
    }
}
