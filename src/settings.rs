use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::gi::{ProbeChannel, NUM_CASCADES};

/// Trace results are stored in a 2D array texture with one layer per probe
/// update, so the budget can't exceed the default array layer limit.
pub const MAX_PROBES_PER_FRAME: u32 = 256;

/// wgpu's default `max_texture_dimension_3d`. Probe textures are
/// `grid × footprint` wide and `grid_y × cascades × footprint` tall.
pub const MAX_TEXTURE_DIMENSION_3D: u32 = 2048;

/// wgpu's default `max_texture_dimension_2d`, bounding the trace result side.
pub const MAX_TRACE_RESOLUTION: u32 = 8192;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiSettings {
    #[serde(default = "GiSettings::default_probes_per_frame")]
    pub probes_per_frame: u32,
    #[serde(default = "GiSettings::default_rays_per_probe")]
    pub rays_per_probe: u32,
    #[serde(default = "GiSettings::default_grid_size_xz")]
    pub grid_size_xz: u32,
    #[serde(default = "GiSettings::default_grid_size_y")]
    pub grid_size_y: u32,
    #[serde(default)]
    pub terrain_reference_height: f32,
    #[serde(default = "GiSettings::default_terrain_margin")]
    pub terrain_margin: f32,
    #[serde(default = "GiSettings::default_cascades")]
    pub cascades: [CascadeSettings; NUM_CASCADES],
    #[serde(default = "GiSettings::default_shader_root")]
    pub shader_root: String,
}

impl Default for GiSettings {
    fn default() -> Self {
        Self {
            probes_per_frame: Self::default_probes_per_frame(),
            rays_per_probe: Self::default_rays_per_probe(),
            grid_size_xz: Self::default_grid_size_xz(),
            grid_size_y: Self::default_grid_size_y(),
            terrain_reference_height: 0.0,
            terrain_margin: Self::default_terrain_margin(),
            cascades: Self::default_cascades(),
            shader_root: Self::default_shader_root(),
        }
    }
}

impl GiSettings {
    pub fn load() -> Self {
        Self::load_from_path("gi_settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<GiSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded GI settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default GI settings.",
                        path, err
                    );
                    GiSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("GI settings file {:?} not found. Using default settings.", path);
                GiSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default GI settings.",
                    path, err
                );
                GiSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.probes_per_frame == 0 {
            warn!("Probes per frame must be greater than zero. Using default value.");
            self.probes_per_frame = Self::default_probes_per_frame();
        }

        if self.probes_per_frame > MAX_PROBES_PER_FRAME {
            warn!(
                "Probes per frame {} exceeds the trace array limit. Clamping to {}.",
                self.probes_per_frame, MAX_PROBES_PER_FRAME
            );
            self.probes_per_frame = MAX_PROBES_PER_FRAME;
        }

        if self.rays_per_probe == 0 {
            warn!("Rays per probe must be greater than zero. Using default value.");
            self.rays_per_probe = Self::default_rays_per_probe();
        }

        if self.grid_size_xz == 0 || self.grid_size_y == 0 {
            warn!("Probe grid size must be greater than zero. Using default grid size.");
            self.grid_size_xz = Self::default_grid_size_xz();
            self.grid_size_y = Self::default_grid_size_y();
        }

        let footprint = ProbeChannel::ALL
            .iter()
            .map(|channel| channel.footprint())
            .max()
            .unwrap_or(1);

        let max_xz = MAX_TEXTURE_DIMENSION_3D / footprint;
        if self.grid_size_xz > max_xz {
            warn!(
                "Grid size {} exceeds the 3D texture limit. Clamping to {}.",
                self.grid_size_xz, max_xz
            );
            self.grid_size_xz = max_xz;
        }

        let max_y = MAX_TEXTURE_DIMENSION_3D / (footprint * NUM_CASCADES as u32);
        if self.grid_size_y > max_y {
            warn!(
                "Vertical grid size {} exceeds the 3D texture limit. Clamping to {}.",
                self.grid_size_y, max_y
            );
            self.grid_size_y = max_y;
        }

        let max_rays = MAX_TRACE_RESOLUTION * MAX_TRACE_RESOLUTION;
        if self.rays_per_probe > max_rays {
            warn!(
                "Rays per probe {} exceeds the trace texture limit. Clamping to {}.",
                self.rays_per_probe, max_rays
            );
            self.rays_per_probe = max_rays;
        }

        if !(self.terrain_margin >= 0.0) {
            warn!("Terrain margin must not be negative. Using default value.");
            self.terrain_margin = Self::default_terrain_margin();
        }

        let defaults = Self::default_cascades();
        for (index, (cascade, fallback)) in self.cascades.iter_mut().zip(defaults).enumerate() {
            if !(cascade.probe_spacing > 0.0) {
                warn!(
                    "Cascade {} probe spacing must be positive. Using {}.",
                    index, fallback.probe_spacing
                );
                cascade.probe_spacing = fallback.probe_spacing;
            }

            if !(0.0..=1.0).contains(&cascade.forward_alignment) {
                warn!(
                    "Cascade {} forward alignment must be within [0, 1]. Using {}.",
                    index, fallback.forward_alignment
                );
                cascade.forward_alignment = fallback.forward_alignment;
            }

            if !(cascade.update_priority >= 0.0) {
                warn!(
                    "Cascade {} update priority must not be negative. Using {}.",
                    index, fallback.update_priority
                );
                cascade.update_priority = fallback.update_priority;
            }
        }

        if self.cascades.iter().all(|cascade| cascade.update_priority == 0.0) {
            warn!("At least one cascade needs a non-zero update priority. Using default priorities.");
            for (cascade, fallback) in self.cascades.iter_mut().zip(defaults) {
                cascade.update_priority = fallback.update_priority;
            }
        }

        self
    }

    /// Side length of the square trace result written for each probe.
    pub fn trace_resolution(&self) -> u32 {
        let side = (self.rays_per_probe as f64).sqrt().ceil() as u32;
        side.max(1)
    }

    const fn default_probes_per_frame() -> u32 {
        32
    }

    const fn default_rays_per_probe() -> u32 {
        400
    }

    const fn default_grid_size_xz() -> u32 {
        32
    }

    const fn default_grid_size_y() -> u32 {
        8
    }

    const fn default_terrain_margin() -> f32 {
        0.5
    }

    fn default_shader_root() -> String {
        "src/shader".to_string()
    }

    fn default_cascades() -> [CascadeSettings; NUM_CASCADES] {
        [
            CascadeSettings::new(0.5, 0.4, 0.1),
            CascadeSettings::new(2.0, 0.5, 0.02),
            CascadeSettings::new(16.0, 0.2, 0.02),
            CascadeSettings::new(256.0, 0.0, 0.02),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CascadeSettings {
    /// Distance between probes, in meters
    pub probe_spacing: f32,
    /// How much of the cascade sits in front of the viewer. 0 = centered on
    /// the viewer, 1 = the viewer is on the cascade's back face
    #[serde(default)]
    pub forward_alignment: f32,
    /// Keep the cascade from sinking below the terrain reference height
    #[serde(default = "CascadeSettings::default_constrain_min")]
    pub constrain_to_terrain_min: bool,
    /// Keep the cascade from floating above the terrain reference height
    #[serde(default)]
    pub constrain_to_terrain_max: bool,
    /// Relative weight of this cascade when picking probes to retrace
    #[serde(default = "CascadeSettings::default_update_priority")]
    pub update_priority: f32,
}

impl CascadeSettings {
    pub const fn new(probe_spacing: f32, forward_alignment: f32, update_priority: f32) -> Self {
        Self {
            probe_spacing,
            forward_alignment,
            constrain_to_terrain_min: true,
            constrain_to_terrain_max: false,
            update_priority,
        }
    }

    const fn default_constrain_min() -> bool {
        true
    }

    const fn default_update_priority() -> f32 {
        0.02
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> GiSettings {
        let mut settings = GiSettings {
            probes_per_frame: 0,
            rays_per_probe: 0,
            grid_size_xz: 0,
            grid_size_y: 4,
            terrain_margin: -1.0,
            ..GiSettings::default()
        };
        settings.cascades[1].probe_spacing = 0.0;
        settings.cascades[2].forward_alignment = 3.0;
        settings.cascades[3].update_priority = -0.5;
        settings
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = GiSettings::default();

        assert_eq!(validated.probes_per_frame, defaults.probes_per_frame);
        assert_eq!(validated.rays_per_probe, defaults.rays_per_probe);
        assert_eq!(validated.grid_size_xz, defaults.grid_size_xz);
        assert_eq!(validated.grid_size_y, defaults.grid_size_y);
        assert_eq!(validated.terrain_margin, defaults.terrain_margin);
        assert_eq!(validated.cascades[1].probe_spacing, 2.0);
        assert_eq!(validated.cascades[2].forward_alignment, 0.2);
        assert_eq!(validated.cascades[3].update_priority, 0.02);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let mut valid = GiSettings {
            probes_per_frame: 64,
            rays_per_probe: 256,
            grid_size_xz: 16,
            grid_size_y: 4,
            ..GiSettings::default()
        };
        valid.cascades[0] = CascadeSettings::new(1.0, 0.0, 0.5);

        let validated = valid.clone().validate();

        assert_eq!(validated.probes_per_frame, 64);
        assert_eq!(validated.rays_per_probe, 256);
        assert_eq!(validated.grid_size_xz, 16);
        assert_eq!(validated.grid_size_y, 4);
        assert_eq!(validated.cascades[0], valid.cascades[0]);
    }

    #[test]
    fn validate_clamps_budget_to_trace_array_limit() {
        let settings = GiSettings {
            probes_per_frame: 10_000,
            ..GiSettings::default()
        };

        assert_eq!(settings.validate().probes_per_frame, MAX_PROBES_PER_FRAME);
    }

    #[test]
    fn validate_clamps_horizontal_grid_to_texture_limit() {
        let settings = GiSettings {
            grid_size_xz: 70_000,
            grid_size_y: 1,
            ..GiSettings::default()
        };

        let validated = settings.validate();
        assert_eq!(validated.grid_size_xz, 136);
        assert!(validated.grid_size_xz * ProbeChannel::LightCache.footprint() <= MAX_TEXTURE_DIMENSION_3D);
        assert_eq!(validated.grid_size_y, 1);
    }

    #[test]
    fn validate_clamps_vertical_grid_to_texture_limit() {
        let settings = GiSettings {
            grid_size_y: 1_000,
            ..GiSettings::default()
        };

        let validated = settings.validate();
        assert_eq!(validated.grid_size_y, 34);
        assert!(
            validated.grid_size_y * NUM_CASCADES as u32 * ProbeChannel::LightCache.footprint()
                <= MAX_TEXTURE_DIMENSION_3D
        );
    }

    #[test]
    fn validate_clamps_rays_to_trace_texture_limit() {
        let settings = GiSettings {
            rays_per_probe: u32::MAX,
            ..GiSettings::default()
        };

        let validated = settings.validate();
        assert_eq!(validated.rays_per_probe, MAX_TRACE_RESOLUTION * MAX_TRACE_RESOLUTION);
        assert_eq!(validated.trace_resolution(), MAX_TRACE_RESOLUTION);
    }

    #[test]
    fn validate_restores_priorities_when_all_zero() {
        let mut settings = GiSettings::default();
        for cascade in settings.cascades.iter_mut() {
            cascade.update_priority = 0.0;
        }

        let validated = settings.validate();
        assert_eq!(validated.cascades[0].update_priority, 0.1);
    }

    #[test]
    fn trace_resolution_covers_ray_count() {
        let settings = GiSettings::default();
        assert_eq!(settings.trace_resolution(), 20);

        let settings = GiSettings {
            rays_per_probe: 401,
            ..GiSettings::default()
        };
        assert_eq!(settings.trace_resolution(), 21);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: GiSettings =
            serde_json::from_str(r#"{ "probes_per_frame": 64 }"#).unwrap();

        assert_eq!(settings.probes_per_frame, 64);
        assert_eq!(settings.rays_per_probe, 400);
        assert_eq!(settings.cascades[3].probe_spacing, 256.0);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let settings = GiSettings::load_from_path("does/not/exist/gi_settings.json");
        assert_eq!(settings.probes_per_frame, 32);
    }
}
