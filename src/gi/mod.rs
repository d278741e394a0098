//! Probe based irradiance cache.
//!
//! Four cascades of probes follow the viewer at increasing spacing. Each
//! frame the cascades are re-placed around the view, probes are shifted to
//! match, and a bounded number of probes is retraced: newly exposed probes
//! first, then invalid ones, then stale ones.

pub mod cascade;
pub mod irradiance_cache;
pub mod probe;
pub mod scheduler;
pub mod textures;
pub mod uniforms;

pub use cascade::{Cascade, TerrainClamp};
pub use irradiance_cache::IrradianceCache;
pub use probe::{GridExtent, Probe, ProbeGrid};
pub use scheduler::{ProbeUpdate, UpdateList, UpdateStats};
pub use textures::{ProbeChannel, ProbeTextureSet, ProbeTextures};

pub const NUM_CASCADES: usize = 4;
